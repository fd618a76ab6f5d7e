//! Whitespace-segmented address tokenization.
//!
//! First token is the street number, second the street name, the remainder
//! the locality. Multi-word street names ("ST KILDA ROAD") and leading unit
//! numbers land in the wrong slot; the scoring rules fall through to the
//! looser tiers in that case.

use regex::Regex;
use std::sync::LazyLock;

use crate::store::AddressTokens;

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\s]+").expect("separator pattern is valid"));

/// Upper-case and collapse commas and runs of whitespace to single spaces.
pub fn normalize(text: &str) -> String {
    SEPARATORS
        .replace_all(text.trim(), " ")
        .trim()
        .to_uppercase()
}

pub fn tokenize(address: &str) -> AddressTokens {
    let normalized = normalize(address);
    let mut parts = normalized.split(' ').filter(|p| !p.is_empty());

    let street_number = parts.next().map(String::from);
    let street_name = parts.next().map(String::from);
    let rest: Vec<&str> = parts.collect();
    let locality = (!rest.is_empty()).then(|| rest.join(" "));

    AddressTokens {
        street_number,
        street_name,
        locality,
    }
}
