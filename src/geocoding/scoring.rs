//! Ordered match rules for forward geocoding.
//!
//! Rules are evaluated top-down against each candidate row and the first
//! rule that matches assigns the score.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::tokenize::normalize;
use crate::store::{AddressRow, AddressTokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchRule {
    /// Street number and street name equal, locality contained in the row's locality.
    ExactComponents,
    /// Street number equal, street name partially matched.
    NumberAndPartialStreet,
    /// The whole normalized input appears in the formatted address.
    FullTextSubstring,
    /// Returned by the store but matched by none of the above.
    Fallback,
}

/// Evaluated in order, first match wins.
pub const MATCH_RULES: &[(MatchRule, u8)] = &[
    (MatchRule::ExactComponents, 95),
    (MatchRule::NumberAndPartialStreet, 85),
    (MatchRule::FullTextSubstring, 75),
    (MatchRule::Fallback, 50),
];

/// Normalized query text plus its tokens.
#[derive(Debug, Clone)]
pub struct MatchInput {
    pub text: String,
    pub tokens: AddressTokens,
}

impl MatchInput {
    pub fn new(text: String, tokens: AddressTokens) -> Self {
        Self { text, tokens }
    }
}

fn same_number(tokens: &AddressTokens, row: &AddressRow) -> bool {
    match (&tokens.street_number, &row.number_first) {
        (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
        _ => false,
    }
}

impl MatchRule {
    pub fn matches(&self, input: &MatchInput, row: &AddressRow) -> bool {
        let tokens = &input.tokens;
        match self {
            MatchRule::ExactComponents => {
                let (Some(street), Some(locality)) = (&tokens.street_name, &tokens.locality)
                else {
                    return false;
                };
                same_number(tokens, row)
                    && row.street_name.eq_ignore_ascii_case(street)
                    && row.locality_name.to_uppercase().contains(locality.as_str())
            }
            MatchRule::NumberAndPartialStreet => {
                let Some(street) = &tokens.street_name else {
                    return false;
                };
                same_number(tokens, row)
                    && row.street_name.to_uppercase().contains(street.as_str())
            }
            MatchRule::FullTextSubstring => {
                !input.text.is_empty() && normalize(&row.formatted_address).contains(&input.text)
            }
            MatchRule::Fallback => true,
        }
    }
}

/// First matching rule and its score.
pub fn score(input: &MatchInput, row: &AddressRow) -> (MatchRule, u8) {
    MATCH_RULES
        .iter()
        .find(|(rule, _)| rule.matches(input, row))
        .copied()
        .unwrap_or((MatchRule::Fallback, 50))
}

/// Higher score first, then more reliable, then finer precision, then id.
fn rank(a: (&AddressRow, u8), b: (&AddressRow, u8)) -> Ordering {
    b.1.cmp(&a.1)
        .then(a.0.reliability.cmp(&b.0.reliability))
        .then(a.0.precision.cmp(&b.0.precision))
        .then_with(|| a.0.id.cmp(&b.0.id))
}

/// Rows ordered best first, each with its rule and score.
pub fn rank_rows<'a>(
    input: &MatchInput,
    rows: impl IntoIterator<Item = &'a AddressRow>,
) -> Vec<(&'a AddressRow, MatchRule, u8)> {
    let mut scored: Vec<(&AddressRow, MatchRule, u8)> = rows
        .into_iter()
        .map(|row| {
            let (rule, score) = score(input, row);
            (row, rule, score)
        })
        .collect();
    scored.sort_by(|a, b| rank((a.0, a.2), (b.0, b.2)));
    scored
}

/// Pick the best-scoring row.
pub fn best_match<'a>(
    input: &MatchInput,
    rows: &'a [AddressRow],
) -> Option<(&'a AddressRow, MatchRule, u8)> {
    rows.iter()
        .map(|row| {
            let (rule, score) = score(input, row);
            (row, rule, score)
        })
        .min_by(|a, b| rank((a.0, a.2), (b.0, b.2)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoding::tokenize::tokenize;
    use crate::store::fixtures;

    fn input(address: &str) -> MatchInput {
        MatchInput::new(normalize(address), tokenize(address))
    }

    fn row(id: &str) -> AddressRow {
        fixtures::dataset()
            .addresses
            .into_iter()
            .find(|r| r.id == id)
            .unwrap()
    }

    #[test]
    fn test_rule_table_is_descending() {
        let scores: Vec<u8> = MATCH_RULES.iter().map(|(_, s)| *s).collect();
        assert_eq!(scores, vec![95, 85, 75, 50]);
    }

    #[test]
    fn test_exact_components() {
        let (rule, score) = score(&input("100 Collins Melbourne"), &row("GAVIC000001"));
        assert_eq!(rule, MatchRule::ExactComponents);
        assert_eq!(score, 95);
    }

    #[test]
    fn test_street_type_in_input_drops_to_partial_street() {
        // "STREET MELBOURNE" is taken as the locality and does not match
        let (rule, score) = score(&input("100 Collins Street Melbourne"), &row("GAVIC000001"));
        assert_eq!(rule, MatchRule::NumberAndPartialStreet);
        assert_eq!(score, 85);
    }

    #[test]
    fn test_partial_street_name() {
        let (rule, _) = score(&input("100 COLL"), &row("GAVIC000001"));
        assert_eq!(rule, MatchRule::NumberAndPartialStreet);
    }

    #[test]
    fn test_full_text_substring() {
        let (rule, score) = score(&input("Collins Street, Melbourne"), &row("GAVIC000002"));
        assert_eq!(rule, MatchRule::FullTextSubstring);
        assert_eq!(score, 75);
    }

    #[test]
    fn test_fallback() {
        let (rule, score) = score(&input("100 Collins Melbourne"), &row("GAVIC000002"));
        assert_eq!(rule, MatchRule::Fallback);
        assert_eq!(score, 50);
    }

    #[test]
    fn test_best_match_tie_breaks_on_reliability() {
        let rows = vec![row("GAVIC000005"), row("GAVIC000004")];
        // Both match on full text, reliability 2 beats 3
        let (best, rule, score) = best_match(&input("Swanston"), &rows).unwrap();
        assert_eq!(best.id, "GAVIC000004");
        assert_eq!(rule, MatchRule::FullTextSubstring);
        assert_eq!(score, 75);
    }

    #[test]
    fn test_best_match_prefers_score() {
        let rows = vec![row("GAVIC000002"), row("GAVIC000001")];
        let (best, _, score) = best_match(&input("100 Collins Melbourne"), &rows).unwrap();
        assert_eq!(best.id, "GAVIC000001");
        assert_eq!(score, 95);
        assert!(best_match(&input("anything"), &[]).is_none());
    }

    #[test]
    fn test_rank_rows_orders_by_score() {
        let rows = vec![row("GAVIC000002"), row("GAVIC000003"), row("GAVIC000001")];
        let ranked = rank_rows(&input("100 Collins Melbourne"), &rows);
        let ids: Vec<&str> = ranked.iter().map(|(r, _, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["GAVIC000001", "GAVIC000002", "GAVIC000003"]);
        assert_eq!(ranked[0].2, 95);
    }
}
