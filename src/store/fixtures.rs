//! Small Victorian gazetteer shared by the service tests.

use super::{
    AddressRow, GazetteerDataset, LocalityArea, LocalityRow, MemoryGazetteer,
    StatisticalAreaPolygon, StatisticalAreaRow,
};
use crate::models::{PrecisionTier, ReferenceSystem};

/// Coincident with the "1 SWANSTON STREET" and "1A SWANSTON STREET" rows.
pub const FLINDERS_CORNER: (f64, f64) = (-37.8136, 144.9631);

#[allow(clippy::too_many_arguments)]
fn address(
    id: &str,
    number: &str,
    street: &str,
    locality: &str,
    postcode: &str,
    (latitude, longitude): (f64, f64),
    precision: PrecisionTier,
    reliability: u8,
    property_type: &str,
) -> AddressRow {
    AddressRow {
        id: id.to_string(),
        formatted_address: format!("{number} {street} STREET, {locality} VIC {postcode}"),
        number_first: Some(number.to_string()),
        street_name: street.to_string(),
        street_type: Some("STREET".to_string()),
        locality_name: locality.to_string(),
        state: "VIC".to_string(),
        postcode: Some(postcode.to_string()),
        latitude,
        longitude,
        precision,
        reliability,
        property_type: Some(property_type.to_string()),
    }
}

fn rect(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Vec<[f64; 2]> {
    vec![
        [min_lon, min_lat],
        [max_lon, min_lat],
        [max_lon, max_lat],
        [min_lon, max_lat],
        [min_lon, min_lat],
    ]
}

pub fn dataset() -> GazetteerDataset {
    let addresses = vec![
        address(
            "GAVIC000001",
            "100",
            "COLLINS",
            "MELBOURNE",
            "3000",
            (-37.8140, 144.9710),
            PrecisionTier::Property,
            1,
            "COMMERCIAL",
        ),
        address(
            "GAVIC000002",
            "102",
            "COLLINS",
            "MELBOURNE",
            "3000",
            (-37.8141, 144.9706),
            PrecisionTier::Property,
            2,
            "COMMERCIAL",
        ),
        address(
            "GAVIC000003",
            "10",
            "BOURKE",
            "MELBOURNE",
            "3000",
            (-37.8120, 144.9720),
            PrecisionTier::Property,
            1,
            "RESIDENTIAL",
        ),
        address(
            "GAVIC000004",
            "1",
            "SWANSTON",
            "MELBOURNE",
            "3000",
            FLINDERS_CORNER,
            PrecisionTier::Property,
            2,
            "COMMERCIAL",
        ),
        address(
            "GAVIC000005",
            "1A",
            "SWANSTON",
            "MELBOURNE",
            "3000",
            FLINDERS_CORNER,
            PrecisionTier::Street,
            3,
            "RESIDENTIAL",
        ),
        address(
            "GAVIC000006",
            "25",
            "STURT",
            "BALLARAT CENTRAL",
            "3350",
            (-37.5622, 143.8503),
            PrecisionTier::Property,
            1,
            "COMMERCIAL",
        ),
    ];

    let localities = vec![
        LocalityArea {
            row: LocalityRow {
                id: "VIC1634".to_string(),
                name: "MELBOURNE".to_string(),
                postcode: Some("3000".to_string()),
                lga_name: Some("City of Melbourne".to_string()),
            },
            boundary: rect(144.94, -37.83, 144.98, -37.80),
        },
        LocalityArea {
            row: LocalityRow {
                id: "VIC178".to_string(),
                name: "BALLARAT CENTRAL".to_string(),
                postcode: Some("3350".to_string()),
                lga_name: Some("Ballarat Shire".to_string()),
            },
            boundary: rect(143.80, -37.60, 143.90, -37.52),
        },
    ];

    let statistical_areas = vec![
        StatisticalAreaPolygon {
            row: StatisticalAreaRow {
                sa1_code: Some("20663970001".to_string()),
                sa2_code: Some("206639700".to_string()),
                sa2_name: Some("Melbourne CBD - East".to_string()),
                mesh_block_code: Some("20663970000".to_string()),
                collection_district: Some("2060101".to_string()),
            },
            boundary: rect(144.94, -37.83, 144.98, -37.80),
        },
        StatisticalAreaPolygon {
            row: StatisticalAreaRow {
                sa1_code: Some("20101100101".to_string()),
                sa2_code: None,
                sa2_name: None,
                mesh_block_code: None,
                collection_district: None,
            },
            boundary: rect(143.80, -37.60, 143.90, -37.52),
        },
        StatisticalAreaPolygon {
            row: StatisticalAreaRow::default(),
            boundary: rect(144.30, -38.20, 144.40, -38.10),
        },
    ];

    GazetteerDataset {
        addresses,
        localities,
        statistical_areas,
    }
}

/// The two coincident Swanston rows with the less reliable one listed first
/// and carrying the lower id.
pub fn coincident_tie_dataset() -> GazetteerDataset {
    let mut data = dataset();
    let index = data
        .addresses
        .iter()
        .position(|row| row.id == "GAVIC000005")
        .unwrap();
    let mut row = data.addresses.remove(index);
    row.id = "GAVIC000000".to_string();
    data.addresses.insert(0, row);
    data
}

/// Sixty extra Collins Street rows whose ids sort before the 100 Collins row.
pub fn crowded_street_dataset() -> GazetteerDataset {
    let mut data = dataset();
    let mut extra: Vec<AddressRow> = (0..60)
        .map(|i| {
            address(
                &format!("AAA{i:03}"),
                &(200 + i).to_string(),
                "COLLINS",
                "MELBOURNE",
                "3000",
                (-37.8150, 144.9650),
                PrecisionTier::Property,
                1,
                "COMMERCIAL",
            )
        })
        .collect();
    extra.append(&mut data.addresses);
    data.addresses = extra;
    data
}

pub fn store() -> MemoryGazetteer {
    MemoryGazetteer::new(dataset(), ReferenceSystem::Gda2020)
}
