//! Shared fixtures for integration tests.

#![allow(dead_code)]

use arrow::array::{
    Array, ArrayBuilder, ArrayRef, BooleanArray, Float64Array, Int64Array, Int64Builder,
    ListBuilder, StringArray, StringBuilder, StructBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use houm_insight::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

/// Ten listings: six priced in `[2_000_000, 5_000_000]`, four in Stockholm,
/// none upcoming, eight with coordinates.
pub fn listings() -> Vec<Value> {
    vec![
        json!({"hemnet_id": 1, "price": 1500000, "municipality_name": "Stockholm",
               "districts": ["Vasastan"], "number_of_rooms": 1, "is_upcoming": false,
               "labels": [{"title": "Balkong"}], "longitude": 18.05, "latitude": 59.34}),
        json!({"hemnet_id": 2, "price": 2000000, "municipality_name": "Stockholm",
               "districts": ["Vasastan", "Norrmalm"], "number_of_rooms": 2, "is_upcoming": false,
               "labels": [{"title": "Balkong"}, {"title": "Hiss"}], "longitude": 18.06, "latitude": 59.33}),
        json!({"hemnet_id": 3, "price": 2500000, "municipality_name": "Stockholm",
               "districts": "[\"Södermalm\"]", "number_of_rooms": 2, "is_upcoming": false,
               "labels": "[{\"text\": \"Hiss\"}]", "longitude": 18.07, "latitude": 59.31}),
        json!({"hemnet_id": 4, "asking_price": 3000000, "municipality_name": "Stockholm",
               "districts": ["Södermalm"], "number_of_rooms": 3, "is_upcoming": false,
               "labels": [{"id": 7}], "longitude": 18.08, "latitude": 59.31}),
        json!({"hemnet_id": 5, "price": "3500000", "municipality_name": "Solna",
               "districts": ["Hagalund"], "number_of_rooms": 3, "is_upcoming": false,
               "labels": [{"id": 8}], "longitude": 18.0, "latitude": 59.36}),
        json!({"hemnet_id": 6, "price": 4000000, "municipality_name": "Solna",
               "districts": [], "number_of_rooms": 4, "is_upcoming": false,
               "longitude": 18.01, "latitude": 59.37}),
        json!({"hemnet_id": 7, "price": 5000000, "municipality_name": "Solna",
               "number_of_rooms": 4, "is_upcoming": false}),
        json!({"hemnet_id": 8, "price": 5500000, "municipality_name": "Uppsala",
               "number_of_rooms": 5, "is_upcoming": false, "longitude": 17.64, "latitude": 59.86}),
        json!({"hemnet_id": 9, "price": 7000000, "municipality_name": "Uppsala",
               "number_of_rooms": 6, "is_upcoming": false, "longitude": 17.63, "latitude": 59.85}),
        json!({"hemnet_id": 10, "price": null, "municipality_name": null,
               "number_of_rooms": null, "is_upcoming": false}),
    ]
}

pub fn in_memory(rows: Vec<Value>) -> InMemoryExecutor {
    InMemoryExecutor::new("listings", rows).with_id_column("hemnet_id")
}

pub async fn engine(rows: Vec<Value>) -> Engine {
    Engine::bootstrap(
        Arc::new(in_memory(rows)),
        CatalogConfig::listings(),
        EngineConfig::default(),
    )
    .await
    .expect("engine bootstraps over in-memory rows")
}

/// A MemTable with native Arrow types mirroring a subset of [`listings`].
pub fn listings_table() -> MemTable {
    let prices = [
        Some(1_500_000.0),
        Some(2_000_000.0),
        Some(2_500_000.0),
        Some(3_000_000.0),
        Some(3_500_000.0),
        Some(4_000_000.0),
        Some(5_000_000.0),
        Some(5_500_000.0),
        Some(7_000_000.0),
        None,
    ];
    let municipalities = [
        Some("Stockholm"),
        Some("Stockholm"),
        Some("Stockholm"),
        Some("Stockholm"),
        Some("Solna"),
        Some("Solna"),
        Some("Solna"),
        Some("Uppsala"),
        Some("Uppsala"),
        None,
    ];
    let districts: [&[&str]; 10] = [
        &["Vasastan"],
        &["Vasastan", "Norrmalm"],
        &["Södermalm"],
        &["Södermalm"],
        &["Hagalund"],
        &[],
        &[],
        &[],
        &[],
        &[],
    ];
    let years = [
        Some("2005"),
        Some("abc"),
        Some("1999"),
        None,
        Some("19999"),
        None,
        None,
        None,
        None,
        None,
    ];
    let coordinates = [
        Some((18.05, 59.34)),
        Some((18.06, 59.33)),
        Some((18.07, 59.31)),
        Some((18.08, 59.31)),
        Some((18.0, 59.36)),
        Some((18.01, 59.37)),
        None,
        Some((17.64, 59.86)),
        Some((17.63, 59.85)),
        None,
    ];
    // (title, text, id) per label.
    type Label = (Option<&'static str>, Option<&'static str>, Option<i64>);
    let labels: [&[Label]; 10] = [
        &[(Some("Balkong"), None, None)],
        &[(Some("Balkong"), None, None), (Some("Hiss"), None, None)],
        &[(None, Some("Hiss"), None)],
        &[(None, None, Some(7))],
        &[(None, None, Some(8))],
        &[],
        &[],
        &[],
        &[],
        &[],
    ];

    let mut district_list = ListBuilder::new(StringBuilder::new());
    for row in districts {
        for district in row {
            district_list.values().append_value(district);
        }
        district_list.append(true);
    }

    let label_fields = vec![
        Field::new("title", DataType::Utf8, true),
        Field::new("text", DataType::Utf8, true),
        Field::new("id", DataType::Int64, true),
    ];
    let mut label_list = ListBuilder::new(StructBuilder::new(
        label_fields,
        vec![
            Box::new(StringBuilder::new()) as Box<dyn ArrayBuilder>,
            Box::new(StringBuilder::new()),
            Box::new(Int64Builder::new()),
        ],
    ));
    for row in labels {
        for (title, text, id) in row {
            let item = label_list.values();
            item.field_builder::<StringBuilder>(0)
                .expect("title builder")
                .append_option(*title);
            item.field_builder::<StringBuilder>(1)
                .expect("text builder")
                .append_option(*text);
            item.field_builder::<Int64Builder>(2)
                .expect("id builder")
                .append_option(*id);
            item.append(true);
        }
        label_list.append(true);
    }

    let longitudes: Float64Array = coordinates.iter().map(|c| c.map(|(lng, _)| lng)).collect();
    let latitudes: Float64Array = coordinates.iter().map(|c| c.map(|(_, lat)| lat)).collect();

    let columns: Vec<(&str, ArrayRef)> = vec![
        ("hemnet_id", Arc::new(Int64Array::from_iter_values(1..=10)) as ArrayRef),
        ("price", Arc::new(Float64Array::from(prices.to_vec()))),
        (
            "municipality_name",
            Arc::new(StringArray::from(municipalities.to_vec())),
        ),
        ("districts", Arc::new(district_list.finish())),
        ("construction_year", Arc::new(StringArray::from(years.to_vec()))),
        ("is_upcoming", Arc::new(BooleanArray::from(vec![false; 10]))),
        ("longitude", Arc::new(longitudes)),
        ("latitude", Arc::new(latitudes)),
        ("labels", Arc::new(label_list.finish())),
    ];

    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, array)| {
                Field::new(*name, array.data_type().clone(), *name != "hemnet_id")
            })
            .collect::<Vec<_>>(),
    ));
    let arrays = columns.into_iter().map(|(_, array)| array).collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays).expect("valid fixture batch");
    MemTable::try_new(schema, vec![vec![batch]]).expect("valid fixture table")
}
