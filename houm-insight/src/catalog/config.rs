//! Static catalog configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::field::{ExtractionRule, FieldDescriptor, FieldKind, NumericTransform, ValueType};
use crate::error::{EngineError, Result};

/// Static description of the listings table and its fields.
///
/// Field order is registration order: the compiler emits clauses in this
/// order and `list_attributes` reports fields in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Table the fields live in.
    pub table: String,
    pub fields: Vec<FieldDescriptor>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::listings()
    }
}

impl CatalogConfig {
    /// The built-in configuration for the property listings table.
    pub fn listings() -> Self {
        use ExtractionRule::*;

        let direct = |column: &str| Direct {
            column: column.to_string(),
        };

        let fields = vec![
            FieldDescriptor::new(
                "price",
                FieldKind::Numeric,
                CoalescedNumeric {
                    columns: vec!["price".to_string(), "asking_price".to_string()],
                },
                ValueType::Number,
            )
            .with_filter_key("price")
            .aggregated(),
            FieldDescriptor::new(
                "rooms",
                FieldKind::Numeric,
                direct("number_of_rooms"),
                ValueType::Number,
            )
            .with_filter_key("rooms")
            .aggregated(),
            FieldDescriptor::new(
                "area",
                FieldKind::Numeric,
                direct("living_area"),
                ValueType::Number,
            )
            .with_filter_key("area")
            .aggregated(),
            FieldDescriptor::new(
                "year",
                FieldKind::Numeric,
                DerivedNumeric {
                    column: "construction_year".to_string(),
                    transform: NumericTransform::FourDigitYear,
                },
                ValueType::Number,
            )
            .with_filter_key("year")
            .aggregated(),
            FieldDescriptor::new(
                "monthly_fee",
                FieldKind::Numeric,
                direct("monthly_fee"),
                ValueType::Number,
            )
            .with_filter_key("monthly_fee")
            .aggregated(),
            FieldDescriptor::new(
                "coast_distance_m",
                FieldKind::Numeric,
                direct("coast_distance_m"),
                ValueType::Number,
            )
            .with_filter_key("coast_distance_m")
            .aggregated(),
            FieldDescriptor::new(
                "water_distance_m",
                FieldKind::Numeric,
                direct("water_distance_m"),
                ValueType::Number,
            )
            .with_filter_key("water_distance_m")
            .aggregated(),
            FieldDescriptor::new(
                "municipality_name",
                FieldKind::Categorical,
                direct("municipality_name"),
                ValueType::Text,
            )
            .with_filter_key("municipalities")
            .aggregated(),
            FieldDescriptor::new(
                "region_name",
                FieldKind::Categorical,
                direct("region_name"),
                ValueType::Text,
            )
            .with_filter_key("regions")
            .aggregated(),
            FieldDescriptor::new(
                "districts",
                FieldKind::Categorical,
                JsonArrayOfStrings {
                    column: "districts".to_string(),
                },
                ValueType::TextList,
            )
            .with_filter_key("districts")
            .aggregated(),
            FieldDescriptor::new(
                "housing_form",
                FieldKind::Categorical,
                direct("housing_form"),
                ValueType::Text,
            )
            .with_filter_key("housing_forms")
            .aggregated(),
            FieldDescriptor::new(
                "tenure",
                FieldKind::Categorical,
                direct("tenure"),
                ValueType::Text,
            )
            .with_filter_key("tenure")
            .aggregated(),
            FieldDescriptor::new(
                "labels",
                FieldKind::Categorical,
                JsonArrayOfObjects {
                    column: "labels".to_string(),
                    preferred_keys: vec!["title".to_string(), "text".to_string()],
                },
                ValueType::ObjectList,
            )
            .aggregated(),
            FieldDescriptor::new(
                "relevant_amenities",
                FieldKind::Categorical,
                JsonArrayOfObjects {
                    column: "relevant_amenities".to_string(),
                    preferred_keys: vec!["title".to_string(), "text".to_string()],
                },
                ValueType::ObjectList,
            )
            .aggregated(),
            FieldDescriptor::new(
                "location",
                FieldKind::GeoBbox,
                Coordinates {
                    longitude: "longitude".to_string(),
                    latitude: "latitude".to_string(),
                },
                ValueType::Coordinates,
            )
            .with_filter_key("bbox"),
            FieldDescriptor::new(
                "new_construction",
                FieldKind::Flag,
                direct("is_new_construction"),
                ValueType::Boolean,
            )
            .with_filter_key("prefer_new_construction"),
            FieldDescriptor::new(
                "upcoming",
                FieldKind::Flag,
                direct("is_upcoming"),
                ValueType::Boolean,
            )
            .with_filter_key("prefer_upcoming"),
        ];

        Self {
            table: "listings".to_string(),
            fields,
        }
    }

    /// Parses a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::configuration(format!("invalid catalog config: {e}")))
    }

    /// Loads a configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::configuration(format!(
                "cannot read catalog config {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&text)
    }

    /// Replaces the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}
