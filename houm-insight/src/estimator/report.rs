//! Distribution report types.

use serde::Serialize;
use std::collections::BTreeMap;

/// Prevalence of one tag within a population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagObservation {
    pub tag_value: String,
    pub distinct_item_count: u64,
    /// `distinct_item_count / population_size`; 0 for an empty population.
    pub share: f64,
}

/// Top tags of a field in the overall and the filtered population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagPrevalence {
    pub overall: Vec<TagObservation>,
    pub filtered: Vec<TagObservation>,
}

/// One equal-width histogram bucket. The last bucket includes `upper`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub bucket_index: usize,
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Distribution of a numeric field over the filtered population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NumericSummary {
    /// Number of non-null values.
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    /// Empty when `count == 0` or `min == max`.
    pub histogram: Vec<HistogramBucket>,
}

/// Marker recorded in place of a field the catalog cannot serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub error: &'static str,
    pub field: String,
}

impl FieldError {
    pub fn unsupported(field: impl Into<String>) -> Self {
        Self {
            error: "unsupported_field",
            field: field.into(),
        }
    }
}

/// Per-field result: the computed value or an error marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldOutcome<T> {
    Ready(T),
    Unsupported(FieldError),
}

impl<T> FieldOutcome<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            FieldOutcome::Ready(value) => Some(value),
            FieldOutcome::Unsupported(_) => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, FieldOutcome::Unsupported(_))
    }
}

/// How the filtered population compares to the whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionReport {
    pub total_count: u64,
    pub filtered_count: u64,
    /// Rows matching hard filters and soft preferences; `None` without soft
    /// preferences.
    pub soft_match_count: Option<u64>,
    /// Bin count actually used.
    pub bins: usize,
    /// Tag limit actually used.
    pub tag_limit: usize,
    pub tag_prevalence: BTreeMap<String, FieldOutcome<TagPrevalence>>,
    pub numeric_distributions: BTreeMap<String, FieldOutcome<NumericSummary>>,
}
