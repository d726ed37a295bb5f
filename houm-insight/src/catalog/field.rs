//! Field descriptors and extraction rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Semantic kind of a catalog field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Quantitative attribute filtered by inclusive `min_*`/`max_*` bounds.
    Numeric,
    /// Attribute whose values are tags; filtered by a set of accepted values.
    Categorical,
    /// Point location filtered by a `(min_lng, min_lat, max_lng, max_lat)` box.
    GeoBbox,
    /// Boolean attribute; a `true` filter value requires the flag to be set.
    Flag,
}

/// Value type of a field as stored in the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Number,
    Text,
    TextList,
    ObjectList,
    Boolean,
    Coordinates,
}

/// Transform applied by [`ExtractionRule::DerivedNumeric`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericTransform {
    /// Strict `^[0-9]{4}$` text parsed to an integer; anything else is null.
    #[default]
    FourDigitYear,
}

fn default_preferred_keys() -> Vec<String> {
    vec!["title".to_string(), "text".to_string()]
}

/// How a field's value is read out of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ExtractionRule {
    /// A scalar column.
    Direct { column: String },
    /// An array column; each element is a tag.
    JsonArrayOfStrings { column: String },
    /// An array of objects; the tag is the first present preferred key,
    /// falling back to the object's string form.
    JsonArrayOfObjects {
        column: String,
        #[serde(default = "default_preferred_keys")]
        preferred_keys: Vec<String>,
    },
    /// A scalar column passed through a transform.
    DerivedNumeric {
        column: String,
        #[serde(default)]
        transform: NumericTransform,
    },
    /// The first non-null of an ordered list of candidate columns.
    CoalescedNumeric { columns: Vec<String> },
    /// A longitude/latitude column pair.
    Coordinates { longitude: String, latitude: String },
}

/// A numeric value expression resolved from an [`ExtractionRule`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NumericExpr {
    Column(String),
    FourDigitYear(String),
    Coalesce(Vec<String>),
}

/// A tag expression resolved from an [`ExtractionRule`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagExpr {
    Column(String),
    StringArray(String),
    ObjectArray {
        column: String,
        preferred_keys: Vec<String>,
    },
}

impl ExtractionRule {
    /// Every column the rule reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            ExtractionRule::Direct { column }
            | ExtractionRule::JsonArrayOfStrings { column }
            | ExtractionRule::JsonArrayOfObjects { column, .. }
            | ExtractionRule::DerivedNumeric { column, .. } => vec![column.as_str()],
            ExtractionRule::CoalescedNumeric { columns } => {
                columns.iter().map(String::as_str).collect()
            }
            ExtractionRule::Coordinates {
                longitude,
                latitude,
            } => vec![longitude.as_str(), latitude.as_str()],
        }
    }

    /// Resolves the rule as a numeric expression, if it yields numbers.
    pub fn numeric_expr(&self) -> Option<NumericExpr> {
        match self {
            ExtractionRule::Direct { column } => Some(NumericExpr::Column(column.clone())),
            ExtractionRule::DerivedNumeric {
                column,
                transform: NumericTransform::FourDigitYear,
            } => Some(NumericExpr::FourDigitYear(column.clone())),
            ExtractionRule::CoalescedNumeric { columns } => {
                Some(NumericExpr::Coalesce(columns.clone()))
            }
            ExtractionRule::JsonArrayOfStrings { .. }
            | ExtractionRule::JsonArrayOfObjects { .. }
            | ExtractionRule::Coordinates { .. } => None,
        }
    }

    /// Resolves the rule as a tag expression, if it yields tags.
    pub fn tag_expr(&self) -> Option<TagExpr> {
        match self {
            ExtractionRule::Direct { column } => Some(TagExpr::Column(column.clone())),
            ExtractionRule::JsonArrayOfStrings { column } => {
                Some(TagExpr::StringArray(column.clone()))
            }
            ExtractionRule::JsonArrayOfObjects {
                column,
                preferred_keys,
            } => Some(TagExpr::ObjectArray {
                column: column.clone(),
                preferred_keys: preferred_keys.clone(),
            }),
            ExtractionRule::DerivedNumeric { .. }
            | ExtractionRule::CoalescedNumeric { .. }
            | ExtractionRule::Coordinates { .. } => None,
        }
    }

    /// Restricts the rule to the columns present in the store.
    ///
    /// Coalesced candidates that are missing are dropped; any other rule with a
    /// missing column is unusable and yields `None`.
    pub(crate) fn restrict_to(&self, available: &BTreeSet<String>) -> Option<Self> {
        match self {
            ExtractionRule::CoalescedNumeric { columns } => {
                let kept: Vec<String> = columns
                    .iter()
                    .filter(|c| available.contains(c.as_str()))
                    .cloned()
                    .collect();
                (!kept.is_empty()).then_some(ExtractionRule::CoalescedNumeric { columns: kept })
            }
            other => other
                .columns()
                .iter()
                .all(|c| available.contains(*c))
                .then(|| other.clone()),
        }
    }
}

/// Descriptor of a single filterable and/or aggregable attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name used for tag/numeric aggregation requests.
    pub name: String,
    pub kind: FieldKind,
    pub extraction: ExtractionRule,
    pub value_type: ValueType,
    /// Filter key base. Numeric fields accept `min_<key>` and `max_<key>`;
    /// other kinds accept `<key>` itself. `None` means aggregate-only.
    #[serde(default)]
    pub filter_key: Option<String>,
    /// Whether the field is offered for tag or numeric aggregation.
    #[serde(default)]
    pub aggregate: bool,
}

impl FieldDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: FieldKind,
        extraction: ExtractionRule,
        value_type: ValueType,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            extraction,
            value_type,
            filter_key: None,
            aggregate: false,
        }
    }

    pub fn with_filter_key(mut self, key: impl Into<String>) -> Self {
        self.filter_key = Some(key.into());
        self
    }

    pub fn aggregated(mut self) -> Self {
        self.aggregate = true;
        self
    }

    /// The hard-filter keys this field answers to, with their type tags.
    pub fn filter_keys(&self) -> Vec<(String, &'static str)> {
        let Some(key) = self.filter_key.as_deref() else {
            return Vec::new();
        };
        match self.kind {
            FieldKind::Numeric => vec![
                (format!("min_{key}"), "number"),
                (format!("max_{key}"), "number"),
            ],
            FieldKind::Categorical => vec![(key.to_string(), "string[]")],
            FieldKind::GeoBbox => vec![(key.to_string(), "[min_lng,min_lat,max_lng,max_lat]")],
            FieldKind::Flag => vec![(key.to_string(), "boolean")],
        }
    }

    /// Whether the field is offered as a tag field.
    pub fn is_tag_field(&self) -> bool {
        self.aggregate && self.kind == FieldKind::Categorical
    }

    /// Whether the field is offered as a numeric field.
    pub fn is_numeric_field(&self) -> bool {
        self.aggregate && self.kind == FieldKind::Numeric
    }
}
