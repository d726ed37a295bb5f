//! The field catalog: the single registry of filterable and aggregable
//! attributes.
//!
//! A [`FieldCatalog`] is built once at startup from a [`CatalogConfig`] and
//! the set of columns the store reports for the listings table. It is never
//! mutated afterwards; the compiler and the estimator receive it explicitly.
//!
//! ```rust
//! use houm_insight::catalog::{CatalogConfig, FieldCatalog};
//! use std::collections::BTreeSet;
//!
//! let columns: BTreeSet<String> = ["hemnet_id", "price", "municipality_name"]
//!     .into_iter()
//!     .map(String::from)
//!     .collect();
//! let catalog = FieldCatalog::from_config(CatalogConfig::listings(), &columns).unwrap();
//!
//! let attributes = catalog.list_attributes();
//! assert_eq!(attributes.numeric_fields, vec!["price"]);
//! assert_eq!(attributes.tag_fields, vec!["municipality_name"]);
//! assert_eq!(attributes.extra_columns, vec!["hemnet_id"]);
//! ```

pub mod config;
pub mod field;

pub use config::CatalogConfig;
pub use field::{
    ExtractionRule, FieldDescriptor, FieldKind, NumericExpr, NumericTransform, TagExpr, ValueType,
};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{info, instrument, warn};

use crate::error::{EngineError, Result};
use crate::executor::QueryExecutor;
use crate::security::SqlSecurity;

/// Capability listing returned by [`FieldCatalog::list_attributes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeListing {
    /// Every accepted hard-filter key and its type tag.
    pub hard_filter_keys: BTreeMap<String, String>,
    /// Fields accepted as tag fields, in registration order.
    pub tag_fields: Vec<String>,
    /// Fields accepted as numeric fields, in registration order.
    pub numeric_fields: Vec<String>,
    /// Columns discovered in the store that no field reads.
    pub extra_columns: Vec<String>,
}

/// Immutable registry of field descriptors.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    table: String,
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, usize>,
    filter_keys: HashMap<String, usize>,
    discovered_columns: BTreeSet<String>,
}

impl FieldCatalog {
    /// Builds a catalog from static configuration and the columns discovered
    /// in the store.
    ///
    /// Fields reading columns the store does not have are dropped (coalesced
    /// candidates are pruned individually). An empty `discovered_columns` set
    /// means discovery was not available and keeps every field.
    pub fn from_config(
        config: CatalogConfig,
        discovered_columns: &BTreeSet<String>,
    ) -> Result<Self> {
        SqlSecurity::validate_identifier(&config.table)?;

        let mut fields = Vec::with_capacity(config.fields.len());
        for field in config.fields {
            validate_descriptor(&field)?;

            if discovered_columns.is_empty() {
                fields.push(field);
                continue;
            }
            match field.extraction.restrict_to(discovered_columns) {
                Some(extraction) => fields.push(FieldDescriptor { extraction, ..field }),
                None => warn!(
                    field = %field.name,
                    columns = ?field.extraction.columns(),
                    "dropping catalog field: columns not present in store"
                ),
            }
        }

        let mut by_name = HashMap::new();
        let mut filter_keys = HashMap::new();
        for (index, field) in fields.iter().enumerate() {
            if by_name.insert(field.name.clone(), index).is_some() {
                return Err(EngineError::configuration(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
            for (key, _) in field.filter_keys() {
                if filter_keys.insert(key.clone(), index).is_some() {
                    return Err(EngineError::configuration(format!(
                        "duplicate filter key '{key}'"
                    )));
                }
            }
        }

        Ok(Self {
            table: config.table,
            fields,
            by_name,
            filter_keys,
            discovered_columns: discovered_columns.clone(),
        })
    }

    /// Builds a catalog after reading the table's columns once through `executor`.
    #[instrument(skip(config, executor), fields(table = %config.table))]
    pub async fn discover(config: CatalogConfig, executor: &dyn QueryExecutor) -> Result<Self> {
        SqlSecurity::validate_identifier(&config.table)?;
        let columns = executor.list_columns(&config.table).await?;
        let catalog = Self::from_config(config, &columns)?;
        info!(
            columns = columns.len(),
            fields = catalog.fields.len(),
            "field catalog ready"
        );
        Ok(catalog)
    }

    /// Table the catalog describes.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields in registration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Whether `key` is a recognized hard-filter key.
    pub fn is_filter_key(&self, key: &str) -> bool {
        self.filter_keys.contains_key(key)
    }

    /// Resolves a tag field to its tag expression.
    pub fn tag_expr(&self, name: &str) -> Option<TagExpr> {
        self.field(name)
            .filter(|f| f.is_tag_field())
            .and_then(|f| f.extraction.tag_expr())
    }

    /// Resolves a numeric field to its value expression.
    pub fn numeric_expr(&self, name: &str) -> Option<NumericExpr> {
        self.field(name)
            .filter(|f| f.is_numeric_field())
            .and_then(|f| f.extraction.numeric_expr())
    }

    /// Names of all tag fields in registration order.
    pub fn tag_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.is_tag_field())
            .map(|f| f.name.clone())
            .collect()
    }

    /// Names of all numeric fields in registration order.
    pub fn numeric_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.is_numeric_field())
            .map(|f| f.name.clone())
            .collect()
    }

    /// Describes what callers can filter and aggregate on.
    pub fn list_attributes(&self) -> AttributeListing {
        let hard_filter_keys = self
            .fields
            .iter()
            .flat_map(|f| f.filter_keys())
            .map(|(key, tag)| (key, tag.to_string()))
            .collect();

        let used: HashSet<&str> = self
            .fields
            .iter()
            .flat_map(|f| f.extraction.columns())
            .collect();
        let extra_columns = self
            .discovered_columns
            .iter()
            .filter(|c| !used.contains(c.as_str()))
            .cloned()
            .collect();

        AttributeListing {
            hard_filter_keys,
            tag_fields: self.tag_fields(),
            numeric_fields: self.numeric_fields(),
            extra_columns,
        }
    }
}

fn validate_descriptor(field: &FieldDescriptor) -> Result<()> {
    if field.name.trim().is_empty() {
        return Err(EngineError::configuration("field name cannot be empty"));
    }
    for column in field.extraction.columns() {
        SqlSecurity::validate_column(column)?;
    }
    if let ExtractionRule::JsonArrayOfObjects { preferred_keys, .. } = &field.extraction {
        for key in preferred_keys {
            SqlSecurity::validate_column(key)?;
        }
    }
    if let ExtractionRule::CoalescedNumeric { columns } = &field.extraction {
        if columns.is_empty() {
            return Err(EngineError::configuration(format!(
                "field '{}' coalesces no columns",
                field.name
            )));
        }
    }

    let compatible = match field.kind {
        FieldKind::Numeric => field.extraction.numeric_expr().is_some(),
        FieldKind::Categorical => field.extraction.tag_expr().is_some(),
        FieldKind::GeoBbox => matches!(field.extraction, ExtractionRule::Coordinates { .. }),
        FieldKind::Flag => matches!(field.extraction, ExtractionRule::Direct { .. }),
    };
    if !compatible {
        return Err(EngineError::configuration(format!(
            "field '{}' of kind {:?} cannot use extraction rule {:?}",
            field.name, field.kind, field.extraction
        )));
    }

    if field.kind == FieldKind::Categorical
        && field.filter_key.is_some()
        && matches!(field.extraction, ExtractionRule::JsonArrayOfObjects { .. })
    {
        return Err(EngineError::configuration(format!(
            "field '{}' reads an array of objects and cannot be filtered on",
            field.name
        )));
    }
    if matches!(field.kind, FieldKind::GeoBbox | FieldKind::Flag) && field.aggregate {
        return Err(EngineError::configuration(format!(
            "field '{}' of kind {:?} cannot be aggregated",
            field.name, field.kind
        )));
    }

    Ok(())
}
