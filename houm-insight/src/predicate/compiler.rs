//! FilterSpec to Predicate compilation.
//!
//! Compilation never fails. A value that cannot be coerced for its key drops
//! that key (and only that key) with a warning; keys the catalog does not know
//! are ignored.

use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

use super::{Clause, FilterSpec, Predicate, RangeBound};
use crate::catalog::{
    ExtractionRule, FieldCatalog, FieldDescriptor, FieldKind, NumericExpr, TagExpr,
};
use crate::value::StoreNumber;

/// Compiles `spec` into a predicate over `catalog`.
///
/// Clauses are emitted in catalog registration order, so compiling the same
/// filters twice yields equal predicates.
///
/// ```rust
/// use houm_insight::catalog::{CatalogConfig, FieldCatalog};
/// use houm_insight::predicate::{compile, FilterSpec};
/// use serde_json::json;
/// use std::collections::BTreeSet;
///
/// let catalog = FieldCatalog::from_config(CatalogConfig::listings(), &BTreeSet::new()).unwrap();
/// let spec = FilterSpec::new()
///     .with("min_price", 2_000_000)
///     .with("municipalities", json!(["Stockholm", "Solna"]))
///     .with("not_a_filter", 1);
///
/// let predicate = compile(&spec, &catalog);
/// assert_eq!(predicate.clauses().len(), 2);
/// assert!(compile(&FilterSpec::new(), &catalog).is_match_all());
/// ```
#[instrument(skip_all, fields(keys = spec.len()))]
pub fn compile(spec: &FilterSpec, catalog: &FieldCatalog) -> Predicate {
    let mut clauses = Vec::new();

    for field in catalog.fields() {
        let Some(key) = field.filter_key.as_deref() else {
            continue;
        };
        match field.kind {
            FieldKind::Numeric => compile_numeric(spec, field, key, &mut clauses),
            FieldKind::Categorical => compile_categorical(spec, field, key, &mut clauses),
            FieldKind::GeoBbox => compile_bbox(spec, field, key, &mut clauses),
            FieldKind::Flag => compile_flag(spec, field, key, &mut clauses),
        }
    }

    for key in spec.keys().filter(|k| !catalog.is_filter_key(k)) {
        debug!(key, "ignoring unknown filter key");
    }

    debug!(clauses = clauses.len(), "compiled predicate");
    Predicate::from_clauses(clauses)
}

fn compile_numeric(spec: &FilterSpec, field: &FieldDescriptor, key: &str, out: &mut Vec<Clause>) {
    let Some(expr) = field.extraction.numeric_expr() else {
        return;
    };
    for (bound, filter_key) in [
        (RangeBound::AtLeast, format!("min_{key}")),
        (RangeBound::AtMost, format!("max_{key}")),
    ] {
        let Some(raw) = spec.get(&filter_key) else {
            continue;
        };
        match coerce_number(raw) {
            Some(value) => out.push(Clause::Range {
                field: field.name.clone(),
                expr: expr.clone(),
                bound,
                value,
            }),
            None => dropped(&filter_key, raw, "expected a finite number"),
        }
    }
}

fn compile_categorical(
    spec: &FilterSpec,
    field: &FieldDescriptor,
    key: &str,
    out: &mut Vec<Clause>,
) {
    let Some(raw) = spec.get(key) else {
        return;
    };
    let values = coerce_string_set(raw);
    if values.is_empty() {
        dropped(key, raw, "expected a non-empty list of strings");
        return;
    }

    match field.extraction.tag_expr() {
        Some(TagExpr::Column(column)) => out.push(Clause::Membership {
            field: field.name.clone(),
            column,
            values,
        }),
        Some(TagExpr::StringArray(column)) => out.push(Clause::ArrayIntersects {
            field: field.name.clone(),
            column,
            values,
        }),
        // The catalog refuses filter keys on object arrays.
        Some(TagExpr::ObjectArray { .. }) | None => {}
    }
}

fn compile_bbox(spec: &FilterSpec, field: &FieldDescriptor, key: &str, out: &mut Vec<Clause>) {
    let ExtractionRule::Coordinates {
        longitude,
        latitude,
    } = &field.extraction
    else {
        return;
    };
    let Some(raw) = spec.get(key) else {
        return;
    };
    let Some([min_lng, min_lat, max_lng, max_lat]) = coerce_bbox(raw) else {
        dropped(key, raw, "expected [min_lng, min_lat, max_lng, max_lat]");
        return;
    };

    let range = |column: &str, bound, value| Clause::Range {
        field: field.name.clone(),
        expr: NumericExpr::Column(column.to_string()),
        bound,
        value,
    };
    out.extend([
        Clause::NotNull {
            field: field.name.clone(),
            column: longitude.clone(),
        },
        Clause::NotNull {
            field: field.name.clone(),
            column: latitude.clone(),
        },
        range(longitude, RangeBound::AtLeast, min_lng),
        range(longitude, RangeBound::AtMost, max_lng),
        range(latitude, RangeBound::AtLeast, min_lat),
        range(latitude, RangeBound::AtMost, max_lat),
    ]);
}

fn compile_flag(spec: &FilterSpec, field: &FieldDescriptor, key: &str, out: &mut Vec<Clause>) {
    let ExtractionRule::Direct { column } = &field.extraction else {
        return;
    };
    match spec.get(key) {
        Some(Value::Bool(true)) => out.push(Clause::Flag {
            field: field.name.clone(),
            column: column.clone(),
            value: true,
        }),
        Some(Value::Bool(false)) | Some(Value::Null) | None => {}
        Some(raw) => dropped(key, raw, "expected a boolean"),
    }
}

fn dropped(key: &str, raw: &Value, reason: &str) {
    warn!(key, value = %raw, reason, "dropping malformed filter value");
}

/// JSON number or numeric text, finite.
pub(crate) fn coerce_number(raw: &Value) -> Option<f64> {
    StoreNumber::from_json(raw).and_then(StoreNumber::to_report)
}

/// A list of strings (or a lone string), trimmed, empties and non-strings
/// skipped, duplicates removed keeping first occurrence.
pub(crate) fn coerce_string_set(raw: &Value) -> Vec<String> {
    let candidates: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        Value::String(_) => vec![raw],
        _ => return Vec::new(),
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(*s))
        .map(str::to_string)
        .collect()
}

/// Exactly four finite numbers, as a JSON array or `"a,b,c,d"` text.
pub(crate) fn coerce_bbox(raw: &Value) -> Option<[f64; 4]> {
    let numbers: Vec<f64> = match raw {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_f64().filter(|n| n.is_finite()))
            .collect::<Option<_>>()?,
        Value::String(text) => text
            .split(',')
            .map(|part| part.trim().parse::<f64>().ok().filter(|n| n.is_finite()))
            .collect::<Option<_>>()?,
        _ => return None,
    };
    numbers.try_into().ok()
}
