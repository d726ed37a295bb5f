//! In-memory implementation of [`QueryExecutor`] over JSON rows.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{bucket_index, BucketCount, QueryExecutor, RawNumericStats, TagCount};
use crate::catalog::{NumericExpr, TagExpr};
use crate::error::{EngineError, Result};
use crate::predicate::{Clause, Predicate};
use crate::value::StoreNumber;

/// Executor that evaluates predicates and aggregates directly over JSON rows.
///
/// Each row is a JSON object keyed by column name. Array columns may hold
/// either JSON arrays or JSON text encoding an array.
///
/// Useful for:
/// - Testing and development
/// - Small datasets that fit comfortably in memory
///
/// # Example
///
/// ```rust
/// use houm_insight::executor::{InMemoryExecutor, QueryExecutor};
/// use houm_insight::predicate::Predicate;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() {
/// let executor = InMemoryExecutor::new(
///     "listings",
///     vec![json!({"price": 2500000}), json!({"price": null})],
/// );
/// assert_eq!(executor.count(&Predicate::match_all()).await.unwrap(), 2);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryExecutor {
    table: String,
    id_column: Option<String>,
    rows: Arc<RwLock<Arc<Vec<Value>>>>,
}

impl InMemoryExecutor {
    /// Creates an executor serving `rows` as `table`.
    pub fn new(table: impl Into<String>, rows: Vec<Value>) -> Self {
        Self {
            table: table.into(),
            id_column: None,
            rows: Arc::new(RwLock::new(Arc::new(rows))),
        }
    }

    /// Identifies items by `column` when counting distinct items per tag.
    /// Without it, each row is its own item.
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    /// Replaces the dataset. Snapshots taken earlier keep the old rows.
    pub async fn replace_rows(&self, rows: Vec<Value>) {
        *self.rows.write().await = Arc::new(rows);
    }

    /// Returns the number of rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn current(&self) -> Arc<Vec<Value>> {
        Arc::clone(&*self.rows.read().await)
    }

    /// Matching values as store numbers paired with their report form.
    async fn numeric_values(
        &self,
        expr: &NumericExpr,
        predicate: &Predicate,
    ) -> Vec<(StoreNumber, f64)> {
        let rows = self.current().await;
        rows.iter()
            .filter(|row| row_matches(row, predicate))
            .filter_map(|row| eval_store_number(row, expr))
            .filter_map(|number| number.to_report().map(|v| (number, v)))
            .collect()
    }

    fn item_id(&self, index: usize, row: &Value) -> String {
        match self.id_column.as_deref().and_then(|c| cell(row, c)) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("#{index}"),
        }
    }
}

#[async_trait]
impl QueryExecutor for InMemoryExecutor {
    async fn snapshot(&self) -> Result<Arc<dyn QueryExecutor>> {
        let rows = self.current().await;
        Ok(Arc::new(Self {
            table: self.table.clone(),
            id_column: self.id_column.clone(),
            rows: Arc::new(RwLock::new(rows)),
        }))
    }

    #[instrument(
        skip(self, predicate),
        fields(executor = "in_memory", clauses = predicate.clauses().len())
    )]
    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let rows = self.current().await;
        let count = rows.iter().filter(|row| row_matches(row, predicate)).count();
        Ok(count as u64)
    }

    #[instrument(skip(self, tag, predicate), fields(executor = "in_memory"))]
    async fn grouped_count_distinct(
        &self,
        tag: &TagExpr,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<TagCount>> {
        let rows = self.current().await;
        let mut items_per_tag: HashMap<String, HashSet<String>> = HashMap::new();
        for (index, row) in rows.iter().enumerate() {
            if !row_matches(row, predicate) {
                continue;
            }
            let tags = extract_tags(row, tag);
            if tags.is_empty() {
                continue;
            }
            let id = self.item_id(index, row);
            for value in tags {
                items_per_tag.entry(value).or_default().insert(id.clone());
            }
        }

        let mut counts: Vec<TagCount> = items_per_tag
            .into_iter()
            .map(|(tag, items)| TagCount {
                tag,
                count: items.len() as u64,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        counts.truncate(limit);

        debug!(tags = counts.len(), "grouped tag counts");
        Ok(counts)
    }

    #[instrument(skip(self, expr, predicate), fields(executor = "in_memory"))]
    async fn numeric_stats(
        &self,
        expr: &NumericExpr,
        predicate: &Predicate,
    ) -> Result<RawNumericStats> {
        let mut numbers = self.numeric_values(expr, predicate).await;
        numbers.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (Some(&(min, _)), Some(&(max, _))) = (numbers.first(), numbers.last()) else {
            return Ok(RawNumericStats::default());
        };
        let values: Vec<f64> = numbers.iter().map(|(_, v)| *v).collect();

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let float = |v: f64| Some(StoreNumber::Float(v));

        // Extremes keep the store's representation; derived statistics are floats.
        Ok(RawNumericStats {
            count: count as u64,
            min: Some(min),
            max: Some(max),
            mean: float(mean),
            p50: float(percentile_cont(&values, 0.5)),
            p90: float(percentile_cont(&values, 0.9)),
        })
    }

    #[instrument(skip(self, expr, predicate), fields(executor = "in_memory"))]
    async fn histogram(
        &self,
        expr: &NumericExpr,
        predicate: &Predicate,
        min: f64,
        max: f64,
        bins: usize,
    ) -> Result<Vec<BucketCount>> {
        let mut counts = vec![0u64; bins];
        for (_, value) in self.numeric_values(expr, predicate).await {
            if let Some(index) = bucket_index(value, min, max, bins) {
                counts[index] += 1;
            }
        }
        Ok(counts
            .into_iter()
            .enumerate()
            .filter(|(_, count)| *count > 0)
            .map(|(bucket_index, count)| BucketCount {
                bucket_index,
                count,
            })
            .collect())
    }

    async fn list_columns(&self, table: &str) -> Result<BTreeSet<String>> {
        if table != self.table {
            return Err(EngineError::backend(
                "list_columns",
                format!("unknown table '{table}'"),
            ));
        }
        let rows = self.current().await;
        Ok(rows
            .iter()
            .filter_map(Value::as_object)
            .flat_map(Map::keys)
            .cloned()
            .collect())
    }
}

fn cell<'a>(row: &'a Value, column: &str) -> Option<&'a Value> {
    row.get(column).filter(|v| !v.is_null())
}

fn row_matches(row: &Value, predicate: &Predicate) -> bool {
    predicate.clauses().iter().all(|clause| clause_matches(row, clause))
}

fn clause_matches(row: &Value, clause: &Clause) -> bool {
    match clause {
        Clause::Range {
            expr, bound, value, ..
        } => eval_numeric(row, expr).is_some_and(|v| bound.admits(v, *value)),
        Clause::Membership { column, values, .. } => {
            cell_text(cell(row, column)).is_some_and(|text| values.contains(&text))
        }
        Clause::ArrayIntersects { column, values, .. } => array_items(cell(row, column))
            .iter()
            .filter_map(|item| item.as_str())
            .any(|item| values.iter().any(|v| v == item)),
        Clause::NotNull { column, .. } => cell(row, column).is_some(),
        Clause::Flag { column, value, .. } => cell_flag(cell(row, column)) == Some(*value),
    }
}

fn eval_numeric(row: &Value, expr: &NumericExpr) -> Option<f64> {
    eval_store_number(row, expr).and_then(StoreNumber::to_report)
}

/// Evaluates a numeric expression; unparseable cells are null.
fn eval_store_number(row: &Value, expr: &NumericExpr) -> Option<StoreNumber> {
    match expr {
        NumericExpr::Column(column) => cell_number(cell(row, column)),
        NumericExpr::FourDigitYear(column) => {
            let text = cell_text(cell(row, column))?;
            let is_year = text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit());
            if is_year {
                text.parse::<i64>().ok().map(StoreNumber::Integer)
            } else {
                None
            }
        }
        NumericExpr::Coalesce(columns) => columns
            .iter()
            .find_map(|column| cell_number(cell(row, column))),
    }
}

fn cell_number(value: Option<&Value>) -> Option<StoreNumber> {
    value
        .and_then(StoreNumber::from_json)
        .filter(|number| number.to_report().is_some())
}

fn cell_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn cell_flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Array cell contents. JSON text is parsed; anything else is empty.
fn array_items(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn extract_tags(row: &Value, tag: &TagExpr) -> Vec<String> {
    let tags: Vec<String> = match tag {
        TagExpr::Column(column) => cell_text(cell(row, column)).into_iter().collect(),
        TagExpr::StringArray(column) => array_items(cell(row, column))
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        TagExpr::ObjectArray {
            column,
            preferred_keys,
        } => array_items(cell(row, column))
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| object_tag(item, preferred_keys))
            .collect(),
    };
    tags.into_iter().filter(|t| !t.is_empty()).collect()
}

/// The first present preferred key, falling back to the item's string form.
fn object_tag(item: &Value, preferred_keys: &[String]) -> String {
    let preferred = preferred_keys
        .iter()
        .find_map(|key| item.get(key).filter(|v| !v.is_null()));
    match preferred.unwrap_or(item) {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Continuous percentile with linear interpolation over sorted `values`.
fn percentile_cont(sorted: &[f64], quantile: f64) -> f64 {
    let position = quantile * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
