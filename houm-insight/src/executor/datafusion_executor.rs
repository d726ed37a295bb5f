//! DataFusion-backed query executor.
//!
//! Every aggregate is rendered through [`SqlWriter`] and executed with
//! `SessionContext::sql` plus bound parameter values, so caller-supplied
//! filter values never appear in SQL text.

use async_trait::async_trait;
use datafusion::arrow::datatypes::{DataType, Fields};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::datasource::TableProvider;
use datafusion::execution::context::SessionConfig;
use datafusion::prelude::SessionContext;
use datafusion::scalar::ScalarValue;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{BucketCount, QueryExecutor, RawNumericStats, TagCount};
use crate::catalog::{NumericExpr, TagExpr};
use crate::error::{EngineError, ErrorContext, Result};
use crate::log_sql;
use crate::logging::{truncate_field, LogConfig};
use crate::predicate::sql::{SqlFragment, SqlWriter};
use crate::predicate::{Param, Predicate};
use crate::security::SqlSecurity;
use crate::value::StoreNumber;

impl From<&Param> for ScalarValue {
    fn from(param: &Param) -> Self {
        match param {
            Param::Number(v) => ScalarValue::Float64(Some(*v)),
            Param::Text(s) => ScalarValue::Utf8(Some(s.clone())),
            Param::Bool(b) => ScalarValue::Boolean(Some(*b)),
        }
    }
}

/// Query executor over a table registered in a DataFusion session.
///
/// # Example
///
/// ```rust,no_run
/// use houm_insight::executor::DataFusionExecutor;
/// use datafusion::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ctx = DataFusionExecutor::create_context();
/// ctx.register_parquet("listings", "data/listings.parquet", ParquetReadOptions::default())
///     .await?;
/// let executor = DataFusionExecutor::new(ctx, "listings", Some("hemnet_id".to_string()))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DataFusionExecutor {
    ctx: SessionContext,
    table: String,
    id_column: Option<String>,
    log: LogConfig,
}

impl fmt::Debug for DataFusionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFusionExecutor")
            .field("session_id", &self.ctx.session_id())
            .field("table", &self.table)
            .field("id_column", &self.id_column)
            .finish()
    }
}

impl DataFusionExecutor {
    /// Creates a session context tuned for analytical aggregates.
    pub fn create_context() -> SessionContext {
        let config = SessionConfig::new()
            .with_information_schema(true)
            .with_target_partitions(num_cpus::get())
            .with_batch_size(8192);

        SessionContext::new_with_config(config)
    }

    /// Wraps a context in which `table` is already registered.
    ///
    /// `id_column` identifies items for distinct tag counts; without it each
    /// row counts as its own item.
    pub fn new(
        ctx: SessionContext,
        table: impl Into<String>,
        id_column: Option<String>,
    ) -> Result<Self> {
        let table = table.into();
        SqlSecurity::validate_identifier(&table)?;
        if let Some(column) = &id_column {
            SqlSecurity::validate_column(column)?;
        }
        Ok(Self {
            ctx,
            table,
            id_column,
            log: LogConfig::default(),
        })
    }

    /// Registers `provider` as `table` in a fresh context.
    pub fn from_provider(
        table: impl Into<String>,
        provider: Arc<dyn TableProvider>,
        id_column: Option<String>,
    ) -> Result<Self> {
        let table = table.into();
        let ctx = Self::create_context();
        ctx.register_table(table.as_str(), provider)
            .context("register_table")?;
        Self::new(ctx, table, id_column)
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// The underlying session.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    async fn provider(&self, table: &str, operation: &str) -> Result<Arc<dyn TableProvider>> {
        self.ctx
            .table_provider(table)
            .await
            .map_err(|e| {
                EngineError::backend_with_source(
                    operation,
                    format!("table '{table}' is not available"),
                    Box::new(e),
                )
            })
    }

    async fn run(&self, operation: &str, fragment: SqlFragment) -> Result<Vec<RecordBatch>> {
        log_sql!(
            self.log,
            operation,
            sql = %truncate_field(&fragment.sql, self.log.max_field_length),
            params = fragment.params.len(),
            "executing aggregate query"
        );

        let df = self.ctx.sql(&fragment.sql).await.context(operation)?;
        let df = if fragment.params.is_empty() {
            df
        } else {
            let values: Vec<ScalarValue> = fragment.params.iter().map(ScalarValue::from).collect();
            df.with_param_values(values).context(operation)?
        };
        df.collect().await.context(operation)
    }

    fn from_clause(&self, writer: &mut SqlWriter, predicate: &Predicate) -> Result<()> {
        writer.sql(" FROM ");
        writer.identifier(&self.table)?;
        writer.sql(" WHERE ");
        writer.predicate(predicate)
    }

    /// `SELECT <expr> AS v FROM <table> WHERE <predicate>` with nulls removed.
    fn push_values(
        &self,
        writer: &mut SqlWriter,
        expr: &NumericExpr,
        raw: Option<&str>,
        predicate: &Predicate,
    ) -> Result<()> {
        writer.sql("(SELECT ");
        writer.numeric_expr(expr)?;
        writer.sql(" AS v");
        if let Some(column) = raw {
            writer.sql(", ");
            writer.identifier(column)?;
            writer.sql(" AS raw");
        }
        self.from_clause(writer, predicate)?;
        writer.sql(") AS vals WHERE v IS NOT NULL");
        Ok(())
    }

    /// The column `expr` reads when it is stored as a native number.
    async fn native_column<'a>(&self, expr: &'a NumericExpr) -> Result<Option<&'a str>> {
        let column = match expr {
            NumericExpr::Column(column) => column,
            NumericExpr::Coalesce(columns) if columns.len() == 1 => &columns[0],
            _ => return Ok(None),
        };
        let schema = self.provider(&self.table, "numeric_stats").await?.schema();
        let native = schema.field_with_name(column).is_ok_and(|field| {
            matches!(
                field.data_type(),
                DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64
                    | DataType::Float32
                    | DataType::Float64
                    | DataType::Decimal128(_, _)
            )
        });
        Ok(native.then_some(column.as_str()))
    }

    /// Element type of a list column.
    async fn element_type(&self, column: &str) -> Result<DataType> {
        let schema = self
            .provider(&self.table, "grouped_count_distinct")
            .await?
            .schema();
        let field = schema
            .field_with_name(column)
            .context("grouped_count_distinct")?;
        match field.data_type() {
            DataType::List(inner) | DataType::LargeList(inner) | DataType::ListView(inner) => {
                Ok(inner.data_type().clone())
            }
            other => Err(EngineError::backend(
                "grouped_count_distinct",
                format!("column '{column}' is not a list (found {other})"),
            )),
        }
    }

    async fn tag_query(
        &self,
        tag: &TagExpr,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<SqlFragment> {
        let (column, element) = match tag {
            TagExpr::Column(column) => (column, "raw"),
            TagExpr::StringArray(column) | TagExpr::ObjectArray { column, .. } => {
                (column, "unnest(raw)")
            }
        };

        let tag_sql = match tag {
            TagExpr::ObjectArray { preferred_keys, .. } => match self.element_type(column).await? {
                DataType::Struct(fields) => object_tag_sql(&fields, preferred_keys)?,
                _ => "CAST(element AS VARCHAR)".to_string(),
            },
            TagExpr::Column(_) | TagExpr::StringArray(_) => "CAST(element AS VARCHAR)".to_string(),
        };

        let mut w = SqlWriter::new();
        w.sql(format!(
            "SELECT tag, COUNT(DISTINCT item_id) AS n FROM (SELECT item_id, {tag_sql} AS tag FROM \
             (SELECT item_id, {element} AS element FROM (SELECT "
        ));
        match &self.id_column {
            Some(id) => w.identifier(id)?,
            None => w.sql("ROW_NUMBER() OVER ()"),
        }
        w.sql(" AS item_id, ");
        w.identifier(column)?;
        w.sql(" AS raw");
        self.from_clause(&mut w, predicate)?;
        w.sql(") AS base) AS elements) AS tags WHERE tag IS NOT NULL AND tag <> ''");
        w.sql(format!(" GROUP BY tag ORDER BY n DESC, tag ASC LIMIT {limit}"));
        Ok(w.build())
    }
}

/// First non-null preferred key of a struct element, falling back to the
/// element's JSON form.
fn object_tag_sql(fields: &Fields, preferred_keys: &[String]) -> Result<String> {
    let mut candidates = Vec::new();
    for key in preferred_keys {
        if fields.iter().any(|f| f.name() == key) {
            let literal = SqlSecurity::quote_key_literal(key)?;
            candidates.push(format!("CAST(get_field(element, {literal}) AS VARCHAR)"));
        }
    }
    candidates.push(struct_json_sql(fields));
    Ok(format!("COALESCE({})", candidates.join(", ")))
}

/// Renders a struct element as compact JSON with keys in sorted order and
/// null members omitted, the way a JSON object cell prints.
fn struct_json_sql(fields: &Fields) -> String {
    let mut members: Vec<_> = fields
        .iter()
        .filter(|f| !f.data_type().is_nested() && SqlSecurity::validate_column(f.name()).is_ok())
        .collect();
    if members.is_empty() {
        return "CAST(NULL AS VARCHAR)".to_string();
    }
    members.sort_by(|a, b| a.name().cmp(b.name()));

    let rendered: Vec<String> = members
        .iter()
        .map(|f| {
            let name = f.name();
            let value = format!("get_field(element, '{name}')");
            let text = format!("CAST({value} AS VARCHAR)");
            let json = if f.data_type().is_numeric() || *f.data_type() == DataType::Boolean {
                text
            } else {
                format!(r#"'"' || replace(replace({text}, '\', '\\'), '"', '\"') || '"'"#)
            };
            format!(r#"'"{name}":' || {json}"#)
        })
        .collect();
    format!(
        "CASE WHEN element IS NULL THEN NULL ELSE '{{' || concat_ws(',', {}) || '}}' END",
        rendered.join(", ")
    )
}

#[async_trait]
impl QueryExecutor for DataFusionExecutor {
    #[instrument(skip(self), fields(executor = "datafusion", table = %self.table))]
    async fn snapshot(&self) -> Result<Arc<dyn QueryExecutor>> {
        let provider = self.provider(&self.table, "snapshot").await?;
        // Shares the runtime so registered object stores stay reachable.
        let ctx =
            SessionContext::new_with_config_rt(self.ctx.copied_config(), self.ctx.runtime_env());
        ctx.register_table(self.table.as_str(), provider)
            .context("snapshot")?;
        Ok(Arc::new(Self {
            ctx,
            table: self.table.clone(),
            id_column: self.id_column.clone(),
            log: self.log.clone(),
        }))
    }

    #[instrument(
        skip(self, predicate),
        fields(executor = "datafusion", clauses = predicate.clauses().len())
    )]
    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let mut w = SqlWriter::new();
        w.sql("SELECT COUNT(*) AS n");
        self.from_clause(&mut w, predicate)?;

        let batches = self.run("count", w.build()).await?;
        let count = first_row(&batches)
            .map(|(batch, row)| scalar(batch, 0, row))
            .transpose()?
            .and_then(|v| to_u64(&v))
            .unwrap_or(0);
        Ok(count)
    }

    #[instrument(skip(self, tag, predicate), fields(executor = "datafusion"))]
    async fn grouped_count_distinct(
        &self,
        tag: &TagExpr,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<TagCount>> {
        let fragment = self.tag_query(tag, predicate, limit).await?;
        let batches = self.run("grouped_count_distinct", fragment).await?;

        let mut counts = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let tag = to_text(&scalar(batch, 0, row)?);
                let count = to_u64(&scalar(batch, 1, row)?);
                if let (Some(tag), Some(count)) = (tag, count) {
                    counts.push(TagCount { tag, count });
                }
            }
        }
        debug!(tags = counts.len(), "grouped tag counts");
        Ok(counts)
    }

    #[instrument(skip(self, expr, predicate), fields(executor = "datafusion"))]
    async fn numeric_stats(
        &self,
        expr: &NumericExpr,
        predicate: &Predicate,
    ) -> Result<RawNumericStats> {
        // Native columns aggregate uncast so decimals and integers keep their scale.
        let raw = self.native_column(expr).await?;
        let source = if raw.is_some() { "raw" } else { "v" };
        let mut w = SqlWriter::new();
        w.sql(format!(
            "SELECT COUNT(v) AS n, MIN({source}) AS min_v, MAX({source}) AS max_v, \
             AVG({source}) AS mean_v, \
             APPROX_PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY v) AS p50, \
             APPROX_PERCENTILE_CONT(0.9) WITHIN GROUP (ORDER BY v) AS p90 FROM ",
        ));
        self.push_values(&mut w, expr, raw, predicate)?;

        let batches = self.run("numeric_stats", w.build()).await?;
        let Some((batch, row)) = first_row(&batches) else {
            return Ok(RawNumericStats::default());
        };
        let count = to_u64(&scalar(batch, 0, row)?).unwrap_or(0);
        if count == 0 {
            return Ok(RawNumericStats::default());
        }
        Ok(RawNumericStats {
            count,
            min: to_number(&scalar(batch, 1, row)?),
            max: to_number(&scalar(batch, 2, row)?),
            mean: to_number(&scalar(batch, 3, row)?),
            p50: to_number(&scalar(batch, 4, row)?),
            p90: to_number(&scalar(batch, 5, row)?),
        })
    }

    #[instrument(skip(self, expr, predicate), fields(executor = "datafusion"))]
    async fn histogram(
        &self,
        expr: &NumericExpr,
        predicate: &Predicate,
        min: f64,
        max: f64,
        bins: usize,
    ) -> Result<Vec<BucketCount>> {
        if bins == 0 || min.is_nan() || max.is_nan() || min >= max {
            return Ok(Vec::new());
        }
        let width = (max - min) / bins as f64;
        let last = bins - 1;

        let mut w = SqlWriter::new();
        w.sql("SELECT bucket, COUNT(*) AS n FROM (SELECT CASE WHEN v >= ");
        w.param(Param::Number(max));
        w.sql(format!(" THEN {last} ELSE CAST(FLOOR((v - "));
        w.param(Param::Number(min));
        w.sql(") / ");
        w.param(Param::Number(width));
        w.sql(") AS BIGINT) END AS bucket FROM ");
        self.push_values(&mut w, expr, None, predicate)?;
        w.sql(" AND v >= ");
        w.param(Param::Number(min));
        w.sql(" AND v <= ");
        w.param(Param::Number(max));
        w.sql(") AS buckets GROUP BY bucket ORDER BY bucket");

        let batches = self.run("histogram", w.build()).await?;
        let mut buckets: Vec<BucketCount> = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let index = to_number(&scalar(batch, 0, row)?).and_then(StoreNumber::to_report);
                let count = to_u64(&scalar(batch, 1, row)?).unwrap_or(0);
                let Some(index) = index.filter(|i| *i >= 0.0) else {
                    continue;
                };
                let bucket_index = (index as usize).min(last);
                match buckets.last_mut() {
                    Some(prev) if prev.bucket_index == bucket_index => prev.count += count,
                    _ => buckets.push(BucketCount {
                        bucket_index,
                        count,
                    }),
                }
            }
        }
        Ok(buckets)
    }

    #[instrument(skip(self), fields(executor = "datafusion"))]
    async fn list_columns(&self, table: &str) -> Result<BTreeSet<String>> {
        let schema = self.provider(table, "list_columns").await?.schema();
        Ok(schema.fields().iter().map(|f| f.name().clone()).collect())
    }
}

fn first_row(batches: &[RecordBatch]) -> Option<(&RecordBatch, usize)> {
    batches.iter().find(|b| b.num_rows() > 0).map(|b| (b, 0))
}

fn scalar(batch: &RecordBatch, column: usize, row: usize) -> Result<ScalarValue> {
    Ok(ScalarValue::try_from_array(batch.column(column).as_ref(), row)?)
}

fn to_u64(value: &ScalarValue) -> Option<u64> {
    match value {
        ScalarValue::Int64(Some(v)) => u64::try_from(*v).ok(),
        ScalarValue::Int32(Some(v)) => u64::try_from(*v).ok(),
        ScalarValue::UInt64(Some(v)) => Some(*v),
        ScalarValue::UInt32(Some(v)) => Some(u64::from(*v)),
        _ => None,
    }
}

fn to_number(value: &ScalarValue) -> Option<StoreNumber> {
    match value {
        ScalarValue::Int8(Some(v)) => Some(StoreNumber::Integer(i64::from(*v))),
        ScalarValue::Int16(Some(v)) => Some(StoreNumber::Integer(i64::from(*v))),
        ScalarValue::Int32(Some(v)) => Some(StoreNumber::Integer(i64::from(*v))),
        ScalarValue::Int64(Some(v)) => Some(StoreNumber::Integer(*v)),
        ScalarValue::UInt8(Some(v)) => Some(StoreNumber::Unsigned(u64::from(*v))),
        ScalarValue::UInt16(Some(v)) => Some(StoreNumber::Unsigned(u64::from(*v))),
        ScalarValue::UInt32(Some(v)) => Some(StoreNumber::Unsigned(u64::from(*v))),
        ScalarValue::UInt64(Some(v)) => Some(StoreNumber::Unsigned(*v)),
        ScalarValue::Float32(Some(v)) => Some(StoreNumber::Float(f64::from(*v))),
        ScalarValue::Float64(Some(v)) => Some(StoreNumber::Float(*v)),
        ScalarValue::Decimal128(Some(v), _, scale) => Some(StoreNumber::Decimal {
            unscaled: *v,
            scale: *scale,
        }),
        _ => None,
    }
}

fn to_text(value: &ScalarValue) -> Option<String> {
    match value {
        ScalarValue::Utf8(v) | ScalarValue::LargeUtf8(v) | ScalarValue::Utf8View(v) => v.clone(),
        other if other.is_null() => None,
        other => Some(other.to_string()),
    }
}
