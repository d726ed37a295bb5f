//! Query execution backends.
//!
//! The estimator never reads rows itself. It issues a small set of aggregate
//! queries through [`QueryExecutor`]:
//!
//! - [`DataFusionExecutor`] renders each query to SQL and runs it against a
//!   table registered in a DataFusion `SessionContext`.
//! - [`InMemoryExecutor`] evaluates the same queries over JSON rows, for tests
//!   and small datasets.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use crate::catalog::{NumericExpr, TagExpr};
use crate::error::Result;
use crate::predicate::Predicate;
use crate::value::StoreNumber;

pub mod datafusion_executor;
pub mod in_memory;

pub use datafusion_executor::DataFusionExecutor;
pub use in_memory::InMemoryExecutor;

/// Number of distinct items carrying a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

/// Summary statistics over the non-null values of a numeric expression.
///
/// All statistics are `None` when `count == 0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawNumericStats {
    pub count: u64,
    pub min: Option<StoreNumber>,
    pub max: Option<StoreNumber>,
    pub mean: Option<StoreNumber>,
    pub p50: Option<StoreNumber>,
    pub p90: Option<StoreNumber>,
}

/// Row count of one histogram bucket. Empty buckets may be omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub bucket_index: usize,
    pub count: u64,
}

/// Aggregate query interface over the listings dataset.
///
/// Implementations must be cheap to share across tasks. Every method reads;
/// none mutates the dataset.
#[async_trait]
pub trait QueryExecutor: Send + Sync + Debug {
    /// Returns an executor pinned to the current state of the dataset.
    ///
    /// All aggregates of one estimation run against the same snapshot.
    async fn snapshot(&self) -> Result<Arc<dyn QueryExecutor>>;

    /// Counts rows matching `predicate`.
    async fn count(&self, predicate: &Predicate) -> Result<u64>;

    /// Counts distinct items per tag over rows matching `predicate`.
    ///
    /// Results are ordered by count descending, then tag ascending, and
    /// truncated to `limit`. Null and empty tags are not counted.
    async fn grouped_count_distinct(
        &self,
        tag: &TagExpr,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<TagCount>>;

    /// Computes count, min, max, mean, p50 and p90 of `expr` over matching rows.
    async fn numeric_stats(&self, expr: &NumericExpr, predicate: &Predicate)
        -> Result<RawNumericStats>;

    /// Counts matching rows per equal-width bucket over `[min, max]`.
    ///
    /// Values equal to `max` fall into the last bucket; values outside the
    /// range are not counted. Results are ordered by bucket index.
    async fn histogram(
        &self,
        expr: &NumericExpr,
        predicate: &Predicate,
        min: f64,
        max: f64,
        bins: usize,
    ) -> Result<Vec<BucketCount>>;

    /// Lists the columns of `table`.
    async fn list_columns(&self, table: &str) -> Result<BTreeSet<String>>;
}

/// Bucket index for `value` over `bins` equal-width buckets spanning
/// `[min, max]`, or `None` when `value` is out of range.
pub(crate) fn bucket_index(value: f64, min: f64, max: f64, bins: usize) -> Option<usize> {
    if bins == 0 || min.is_nan() || max.is_nan() || min >= max || value < min || value > max {
        return None;
    }
    if value >= max {
        return Some(bins - 1);
    }
    let width = (max - min) / bins as f64;
    let index = ((value - min) / width).floor() as usize;
    Some(index.min(bins - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0.0, 0.0, 10.0, 5), Some(0));
        assert_eq!(bucket_index(1.99, 0.0, 10.0, 5), Some(0));
        assert_eq!(bucket_index(2.0, 0.0, 10.0, 5), Some(1));
        assert_eq!(bucket_index(10.0, 0.0, 10.0, 5), Some(4));
        assert_eq!(bucket_index(10.5, 0.0, 10.0, 5), None);
        assert_eq!(bucket_index(-1.0, 0.0, 10.0, 5), None);
        assert_eq!(bucket_index(5.0, 5.0, 5.0, 5), None);
    }
}
