//! Distribution estimation.
//!
//! [`estimate`] compares the population matching a request's hard filters
//! with the whole dataset: row counts, top tags per tag field and value
//! distributions per numeric field. No rows are materialized; everything is
//! computed from aggregate queries issued through one pinned executor
//! snapshot.

pub mod report;

pub use report::{
    DistributionReport, FieldError, FieldOutcome, HistogramBucket, NumericSummary, TagObservation,
    TagPrevalence,
};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use crate::catalog::FieldCatalog;
use crate::error::Result;
use crate::executor::{BucketCount, QueryExecutor, RawNumericStats, TagCount};
use crate::predicate::{compile, FilterSpec, Predicate};
use crate::value::StoreNumber;

/// Accepted histogram bin counts.
pub const BINS_RANGE: RangeInclusive<usize> = 3..=20;
/// Accepted numbers of top tags per field.
pub const TAG_LIMIT_RANGE: RangeInclusive<usize> = 5..=50;
/// Bin count used when a request names none.
pub const DEFAULT_BINS: usize = 10;
/// Tag limit used when a request names none.
pub const DEFAULT_TAG_LIMIT: usize = 10;

/// Parameters of one estimation.
///
/// ```rust
/// use houm_insight::estimator::EstimateRequest;
/// use houm_insight::predicate::FilterSpec;
///
/// let request: EstimateRequest = serde_json::from_str(
///     r#"{"hard_filters": {"min_price": 2000000}, "numeric_fields": ["price"], "bins": 25}"#,
/// )
/// .unwrap();
/// assert_eq!(request.effective_bins(), 20);
/// assert_eq!(
///     request.hard_filters,
///     FilterSpec::new().with("min_price", 2000000)
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimateRequest {
    pub hard_filters: FilterSpec,
    /// Preferences counted on top of the hard filters. Never narrow the
    /// reported populations.
    pub soft_prefs: Option<FilterSpec>,
    /// Tag fields to report; all catalog tag fields when omitted.
    pub tag_fields: Option<Vec<String>>,
    /// Numeric fields to report; all catalog numeric fields when omitted.
    pub numeric_fields: Option<Vec<String>>,
    pub bins: Option<i64>,
    pub tag_limit: Option<i64>,
    /// Per-call time budget in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl EstimateRequest {
    pub fn new(hard_filters: FilterSpec) -> Self {
        Self {
            hard_filters,
            ..Self::default()
        }
    }

    pub fn with_soft_prefs(mut self, soft_prefs: FilterSpec) -> Self {
        self.soft_prefs = Some(soft_prefs);
        self
    }

    pub fn with_tag_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_numeric_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numeric_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_bins(mut self, bins: i64) -> Self {
        self.bins = Some(bins);
        self
    }

    pub fn with_tag_limit(mut self, tag_limit: i64) -> Self {
        self.tag_limit = Some(tag_limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Requested timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Bin count after defaulting and clamping to [`BINS_RANGE`].
    pub fn effective_bins(&self) -> usize {
        clamp(self.bins, DEFAULT_BINS, &BINS_RANGE)
    }

    /// Tag limit after defaulting and clamping to [`TAG_LIMIT_RANGE`].
    pub fn effective_tag_limit(&self) -> usize {
        clamp(self.tag_limit, DEFAULT_TAG_LIMIT, &TAG_LIMIT_RANGE)
    }
}

fn clamp(requested: Option<i64>, default: usize, range: &RangeInclusive<usize>) -> usize {
    let value = match requested {
        Some(v) if v <= 0 => *range.start(),
        Some(v) => usize::try_from(v).unwrap_or(*range.end()),
        None => default,
    };
    value.clamp(*range.start(), *range.end())
}

/// Computes the distribution report for `request`.
///
/// Fails only when a query fails; unknown fields become per-field markers
/// and malformed filter values are dropped by the compiler.
#[instrument(skip_all, fields(
    hard_keys = request.hard_filters.len(),
    soft = request.soft_prefs.is_some()
))]
pub async fn estimate(
    catalog: &FieldCatalog,
    executor: &dyn QueryExecutor,
    request: &EstimateRequest,
) -> Result<DistributionReport> {
    let started = Instant::now();
    let bins = request.effective_bins();
    let tag_limit = request.effective_tag_limit();

    let hard = compile(&request.hard_filters, catalog);
    let combined = request
        .soft_prefs
        .as_ref()
        .filter(|soft| !soft.is_empty())
        .map(|soft| hard.and(&compile(soft, catalog)));
    let everything = Predicate::match_all();

    let tag_fields = request
        .tag_fields
        .clone()
        .unwrap_or_else(|| catalog.tag_fields());
    let numeric_fields = request
        .numeric_fields
        .clone()
        .unwrap_or_else(|| catalog.numeric_fields());

    let snapshot = executor.snapshot().await?;
    let snapshot = snapshot.as_ref();

    let counts = async {
        futures::try_join!(
            snapshot.count(&everything),
            snapshot.count(&hard),
            async {
                match &combined {
                    Some(predicate) => snapshot.count(predicate).await.map(Some),
                    None => Ok(None),
                }
            }
        )
    };
    let tags = try_join_all(
        tag_fields
            .iter()
            .map(|name| tag_counts(catalog, snapshot, name, &hard, tag_limit)),
    );
    let numerics = try_join_all(
        numeric_fields
            .iter()
            .map(|name| numeric_summary(catalog, snapshot, name, &hard, bins)),
    );

    let ((total_count, filtered_count, soft_match_count), tags, numerics) =
        futures::try_join!(counts, tags, numerics)?;

    let tag_prevalence = tags
        .into_iter()
        .map(|(name, outcome)| {
            let outcome = match outcome {
                FieldOutcome::Ready((overall, filtered)) => FieldOutcome::Ready(TagPrevalence {
                    overall: observations(overall, total_count),
                    filtered: observations(filtered, filtered_count),
                }),
                FieldOutcome::Unsupported(marker) => FieldOutcome::Unsupported(marker),
            };
            (name, outcome)
        })
        .collect();

    let report = DistributionReport {
        total_count,
        filtered_count,
        soft_match_count,
        bins,
        tag_limit,
        tag_prevalence,
        numeric_distributions: numerics.into_iter().collect(),
    };

    info!(
        total = report.total_count,
        filtered = report.filtered_count,
        soft = ?report.soft_match_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "estimate complete"
    );
    Ok(report)
}

type RawTagCounts = (Vec<TagCount>, Vec<TagCount>);

async fn tag_counts(
    catalog: &FieldCatalog,
    executor: &dyn QueryExecutor,
    name: &str,
    hard: &Predicate,
    limit: usize,
) -> Result<(String, FieldOutcome<RawTagCounts>)> {
    let Some(expr) = catalog.tag_expr(name) else {
        debug!(field = name, "unsupported tag field");
        return Ok((
            name.to_string(),
            FieldOutcome::Unsupported(FieldError::unsupported(name)),
        ));
    };
    let everything = Predicate::match_all();
    let (overall, filtered) = futures::try_join!(
        executor.grouped_count_distinct(&expr, &everything, limit),
        executor.grouped_count_distinct(&expr, hard, limit),
    )?;
    Ok((name.to_string(), FieldOutcome::Ready((overall, filtered))))
}

async fn numeric_summary(
    catalog: &FieldCatalog,
    executor: &dyn QueryExecutor,
    name: &str,
    hard: &Predicate,
    bins: usize,
) -> Result<(String, FieldOutcome<NumericSummary>)> {
    let Some(expr) = catalog.numeric_expr(name) else {
        debug!(field = name, "unsupported numeric field");
        return Ok((
            name.to_string(),
            FieldOutcome::Unsupported(FieldError::unsupported(name)),
        ));
    };

    let stats = executor.numeric_stats(&expr, hard).await?;
    let mut summary = summarize(&stats);

    if let (Some(min), Some(max)) = (summary.min, summary.max) {
        if summary.count > 0 && min < max {
            let counts = executor.histogram(&expr, hard, min, max, bins).await?;
            summary.histogram = densify(&counts, min, max, bins);
        }
    }
    Ok((name.to_string(), FieldOutcome::Ready(summary)))
}

/// Converts store numbers into report values.
fn summarize(stats: &RawNumericStats) -> NumericSummary {
    if stats.count == 0 {
        return NumericSummary::default();
    }
    let report = |v: Option<StoreNumber>| v.and_then(StoreNumber::to_report);
    NumericSummary {
        count: stats.count,
        min: report(stats.min),
        max: report(stats.max),
        mean: report(stats.mean),
        p50: report(stats.p50),
        p90: report(stats.p90),
        histogram: Vec::new(),
    }
}

/// Shares relative to `population`; zero for an empty population.
fn observations(counts: Vec<TagCount>, population: u64) -> Vec<TagObservation> {
    counts
        .into_iter()
        .map(|TagCount { tag, count }| TagObservation {
            share: if population == 0 {
                0.0
            } else {
                (count as f64 / population as f64).min(1.0)
            },
            tag_value: tag,
            distinct_item_count: count,
        })
        .collect()
}

/// Expands sparse bucket counts to every bucket with its bounds.
fn densify(counts: &[BucketCount], min: f64, max: f64, bins: usize) -> Vec<HistogramBucket> {
    let width = (max - min) / bins as f64;
    (0..bins)
        .map(|index| HistogramBucket {
            bucket_index: index,
            lower: min + width * index as f64,
            upper: if index + 1 == bins {
                max
            } else {
                min + width * (index + 1) as f64
            },
            count: counts
                .iter()
                .filter(|c| c.bucket_index == index)
                .map(|c| c.count)
                .sum(),
        })
        .collect()
}
