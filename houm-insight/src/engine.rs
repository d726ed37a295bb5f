//! Engine facade: one catalog, one executor, one configuration.

use datafusion::prelude::SessionContext;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::catalog::{AttributeListing, CatalogConfig, FieldCatalog};
use crate::error::{EngineError, Result};
use crate::estimator::{self, DistributionReport, EstimateRequest};
use crate::estimator::{BINS_RANGE, DEFAULT_BINS, DEFAULT_TAG_LIMIT, TAG_LIMIT_RANGE};
use crate::executor::{DataFusionExecutor, QueryExecutor};
use crate::logging::LogConfig;

const ENV_TABLE: &str = "HOUM_TABLE";
const ENV_ID_COLUMN: &str = "HOUM_ID_COLUMN";
const ENV_QUERY_TIMEOUT_MS: &str = "HOUM_QUERY_TIMEOUT_MS";
const ENV_DEFAULT_BINS: &str = "HOUM_DEFAULT_BINS";
const ENV_DEFAULT_TAG_LIMIT: &str = "HOUM_DEFAULT_TAG_LIMIT";

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Listings table; overrides the table named in the catalog configuration.
    pub table: String,
    /// Column identifying a listing for distinct tag counts.
    pub id_column: Option<String>,
    /// Bin count for requests that name none.
    pub default_bins: usize,
    /// Tag limit for requests that name none.
    pub default_tag_limit: usize,
    /// Time budget for requests that name none.
    pub query_timeout: Option<Duration>,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            table: "listings".to_string(),
            id_column: Some("hemnet_id".to_string()),
            default_bins: DEFAULT_BINS,
            default_tag_limit: DEFAULT_TAG_LIMIT,
            query_timeout: None,
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads `HOUM_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`] but reading values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(table) = get(ENV_TABLE) {
            config.table = table;
        }
        if let Some(id) = get(ENV_ID_COLUMN) {
            config.id_column = Some(id);
        }
        if let Some(ms) = get(ENV_QUERY_TIMEOUT_MS) {
            let ms = parse_env(ENV_QUERY_TIMEOUT_MS, &ms)?;
            config.query_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(bins) = get(ENV_DEFAULT_BINS) {
            config = config.with_default_bins(parse_env(ENV_DEFAULT_BINS, &bins)?);
        }
        if let Some(limit) = get(ENV_DEFAULT_TAG_LIMIT) {
            config = config.with_default_tag_limit(parse_env(ENV_DEFAULT_TAG_LIMIT, &limit)?);
        }
        Ok(config)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_id_column(mut self, column: Option<String>) -> Self {
        self.id_column = column;
        self
    }

    /// Sets the default bin count, clamped to the accepted range.
    pub fn with_default_bins(mut self, bins: usize) -> Self {
        self.default_bins = bins.clamp(*BINS_RANGE.start(), *BINS_RANGE.end());
        self
    }

    /// Sets the default tag limit, clamped to the accepted range.
    pub fn with_default_tag_limit(mut self, limit: usize) -> Self {
        self.default_tag_limit = limit.clamp(*TAG_LIMIT_RANGE.start(), *TAG_LIMIT_RANGE.end());
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| EngineError::configuration(format!("{key}={value}: {e}")))
}

/// The filter-compilation and distribution-estimation engine.
///
/// Cheap to clone; clones share the catalog and executor.
#[derive(Debug, Clone)]
pub struct Engine {
    catalog: Arc<FieldCatalog>,
    executor: Arc<dyn QueryExecutor>,
    config: EngineConfig,
}

impl Engine {
    /// Wires an engine from parts that already exist.
    pub fn new(
        catalog: Arc<FieldCatalog>,
        executor: Arc<dyn QueryExecutor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            executor,
            config,
        }
    }

    /// Probes the store once for its columns and builds the catalog.
    #[instrument(skip_all, fields(table = %config.table))]
    pub async fn bootstrap(
        executor: Arc<dyn QueryExecutor>,
        catalog_config: CatalogConfig,
        config: EngineConfig,
    ) -> Result<Self> {
        let catalog_config = catalog_config.with_table(config.table.clone());
        let catalog = FieldCatalog::discover(catalog_config, executor.as_ref()).await?;
        info!(
            tag_fields = catalog.tag_fields().len(),
            numeric_fields = catalog.numeric_fields().len(),
            "engine ready"
        );
        Ok(Self::new(Arc::new(catalog), executor, config))
    }

    /// Bootstraps over a DataFusion session in which the listings table is
    /// registered under `config.table`.
    pub async fn with_datafusion(
        ctx: SessionContext,
        catalog_config: CatalogConfig,
        config: EngineConfig,
    ) -> Result<Self> {
        let executor = DataFusionExecutor::new(ctx, config.table.clone(), config.id_column.clone())?
            .with_log_config(config.log.clone());
        Self::bootstrap(Arc::new(executor), catalog_config, config).await
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// What callers can filter and aggregate on.
    pub fn list_attributes(&self) -> AttributeListing {
        self.catalog.list_attributes()
    }

    /// Runs one estimation, bounded by the request's or the configured
    /// timeout.
    pub async fn estimate(&self, mut request: EstimateRequest) -> Result<DistributionReport> {
        request
            .bins
            .get_or_insert(i64::try_from(self.config.default_bins).unwrap_or(i64::MAX));
        request
            .tag_limit
            .get_or_insert(i64::try_from(self.config.default_tag_limit).unwrap_or(i64::MAX));

        let run = estimator::estimate(&self.catalog, self.executor.as_ref(), &request);
        match request.timeout().or(self.config.query_timeout) {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                warn!(timeout_ms = limit.as_millis() as u64, "estimate timed out");
                EngineError::Timeout(limit)
            })?,
            None => run.await,
        }
    }

    /// JSON in, JSON out. A payload that is not a valid request is
    /// `invalid_input`.
    pub async fn estimate_json(&self, payload: Value) -> Result<Value> {
        let request: EstimateRequest = serde_json::from_value(payload)
            .map_err(|e| EngineError::invalid_input(format!("invalid estimate request: {e}")))?;
        let report = self.estimate(request).await?;
        serde_json::to_value(&report).map_err(|e| {
            EngineError::backend_with_source("serialize_report", e.to_string(), Box::new(e))
        })
    }
}
