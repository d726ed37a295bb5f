//! # houm-insight - Filter Compilation and Distribution Estimation
//!
//! houm-insight answers the question "what does the market look like under
//! these constraints?" for a large table of property listings. Callers hand it
//! declarative hard filters (price bounds, municipalities, a map bounding box,
//! ...) and get back how the filtered population compares to the whole
//! dataset, without any listing rows being materialized.
//!
//! ## Quick Start
//!
//! ```rust
//! use houm_insight::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> houm_insight::error::Result<()> {
//! let rows = vec![
//!     json!({"hemnet_id": 1, "price": 2500000, "municipality_name": "Stockholm"}),
//!     json!({"hemnet_id": 2, "price": 6100000, "municipality_name": "Solna"}),
//!     json!({"hemnet_id": 3, "price": 3900000, "municipality_name": "Stockholm"}),
//! ];
//! let executor = InMemoryExecutor::new("listings", rows).with_id_column("hemnet_id");
//!
//! let engine = Engine::bootstrap(
//!     Arc::new(executor),
//!     CatalogConfig::listings(),
//!     EngineConfig::default(),
//! )
//! .await?;
//!
//! let request = EstimateRequest::new(FilterSpec::new().with("max_price", 5_000_000))
//!     .with_tag_fields(["municipality_name"])
//!     .with_numeric_fields(["price"]);
//! let report = engine.estimate(request).await?;
//!
//! assert_eq!(report.total_count, 3);
//! assert_eq!(report.filtered_count, 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`catalog`**: the immutable registry of filterable and aggregable fields
//!   and how each is extracted from a row
//! - **`predicate`**: `FilterSpec` to `Predicate` compilation and SQL rendering
//! - **`executor`**: the `QueryExecutor` interface with DataFusion and
//!   in-memory backends
//! - **`estimator`**: counts, tag prevalence, numeric summaries and histograms
//! - **`engine`**: the facade tying a catalog, an executor and configuration
//!   together
//!
//! Numbers coming back from a store pass through [`value::StoreNumber`] and
//! are converted to plain `f64` only when the report is built.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod executor;
pub mod logging;
pub mod predicate;
pub mod prelude;
pub mod security;
pub mod value;
