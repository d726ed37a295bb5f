//! Prelude for commonly used types and traits in houm-insight.

pub use crate::catalog::{AttributeListing, CatalogConfig, FieldCatalog};
pub use crate::engine::{Engine, EngineConfig};
pub use crate::error::{EngineError, ErrorContext, ErrorKind, Result};
pub use crate::estimator::{DistributionReport, EstimateRequest, FieldOutcome};
pub use crate::executor::{DataFusionExecutor, InMemoryExecutor, QueryExecutor};
pub use crate::logging::LogConfig;
pub use crate::predicate::{compile, FilterSpec, Predicate};
