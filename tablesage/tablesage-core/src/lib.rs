//! Core types for TableSage.
//!
//! This crate holds everything the retrieval backends and the orchestration
//! engine share:
//! - The query data model (intents, entity maps, result sets)
//! - Retrieval plans and their validation
//! - Configuration loading with environment overrides
//! - Operator metrics for absorbed failures

pub mod config;
pub mod error;
pub mod metrics;
pub mod plan;
pub mod types;

pub use config::AssistantConfig;
pub use error::{Result, TableSageError};
pub use metrics::{AssistantMetrics, Component, FailureKind, MetricsSnapshot};
pub use plan::{PlanStep, RetrievalPlan, StepRule};
pub use types::{
    AccumulatedResponse, BackendKind, EntityKey, EntityMap, Intent, Query, Record, ResultSet,
    SourceText,
};
