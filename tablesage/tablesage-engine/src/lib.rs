//! Query orchestration for TableSage.
//!
//! A query flows through four stages:
//! - [`IntentRouter`] picks the retrieval plan for the classified intent
//! - [`Orchestrator`] runs the plan's backend steps and per-source synthesis
//! - [`ResponseAssembler`] joins and refines the accumulated texts
//! - [`Assistant`] ties classification and the stages above together
//!
//! # Example
//!
//! ```no_run
//! use tablesage_core::AssistantConfig;
//! use tablesage_engine::Assistant;
//!
//! # async fn run() -> tablesage_engine::Result<()> {
//! let config = AssistantConfig::load(None)?;
//! let assistant = Assistant::from_config(&config)?;
//! let answer = assistant
//!     .answer("Which restaurants serve gluten-free pasta in Chicago?")
//!     .await;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod assistant;
pub mod error;
pub mod orchestrator;
pub mod router;
pub mod synthesis;

pub use assembler::{APOLOGY, ResponseAssembler};
pub use assistant::{AnswerReport, Assistant, AssistantBuilder};
pub use error::{EngineError, Result};
pub use orchestrator::{
    INTRODUCTION, Orchestration, Orchestrator, OrchestratorState, StepStatus, StepTrace, Terminal,
};
pub use router::{IntentRouter, RoutingTable};
pub use synthesis::Synthesizer;
