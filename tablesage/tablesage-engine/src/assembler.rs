//! Final answer assembly.

use crate::synthesis::Synthesizer;
use std::sync::Arc;
use tablesage_core::{AccumulatedResponse, AssistantMetrics, Component, Intent};
use tracing::{debug, warn};

/// Returned when no backend produced evidence.
pub const APOLOGY: &str =
    "I'm sorry, but I couldn't find relevant information. How else can I assist you?";

pub struct ResponseAssembler {
    synthesizer: Synthesizer,
    metrics: Arc<AssistantMetrics>,
}

impl ResponseAssembler {
    pub fn new(synthesizer: Synthesizer, metrics: Arc<AssistantMetrics>) -> Self {
        Self {
            synthesizer,
            metrics,
        }
    }

    /// Join the per-source texts in order and refine them into one answer.
    ///
    /// An empty accumulation yields [`APOLOGY`] without any generation call.
    /// If refinement fails the unrefined join is returned.
    pub async fn assemble(
        &self,
        accumulated: AccumulatedResponse,
        query: &str,
        intent: Intent,
    ) -> String {
        if accumulated.is_empty() {
            debug!("Nothing accumulated, returning apology");
            return APOLOGY.to_string();
        }

        let joined = accumulated.joined();
        match self.synthesizer.refine(query, intent, &joined).await {
            Ok(refined) => refined,
            Err(e) => {
                warn!(stage = "refinement", kind = %e.kind(), error = %e, "Refinement failed, returning unrefined answer");
                self.metrics.record_failure(Component::Refinement, e.kind());
                joined
            }
        }
    }
}
