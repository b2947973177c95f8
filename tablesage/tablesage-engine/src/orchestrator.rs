//! Plan execution.
//!
//! The orchestrator walks a [`RetrievalPlan`] step by step:
//!
//! ```text
//! Start -> RoutingDone -> { Querying(b) -> [Synthesizing(b)] }* -> Assembling -> Done
//! Start -> IntroduceOnly                               (plan without steps)
//! ```
//!
//! A backend that fails or times out is treated exactly like one that
//! returned nothing: the step's `on_empty` rule decides what comes next.
//! After a hit whose successor is known, the successor's backend call can
//! run while the current results are synthesized; accumulation always
//! follows plan order.

use crate::assembler::ResponseAssembler;
use crate::synthesis::Synthesizer;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tablesage_backends::{RetrievalBackend, SearchRequest};
use tablesage_core::config::OrchestratorConfig;
use tablesage_core::{
    AccumulatedResponse, AssistantMetrics, BackendKind, Component, EntityMap, FailureKind, Intent,
    ResultSet, RetrievalPlan,
};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Greeting returned for queries that route to no backend.
pub const INTRODUCTION: &str = "Hello! 👋 I'm your AI restaurant assistant. I can help you discover restaurants, explore menus, and find trending food items. How can I assist you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "backend", rename_all = "snake_case")]
pub enum OrchestratorState {
    Start,
    RoutingDone,
    Querying(BackendKind),
    Synthesizing(BackendKind),
    Assembling,
    Done,
    IntroduceOnly,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Done,
    IntroduceOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Hit { records: usize },
    Empty,
    Failed { kind: FailureKind },
}

/// What happened at one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepTrace {
    pub backend: BackendKind,
    #[serde(flatten)]
    pub status: StepStatus,
    /// False when synthesis failed and nothing was appended for this step.
    pub synthesized: bool,
}

/// Result of executing one plan.
#[derive(Debug, Clone)]
pub struct Orchestration {
    pub terminal: Terminal,
    pub accumulated: AccumulatedResponse,
    pub steps: Vec<StepTrace>,
    pub states: Vec<OrchestratorState>,
    pub text: String,
}

enum StepOutcome {
    Hit(ResultSet),
    Empty,
    Failed(FailureKind),
}

impl StepOutcome {
    fn status(&self) -> StepStatus {
        match self {
            StepOutcome::Hit(results) => StepStatus::Hit {
                records: results.len(),
            },
            StepOutcome::Empty => StepStatus::Empty,
            StepOutcome::Failed(kind) => StepStatus::Failed { kind: *kind },
        }
    }
}

pub struct Orchestrator {
    backends: HashMap<BackendKind, Arc<dyn RetrievalBackend>>,
    synthesizer: Synthesizer,
    assembler: ResponseAssembler,
    backend_timeout: Duration,
    prefetch: bool,
    metrics: Arc<AssistantMetrics>,
}

impl Orchestrator {
    pub fn new(
        synthesizer: Synthesizer,
        config: &OrchestratorConfig,
        metrics: Arc<AssistantMetrics>,
    ) -> Self {
        Self {
            backends: HashMap::new(),
            assembler: ResponseAssembler::new(synthesizer.clone(), metrics.clone()),
            synthesizer,
            backend_timeout: config.backend_timeout(),
            prefetch: config.prefetch_next_step,
            metrics,
        }
    }

    /// Register a backend under its own kind, replacing any previous one.
    pub fn with_backend(mut self, backend: Arc<dyn RetrievalBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    pub fn has_backend(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Execute `plan` for one query and assemble the answer.
    pub async fn execute(
        &self,
        text: &str,
        intent: Intent,
        entities: &EntityMap,
        plan: &RetrievalPlan,
    ) -> Orchestration {
        let mut states = vec![OrchestratorState::Start];

        if plan.is_introduce_only() {
            states.push(OrchestratorState::IntroduceOnly);
            debug!(intent = %intent, "Introduce only");
            return Orchestration {
                terminal: Terminal::IntroduceOnly,
                accumulated: AccumulatedResponse::new(),
                steps: Vec::new(),
                states,
                text: INTRODUCTION.to_string(),
            };
        }
        states.push(OrchestratorState::RoutingDone);

        let request = SearchRequest::new(text, intent, entities);
        let steps = plan.steps();
        let mut accumulated = AccumulatedResponse::new();
        let mut traces = Vec::with_capacity(steps.len());
        let mut pending: Option<(usize, StepOutcome)> = None;
        let mut cursor = if steps.is_empty() { None } else { Some(0) };

        while let Some(index) = cursor {
            let step = steps[index];
            states.push(OrchestratorState::Querying(step.backend));

            let outcome = match pending.take() {
                Some((prefetched, outcome)) if prefetched == index => outcome,
                _ => self.query(step.backend, &request).await,
            };
            let status = outcome.status();

            match outcome {
                StepOutcome::Hit(results) => {
                    states.push(OrchestratorState::Synthesizing(step.backend));
                    let next = plan.resolve(index, step.on_hit);

                    let (source_text, prefetched) = match next {
                        Some(next_index) if self.prefetch => {
                            let next_backend = steps[next_index].backend;
                            debug!(current = %step.backend, next = %next_backend, "Prefetching next step");
                            let (synthesis, next_outcome) = tokio::join!(
                                self.synthesize(&request, &results),
                                self.query(next_backend, &request)
                            );
                            (synthesis, Some((next_index, next_outcome)))
                        }
                        _ => (self.synthesize(&request, &results).await, None),
                    };

                    let synthesized = source_text.is_some();
                    if let Some(source_text) = source_text {
                        accumulated = accumulated.appended(step.backend, source_text);
                    }
                    traces.push(StepTrace {
                        backend: step.backend,
                        status,
                        synthesized,
                    });
                    pending = prefetched;
                    debug!(backend = %step.backend, rule = %step.on_hit, "Step hit");
                    cursor = next;
                }
                StepOutcome::Empty | StepOutcome::Failed(_) => {
                    traces.push(StepTrace {
                        backend: step.backend,
                        status,
                        synthesized: false,
                    });
                    debug!(backend = %step.backend, rule = %step.on_empty, "Step empty");
                    cursor = plan.resolve(index, step.on_empty);
                }
            }
        }

        states.push(OrchestratorState::Assembling);
        let answer = self
            .assembler
            .assemble(accumulated.clone(), text, intent)
            .await;
        states.push(OrchestratorState::Done);

        Orchestration {
            terminal: Terminal::Done,
            accumulated,
            steps: traces,
            states,
            text: answer,
        }
    }

    async fn query(&self, backend: BackendKind, request: &SearchRequest<'_>) -> StepOutcome {
        let Some(adapter) = self.backends.get(&backend) else {
            warn!(backend = %backend, kind = %FailureKind::NotConfigured, "Backend not registered, treating step as empty");
            self.metrics
                .record_failure(Component::Backend(backend), FailureKind::NotConfigured);
            return StepOutcome::Failed(FailureKind::NotConfigured);
        };

        match timeout(self.backend_timeout, adapter.search(request)).await {
            Ok(Ok(results)) if !results.is_empty() => {
                debug!(backend = %backend, records = results.len(), "Backend returned results");
                self.metrics.record_hit(backend);
                StepOutcome::Hit(results)
            }
            Ok(Ok(_)) => {
                debug!(backend = %backend, "Backend returned no results");
                self.metrics.record_empty(backend);
                StepOutcome::Empty
            }
            Ok(Err(e)) => {
                let kind = e.kind();
                warn!(backend = %backend, kind = %kind, error = %e, "Backend call failed, treating step as empty");
                self.metrics.record_failure(Component::Backend(backend), kind);
                StepOutcome::Failed(kind)
            }
            Err(_) => {
                warn!(backend = %backend, kind = %FailureKind::Timeout, timeout = ?self.backend_timeout, "Backend call timed out, treating step as empty");
                self.metrics
                    .record_failure(Component::Backend(backend), FailureKind::Timeout);
                StepOutcome::Failed(FailureKind::Timeout)
            }
        }
    }

    /// Synthesized text; `None` when generation fails.
    async fn synthesize(&self, request: &SearchRequest<'_>, results: &ResultSet) -> Option<String> {
        match self
            .synthesizer
            .synthesize(request.text, request.intent, results)
            .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(stage = "synthesis", backend = %results.origin(), kind = %e.kind(), error = %e, "Synthesis failed, nothing appended for this source");
                self.metrics.record_failure(Component::Synthesis, e.kind());
                None
            }
        }
    }
}
