//! The assistant facade: classify, route, execute, assemble.

use crate::error::{EngineError, Result};
use crate::orchestrator::{Orchestrator, StepTrace, Terminal};
use crate::router::{IntentRouter, RoutingTable};
use crate::synthesis::Synthesizer;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablesage_backends::{
    Classification, Classifier, HttpTextGenerator, KeywordIntentDetector, LlmEntityExtractor,
    Neo4jGraphBackend, OpenAiEmbedder, PipelineClassifier, QdrantVectorBackend, RetrievalBackend,
    SearxngWebBackend, TabularBackend, TextGenerator,
};
use tablesage_core::config::{AssistantConfig, OrchestratorConfig};
use tablesage_core::{AssistantMetrics, BackendKind, Component, EntityMap, FailureKind, Intent, Query};
use tokio::time::timeout;
use tracing::{info, warn};

/// Everything known about one answered query.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerReport {
    pub intent: Intent,
    pub entities: EntityMap,
    pub terminal: Terminal,
    /// Backends that contributed text, in plan order.
    pub sources: Vec<BackendKind>,
    pub steps: Vec<StepTrace>,
    pub text: String,
}

pub struct Assistant {
    classifier: Arc<dyn Classifier>,
    router: IntentRouter,
    orchestrator: Orchestrator,
    metrics: Arc<AssistantMetrics>,
    classification_timeout: Duration,
}

impl Assistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::default()
    }

    /// Wire the default adapters from configuration.
    ///
    /// Backends whose section is absent are not registered. No network
    /// calls are made here; the dataset file is read eagerly.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        config.validate()?;

        let orchestrator = &config.orchestrator;
        let backend_timeout = orchestrator.backend_timeout();
        let budget = orchestrator.prompt_char_budget;
        let metrics = Arc::new(AssistantMetrics::new());

        let generator: Arc<dyn TextGenerator> = Arc::new(HttpTextGenerator::new(&config.llm)?);
        let extraction: Arc<dyn TextGenerator> =
            Arc::new(HttpTextGenerator::extraction(&config.llm)?);

        let classifier = PipelineClassifier::new(
            KeywordIntentDetector::default(),
            Some(LlmEntityExtractor::new(generator.clone()).with_prompt_budget(budget)),
        )
        .with_metrics(metrics.clone());

        let mut builder = Assistant::builder()
            .classifier(Arc::new(classifier))
            .generator(generator.clone())
            .orchestrator_config(orchestrator.clone())
            .routing(RoutingTable::with_overrides(&config.routing)?)
            .metrics(metrics);

        if let Some(structured) = &config.structured {
            let backend = TabularBackend::from_path(&structured.dataset_path)?;
            builder = builder.backend(Arc::new(backend));
        }
        if let Some(vector) = &config.vector {
            let embedder = Arc::new(OpenAiEmbedder::new(&vector.embedding, backend_timeout)?);
            builder = builder.backend(Arc::new(QdrantVectorBackend::new(
                vector,
                embedder,
                backend_timeout,
            )?));
        }
        if let Some(graph) = &config.graph {
            builder = builder.backend(Arc::new(Neo4jGraphBackend::new(
                graph,
                generator.clone(),
                backend_timeout,
                budget,
            )?));
        }
        if let Some(web) = &config.web {
            builder = builder.backend(Arc::new(SearxngWebBackend::new(
                web,
                Some(extraction),
                backend_timeout,
                budget,
            )?));
        }

        builder.build()
    }

    /// Answer `text`. Never fails.
    pub async fn answer(&self, text: &str) -> String {
        self.respond(&Query::new(text)).await.text
    }

    /// Answer `query` and report how the answer was reached.
    ///
    /// Entities carried by the query replace the extracted ones.
    pub async fn respond(&self, query: &Query) -> AnswerReport {
        let started = Instant::now();
        let classification = self.classify(query.text()).await;
        let intent = classification.intent;
        let entities = match query.entities() {
            Some(entities) => entities.clone(),
            None => classification.entities,
        };
        self.metrics.record_query(intent);

        let plan = self.router.route(query, intent);
        let run = self
            .orchestrator
            .execute(query.text(), intent, &entities, plan)
            .await;

        let sources = run.accumulated.sources();
        info!(
            intent = %intent,
            terminal = ?run.terminal,
            sources = ?sources,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answered query"
        );

        AnswerReport {
            intent,
            entities,
            terminal: run.terminal,
            sources,
            steps: run.steps,
            text: run.text,
        }
    }

    async fn classify(&self, text: &str) -> Classification {
        match timeout(self.classification_timeout, self.classifier.classify(text)).await {
            Ok(classification) => classification,
            Err(_) => {
                warn!(stage = "classification", kind = %FailureKind::Timeout, timeout = ?self.classification_timeout, "Classification timed out, using fallback");
                self.metrics
                    .record_failure(Component::Classification, FailureKind::Timeout);
                Classification::fallback()
            }
        }
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    pub fn metrics(&self) -> &Arc<AssistantMetrics> {
        &self.metrics
    }
}

/// Assembles an [`Assistant`] from explicit collaborators.
#[derive(Default)]
pub struct AssistantBuilder {
    classifier: Option<Arc<dyn Classifier>>,
    generator: Option<Arc<dyn TextGenerator>>,
    backends: Vec<Arc<dyn RetrievalBackend>>,
    routing: Option<RoutingTable>,
    config: OrchestratorConfig,
    metrics: Option<Arc<AssistantMetrics>>,
}

impl AssistantBuilder {
    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Generator used for synthesis and refinement.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn RetrievalBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn routing(mut self, table: RoutingTable) -> Self {
        self.routing = Some(table);
        self
    }

    pub fn orchestrator_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(mut self, metrics: Arc<AssistantMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<Assistant> {
        let classifier = self
            .classifier
            .ok_or_else(|| EngineError::Missing("classifier".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| EngineError::Missing("text generator".to_string()))?;
        let metrics = self.metrics.unwrap_or_default();

        let synthesizer = Synthesizer::new(
            generator,
            self.config.prompt_char_budget,
            self.config.generation_timeout(),
        );
        let mut orchestrator = Orchestrator::new(synthesizer, &self.config, metrics.clone());
        for backend in self.backends {
            info!(backend = %backend.kind(), "Registered backend");
            orchestrator = orchestrator.with_backend(backend);
        }

        Ok(Assistant {
            classifier,
            router: IntentRouter::new(self.routing.unwrap_or_default()),
            orchestrator,
            metrics,
            classification_timeout: self.config.classification_timeout(),
        })
    }
}
