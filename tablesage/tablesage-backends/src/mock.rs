//! Scripted collaborators for tests and offline runs.
//!
//! Every mock counts its calls so tests can assert which collaborators an
//! answer touched.

use crate::error::{BackendError, GenerationError, Result};
use crate::traits::{Classification, Classifier, RetrievalBackend, SearchRequest, TextGenerator};
use crate::vector::Embedder;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tablesage_core::{BackendKind, EntityMap, Intent, ResultSet};

/// What a [`StaticBackend`] does on every call.
#[derive(Debug, Clone)]
pub enum Outcome {
    Records(Vec<Map<String, Value>>),
    Empty,
    Unavailable(String),
    QueryExecution(String),
    /// Never completes; only a caller-side timeout ends the call.
    Hang,
}

/// Backend that replays a fixed outcome.
pub struct StaticBackend {
    kind: BackendKind,
    outcome: Outcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl StaticBackend {
    pub fn new(kind: BackendKind, outcome: Outcome) -> Self {
        Self {
            kind,
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Backend returning one record per `(field, value)` list.
    pub fn hit<I, R, K, V>(kind: BackendKind, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect()
            })
            .collect();
        Self::new(kind, Outcome::Records(rows))
    }

    pub fn empty(kind: BackendKind) -> Self {
        Self::new(kind, Outcome::Empty)
    }

    pub fn unavailable(kind: BackendKind) -> Self {
        Self::new(kind, Outcome::Unavailable("scripted outage".to_string()))
    }

    pub fn hanging(kind: BackendKind) -> Self {
        Self::new(kind, Outcome::Hang)
    }

    /// Wait `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RetrievalBackend for StaticBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<ResultSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(request.text.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            Outcome::Records(rows) => Ok(ResultSet::new(self.kind, rows.clone())),
            Outcome::Empty => Ok(ResultSet::empty(self.kind)),
            Outcome::Unavailable(reason) => Err(BackendError::Unavailable(reason.clone())),
            Outcome::QueryExecution(reason) => Err(BackendError::QueryExecution(reason.clone())),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

type Responder = Box<dyn Fn(usize, &str) -> std::result::Result<String, GenerationError> + Send + Sync>;

/// Text generator driven by a script.
pub struct ScriptedGenerator {
    responder: Responder,
    delay: Option<Duration>,
    hang: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Compute each reply from the call index and prompt.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(usize, &str) -> std::result::Result<String, GenerationError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            hang: false,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `outputs` in order, repeating the last one when they run
    /// out. With no outputs every call fails with `EmptyOutput`.
    pub fn with_outputs<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let outputs: Vec<String> = outputs.into_iter().map(Into::into).collect();
        Self::from_fn(move |index, _| {
            outputs
                .get(index)
                .or(outputs.last())
                .cloned()
                .ok_or(GenerationError::EmptyOutput)
        })
    }

    pub fn failing() -> Self {
        Self::from_fn(|_, _| Err(GenerationError::Response("scripted failure".to_string())))
    }

    pub fn hanging() -> Self {
        let mut generator = Self::with_outputs(Vec::<String>::new());
        generator.hang = true;
        generator
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if self.hang {
            return std::future::pending().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.responder)(index, prompt)
    }
}

/// Classifier returning the same classification for every query.
pub struct StaticClassifier {
    classification: Classification,
    calls: AtomicUsize,
}

impl StaticClassifier {
    pub fn new(intent: Intent, entities: EntityMap) -> Self {
        Self {
            classification: Classification { intent, entities },
            calls: AtomicUsize::new(0),
        }
    }

    /// Classify with an arbitrary label, as an external model might.
    pub fn from_label(label: &str) -> Self {
        Self::new(Intent::from_label(label), EntityMap::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify(&self, _text: &str) -> Classification {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.classification.clone()
    }
}

/// Embedder returning a constant vector.
pub struct FixedEmbedder {
    vector: Vec<f32>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.vector.clone())
    }
}
