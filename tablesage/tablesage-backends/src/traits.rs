//! Collaborator contracts used by the orchestration engine.

use crate::error::{GenerationError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tablesage_core::{BackendKind, EntityMap, Intent, ResultSet};

/// Everything a backend may use to answer one plan step.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub text: &'a str,
    pub intent: Intent,
    pub entities: &'a EntityMap,
}

impl<'a> SearchRequest<'a> {
    pub fn new(text: &'a str, intent: Intent, entities: &'a EntityMap) -> Self {
        Self {
            text,
            intent,
            entities,
        }
    }
}

/// A retrieval backend.
///
/// An empty [`ResultSet`] means "no evidence"; an `Err` means the call
/// failed. The orchestrator treats both the same way.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn search(&self, request: &SearchRequest<'_>) -> Result<ResultSet>;
}

#[async_trait]
impl RetrievalBackend for Arc<dyn RetrievalBackend> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<ResultSet> {
        (**self).search(request).await
    }
}

/// Prompt-in, text-out generation. No streaming.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, GenerationError>;
}

#[async_trait]
impl TextGenerator for Arc<dyn TextGenerator> {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        (**self).complete(prompt).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub entities: EntityMap,
}

impl Classification {
    pub fn fallback() -> Self {
        Self {
            intent: Intent::Fallback,
            entities: EntityMap::new(),
        }
    }
}

/// Intent and entity extraction. Never fails: uncertainty is expressed as
/// [`Intent::Fallback`] and empty entity sets.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Classification;
}
