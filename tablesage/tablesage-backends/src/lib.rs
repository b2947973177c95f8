//! Retrieval backends and model adapters for TableSage.
//!
//! Four retrieval backends implement [`RetrievalBackend`]:
//! - [`TabularBackend`]: filters and aggregates the CSV menu dataset
//! - [`QdrantVectorBackend`]: embedding similarity search
//! - [`Neo4jGraphBackend`]: generated Cypher over the knowledge graph
//! - [`SearxngWebBackend`]: web search with page extraction
//!
//! Text generation goes through [`TextGenerator`] ([`HttpTextGenerator`] for
//! OpenAI-compatible APIs) and query classification through [`Classifier`]
//! ([`PipelineClassifier`]). The [`mock`] module provides scripted versions
//! of every collaborator.

pub mod classifier;
pub mod error;
pub mod graph;
pub mod llm;
pub mod mock;
pub mod prompt;
pub mod structured;
pub mod traits;
pub mod vector;
pub mod web;

pub use classifier::{KeywordIntentDetector, LlmEntityExtractor, PipelineClassifier};
pub use error::{BackendError, GenerationError, Result};
pub use graph::Neo4jGraphBackend;
pub use llm::HttpTextGenerator;
pub use structured::TabularBackend;
pub use traits::{Classification, Classifier, RetrievalBackend, SearchRequest, TextGenerator};
pub use vector::{Embedder, OpenAiEmbedder, QdrantVectorBackend};
pub use web::SearxngWebBackend;
