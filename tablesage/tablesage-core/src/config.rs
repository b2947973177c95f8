//! Configuration for the assistant.
//!
//! Configuration is a single TOML file. Loading follows three steps: parse
//! the file (or start from defaults), merge environment overrides, validate.
//!
//! # Location
//!
//! An explicit path wins, then `TABLESAGE_CONFIG_PATH`, then
//! `./tablesage.toml`. Without any file the defaults are used.
//!
//! # Backends
//!
//! Each retrieval backend has an optional section. When a file omits a
//! section the backend is not registered, and plan steps that use it are
//! skipped as failures. Setting one of the backend environment variables
//! (for example `NEO4J_URL`) enables the section with defaults.
//!
//! # Example
//!
//! ```toml
//! [orchestrator]
//! backend_timeout_ms = 15000
//! prefetch_next_step = true
//!
//! [web]
//! searxng_url = "http://localhost:8080"
//! num_results = 3
//!
//! [[routing]]
//! intent = "historical_context"
//! steps = [{ backend = "web", on_hit = "assemble", on_empty = "assemble" }]
//! ```

use crate::error::{Result, TableSageError};
use crate::plan::RetrievalPlan;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "tablesage.toml";

// Environment variable names
pub const ENV_CONFIG_PATH: &str = "TABLESAGE_CONFIG_PATH";
pub const ENV_LOG_LEVEL: &str = "TABLESAGE_LOG_LEVEL";
pub const ENV_LLM_ENDPOINT: &str = "TABLESAGE_LLM_ENDPOINT";
pub const ENV_LLM_API_KEY: &str = "GROQ_API_KEY";
pub const ENV_EMBEDDING_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_DATASET: &str = "TABLESAGE_DATASET";
pub const ENV_QDRANT_URL: &str = "QDRANT_URL";
pub const ENV_NEO4J_URL: &str = "NEO4J_URL";
pub const ENV_NEO4J_USER: &str = "NEO4J_USER";
pub const ENV_NEO4J_PASSWORD: &str = "NEO4J_PASSWORD";
pub const ENV_SEARXNG_URL: &str = "SEARXNG_URL";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 2] = ["pretty", "json"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<VectorConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebConfig>,

    /// Plan overrides; each replaces the built-in plan for its intent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routing: Vec<RetrievalPlan>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            llm: LlmConfig::default(),
            structured: Some(StructuredConfig::default()),
            vector: Some(VectorConfig::default()),
            graph: Some(GraphConfig::default()),
            web: Some(WebConfig::default()),
            routing: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// `pretty` or `json`
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound for a single backend call
    pub backend_timeout_ms: u64,

    /// Upper bound for a single synthesis or refinement call
    pub generation_timeout_ms: u64,

    /// Upper bound for intent classification and entity extraction
    pub classification_timeout_ms: u64,

    /// Prompts are cut to this many characters before generation
    pub prompt_char_budget: usize,

    /// Query the next backend while the current one is being synthesized
    pub prefetch_next_step: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend_timeout_ms: 20_000,
            generation_timeout_ms: 60_000,
            classification_timeout_ms: 30_000,
            prompt_char_budget: 6_000,
            prefetch_next_step: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn classification_timeout(&self) -> Duration {
        Duration::from_millis(self.classification_timeout_ms)
    }
}

/// OpenAI-compatible chat completion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,

    /// API key (can be set via GROQ_API_KEY env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model for synthesis, refinement, entity and Cypher generation
    pub model: String,

    /// Smaller model for web content extraction
    pub extraction_model: String,

    pub temperature: f32,

    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            api_key: None,
            model: "llama-3.3-70b-versatile".to_string(),
            extraction_model: "llama3-8b-8192".to_string(),
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredConfig {
    /// Cleaned menu dataset (CSV)
    pub dataset_path: PathBuf,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("cleaned_menu_data.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Qdrant gRPC endpoint
    pub qdrant_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_api_key: Option<String>,
    pub collection: String,
    pub top_k: usize,
    pub embedding: EmbeddingConfig,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            collection: "restaurant_menus".to_string(),
            top_k: 5,
            embedding: EmbeddingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,

    /// API key (can be set via OPENAI_API_KEY env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Neo4j HTTP endpoint
    pub url: String,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            user: "neo4j".to_string(),
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub searxng_url: String,

    /// Pages fetched per query
    pub num_results: usize,

    pub page_timeout_secs: u64,

    /// Paragraphs shorter than this are treated as navigation noise
    pub min_paragraph_chars: usize,

    /// Extracted text kept per page
    pub page_char_limit: usize,

    pub user_agent: String,

    /// Add an insights record summarizing restaurants and dishes per source
    pub summarize: bool,

    /// Deadline for the insights call; must leave room inside the backend timeout
    pub insights_timeout_ms: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            searxng_url: "http://localhost:8080".to_string(),
            num_results: 3,
            page_timeout_secs: 5,
            min_paragraph_chars: 50,
            page_char_limit: 1_000,
            user_agent: "Mozilla/5.0".to_string(),
            summarize: true,
            insights_timeout_ms: 8_000,
        }
    }
}

impl WebConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn insights_timeout(&self) -> Duration {
        Duration::from_millis(self.insights_timeout_ms)
    }
}

impl AssistantConfig {
    /// Resolve and load configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read, or if
    /// the resulting configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover_path(),
        };

        let mut config = match resolved {
            Some(path) => Self::parse_file(&path)?,
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.merge_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Load a specific file, applying environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        Self::load(Some(path))
    }

    fn discover_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.exists().then_some(local)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            TableSageError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from a TOML string without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration atomically (write to a temp file, then rename).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply environment variable overrides.
    pub fn merge_env_vars(&mut self) {
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            debug!("Overriding log_level from environment: {}", level);
            self.general.log_level = level;
        }

        if let Ok(endpoint) = std::env::var(ENV_LLM_ENDPOINT) {
            self.llm.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var(ENV_LLM_API_KEY) {
            self.llm.api_key = Some(key);
        }

        if let Ok(path) = std::env::var(ENV_DATASET) {
            self.structured.get_or_insert_with(Default::default).dataset_path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var(ENV_QDRANT_URL) {
            self.vector.get_or_insert_with(Default::default).qdrant_url = url;
        }
        if let Ok(key) = std::env::var(ENV_EMBEDDING_API_KEY) {
            if let Some(vector) = self.vector.as_mut() {
                vector.embedding.api_key = Some(key);
            }
        }

        if let Ok(url) = std::env::var(ENV_NEO4J_URL) {
            self.graph.get_or_insert_with(Default::default).url = url;
        }
        if let Ok(user) = std::env::var(ENV_NEO4J_USER) {
            self.graph.get_or_insert_with(Default::default).user = user;
        }
        if let Ok(password) = std::env::var(ENV_NEO4J_PASSWORD) {
            self.graph.get_or_insert_with(Default::default).password = Some(password);
        }

        if let Ok(url) = std::env::var(ENV_SEARXNG_URL) {
            self.web.get_or_insert_with(Default::default).searxng_url = url;
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TableSageError::Config`] or [`TableSageError::InvalidPlan`]
    /// describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(TableSageError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if !VALID_LOG_FORMATS.contains(&self.general.log_format.as_str()) {
            return Err(TableSageError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.general.log_format,
                VALID_LOG_FORMATS.join(", ")
            )));
        }

        let orchestrator = &self.orchestrator;
        if orchestrator.backend_timeout_ms == 0
            || orchestrator.generation_timeout_ms == 0
            || orchestrator.classification_timeout_ms == 0
        {
            return Err(TableSageError::config("Timeouts must be greater than 0"));
        }

        if orchestrator.prompt_char_budget == 0 {
            return Err(TableSageError::config(
                "prompt_char_budget must be greater than 0",
            ));
        }

        if let Some(vector) = &self.vector {
            if vector.top_k == 0 {
                return Err(TableSageError::config("vector.top_k must be greater than 0"));
            }
        }

        if let Some(web) = &self.web {
            if web.num_results == 0 {
                return Err(TableSageError::config(
                    "web.num_results must be greater than 0",
                ));
            }
            if web.summarize
                && (web.insights_timeout_ms == 0
                    || web.insights_timeout_ms >= orchestrator.backend_timeout_ms)
            {
                return Err(TableSageError::config(
                    "web.insights_timeout_ms must be greater than 0 and below orchestrator.backend_timeout_ms",
                ));
            }
        }

        let mut seen = HashSet::new();
        for plan in &self.routing {
            plan.validate()?;
            if !seen.insert(plan.intent()) {
                return Err(TableSageError::invalid_plan(
                    plan.intent(),
                    "intent is overridden more than once",
                ));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BackendKind, Intent};
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AssistantConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.prompt_char_budget, 6_000);
        assert_eq!(config.vector.as_ref().unwrap().top_k, 5);
        assert_eq!(config.web.as_ref().unwrap().num_results, 3);
    }

    #[test]
    fn test_missing_sections_disable_backends() {
        let config = AssistantConfig::from_toml_str(
            r#"
            [web]
            searxng_url = "http://search.local"
            "#,
        )
        .unwrap();

        assert!(config.structured.is_none());
        assert!(config.graph.is_none());
        assert_eq!(config.web.unwrap().searxng_url, "http://search.local");
        assert_eq!(config.orchestrator.backend_timeout_ms, 20_000);
    }

    #[test]
    fn test_routing_override_parses() {
        let config = AssistantConfig::from_toml_str(
            r#"
            [[routing]]
            intent = "historical_context"
            steps = [
                { backend = "vector", on_hit = "next", on_empty = "next" },
                { backend = "web", on_hit = "assemble", on_empty = "assemble" },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.routing.len(), 1);
        assert_eq!(config.routing[0].intent(), Intent::HistoricalContext);
        assert_eq!(
            config.routing[0].backends(),
            vec![BackendKind::Vector, BackendKind::Web]
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AssistantConfig::default();
        config.general.log_level = "loud".to_string();
        assert!(matches!(config.validate(), Err(TableSageError::Config(_))));

        let mut config = AssistantConfig::default();
        config.orchestrator.backend_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AssistantConfig::default();
        if let Some(web) = config.web.as_mut() {
            web.insights_timeout_ms = config.orchestrator.backend_timeout_ms;
        }
        assert!(matches!(config.validate(), Err(TableSageError::Config(_))));

        let result = AssistantConfig::from_toml_str(
            r#"
            [[routing]]
            intent = "fallback"
            steps = [{ backend = "web", on_hit = "assemble", on_empty = "assemble" }]
            "#,
        );
        assert!(matches!(result, Err(TableSageError::InvalidPlan { .. })));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("tablesage.toml");

        let mut config = AssistantConfig::default();
        config.orchestrator.prefetch_next_step = false;
        config.graph = None;
        config.save_to_path(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let reloaded = AssistantConfig::from_toml_str(&content).unwrap();
        assert!(!reloaded.orchestrator.prefetch_next_step);
        assert!(reloaded.graph.is_none());
        assert!(reloaded.web.is_some());
    }
}
