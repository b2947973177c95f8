//! Intent detection and entity extraction.
//!
//! Intent is decided by keyword patterns; entities are extracted by a text
//! generator asked for a JSON object. [`PipelineClassifier`] combines both
//! and never fails.

use crate::error::GenerationError;
use crate::prompt::{strip_code_fences, truncate_chars};
use crate::traits::{Classification, Classifier, TextGenerator};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tablesage_core::{AssistantMetrics, Component, EntityMap, Intent};
use tracing::{debug, warn};

/// Built-in keyword patterns, checked in this order.
pub const DEFAULT_INTENT_PATTERNS: &[(Intent, &[&str])] = &[
    (
        Intent::IngredientDiscovery,
        &["which restaurants serve", "dishes with", "gluten-free", "vegan"],
    ),
    (Intent::TrendingInsights, &["latest trends", "popular dishes"]),
    (Intent::HistoricalContext, &["history of", "origin of"]),
    (Intent::ComparativeAnalysis, &["compare prices", "cost of"]),
    (Intent::MenuInnovation, &["new trends", "how has * changed"]),
];

/// Case-insensitive keyword matcher. `*` in a pattern matches any run of
/// characters.
#[derive(Debug, Clone)]
pub struct KeywordIntentDetector {
    rules: Vec<(Intent, Vec<Regex>)>,
}

impl KeywordIntentDetector {
    pub fn new<'a, I, P>(rules: I) -> Self
    where
        I: IntoIterator<Item = (Intent, P)>,
        P: IntoIterator<Item = &'a str>,
    {
        let rules = rules
            .into_iter()
            .map(|(intent, patterns)| {
                let compiled = patterns.into_iter().filter_map(compile_pattern).collect();
                (intent, compiled)
            })
            .collect();
        Self { rules }
    }

    /// First matching intent in rule order, or [`Intent::Fallback`].
    pub fn detect(&self, text: &str) -> Intent {
        for (intent, patterns) in &self.rules {
            if let Some(pattern) = patterns.iter().find(|p| p.is_match(text)) {
                debug!(intent = %intent, pattern = %pattern, "Intent matched");
                return *intent;
            }
        }
        Intent::Fallback
    }
}

impl Default for KeywordIntentDetector {
    fn default() -> Self {
        Self::new(
            DEFAULT_INTENT_PATTERNS
                .iter()
                .map(|(intent, patterns)| (*intent, patterns.iter().copied())),
        )
    }
}

fn compile_pattern(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    let source = format!("(?i){body}");
    match Regex::new(&source) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(pattern = %pattern, error = %e, "Skipping invalid intent pattern");
            None
        }
    }
}

const ENTITY_PROMPT: &str = r#"Extract relevant entities from the user query and return them in a structured JSON format.

Output format (MUST BE VALID JSON):
{
    "location": ["list of location synonyms"],
    "menu_item": ["list of dish synonyms"],
    "ingredient_name": ["list of ingredient synonyms"],
    "menu_category": ["list of category synonyms"],
    "price": ["list of price terms"],
    "rating": ["list of rating terms"],
    "review_count": ["list of review-related terms"]
}

Rules:
- Respond with the JSON object only, no text before or after it.
- Always include all keys, using [] when nothing applies.
- Include synonyms and alternative phrasings for each entity.

Example query: "Which restaurants serve gluten-free pizza in New York?"
Example output:
{
    "location": ["New York", "NYC", "Big Apple"],
    "menu_item": ["pizza", "flatbread", "Neapolitan pizza"],
    "ingredient_name": ["gluten-free", "GF", "wheat-free"],
    "menu_category": [],
    "price": [],
    "rating": [],
    "review_count": []
}

User query: "#;

/// Asks a generator for the entity JSON.
pub struct LlmEntityExtractor {
    generator: Arc<dyn TextGenerator>,
    prompt_char_budget: usize,
}

impl LlmEntityExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            prompt_char_budget: 6_000,
        }
    }

    pub fn with_prompt_budget(mut self, prompt_char_budget: usize) -> Self {
        self.prompt_char_budget = prompt_char_budget;
        self
    }

    pub fn prompt(text: &str) -> String {
        format!("{ENTITY_PROMPT}{text}")
    }

    /// Extract entities. Output that is not a JSON object is `Malformed`.
    pub async fn extract(&self, text: &str) -> Result<EntityMap, GenerationError> {
        let prompt = Self::prompt(text);
        let raw = self
            .generator
            .complete(truncate_chars(&prompt, self.prompt_char_budget))
            .await?;
        let cleaned = strip_code_fences(&raw);
        let value: serde_json::Value = serde_json::from_str(&cleaned)
            .map_err(|e| GenerationError::Malformed(format!("entity JSON: {e}")))?;
        if !value.is_object() {
            return Err(GenerationError::Malformed(
                "entity output is not a JSON object".to_string(),
            ));
        }
        Ok(EntityMap::from_json(&value))
    }
}

/// Keyword intent detection followed by model-based entity extraction.
///
/// Extraction is skipped for [`Intent::Fallback`], which never consults a
/// backend.
pub struct PipelineClassifier {
    detector: KeywordIntentDetector,
    extractor: Option<LlmEntityExtractor>,
    metrics: Option<Arc<AssistantMetrics>>,
}

impl PipelineClassifier {
    pub fn new(detector: KeywordIntentDetector, extractor: Option<LlmEntityExtractor>) -> Self {
        Self {
            detector,
            extractor,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AssistantMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl Classifier for PipelineClassifier {
    async fn classify(&self, text: &str) -> Classification {
        let intent = self.detector.detect(text);
        if intent == Intent::Fallback {
            return Classification::fallback();
        }

        let entities = match &self.extractor {
            Some(extractor) => match extractor.extract(text).await {
                Ok(entities) => entities,
                Err(e) => {
                    warn!(stage = "classification", kind = %e.kind(), error = %e, "Entity extraction failed, using empty entities");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_failure(Component::Classification, e.kind());
                    }
                    EntityMap::new()
                }
            },
            None => EntityMap::new(),
        };

        debug!(intent = %intent, entity_keys = entities.non_empty().count(), "Query classified");
        Classification { intent, entities }
    }
}
