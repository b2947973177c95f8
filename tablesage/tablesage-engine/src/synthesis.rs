//! Per-source synthesis and final refinement prompts.

use std::sync::Arc;
use std::time::Duration;
use tablesage_backends::prompt::truncate_chars;
use tablesage_backends::{GenerationError, TextGenerator};
use tablesage_core::{BackendKind, Intent, ResultSet};
use tokio::time::timeout;
use tracing::debug;

/// Heading that tells the model how much to trust a source.
pub fn source_label(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Structured => "Highly relevant restaurant matches",
        BackendKind::Vector => "Similarity-based recommendations",
        BackendKind::Web => "External references",
        BackendKind::Graph => "Internal dataset matches",
    }
}

/// Records as one JSON object per line under the source label.
pub fn render_evidence(results: &ResultSet) -> String {
    let mut evidence = format!("**{}:**\n", source_label(results.origin()));
    for record in results.records() {
        let line = serde_json::to_string(record.fields()).unwrap_or_else(|_| record.render());
        evidence.push_str(&line);
        evidence.push('\n');
    }
    evidence
}

pub fn synthesis_prompt(query: &str, intent: Intent, results: &ResultSet) -> String {
    format!(
        r#"You answer questions about restaurants, their menus and their ingredients using an internal dataset and external public sources.

User query: "{query}"
Intent: "{intent}"

Search results:
{evidence}
Task:
1. Check how relevant each result is to the query: exact matches, similar recommendations or external references.
2. If results are relevant, summarize them in a natural, informative answer.
3. If they are not relevant, say so politely and suggest how the query could be refined.
4. Prefer highly relevant restaurant matches over the others.
5. Never mention errors that happened while searching.

Formatting:
- Start with a direct answer to the query.
- List the most relevant restaurants first, with dish names and key details.
- Offer alternatives when exact matches are missing.
- Keep it concise and friendly."#,
        evidence = render_evidence(results),
    )
}

pub fn refinement_prompt(query: &str, intent: Intent, responses: &str) -> String {
    format!(
        r#"You are an assistant for food, dining and restaurant recommendations. Merge the responses below, gathered from different sources, into one well-structured and accurate answer.

Original user query: "{query}"
User intent: "{intent}"

Guidelines:
1. Keep a logical flow and remove contradictions and repetition.
2. Resolve conflicting information sensibly.
3. Use a polished, engaging tone.
4. Focus on what matters most for the query and intent.
5. Open with a one or two sentence summary, present the main findings as bullets or short paragraphs, and close with guidance for the next step (reservations, alternatives).
6. Do not print section headers such as "Introduction" or "Conclusion".
7. Cite external references explicitly; weave internal references in naturally.

Responses:
{responses}

Now write the single refined response."#
    )
}

/// Runs generation calls with a character budget and a deadline.
#[derive(Clone)]
pub struct Synthesizer {
    generator: Arc<dyn TextGenerator>,
    prompt_char_budget: usize,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, prompt_char_budget: usize, timeout: Duration) -> Self {
        Self {
            generator,
            prompt_char_budget,
            timeout,
        }
    }

    /// Turn one backend's records into answer text.
    pub async fn synthesize(
        &self,
        query: &str,
        intent: Intent,
        results: &ResultSet,
    ) -> Result<String, GenerationError> {
        debug!(backend = %results.origin(), records = results.len(), "Synthesizing");
        self.generate(&synthesis_prompt(query, intent, results)).await
    }

    /// Merge the accumulated per-source texts into the final answer.
    pub async fn refine(
        &self,
        query: &str,
        intent: Intent,
        joined: &str,
    ) -> Result<String, GenerationError> {
        self.generate(&refinement_prompt(query, intent, joined)).await
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let prompt = truncate_chars(prompt, self.prompt_char_budget);
        let text = match timeout(self.timeout, self.generator.complete(prompt)).await {
            Ok(result) => result?,
            Err(_) => return Err(GenerationError::Timeout(self.timeout)),
        };

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyOutput);
        }
        Ok(text)
    }
}
