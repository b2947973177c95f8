//! Web search backend.
//!
//! Queries a SearxNG instance, fetches the top result pages and keeps their
//! substantial paragraphs. An optional small model condenses the pages into
//! one insights record.

use crate::error::{BackendError, Result};
use crate::prompt::truncate_chars;
use crate::traits::{RetrievalBackend, SearchRequest, TextGenerator};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tablesage_core::config::WebConfig;
use tablesage_core::{BackendKind, FailureKind, ResultSet};
use tokio::time::timeout;
use tracing::{debug, warn};

pub const CONTENT_NOT_AVAILABLE: &str = "Content not available.";

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    #[serde(default)]
    title: String,
}

/// Join the text of `<p>` elements longer than `min_chars`, one per line.
pub fn extract_paragraphs(html: &str, min_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut paragraphs = Vec::new();

    if let Ok(selector) = Selector::parse("p") {
        for element in document.select(&selector) {
            let text = element.text().collect::<String>();
            let text = text.trim();
            if text.chars().count() > min_chars {
                paragraphs.push(text.to_string());
            }
        }
    }

    paragraphs.join("\n")
}

/// Prompt asking the extraction model for per-source restaurant insights.
pub fn insights_prompt(query: &str, pages: &[(String, String)]) -> String {
    let snippets = pages
        .iter()
        .map(|(url, content)| format!("Source: {url}\nExtracted Content:\n{content}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You extract restaurant information from web content about restaurants, their menus and their ingredients.

User query: "{query}"

Web content:
{snippets}

Task:
1. Identify every restaurant mentioned.
2. List the dishes or food items each restaurant is associated with.
3. Keep the sentiment: note dishes a restaurant is praised for, and note explicit negatives (for example "no gluten-free options").
4. Group the restaurants under the source they came from, as bullet points.

Example:
Source: https://example.com/best-pizza
- **Restaurant A**: Offers gluten-free pasta, highly recommended.
- **Restaurant B**: Popular spot, but does not offer gluten-free options.

Return only the insights, no extra text."#
    )
}

pub struct SearxngWebBackend {
    client: Client,
    search_url: String,
    config: WebConfig,
    extractor: Option<Arc<dyn TextGenerator>>,
    prompt_char_budget: usize,
}

impl SearxngWebBackend {
    pub fn new(
        config: &WebConfig,
        extractor: Option<Arc<dyn TextGenerator>>,
        timeout: Duration,
        prompt_char_budget: usize,
    ) -> Result<Self> {
        let base = url::Url::parse(&config.searxng_url)
            .map_err(|e| BackendError::NotConfigured(format!("invalid SearxNG URL: {e}")))?;
        let search_url = base
            .join("search")
            .map_err(|e| BackendError::NotConfigured(format!("invalid SearxNG URL: {e}")))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            search_url: search_url.to_string(),
            config: config.clone(),
            extractor: if config.summarize { extractor } else { None },
            prompt_char_budget,
        })
    }

    async fn search_urls(&self, query: &str) -> Result<Vec<(String, String)>> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Unavailable(format!(
                "SearxNG returned {}: {}",
                status, text
            )));
        }

        let parsed: SearxngResponse = serde_json::from_str(&response.text().await?)?;
        Ok(parsed
            .results
            .into_iter()
            .filter_map(|result| {
                let url = result.url?;
                (!url.trim().is_empty()).then_some((url, result.title))
            })
            .take(self.config.num_results)
            .collect())
    }

    /// Fetch one page. Failures become placeholder text, never errors.
    async fn fetch_page(&self, url: &str) -> String {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .timeout(self.config.page_timeout())
            .send()
            .await
            .and_then(|response| response.error_for_status());

        let body = match response {
            Ok(response) => response.text().await,
            Err(e) => Err(e),
        };

        match body {
            Ok(html) => {
                let text = extract_paragraphs(&html, self.config.min_paragraph_chars);
                if text.is_empty() {
                    CONTENT_NOT_AVAILABLE.to_string()
                } else {
                    truncate_chars(&text, self.config.page_char_limit).to_string()
                }
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Page fetch failed");
                format!("Could not extract content: {e}")
            }
        }
    }

    async fn summarize(
        &self,
        extractor: &dyn TextGenerator,
        query: &str,
        pages: &[(String, String)],
    ) -> Option<Map<String, Value>> {
        let prompt = insights_prompt(query, pages);
        let deadline = self.config.insights_timeout();
        let completion = timeout(
            deadline,
            extractor.complete(truncate_chars(&prompt, self.prompt_char_budget)),
        )
        .await;

        match completion {
            Ok(Ok(content)) => {
                let mut fields = Map::new();
                fields.insert("kind".into(), json!("insights"));
                fields.insert(
                    "sources".into(),
                    json!(pages.iter().map(|(url, _)| url).collect::<Vec<_>>()),
                );
                fields.insert("content".into(), json!(content));
                Some(fields)
            }
            Ok(Err(e)) => {
                warn!(backend = "web", kind = %e.kind(), error = %e, "Insight extraction failed, keeping page records only");
                None
            }
            Err(_) => {
                warn!(backend = "web", kind = %FailureKind::Timeout, timeout = ?deadline, "Insight extraction timed out, keeping page records only");
                None
            }
        }
    }
}

#[async_trait]
impl RetrievalBackend for SearxngWebBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Web
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<ResultSet> {
        let hits = self.search_urls(request.text).await?;
        if hits.is_empty() {
            debug!("Web search returned no URLs");
            return Ok(ResultSet::empty(BackendKind::Web));
        }

        let contents = join_all(hits.iter().map(|(url, _)| self.fetch_page(url))).await;

        let mut rows = Vec::with_capacity(hits.len() + 1);
        let mut pages = Vec::with_capacity(hits.len());
        for ((url, title), content) in hits.into_iter().zip(contents) {
            let mut fields = Map::new();
            fields.insert("url".into(), json!(url));
            fields.insert("title".into(), json!(title));
            fields.insert("content".into(), json!(content));
            rows.push(fields);
            pages.push((url, content));
        }

        if let Some(extractor) = &self.extractor {
            if let Some(insights) = self.summarize(extractor.as_ref(), request.text, &pages).await {
                rows.push(insights);
            }
        }

        debug!(pages = pages.len(), records = rows.len(), "Web search complete");
        Ok(ResultSet::new(BackendKind::Web, rows))
    }
}
