//! Knowledge graph backend.
//!
//! A text generator writes a read-only Cypher query for the request, which
//! is executed through the Neo4j HTTP transaction endpoint.

use crate::error::{BackendError, Result};
use crate::prompt::{strip_code_fences, truncate_chars};
use crate::traits::{RetrievalBackend, SearchRequest, TextGenerator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tablesage_core::config::GraphConfig;
use tablesage_core::{BackendKind, EntityMap, ResultSet};
use tracing::{debug, info};

/// Returned by the generator when no sensible query exists.
pub const NO_QUERY: &str = "NO_QUERY";

const CYPHER_PROMPT: &str = r#"You write Cypher queries for a Neo4j restaurant knowledge graph. Given a user question, return the single most efficient read-only query that answers it.

Graph schema:
- (:Restaurant {name, address, city, zip_code, country, state, rating, review_count, price})
- (:MenuCategory {name})
- (:MenuItem {name, description})
- (:Ingredient {name})
- (:Restaurant)-[:SERVES]->(:MenuCategory)
- (:MenuCategory)-[:HAS_ITEM]->(:MenuItem)
- (:MenuItem)-[:CONTAINS]->(:Ingredient)

Rules:
- Compare text properties case-insensitively with toLower().
- Use OPTIONAL MATCH for Ingredient nodes; not every menu item lists ingredients.
- Cast price with toFloat() before comparing it.
- Search synonyms too (for example "gluten-free" and "GF", "pizza" and "flatbread").
- Aggregate so each restaurant appears once, alias every returned column, and LIMIT to 50 rows.
- Never write to the graph.
- Return only the query, with no explanation.
- If no query can answer the question, return NO_QUERY.

Example, top-rated restaurants serving a dish:
MATCH (r:Restaurant)-[:SERVES]->(:MenuCategory)-[:HAS_ITEM]->(m:MenuItem)
WHERE toLower(m.name) CONTAINS "pizza"
RETURN r.name AS restaurant_name, r.city AS city, r.rating AS rating
ORDER BY r.rating DESC
LIMIT 10

Example, most common ingredients:
MATCH (i:Ingredient)<-[:CONTAINS]-(m:MenuItem)
RETURN i.name AS ingredient, count(m) AS mentions
ORDER BY mentions DESC
LIMIT 10
"#;

/// Build the Cypher generation prompt for a request.
pub fn cypher_prompt(text: &str, intent: &str, entities: &EntityMap) -> String {
    let mut prompt = String::from(CYPHER_PROMPT);
    prompt.push_str(&format!("\nUser intent: {intent}\n"));

    let mut known = entities.non_empty().peekable();
    if known.peek().is_some() {
        prompt.push_str("Known entities:\n");
        for (key, terms) in known {
            let terms: Vec<&str> = terms.iter().map(String::as_str).collect();
            prompt.push_str(&format!("- {}: {}\n", key, terms.join(", ")));
        }
    }

    prompt.push_str(&format!("User question: {text}\n"));
    prompt
}

#[derive(Serialize)]
struct TxRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

pub struct Neo4jGraphBackend {
    client: Client,
    commit_url: String,
    user: String,
    password: Option<String>,
    generator: Arc<dyn TextGenerator>,
    prompt_char_budget: usize,
}

impl Neo4jGraphBackend {
    pub fn new(
        config: &GraphConfig,
        generator: Arc<dyn TextGenerator>,
        timeout: Duration,
        prompt_char_budget: usize,
    ) -> Result<Self> {
        let base = url::Url::parse(&config.url)
            .map_err(|e| BackendError::NotConfigured(format!("invalid Neo4j URL: {e}")))?;
        let commit_url = base
            .join(&format!("db/{}/tx/commit", config.database))
            .map_err(|e| BackendError::NotConfigured(format!("invalid database name: {e}")))?;

        let client = Client::builder().timeout(timeout).build()?;

        info!(url = %config.url, database = %config.database, "Initialized graph backend");

        Ok(Self {
            client,
            commit_url: commit_url.to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            generator,
            prompt_char_budget,
        })
    }

    /// Ask the generator for a query. `None` means the generator declined.
    pub async fn generate_cypher(&self, request: &SearchRequest<'_>) -> Result<Option<String>> {
        let prompt = cypher_prompt(request.text, request.intent.as_str(), request.entities);
        let raw = self
            .generator
            .complete(truncate_chars(&prompt, self.prompt_char_budget))
            .await?;

        let cypher = strip_code_fences(&raw);
        let cypher = cypher.trim().trim_matches('"').trim();
        if cypher.is_empty() || cypher == NO_QUERY {
            return Ok(None);
        }
        Ok(Some(cypher.to_string()))
    }

    /// Run a statement and return one row map per result row.
    pub async fn execute(&self, cypher: &str) -> Result<Vec<Map<String, Value>>> {
        let body = TxRequest {
            statements: vec![Statement { statement: cypher }],
        };

        let response = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.user, self.password.as_deref())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Unavailable(format!(
                "Neo4j returned {}: {}",
                status, text
            )));
        }

        let parsed: TxResponse = serde_json::from_str(&response.text().await?)?;
        if let Some(error) = parsed.errors.first() {
            return Err(BackendError::QueryExecution(format!(
                "{}: {}",
                error.code, error.message
            )));
        }

        let rows = parsed
            .results
            .into_iter()
            .flat_map(|result| {
                let columns = result.columns;
                result.data.into_iter().map(move |data| {
                    columns
                        .iter()
                        .cloned()
                        .zip(data.row)
                        .collect::<Map<String, Value>>()
                })
            })
            .collect();
        Ok(rows)
    }
}

#[async_trait]
impl RetrievalBackend for Neo4jGraphBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<ResultSet> {
        let Some(cypher) = self.generate_cypher(request).await? else {
            debug!("Generator declined to write a graph query");
            return Ok(ResultSet::empty(BackendKind::Graph));
        };

        debug!(cypher = %cypher, "Running graph query");
        let rows = self.execute(&cypher).await?;
        Ok(ResultSet::new(BackendKind::Graph, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedGenerator;
    use serde_json::json;
    use tablesage_core::{EntityKey, Intent};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn graph_config(server: &MockServer) -> GraphConfig {
        GraphConfig {
            url: server.uri(),
            password: Some("secret".to_string()),
            ..GraphConfig::default()
        }
    }

    fn backend(server: &MockServer, output: &str) -> (Neo4jGraphBackend, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::with_outputs([output]));
        let backend = Neo4jGraphBackend::new(
            &graph_config(server),
            generator.clone(),
            Duration::from_secs(5),
            6_000,
        )
        .unwrap();
        (backend, generator)
    }

    #[test]
    fn test_prompt_lists_known_entities() {
        let entities = EntityMap::new().with(EntityKey::Ingredient, ["truffle"]);
        let prompt = cypher_prompt("truffle dishes?", "trending_insights", &entities);
        assert!(prompt.contains("ingredient_name: truffle"));
        assert!(prompt.contains("User intent: trending_insights"));
        assert!(prompt.ends_with("User question: truffle dishes?\n"));
        assert!(!cypher_prompt("hi", "fallback", &EntityMap::new()).contains("Known entities"));
    }

    #[tokio::test]
    async fn test_rows_become_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(header("Authorization", "Basic bmVvNGo6c2VjcmV0"))
            .and(body_string_contains(
                "MATCH (r:Restaurant) RETURN r.name AS restaurant_name, r.rating AS rating",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "columns": ["restaurant_name", "rating"],
                    "data": [
                        {"row": ["20 Spot", 4.5], "meta": [null, null]},
                        {"row": ["Bay Slice", 4.1], "meta": [null, null]}
                    ]
                }],
                "errors": []
            })))
            .mount(&server)
            .await;

        let (backend, generator) = backend(
            &server,
            "```cypher\nMATCH (r:Restaurant) RETURN r.name AS restaurant_name, r.rating AS rating\n```",
        );
        let entities = EntityMap::new();
        let request = SearchRequest::new("top restaurants", Intent::TrendingInsights, &entities);

        let results = backend.search(&request).await.unwrap();
        assert_eq!(generator.call_count(), 1);
        assert_eq!(results.len(), 2);
        assert_eq!(results.records()[0].get_str("restaurant_name"), Some("20 Spot"));
        assert_eq!(results.records()[1].get("rating"), Some(&json!(4.1)));
    }

    #[tokio::test]
    async fn test_no_query_sentinel_is_empty_without_database_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let (backend, _) = backend(&server, "\"NO_QUERY\"");
        let entities = EntityMap::new();
        let request = SearchRequest::new("tell me a joke", Intent::TrendingInsights, &entities);

        assert!(backend.search(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_neo4j_errors_are_query_execution_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [],
                "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input"}]
            })))
            .mount(&server)
            .await;

        let (backend, _) = backend(&server, "MATCH (r RETURN r");
        let entities = EntityMap::new();
        let request = SearchRequest::new("broken", Intent::TrendingInsights, &entities);

        let err = backend.search(&request).await.unwrap_err();
        assert!(matches!(err, BackendError::QueryExecution(_)));
    }
}
