//! Similarity search over menu embeddings stored in Qdrant.

use crate::error::{BackendError, Result};
use crate::traits::{RetrievalBackend, SearchRequest};
use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{ScoredPoint, SearchPointsBuilder};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tablesage_core::{BackendKind, ResultSet};
use tablesage_core::config::{EmbeddingConfig, VectorConfig};
use tracing::{debug, info};

/// Trait for turning query text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// OpenAI-compatible `/embeddings` client.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| BackendError::NotConfigured(format!("invalid embedding key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        info!("Initialized embedder with model: {}", config.model);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: vec![text],
            model: &self.model,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Unavailable(format!(
                "embedding API returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&response.text().await?)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| BackendError::Malformed("embedding response has no data".to_string()))
    }
}

/// Payload of a scored point as a record, with the similarity score added.
fn point_record(point: ScoredPoint) -> Map<String, Value> {
    let mut fields: Map<String, Value> = point
        .payload
        .into_iter()
        .map(|(key, value)| (key, value.into_json()))
        .collect();
    fields.insert("score".to_string(), json!(f64::from(point.score)));
    fields
}

/// Vector backend: embed the query, then ask Qdrant for the `top_k`
/// nearest menu entries.
pub struct QdrantVectorBackend {
    client: Qdrant,
    collection: String,
    top_k: usize,
    embedder: Arc<dyn Embedder>,
}

impl QdrantVectorBackend {
    /// Build the client. The connection is opened on the first search.
    pub fn new(config: &VectorConfig, embedder: Arc<dyn Embedder>, timeout: Duration) -> Result<Self> {
        let mut client_config = Qdrant::from_url(&config.qdrant_url);
        if let Some(api_key) = &config.qdrant_api_key {
            client_config.api_key = Some(api_key.clone());
        }
        client_config.timeout = timeout;

        let client = client_config
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("Failed to create Qdrant client: {e}")))?;

        info!(url = %config.qdrant_url, collection = %config.collection, "Initialized Qdrant client");

        Ok(Self {
            client,
            collection: config.collection.clone(),
            top_k: config.top_k,
            embedder,
        })
    }
}

#[async_trait]
impl RetrievalBackend for QdrantVectorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<ResultSet> {
        let vector = self.embedder.embed(request.text).await?;

        let search = SearchPointsBuilder::new(&self.collection, vector, self.top_k as u64)
            .with_payload(true);
        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| BackendError::Unavailable(format!("Qdrant search failed: {e}")))?;
        debug!(hits = response.result.len(), "Vector search complete");

        let rows = response
            .result
            .into_iter()
            .take(self.top_k)
            .map(point_record);
        Ok(ResultSet::new(BackendKind::Vector, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::FixedEmbedder;
    use qdrant_client::qdrant::Value as QdrantValue;
    use std::collections::HashMap;
    use tablesage_core::{EntityMap, Intent};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_openai_embedder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let config = EmbeddingConfig {
            endpoint: format!("{}/v1/embeddings", server.uri()),
            api_key: Some("sk-test".to_string()),
            ..EmbeddingConfig::default()
        };
        let embedder = OpenAiEmbedder::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(embedder.embed("vegan tacos").await.unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_point_payload_becomes_record() {
        let mut payload = HashMap::new();
        payload.insert("restaurant_name".to_string(), QdrantValue::from("Taco Loco"));
        payload.insert("menu_item".to_string(), QdrantValue::from("Vegan Taco"));
        payload.insert("price".to_string(), QdrantValue::from(8.5));
        let point = ScoredPoint {
            payload,
            score: 0.5,
            ..Default::default()
        };

        let record = point_record(point);
        assert_eq!(record["restaurant_name"], json!("Taco Loco"));
        assert_eq!(record["menu_item"], json!("Vegan Taco"));
        assert_eq!(record["price"], json!(8.5));
        assert_eq!(record["score"], json!(0.5));
    }

    #[tokio::test]
    async fn test_unreachable_qdrant_is_unavailable() {
        let config = VectorConfig {
            qdrant_url: "http://127.0.0.1:1".to_string(),
            ..VectorConfig::default()
        };
        let backend = QdrantVectorBackend::new(
            &config,
            Arc::new(FixedEmbedder::new(vec![0.5; 4])),
            Duration::from_secs(2),
        )
        .unwrap();
        let entities = EntityMap::new();
        let request = SearchRequest::new("anything", Intent::MenuInnovation, &entities);

        assert!(matches!(
            backend.search(&request).await,
            Err(BackendError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_skips_search() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let embedding = EmbeddingConfig {
            endpoint: format!("{}/v1/embeddings", server.uri()),
            ..EmbeddingConfig::default()
        };
        let embedder = OpenAiEmbedder::new(&embedding, Duration::from_secs(5)).unwrap();
        let backend = QdrantVectorBackend::new(
            &VectorConfig::default(),
            Arc::new(embedder),
            Duration::from_secs(5),
        )
        .unwrap();
        let entities = EntityMap::new();
        let request = SearchRequest::new("vegan tacos", Intent::ComparativeAnalysis, &entities);

        let err = backend.search(&request).await.unwrap_err();
        assert!(err.to_string().contains("embedding API returned 503"));
    }

    #[tokio::test]
    #[ignore] // Requires Qdrant server running with a populated collection
    async fn test_live_search_returns_scored_payloads() {
        let config = VectorConfig {
            top_k: 2,
            ..VectorConfig::default()
        };
        let backend = QdrantVectorBackend::new(
            &config,
            Arc::new(FixedEmbedder::new(vec![0.1; 1536])),
            Duration::from_secs(5),
        )
        .unwrap();
        let entities = EntityMap::new();
        let request = SearchRequest::new("vegan tacos", Intent::ComparativeAnalysis, &entities);

        let results = backend.search(&request).await.unwrap();
        assert!(results.len() <= 2);
        assert!(results.records().iter().all(|record| record.get("score").is_some()));
    }
}
