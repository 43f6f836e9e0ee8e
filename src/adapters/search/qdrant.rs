//! Qdrant similarity index with Ollama embeddings.
//!
//! Text is embedded through Ollama's `/api/embeddings` endpoint and stored as
//! a point in a Qdrant collection, keyed by the memory id with the owning
//! user's external id and app id in the payload. Every query and delete is
//! filtered on both. The collection is created on first use
//! with the dimension of the first embedding and cosine distance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SearchConfig;
use crate::domain::ports::{IndexEntry, SearchHit, SearchIndex};

pub struct QdrantSearchIndex {
    config: SearchConfig,
    client: reqwest::Client,
    collection_ready: OnceCell<()>,
}

impl QdrantSearchIndex {
    pub fn new(config: SearchConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DomainError::ExecutionFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            collection_ready: OnceCell::new(),
        })
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/collections/{}",
            self.config.qdrant_url.trim_end_matches('/'),
            self.config.collection
        )
    }

    fn qdrant(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.qdrant_api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.embedding_url.trim_end_matches('/'));
        let request = OllamaEmbeddingRequest {
            model: &self.config.embedding_model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| unavailable(format!("Embedding request failed: {}", e)))?;
        let response = check_status("Embedding API", response).await?;

        let body: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| DomainError::SerializationError(format!("Failed to parse embedding response: {}", e)))?;

        if body.embedding.is_empty() {
            return Err(unavailable("Embedding API returned an empty vector".to_string()));
        }
        Ok(body.embedding)
    }

    async fn ensure_collection(&self, dimension: usize) -> DomainResult<()> {
        self.collection_ready
            .get_or_try_init(|| async {
                let url = self.collection_url();
                let existing = self
                    .qdrant(reqwest::Method::GET, url.clone())
                    .send()
                    .await
                    .map_err(|e| unavailable(format!("Qdrant request failed: {}", e)))?;

                if existing.status().is_success() {
                    return Ok(());
                }
                if existing.status() != reqwest::StatusCode::NOT_FOUND {
                    return check_status("Qdrant", existing).await.map(|_| ());
                }

                let created = self
                    .qdrant(reqwest::Method::PUT, url)
                    .json(&json!({
                        "vectors": { "size": dimension, "distance": "Cosine" }
                    }))
                    .send()
                    .await
                    .map_err(|e| unavailable(format!("Qdrant request failed: {}", e)))?;
                check_status("Qdrant", created).await?;

                tracing::info!(collection = %self.config.collection, dimension, "created qdrant collection");
                Ok(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl SearchIndex for QdrantSearchIndex {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn add(&self, entry: &IndexEntry) -> DomainResult<()> {
        let vector = self.embed(&entry.content).await?;
        self.ensure_collection(vector.len()).await?;

        let body = json!({
            "points": [{
                "id": entry.memory_id.to_string(),
                "vector": vector,
                "payload": {
                    "user_id": entry.user_id,
                    "app_id": entry.app_id.to_string(),
                    "data": entry.content,
                    "created_at": entry.created_at.to_rfc3339(),
                }
            }]
        });

        let response = self
            .qdrant(reqwest::Method::PUT, format!("{}/points?wait=true", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(format!("Qdrant request failed: {}", e)))?;
        check_status("Qdrant", response).await?;
        Ok(())
    }

    async fn query(
        &self,
        user_id: &str,
        app_id: Uuid,
        text: &str,
        limit: usize,
    ) -> DomainResult<Vec<SearchHit>> {
        let vector = self.embed(text).await?;
        self.ensure_collection(vector.len()).await?;

        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "filter": { "must": scope_conditions(user_id, app_id) }
        });

        let response = self
            .qdrant(reqwest::Method::POST, format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(format!("Qdrant request failed: {}", e)))?;
        let response = check_status("Qdrant", response).await?;

        let parsed: QdrantSearchResponse = response
            .json()
            .await
            .map_err(|e| DomainError::SerializationError(format!("Failed to parse search response: {}", e)))?;

        parsed
            .result
            .into_iter()
            .map(|point| {
                let memory_id = match &point.id {
                    serde_json::Value::String(s) => Uuid::parse_str(s)
                        .map_err(|e| DomainError::SerializationError(e.to_string()))?,
                    other => {
                        return Err(DomainError::SerializationError(format!(
                            "unexpected point id: {}",
                            other
                        )))
                    }
                };
                Ok(SearchHit {
                    memory_id,
                    content: point.payload.data,
                    score: point.score,
                })
            })
            .collect()
    }

    async fn delete(&self, user_id: &str, memory_id: Uuid) -> DomainResult<()> {
        let body = json!({
            "filter": {
                "must": [
                    { "has_id": [memory_id.to_string()] },
                    { "key": "user_id", "match": { "value": user_id } }
                ]
            }
        });

        let response = self
            .qdrant(reqwest::Method::POST, format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(format!("Qdrant request failed: {}", e)))?;
        check_status("Qdrant", response).await?;
        Ok(())
    }

    async fn delete_all(&self, user_id: &str, app_id: Uuid) -> DomainResult<()> {
        let body = json!({ "filter": { "must": scope_conditions(user_id, app_id) } });

        let response = self
            .qdrant(reqwest::Method::POST, format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(format!("Qdrant request failed: {}", e)))?;
        check_status("Qdrant", response).await?;
        Ok(())
    }
}

/// Payload conditions confining a request to one user's app.
fn scope_conditions(user_id: &str, app_id: Uuid) -> serde_json::Value {
    json!([
        { "key": "user_id", "match": { "value": user_id } },
        { "key": "app_id", "match": { "value": app_id.to_string() } }
    ])
}

fn unavailable(message: String) -> DomainError {
    DomainError::SearchUnavailable(message)
}

async fn check_status(service: &str, response: reqwest::Response) -> DomainResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response body".to_string());
    Err(unavailable(format!("{} returned {}: {}", service, status, body)))
}

// -- Ollama / Qdrant wire types --

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    result: Vec<QdrantScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct QdrantScoredPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: QdrantPayload,
}

#[derive(Debug, Default, Deserialize)]
struct QdrantPayload {
    #[serde(default)]
    data: String,
}
