//! # Embedding provider
//!
//! Contract for the external embedding model: one fixed-dimension dense
//! vector per text. The engine never trains or caches embeddings; it just
//! calls [`EmbeddingProvider::embed`] on insert and on query.
//!
//! [`OpenAiEmbeddings`] is the shipped implementation, speaking the
//! OpenAI-compatible `/embeddings` wire shape over reqwest with the same
//! bounded no-backoff retry as the chat provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MemoryError;
use crate::llm::MAX_ATTEMPTS;

/// Async embedding contract.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text into a vector of exactly [`dimension`](Self::dimension)
    /// floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;

    /// Fixed dimensionality of every vector this provider returns.
    fn dimension(&self) -> usize;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddings {
    /// # Parameters
    /// - `api_base`: Endpoint base including `/v1`.
    /// - `dimension`: Expected vector length; responses of any other length
    ///   are rejected so a misconfigured model fails loudly instead of
    ///   corrupting the index.
    pub fn new(api_base: &str, api_key: &str, model: &str, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/embeddings", api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dimension,
        }
    }

    async fn request_once(&self, text: &str) -> Result<Vec<f32>, String> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: [text],
        };
        let mut request = self.client.post(&self.url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        let response = response.error_for_status().map_err(|e| e.to_string())?;
        let parsed: EmbeddingResponse = response.json().await.map_err(|e| e.to_string())?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| "empty embedding response".to_string())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.request_once(text).await {
                Ok(vector) => {
                    if vector.len() != self.dimension {
                        return Err(MemoryError::Dimension {
                            expected: self.dimension,
                            actual: vector.len(),
                        });
                    }
                    return Ok(vector);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "embedding request failed");
                    last_error = e;
                }
            }
        }
        Err(MemoryError::Embedding(last_error))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_embed_happy_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "object": "list",
                    "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
                    "model": "test-embedder"
                }));
            })
            .await;

        let provider = OpenAiEmbeddings::new(
            &format!("{}/v1", server.base_url()),
            "key",
            "test-embedder",
            3,
        );
        let vector = provider.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(provider.dimension(), 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_embed_wrong_dimension_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "data": [{"embedding": [0.1, 0.2]}]
                }));
            })
            .await;

        let provider =
            OpenAiEmbeddings::new(&format!("{}/v1", server.base_url()), "", "m", 3);
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            MemoryError::Dimension {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_embed_retries_then_fails() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(503).body("overloaded");
            })
            .await;

        let provider =
            OpenAiEmbeddings::new(&format!("{}/v1", server.base_url()), "", "m", 3);
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, MemoryError::Embedding(_)));
        assert_eq!(mock.hits_async().await, MAX_ATTEMPTS);
    }
}
