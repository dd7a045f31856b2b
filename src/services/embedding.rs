/// Embedding provider for semantic search
///
/// Maps query text to a dense vector in the same space as the item
/// embeddings stored in the index. Query vectors are computed per request and
/// never persisted.
use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::instrument;

use crate::{
    error::{AppError, AppResult, BackendContext},
    models::EMBEDDING_DIMS,
};

/// Trait for text embedding backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Encodes text into a vector of [`EMBEDDING_DIMS`] floats.
    /// Identical input yields an identical vector.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a str,
}

/// Client for a text-embeddings inference server (`POST /embed`)
#[derive(Clone)]
pub struct HttpEmbedder {
    http_client: HttpClient,
    api_url: String,
}

impl HttpEmbedder {
    pub fn new(api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}/embed", self.api_url);

        let response = self
            .http_client
            .post(&url)
            .json(&EmbedRequest { inputs: text })
            .send()
            .await
            .during("embedding.embed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::backend(
                "embedding.embed",
                format!("Embedding service returned status {}: {}", status, body),
            ));
        }

        let mut vectors: Vec<Vec<f32>> = response.json().await.during("embedding.embed")?;
        if vectors.is_empty() {
            return Err(AppError::backend(
                "embedding.embed",
                "Embedding service returned no vectors",
            ));
        }

        check_dimensions(vectors.swap_remove(0))
    }
}

/// Rejects vectors that do not match the index's dense_vector dimension
pub fn check_dimensions(vector: Vec<f32>) -> AppResult<Vec<f32>> {
    if vector.len() != EMBEDDING_DIMS {
        return Err(AppError::backend(
            "embedding.embed",
            format!(
                "expected {} dimensions, got {}",
                EMBEDDING_DIMS,
                vector.len()
            ),
        ));
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimensions_accepts_384() {
        let vector = check_dimensions(vec![0.0; EMBEDDING_DIMS]).unwrap();
        assert_eq!(vector.len(), 384);
    }

    #[test]
    fn test_check_dimensions_rejects_other_sizes() {
        let err = check_dimensions(vec![0.0; 768]).unwrap_err();
        assert_eq!(err.operation(), Some("embedding.embed"));
        assert!(err.to_string().contains("expected 384 dimensions, got 768"));
    }

    #[test]
    fn test_embed_request_shape() {
        let body = serde_json::to_value(EmbedRequest {
            inputs: "lost kingdom",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "inputs": "lost kingdom" }));
    }
}
