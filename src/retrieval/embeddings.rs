use std::sync::Arc;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;

/// Error types for embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("backend unreachable: {0}")]
    Unavailable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Trait for embedding providers.
///
/// One explicit interface with swappable backend implementations selected by
/// configuration. A failed call is always surfaced as an error — a zero or
/// empty vector is never substituted, as it would corrupt similarity
/// rankings in the store.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a list of texts, one vector per input, in
    /// input order.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Known output dimensionality, when the backend advertises one.
    fn dimension(&self) -> Option<usize>;

    /// Backend model identity.
    fn model_name(&self) -> &str;
}

/// Reject degenerate vectors the moment a backend produces them.
fn check_vectors(
    vectors: &[Vec<f32>],
    expected_count: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected_count,
            vectors.len()
        )));
    }
    for vector in vectors {
        if vector.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "backend returned an empty vector".to_string(),
            ));
        }
        if vector.iter().all(|v| *v == 0.0) {
            return Err(EmbeddingError::InvalidResponse(
                "backend returned an all-zero vector".to_string(),
            ));
        }
    }
    Ok(())
}

/// Ollama embedding provider, talking to the native `/api/embed` endpoint.
pub struct OllamaEmbeddings {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: Option<usize>,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddings {
    pub fn new(
        base_url: &str,
        model: &str,
        dimension: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        if model.is_empty() {
            return Err(EmbeddingError::Config(
                "embedding model name cannot be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(
            "Initialized Ollama embeddings: model={}, base_url={}",
            model, base_url
        );

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding batch of {} texts via Ollama", texts.len());

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: &texts,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout(format!("Ollama embed request: {}", e))
                } else {
                    EmbeddingError::Unavailable(format!("Ollama embed request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        check_vectors(&parsed.embeddings, texts.len())?;
        Ok(parsed.embeddings)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible embedding provider.
pub struct OpenAIEmbeddings {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: Option<usize>,
}

impl OpenAIEmbeddings {
    pub fn new(
        api_key: &str,
        api_base: Option<&str>,
        model: &str,
        dimension: Option<usize>,
    ) -> Result<Self, EmbeddingError> {
        if model.is_empty() {
            return Err(EmbeddingError::Config(
                "embedding model name cannot be empty".to_string(),
            ));
        }

        // Known dimensionalities for stock OpenAI models; anything else is
        // learned by the store on first upsert.
        let dimension = dimension.or(match model {
            "text-embedding-3-small" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            "text-embedding-ada-002" => Some(1536),
            _ => None,
        });

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }

        info!(
            "Initialized OpenAI embeddings: model={}, dimension={:?}",
            model, dimension
        );

        Ok(Self {
            client: Client::with_config(config),
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding batch of {} texts via OpenAI API", texts.len());

        let count = texts.len();
        let request = CreateEmbeddingRequest {
            model: self.model.clone(),
            input: EmbeddingInput::StringArray(texts),
            encoding_format: None,
            user: None,
            dimensions: None,
        };

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("OpenAI API: {}", e)))?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

        check_vectors(&vectors, count)?;
        Ok(vectors)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Factory for creating embedding providers from configuration.
pub struct EmbeddingFactory;

impl EmbeddingFactory {
    pub fn from_config(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        info!("Creating embedding provider: {}", config.embedding_engine);

        match config.embedding_engine.as_str() {
            "ollama" => {
                let provider = OllamaEmbeddings::new(
                    &config.ollama_base_url,
                    &config.embedding_model,
                    config.embedding_dimension,
                    Duration::from_secs(config.embed_timeout_secs),
                )?;
                Ok(Arc::new(provider))
            }
            "openai" => {
                let api_key = config.openai_api_key.as_deref().ok_or_else(|| {
                    EmbeddingError::Config(
                        "OPENAI_API_KEY is required for the openai engine".to_string(),
                    )
                })?;
                let provider = OpenAIEmbeddings::new(
                    api_key,
                    config.openai_api_base.as_deref(),
                    &config.embedding_model,
                    config.embedding_dimension,
                )?;
                Ok(Arc::new(provider))
            }
            other => Err(EmbeddingError::Config(format!(
                "Unsupported embedding engine: {}. Supported: ollama, openai",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_dimension_map() {
        let provider = OpenAIEmbeddings::new(
            "test_key",
            None,
            "text-embedding-3-small",
            None,
        )
        .unwrap();
        assert_eq!(provider.dimension(), Some(1536));
        assert_eq!(provider.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn explicit_dimension_wins() {
        let provider =
            OpenAIEmbeddings::new("test_key", None, "text-embedding-3-small", Some(256)).unwrap();
        assert_eq!(provider.dimension(), Some(256));
    }

    #[test]
    fn empty_model_rejected() {
        assert!(OllamaEmbeddings::new(
            "http://localhost:11434",
            "",
            None,
            Duration::from_secs(5)
        )
        .is_err());
        assert!(OpenAIEmbeddings::new("k", None, "", None).is_err());
    }

    #[test]
    fn degenerate_vectors_rejected() {
        assert!(check_vectors(&[vec![0.1, 0.2]], 1).is_ok());
        assert!(matches!(
            check_vectors(&[vec![]], 1),
            Err(EmbeddingError::InvalidResponse(_))
        ));
        assert!(matches!(
            check_vectors(&[vec![0.0, 0.0, 0.0]], 1),
            Err(EmbeddingError::InvalidResponse(_))
        ));
        assert!(matches!(
            check_vectors(&[vec![0.1]], 2),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }
}
