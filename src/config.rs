use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Runtime configuration, loaded from environment variables.
///
/// Every parameter the chunking and retrieval core consumes is validated at
/// startup; out-of-range values fail fast with `InvalidConfiguration` rather
/// than deferring to first use.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Sqlite URL for the vector store, e.g. `sqlite://wiki_rag.db`.
    pub database_url: String,

    /// Vector store backend identity; `sqlite` is the only one supported.
    pub vector_store: String,

    /// Directory of cleaned article JSON files (one file per article).
    pub articles_dir: String,

    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,

    /// Embedding backend identity: `ollama` or `openai`.
    pub embedding_engine: String,
    pub embedding_model: String,
    /// Expected vector dimensionality; when unset the store learns it from
    /// the first upsert.
    pub embedding_dimension: Option<usize>,
    pub embed_timeout_secs: u64,

    pub ollama_base_url: String,
    pub openai_api_base: Option<String>,
    pub openai_api_key: Option<String>,

    /// Chat backend (OpenAI-compatible; Ollama's `/v1` by default).
    pub chat_model: String,
    pub chat_api_base: String,

    /// Default number of chunks retrieved per query.
    pub retrieval_top_k: usize,

    /// Bounded worker count for the offline ingest pipeline.
    pub ingest_workers: usize,
    /// Extra attempts for a failed store write before giving up an article.
    pub ingest_retries: u32,

    /// Prefix for article source URLs derived from titles, used when an
    /// article record carries no explicit URL.
    pub source_url_base: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> AppResult<Self> {
        let ollama_base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let chat_api_base = std::env::var("CHAT_API_BASE")
            .unwrap_or_else(|_| format!("{}/v1", ollama_base_url.trim_end_matches('/')));

        let config = Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 8080)?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://wiki_rag.db".to_string()),
            vector_store: std::env::var("VECTOR_STORE")
                .unwrap_or_else(|_| "sqlite".to_string())
                .to_lowercase(),
            articles_dir: std::env::var("ARTICLES_DIR")
                .unwrap_or_else(|_| "clean_articles".to_string()),
            chunk_size: env_parse("CHUNK_SIZE", 1000)?,
            chunk_overlap: env_parse("CHUNK_OVERLAP", 150)?,
            embedding_engine: std::env::var("EMBEDDING_ENGINE")
                .unwrap_or_else(|_| "ollama".to_string())
                .to_lowercase(),
            embedding_model: require_env("EMBEDDING_MODEL")?,
            embedding_dimension: env_parse_opt("EMBEDDING_DIMENSION")?,
            embed_timeout_secs: env_parse("EMBED_TIMEOUT_SECS", 60)?,
            ollama_base_url,
            openai_api_base: std::env::var("OPENAI_API_BASE").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            chat_model: require_env("CHAT_MODEL")?,
            chat_api_base,
            retrieval_top_k: env_parse("RETRIEVAL_TOP_K", 5)?,
            ingest_workers: env_parse("INGEST_WORKERS", 4)?,
            ingest_retries: env_parse("INGEST_RETRIES", 2)?,
            source_url_base: std::env::var("SOURCE_URL_BASE").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Range-check everything the core consumes. Called from `from_env`, but
    /// callers constructing a `Config` by hand should call it too.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::InvalidConfiguration(
                "CHUNK_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::InvalidConfiguration(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_top_k == 0 {
            return Err(AppError::InvalidConfiguration(
                "RETRIEVAL_TOP_K must be greater than zero".to_string(),
            ));
        }
        if self.ingest_workers == 0 {
            return Err(AppError::InvalidConfiguration(
                "INGEST_WORKERS must be greater than zero".to_string(),
            ));
        }
        if let Some(dim) = self.embedding_dimension {
            if dim == 0 {
                return Err(AppError::InvalidConfiguration(
                    "EMBEDDING_DIMENSION must be greater than zero".to_string(),
                ));
            }
        }
        if self.vector_store != "sqlite" {
            return Err(AppError::InvalidConfiguration(format!(
                "Unsupported VECTOR_STORE: {}. Supported: sqlite",
                self.vector_store
            )));
        }
        match self.embedding_engine.as_str() {
            "ollama" => {}
            "openai" => {
                if self.openai_api_key.is_none() {
                    return Err(AppError::InvalidConfiguration(
                        "OPENAI_API_KEY is required when EMBEDDING_ENGINE=openai".to_string(),
                    ));
                }
            }
            other => {
                return Err(AppError::InvalidConfiguration(format!(
                    "Unsupported EMBEDDING_ENGINE: {}. Supported: ollama, openai",
                    other
                )));
            }
        }
        Ok(())
    }
}

fn require_env(name: &str) -> AppResult<String> {
    std::env::var(name).map_err(|_| {
        AppError::InvalidConfiguration(format!("Missing required environment variable: {}", name))
    })
}

fn env_parse<T: FromStr>(name: &str, default: T) -> AppResult<T> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            AppError::InvalidConfiguration(format!("Invalid value for {}: {}", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

fn env_parse_opt<T: FromStr>(name: &str) -> AppResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| {
            AppError::InvalidConfiguration(format!("Invalid value for {}: {}", name, raw))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite://test.db".to_string(),
            vector_store: "sqlite".to_string(),
            articles_dir: "clean_articles".to_string(),
            chunk_size: 1000,
            chunk_overlap: 150,
            embedding_engine: "ollama".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: None,
            embed_timeout_secs: 60,
            ollama_base_url: "http://localhost:11434".to_string(),
            openai_api_base: None,
            openai_api_key: None,
            chat_model: "llama3".to_string(),
            chat_api_base: "http://localhost:11434/v1".to_string(),
            retrieval_top_k: 5,
            ingest_workers: 4,
            ingest_retries: 2,
            source_url_base: None,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let mut config = base_config();
        config.chunk_overlap = 1000;
        assert!(matches!(
            config.validate(),
            Err(AppError::InvalidConfiguration(_))
        ));

        config.chunk_overlap = 1200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let mut config = base_config();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_top_k_rejected() {
        let mut config = base_config();
        config.retrieval_top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn openai_engine_requires_api_key() {
        let mut config = base_config();
        config.embedding_engine = "openai".to_string();
        assert!(config.validate().is_err());

        config.openai_api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_vector_store_rejected() {
        let mut config = base_config();
        config.vector_store = "chroma".to_string();
        assert!(matches!(
            config.validate(),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn unknown_engine_rejected() {
        let mut config = base_config();
        config.embedding_engine = "duck-typed".to_string();
        assert!(config.validate().is_err());
    }
}
