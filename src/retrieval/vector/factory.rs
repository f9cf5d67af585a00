use std::sync::Arc;

use tracing::info;

use super::sqlite::SqliteVectorStore;
use super::types::{VectorError, VectorStore};
use crate::config::Config;

/// Supported vector store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStoreType {
    Sqlite,
}

impl VectorStoreType {
    pub fn parse(s: &str) -> Result<Self, VectorError> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(VectorStoreType::Sqlite),
            _ => Err(VectorError::Config(format!(
                "Unsupported VECTOR_STORE type: {}. Supported types: sqlite",
                s
            ))),
        }
    }
}

/// Factory for creating vector store handles.
pub struct VectorStoreFactory;

impl VectorStoreFactory {
    pub async fn from_config(config: &Config) -> Result<Arc<dyn VectorStore>, VectorError> {
        let store_type = VectorStoreType::parse(&config.vector_store)?;
        info!("Initializing vector store: {:?}", store_type);

        match store_type {
            VectorStoreType::Sqlite => {
                let store = SqliteVectorStore::open(&config.database_url).await?;
                Ok(Arc::new(store))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_type_parsing() {
        assert_eq!(
            VectorStoreType::parse("sqlite").unwrap(),
            VectorStoreType::Sqlite
        );
        assert_eq!(
            VectorStoreType::parse("SQLITE").unwrap(),
            VectorStoreType::Sqlite
        );
        assert!(VectorStoreType::parse("chroma").is_err());
    }
}
