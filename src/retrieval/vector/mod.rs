pub mod factory;
pub mod sqlite;
pub mod types;

pub use types::{ChunkMetadata, QueryMatch, VectorError, VectorItem, VectorStore};
