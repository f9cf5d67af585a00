pub mod chunking;
pub mod embeddings;
pub mod retriever;
pub mod vector;
