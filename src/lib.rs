//! Wiki article chunking, embedding and retrieval pipeline.
//!
//! Build time: cleaned article records are split into overlapping chunks,
//! embedded, and upserted into a durable sqlite-backed vector store. Query
//! time: a question is embedded, the nearest chunks are retrieved and
//! assembled into a context block for an OpenAI-compatible chat backend.

pub mod config;
pub mod error;
pub mod models;
pub mod retrieval;
pub mod routes;
pub mod services;
