use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::retrieval::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::retrieval::vector::{QueryMatch, VectorStore};

/// Outcome of a retrieval pass.
///
/// `NoMatches` is an explicit signal, distinct from an empty string: the
/// answerer branches on it rather than guessing whether an empty context
/// meant "nothing indexed" or "nothing worth surfacing".
#[derive(Debug, Clone)]
pub enum RetrievedContext {
    NoMatches,
    Found {
        /// Assembled context block, ranked order preserved, each chunk
        /// tagged with its source for traceability.
        block: String,
        matches: Vec<QueryMatch>,
    },
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        matches!(self, RetrievedContext::NoMatches)
    }

    pub fn matches(&self) -> &[QueryMatch] {
        match self {
            RetrievedContext::NoMatches => &[],
            RetrievedContext::Found { matches, .. } => matches,
        }
    }
}

/// Query-time retrieval: embed the question, find the nearest chunks,
/// assemble them into one context block.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Retrieve the top-k chunks nearest to `query_text`. `top_k` is
    /// validated before any I/O happens.
    pub async fn retrieve(&self, query_text: &str, top_k: usize) -> AppResult<RetrievedContext> {
        if top_k == 0 {
            return Err(AppError::InvalidQuery(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if query_text.trim().is_empty() {
            return Err(AppError::InvalidQuery("query text is empty".to_string()));
        }

        let mut vectors = self.embedder.embed(vec![query_text.to_string()]).await?;
        let query_vector = vectors.pop().ok_or_else(|| {
            AppError::Embedding(EmbeddingError::InvalidResponse(
                "backend returned no embedding for the query".to_string(),
            ))
        })?;

        let matches = self.store.query(&query_vector, top_k).await?;
        if matches.is_empty() {
            info!("No relevant chunks for query");
            return Ok(RetrievedContext::NoMatches);
        }

        debug!(
            matches = matches.len(),
            best_score = matches[0].score,
            "Assembled retrieval context"
        );
        Ok(RetrievedContext::Found {
            block: assemble_block(&matches),
            matches,
        })
    }
}

/// Render matches into one block, highest similarity first. The
/// `Source:`/`Content:` tagging is what the answer prompt expects when it
/// cites its sources.
fn assemble_block(matches: &[QueryMatch]) -> String {
    let mut block = String::new();
    for m in matches {
        block.push_str(&format!(
            "Source: {}\nContent: {}\n\n",
            m.metadata.source_url, m.text
        ));
    }
    block
}
