use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::error::AppResult;
use crate::retrieval::retriever::{RetrievedContext, Retriever};
use crate::retrieval::vector::{QueryMatch, VectorStore};
use crate::services::answer::{AnswerService, ChatTurn};

/// Shared application state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn VectorStore>,
    pub retriever: Retriever,
    pub answerer: AnswerService,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MatchResponse {
    chunk_id: String,
    article_id: String,
    position: usize,
    title: String,
    source_url: String,
    text: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    pub top_k: Option<usize>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

pub fn create_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/health/db", web::get().to(health_db))
        .route("/api/query", web::post().to(query))
        .route("/api/ask", web::post().to(ask));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": true }))
}

/// Liveness plus a store round trip, reporting how many chunks are indexed.
async fn health_db(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let chunks = state.store.count().await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": true,
        "chunks": chunks,
        "dimension": state.store.dimension().await?,
    })))
}

/// Raw retrieval: embed the query and return the ranked matches along with
/// the assembled context block. No generation happens here.
async fn query(
    state: web::Data<AppState>,
    form: web::Json<QueryRequest>,
) -> AppResult<HttpResponse> {
    let top_k = form.top_k.unwrap_or(state.config.retrieval_top_k);
    let context = state.retriever.retrieve(&form.query, top_k).await?;

    let (block, matches) = match &context {
        RetrievedContext::NoMatches => (None, Vec::new()),
        RetrievedContext::Found { block, matches } => (
            Some(block.clone()),
            matches
                .iter()
                .map(|m| MatchResponse {
                    chunk_id: m.chunk_id.clone(),
                    article_id: m.article_id.clone(),
                    position: m.position,
                    title: m.metadata.title.clone(),
                    source_url: m.metadata.source_url.clone(),
                    text: m.text.clone(),
                    score: m.score,
                })
                .collect(),
        ),
    };

    Ok(HttpResponse::Ok().json(json!({
        "query": form.query,
        "matches": matches,
        "context": block,
    })))
}

/// Full question answering: retrieve, then forward context and question to
/// the chat backend. Sources are returned alongside the answer.
async fn ask(state: web::Data<AppState>, form: web::Json<AskRequest>) -> AppResult<HttpResponse> {
    let top_k = form.top_k.unwrap_or(state.config.retrieval_top_k);
    let context = state.retriever.retrieve(&form.query, top_k).await?;
    let answer = state
        .answerer
        .answer(&form.query, &form.history, &context)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "answer": answer,
        "sources": collect_sources(context.matches()),
        "no_context": context.is_empty(),
    })))
}

/// Unique source URLs in rank order, keeping the first occurrence of each.
fn collect_sources(matches: &[QueryMatch]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    matches
        .iter()
        .map(|m| m.metadata.source_url.as_str())
        .filter(|url| seen.insert(*url))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::vector::ChunkMetadata;

    fn query_match(position: usize, source_url: &str) -> QueryMatch {
        QueryMatch {
            chunk_id: format!("art#{:05}", position),
            article_id: "art".to_string(),
            position,
            text: "chunk text".to_string(),
            metadata: ChunkMetadata {
                title: "Article".to_string(),
                source_url: source_url.to_string(),
                content_hash: "h".to_string(),
            },
            score: 1.0 - position as f32 * 0.1,
        }
    }

    #[test]
    fn sources_deduplicated_even_when_interleaved() {
        // Two chunks of article A split in rank order by a chunk of B.
        let matches = vec![
            query_match(0, "https://wiki.example/w/A"),
            query_match(1, "https://wiki.example/w/B"),
            query_match(2, "https://wiki.example/w/A"),
        ];
        assert_eq!(
            collect_sources(&matches),
            vec!["https://wiki.example/w/A", "https://wiki.example/w/B"]
        );
    }

    #[test]
    fn sources_keep_rank_order() {
        let matches = vec![
            query_match(0, "https://wiki.example/w/B"),
            query_match(1, "https://wiki.example/w/A"),
        ];
        assert_eq!(
            collect_sources(&matches),
            vec!["https://wiki.example/w/B", "https://wiki.example/w/A"]
        );
        assert!(collect_sources(&[]).is_empty());
    }
}
