//! Offline ingest driver: chunks, embeds, and indexes every cleaned article
//! under the configured articles directory.
//!
//! Usage: `wiki-rag-ingest [--rebuild]`
//!
//! `--rebuild` reprocesses every article even when its stored content hash is
//! unchanged.

use std::path::Path;

use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use wiki_rag::config::Config;
use wiki_rag::retrieval::embeddings::EmbeddingFactory;
use wiki_rag::retrieval::vector::factory::VectorStoreFactory;
use wiki_rag::services::IngestService;

const FAILURE_MANIFEST: &str = "failed_articles.txt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut rebuild = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--rebuild" | "--force" => rebuild = true,
            "--help" | "-h" => {
                println!("Usage: wiki-rag-ingest [--rebuild]");
                return Ok(());
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    let config = Config::from_env()?;
    let store = VectorStoreFactory::from_config(&config).await?;
    let embedder = EmbeddingFactory::from_config(&config)?;
    info!(
        "Ingesting from {} with {} ({} chunks already indexed)",
        config.articles_dir,
        embedder.model_name(),
        store.count().await?
    );

    let service = IngestService::new(&config, store.clone(), embedder)?;
    let report = service.run(rebuild).await?;
    report.write_manifest(Path::new(FAILURE_MANIFEST))?;

    info!(
        "Done: processed={}, skipped={}, failed={}, chunks indexed={}",
        report.processed,
        report.skipped,
        report.failed.len(),
        store.count().await?
    );
    store.close().await;

    if !report.failed.is_empty() {
        error!(
            "{} articles failed; see {}",
            report.failed.len(),
            FAILURE_MANIFEST
        );
        std::process::exit(1);
    }
    Ok(())
}
