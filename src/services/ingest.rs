use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::{Article, Chunk};
use crate::retrieval::chunking::Chunker;
use crate::retrieval::embeddings::EmbeddingProvider;
use crate::retrieval::vector::{ChunkMetadata, VectorItem, VectorStore};

/// On-disk shape of one cleaned article record.
#[derive(Debug, Deserialize)]
struct ArticleFile {
    title: Option<String>,
    content: String,
    url: Option<String>,
    fetched_at: Option<DateTime<Utc>>,
}

/// Summary of one ingest run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub processed: usize,
    pub skipped: usize,
    pub total_chunks: usize,
    /// (title, error) for every article that failed after all retries.
    pub failed: Vec<(String, String)>,
}

impl IngestReport {
    /// Write the failure manifest so a later run can be pointed at just the
    /// articles that need another pass. No file is written when nothing
    /// failed.
    pub fn write_manifest(&self, path: &Path) -> AppResult<()> {
        if self.failed.is_empty() {
            return Ok(());
        }
        let mut lines = String::new();
        for (title, err) in &self.failed {
            lines.push_str(&format!("{}\t{}\n", title, err));
        }
        std::fs::write(path, lines)?;
        info!(
            "Wrote failure manifest: {} ({} articles)",
            path.display(),
            self.failed.len()
        );
        Ok(())
    }
}

/// Manifest label for a file-level failure, before a title is known.
fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

enum ArticleOutcome {
    Processed { chunks: usize },
    Skipped,
    Failed { title: String, error: String },
}

/// Offline batch pipeline: load cleaned articles, chunk, embed, and upsert
/// into the vector store with bounded concurrency and per-article retry.
pub struct IngestService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    workers: usize,
    retries: u32,
    articles_dir: PathBuf,
    source_url_base: Option<String>,
}

impl IngestService {
    pub fn new(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        Ok(Self {
            store,
            embedder,
            chunker: Chunker::new(config.chunk_size, config.chunk_overlap)?,
            workers: config.ingest_workers,
            retries: config.ingest_retries,
            articles_dir: PathBuf::from(&config.articles_dir),
            source_url_base: config.source_url_base.clone(),
        })
    }

    /// Load every article record under the articles directory. Records with
    /// an empty body are dropped here, before any embedding work. Unreadable
    /// or malformed files never abort the load: they are logged and returned
    /// as failures so they land in the run's failure manifest.
    pub fn load_articles(&self) -> (Vec<Article>, Vec<(String, String)>) {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(&self.articles_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        if paths.is_empty() {
            warn!("No article files found under {}", self.articles_dir.display());
        }

        let mut articles = Vec::with_capacity(paths.len());
        let mut failures = Vec::new();
        for path in paths {
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    error!("Failed to read article file {}: {}", path.display(), e);
                    failures.push((file_label(&path), e.to_string()));
                    continue;
                }
            };
            let record: ArticleFile = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(e) => {
                    error!("Malformed article file {}: {}", path.display(), e);
                    failures.push((file_label(&path), format!("malformed article file: {}", e)));
                    continue;
                }
            };

            let title = record.title.unwrap_or_else(|| file_label(&path));
            let article = Article::from_parts(
                title,
                &record.content,
                record.url,
                self.source_url_base.as_deref(),
                record.fetched_at,
            );
            if article.is_empty() {
                warn!("Skipping empty article: {}", article.title);
                continue;
            }
            articles.push(article);
        }
        (articles, failures)
    }

    /// Run the pipeline over every loaded article. `force` reprocesses
    /// articles whose stored content hash is unchanged. One article failing,
    /// at load or later, never aborts the run.
    pub async fn run(&self, force: bool) -> AppResult<IngestReport> {
        let (articles, load_failures) = self.load_articles();
        info!(
            "Ingesting {} articles ({} workers, force={})",
            articles.len(),
            self.workers,
            force
        );

        let outcomes: Vec<ArticleOutcome> = stream::iter(articles)
            .map(|article| self.process_article(article, force))
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = IngestReport {
            failed: load_failures,
            ..IngestReport::default()
        };
        for outcome in outcomes {
            match outcome {
                ArticleOutcome::Processed { chunks } => {
                    report.processed += 1;
                    report.total_chunks += chunks;
                }
                ArticleOutcome::Skipped => report.skipped += 1,
                ArticleOutcome::Failed { title, error } => report.failed.push((title, error)),
            }
        }

        info!(
            "Ingest finished: processed={}, skipped={}, failed={}, chunks={}",
            report.processed,
            report.skipped,
            report.failed.len(),
            report.total_chunks
        );
        Ok(report)
    }

    async fn process_article(&self, article: Article, force: bool) -> ArticleOutcome {
        let hash = article.content_hash();
        if !force {
            match self.store.article_content_hash(&article.id).await {
                Ok(Some(stored)) if stored == hash => {
                    return ArticleOutcome::Skipped;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Hash lookup failed for '{}': {}", article.title, e);
                    return ArticleOutcome::Failed {
                        title: article.title,
                        error: e.to_string(),
                    };
                }
            }
        }

        let mut attempt = 0;
        loop {
            match self.embed_and_store(&article, &hash).await {
                Ok(chunks) => {
                    info!("Indexed '{}' ({} chunks)", article.title, chunks);
                    return ArticleOutcome::Processed { chunks };
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    warn!(
                        "Attempt {} failed for '{}': {} (retrying in {:?})",
                        attempt, article.title, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!("Giving up on '{}': {}", article.title, e);
                    return ArticleOutcome::Failed {
                        title: article.title,
                        error: e.to_string(),
                    };
                }
            }
        }
    }

    /// Chunk, embed in one batch, and atomically replace the article's
    /// chunks in the store.
    async fn embed_and_store(&self, article: &Article, hash: &str) -> AppResult<usize> {
        let chunks = self.chunker.chunk(article);
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(texts).await?;

        let items = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| self.to_item(article, chunk, vector, hash))
            .collect::<Vec<_>>();
        let count = items.len();

        self.store.replace_article(&article.id, items).await?;
        Ok(count)
    }

    fn to_item(&self, article: &Article, chunk: Chunk, vector: Vec<f32>, hash: &str) -> VectorItem {
        VectorItem {
            id: chunk.id,
            article_id: chunk.article_id,
            position: chunk.index,
            text: chunk.text,
            vector,
            metadata: ChunkMetadata {
                title: article.title.clone(),
                source_url: article.source_url.clone(),
                content_hash: hash.to_string(),
            },
        }
    }
}
