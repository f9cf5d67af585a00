use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use super::types::{
    cosine_similarity, ChunkMetadata, QueryMatch, VectorError, VectorItem, VectorStore,
};

const DIMENSION_KEY: &str = "dimension";

/// Sqlite-backed vector store.
///
/// The store is the single persisted artifact of the build pipeline: a local
/// file that survives process restart and re-opens without re-embedding. WAL
/// mode keeps concurrent readers safe while the ingest pipeline writes, and
/// `replace_article` runs delete-then-insert in one transaction so a query
/// arriving mid-rebuild sees an article's chunks fully-old or fully-new.
///
/// Similarity search is a brute-force cosine scan — the corpus is a single
/// wiki, small enough that an ANN index would be overhead.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (or create) the store at a sqlite URL, e.g. `sqlite://wiki.db`,
    /// and apply the schema.
    pub async fn open(database_url: &str) -> Result<Self, VectorError> {
        info!("Opening vector store: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| VectorError::Config(format!("invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), VectorError> {
        let migration = include_str!("../../../migrations/sqlite/001_initial.sql");
        for statement in migration.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(&self.pool).await?;
            }
        }
        debug!("Vector store schema ready");
        Ok(())
    }

    async fn stored_dimension(&self) -> Result<Option<usize>, VectorError> {
        let row = sqlx::query("SELECT value FROM store_meta WHERE key = ?1")
            .bind(DIMENSION_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                let dim = raw.parse::<usize>().map_err(|_| {
                    VectorError::Corrupt(format!("stored dimension is not a number: {}", raw))
                })?;
                Ok(Some(dim))
            }
            None => Ok(None),
        }
    }

    /// Check a batch against the store's committed dimensionality, learning
    /// it from the first batch ever written.
    async fn ensure_dimension(&self, items: &[VectorItem]) -> Result<usize, VectorError> {
        let first = items.first().ok_or_else(|| {
            VectorError::InvalidQuery("cannot determine dimensionality of an empty batch".into())
        })?;
        let dim = first.vector.len();
        if dim == 0 {
            return Err(VectorError::InvalidQuery(
                "refusing to store an empty vector".to_string(),
            ));
        }
        for item in items {
            if item.vector.len() != dim {
                return Err(VectorError::DimensionMismatch {
                    expected: dim,
                    actual: item.vector.len(),
                });
            }
        }

        match self.stored_dimension().await? {
            Some(expected) if expected != dim => {
                Err(VectorError::DimensionMismatch { expected, actual: dim })
            }
            Some(_) => Ok(dim),
            None => {
                sqlx::query("INSERT OR IGNORE INTO store_meta (key, value) VALUES (?1, ?2)")
                    .bind(DIMENSION_KEY)
                    .bind(dim.to_string())
                    .execute(&self.pool)
                    .await?;
                Ok(dim)
            }
        }
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, VectorError> {
    if bytes.len() % 4 != 0 {
        return Err(VectorError::Corrupt(format!(
            "vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

const INSERT_CHUNK_SQL: &str = r#"
    INSERT INTO chunks (chunk_id, article_id, position, title, source_url,
                        content_hash, text, vector, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(chunk_id) DO UPDATE SET
        article_id = excluded.article_id,
        position = excluded.position,
        title = excluded.title,
        source_url = excluded.source_url,
        content_hash = excluded.content_hash,
        text = excluded.text,
        vector = excluded.vector
"#;

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, items: Vec<VectorItem>) -> Result<(), VectorError> {
        if items.is_empty() {
            return Ok(());
        }
        self.ensure_dimension(&items).await?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let count = items.len();
        for item in items {
            sqlx::query(INSERT_CHUNK_SQL)
                .bind(&item.id)
                .bind(&item.article_id)
                .bind(item.position as i64)
                .bind(&item.metadata.title)
                .bind(&item.metadata.source_url)
                .bind(&item.metadata.content_hash)
                .bind(&item.text)
                .bind(encode_vector(&item.vector))
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Upserted {} chunk records", count);
        Ok(())
    }

    async fn replace_article(
        &self,
        article_id: &str,
        items: Vec<VectorItem>,
    ) -> Result<(), VectorError> {
        if !items.is_empty() {
            self.ensure_dimension(&items).await?;
            for item in &items {
                if item.article_id != article_id {
                    return Err(VectorError::InvalidQuery(format!(
                        "chunk {} belongs to article {}, not {}",
                        item.id, item.article_id, article_id
                    )));
                }
            }
        }

        let now = chrono::Utc::now().timestamp();
        let count = items.len();

        // Single transaction: the old chunk set disappears and the new one
        // appears atomically from any reader's point of view.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE article_id = ?1")
            .bind(article_id)
            .execute(&mut *tx)
            .await?;
        for item in items {
            sqlx::query(INSERT_CHUNK_SQL)
                .bind(&item.id)
                .bind(&item.article_id)
                .bind(item.position as i64)
                .bind(&item.metadata.title)
                .bind(&item.metadata.source_url)
                .bind(&item.metadata.content_hash)
                .bind(&item.text)
                .bind(encode_vector(&item.vector))
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(article_id, chunks = count, "Replaced article chunks");
        Ok(())
    }

    async fn delete_by_article(&self, article_id: &str) -> Result<(), VectorError> {
        let result = sqlx::query("DELETE FROM chunks WHERE article_id = ?1")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        debug!(
            article_id,
            deleted = result.rows_affected(),
            "Deleted article chunks"
        );
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, VectorError> {
        if top_k == 0 {
            return Err(VectorError::InvalidQuery(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if vector.is_empty() {
            return Err(VectorError::InvalidQuery(
                "query vector is empty".to_string(),
            ));
        }

        match self.stored_dimension().await? {
            // Nothing ever stored: no results is a valid outcome, not an error.
            None => return Ok(Vec::new()),
            Some(expected) if expected != vector.len() => {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
        }

        let rows = sqlx::query(
            "SELECT chunk_id, article_id, position, title, source_url, content_hash, text, vector
             FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.try_get("vector")?;
            let stored = decode_vector(&blob)?;
            let score = cosine_similarity(vector, &stored);
            let position: i64 = row.try_get("position")?;
            matches.push(QueryMatch {
                chunk_id: row.try_get("chunk_id")?,
                article_id: row.try_get("article_id")?,
                position: position as usize,
                text: row.try_get("text")?,
                metadata: ChunkMetadata {
                    title: row.try_get("title")?,
                    source_url: row.try_get("source_url")?,
                    content_hash: row.try_get("content_hash")?,
                },
                score,
            });
        }

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn article_content_hash(
        &self,
        article_id: &str,
    ) -> Result<Option<String>, VectorError> {
        let row = sqlx::query("SELECT content_hash FROM chunks WHERE article_id = ?1 LIMIT 1")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("content_hash")?)),
            None => Ok(None),
        }
    }

    async fn count(&self) -> Result<u64, VectorError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    async fn dimension(&self) -> Result<Option<usize>, VectorError> {
        self.stored_dimension().await
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Vector store closed");
        } else {
            warn!("Vector store already closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(chunk: usize, article_id: &str, vector: Vec<f32>) -> VectorItem {
        VectorItem {
            id: format!("{}#{:05}", article_id, chunk),
            article_id: article_id.to_string(),
            position: chunk,
            text: format!("chunk {} of {}", chunk, article_id),
            vector,
            metadata: ChunkMetadata {
                title: format!("Article {}", article_id),
                source_url: format!("https://wiki.example/w/{}", article_id),
                content_hash: "hash-v1".to_string(),
            },
        }
    }

    async fn open_temp() -> (tempfile::TempDir, SqliteVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("store.db").display());
        let store = SqliteVectorStore::open(&url).await.unwrap();
        (dir, store)
    }

    #[test]
    fn vector_roundtrip() {
        let v = vec![0.25, -1.5, 3.75, 0.0];
        assert_eq!(decode_vector(&encode_vector(&v)).unwrap(), v);
        assert!(decode_vector(&[1, 2, 3]).is_err());
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (_dir, store) = open_temp().await;
        let items = vec![item(0, "art1", vec![1.0, 0.0, 0.0])];

        store.upsert(items.clone()).await.unwrap();
        store.upsert(items).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let matches = store.query(&[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].chunk_id, "art1#00000");
        assert_eq!(matches[0].text, "chunk 0 of art1");
    }

    #[tokio::test]
    async fn replace_article_leaves_no_stale_chunks() {
        let (_dir, store) = open_temp().await;
        store
            .upsert(vec![
                item(0, "art1", vec![1.0, 0.0]),
                item(1, "art1", vec![0.9, 0.1]),
                item(2, "art1", vec![0.8, 0.2]),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 3);

        // Re-chunking with a different configuration produced fewer chunks.
        store
            .replace_article(
                "art1",
                vec![item(0, "art1", vec![0.5, 0.5]), item(1, "art1", vec![0.4, 0.6])],
            )
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let matches = store.query(&[1.0, 0.0], 10).await.unwrap();
        assert!(matches.iter().all(|m| m.chunk_id != "art1#00002"));
    }

    #[tokio::test]
    async fn replace_rejects_foreign_chunks() {
        let (_dir, store) = open_temp().await;
        let err = store
            .replace_article("art1", vec![item(0, "art2", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn query_orders_by_descending_similarity() {
        let (_dir, store) = open_temp().await;
        store
            .upsert(vec![
                item(0, "a", vec![0.1, 0.9]),
                item(1, "a", vec![1.0, 0.0]),
                item(2, "a", vec![0.7, 0.3]),
                item(3, "b", vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        let matches = store.query(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(matches[0].chunk_id, "a#00001");
    }

    #[tokio::test]
    async fn query_validates_inputs() {
        let (_dir, store) = open_temp().await;
        store.upsert(vec![item(0, "a", vec![1.0, 0.0])]).await.unwrap();

        assert!(matches!(
            store.query(&[1.0, 0.0], 0).await.unwrap_err(),
            VectorError::InvalidQuery(_)
        ));
        assert!(matches!(
            store.query(&[1.0, 0.0, 0.0], 3).await.unwrap_err(),
            VectorError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn empty_store_returns_empty_sequence() {
        let (_dir, store) = open_temp().await;
        let matches = store.query(&[1.0, 0.0, 0.0], 5).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn dimension_is_enforced_across_upserts() {
        let (_dir, store) = open_temp().await;
        store.upsert(vec![item(0, "a", vec![1.0, 0.0, 0.0])]).await.unwrap();
        assert_eq!(store.dimension().await.unwrap(), Some(3));

        let err = store
            .upsert(vec![item(1, "a", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("store.db").display());

        let store = SqliteVectorStore::open(&url).await.unwrap();
        store
            .upsert(vec![item(0, "a", vec![0.6, 0.8]), item(1, "a", vec![0.8, 0.6])])
            .await
            .unwrap();
        store.close().await;

        let reopened = SqliteVectorStore::open(&url).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        assert_eq!(reopened.dimension().await.unwrap(), Some(2));
        assert_eq!(
            reopened
                .article_content_hash("a")
                .await
                .unwrap()
                .as_deref(),
            Some("hash-v1")
        );
        let matches = reopened.query(&[0.6, 0.8], 1).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].chunk_id, "a#00000");
    }

    #[tokio::test]
    async fn delete_by_article_removes_only_that_article() {
        let (_dir, store) = open_temp().await;
        store
            .upsert(vec![item(0, "a", vec![1.0, 0.0]), item(0, "b", vec![0.0, 1.0])])
            .await
            .unwrap();

        store.delete_by_article("a").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.article_content_hash("a").await.unwrap().is_none());
        assert!(store.article_content_hash("b").await.unwrap().is_some());
    }
}
