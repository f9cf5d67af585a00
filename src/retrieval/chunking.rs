use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{Article, Chunk};

/// Splits article bodies into overlapping windows of bounded size.
///
/// The unit is characters (Unicode scalar values). Consecutive windows share
/// an `overlap`-sized region: the window start advances by
/// `max_size - overlap` each step, so context is preserved across chunk
/// boundaries. Pure function of its inputs — the same (article, max_size,
/// overlap) always yields the same chunk sequence and ids.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Requires `max_size > 0` and `overlap < max_size`.
    pub fn new(max_size: usize, overlap: usize) -> AppResult<Self> {
        if max_size == 0 {
            return Err(AppError::InvalidConfiguration(
                "chunk max_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= max_size {
            return Err(AppError::InvalidConfiguration(format!(
                "chunk overlap ({}) must be smaller than max_size ({})",
                overlap, max_size
            )));
        }
        Ok(Self { max_size, overlap })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk an article body. A body no longer than `max_size` yields exactly
    /// one chunk; the final chunk may be shorter than `max_size` but is never
    /// dropped. An empty body yields no chunks.
    pub fn chunk(&self, article: &Article) -> Vec<Chunk> {
        // Byte offsets of char boundaries, so windows never split a
        // multi-byte character.
        let mut bounds: Vec<usize> = article.body.char_indices().map(|(i, _)| i).collect();
        bounds.push(article.body.len());
        let total_chars = bounds.len() - 1;

        if total_chars == 0 {
            return vec![];
        }

        let step = self.max_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.max_size).min(total_chars);
            let text = article.body[bounds[start]..bounds[end]].to_string();
            chunks.push(Chunk {
                id: Chunk::id_for(&article.id, chunks.len()),
                article_id: article.id.clone(),
                index: chunks.len(),
                text,
            });

            if end == total_chars {
                break;
            }
            start += step;
        }

        debug!(
            article_id = %article.id,
            chunks = chunks.len(),
            chars = total_chars,
            "Chunked article"
        );
        chunks
    }
}
