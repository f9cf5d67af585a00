use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A cleaned wiki article, as handed over by the scraping/cleanup stage.
///
/// Immutable once constructed. The id is derived from the source URL, so
/// reprocessing the same article always maps onto the same chunk ids and the
/// store's upsert semantics replace rather than duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    /// Full body text, `"Title: {title}"` followed by the cleaned content.
    pub body: String,
    pub source_url: String,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Build an article from a cleaned record. When the record carries no
    /// URL one is derived from the title slug, prefixed with
    /// `source_url_base` if configured.
    pub fn from_parts(
        title: String,
        content: &str,
        url: Option<String>,
        source_url_base: Option<&str>,
        fetched_at: Option<DateTime<Utc>>,
    ) -> Self {
        let source_url = url.unwrap_or_else(|| match source_url_base {
            Some(base) => format!("{}{}", base, slugify(&title)),
            None => slugify(&title),
        });

        let mut parts = vec![format!("Title: {}", title)];
        let trimmed = content.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
        let body = parts.join("\n\n");

        Self {
            id: stable_id(&source_url),
            title,
            body,
            source_url,
            fetched_at,
        }
    }

    /// SHA-256 of the body, the trigger for re-chunking: an article whose
    /// hash matches what the store already holds is skipped at ingest.
    pub fn content_hash(&self) -> String {
        let digest = Sha256::digest(self.body.as_bytes());
        hex_encode(&digest)
    }

    /// True when the record held no content besides the title line.
    pub fn is_empty(&self) -> bool {
        !self.body.contains("\n\n")
    }
}

/// A bounded contiguous segment of an article's body, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub article_id: String,
    /// Position index within the article.
    pub index: usize,
    pub text: String,
}

impl Chunk {
    /// Deterministic chunk id: a pure function of article id and index, so
    /// re-chunking the same article reproduces the same ids.
    pub fn id_for(article_id: &str, index: usize) -> String {
        format!("{}#{:05}", article_id, index)
    }
}

/// Stable 16-hex-char article id derived from the source URL.
pub fn stable_id(source_url: &str) -> String {
    let digest = Sha256::digest(source_url.as_bytes());
    hex_encode(&digest)[..16].to_string()
}

fn slugify(title: &str) -> String {
    title.replace(' ', "_").replace('/', "_")
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_id_is_stable() {
        let a = Article::from_parts("Dragon Slayer".to_string(), "A quest.", None, None, None);
        let b = Article::from_parts("Dragon Slayer".to_string(), "A quest.", None, None, None);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn article_id_follows_source_url() {
        let a = Article::from_parts(
            "Dragon Slayer".to_string(),
            "A quest.",
            Some("https://wiki.example/w/Dragon_Slayer".to_string()),
            None,
            None,
        );
        let b = Article::from_parts(
            "Renamed Title".to_string(),
            "A quest.",
            Some("https://wiki.example/w/Dragon_Slayer".to_string()),
            None,
            None,
        );
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn body_includes_title_line() {
        let article =
            Article::from_parts("Rune scimitar".to_string(), "A weapon.", None, None, None);
        assert_eq!(article.body, "Title: Rune scimitar\n\nA weapon.");
        assert!(!article.is_empty());
    }

    #[test]
    fn empty_content_detected() {
        let article = Article::from_parts("Stub".to_string(), "   \n ", None, None, None);
        assert!(article.is_empty());
    }

    #[test]
    fn source_url_derived_from_base_and_slug() {
        let article = Article::from_parts(
            "Dragon Slayer II/Quick guide".to_string(),
            "Steps.",
            None,
            Some("https://wiki.example/w/"),
            None,
        );
        assert_eq!(
            article.source_url,
            "https://wiki.example/w/Dragon_Slayer_II_Quick_guide"
        );
    }

    #[test]
    fn chunk_id_is_deterministic() {
        assert_eq!(Chunk::id_for("abc123", 0), "abc123#00000");
        assert_eq!(Chunk::id_for("abc123", 42), "abc123#00042");
        assert_eq!(Chunk::id_for("abc123", 42), Chunk::id_for("abc123", 42));
    }

    #[test]
    fn content_hash_tracks_body_changes() {
        let a = Article::from_parts("Guide".to_string(), "v1", None, None, None);
        let b = Article::from_parts("Guide".to_string(), "v1", None, None, None);
        let c = Article::from_parts("Guide".to_string(), "v2", None, None, None);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }
}
