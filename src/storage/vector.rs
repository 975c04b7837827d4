//! Vector index trait and the SQLite-persisted reference implementation.
//!
//! The reference index does exact brute-force cosine scoring over an
//! in-memory snapshot of the persisted vectors. The snapshot is an explicit
//! cache object with a single `invalidate()` transition and a lazy
//! rebuild-on-next-read contract, guarded by the index lock, so mutation
//! and search never observe a half-built structure.

// Precision loss in usize-to-f32 casts is acceptable for similarity math.
#![allow(clippy::cast_precision_loss)]

use crate::storage::acquire_lock;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// What kind of record a vector entry indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// An extracted fact.
    Fact,
    /// A raw conversational resource.
    Conversation,
}

/// Metadata stored alongside each vector.
///
/// Round-trips the owner identifier, record kind, category, and
/// creation/access timestamps so the aggregator can reconstruct a scored
/// result without a second storage round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Owner the record belongs to.
    pub owner_id: String,
    /// Record kind tag.
    pub kind: RecordKind,
    /// Category label, when the record is a fact.
    pub category: Option<String>,
    /// Creation timestamp of the underlying record.
    pub created_at: DateTime<Utc>,
    /// Last-accessed timestamp of the underlying record.
    pub accessed_at: DateTime<Utc>,
}

/// One ranked hit from a vector search.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Identifier the vector was added under.
    pub id: String,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
    /// The indexed text.
    pub text: String,
    /// Round-tripped metadata.
    pub metadata: VectorMetadata,
}

/// Metadata filter for vector search.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    /// Restrict to one owner.
    pub owner_id: Option<String>,
    /// Restrict to one record kind.
    pub kind: Option<RecordKind>,
}

impl VectorFilter {
    /// Creates an empty filter (matches all).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            owner_id: None,
            kind: None,
        }
    }

    /// Restricts results to one owner.
    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Restricts results to one record kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    fn matches(&self, metadata: &VectorMetadata) -> bool {
        if let Some(owner) = &self.owner_id {
            if metadata.owner_id != *owner {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if metadata.kind != kind {
                return false;
            }
        }
        true
    }
}

/// Trait for vector index collaborators.
///
/// Implementations provide approximate or exact nearest-neighbor lookup over
/// embeddings with metadata filtering. Methods take `&self`; implementations
/// use interior mutability so the index can be shared via
/// `Arc<dyn VectorIndex>`.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces an entry.
    async fn add(
        &self,
        id: &str,
        text: &str,
        embedding: &[f32],
        metadata: VectorMetadata,
    ) -> Result<()>;

    /// Returns up to `top_k` hits matching `filter`, ordered by descending
    /// cosine similarity.
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>>;

    /// Removes entries by identifier.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Rebuilds internal structures from persisted state.
    async fn rebuild(&self) -> Result<()>;
}

/// Cosine similarity with a zero-norm guard.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom <= f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

struct CacheEntry {
    id: String,
    text: String,
    embedding: Vec<f32>,
    metadata: VectorMetadata,
}

/// In-memory snapshot of the persisted vectors.
///
/// State machine: `Valid(entries)` → `invalidate()` → `Invalid` → next read
/// rebuilds from the database. There is no partial state.
#[derive(Default)]
struct VectorCache {
    entries: Option<Vec<CacheEntry>>,
}

impl VectorCache {
    /// The single transition out of validity. Any mutation of the persisted
    /// rows must call this before releasing the index lock.
    fn invalidate(&mut self) {
        self.entries = None;
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vectors (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL
);
";

/// SQLite-persisted brute-force cosine vector index.
pub struct SqliteVectorIndex {
    conn: Mutex<Connection>,
    cache: Mutex<VectorCache>,
}

impl SqliteVectorIndex {
    /// Opens (or creates) an index database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::op("vector_open", e))?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory index (used by tests and ephemeral deployments).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::op("vector_open", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::op("vector_migrate", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(VectorCache::default()),
        })
    }

    /// Loads all persisted entries. Called under the cache lock.
    fn load_entries(&self) -> Result<Vec<CacheEntry>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT id, text, embedding, metadata FROM vectors")
            .map_err(|e| Error::op("vector_load", e))?;
        let rows = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(2)?;
                let metadata_json: String = row.get(3)?;
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, blob, metadata_json))
            })
            .map_err(|e| Error::op("vector_load", e))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, text, blob, metadata_json) = row.map_err(|e| Error::op("vector_load", e))?;
            let metadata: VectorMetadata = serde_json::from_str(&metadata_json)
                .map_err(|e| Error::op("vector_load", format!("metadata for '{id}': {e}")))?;
            entries.push(CacheEntry {
                id,
                text,
                embedding: bytes_to_embedding(&blob),
                metadata,
            });
        }
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add(
        &self,
        id: &str,
        text: &str,
        embedding: &[f32],
        metadata: VectorMetadata,
    ) -> Result<()> {
        let metadata_json =
            serde_json::to_string(&metadata).map_err(|e| Error::op("vector_add", e))?;
        {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT OR REPLACE INTO vectors (id, text, embedding, metadata) VALUES (?1, ?2, ?3, ?4)",
                params![id, text, embedding_to_bytes(embedding), metadata_json],
            )
            .map_err(|e| Error::op("vector_add", e))?;
        }
        acquire_lock(&self.cache).invalidate();
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>> {
        let mut cache = acquire_lock(&self.cache);
        if cache.entries.is_none() {
            cache.entries = Some(self.load_entries()?);
        }
        let Some(entries) = cache.entries.as_ref() else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<VectorHit> = entries
            .iter()
            .filter(|entry| filter.matches(&entry.metadata))
            .map(|entry| VectorHit {
                id: entry.id.clone(),
                score: cosine_similarity(embedding, &entry.embedding),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
            })
            // Non-positive similarity is noise for recall purposes.
            .filter(|hit| hit.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        {
            let conn = acquire_lock(&self.conn);
            let placeholders = vec!["?"; ids.len()].join(",");
            let sql = format!("DELETE FROM vectors WHERE id IN ({placeholders})");
            conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))
                .map_err(|e| Error::op("vector_delete", e))?;
        }
        acquire_lock(&self.cache).invalidate();
        Ok(())
    }

    async fn rebuild(&self) -> Result<()> {
        let mut cache = acquire_lock(&self.cache);
        cache.invalidate();
        cache.entries = Some(self.load_entries()?);
        Ok(())
    }
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(owner: &str, kind: RecordKind) -> VectorMetadata {
        VectorMetadata {
            owner_id: owner.to_string(),
            kind,
            category: None,
            created_at: Utc::now(),
            accessed_at: Utc::now(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        // Zero-norm guard
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let embedding = vec![0.5_f32, -1.25, 3.0];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&embedding)), embedding);
    }

    #[tokio::test]
    async fn test_add_search_filters_by_owner_and_kind() {
        let index = SqliteVectorIndex::open_in_memory().unwrap();
        index
            .add("a", "alpha", &[1.0, 0.0], metadata("u1", RecordKind::Fact))
            .await
            .unwrap();
        index
            .add("b", "beta", &[1.0, 0.0], metadata("u2", RecordKind::Fact))
            .await
            .unwrap();
        index
            .add("c", "gamma", &[1.0, 0.0], metadata("u1", RecordKind::Conversation))
            .await
            .unwrap();

        let filter = VectorFilter::new().with_owner("u1").with_kind(RecordKind::Fact);
        let hits = index.search(&[1.0, 0.0], 10, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].text, "alpha");
    }

    #[tokio::test]
    async fn test_search_drops_non_positive_scores() {
        let index = SqliteVectorIndex::open_in_memory().unwrap();
        index
            .add("pos", "p", &[1.0, 0.0], metadata("u1", RecordKind::Fact))
            .await
            .unwrap();
        index
            .add("neg", "n", &[-1.0, 0.0], metadata("u1", RecordKind::Fact))
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0], 10, &VectorFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "pos");
    }

    #[tokio::test]
    async fn test_delete_invalidates_cache() {
        let index = SqliteVectorIndex::open_in_memory().unwrap();
        index
            .add("a", "alpha", &[1.0, 0.0], metadata("u1", RecordKind::Fact))
            .await
            .unwrap();
        // Warm the cache.
        let hits = index
            .search(&[1.0, 0.0], 10, &VectorFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        index.delete(&["a".to_string()]).await.unwrap();
        let hits = index
            .search(&[1.0, 0.0], 10, &VectorFilter::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_reloads_from_disk() {
        let index = SqliteVectorIndex::open_in_memory().unwrap();
        index
            .add("a", "alpha", &[0.0, 1.0], metadata("u1", RecordKind::Fact))
            .await
            .unwrap();
        index.rebuild().await.unwrap();
        let hits = index
            .search(&[0.0, 1.0], 10, &VectorFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_top_k_ordering() {
        let index = SqliteVectorIndex::open_in_memory().unwrap();
        index
            .add("close", "c", &[1.0, 0.05], metadata("u1", RecordKind::Fact))
            .await
            .unwrap();
        index
            .add("far", "f", &[0.3, 1.0], metadata("u1", RecordKind::Fact))
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0], 1, &VectorFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "close");
    }
}
