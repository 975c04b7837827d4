//! `SQLite` record store.
//!
//! Reference [`RecordStore`] implementation. A single connection behind a
//! mutex is plenty for the write rates this engine sees; callers needing a
//! pool can bring their own implementation of the trait.

use crate::models::{Checkpoint, Fact, FactId, Triplet, TripletStatus};
use crate::storage::traits::{PersistentSummary, RecordStore};
use crate::storage::{acquire_lock, escape_like_wildcards};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Mutex;

/// Bound on keyword-search result counts.
const SEARCH_LIMIT: i64 = 50;
/// Bound on resource search result counts.
const RESOURCE_SEARCH_LIMIT: i64 = 20;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS resources (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    content TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    source_id TEXT,
    embedding TEXT,
    access_count INTEGER DEFAULT 0,
    created_at TEXT NOT NULL,
    accessed_at TEXT NOT NULL,
    archived INTEGER DEFAULT 0
);
CREATE TABLE IF NOT EXISTS category_summaries (
    owner_id TEXT NOT NULL,
    category TEXT NOT NULL,
    general TEXT NOT NULL DEFAULT '',
    persistent TEXT NOT NULL DEFAULT '',
    persistent_updated_at TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (owner_id, category)
);
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT NOT NULL,
    step_id TEXT NOT NULL,
    state TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    PRIMARY KEY (thread_id, step_id)
);
CREATE TABLE IF NOT EXISTS triplets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    subject TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    active INTEGER DEFAULT 1,
    status TEXT DEFAULT 'current'
);
CREATE INDEX IF NOT EXISTS idx_facts_owner ON facts(owner_id);
CREATE INDEX IF NOT EXISTS idx_facts_category ON facts(owner_id, category);
CREATE INDEX IF NOT EXISTS idx_triplets_owner ON triplets(owner_id);
CREATE INDEX IF NOT EXISTS idx_triplets_subject ON triplets(owner_id, subject);
CREATE INDEX IF NOT EXISTS idx_resources_owner ON resources(owner_id);
";

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts_sql(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_fact(row: &Row<'_>) -> rusqlite::Result<Fact> {
    let embedding: Option<String> = row.get(5)?;
    let embedding = match embedding {
        Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
        })?),
        None => None,
    };
    let created_at: String = row.get(7)?;
    let accessed_at: String = row.get(8)?;
    Ok(Fact {
        id: FactId::new(row.get::<_, String>(0)?),
        owner_id: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        source_id: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        embedding,
        access_count: row.get(6)?,
        created_at: parse_ts_sql(7, &created_at)?,
        accessed_at: parse_ts_sql(8, &accessed_at)?,
        archived: row.get::<_, i64>(9)? != 0,
    })
}

fn row_to_triplet(row: &Row<'_>) -> rusqlite::Result<Triplet> {
    let timestamp: String = row.get(4)?;
    let status: String = row.get(6)?;
    Ok(Triplet {
        subject: row.get(1)?,
        predicate: row.get(2)?,
        object: row.get(3)?,
        timestamp: parse_ts_sql(4, &timestamp)?,
        active: row.get::<_, i64>(5)? != 0,
        status: TripletStatus::parse(&status),
    })
}

fn row_to_checkpoint(row: &Row<'_>) -> rusqlite::Result<Checkpoint> {
    let state: String = row.get(2)?;
    let timestamp: String = row.get(3)?;
    Ok(Checkpoint {
        thread_id: row.get(0)?,
        step_id: row.get(1)?,
        state: serde_json::from_str(&state)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        timestamp: parse_ts_sql(3, &timestamp)?,
    })
}

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a store database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::op("store_open", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| Error::op("store_open", e))?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (used by tests and ephemeral deployments).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::op("store_open", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::op("store_migrate", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_facts(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Fact>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(sql).map_err(|e| Error::op("query_facts", e))?;
        let rows = stmt
            .query_map(args, row_to_fact)
            .map_err(|e| Error::op("query_facts", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::op("query_facts", e))
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteStore {
    // ── Resources ──

    async fn save_resource(&self, owner_id: &str, content: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO resources (id, owner_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, owner_id, content, ts(Utc::now())],
        )
        .map_err(|e| Error::op("save_resource", e))?;
        Ok(id)
    }

    async fn get_resource(&self, resource_id: &str) -> Result<Option<String>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT content FROM resources WHERE id = ?1",
            params![resource_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::op("get_resource", e))
    }

    async fn search_resources(&self, owner_id: &str, query: &str) -> Result<Vec<String>> {
        let pattern = format!("%{}%", escape_like_wildcards(query));
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT content FROM resources
                 WHERE owner_id = ?1 AND content LIKE ?2 ESCAPE '\\'
                 ORDER BY created_at DESC LIMIT ?3",
            )
            .map_err(|e| Error::op("search_resources", e))?;
        let rows = stmt
            .query_map(params![owner_id, pattern, RESOURCE_SEARCH_LIMIT], |row| {
                row.get(0)
            })
            .map_err(|e| Error::op("search_resources", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::op("search_resources", e))
    }

    // ── Facts ──

    async fn save_fact(&self, fact: &Fact) -> Result<()> {
        let embedding = fact
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::op("save_fact", e))?;
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO facts
             (id, owner_id, content, category, source_id, embedding, access_count, created_at, accessed_at, archived)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                fact.id.as_str(),
                fact.owner_id,
                fact.content,
                fact.category,
                fact.source_id,
                embedding,
                fact.access_count,
                ts(fact.created_at),
                ts(fact.accessed_at),
                i64::from(fact.archived),
            ],
        )
        .map_err(|e| Error::op("save_fact", e))?;
        Ok(())
    }

    async fn get_fact(&self, id: &FactId) -> Result<Option<Fact>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM facts WHERE id = ?1 AND archived = 0",
            params![id.as_str()],
            row_to_fact,
        )
        .optional()
        .map_err(|e| Error::op("get_fact", e))
    }

    async fn update_fact(&self, fact: &Fact) -> Result<()> {
        let embedding = fact
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::op("update_fact", e))?;
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE facts SET content = ?1, category = ?2, embedding = ?3,
             access_count = ?4, accessed_at = ?5, archived = ?6 WHERE id = ?7",
            params![
                fact.content,
                fact.category,
                embedding,
                fact.access_count,
                ts(fact.accessed_at),
                i64::from(fact.archived),
                fact.id.as_str(),
            ],
        )
        .map_err(|e| Error::op("update_fact", e))?;
        Ok(())
    }

    async fn delete_facts(&self, ids: &[FactId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = acquire_lock(&self.conn);
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM facts WHERE id IN ({placeholders})");
        conn.execute(&sql, rusqlite::params_from_iter(ids.iter().map(FactId::as_str)))
            .map_err(|e| Error::op("delete_facts", e))?;
        Ok(())
    }

    async fn list_facts(&self, owner_id: &str) -> Result<Vec<Fact>> {
        self.query_facts(
            "SELECT * FROM facts WHERE owner_id = ?1 AND archived = 0 ORDER BY created_at DESC",
            &[&owner_id],
        )
    }

    async fn search_facts(&self, owner_id: &str, query: &str) -> Result<Vec<Fact>> {
        let pattern = format!("%{}%", escape_like_wildcards(query));
        self.query_facts(
            "SELECT * FROM facts
             WHERE owner_id = ?1 AND archived = 0 AND content LIKE ?2 ESCAPE '\\'
             ORDER BY created_at DESC LIMIT ?3",
            &[&owner_id, &pattern, &SEARCH_LIMIT],
        )
    }

    async fn facts_created_before(
        &self,
        owner_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Fact>> {
        self.query_facts(
            "SELECT * FROM facts
             WHERE owner_id = ?1 AND archived = 0 AND created_at < ?2
             ORDER BY created_at",
            &[&owner_id, &ts(cutoff)],
        )
    }

    async fn facts_not_accessed_since(
        &self,
        owner_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Fact>> {
        self.query_facts(
            "SELECT * FROM facts
             WHERE owner_id = ?1 AND archived = 0 AND accessed_at < ?2",
            &[&owner_id, &ts(cutoff)],
        )
    }

    async fn facts_with_min_access(&self, owner_id: &str, min_count: u32) -> Result<Vec<Fact>> {
        self.query_facts(
            "SELECT * FROM facts
             WHERE owner_id = ?1 AND archived = 0 AND access_count >= ?2
             ORDER BY access_count DESC",
            &[&owner_id, &min_count],
        )
    }

    // ── Category summaries ──

    async fn save_general_summary(
        &self,
        owner_id: &str,
        category: &str,
        summary: &str,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO category_summaries (owner_id, category, general, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner_id, category)
             DO UPDATE SET general = excluded.general, updated_at = excluded.updated_at",
            params![owner_id, category, summary, ts(Utc::now())],
        )
        .map_err(|e| Error::op("save_general_summary", e))?;
        Ok(())
    }

    async fn load_general_summary(
        &self,
        owner_id: &str,
        category: &str,
    ) -> Result<Option<String>> {
        let conn = acquire_lock(&self.conn);
        let summary: Option<String> = conn
            .query_row(
                "SELECT general FROM category_summaries WHERE owner_id = ?1 AND category = ?2",
                params![owner_id, category],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::op("load_general_summary", e))?;
        Ok(summary.filter(|s| !s.is_empty()))
    }

    async fn list_categories(&self, owner_id: &str) -> Result<Vec<String>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT category FROM category_summaries WHERE owner_id = ?1 ORDER BY category",
            )
            .map_err(|e| Error::op("list_categories", e))?;
        let rows = stmt
            .query_map(params![owner_id], |row| row.get(0))
            .map_err(|e| Error::op("list_categories", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::op("list_categories", e))
    }

    async fn load_persistent_summary(
        &self,
        owner_id: &str,
        category: &str,
    ) -> Result<Option<PersistentSummary>> {
        let conn = acquire_lock(&self.conn);
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT persistent, persistent_updated_at FROM category_summaries
                 WHERE owner_id = ?1 AND category = ?2",
                params![owner_id, category],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| Error::op("load_persistent_summary", e))?;

        match row {
            Some((content, Some(updated_at))) if !content.is_empty() => {
                let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| Error::op("load_persistent_summary", e))?;
                Ok(Some(PersistentSummary {
                    content,
                    updated_at,
                }))
            }
            _ => Ok(None),
        }
    }

    async fn append_persistent_summary(
        &self,
        owner_id: &str,
        category: &str,
        block: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO category_summaries (owner_id, category, persistent, persistent_updated_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(owner_id, category)
             DO UPDATE SET
                 persistent = CASE
                     WHEN category_summaries.persistent = '' THEN excluded.persistent
                     ELSE category_summaries.persistent || char(10) || char(10) || excluded.persistent
                 END,
                 persistent_updated_at = excluded.persistent_updated_at",
            params![owner_id, category, block, ts(updated_at)],
        )
        .map_err(|e| Error::op("append_persistent_summary", e))?;
        Ok(())
    }

    // ── Triplets ──

    async fn save_triplet(&self, owner_id: &str, triplet: &Triplet) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO triplets (owner_id, subject, predicate, object, timestamp, active, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                owner_id,
                triplet.subject,
                triplet.predicate,
                triplet.object,
                ts(triplet.timestamp),
                i64::from(triplet.active),
                triplet.status.as_str(),
            ],
        )
        .map_err(|e| Error::op("save_triplet", e))?;
        Ok(())
    }

    async fn active_triplets(
        &self,
        owner_id: &str,
        subject: Option<&str>,
    ) -> Result<Vec<Triplet>> {
        let conn = acquire_lock(&self.conn);
        let (sql, args): (&str, Vec<&dyn rusqlite::ToSql>) = match subject.as_ref() {
            Some(subject) => (
                "SELECT id, subject, predicate, object, timestamp, active, status FROM triplets
                 WHERE owner_id = ?1 AND subject = ?2 AND active = 1",
                vec![&owner_id, subject],
            ),
            None => (
                "SELECT id, subject, predicate, object, timestamp, active, status FROM triplets
                 WHERE owner_id = ?1 AND active = 1",
                vec![&owner_id],
            ),
        };
        let mut stmt = conn.prepare(sql).map_err(|e| Error::op("active_triplets", e))?;
        let rows = stmt
            .query_map(args.as_slice(), row_to_triplet)
            .map_err(|e| Error::op("active_triplets", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::op("active_triplets", e))
    }

    async fn deactivate_triplets(
        &self,
        owner_id: &str,
        subject: &str,
        predicate: &str,
    ) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE triplets SET active = 0, status = 'past_replaced'
             WHERE owner_id = ?1 AND subject = ?2 AND predicate = ?3 AND active = 1",
            params![owner_id, subject, predicate],
        )
        .map_err(|e| Error::op("deactivate_triplets", e))
    }

    // ── Checkpoints ──

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let state =
            serde_json::to_string(&checkpoint.state).map_err(|e| Error::op("save_checkpoint", e))?;
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO checkpoints (thread_id, step_id, state, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                checkpoint.thread_id,
                checkpoint.step_id,
                state,
                ts(checkpoint.timestamp)
            ],
        )
        .map_err(|e| Error::op("save_checkpoint", e))?;
        Ok(())
    }

    async fn latest_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT thread_id, step_id, state, timestamp FROM checkpoints
             WHERE thread_id = ?1 ORDER BY timestamp DESC LIMIT 1",
            params![thread_id],
            row_to_checkpoint,
        )
        .optional()
        .map_err(|e| Error::op("latest_checkpoint", e))
    }

    async fn checkpoint_at(&self, thread_id: &str, step_id: &str) -> Result<Option<Checkpoint>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT thread_id, step_id, state, timestamp FROM checkpoints
             WHERE thread_id = ?1 AND step_id = ?2",
            params![thread_id, step_id],
            row_to_checkpoint,
        )
        .optional()
        .map_err(|e| Error::op("checkpoint_at", e))
    }

    async fn list_checkpoint_steps(&self, thread_id: &str) -> Result<Vec<String>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT step_id FROM checkpoints WHERE thread_id = ?1 ORDER BY timestamp")
            .map_err(|e| Error::op("list_checkpoint_steps", e))?;
        let rows = stmt
            .query_map(params![thread_id], |row| row.get(0))
            .map_err(|e| Error::op("list_checkpoint_steps", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::op("list_checkpoint_steps", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_fact_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let fact = Fact::new("u1", "User prefers Python", "preferences")
            .with_embedding(vec![0.1, 0.2]);
        store.save_fact(&fact).await.unwrap();

        let loaded = store.get_fact(&fact.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "User prefers Python");
        assert_eq!(loaded.embedding, Some(vec![0.1, 0.2]));
        assert_eq!(loaded.access_count, 0);
    }

    #[tokio::test]
    async fn test_archived_fact_hidden_from_active_paths() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut fact = Fact::new("u1", "old fact", "general");
        store.save_fact(&fact).await.unwrap();

        fact.archived = true;
        store.update_fact(&fact).await.unwrap();

        assert!(store.get_fact(&fact.id).await.unwrap().is_none());
        assert!(store.list_facts("u1").await.unwrap().is_empty());
        assert!(store.search_facts("u1", "old").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_facts_owner_scoped_and_escaped() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_fact(&Fact::new("u1", "likes 100% cotton", "preferences"))
            .await
            .unwrap();
        store
            .save_fact(&Fact::new("u2", "likes 100% cotton", "preferences"))
            .await
            .unwrap();

        let hits = store.search_facts("u1", "100%").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner_id, "u1");

        // A literal '%' must not act as a wildcard.
        assert!(store.search_facts("u1", "1%cotton").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_window_queries() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        let mut old = Fact::new("u1", "old", "general");
        old.created_at = now - Duration::days(40);
        old.accessed_at = now - Duration::days(40);
        store.save_fact(&old).await.unwrap();

        let fresh = Fact::new("u1", "fresh", "general");
        store.save_fact(&fresh).await.unwrap();

        let aged = store
            .facts_created_before("u1", now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(aged.len(), 1);
        assert_eq!(aged[0].content, "old");

        let idle = store
            .facts_not_accessed_since("u1", now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].content, "old");
    }

    #[tokio::test]
    async fn test_high_access_query() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut hot = Fact::new("u1", "hot", "general");
        hot.access_count = 7;
        store.save_fact(&hot).await.unwrap();
        store.save_fact(&Fact::new("u1", "cold", "general")).await.unwrap();

        let hits = store.facts_with_min_access("u1", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "hot");
    }

    #[tokio::test]
    async fn test_general_summary_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store
            .load_general_summary("u1", "work")
            .await
            .unwrap()
            .is_none());

        store
            .save_general_summary("u1", "work", "Works at Acme.")
            .await
            .unwrap();
        assert_eq!(
            store.load_general_summary("u1", "work").await.unwrap(),
            Some("Works at Acme.".to_string())
        );
        assert_eq!(store.list_categories("u1").await.unwrap(), vec!["work"]);
        assert!(store.list_categories("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistent_summary_appends() {
        let store = SqliteStore::open_in_memory().unwrap();
        let t1 = Utc::now();
        store
            .append_persistent_summary("u1", "work", "## 2026-07\n- block one", t1)
            .await
            .unwrap();
        let t2 = t1 + Duration::days(7);
        store
            .append_persistent_summary("u1", "work", "## 2026-08\n- block two", t2)
            .await
            .unwrap();

        let summary = store
            .load_persistent_summary("u1", "work")
            .await
            .unwrap()
            .unwrap();
        assert!(summary.content.contains("block one"));
        assert!(summary.content.contains("block two"));
        let earlier = summary.content.find("block one").unwrap();
        let later = summary.content.find("block two").unwrap();
        assert!(earlier < later);
        assert_eq!(summary.updated_at.timestamp(), t2.timestamp());
    }

    #[tokio::test]
    async fn test_triplet_deactivation_scoped_to_predicate() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_triplet(
                "u1",
                &Triplet::new("User", "works_at", "Google", TripletStatus::Current),
            )
            .await
            .unwrap();
        store
            .save_triplet(
                "u1",
                &Triplet::new("User", "lives_in", "Berlin", TripletStatus::Current),
            )
            .await
            .unwrap();

        let retired = store
            .deactivate_triplets("u1", "User", "works_at")
            .await
            .unwrap();
        assert_eq!(retired, 1);

        let active = store.active_triplets("u1", Some("User")).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].predicate, "lives_in");
    }

    #[tokio::test]
    async fn test_checkpoint_roundtrip_and_rewind() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut first = Checkpoint::new("t1", "s1", serde_json::json!({"turn": 1}));
        first.timestamp = Utc::now() - Duration::minutes(5);
        store.save_checkpoint(&first).await.unwrap();
        store
            .save_checkpoint(&Checkpoint::new("t1", "s2", serde_json::json!({"turn": 2})))
            .await
            .unwrap();

        let latest = store.latest_checkpoint("t1").await.unwrap().unwrap();
        assert_eq!(latest.step_id, "s2");

        let rewound = store.checkpoint_at("t1", "s1").await.unwrap().unwrap();
        assert_eq!(rewound.state["turn"], 1);

        assert_eq!(
            store.list_checkpoint_steps("t1").await.unwrap(),
            vec!["s1", "s2"]
        );
    }

    #[tokio::test]
    async fn test_resource_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .save_resource("u1", "full conversation text")
            .await
            .unwrap();
        assert_eq!(
            store.get_resource(&id).await.unwrap(),
            Some("full conversation text".to_string())
        );
        let hits = store.search_resources("u1", "conversation").await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
