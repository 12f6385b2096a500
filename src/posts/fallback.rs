// Local pending queue - the only shared mutable resource of the pipeline
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::sync::Mutex;
use thiserror::Error;

use crate::posts::domain::PostRecord;
use crate::state::DbPool;

/// Storage key holding the serialized array of queued posts.
pub const PENDING_POSTS_KEY: &str = "buzznetPosts";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Local storage unavailable: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Local storage error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Stored queue is unreadable: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Local storage is full ({capacity} posts)")]
    Full { capacity: usize },
}

/// Append-only collection of posts waiting for the server.
#[async_trait]
pub trait LocalFallbackStore: Send + Sync {
    /// Append one record. Either the whole collection is rewritten with it or nothing changes.
    async fn enqueue(&self, record: PostRecord) -> Result<(), PersistenceError>;

    /// Every queued record, oldest first.
    async fn list_all(&self) -> Result<Vec<PostRecord>, PersistenceError>;
}

/// SQLite-backed key-value store, one JSON array under `PENDING_POSTS_KEY`.
pub struct SqliteFallbackStore {
    pool: DbPool,
    writer: tokio::sync::Mutex<()>,
}

impl SqliteFallbackStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            writer: tokio::sync::Mutex::new(()),
        }
    }
}

fn read_queue(conn: &rusqlite::Connection) -> Result<Vec<PostRecord>, PersistenceError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM local_storage WHERE key = ?1",
            params![PENDING_POSTS_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

#[async_trait]
impl LocalFallbackStore for SqliteFallbackStore {
    async fn enqueue(&self, record: PostRecord) -> Result<(), PersistenceError> {
        // Single writer in this process; IMMEDIATE transaction against other processes
        let _guard = self.writer.lock().await;

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut queue = read_queue(&tx)?;
        queue.push(record);
        let json = serde_json::to_string(&queue)?;

        tx.execute(
            "INSERT INTO local_storage (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![PENDING_POSTS_KEY, json],
        )?;
        tx.commit()?;

        tracing::debug!("Pending queue now holds {} posts", queue.len());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<PostRecord>, PersistenceError> {
        let conn = self.pool.get()?;
        read_queue(&conn)
    }
}

/// In-memory queue for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryFallbackStore {
    records: Mutex<Vec<PostRecord>>,
    capacity: Option<usize>,
}

impl MemoryFallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses writes past `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            capacity: Some(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LocalFallbackStore for MemoryFallbackStore {
    async fn enqueue(&self, record: PostRecord) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(capacity) = self.capacity {
            if records.len() >= capacity {
                return Err(PersistenceError::Full { capacity });
            }
        }
        records.push(record);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<PostRecord>, PersistenceError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::posts::domain::{LocalIdGenerator, PostDraft};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sqlite_store() -> (SqliteFallbackStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let pool = db::create_pool(&tmp.path().join("local.db")).unwrap();
        db::run_migrations(&pool, db::LOCAL_STORE_MIGRATIONS).unwrap();
        (SqliteFallbackStore::new(pool), tmp)
    }

    fn record(title: &str) -> PostRecord {
        PostRecord::local(
            &PostDraft::new(title, "Body", "Ann"),
            &LocalIdGenerator::new(),
        )
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let (store, _tmp) = sqlite_store();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_round_trips_every_field() {
        let (store, _tmp) = sqlite_store();
        let original = record("Hi");

        store.enqueue(original.clone()).await.unwrap();
        let listed = store.list_all().await.unwrap();

        assert_eq!(listed, vec![original]);
    }

    #[tokio::test]
    async fn enqueue_appends_in_order() {
        let (store, _tmp) = sqlite_store();
        for title in ["one", "two", "three"] {
            store.enqueue(record(title)).await.unwrap();
        }

        let titles: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn concurrent_enqueues_lose_nothing() {
        let (store, _tmp) = sqlite_store();
        let store = Arc::new(store);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.spawn(async move { store.enqueue(record(&format!("post {}", i))).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_eq!(store.list_all().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn queue_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("local.db");
        let queued = record("persisted");

        {
            let pool = db::create_pool(&path).unwrap();
            db::run_migrations(&pool, db::LOCAL_STORE_MIGRATIONS).unwrap();
            SqliteFallbackStore::new(pool)
                .enqueue(queued.clone())
                .await
                .unwrap();
        }

        let pool = db::create_pool(&path).unwrap();
        db::run_migrations(&pool, db::LOCAL_STORE_MIGRATIONS).unwrap();
        let listed = SqliteFallbackStore::new(pool).list_all().await.unwrap();
        assert_eq!(listed, vec![queued]);
    }

    #[tokio::test]
    async fn corrupt_queue_is_an_error_not_a_reset() {
        let (store, _tmp) = sqlite_store();
        store
            .pool
            .get()
            .unwrap()
            .execute(
                "INSERT INTO local_storage (key, value) VALUES (?1, 'not json')",
                params![PENDING_POSTS_KEY],
            )
            .unwrap();

        let err = store.enqueue(record("Hi")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Serialization(_)));

        let raw: String = store
            .pool
            .get()
            .unwrap()
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![PENDING_POSTS_KEY],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw, "not json");
    }

    #[tokio::test]
    async fn missing_table_is_a_persistence_error() {
        let tmp = TempDir::new().unwrap();
        let pool = db::create_pool(&tmp.path().join("bare.db")).unwrap();
        let store = SqliteFallbackStore::new(pool);

        let err = store.enqueue(record("Hi")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Sql(_)));
    }

    #[tokio::test]
    async fn memory_store_refuses_past_capacity() {
        let store = MemoryFallbackStore::with_capacity(1);
        store.enqueue(record("first")).await.unwrap();

        let err = store.enqueue(record("second")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Full { capacity: 1 }));
        assert_eq!(store.len(), 1);
    }
}
