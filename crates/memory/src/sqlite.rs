//! SQLite memory store.
//!
//! One table holds all persisted memory items, tier-tagged. Embeddings are
//! stored as little-endian f32 blobs. WAL journal mode keeps readers cheap
//! while the engine writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use mnemon_core::error::MemoryError;
use mnemon_core::memory::{
    clamp_importance, MemoryFilter, MemoryItem, MemoryStore, MemoryTier,
};

use crate::vector;

/// A durable SQLite-backed memory store.
pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    /// Create a new store from a SQLite connection string.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database exists per connection; the pool must not fan out.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite memory store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_items (
                iid              INTEGER PRIMARY KEY AUTOINCREMENT,
                id               TEXT UNIQUE NOT NULL,
                agent_id         TEXT NOT NULL,
                tier             TEXT NOT NULL,
                content          TEXT NOT NULL,
                category         TEXT NOT NULL,
                importance       REAL NOT NULL,
                created_at       TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL,
                access_count     INTEGER NOT NULL DEFAULT 1,
                metadata         TEXT NOT NULL DEFAULT '{}',
                embedding        BLOB
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("memory_items table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memory_agent_tier ON memory_items(agent_id, tier)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("agent/tier index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memory_created_at ON memory_items(created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("created_at index: {e}")))?;

        debug!("SQLite memory migrations complete");
        Ok(())
    }

    fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryItem, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let agent_id: String = row
            .try_get("agent_id")
            .map_err(|e| MemoryError::QueryFailed(format!("agent_id column: {e}")))?;
        let tier: String = row
            .try_get("tier")
            .map_err(|e| MemoryError::QueryFailed(format!("tier column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let category: String = row
            .try_get("category")
            .map_err(|e| MemoryError::QueryFailed(format!("category column: {e}")))?;
        let importance: f64 = row.try_get("importance").unwrap_or(5.0);
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;
        let last_accessed_str: String = row
            .try_get("last_accessed_at")
            .map_err(|e| MemoryError::QueryFailed(format!("last_accessed_at column: {e}")))?;
        let access_count: i64 = row.try_get("access_count").unwrap_or(1);
        let metadata_json: String = row.try_get("metadata").unwrap_or_else(|_| "{}".into());

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let last_accessed_at = chrono::DateTime::parse_from_rfc3339(&last_accessed_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let embedding: Option<Vec<u8>> = row.try_get::<Option<Vec<u8>>, _>("embedding").ok().flatten();
        let embedding = embedding.map(|blob| {
            blob.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        });

        Ok(MemoryItem {
            id,
            agent_id,
            tier: tier.parse()?,
            content,
            embedding,
            importance: clamp_importance(importance as f32),
            category: category.parse()?,
            created_at,
            last_accessed_at,
            access_count: access_count.max(1) as u32,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        })
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Fetch rows for an agent, pushing the tier into SQL; the rest of the
    /// filter applies in memory.
    async fn fetch_filtered(
        &self,
        agent_id: &str,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let rows = match filter.tier {
            Some(tier) => {
                sqlx::query(
                    "SELECT * FROM memory_items WHERE agent_id = ?1 AND tier = ?2 \
                     ORDER BY created_at DESC",
                )
                .bind(agent_id)
                .bind(tier.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM memory_items WHERE agent_id = ?1 ORDER BY created_at DESC",
                )
                .bind(agent_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| MemoryError::QueryFailed(format!("list: {e}")))?;

        let items = rows
            .iter()
            .map(Self::row_to_item)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|item| filter.matches(item))
            .collect();
        Ok(items)
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn put(&self, mut item: MemoryItem) -> Result<String, MemoryError> {
        if item.id.is_empty() {
            item.id = Uuid::new_v4().to_string();
        }
        let id = item.id.clone();
        let metadata_json = serde_json::to_string(&item.metadata)
            .map_err(|e| MemoryError::Storage(format!("metadata serialization: {e}")))?;
        let embedding_blob: Option<Vec<u8>> =
            item.embedding.as_deref().map(Self::embedding_to_blob);

        sqlx::query(
            r#"
            INSERT INTO memory_items
                (id, agent_id, tier, content, category, importance,
                 created_at, last_accessed_at, access_count, metadata, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                tier = excluded.tier,
                importance = excluded.importance,
                last_accessed_at = excluded.last_accessed_at,
                access_count = excluded.access_count,
                metadata = excluded.metadata,
                embedding = excluded.embedding
            "#,
        )
        .bind(&item.id)
        .bind(&item.agent_id)
        .bind(item.tier.as_str())
        .bind(&item.content)
        .bind(item.category.as_str())
        .bind(clamp_importance(item.importance) as f64)
        .bind(item.created_at.to_rfc3339())
        .bind(item.last_accessed_at.to_rfc3339())
        .bind(item.access_count as i64)
        .bind(&metadata_json)
        .bind(embedding_blob.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!("Stored memory item {id}");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>, MemoryError> {
        let row = sqlx::query("SELECT * FROM memory_items WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("GET by ID: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_item(r)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM memory_items WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_access(&self, id: &str, now: DateTime<Utc>) -> Result<(), MemoryError> {
        let result = sqlx::query(
            "UPDATE memory_items SET access_count = access_count + 1, last_accessed_at = ?1 \
             WHERE id = ?2",
        )
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("access update failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_importance(&self, id: &str, importance: f32) -> Result<(), MemoryError> {
        let result = sqlx::query("UPDATE memory_items SET importance = ?1 WHERE id = ?2")
            .bind(clamp_importance(importance) as f64)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("importance update failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn merge_metadata(
        &self,
        id: &str,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), MemoryError> {
        let existing = self.get(id).await?.ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

        let mut metadata = existing.metadata;
        for (k, v) in patch {
            metadata.insert(k, v);
        }
        let metadata_json = serde_json::to_string(&metadata)
            .map_err(|e| MemoryError::Storage(format!("metadata serialization: {e}")))?;

        sqlx::query("UPDATE memory_items SET metadata = ?1 WHERE id = ?2")
            .bind(&metadata_json)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("metadata update failed: {e}")))?;

        Ok(())
    }

    async fn vector_search(
        &self,
        agent_id: &str,
        embedding: &[f32],
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let candidates: Vec<MemoryItem> = self
            .fetch_filtered(agent_id, filter)
            .await?
            .into_iter()
            .filter(|i| i.embedding.is_some())
            .collect();

        Ok(vector::rank_by_similarity(&candidates, embedding, k, 0.0)
            .into_iter()
            .map(|(_, item)| item)
            .collect())
    }

    async fn list(
        &self,
        agent_id: &str,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        self.fetch_filtered(agent_id, filter).await
    }
}
