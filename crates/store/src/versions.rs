//! Agent identity, memory blocks, and the append-only config version store.
//!
//! Versions are immutable rows; the agent carries a pointer to its current
//! version. Rollback never rewrites history — it appends a new version whose
//! content copies the target and whose parent is the target. External
//! syncers observe changes through the `ConfigChanged` domain event; no file
//! side effects happen here.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use mnemon_core::agent::{Agent, AgentConfig, ConfigPatch, MemoryBlock};
use mnemon_core::error::StorageError;
use mnemon_core::event::{DomainEvent, EventBus};

/// The agent configuration and version store.
pub struct VersionStore {
    pool: SqlitePool,
    event_bus: Option<Arc<EventBus>>,
    /// Configuration updates are serialized; an in-flight turn keeps using
    /// the snapshot it started with.
    update_lock: tokio::sync::Mutex<()>,
}

impl VersionStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self { pool, event_bus: None, update_lock: tokio::sync::Mutex::new(()) };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Attach an event bus; `ConfigChanged` is published on every new version.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                active          INTEGER NOT NULL DEFAULT 1,
                current_version TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("agents table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_versions (
                version_id         TEXT PRIMARY KEY,
                agent_id           TEXT NOT NULL,
                parent_version     TEXT,
                created_at         TEXT NOT NULL,
                change_description TEXT NOT NULL DEFAULT '',
                config             TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("agent_versions table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_versions_agent \
             ON agent_versions(agent_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("versions index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_blocks (
                agent_id    TEXT NOT NULL,
                label       TEXT NOT NULL,
                value       TEXT NOT NULL DEFAULT '',
                limit_chars INTEGER NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                read_only   INTEGER NOT NULL DEFAULT 0,
                metadata    TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (agent_id, label)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("memory_blocks table: {e}")))?;

        debug!("Version store migrations complete");
        Ok(())
    }

    fn publish_config_changed(&self, agent_id: &str, version_id: &str) {
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ConfigChanged {
                agent_id: agent_id.to_string(),
                new_version: version_id.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<Agent, StorageError> {
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at_str: String = row
            .try_get("updated_at")
            .map_err(|e| StorageError::QueryFailed(format!("updated_at column: {e}")))?;
        let active: i64 = row.try_get("active").unwrap_or(1);

        Ok(Agent {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?,
            name: row
                .try_get("name")
                .map_err(|e| StorageError::QueryFailed(format!("name column: {e}")))?,
            description: row.try_get("description").unwrap_or_default(),
            active: active != 0,
            current_version: row
                .try_get("current_version")
                .map_err(|e| StorageError::QueryFailed(format!("current_version column: {e}")))?,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<AgentConfig, StorageError> {
        let config_json: String = row
            .try_get("config")
            .map_err(|e| StorageError::QueryFailed(format!("config column: {e}")))?;
        serde_json::from_str(&config_json)
            .map_err(|e| StorageError::QueryFailed(format!("config deserialization: {e}")))
    }

    fn row_to_block(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryBlock, StorageError> {
        let read_only: i64 = row.try_get("read_only").unwrap_or(0);
        let limit_chars: i64 = row
            .try_get("limit_chars")
            .map_err(|e| StorageError::QueryFailed(format!("limit_chars column: {e}")))?;
        let metadata_json: String = row.try_get("metadata").unwrap_or_else(|_| "{}".into());

        Ok(MemoryBlock {
            label: row
                .try_get("label")
                .map_err(|e| StorageError::QueryFailed(format!("label column: {e}")))?,
            value: row.try_get("value").unwrap_or_default(),
            limit_chars: limit_chars.max(0) as usize,
            description: row.try_get("description").unwrap_or_default(),
            read_only: read_only != 0,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        })
    }

    async fn insert_version(
        &self,
        agent_id: &str,
        config: &AgentConfig,
    ) -> Result<(), StorageError> {
        let config_json = serde_json::to_string(config)
            .map_err(|e| StorageError::QueryFailed(format!("config serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO agent_versions
                (version_id, agent_id, parent_version, created_at, change_description, config)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&config.version_id)
        .bind(agent_id)
        .bind(&config.parent_version)
        .bind(config.created_at.to_rfc3339())
        .bind(&config.change_description)
        .bind(&config_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("INSERT version: {e}")))?;
        Ok(())
    }

    async fn set_current_version(
        &self,
        agent_id: &str,
        version_id: &str,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE agents SET current_version = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(version_id)
        .bind(Utc::now().to_rfc3339())
        .bind(agent_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("pointer update: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("agent {agent_id}")));
        }
        Ok(())
    }

    // ── Agents ────────────────────────────────────────────────────────

    /// Create an agent with an initial configuration version and the
    /// standard identity blocks.
    pub async fn create_agent(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        config: AgentConfig,
    ) -> Result<Agent, StorageError> {
        let id = id.into();
        let name = name.into();
        let now = Utc::now();

        self.insert_version(&id, &config).await?;

        sqlx::query(
            r#"
            INSERT INTO agents (id, name, description, active, current_version, created_at, updated_at)
            VALUES (?1, ?2, '', 1, ?3, ?4, ?4)
            "#,
        )
        .bind(&id)
        .bind(&name)
        .bind(&config.version_id)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("INSERT agent: {e}")))?;

        for block in [
            MemoryBlock::new("persona", "", 4_000),
            MemoryBlock::new("human", "", 4_000),
        ] {
            self.upsert_block(&id, block).await?;
        }

        info!(agent = %id, version = %config.version_id, "Agent created");
        self.get_agent(&id).await?.ok_or_else(|| StorageError::NotFound(format!("agent {id}")))
    }

    pub async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StorageError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("GET agent: {e}")))?;
        match row {
            Some(ref r) => Ok(Some(Self::row_to_agent(r)?)),
            None => Ok(None),
        }
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, StorageError> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("list agents: {e}")))?;
        rows.iter().map(Self::row_to_agent).collect()
    }

    // ── Versions ──────────────────────────────────────────────────────

    /// The agent's current configuration.
    pub async fn get_current(&self, agent_id: &str) -> Result<AgentConfig, StorageError> {
        let agent = self
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("agent {agent_id}")))?;
        self.get_version(agent_id, &agent.current_version)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("version {}", agent.current_version)))
    }

    pub async fn get_version(
        &self,
        agent_id: &str,
        version_id: &str,
    ) -> Result<Option<AgentConfig>, StorageError> {
        let row =
            sqlx::query("SELECT * FROM agent_versions WHERE agent_id = ?1 AND version_id = ?2")
                .bind(agent_id)
                .bind(version_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("GET version: {e}")))?;
        match row {
            Some(ref r) => Ok(Some(Self::row_to_config(r)?)),
            None => Ok(None),
        }
    }

    /// Apply a patch, creating a new version and moving the current pointer.
    /// Two identical consecutive updates create two versions — history is
    /// never coalesced.
    pub async fn update(
        &self,
        agent_id: &str,
        patch: &ConfigPatch,
        description: impl Into<String>,
    ) -> Result<AgentConfig, StorageError> {
        let _guard = self.update_lock.lock().await;

        let current = self.get_current(agent_id).await?;
        let next = current.derive(patch, description);

        self.insert_version(agent_id, &next).await?;
        self.set_current_version(agent_id, &next.version_id).await?;
        self.publish_config_changed(agent_id, &next.version_id);

        info!(agent = %agent_id, version = %next.version_id, "Config updated");
        Ok(next)
    }

    /// Create a new version restoring the content of `version_id`. The new
    /// version's parent is the rolled-back-to version; history is untouched.
    pub async fn rollback(
        &self,
        agent_id: &str,
        version_id: &str,
    ) -> Result<AgentConfig, StorageError> {
        let _guard = self.update_lock.lock().await;

        let target = self
            .get_version(agent_id, version_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("version {version_id}")))?;
        let restored = AgentConfig::rollback_from(&target);

        self.insert_version(agent_id, &restored).await?;
        self.set_current_version(agent_id, &restored.version_id).await?;
        self.publish_config_changed(agent_id, &restored.version_id);

        info!(agent = %agent_id, from = %version_id, version = %restored.version_id, "Rolled back");
        Ok(restored)
    }

    /// Version history, newest first.
    pub async fn list_versions(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<AgentConfig>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM agent_versions WHERE agent_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )
        .bind(agent_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("list versions: {e}")))?;
        rows.iter().map(Self::row_to_config).collect()
    }

    // ── Memory blocks ─────────────────────────────────────────────────

    pub async fn upsert_block(
        &self,
        agent_id: &str,
        block: MemoryBlock,
    ) -> Result<(), StorageError> {
        let metadata_json = serde_json::to_string(&block.metadata)
            .map_err(|e| StorageError::QueryFailed(format!("metadata serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO memory_blocks (agent_id, label, value, limit_chars, description, read_only, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(agent_id, label) DO UPDATE SET
                value = excluded.value,
                limit_chars = excluded.limit_chars,
                description = excluded.description,
                read_only = excluded.read_only,
                metadata = excluded.metadata
            "#,
        )
        .bind(agent_id)
        .bind(&block.label)
        .bind(&block.value)
        .bind(block.limit_chars as i64)
        .bind(&block.description)
        .bind(block.read_only as i64)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("upsert block: {e}")))?;
        Ok(())
    }

    pub async fn get_block(
        &self,
        agent_id: &str,
        label: &str,
    ) -> Result<Option<MemoryBlock>, StorageError> {
        let row = sqlx::query("SELECT * FROM memory_blocks WHERE agent_id = ?1 AND label = ?2")
            .bind(agent_id)
            .bind(label)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("GET block: {e}")))?;
        match row {
            Some(ref r) => Ok(Some(Self::row_to_block(r)?)),
            None => Ok(None),
        }
    }

    pub async fn list_blocks(&self, agent_id: &str) -> Result<Vec<MemoryBlock>, StorageError> {
        let rows =
            sqlx::query("SELECT * FROM memory_blocks WHERE agent_id = ?1 ORDER BY label ASC")
                .bind(agent_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("list blocks: {e}")))?;
        rows.iter().map(Self::row_to_block).collect()
    }

    /// Replace a block's value. Read-only blocks and over-limit values are
    /// rejected and the stored block is unchanged.
    pub async fn set_block_value(
        &self,
        agent_id: &str,
        label: &str,
        value: &str,
    ) -> Result<MemoryBlock, StorageError> {
        let mut block = self
            .get_block(agent_id, label)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("block {label}")))?;
        block.apply_value(value)?;
        self.upsert_block(agent_id, block.clone()).await?;
        Ok(block)
    }

    /// Append a line to a block's value, under the same constraints.
    pub async fn append_block_value(
        &self,
        agent_id: &str,
        label: &str,
        text: &str,
    ) -> Result<MemoryBlock, StorageError> {
        let mut block = self
            .get_block(agent_id, label)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("block {label}")))?;
        block.apply_append(text)?;
        self.upsert_block(agent_id, block.clone()).await?;
        Ok(block)
    }

    /// Replace the first occurrence of `old` with `new` inside a block.
    pub async fn replace_block_content(
        &self,
        agent_id: &str,
        label: &str,
        old: &str,
        new: &str,
    ) -> Result<MemoryBlock, StorageError> {
        let block = self
            .get_block(agent_id, label)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("block {label}")))?;
        if !block.value.contains(old) {
            return Err(StorageError::NotFound(format!("'{old}' not present in block {label}")));
        }
        let replaced = block.value.replacen(old, new, 1);
        self.set_block_value(agent_id, label, &replaced).await
    }
}
