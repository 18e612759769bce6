//! Append-only per-session conversation log.
//!
//! `seq` is strictly increasing per session and assigned under a per-session
//! lock, so concurrent appends never collide. Summarization compacts history
//! by deleting a prefix and inserting a single system-tagged summary message
//! in its place.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use mnemon_core::error::{ErrorKind, StorageError};
use mnemon_core::message::{Message, MessageKind, MessageToolCall, Role, SessionId};

/// One page of a session's history, oldest first.
#[derive(Debug, Clone)]
pub struct ConversationPage {
    pub messages: Vec<Message>,
    /// Pass as `before_seq` to fetch the previous page; `None` when the page
    /// reaches the start of the log.
    pub next_cursor: Option<i64>,
}

/// The durable conversation store.
pub struct ConversationStore {
    pool: SqlitePool,
    /// Per-session append locks so `seq` assignment is race-free.
    session_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self { pool, session_locks: tokio::sync::Mutex::new(HashMap::new()) };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                session_id        TEXT NOT NULL,
                seq               INTEGER NOT NULL,
                id                TEXT NOT NULL,
                role              TEXT NOT NULL,
                kind              TEXT NOT NULL DEFAULT 'inbox',
                content           TEXT NOT NULL,
                tool_calls        TEXT NOT NULL DEFAULT '[]',
                tool_call_id      TEXT,
                thinking          TEXT,
                reasoning_time_ms INTEGER,
                error_kind        TEXT,
                created_at        TEXT NOT NULL,
                metadata          TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (session_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("messages table: {e}")))?;

        debug!("Conversation store migrations complete");
        Ok(())
    }

    async fn lock_for(&self, session: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks.entry(session.0.clone()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StorageError> {
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| StorageError::QueryFailed(format!("session_id column: {e}")))?;
        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| StorageError::QueryFailed(format!("seq column: {e}")))?;
        let id: String = row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StorageError::QueryFailed(format!("role column: {e}")))?;
        let kind: String = row.try_get("kind").unwrap_or_else(|_| "inbox".into());
        let content: String = row
            .try_get("content")
            .map_err(|e| StorageError::QueryFailed(format!("content column: {e}")))?;
        let tool_calls_json: String = row.try_get("tool_calls").unwrap_or_else(|_| "[]".into());
        let tool_call_id: Option<String> = row.try_get("tool_call_id").ok();
        let thinking: Option<String> = row.try_get("thinking").ok();
        let reasoning_time_ms: Option<i64> = row.try_get("reasoning_time_ms").ok();
        let error_kind_str: Option<String> = row.try_get("error_kind").ok();
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?;
        let metadata_json: String = row.try_get("metadata").unwrap_or_else(|_| "{}".into());

        let role = match role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            other => return Err(StorageError::QueryFailed(format!("unknown role: {other}"))),
        };
        let kind = match kind.as_str() {
            "system" => MessageKind::System,
            _ => MessageKind::Inbox,
        };
        let tool_calls: Vec<MessageToolCall> =
            serde_json::from_str(&tool_calls_json).unwrap_or_default();
        let error_kind: Option<ErrorKind> = error_kind_str
            .and_then(|s| serde_json::from_str(&format!("\"{s}\"")).ok());
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Message {
            id,
            session_id: SessionId(session_id),
            seq,
            role,
            content,
            kind,
            tool_calls,
            tool_call_id,
            thinking,
            reasoning_time_ms: reasoning_time_ms.map(|v| v.max(0) as u64),
            error_kind,
            created_at,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        })
    }

    async fn insert_with_seq(&self, msg: &Message, seq: i64) -> Result<(), StorageError> {
        let tool_calls_json = serde_json::to_string(&msg.tool_calls)
            .map_err(|e| StorageError::QueryFailed(format!("tool_calls serialization: {e}")))?;
        let metadata_json = serde_json::to_string(&msg.metadata)
            .map_err(|e| StorageError::QueryFailed(format!("metadata serialization: {e}")))?;
        let error_kind = msg.error_kind.map(|k| k.to_string());

        sqlx::query(
            r#"
            INSERT INTO messages
                (session_id, seq, id, role, kind, content, tool_calls, tool_call_id,
                 thinking, reasoning_time_ms, error_kind, created_at, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&msg.session_id.0)
        .bind(seq)
        .bind(&msg.id)
        .bind(msg.role.as_str())
        .bind(msg.kind.as_str())
        .bind(&msg.content)
        .bind(&tool_calls_json)
        .bind(&msg.tool_call_id)
        .bind(&msg.thinking)
        .bind(msg.reasoning_time_ms.map(|v| v as i64))
        .bind(&error_kind)
        .bind(msg.created_at.to_rfc3339())
        .bind(&metadata_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("INSERT message: {e}")))?;

        Ok(())
    }

    async fn max_seq(&self, session: &SessionId) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COALESCE(MAX(seq), 0) AS max_seq FROM messages WHERE session_id = ?1")
            .bind(&session.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("MAX(seq): {e}")))?;
        row.try_get("max_seq").map_err(|e| StorageError::QueryFailed(format!("max_seq column: {e}")))
    }

    /// Append a message, assigning the next `seq` for its session. Returns
    /// the message as persisted.
    pub async fn append(&self, mut msg: Message) -> Result<Message, StorageError> {
        let lock = self.lock_for(&msg.session_id).await;
        let _guard = lock.lock().await;

        let seq = self.max_seq(&msg.session_id).await? + 1;
        self.insert_with_seq(&msg, seq).await?;
        msg.seq = seq;

        debug!(session = %msg.session_id, seq, role = msg.role.as_str(), "Appended message");
        Ok(msg)
    }

    /// One page of history ending just before `before_seq` (or the newest
    /// page when `None`). Messages are returned oldest → newest.
    pub async fn list(
        &self,
        session: &SessionId,
        limit: usize,
        before_seq: Option<i64>,
    ) -> Result<ConversationPage, StorageError> {
        let cursor = before_seq.unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ?1 AND seq < ?2 \
             ORDER BY seq DESC LIMIT ?3",
        )
        .bind(&session.0)
        .bind(cursor)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("list: {e}")))?;

        let mut messages: Vec<Message> =
            rows.iter().map(Self::row_to_message).collect::<Result<_, _>>()?;
        messages.reverse();

        let next_cursor = match messages.first() {
            Some(first) if first.seq > 1 && messages.len() == limit => Some(first.seq),
            _ => None,
        };
        Ok(ConversationPage { messages, next_cursor })
    }

    /// The full log for a session, oldest first.
    pub async fn list_all(&self, session: &SessionId) -> Result<Vec<Message>, StorageError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE session_id = ?1 ORDER BY seq ASC")
            .bind(&session.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("list_all: {e}")))?;
        rows.iter().map(Self::row_to_message).collect()
    }

    /// Number of messages in a session.
    pub async fn count(&self, session: &SessionId) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM messages WHERE session_id = ?1")
            .bind(&session.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("count: {e}")))?;
        let cnt: i64 =
            row.try_get("cnt").map_err(|e| StorageError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }

    /// Delete all messages for a session.
    pub async fn clear(&self, session: &SessionId) -> Result<usize, StorageError> {
        let lock = self.lock_for(session).await;
        let _guard = lock.lock().await;

        let result = sqlx::query("DELETE FROM messages WHERE session_id = ?1")
            .bind(&session.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("clear: {e}")))?;

        info!(session = %session, deleted = result.rows_affected(), "Cleared session");
        Ok(result.rows_affected() as usize)
    }

    /// Replace the prefix `seq ≤ up_to_seq` with a single system-tagged
    /// summary message occupying `up_to_seq` itself.
    ///
    /// All replaced messages are strictly older than any retained message,
    /// and applying the same `up_to_seq` twice is a no-op (the second call
    /// replaces only the summary with an identical summary).
    pub async fn replace_prefix_with_summary(
        &self,
        session: &SessionId,
        up_to_seq: i64,
        summary_text: &str,
    ) -> Result<(), StorageError> {
        let lock = self.lock_for(session).await;
        let _guard = lock.lock().await;

        sqlx::query("DELETE FROM messages WHERE session_id = ?1 AND seq <= ?2")
            .bind(&session.0)
            .bind(up_to_seq)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("prefix delete: {e}")))?;

        let summary = Message::system(session, summary_text);
        self.insert_with_seq(&summary, up_to_seq).await?;

        info!(session = %session, up_to_seq, "Replaced prefix with summary");
        Ok(())
    }
}
