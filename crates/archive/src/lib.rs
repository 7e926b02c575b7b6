//! Durable document archive for chats, contacts, and messages.
//!
//! The archive is a collaborator, not a dependency of reply handling: the
//! orchestrator feeds it history-sync documents and logs failures, and no
//! reply invariant depends on its schema beyond "addressable by id,
//! upsertable".

use {
    async_trait::async_trait,
    papo_transport::{ChatDocument, ContactDocument, RawMessage},
    sqlx::SqlitePool,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Generic document store addressed by conversation id / message id.
#[async_trait]
pub trait MessageArchive: Send + Sync {
    async fn upsert_chat(&self, chat: &ChatDocument) -> Result<()>;
    async fn upsert_contact(&self, contact: &ContactDocument) -> Result<()>;
    async fn upsert_message(&self, message: &RawMessage) -> Result<()>;

    /// Most recent messages for a chat, newest first.
    async fn recent_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<RawMessage>>;

    async fn chat_exists(&self, chat_id: &str) -> Result<bool>;
}

/// SQLite-backed archive.
pub struct SqliteArchive {
    pool: SqlitePool,
}

impl SqliteArchive {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the archive tables if they do not exist yet.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chats (
                id   TEXT PRIMARY KEY,
                name TEXT
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contacts (
                id     TEXT PRIMARY KEY,
                name   TEXT,
                notify TEXT
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id        TEXT PRIMARY KEY,
                chat_id   TEXT    NOT NULL,
                from_me   INTEGER NOT NULL DEFAULT 0,
                push_name TEXT,
                timestamp INTEGER NOT NULL,
                payload   TEXT    NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_chat_time
             ON messages (chat_id, timestamp DESC)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MessageArchive for SqliteArchive {
    async fn upsert_chat(&self, chat: &ChatDocument) -> Result<()> {
        sqlx::query(
            "INSERT INTO chats (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&chat.id)
        .bind(&chat.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_contact(&self, contact: &ContactDocument) -> Result<()> {
        sqlx::query(
            "INSERT INTO contacts (id, name, notify) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, notify = excluded.notify",
        )
        .bind(&contact.id)
        .bind(&contact.name)
        .bind(&contact.notify)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_message(&self, message: &RawMessage) -> Result<()> {
        let payload = serde_json::to_string(&message.payload)?;
        sqlx::query(
            "INSERT INTO messages (id, chat_id, from_me, push_name, timestamp, payload)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
        )
        .bind(&message.id)
        .bind(&message.chat_id)
        .bind(message.from_me)
        .bind(&message.push_name)
        .bind(message.timestamp)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<RawMessage>> {
        let rows = sqlx::query_as::<_, (String, String, bool, Option<String>, i64, String)>(
            "SELECT id, chat_id, from_me, push_name, timestamp, payload
             FROM messages
             WHERE chat_id = ?
             ORDER BY timestamp DESC
             LIMIT ?",
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(RawMessage {
                    id: r.0,
                    chat_id: r.1,
                    from_me: r.2,
                    push_name: r.3,
                    timestamp: r.4,
                    payload: serde_json::from_str(&r.5)?,
                })
            })
            .collect()
    }

    async fn chat_exists(&self, chat_id: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 > 0)
    }
}
