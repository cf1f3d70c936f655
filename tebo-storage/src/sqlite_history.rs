//! SQLite history store.
//!
//! `updates` holds the JSON payload of every processed update keyed by update id;
//! `chats` holds every distinct chat, refreshed on each sighting so aliases stay current.

use async_trait::async_trait;
use chrono::Utc;
use tebo_core::Update;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::history::{update_chat, History, HistoryStore};
use crate::models::ChatRecord;
use crate::sqlite_pool::SqlitePoolManager;

#[derive(Clone)]
pub struct SqliteHistory {
    pool_manager: SqlitePoolManager,
}

impl SqliteHistory {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool_manager = SqlitePoolManager::new(database_url).await?;
        let store = Self { pool_manager };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StorageError> {
        info!("Creating history tables if not exist");

        let pool = self.pool_manager.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS updates (
                update_id INTEGER PRIMARY KEY,
                chat_id INTEGER,
                payload TEXT NOT NULL,
                received_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                first_seen_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_updates_chat_id ON updates(chat_id)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Number of updates in the log.
    pub async fn update_count(&self) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM updates")
            .fetch_one(self.pool_manager.pool())
            .await?;
        Ok(count)
    }

    /// Updates logged for one chat, oldest first.
    pub async fn updates_by_chat(&self, chat_id: i64) -> Result<Vec<Update>, StorageError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT payload FROM updates WHERE chat_id = ? ORDER BY update_id")
                .bind(chat_id)
                .fetch_all(self.pool_manager.pool())
                .await?;

        rows.into_iter()
            .map(|(payload,)| serde_json::from_str(&payload).map_err(StorageError::from))
            .collect()
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn load(&self) -> Result<History, StorageError> {
        let pool = self.pool_manager.pool();

        let (high_water_mark,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(update_id), 0) FROM updates")
                .fetch_one(pool)
                .await?;

        let chats: Vec<ChatRecord> = sqlx::query_as(
            "SELECT id, kind, title, username, first_name, last_name FROM chats ORDER BY rowid",
        )
        .fetch_all(pool)
        .await?;

        info!(
            high_water_mark = high_water_mark,
            chats = chats.len(),
            "History loaded"
        );

        Ok(History {
            high_water_mark,
            chats: chats.into_iter().map(Into::into).collect(),
        })
    }

    async fn append(&self, updates: &[Update]) -> Result<(), StorageError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool_manager.pool().begin().await?;
        let now = Utc::now();

        for update in updates {
            let chat = update_chat(update);
            let payload = serde_json::to_string(update)?;

            sqlx::query(
                r#"
                INSERT OR IGNORE INTO updates (update_id, chat_id, payload, received_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(update.update_id)
            .bind(chat.map(|c| c.id))
            .bind(&payload)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if let Some(chat) = chat {
                let record = ChatRecord::from(chat);
                sqlx::query(
                    r#"
                    INSERT INTO chats (id, kind, title, username, first_name, last_name, first_seen_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        kind = excluded.kind,
                        title = excluded.title,
                        username = excluded.username,
                        first_name = excluded.first_name,
                        last_name = excluded.last_name
                    "#,
                )
                .bind(record.id)
                .bind(&record.kind)
                .bind(&record.title)
                .bind(&record.username)
                .bind(&record.first_name)
                .bind(&record.last_name)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        debug!(count = updates.len(), "Appended updates to history");
        Ok(())
    }
}
