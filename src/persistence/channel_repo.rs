//! Channel binding repository for `SQLite` persistence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::models::channel::ChannelBinding;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for channel → directory bindings.
#[derive(Clone)]
pub struct ChannelRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ChannelRow {
    channel_id: String,
    directory: String,
    conversation_id: Option<String>,
    auto_grant: i64,
    updated_at: String,
}

impl ChannelRow {
    fn into_binding(self) -> Result<ChannelBinding> {
        let updated_at = chrono::DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| AppError::Db(format!("invalid updated_at: {e}")))?
            .with_timezone(&Utc);

        Ok(ChannelBinding {
            channel_id: self.channel_id,
            directory: PathBuf::from(self.directory),
            conversation_id: self.conversation_id,
            auto_grant: self.auto_grant != 0,
            updated_at,
        })
    }
}

impl ChannelRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Bind `channel_id` to `directory`, replacing any previous binding.
    ///
    /// Rebinding to a different directory forgets the stored conversation;
    /// the auto-grant flag is kept.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn bind(&self, channel_id: &str, directory: &Path) -> Result<ChannelBinding> {
        let directory = directory.to_string_lossy();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO channel_binding (channel_id, directory, conversation_id, auto_grant, updated_at)
             VALUES (?1, ?2, NULL, 0, ?3)
             ON CONFLICT(channel_id) DO UPDATE SET
                conversation_id = CASE WHEN directory = excluded.directory
                                       THEN conversation_id ELSE NULL END,
                directory = excluded.directory,
                updated_at = excluded.updated_at",
        )
        .bind(channel_id)
        .bind(directory.as_ref())
        .bind(&now)
        .execute(self.db.as_ref())
        .await?;

        self.get(channel_id)
            .await?
            .ok_or_else(|| AppError::Db("channel binding missing after upsert".into()))
    }

    /// Fetch the binding for `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, channel_id: &str) -> Result<Option<ChannelBinding>> {
        let row: Option<ChannelRow> = sqlx::query_as(
            "SELECT channel_id, directory, conversation_id, auto_grant, updated_at
             FROM channel_binding WHERE channel_id = ?1",
        )
        .bind(channel_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ChannelRow::into_binding).transpose()
    }

    /// Remove the binding for `channel_id`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn unbind(&self, channel_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM channel_binding WHERE channel_id = ?1")
            .bind(channel_id)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All bindings ordered by channel id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<ChannelBinding>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(
            "SELECT channel_id, directory, conversation_id, auto_grant, updated_at
             FROM channel_binding ORDER BY channel_id ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ChannelRow::into_binding).collect()
    }

    /// Remember the conversation to resume for `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the channel is not bound, or
    /// `AppError::Db` if the update fails.
    pub async fn set_conversation_id(&self, channel_id: &str, conversation_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE channel_binding SET conversation_id = ?1, updated_at = ?2 WHERE channel_id = ?3",
        )
        .bind(conversation_id)
        .bind(Utc::now().to_rfc3339())
        .bind(channel_id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("channel {channel_id} is not bound")));
        }
        Ok(())
    }

    /// Forget the stored conversation. Returns whether one was stored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn clear_conversation_id(&self, channel_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE channel_binding SET conversation_id = NULL, updated_at = ?1
             WHERE channel_id = ?2 AND conversation_id IS NOT NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(channel_id)
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the auto-grant policy. Returns `false` if the channel is not bound.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_auto_grant(&self, channel_id: &str, auto_grant: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE channel_binding SET auto_grant = ?1, updated_at = ?2 WHERE channel_id = ?3",
        )
        .bind(i64::from(auto_grant))
        .bind(Utc::now().to_rfc3339())
        .bind(channel_id)
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
