use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::repository::{IntroRepository, StorageError};
use study_core::model::ContentId;

use super::SqliteRepository;

#[async_trait]
impl IntroRepository for SqliteRepository {
    async fn intro_seen(&self, content_id: &ContentId) -> Result<bool, StorageError> {
        Ok(self.intro_seen_at(content_id).await?.is_some())
    }

    async fn mark_intro_seen(
        &self,
        content_id: &ContentId,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO intro_flags (content_id, seen_at)
            VALUES (?1, ?2)
            ON CONFLICT(content_id) DO NOTHING
            ",
        )
        .bind(content_id.as_str())
        .bind(seen_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }

    async fn clear_intro(&self, content_id: &ContentId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM intro_flags WHERE content_id = ?1")
            .bind(content_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn intro_seen_at(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("SELECT seen_at FROM intro_flags WHERE content_id = ?1")
            .bind(content_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let seen_at: DateTime<Utc> = row
            .try_get("seen_at")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(Some(seen_at))
    }
}
