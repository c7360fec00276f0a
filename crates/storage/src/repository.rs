use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use study_core::model::ContentId;
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Client-local flags that survive restarts, keyed by content id.
#[async_trait]
pub trait IntroRepository: Send + Sync {
    /// Whether the active-recall intro was already shown for `content_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the flag cannot be read.
    async fn intro_seen(&self, content_id: &ContentId) -> Result<bool, StorageError>;

    /// Remember that the intro was shown. Marking twice keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the flag cannot be stored.
    async fn mark_intro_seen(
        &self,
        content_id: &ContentId,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Forget the flag so the intro shows again.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no flag was stored.
    async fn clear_intro(&self, content_id: &ContentId) -> Result<(), StorageError>;

    /// When the intro was first seen, if ever.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the flag cannot be read.
    async fn intro_seen_at(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<DateTime<Utc>>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    intros: Arc<Mutex<HashMap<ContentId, DateTime<Utc>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntroRepository for InMemoryRepository {
    async fn intro_seen(&self, content_id: &ContentId) -> Result<bool, StorageError> {
        Ok(self.intro_seen_at(content_id).await?.is_some())
    }

    async fn mark_intro_seen(
        &self,
        content_id: &ContentId,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .intros
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.entry(content_id.clone()).or_insert(seen_at);
        Ok(())
    }

    async fn clear_intro(&self, content_id: &ContentId) -> Result<(), StorageError> {
        let mut guard = self
            .intros
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .remove(content_id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    async fn intro_seen_at(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let guard = self
            .intros
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(content_id).copied())
    }
}

/// Repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub intros: Arc<dyn IntroRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            intros: Arc::new(InMemoryRepository::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use study_core::time::fixed_now;

    #[tokio::test]
    async fn intro_flag_round_trips() {
        let repo = InMemoryRepository::new();
        let content = ContentId::new("doc-1").unwrap();
        assert!(!repo.intro_seen(&content).await.unwrap());

        repo.mark_intro_seen(&content, fixed_now()).await.unwrap();
        repo.mark_intro_seen(&content, fixed_now() + Duration::days(1))
            .await
            .unwrap();
        assert!(repo.intro_seen(&content).await.unwrap());
        assert_eq!(
            repo.intro_seen_at(&content).await.unwrap(),
            Some(fixed_now())
        );

        repo.clear_intro(&content).await.unwrap();
        assert!(!repo.intro_seen(&content).await.unwrap());
        assert!(matches!(
            repo.clear_intro(&content).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn flags_are_per_content() {
        let storage = Storage::in_memory();
        let a = ContentId::new("a").unwrap();
        let b = ContentId::new("b").unwrap();
        storage.intros.mark_intro_seen(&a, fixed_now()).await.unwrap();
        assert!(storage.intros.intro_seen(&a).await.unwrap());
        assert!(!storage.intros.intro_seen(&b).await.unwrap());
    }
}
