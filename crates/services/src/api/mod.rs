//! Backend port consumed by the study client, plus its adapters.

use async_trait::async_trait;
use study_core::model::{
    ActiveRecallProgress, ContentId, ContentPreferences, Flashcard, KeyConcept, PersistedId,
    ReviewGrade, ReviewLogEntry,
};
use study_core::session::{CardFilter, CardUpdate};
use url::Url;

use crate::error::ApiError;

mod http;
mod memory;
pub mod wire;

pub use http::HttpFlashcardApi;
pub use memory::{Endpoint, InMemoryBackend};

/// A local file queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    #[must_use]
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Pre-authorized destination returned by the first upload step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub upload_url: Url,
    /// Storage key the backend uses to refer to the uploaded object.
    pub key: String,
}

/// Operations the flashcard screens need from the backend.
#[async_trait]
pub trait FlashcardApi: Send + Sync {
    /// # Errors
    ///
    /// Returns `ApiError` on transport, status, or decode failures.
    async fn fetch_flashcards(
        &self,
        content_id: &ContentId,
        filter: &CardFilter,
    ) -> Result<Vec<Flashcard>, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` on transport, status, or decode failures.
    async fn fetch_due_cards(&self, content_id: &ContentId) -> Result<Vec<Flashcard>, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` on transport, status, or decode failures.
    async fn fetch_progress(
        &self,
        content_id: &ContentId,
        filter: &CardFilter,
    ) -> Result<ActiveRecallProgress, ApiError>;

    /// Create or overwrite cards; entries with draft ids are created.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the batch is rejected.
    async fn batch_update(
        &self,
        content_id: &ContentId,
        updates: &[CardUpdate],
    ) -> Result<(), ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` if the batch is rejected.
    async fn batch_delete(
        &self,
        content_id: &ContentId,
        ids: &[PersistedId],
    ) -> Result<(), ApiError>;

    /// Record a rating; scheduling happens server-side.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the rating is rejected.
    async fn grade(&self, card_id: &PersistedId, grade: ReviewGrade) -> Result<(), ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` on transport, status, or decode failures.
    async fn fetch_preferences(
        &self,
        content_id: &ContentId,
    ) -> Result<ContentPreferences, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` if the update is rejected.
    async fn update_preferences(
        &self,
        content_id: &ContentId,
        preferences: &ContentPreferences,
    ) -> Result<(), ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` on transport, status, or decode failures.
    async fn fetch_key_concepts(&self, content_id: &ContentId) -> Result<Vec<KeyConcept>, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` on transport, status, or decode failures.
    async fn fetch_review_logs(&self, ids: &[PersistedId]) -> Result<Vec<ReviewLogEntry>, ApiError>;

    /// First upload step: ask the backend where to put the file.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if no target can be issued.
    async fn request_upload_target(&self, file: &UploadFile) -> Result<UploadTarget, ApiError>;

    /// Second upload step: transfer the bytes to the issued target.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the transfer fails.
    async fn upload_bytes(&self, target: &UploadTarget, file: &UploadFile) -> Result<(), ApiError>;
}
