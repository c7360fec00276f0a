use std::sync::Arc;

use study_core::model::{ActiveRecallProgress, ContentId, ContentPreferences};
use study_core::session::CardFilter;
use tracing::info;

use crate::api::FlashcardApi;
use crate::error::PreferencesServiceError;

/// Per-content study preferences and the progress counts they drive.
#[derive(Clone)]
pub struct PreferencesService {
    api: Arc<dyn FlashcardApi>,
}

impl PreferencesService {
    #[must_use]
    pub fn new(api: Arc<dyn FlashcardApi>) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Api` if the fetch fails.
    pub async fn load(
        &self,
        content_id: &ContentId,
    ) -> Result<ContentPreferences, PreferencesServiceError> {
        Ok(self.api.fetch_preferences(content_id).await?)
    }

    /// Validate and store new preferences, then refetch progress under `filter`.
    ///
    /// Invalid input is rejected before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Invalid` for out-of-range values or
    /// `PreferencesServiceError::Api` if either request fails.
    pub async fn update(
        &self,
        content_id: &ContentId,
        daily_new_limit: u32,
        learning_steps_secs: Vec<u32>,
        filter: &CardFilter,
    ) -> Result<(ContentPreferences, ActiveRecallProgress), PreferencesServiceError> {
        let preferences = ContentPreferences::new(daily_new_limit, learning_steps_secs)?;
        self.api.update_preferences(content_id, &preferences).await?;
        info!(
            content = %content_id,
            daily_new_limit,
            steps = preferences.learning_steps_secs().len(),
            "updated study preferences"
        );
        let progress = self.api.fetch_progress(content_id, filter).await?;
        Ok((preferences, progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Endpoint, InMemoryBackend};
    use study_core::model::PreferencesError;

    fn content() -> ContentId {
        ContentId::new("doc").unwrap()
    }

    #[tokio::test]
    async fn invalid_steps_are_rejected_locally() {
        let backend = InMemoryBackend::default();
        let service = PreferencesService::new(Arc::new(backend.clone()));
        let err = service
            .update(&content(), 20, vec![600, 60], &CardFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PreferencesServiceError::Invalid(PreferencesError::StepsNotAscending)
        ));
        assert_eq!(backend.calls(Endpoint::UpdatePreferences), 0);
    }

    #[tokio::test]
    async fn update_stores_and_refetches_progress() {
        let backend = InMemoryBackend::default();
        let service = PreferencesService::new(Arc::new(backend.clone()));
        let (stored, _) = service
            .update(&content(), 5, vec![30, 300, 3_600], &CardFilter::default())
            .await
            .unwrap();
        assert_eq!(service.load(&content()).await.unwrap(), stored);
        assert_eq!(backend.calls(Endpoint::FetchProgress), 1);
    }
}
