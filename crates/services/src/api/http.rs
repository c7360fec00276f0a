use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use study_core::model::{
    ActiveRecallProgress, ContentId, ContentPreferences, Flashcard, IdConvention, KeyConcept,
    PersistedId, ReviewGrade, ReviewLogEntry,
};
use study_core::session::{CardFilter, CardUpdate};
use url::Url;

use super::wire::{
    BatchUpdateRequest, CardUpdateDto, FlashcardDto, GradeRequest, IdListRequest, KeyConceptDto,
    PreferencesDto, ReviewLogDto, UploadTargetDto, UploadTargetRequest,
};
use super::{FlashcardApi, UploadFile, UploadTarget};
use crate::config::ClientConfig;
use crate::error::ApiError;

/// `FlashcardApi` over the backend's JSON REST endpoints.
#[derive(Clone)]
pub struct HttpFlashcardApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
    convention: IdConvention,
}

impl HttpFlashcardApi {
    #[must_use]
    pub fn new(base_url: Url, token: Option<String>, convention: IdConvention) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
            convention,
        }
    }

    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.api_base_url.clone(),
            config.api_token.clone(),
            config.id_convention.clone(),
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute endpoint URL; segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Unavailable(format!("{} is not a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn content_endpoint(
        &self,
        content_id: &ContentId,
        rest: &[&str],
    ) -> Result<Url, ApiError> {
        let mut segments = vec!["contents", content_id.as_str()];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn with_filter(mut url: Url, filter: &CardFilter) -> Url {
        {
            let mut query = url.query_pairs_mut();
            if filter.starred_only {
                query.append_pair("starred", "true");
            }
            if !filter.key_concepts.is_empty() {
                query.append_pair("key_concepts", &filter.key_concepts.join(","));
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorized(request).send().await?;
        check_status(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        tracing::debug!(%url, "GET");
        let response = self.send(self.client.get(url)).await?;
        decode(response).await
    }
}

fn check_status(response: Response) -> Result<Response, ApiError> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized),
        status if !status.is_success() => Err(ApiError::HttpStatus(status)),
        _ => Ok(response),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl FlashcardApi for HttpFlashcardApi {
    async fn fetch_flashcards(
        &self,
        content_id: &ContentId,
        filter: &CardFilter,
    ) -> Result<Vec<Flashcard>, ApiError> {
        let url = Self::with_filter(self.content_endpoint(content_id, &["flashcards"])?, filter);
        let cards: Vec<FlashcardDto> = self.get_json(url).await?;
        Ok(cards
            .into_iter()
            .map(|card| card.into_card(&self.convention))
            .collect())
    }

    async fn fetch_due_cards(&self, content_id: &ContentId) -> Result<Vec<Flashcard>, ApiError> {
        let url = self.content_endpoint(content_id, &["flashcards", "due"])?;
        let cards: Vec<FlashcardDto> = self.get_json(url).await?;
        Ok(cards
            .into_iter()
            .map(|card| card.into_card(&self.convention))
            .collect())
    }

    async fn fetch_progress(
        &self,
        content_id: &ContentId,
        filter: &CardFilter,
    ) -> Result<ActiveRecallProgress, ApiError> {
        let url = Self::with_filter(
            self.content_endpoint(content_id, &["active-recall", "progress"])?,
            filter,
        );
        self.get_json(url).await
    }

    async fn batch_update(
        &self,
        content_id: &ContentId,
        updates: &[CardUpdate],
    ) -> Result<(), ApiError> {
        let url = self.content_endpoint(content_id, &["flashcards", "batch-update"])?;
        let payload = BatchUpdateRequest {
            cards: updates.iter().map(CardUpdateDto::from).collect(),
        };
        tracing::debug!(%url, cards = payload.cards.len(), "POST batch update");
        self.send(self.client.post(url).json(&payload)).await?;
        Ok(())
    }

    async fn batch_delete(
        &self,
        content_id: &ContentId,
        ids: &[PersistedId],
    ) -> Result<(), ApiError> {
        let url = self.content_endpoint(content_id, &["flashcards", "batch-delete"])?;
        tracing::debug!(%url, cards = ids.len(), "POST batch delete");
        self.send(self.client.post(url).json(&IdListRequest::new(ids)))
            .await?;
        Ok(())
    }

    async fn grade(&self, card_id: &PersistedId, grade: ReviewGrade) -> Result<(), ApiError> {
        let url = self.endpoint(&["flashcards", "grade"])?;
        let payload = GradeRequest {
            flashcard_id: card_id.as_str(),
            rating: grade,
        };
        tracing::debug!(%url, card = %card_id, rating = grade.as_u8(), "POST grade");
        self.send(self.client.post(url).json(&payload)).await?;
        Ok(())
    }

    async fn fetch_preferences(
        &self,
        content_id: &ContentId,
    ) -> Result<ContentPreferences, ApiError> {
        let url = self.content_endpoint(content_id, &["preferences"])?;
        let dto: PreferencesDto = self.get_json(url).await?;
        ContentPreferences::try_from(dto)
    }

    async fn update_preferences(
        &self,
        content_id: &ContentId,
        preferences: &ContentPreferences,
    ) -> Result<(), ApiError> {
        let url = self.content_endpoint(content_id, &["preferences"])?;
        tracing::debug!(%url, "PUT preferences");
        self.send(self.client.put(url).json(&PreferencesDto::from(preferences)))
            .await?;
        Ok(())
    }

    async fn fetch_key_concepts(&self, content_id: &ContentId) -> Result<Vec<KeyConcept>, ApiError> {
        let url = self.content_endpoint(content_id, &["key-concepts"])?;
        let concepts: Vec<KeyConceptDto> = self.get_json(url).await?;
        Ok(concepts.into_iter().map(KeyConcept::from).collect())
    }

    async fn fetch_review_logs(&self, ids: &[PersistedId]) -> Result<Vec<ReviewLogEntry>, ApiError> {
        let url = self.endpoint(&["flashcards", "review-logs"])?;
        tracing::debug!(%url, cards = ids.len(), "POST review logs");
        let response = self
            .send(self.client.post(url).json(&IdListRequest::new(ids)))
            .await?;
        let logs: Vec<ReviewLogDto> = decode(response).await?;
        logs.into_iter()
            .map(|log| log.into_entry(&self.convention))
            .collect()
    }

    async fn request_upload_target(&self, file: &UploadFile) -> Result<UploadTarget, ApiError> {
        let url = self.endpoint(&["uploads"])?;
        tracing::debug!(%url, file = %file.name, "POST upload target");
        let response = self
            .send(self.client.post(url).json(&UploadTargetRequest::from(file)))
            .await?;
        let dto: UploadTargetDto = decode(response).await?;
        UploadTarget::try_from(dto)
    }

    async fn upload_bytes(&self, target: &UploadTarget, file: &UploadFile) -> Result<(), ApiError> {
        tracing::debug!(key = %target.key, bytes = file.bytes.len(), "PUT upload");
        // Pre-signed targets carry their own authorization.
        let response = self
            .client
            .put(target.upload_url.clone())
            .header(reqwest::header::CONTENT_TYPE, file.content_type.as_str())
            .body(file.bytes.clone())
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> HttpFlashcardApi {
        HttpFlashcardApi::new(
            Url::parse("https://api.example.com/v1/").unwrap(),
            None,
            IdConvention::default(),
        )
    }

    #[test]
    fn endpoints_keep_base_path_and_encode_ids() {
        let content = ContentId::new("lecture 7/a").unwrap();
        let url = api().content_endpoint(&content, &["flashcards"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/contents/lecture%207%2Fa/flashcards"
        );
    }

    #[test]
    fn filter_becomes_query_parameters() {
        let base = api().endpoint(&["x"]).unwrap();
        let plain = HttpFlashcardApi::with_filter(base.clone(), &CardFilter::default());
        assert_eq!(plain.query(), None);

        let filtered = HttpFlashcardApi::with_filter(
            base,
            &CardFilter {
                starred_only: true,
                key_concepts: vec!["kc-1".into(), "kc-2".into()],
            },
        );
        assert_eq!(filtered.query(), Some("starred=true&key_concepts=kc-1%2Ckc-2"));
    }
}
