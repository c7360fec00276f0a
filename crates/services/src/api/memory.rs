use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Duration;
use reqwest::StatusCode;
use study_core::Clock;
use study_core::model::{
    ActiveRecallProgress, CardId, ContentId, ContentPreferences, Flashcard, IdConvention,
    KeyConcept, PersistedId, ReviewGrade, ReviewLogEntry,
};
use study_core::session::{CardFilter, CardUpdate, DisplayModifiers};
use url::Url;

use super::{FlashcardApi, UploadFile, UploadTarget};
use crate::error::ApiError;

/// Backend operations, used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    FetchFlashcards,
    FetchDueCards,
    FetchProgress,
    BatchUpdate,
    BatchDelete,
    Grade,
    FetchPreferences,
    UpdatePreferences,
    FetchKeyConcepts,
    FetchReviewLogs,
    UploadTarget,
    UploadBytes,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Unauthorized,
    Status(StatusCode),
}

impl Failure {
    fn to_error(self) -> ApiError {
        match self {
            Failure::Unauthorized => ApiError::Unauthorized,
            Failure::Status(status) => ApiError::HttpStatus(status),
        }
    }
}

#[derive(Default)]
struct ContentRecord {
    cards: Vec<Flashcard>,
    preferences: ContentPreferences,
    key_concepts: Vec<KeyConcept>,
    new_completed: u32,
    review_completed: u32,
}

#[derive(Default)]
struct BackendState {
    contents: HashMap<ContentId, ContentRecord>,
    logs: Vec<ReviewLogEntry>,
    failures: HashMap<Endpoint, Failure>,
    calls: HashMap<Endpoint, usize>,
    uploads: Vec<String>,
    next_card: u64,
}

impl BackendState {
    fn fresh_card_id(&mut self, convention: &IdConvention) -> CardId {
        loop {
            let raw = format!("cfc-{}", self.next_card);
            self.next_card += 1;
            let taken = self
                .contents
                .values()
                .any(|record| record.cards.iter().any(|card| card.id.as_str() == raw));
            if !taken {
                return convention.classify(raw);
            }
        }
    }

    fn content_of(&self, card_id: &PersistedId) -> Option<&ContentId> {
        self.contents.iter().find_map(|(content_id, record)| {
            record
                .cards
                .iter()
                .any(|card| card.id.persisted() == Some(card_id))
                .then_some(content_id)
        })
    }
}

/// In-process stand-in for the backend with per-endpoint failure injection.
///
/// Scheduling is a fixed step table; it only needs to move due dates forward.
#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
    convention: IdConvention,
    clock: Clock,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(Clock::default())
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                next_card: 1,
                ..BackendState::default()
            })),
            convention: IdConvention::default(),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BackendState>, ApiError> {
        self.state
            .lock()
            .map_err(|e| ApiError::Unavailable(e.to_string()))
    }

    /// Count the call and return the injected failure, if any.
    fn enter(&self, endpoint: Endpoint) -> Result<MutexGuard<'_, BackendState>, ApiError> {
        let mut state = self.lock()?;
        *state.calls.entry(endpoint).or_default() += 1;
        if let Some(failure) = state.failures.get(&endpoint) {
            return Err(failure.to_error());
        }
        Ok(state)
    }

    /// Replace the stored cards of a content item.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unavailable` if the state lock is poisoned.
    pub fn seed_cards(&self, content_id: &ContentId, cards: Vec<Flashcard>) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        state.contents.entry(content_id.clone()).or_default().cards = cards;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ApiError::Unavailable` if the state lock is poisoned.
    pub fn seed_key_concepts(
        &self,
        content_id: &ContentId,
        concepts: Vec<KeyConcept>,
    ) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        state.contents.entry(content_id.clone()).or_default().key_concepts = concepts;
        Ok(())
    }

    /// Make every call to `endpoint` fail with the given status until recovered.
    pub fn fail_with_status(&self, endpoint: Endpoint, status: StatusCode) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert(endpoint, Failure::Status(status));
        }
    }

    pub fn fail_unauthorized(&self, endpoint: Endpoint) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert(endpoint, Failure::Unauthorized);
        }
    }

    pub fn recover(&self, endpoint: Endpoint) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.remove(&endpoint);
        }
    }

    #[must_use]
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.state
            .lock()
            .map(|state| state.calls.get(&endpoint).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Stored cards of a content item in `idx` order.
    #[must_use]
    pub fn stored_cards(&self, content_id: &ContentId) -> Vec<Flashcard> {
        self.state
            .lock()
            .map(|state| {
                let mut cards = state
                    .contents
                    .get(content_id)
                    .map(|record| record.cards.clone())
                    .unwrap_or_default();
                cards.sort_by_key(Flashcard::idx);
                cards
            })
            .unwrap_or_default()
    }

    /// Upload steps in the order they reached the backend.
    #[must_use]
    pub fn upload_log(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.uploads.clone())
            .unwrap_or_default()
    }

    fn filtered(cards: &[Flashcard], filter: &CardFilter) -> Vec<Flashcard> {
        let modifiers = DisplayModifiers {
            is_shuffled: false,
            show_only_starred: filter.starred_only,
            selected_key_concepts: filter.key_concepts.iter().cloned().collect(),
        };
        let mut cards: Vec<Flashcard> = cards
            .iter()
            .filter(|card| modifiers.matches(card))
            .cloned()
            .collect();
        cards.sort_by_key(Flashcard::idx);
        cards
    }

    fn interval(preferences: &ContentPreferences, grade: ReviewGrade) -> Duration {
        let steps = preferences.learning_steps_secs();
        let first = steps.first().copied().unwrap_or(60);
        let last = steps.last().copied().unwrap_or(600);
        match grade {
            ReviewGrade::Again => Duration::seconds(i64::from(first)),
            ReviewGrade::Hard => Duration::seconds(i64::from(last)),
            ReviewGrade::Good => Duration::days(1),
            ReviewGrade::Easy => Duration::days(4),
        }
    }
}

#[async_trait]
impl FlashcardApi for InMemoryBackend {
    async fn fetch_flashcards(
        &self,
        content_id: &ContentId,
        filter: &CardFilter,
    ) -> Result<Vec<Flashcard>, ApiError> {
        let state = self.enter(Endpoint::FetchFlashcards)?;
        Ok(state
            .contents
            .get(content_id)
            .map(|record| Self::filtered(&record.cards, filter))
            .unwrap_or_default())
    }

    async fn fetch_due_cards(&self, content_id: &ContentId) -> Result<Vec<Flashcard>, ApiError> {
        let state = self.enter(Endpoint::FetchDueCards)?;
        let now = self.clock.now();
        let mut due: Vec<Flashcard> = state
            .contents
            .get(content_id)
            .map(|record| {
                record
                    .cards
                    .iter()
                    .filter(|card| card.fields.next_review_at.is_none_or(|at| at <= now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        due.sort_by_key(Flashcard::idx);
        Ok(due)
    }

    async fn fetch_progress(
        &self,
        content_id: &ContentId,
        filter: &CardFilter,
    ) -> Result<ActiveRecallProgress, ApiError> {
        let state = self.enter(Endpoint::FetchProgress)?;
        let Some(record) = state.contents.get(content_id) else {
            return Ok(ActiveRecallProgress::default());
        };
        let now = self.clock.now();
        let cards = Self::filtered(&record.cards, filter);
        let unseen = cards
            .iter()
            .filter(|card| card.fields.next_review_at.is_none())
            .count();
        let due = cards
            .iter()
            .filter(|card| card.fields.next_review_at.is_some_and(|at| at <= now))
            .count();
        let new_budget = record
            .preferences
            .daily_new_limit()
            .saturating_sub(record.new_completed);
        Ok(ActiveRecallProgress {
            new_pending: u32::try_from(unseen).unwrap_or(u32::MAX).min(new_budget),
            new_completed: record.new_completed,
            review_pending: u32::try_from(due).unwrap_or(u32::MAX),
            review_completed: record.review_completed,
        })
    }

    async fn batch_update(
        &self,
        content_id: &ContentId,
        updates: &[CardUpdate],
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Endpoint::BatchUpdate)?;
        let drafts = updates.iter().filter(|update| update.is_new()).count();
        let mut fresh: Vec<CardId> = (0..drafts)
            .map(|_| state.fresh_card_id(&self.convention))
            .collect();
        fresh.reverse();
        let record = state.contents.entry(content_id.clone()).or_default();
        let unknown = updates.iter().any(|update| match &update.id {
            CardId::Persisted(id) => !record.cards.iter().any(|card| card.id.persisted() == Some(id)),
            CardId::Draft(_) => false,
        });
        if unknown {
            return Err(ApiError::HttpStatus(StatusCode::NOT_FOUND));
        }
        for update in updates {
            match &update.id {
                CardId::Persisted(id) => {
                    if let Some(card) = record
                        .cards
                        .iter_mut()
                        .find(|card| card.id.persisted() == Some(id))
                    {
                        let next_review_at = card.fields.next_review_at;
                        card.fields = update.fields.clone();
                        card.fields.next_review_at = next_review_at;
                    }
                }
                CardId::Draft(_) => {
                    if let Some(id) = fresh.pop() {
                        let mut fields = update.fields.clone();
                        fields.next_review_at = None;
                        record.cards.push(Flashcard::new(id, fields));
                    }
                }
            }
        }
        Ok(())
    }

    async fn batch_delete(
        &self,
        content_id: &ContentId,
        ids: &[PersistedId],
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Endpoint::BatchDelete)?;
        if let Some(record) = state.contents.get_mut(content_id) {
            let doomed: HashSet<&PersistedId> = ids.iter().collect();
            record
                .cards
                .retain(|card| card.id.persisted().is_none_or(|id| !doomed.contains(id)));
        }
        Ok(())
    }

    async fn grade(&self, card_id: &PersistedId, grade: ReviewGrade) -> Result<(), ApiError> {
        let mut state = self.enter(Endpoint::Grade)?;
        let now = self.clock.now();
        let content_id = state
            .content_of(card_id)
            .cloned()
            .ok_or(ApiError::HttpStatus(StatusCode::NOT_FOUND))?;
        let seen_before = state.logs.iter().any(|log| &log.card_id == card_id);
        state.logs.push(ReviewLogEntry {
            card_id: card_id.clone(),
            grade,
            reviewed_at: now,
        });

        let Some(record) = state.contents.get_mut(&content_id) else {
            return Err(ApiError::HttpStatus(StatusCode::NOT_FOUND));
        };
        let interval = Self::interval(&record.preferences, grade);
        if let Some(card) = record
            .cards
            .iter_mut()
            .find(|card| card.id.persisted() == Some(card_id))
        {
            card.fields.next_review_at = Some(now + interval);
        }
        if seen_before {
            record.review_completed += 1;
        } else {
            record.new_completed += 1;
        }
        Ok(())
    }

    async fn fetch_preferences(
        &self,
        content_id: &ContentId,
    ) -> Result<ContentPreferences, ApiError> {
        let state = self.enter(Endpoint::FetchPreferences)?;
        Ok(state
            .contents
            .get(content_id)
            .map(|record| record.preferences.clone())
            .unwrap_or_default())
    }

    async fn update_preferences(
        &self,
        content_id: &ContentId,
        preferences: &ContentPreferences,
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Endpoint::UpdatePreferences)?;
        state
            .contents
            .entry(content_id.clone())
            .or_default()
            .preferences = preferences.clone();
        Ok(())
    }

    async fn fetch_key_concepts(&self, content_id: &ContentId) -> Result<Vec<KeyConcept>, ApiError> {
        let state = self.enter(Endpoint::FetchKeyConcepts)?;
        Ok(state
            .contents
            .get(content_id)
            .map(|record| record.key_concepts.clone())
            .unwrap_or_default())
    }

    async fn fetch_review_logs(&self, ids: &[PersistedId]) -> Result<Vec<ReviewLogEntry>, ApiError> {
        let state = self.enter(Endpoint::FetchReviewLogs)?;
        let wanted: HashSet<&PersistedId> = ids.iter().collect();
        Ok(state
            .logs
            .iter()
            .filter(|log| wanted.contains(&log.card_id))
            .cloned()
            .collect())
    }

    async fn request_upload_target(&self, file: &UploadFile) -> Result<UploadTarget, ApiError> {
        let mut state = self.enter(Endpoint::UploadTarget)?;
        let key = format!("uploads/{}/{}", state.uploads.len(), file.name);
        state.uploads.push(format!("target:{}", file.name));
        let upload_url = Url::parse("memory://uploads/")?.join(&key)?;
        Ok(UploadTarget { upload_url, key })
    }

    async fn upload_bytes(&self, target: &UploadTarget, file: &UploadFile) -> Result<(), ApiError> {
        let mut state = self.enter(Endpoint::UploadBytes)?;
        state.uploads.push(format!("bytes:{}", file.name));
        tracing::debug!(key = %target.key, bytes = file.bytes.len(), "stored upload");
        Ok(())
    }
}
