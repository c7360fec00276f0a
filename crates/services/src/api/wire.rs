//! JSON shapes exchanged with the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use study_core::model::{
    CardFields, ContentPreferences, Flashcard, IdConvention, KeyConcept, KeyConceptRef,
    PersistedId, ReviewGrade, ReviewLogEntry, SourceLocator,
};
use study_core::session::CardUpdate;
use url::Url;

use super::{UploadFile, UploadTarget};
use crate::error::ApiError;

const DEFAULT_KEY_CONCEPT_COLLECTION: &str = "keyConcepts";

/// Either a page number or a media offset in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceDto {
    Page { page: u32 },
    Timestamp { timestamp: u64 },
}

impl From<SourceLocator> for SourceDto {
    fn from(value: SourceLocator) -> Self {
        match value {
            SourceLocator::Page(page) => SourceDto::Page { page },
            SourceLocator::Timestamp { millis } => SourceDto::Timestamp { timestamp: millis },
        }
    }
}

impl From<SourceDto> for SourceLocator {
    fn from(value: SourceDto) -> Self {
        match value {
            SourceDto::Page { page } => SourceLocator::Page(page),
            SourceDto::Timestamp { timestamp } => SourceLocator::Timestamp { millis: timestamp },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardDto {
    #[serde(rename = "_id")]
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub source: Option<SourceDto>,
    #[serde(default)]
    pub is_starred: bool,
    #[serde(default)]
    pub key_concept: Option<KeyConceptRef>,
    pub idx: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub next_review_at: Option<DateTime<Utc>>,
}

impl FlashcardDto {
    #[must_use]
    pub fn into_card(self, convention: &IdConvention) -> Flashcard {
        Flashcard::new(
            convention.classify(self.id),
            CardFields {
                question: self.question,
                answer: self.answer,
                hint: self.hint,
                explanation: self.explanation,
                source: self.source.map(SourceLocator::from),
                is_starred: self.is_starred,
                key_concept: self.key_concept,
                idx: self.idx,
                created_at: self.created_at,
                next_review_at: self.next_review_at,
            },
        )
    }
}

/// One entry of a batched update; `is_new` marks cards the backend must create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardUpdateDto {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub hint: Option<String>,
    pub explanation: Option<String>,
    pub source: Option<SourceDto>,
    pub key_concept: Option<KeyConceptRef>,
    pub is_starred: bool,
    pub idx: u32,
    pub is_new: bool,
}

impl From<&CardUpdate> for CardUpdateDto {
    fn from(update: &CardUpdate) -> Self {
        let fields = &update.fields;
        Self {
            id: update.id.as_str().to_string(),
            question: fields.question.clone(),
            answer: fields.answer.clone(),
            hint: fields.hint.clone(),
            explanation: fields.explanation.clone(),
            source: fields.source.map(SourceDto::from),
            key_concept: fields.key_concept.clone(),
            is_starred: fields.is_starred,
            idx: fields.idx,
            is_new: update.is_new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchUpdateRequest {
    pub cards: Vec<CardUpdateDto>,
}

#[derive(Debug, Serialize)]
pub struct IdListRequest<'a> {
    pub ids: Vec<&'a str>,
}

impl<'a> IdListRequest<'a> {
    #[must_use]
    pub fn new(ids: &'a [PersistedId]) -> Self {
        Self {
            ids: ids.iter().map(PersistedId::as_str).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest<'a> {
    pub flashcard_id: &'a str,
    pub rating: ReviewGrade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesDto {
    pub daily_new_limit: u32,
    /// Seconds between learning steps.
    pub learning_steps: Vec<u32>,
}

impl From<&ContentPreferences> for PreferencesDto {
    fn from(preferences: &ContentPreferences) -> Self {
        Self {
            daily_new_limit: preferences.daily_new_limit(),
            learning_steps: preferences.learning_steps_secs().to_vec(),
        }
    }
}

impl TryFrom<PreferencesDto> for ContentPreferences {
    type Error = ApiError;

    fn try_from(value: PreferencesDto) -> Result<Self, Self::Error> {
        ContentPreferences::new(value.daily_new_limit, value.learning_steps)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyConceptDto {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub collection: Option<String>,
    pub label: String,
    #[serde(default)]
    pub source: Option<SourceDto>,
}

impl From<KeyConceptDto> for KeyConcept {
    fn from(value: KeyConceptDto) -> Self {
        KeyConcept {
            id: value.id,
            collection: value
                .collection
                .unwrap_or_else(|| DEFAULT_KEY_CONCEPT_COLLECTION.to_string()),
            label: value.label,
            source: value.source.map(SourceLocator::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLogDto {
    pub flashcard_id: String,
    pub rating: u8,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewLogDto {
    /// # Errors
    ///
    /// Returns `ApiError::Decode` for draft ids or ratings outside 1..=4.
    pub fn into_entry(self, convention: &IdConvention) -> Result<ReviewLogEntry, ApiError> {
        let card_id = convention
            .persisted(self.flashcard_id)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let grade =
            ReviewGrade::from_u8(self.rating).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(ReviewLogEntry {
            card_id,
            grade,
            reviewed_at: self.reviewed_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct UploadTargetRequest<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub size: usize,
}

impl<'a> From<&'a UploadFile> for UploadTargetRequest<'a> {
    fn from(file: &'a UploadFile) -> Self {
        Self {
            file_name: &file.name,
            content_type: &file.content_type,
            size: file.bytes.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadTargetDto {
    pub upload_url: String,
    pub key: String,
}

impl TryFrom<UploadTargetDto> for UploadTarget {
    type Error = ApiError;

    fn try_from(value: UploadTargetDto) -> Result<Self, Self::Error> {
        Ok(UploadTarget {
            upload_url: Url::parse(&value.upload_url)?,
            key: value.key,
        })
    }
}
