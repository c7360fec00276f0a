use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::CardId;

//
// ─── SOURCE AND KEY CONCEPT REFERENCES ─────────────────────────────────────────
//

/// Where in the content a card came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SourceLocator {
    /// 1-based page number of a document.
    Page(u32),
    /// Offset into audio/video media.
    Timestamp { millis: u64 },
}

/// Link from a card to a key concept of the same content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyConceptRef {
    pub id: String,
    pub collection: String,
}

//
// ─── CARD TYPES ────────────────────────────────────────────────────────────────
//

/// Editable and display fields of a flashcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardFields {
    pub question: String,
    pub answer: String,
    pub hint: Option<String>,
    pub explanation: Option<String>,
    pub source: Option<SourceLocator>,
    pub is_starred: bool,
    pub key_concept: Option<KeyConceptRef>,
    pub idx: u32,
    pub created_at: DateTime<Utc>,
    /// Server-computed; the client never writes it.
    pub next_review_at: Option<DateTime<Utc>>,
}

impl CardFields {
    /// Blank fields for a card the user is about to write.
    #[must_use]
    pub fn blank(idx: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            question: String::new(),
            answer: String::new(),
            hint: None,
            explanation: None,
            source: None,
            is_starred: false,
            key_concept: None,
            idx,
            created_at,
            next_review_at: None,
        }
    }

    /// Check the fields the backend requires.
    ///
    /// # Errors
    ///
    /// Returns every failing field, so the caller can flag them all inline.
    pub fn validate(&self) -> Result<(), Vec<CardFieldError>> {
        let mut errors = Vec::new();
        if self.question.trim().is_empty() {
            errors.push(CardFieldError::EmptyQuestion);
        }
        if self.answer.trim().is_empty() {
            errors.push(CardFieldError::EmptyAnswer);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flashcard {
    pub id: CardId,
    pub fields: CardFields,
}

impl Flashcard {
    #[must_use]
    pub fn new(id: CardId, fields: CardFields) -> Self {
        Self { id, fields }
    }

    #[must_use]
    pub fn idx(&self) -> u32 {
        self.fields.idx
    }

    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.id.is_draft()
    }
}

//
// ─── PATCHES ───────────────────────────────────────────────────────────────────
//

/// Partial field overrides recorded for one card.
///
/// Nested options distinguish "leave alone" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardPatch {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub hint: Option<Option<String>>,
    pub explanation: Option<Option<String>>,
    pub source: Option<Option<SourceLocator>>,
    pub is_starred: Option<bool>,
    pub key_concept: Option<Option<KeyConceptRef>>,
    pub idx: Option<u32>,
}

impl CardPatch {
    #[must_use]
    pub fn idx(idx: u32) -> Self {
        Self {
            idx: Some(idx),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn question(text: impl Into<String>) -> Self {
        Self {
            question: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            answer: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn starred(is_starred: bool) -> Self {
        Self {
            is_starred: Some(is_starred),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layer `newer` on top of `self`; fields set in `newer` win.
    pub fn merge(&mut self, newer: CardPatch) {
        if newer.question.is_some() {
            self.question = newer.question;
        }
        if newer.answer.is_some() {
            self.answer = newer.answer;
        }
        if newer.hint.is_some() {
            self.hint = newer.hint;
        }
        if newer.explanation.is_some() {
            self.explanation = newer.explanation;
        }
        if newer.source.is_some() {
            self.source = newer.source;
        }
        if newer.is_starred.is_some() {
            self.is_starred = newer.is_starred;
        }
        if newer.key_concept.is_some() {
            self.key_concept = newer.key_concept;
        }
        if newer.idx.is_some() {
            self.idx = newer.idx;
        }
    }

    /// Shallow merge onto `base`; unset fields fall back to the original.
    #[must_use]
    pub fn apply(&self, base: &CardFields) -> CardFields {
        let mut out = base.clone();
        if let Some(question) = &self.question {
            out.question.clone_from(question);
        }
        if let Some(answer) = &self.answer {
            out.answer.clone_from(answer);
        }
        if let Some(hint) = &self.hint {
            out.hint.clone_from(hint);
        }
        if let Some(explanation) = &self.explanation {
            out.explanation.clone_from(explanation);
        }
        if let Some(source) = self.source {
            out.source = source;
        }
        if let Some(is_starred) = self.is_starred {
            out.is_starred = is_starred;
        }
        if let Some(key_concept) = &self.key_concept {
            out.key_concept.clone_from(key_concept);
        }
        if let Some(idx) = self.idx {
            out.idx = idx;
        }
        out
    }

    /// True when applying the patch would leave `original` unchanged.
    #[must_use]
    pub fn is_noop_for(&self, original: &CardFields) -> bool {
        self.apply(original) == *original
    }
}

//
// ─── VALIDATION ERRORS ─────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardFieldError {
    #[error("question cannot be empty")]
    EmptyQuestion,

    #[error("answer cannot be empty")]
    EmptyAnswer,
}

/// Validation failure for one card in a pending commit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("card {card_id} has invalid fields: {errors:?}")]
pub struct CardValidationError {
    pub card_id: CardId,
    pub errors: Vec<CardFieldError>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
