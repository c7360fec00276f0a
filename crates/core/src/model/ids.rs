use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of a content item (document, video, lecture) owning a card set.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Creates a new `ContentId`.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if the raw value is blank.
    pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(IdError::Empty { kind: "ContentId" });
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier assigned by the backend to a stored flashcard.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedId(String);

impl PersistedId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Locally generated identifier for a card that has not been saved yet.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(String);

impl DraftId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A card identifier, tagged by whether the backend already knows the card.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CardId {
    Persisted(PersistedId),
    Draft(DraftId),
}

impl CardId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            CardId::Persisted(id) => id.as_str(),
            CardId::Draft(id) => id.as_str(),
        }
    }

    #[must_use]
    pub fn is_draft(&self) -> bool {
        matches!(self, CardId::Draft(_))
    }

    #[must_use]
    pub fn persisted(&self) -> Option<&PersistedId> {
        match self {
            CardId::Persisted(id) => Some(id),
            CardId::Draft(_) => None,
        }
    }
}

impl From<PersistedId> for CardId {
    fn from(id: PersistedId) -> Self {
        CardId::Persisted(id)
    }
}

impl From<DraftId> for CardId {
    fn from(id: DraftId) -> Self {
        CardId::Draft(id)
    }
}

// ─── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    #[error("persisted id prefix cannot be empty")]
    EmptyPrefix,

    #[error("'{raw}' is not a persisted card id")]
    NotPersisted { raw: String },
}

// ─── Id Convention ─────────────────────────────────────────────────────────────

/// Decides which raw ids coming from the backend denote stored cards.
///
/// Everything that fails the predicate is treated as a draft.
#[derive(Clone, Debug)]
pub enum IdConvention {
    Prefix(String),
    Custom(fn(&str) -> bool),
}

/// Prefix used by the backend for stored flashcards.
pub const DEFAULT_PERSISTED_PREFIX: &str = "cfc-";

/// Custom predicates never compare equal; function addresses are not stable.
impl PartialEq for IdConvention {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (IdConvention::Prefix(a), IdConvention::Prefix(b)) => a == b,
            _ => false,
        }
    }
}

impl Default for IdConvention {
    fn default() -> Self {
        Self::Prefix(DEFAULT_PERSISTED_PREFIX.to_string())
    }
}

impl IdConvention {
    /// Builds a prefix-based convention.
    ///
    /// # Errors
    ///
    /// Returns `IdError::EmptyPrefix` since an empty prefix would classify every id as persisted.
    pub fn with_prefix(prefix: impl Into<String>) -> Result<Self, IdError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(IdError::EmptyPrefix);
        }
        Ok(Self::Prefix(prefix))
    }

    #[must_use]
    pub fn is_persisted(&self, raw: &str) -> bool {
        match self {
            IdConvention::Prefix(prefix) => raw.starts_with(prefix.as_str()),
            IdConvention::Custom(predicate) => predicate(raw),
        }
    }

    /// Tags a raw id according to the convention.
    #[must_use]
    pub fn classify(&self, raw: impl Into<String>) -> CardId {
        let raw = raw.into();
        if self.is_persisted(&raw) {
            CardId::Persisted(PersistedId(raw))
        } else {
            CardId::Draft(DraftId(raw))
        }
    }

    /// Parses an id that must be persisted.
    ///
    /// # Errors
    ///
    /// Returns `IdError::NotPersisted` if the id fails the predicate.
    pub fn persisted(&self, raw: impl Into<String>) -> Result<PersistedId, IdError> {
        match self.classify(raw) {
            CardId::Persisted(id) => Ok(id),
            CardId::Draft(id) => Err(IdError::NotPersisted { raw: id.0 }),
        }
    }
}

// ─── Draft Id Generation ───────────────────────────────────────────────────────

/// Produces draft ids from millisecond timestamps.
///
/// Ids are strictly increasing within one generator even when the clock stalls.
#[derive(Debug, Default, Clone)]
pub struct DraftIdGenerator {
    last: i64,
}

impl DraftIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, now: DateTime<Utc>) -> DraftId {
        let candidate = now.timestamp_millis().max(self.last + 1);
        self.last = candidate;
        DraftId(candidate.to_string())
    }
}

// ─── Debug / Display ───────────────────────────────────────────────────────────

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Debug for PersistedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersistedId({})", self.0)
    }
}

impl fmt::Debug for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DraftId({})", self.0)
    }
}

impl fmt::Debug for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardId::Persisted(id) => write!(f, "Persisted({})", id.0),
            CardId::Draft(id) => write!(f, "Draft({})", id.0),
        }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PersistedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentId::new(s)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn default_convention_uses_cfc_prefix() {
        let convention = IdConvention::default();
        assert!(matches!(convention.classify("cfc-1"), CardId::Persisted(_)));
        assert!(matches!(convention.classify("1699999999"), CardId::Draft(_)));
    }

    #[test]
    fn custom_predicate_is_honoured() {
        fn numeric(raw: &str) -> bool {
            raw.chars().all(|c| c.is_ascii_digit())
        }
        let convention = IdConvention::Custom(numeric);
        assert!(matches!(convention.classify("42"), CardId::Persisted(_)));
        assert!(convention.classify("cfc-1").is_draft());
    }

    #[test]
    fn conventions_compare_by_prefix_only() {
        fn any(_: &str) -> bool {
            true
        }
        assert_eq!(IdConvention::default(), IdConvention::with_prefix("cfc-").unwrap());
        assert_ne!(IdConvention::default(), IdConvention::with_prefix("card-").unwrap());
        assert_ne!(IdConvention::Custom(any), IdConvention::Custom(any));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert_eq!(IdConvention::with_prefix(""), Err(IdError::EmptyPrefix));
    }

    #[test]
    fn persisted_rejects_draft_ids() {
        let err = IdConvention::default().persisted("123").unwrap_err();
        assert!(matches!(err, IdError::NotPersisted { .. }));
    }

    #[test]
    fn draft_ids_are_unique_under_a_stalled_clock() {
        let mut generator = DraftIdGenerator::new();
        let a = generator.next(fixed_now());
        let b = generator.next(fixed_now());
        assert_ne!(a, b);
        assert!(!IdConvention::default().is_persisted(a.as_str()));
    }

    #[test]
    fn blank_content_id_is_rejected() {
        assert!(ContentId::new("  ").is_err());
        let id: ContentId = "doc-7".parse().unwrap();
        assert_eq!(id.to_string(), "doc-7");
    }
}
