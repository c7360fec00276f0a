//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use study_core::model::{CardValidationError, DraftId, PreferencesError};
use study_core::session::{EditError, ReturnTo, ViewError};

use crate::config::ConfigError;

/// Errors emitted by `FlashcardApi` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("not signed in or session expired")]
    Unauthorized,
    #[error("backend request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("could not decode backend response: {0}")]
    Decode(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Errors emitted by `CommitService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommitError {
    #[error("{} card(s) have missing fields", .0.len())]
    Validation(Vec<CardValidationError>),
    #[error("sign in required to save card changes")]
    AuthRequired { return_to: ReturnTo },
    /// At least one batch failed; pending edits are kept intact.
    #[error("saving card changes failed; nothing was cleared")]
    Failed {
        update: Option<ApiError>,
        delete: Option<ApiError>,
    },
    #[error(transparent)]
    View(#[from] ViewError),
    #[error(transparent)]
    Edit(#[from] EditError),
}

/// Errors emitted by `GradingService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GradeError {
    #[error("no card at position {0}")]
    NoCurrentCard(usize),
    #[error("card {0} has not been saved yet")]
    Unsaved(DraftId),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted by `PreferencesService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PreferencesServiceError {
    #[error(transparent)]
    Invalid(#[from] PreferencesError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors attributed to a single file of an upload batch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UploadError {
    #[error("file {0} is empty")]
    EmptyFile(String),
    #[error("could not obtain an upload target: {0}")]
    Target(#[source] ApiError),
    #[error("transfer failed: {0}")]
    Transfer(#[source] ApiError),
}

/// Errors emitted by `StudyController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StudyError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Grade(#[from] GradeError),
    #[error(transparent)]
    Preferences(#[from] PreferencesServiceError),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors emitted while bootstrapping the client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
