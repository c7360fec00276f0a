#![forbid(unsafe_code)]

pub mod api;
pub mod commit;
pub mod config;
pub mod error;
pub mod grading;
pub mod preferences;
pub mod study;
pub mod upload;

pub use study_core::Clock;

pub use api::{FlashcardApi, HttpFlashcardApi, InMemoryBackend};
pub use commit::{CommitOutcome, CommitService};
pub use config::ClientConfig;
pub use error::{
    ApiError, ClientInitError, CommitError, GradeError, PreferencesServiceError, StudyError,
    UploadError,
};
pub use grading::GradingService;
pub use preferences::PreferencesService;
pub use study::{StudyController, StudySession};
pub use upload::{UploadOutcome, UploadService};
