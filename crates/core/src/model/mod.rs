mod card;
mod ids;
mod key_concept;
mod progress;
mod review;

pub use card::{
    CardFieldError, CardFields, CardPatch, CardValidationError, Flashcard, KeyConceptRef,
    SourceLocator,
};
pub use ids::{
    CardId, ContentId, DEFAULT_PERSISTED_PREFIX, DraftId, DraftIdGenerator, IdConvention, IdError,
    PersistedId,
};
pub use key_concept::{KeyConcept, badge_label};
pub use progress::{
    ActiveRecallProgress, ContentPreferences, MAX_DAILY_NEW_LIMIT, MAX_LEARNING_STEPS,
    PreferencesError,
};
pub use review::{RatingBuckets, ReviewError, ReviewGrade, ReviewLogEntry};
