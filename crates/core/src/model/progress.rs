use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ACTIVE RECALL PROGRESS ────────────────────────────────────────────────────
//

/// Aggregate counts reported by the backend for active-recall study.
///
/// Read-only on the client; refetched after grading or preference changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRecallProgress {
    pub new_pending: u32,
    pub new_completed: u32,
    pub review_pending: u32,
    pub review_completed: u32,
}

impl ActiveRecallProgress {
    #[must_use]
    pub fn pending(&self) -> u32 {
        self.new_pending + self.review_pending
    }

    #[must_use]
    pub fn completed(&self) -> u32 {
        self.new_completed + self.review_completed
    }

    #[must_use]
    pub fn is_done_for_today(&self) -> bool {
        self.pending() == 0
    }
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PreferencesError {
    #[error("daily new card limit must be between 1 and 9999")]
    InvalidDailyNewLimit,

    #[error("between 1 and 10 learning steps are required")]
    InvalidStepCount,

    #[error("learning steps must be > 0 seconds")]
    ZeroStep,

    #[error("learning steps must be strictly ascending")]
    StepsNotAscending,
}

//
// ─── PREFERENCES ───────────────────────────────────────────────────────────────
//

pub const MAX_DAILY_NEW_LIMIT: u32 = 9_999;
pub const MAX_LEARNING_STEPS: usize = 10;

/// Per-content study preferences stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPreferences {
    daily_new_limit: u32,
    learning_steps_secs: Vec<u32>,
}

impl Default for ContentPreferences {
    /// 20 new cards per day; relearn after 1 and 10 minutes.
    fn default() -> Self {
        Self {
            daily_new_limit: 20,
            learning_steps_secs: vec![60, 600],
        }
    }
}

impl ContentPreferences {
    /// Creates validated preferences.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesError` if the limit is out of range or the steps are
    /// empty, too many, zero, or not ascending.
    pub fn new(daily_new_limit: u32, learning_steps_secs: Vec<u32>) -> Result<Self, PreferencesError> {
        if daily_new_limit == 0 || daily_new_limit > MAX_DAILY_NEW_LIMIT {
            return Err(PreferencesError::InvalidDailyNewLimit);
        }
        if learning_steps_secs.is_empty() || learning_steps_secs.len() > MAX_LEARNING_STEPS {
            return Err(PreferencesError::InvalidStepCount);
        }
        if learning_steps_secs.contains(&0) {
            return Err(PreferencesError::ZeroStep);
        }
        if learning_steps_secs.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(PreferencesError::StepsNotAscending);
        }
        Ok(Self {
            daily_new_limit,
            learning_steps_secs,
        })
    }

    #[must_use]
    pub fn daily_new_limit(&self) -> u32 {
        self.daily_new_limit
    }

    #[must_use]
    pub fn learning_steps_secs(&self) -> &[u32] {
        &self.learning_steps_secs
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preferences_are_valid() {
        let defaults = ContentPreferences::default();
        let rebuilt = ContentPreferences::new(
            defaults.daily_new_limit(),
            defaults.learning_steps_secs().to_vec(),
        )
        .unwrap();
        assert_eq!(rebuilt, defaults);
    }

    #[test]
    fn rejects_bad_limits_and_steps() {
        assert_eq!(
            ContentPreferences::new(0, vec![60]),
            Err(PreferencesError::InvalidDailyNewLimit)
        );
        assert_eq!(
            ContentPreferences::new(10, vec![]),
            Err(PreferencesError::InvalidStepCount)
        );
        assert_eq!(
            ContentPreferences::new(10, vec![0, 60]),
            Err(PreferencesError::ZeroStep)
        );
        assert_eq!(
            ContentPreferences::new(10, vec![600, 60]),
            Err(PreferencesError::StepsNotAscending)
        );
    }

    #[test]
    fn progress_totals() {
        let progress = ActiveRecallProgress {
            new_pending: 3,
            new_completed: 2,
            review_pending: 0,
            review_completed: 5,
        };
        assert_eq!(progress.pending(), 3);
        assert_eq!(progress.completed(), 7);
        assert!(!progress.is_done_for_today());
    }
}
