use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::ids::PersistedId;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur during review operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("invalid review grade value: {0}")]
    InvalidGrade(u8),
}

//
// ─── REVIEW GRADE ─────────────────────────────────────────────────────────────
//

/// Four-level recall rating sent to the backend scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReviewGrade {
    /// Failed to recall the answer.
    Again,
    /// Recalled with significant difficulty.
    Hard,
    /// Recalled correctly with appropriate effort.
    Good,
    /// Recalled instantly.
    Easy,
}

impl ReviewGrade {
    pub const ALL: [ReviewGrade; 4] = [Self::Again, Self::Hard, Self::Good, Self::Easy];

    /// Converts a wire rating (1-4) to a `ReviewGrade`.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidGrade` if the value is not in the range 1-4.
    pub fn from_u8(value: u8) -> Result<Self, ReviewError> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            _ => Err(ReviewError::InvalidGrade(value)),
        }
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            ReviewGrade::Again => 1,
            ReviewGrade::Hard => 2,
            ReviewGrade::Good => 3,
            ReviewGrade::Easy => 4,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ReviewGrade::Again => "Again",
            ReviewGrade::Hard => "Hard",
            ReviewGrade::Good => "Good",
            ReviewGrade::Easy => "Easy",
        }
    }
}

impl TryFrom<u8> for ReviewGrade {
    type Error = ReviewError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value)
    }
}

impl From<ReviewGrade> for u8 {
    fn from(grade: ReviewGrade) -> Self {
        grade.as_u8()
    }
}

//
// ─── REVIEW LOG ───────────────────────────────────────────────────────────────
//

/// One rating event recorded by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewLogEntry {
    pub card_id: PersistedId,
    pub grade: ReviewGrade,
    pub reviewed_at: DateTime<Utc>,
}

/// Cards bucketed by their most recent rating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingBuckets {
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
    pub unrated: u32,
}

impl RatingBuckets {
    /// Aggregate logs for `card_ids`; cards without any log count as unrated.
    #[must_use]
    pub fn from_logs(card_ids: &[PersistedId], logs: &[ReviewLogEntry]) -> Self {
        let mut latest: BTreeMap<&PersistedId, &ReviewLogEntry> = BTreeMap::new();
        for log in logs {
            latest
                .entry(&log.card_id)
                .and_modify(|current| {
                    if log.reviewed_at > current.reviewed_at {
                        *current = log;
                    }
                })
                .or_insert(log);
        }

        let mut buckets = Self::default();
        for id in card_ids {
            match latest.get(id).map(|log| log.grade) {
                Some(ReviewGrade::Again) => buckets.again += 1,
                Some(ReviewGrade::Hard) => buckets.hard += 1,
                Some(ReviewGrade::Good) => buckets.good += 1,
                Some(ReviewGrade::Easy) => buckets.easy += 1,
                None => buckets.unrated += 1,
            }
        }
        buckets
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.again + self.hard + self.good + self.easy + self.unrated
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::IdConvention;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn numeric_grade_conversion_works() {
        assert_eq!(ReviewGrade::from_u8(1).unwrap(), ReviewGrade::Again);
        assert_eq!(ReviewGrade::from_u8(4).unwrap(), ReviewGrade::Easy);
        let err = ReviewGrade::from_u8(0).unwrap_err();
        assert!(matches!(err, ReviewError::InvalidGrade(0)));
    }

    #[test]
    fn grade_serializes_as_number() {
        assert_eq!(serde_json::to_string(&ReviewGrade::Good).unwrap(), "3");
        let parsed: ReviewGrade = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, ReviewGrade::Hard);
        assert!(serde_json::from_str::<ReviewGrade>("9").is_err());
    }

    #[test]
    fn buckets_use_latest_rating_per_card() {
        let convention = IdConvention::default();
        let a = convention.persisted("cfc-a").unwrap();
        let b = convention.persisted("cfc-b").unwrap();
        let c = convention.persisted("cfc-c").unwrap();
        let now = fixed_now();
        let logs = vec![
            ReviewLogEntry {
                card_id: a.clone(),
                grade: ReviewGrade::Again,
                reviewed_at: now - Duration::days(2),
            },
            ReviewLogEntry {
                card_id: a.clone(),
                grade: ReviewGrade::Easy,
                reviewed_at: now,
            },
            ReviewLogEntry {
                card_id: b.clone(),
                grade: ReviewGrade::Hard,
                reviewed_at: now,
            },
        ];

        let buckets = RatingBuckets::from_logs(&[a, b, c], &logs);
        assert_eq!(buckets.easy, 1);
        assert_eq!(buckets.hard, 1);
        assert_eq!(buckets.again, 0);
        assert_eq!(buckets.unrated, 1);
        assert_eq!(buckets.total(), 3);
    }
}
