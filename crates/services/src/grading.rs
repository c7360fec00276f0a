use std::sync::Arc;

use study_core::model::{CardId, Flashcard, ReviewGrade};
use study_core::session::{Action, AuthState, Effect, StudyState, View, ViewError};
use tracing::{debug, warn};

use crate::api::FlashcardApi;
use crate::error::GradeError;

/// Submits ratings for the current card and advances the session.
#[derive(Clone)]
pub struct GradingService {
    api: Arc<dyn FlashcardApi>,
}

impl GradingService {
    #[must_use]
    pub fn new(api: Arc<dyn FlashcardApi>) -> Self {
        Self { api }
    }

    /// Rate the card at the current index of `cards`.
    ///
    /// On success the session moves to the next card with a fresh face, or to
    /// the menu after the last card, and asks for a progress refetch. Due dates
    /// are never touched locally. On failure `state` is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `GradeError` if there is no gradable current card or the backend
    /// rejects the rating.
    pub async fn handle_rated(
        &self,
        state: &mut StudyState,
        cards: &[Flashcard],
        rating: ReviewGrade,
        auth: &AuthState,
    ) -> Result<Vec<Effect>, GradeError> {
        if state.view() != View::Display {
            return Err(GradeError::View(ViewError::InvalidTransition {
                from: state.view(),
                action: "rated",
            }));
        }
        let index = state.index();
        let card = cards.get(index).ok_or(GradeError::NoCurrentCard(index))?;
        let card_id = match &card.id {
            CardId::Persisted(id) => id,
            CardId::Draft(id) => return Err(GradeError::Unsaved(id.clone())),
        };

        if let Err(err) = self.api.grade(card_id, rating).await {
            warn!(card = %card_id, error = %err, "grading failed");
            return Err(err.into());
        }
        debug!(card = %card_id, rating = rating.label(), index, "graded card");

        Ok(state.apply(Action::Rated { total: cards.len() }, auth)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Endpoint, InMemoryBackend};
    use crate::error::ApiError;
    use reqwest::StatusCode;
    use study_core::model::{CardFields, ContentId, IdConvention};
    use study_core::session::{CardFace, StudyMode};
    use study_core::time::{fixed_clock, fixed_now};

    fn content() -> ContentId {
        ContentId::new("doc").unwrap()
    }

    fn cards(raw: &[&str]) -> Vec<Flashcard> {
        raw.iter()
            .enumerate()
            .map(|(idx, id)| {
                Flashcard::new(
                    IdConvention::default().classify(*id),
                    CardFields {
                        question: "Q".into(),
                        answer: "A".into(),
                        ..CardFields::blank(u32::try_from(idx).unwrap(), fixed_now())
                    },
                )
            })
            .collect()
    }

    fn setup(raw: &[&str]) -> (InMemoryBackend, GradingService, Vec<Flashcard>) {
        let backend = InMemoryBackend::new(fixed_clock());
        let cards = cards(raw);
        backend.seed_cards(&content(), cards.clone()).unwrap();
        let service = GradingService::new(Arc::new(backend.clone()));
        (backend, service, cards)
    }

    #[tokio::test]
    async fn rating_advances_and_resets_face() {
        let (_, service, cards) = setup(&["cfc-1", "cfc-2"]);
        let mut state = StudyState::open(content(), StudyMode::FastReview, true);
        state.apply(Action::Flip, &AuthState::Anonymous).unwrap();
        state.apply(Action::ToggleHint, &AuthState::Anonymous).unwrap();

        let effects = service
            .handle_rated(&mut state, &cards, ReviewGrade::Good, &AuthState::Anonymous)
            .await
            .unwrap();
        assert_eq!(effects, vec![Effect::RefetchProgress]);
        assert_eq!(state.index(), 1);
        assert_eq!(state.face(), CardFace::default());
        assert!(cards[1].fields.next_review_at.is_none());
    }

    #[tokio::test]
    async fn rating_the_last_card_opens_the_menu() {
        let (_, service, cards) = setup(&["cfc-1"]);
        let mut state = StudyState::open(content(), StudyMode::ActiveRecall, true);
        service
            .handle_rated(&mut state, &cards, ReviewGrade::Again, &AuthState::Anonymous)
            .await
            .unwrap();
        assert_eq!(state.view(), View::Menu);
    }

    #[tokio::test]
    async fn failed_rating_leaves_state_untouched() {
        let (backend, service, cards) = setup(&["cfc-1", "cfc-2"]);
        backend.fail_with_status(Endpoint::Grade, StatusCode::INTERNAL_SERVER_ERROR);
        let mut state = StudyState::open(content(), StudyMode::FastReview, true);
        let before = state.clone();

        let err = service
            .handle_rated(&mut state, &cards, ReviewGrade::Hard, &AuthState::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, GradeError::Api(ApiError::HttpStatus(_))));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn drafts_and_empty_lists_cannot_be_graded() {
        let (backend, service, _) = setup(&["cfc-1"]);
        let mut state = StudyState::open(content(), StudyMode::FastReview, true);

        let drafts = cards(&["1700000000000"]);
        assert!(matches!(
            service
                .handle_rated(&mut state, &drafts, ReviewGrade::Easy, &AuthState::Anonymous)
                .await,
            Err(GradeError::Unsaved(_))
        ));
        assert!(matches!(
            service
                .handle_rated(&mut state, &[], ReviewGrade::Easy, &AuthState::Anonymous)
                .await,
            Err(GradeError::NoCurrentCard(0))
        ));
        assert_eq!(backend.calls(Endpoint::Grade), 0);
    }
}
