use std::sync::Arc;

use study_core::model::Flashcard;
use study_core::session::{
    Action, AuthState, CardSetEditor, Effect, ReturnTo, StudyState, View, ViewError,
};
use tracing::{info, warn};

use crate::api::FlashcardApi;
use crate::error::{ApiError, CommitError};

/// What a commit attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Batches succeeded (or there was nothing to send) and the session was cleared.
    Committed {
        updated: usize,
        deleted: usize,
        effects: Vec<Effect>,
    },
    /// Auth is still resolving; nothing was sent or changed.
    Deferred,
}

/// Sends pending card edits to the backend as at most two concurrent batches.
#[derive(Clone)]
pub struct CommitService {
    api: Arc<dyn FlashcardApi>,
}

impl CommitService {
    #[must_use]
    pub fn new(api: Arc<dyn FlashcardApi>) -> Self {
        Self { api }
    }

    /// Commit the edit session of `state` against the fetched `snapshot`.
    ///
    /// The session is cleared and the view returns to display only when every
    /// issued batch succeeds. On any failure the session is left exactly as it
    /// was so the whole commit can be retried.
    ///
    /// # Errors
    ///
    /// Returns `CommitError` for invalid views, missing auth, local validation
    /// failures, or failed batches.
    pub async fn commit(
        &self,
        state: &mut StudyState,
        snapshot: &[Flashcard],
        auth: &AuthState,
    ) -> Result<CommitOutcome, CommitError> {
        if !matches!(state.view(), View::Manage | View::Edit) {
            return Err(CommitError::View(ViewError::InvalidTransition {
                from: state.view(),
                action: "commit",
            }));
        }
        match auth {
            AuthState::Resolving => return Ok(CommitOutcome::Deferred),
            AuthState::Anonymous => {
                return Err(CommitError::AuthRequired {
                    return_to: ReturnTo {
                        content_id: state.content_id().clone(),
                        view: state.view(),
                    },
                });
            }
            AuthState::Authenticated { .. } => {}
        }

        let plan = {
            let editor = CardSetEditor::new(snapshot, &mut state.edits);
            editor.validate().map_err(CommitError::Validation)?;
            editor.commit_plan()?
        };
        let content_id = state.content_id().clone();

        let updates = async {
            if plan.updates.is_empty() {
                None
            } else {
                Some(self.api.batch_update(&content_id, &plan.updates).await)
            }
        };
        let deletes = async {
            if plan.deletes.is_empty() {
                None
            } else {
                Some(self.api.batch_delete(&content_id, &plan.deletes).await)
            }
        };
        let (update, delete) = futures::join!(updates, deletes);

        let update = update.and_then(Result::err);
        let delete = delete.and_then(Result::err);
        if update.is_some() || delete.is_some() {
            warn!(
                content = %content_id,
                update_failed = update.is_some(),
                delete_failed = delete.is_some(),
                "commit failed; keeping pending changes"
            );
            if update.as_ref().is_some_and(ApiError::is_unauthorized)
                || delete.as_ref().is_some_and(ApiError::is_unauthorized)
            {
                return Err(CommitError::AuthRequired {
                    return_to: ReturnTo {
                        content_id,
                        view: state.view(),
                    },
                });
            }
            return Err(CommitError::Failed { update, delete });
        }

        let effects = state.apply(Action::Committed, auth)?;
        info!(
            content = %content_id,
            updated = plan.updates.len(),
            deleted = plan.deletes.len(),
            "committed card changes"
        );
        Ok(CommitOutcome::Committed {
            updated: plan.updates.len(),
            deleted: plan.deletes.len(),
            effects,
        })
    }

    /// Discard the edit session and go back to the fetched snapshot.
    ///
    /// Always succeeds, whatever happened to earlier commits.
    pub fn revert(&self, state: &mut StudyState, snapshot: &[Flashcard]) -> Vec<Effect> {
        CardSetEditor::new(snapshot, &mut state.edits).revert();
        info!(content = %state.content_id(), "reverted card changes");
        vec![Effect::ResetRenderedList]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Endpoint, InMemoryBackend};
    use study_core::model::{CardFields, CardPatch, ContentId, IdConvention};
    use study_core::session::StudyMode;
    use study_core::time::{fixed_clock, fixed_now};

    fn user() -> AuthState {
        AuthState::Authenticated {
            user_id: "u-1".into(),
        }
    }

    fn snapshot() -> Vec<Flashcard> {
        ["cfc-1", "cfc-2"]
            .iter()
            .enumerate()
            .map(|(idx, raw)| {
                Flashcard::new(
                    IdConvention::default().classify(*raw),
                    CardFields {
                        question: format!("Q {raw}"),
                        answer: format!("A {raw}"),
                        ..CardFields::blank(u32::try_from(idx).unwrap(), fixed_now())
                    },
                )
            })
            .collect()
    }

    fn managing() -> StudyState {
        let mut state =
            StudyState::open(ContentId::new("doc").unwrap(), StudyMode::FastReview, true);
        state.apply(Action::OpenManage, &user()).unwrap();
        state
    }

    #[tokio::test]
    async fn blank_question_blocks_commit_locally() {
        let backend = InMemoryBackend::new(fixed_clock());
        let service = CommitService::new(Arc::new(backend.clone()));
        let cards = snapshot();
        let mut state = managing();
        CardSetEditor::new(&cards, &mut state.edits)
            .update_card(&cards[0].id, CardPatch::question("  "))
            .unwrap();

        let err = service.commit(&mut state, &cards, &user()).await.unwrap_err();
        assert!(matches!(err, CommitError::Validation(ref errors) if errors.len() == 1));
        assert_eq!(backend.calls(Endpoint::BatchUpdate), 0);
        assert!(state.edits.has_changes());
    }

    #[tokio::test]
    async fn anonymous_and_resolving_users_send_nothing() {
        let backend = InMemoryBackend::new(fixed_clock());
        let service = CommitService::new(Arc::new(backend.clone()));
        let cards = snapshot();
        let mut state = managing();
        state.edits.mark_card_deleted(&cards[1].id);
        let before = state.clone();

        assert_eq!(
            service
                .commit(&mut state, &cards, &AuthState::Resolving)
                .await
                .unwrap(),
            CommitOutcome::Deferred
        );
        let err = service
            .commit(&mut state, &cards, &AuthState::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::AuthRequired { ref return_to } if return_to.view == View::Manage));
        assert_eq!(state, before);
        assert_eq!(backend.calls(Endpoint::BatchDelete), 0);
    }

    #[tokio::test]
    async fn only_needed_batches_are_issued() {
        let backend = InMemoryBackend::new(fixed_clock());
        let service = CommitService::new(Arc::new(backend.clone()));
        let cards = snapshot();
        backend
            .seed_cards(&ContentId::new("doc").unwrap(), cards.clone())
            .unwrap();
        let mut state = managing();
        state.edits.mark_card_deleted(&cards[1].id);

        let outcome = service.commit(&mut state, &cards, &user()).await.unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed { updated: 0, deleted: 1, .. }));
        assert_eq!(backend.calls(Endpoint::BatchUpdate), 0);
        assert_eq!(backend.calls(Endpoint::BatchDelete), 1);
        assert_eq!(state.view(), View::Display);
    }

    #[tokio::test]
    async fn rejected_session_maps_to_auth_required() {
        let backend = InMemoryBackend::new(fixed_clock());
        backend.fail_unauthorized(Endpoint::BatchUpdate);
        let service = CommitService::new(Arc::new(backend.clone()));
        let cards = snapshot();
        let mut state = managing();
        CardSetEditor::new(&cards, &mut state.edits)
            .update_card(&cards[0].id, CardPatch::starred(true))
            .unwrap();

        let err = service.commit(&mut state, &cards, &user()).await.unwrap_err();
        assert!(matches!(err, CommitError::AuthRequired { .. }));
        assert!(state.edits.has_changes());
        assert_eq!(state.view(), View::Manage);
    }

    #[test]
    fn revert_clears_and_resets_rendered_list() {
        let service = CommitService::new(Arc::new(InMemoryBackend::default()));
        let cards = snapshot();
        let mut state = managing();
        state.edits.mark_card_deleted(&cards[0].id);
        assert_eq!(
            service.revert(&mut state, &cards),
            vec![Effect::ResetRenderedList]
        );
        assert!(!state.edits.has_changes());
    }
}
