//! Study controller: wires the pure session state machine to the backend and
//! to client-local storage.
//!
//! A [`StudySession`] holds everything for one content item. The
//! [`StudyController`] owns the services and performs the effects that state
//! transitions ask for.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use storage::repository::{IntroRepository, Storage};
use study_core::Clock;
use study_core::debounce::{DebouncePolicy, Debouncer, Expiring};
use study_core::model::{
    ActiveRecallProgress, CardId, CardPatch, ContentId, DraftIdGenerator, Flashcard, KeyConcept,
    PersistedId, RatingBuckets, ReviewGrade, badge_label,
};
use study_core::session::{
    Action, AuthState, CardFilter, CardSetEditor, DisplayModifiers, EditError, Effect, ReturnTo,
    StudyMode, StudyState, active_recall_order, merge_cards, visible_cards,
};
use study_core::virtual_list::{Viewport, VirtualList};
use tracing::{debug, info};
use url::Url;

use crate::api::FlashcardApi;
use crate::commit::{CommitOutcome, CommitService};
use crate::config::ClientConfig;
use crate::error::StudyError;
use crate::grading::GradingService;
use crate::preferences::PreferencesService;

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Client state for one content item.
pub struct StudySession {
    pub state: StudyState,
    snapshot: Vec<Flashcard>,
    due: Vec<Flashcard>,
    deck: Vec<Flashcard>,
    key_concepts: Vec<KeyConcept>,
    progress: ActiveRecallProgress,
    drafts: DraftIdGenerator,
    pending_edits: Debouncer<CardId, CardPatch>,
    copied: Expiring<CardId>,
    copied_ttl: Duration,
    rng: StdRng,
}

impl StudySession {
    #[must_use]
    pub fn content_id(&self) -> &ContentId {
        self.state.content_id()
    }

    /// Last fetched cards, before pending edits.
    #[must_use]
    pub fn snapshot(&self) -> &[Flashcard] {
        &self.snapshot
    }

    /// Cards the display view walks through, in study order.
    #[must_use]
    pub fn deck(&self) -> &[Flashcard] {
        &self.deck
    }

    #[must_use]
    pub fn current_card(&self) -> Option<&Flashcard> {
        self.deck.get(self.state.index())
    }

    #[must_use]
    pub fn key_concepts(&self) -> &[KeyConcept] {
        &self.key_concepts
    }

    #[must_use]
    pub fn progress(&self) -> ActiveRecallProgress {
        self.progress
    }

    /// Badge text for a card's key concept.
    #[must_use]
    pub fn badge_for<'a>(&'a self, card: &Flashcard) -> Option<&'a str> {
        card.fields
            .key_concept
            .as_ref()
            .and_then(|reference| badge_label(&self.key_concepts, reference))
    }

    /// Manage-view operations on the snapshot and the pending edits.
    pub fn editor(&mut self) -> CardSetEditor<'_> {
        CardSetEditor::new(&self.snapshot, &mut self.state.edits)
    }

    /// Add a blank card below `anchor`.
    ///
    /// # Errors
    ///
    /// Returns `EditError::UnknownCard` if `anchor` is not rendered.
    pub fn insert_below(&mut self, anchor: &CardId, now: DateTime<Utc>) -> Result<CardId, EditError> {
        let mut editor = CardSetEditor::new(&self.snapshot, &mut self.state.edits);
        editor
            .insert_below(anchor, &mut self.drafts, now)
            .map(CardId::from)
    }

    /// Manage-view list: visible cards passing the display filters, reordered
    /// for active recall. Drafts stay listed so they can be filled in.
    #[must_use]
    pub fn manage_cards(&self) -> Vec<Flashcard> {
        let merged = merge_cards(&self.snapshot, &self.state.edits);
        let mut cards: Vec<Flashcard> = visible_cards(merged, &self.state.edits)
            .into_iter()
            .filter(|card| card.is_draft() || self.state.modifiers.matches(card))
            .collect();
        if self.state.mode() == StudyMode::ActiveRecall {
            active_recall_order(&mut cards, &self.state.modifiers);
        }
        cards
    }

    /// Only the manage cards intersecting `viewport`, with their positions.
    #[must_use]
    pub fn manage_window(&self, list: &VirtualList, viewport: Viewport) -> Vec<(usize, Flashcard)> {
        let cards = self.manage_cards();
        let range = list.window(cards.len(), viewport);
        cards
            .into_iter()
            .enumerate()
            .skip(range.start)
            .take(range.len())
            .collect()
    }

    /// Queue a field edit; it reaches the edit session once typing pauses.
    pub fn queue_edit(&mut self, id: CardId, patch: CardPatch, now: DateTime<Utc>) {
        self.pending_edits
            .push_merge(id, patch, now, |pending, newer| pending.merge(newer));
    }

    #[must_use]
    pub fn next_edit_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending_edits.next_deadline()
    }

    /// Apply queued edits that have been quiet long enough.
    ///
    /// # Errors
    ///
    /// Returns `EditError` if a queued card no longer exists; remaining edits
    /// are still applied.
    pub fn flush_due_edits(&mut self, now: DateTime<Utc>) -> Result<usize, EditError> {
        let due = self.pending_edits.flush_due(now);
        self.apply_edits(due)
    }

    /// Apply every queued edit immediately.
    ///
    /// # Errors
    ///
    /// Same as [`StudySession::flush_due_edits`].
    pub fn flush_all_edits(&mut self) -> Result<usize, EditError> {
        let all = self.pending_edits.flush_all();
        self.apply_edits(all)
    }

    fn apply_edits(&mut self, edits: Vec<(CardId, CardPatch)>) -> Result<usize, EditError> {
        let count = edits.len();
        let mut editor = CardSetEditor::new(&self.snapshot, &mut self.state.edits);
        let mut first_error = None;
        for (id, patch) in edits {
            if let Err(err) = editor.update_card(&id, patch) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    /// Show the "copied" marker on `id` for a short while.
    pub fn mark_copied(&mut self, id: CardId, now: DateTime<Utc>) {
        self.copied.set(id, now, self.copied_ttl);
    }

    #[must_use]
    pub fn is_copied(&self, id: &CardId, now: DateTime<Utc>) -> bool {
        self.copied.get(now) == Some(id)
    }

    fn persisted_ids(&self) -> Vec<PersistedId> {
        self.snapshot
            .iter()
            .filter_map(|card| card.id.persisted().cloned())
            .collect()
    }

    /// Fast review walks the rendered list; active recall walks the due cards.
    fn rebuild_deck(&mut self) {
        let deck = match self.state.mode() {
            StudyMode::FastReview => {
                visible_cards(merge_cards(&self.snapshot, &self.state.edits), &self.state.edits)
            }
            StudyMode::ActiveRecall => self.due.clone(),
        };
        self.deck = self.state.modifiers.apply(deck, &mut self.rng);
    }
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Backend-facing orchestration for the flashcard screens.
#[derive(Clone)]
pub struct StudyController {
    api: Arc<dyn FlashcardApi>,
    intros: Arc<dyn IntroRepository>,
    clock: Clock,
    commit: CommitService,
    grading: GradingService,
    preferences: PreferencesService,
    sign_in_base: Option<Url>,
    edit_debounce: DebouncePolicy,
    copied_ttl: Duration,
    shuffle_seed: Option<u64>,
}

impl StudyController {
    #[must_use]
    pub fn new(api: Arc<dyn FlashcardApi>, storage: &Storage, clock: Clock) -> Self {
        Self {
            commit: CommitService::new(Arc::clone(&api)),
            grading: GradingService::new(Arc::clone(&api)),
            preferences: PreferencesService::new(Arc::clone(&api)),
            api,
            intros: Arc::clone(&storage.intros),
            clock,
            sign_in_base: None,
            edit_debounce: DebouncePolicy::default(),
            copied_ttl: Duration::seconds(2),
            shuffle_seed: None,
        }
    }

    #[must_use]
    pub fn from_config(
        config: &ClientConfig,
        api: Arc<dyn FlashcardApi>,
        storage: &Storage,
        clock: Clock,
    ) -> Self {
        let mut controller = Self::new(api, storage, clock);
        controller.sign_in_base = Some(config.api_base_url.clone());
        controller.edit_debounce = config.edit_debounce;
        controller.copied_ttl = config.copied_flag_ttl;
        controller
    }

    /// Fix the shuffle order, for reproducible runs.
    #[must_use]
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_sign_in_base(mut self, base: Url) -> Self {
        self.sign_in_base = Some(base);
        self
    }

    #[must_use]
    pub fn preferences(&self) -> &PreferencesService {
        &self.preferences
    }

    /// Open a content item: initial view, cards, key concepts and progress.
    ///
    /// # Errors
    ///
    /// Returns `StudyError` if local storage or any fetch fails.
    pub async fn load(&self, content_id: ContentId, mode: StudyMode) -> Result<StudySession, StudyError> {
        let intro_seen = self.intros.intro_seen(&content_id).await?;
        let state = StudyState::open(content_id, mode, intro_seen);
        let rng = match self.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut session = StudySession {
            state,
            snapshot: Vec::new(),
            due: Vec::new(),
            deck: Vec::new(),
            key_concepts: Vec::new(),
            progress: ActiveRecallProgress::default(),
            drafts: DraftIdGenerator::new(),
            pending_edits: Debouncer::new(self.edit_debounce),
            copied: Expiring::default(),
            copied_ttl: self.copied_ttl,
            rng,
        };
        info!(content = %session.content_id(), ?mode, view = %session.state.view(), "opened content");
        self.refetch_all(&mut session).await?;
        Ok(session)
    }

    /// Apply an action and carry out the effects it requests.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::View` for blocked transitions; the session is
    /// unchanged in that case.
    pub async fn dispatch(
        &self,
        session: &mut StudySession,
        action: Action,
        auth: &AuthState,
    ) -> Result<(), StudyError> {
        let effects = session.state.apply(action, auth)?;
        self.run_effects(session, effects).await
    }

    /// Move to different material, dropping all per-content state.
    ///
    /// # Errors
    ///
    /// Returns `StudyError` if refetching fails; the reset itself always happens.
    pub async fn switch_content(
        &self,
        session: &mut StudySession,
        content_id: ContentId,
        auth: &AuthState,
    ) -> Result<(), StudyError> {
        info!(from = %session.content_id(), to = %content_id, "switching content");
        session.pending_edits.cancel_all();
        session.copied.clear();
        session.key_concepts.clear();
        session.snapshot.clear();
        session.due.clear();
        session.deck.clear();
        session.progress = ActiveRecallProgress::default();
        self.dispatch(session, Action::SwitchContent { content_id }, auth)
            .await?;
        session.key_concepts = self.api.fetch_key_concepts(session.content_id()).await?;
        Ok(())
    }

    /// Leave the active-recall intro and remember that it was seen.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::View` with `UnsavedChanges` while edits are pending.
    pub async fn start_studying(
        &self,
        session: &mut StudySession,
        auth: &AuthState,
    ) -> Result<(), StudyError> {
        self.dispatch(session, Action::StartStudying, auth).await
    }

    /// # Errors
    ///
    /// Returns `StudyError::View` with `AuthRequired` for anonymous users.
    pub async fn open_manage(
        &self,
        session: &mut StudySession,
        auth: &AuthState,
    ) -> Result<(), StudyError> {
        self.dispatch(session, Action::OpenManage, auth).await
    }

    /// Flush queued edits, then commit the edit session.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Commit` if validation, auth, or a batch fails.
    pub async fn commit(
        &self,
        session: &mut StudySession,
        auth: &AuthState,
    ) -> Result<CommitOutcome, StudyError> {
        if let Err(err) = session.flush_all_edits() {
            debug!(error = %err, "dropped queued edit for a card that is gone");
        }
        let outcome = self
            .commit
            .commit(&mut session.state, &session.snapshot, auth)
            .await?;
        if let CommitOutcome::Committed { effects, .. } = &outcome {
            self.run_effects(session, effects.clone()).await?;
        }
        Ok(outcome)
    }

    /// Discard pending edits and show the fetched cards again.
    ///
    /// # Errors
    ///
    /// Returns `StudyError` only if carrying out the reset fails.
    pub async fn revert(&self, session: &mut StudySession) -> Result<(), StudyError> {
        session.pending_edits.cancel_all();
        let effects = self.commit.revert(&mut session.state, &session.snapshot);
        self.run_effects(session, effects).await
    }

    /// Rate the current card.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Grade` if the rating cannot be submitted.
    pub async fn rate(
        &self,
        session: &mut StudySession,
        grade: ReviewGrade,
        auth: &AuthState,
    ) -> Result<(), StudyError> {
        let effects = self
            .grading
            .handle_rated(&mut session.state, &session.deck, grade, auth)
            .await?;
        self.run_effects(session, effects).await
    }

    /// Change filters. The deck is rebuilt locally and progress is refetched
    /// with the new filter; the fetched card set stays complete for editing.
    ///
    /// # Errors
    ///
    /// Returns `StudyError` if refetching progress fails.
    pub async fn update_modifiers(
        &self,
        session: &mut StudySession,
        change: impl FnOnce(&mut DisplayModifiers),
    ) -> Result<(), StudyError> {
        change(&mut session.state.modifiers);
        self.run_effects(
            session,
            vec![Effect::ResetRenderedList, Effect::RefetchProgress],
        )
        .await
    }

    /// # Errors
    ///
    /// Returns `StudyError::Api` if the fetch fails.
    pub async fn refresh_progress(&self, session: &mut StudySession) -> Result<(), StudyError> {
        let filter = session.state.modifiers.filter_query();
        session.progress = self.api.fetch_progress(session.content_id(), &filter).await?;
        Ok(())
    }

    /// Latest rating of every stored card in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Api` if the review logs cannot be fetched.
    pub async fn rating_buckets(&self, session: &StudySession) -> Result<RatingBuckets, StudyError> {
        let ids = session.persisted_ids();
        if ids.is_empty() {
            return Ok(RatingBuckets::default());
        }
        let logs = self.api.fetch_review_logs(&ids).await?;
        Ok(RatingBuckets::from_logs(&ids, &logs))
    }

    /// Validate and store preferences, then refresh progress.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Preferences` for invalid values or failed requests.
    pub async fn update_preferences(
        &self,
        session: &mut StudySession,
        daily_new_limit: u32,
        learning_steps_secs: Vec<u32>,
    ) -> Result<(), StudyError> {
        let filter = session.state.modifiers.filter_query();
        let (_, progress) = self
            .preferences
            .update(session.content_id(), daily_new_limit, learning_steps_secs, &filter)
            .await?;
        session.progress = progress;
        Ok(())
    }

    /// Sign-in page that sends the user back to `return_to` afterwards.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Url` if no sign-in base is configured or it cannot be joined.
    pub fn sign_in_redirect(&self, return_to: &ReturnTo) -> Result<Url, StudyError> {
        let base = self
            .sign_in_base
            .as_ref()
            .ok_or(StudyError::Url(url::ParseError::RelativeUrlWithoutBase))?;
        let mut url = base.join("sign-in")?;
        let target = format!(
            "/contents/{}?view={}",
            return_to.content_id,
            return_to.view.as_str()
        );
        url.query_pairs_mut().append_pair("return_to", &target);
        Ok(url)
    }

    /// Forget that the intro was shown for `content_id`.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Storage` if the flag cannot be cleared.
    pub async fn reset_intro(&self, content_id: &ContentId) -> Result<(), StudyError> {
        self.intros.clear_intro(content_id).await?;
        Ok(())
    }

    async fn refetch_all(&self, session: &mut StudySession) -> Result<(), StudyError> {
        session.key_concepts = self.api.fetch_key_concepts(session.content_id()).await?;
        self.run_effects(session, vec![Effect::RefetchCards, Effect::RefetchProgress])
            .await
    }

    /// Edits and `idx` renumbering need every card, so the snapshot is never
    /// filtered; display filters apply when the deck is built.
    async fn refetch_cards(&self, session: &mut StudySession) -> Result<(), StudyError> {
        let content_id = session.content_id().clone();
        let everything = CardFilter::default();
        let (all, due) = match session.state.mode() {
            StudyMode::FastReview => (
                self.api.fetch_flashcards(&content_id, &everything).await?,
                Vec::new(),
            ),
            StudyMode::ActiveRecall => futures::try_join!(
                self.api.fetch_flashcards(&content_id, &everything),
                self.api.fetch_due_cards(&content_id),
            )?,
        };
        debug!(content = %content_id, cards = all.len(), due = due.len(), "fetched cards");
        session.snapshot = all;
        session.due = due;
        session.rebuild_deck();
        Ok(())
    }

    async fn run_effects(
        &self,
        session: &mut StudySession,
        effects: Vec<Effect>,
    ) -> Result<(), StudyError> {
        for effect in effects {
            match effect {
                Effect::MarkIntroSeen(content_id) => {
                    self.intros
                        .mark_intro_seen(&content_id, self.clock.now())
                        .await?;
                }
                Effect::RefetchProgress => self.refresh_progress(session).await?,
                Effect::RefetchCards => self.refetch_cards(session).await?,
                Effect::ResetRenderedList => session.rebuild_deck(),
            }
        }
        Ok(())
    }
}
