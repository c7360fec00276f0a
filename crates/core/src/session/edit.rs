use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    CardFields, CardId, CardPatch, CardValidationError, DraftId, DraftIdGenerator, Flashcard,
    PersistedId,
};

use super::merge::{merge_cards, visible_cards};

//
// ─── EDIT SESSION ──────────────────────────────────────────────────────────────
//

/// Uncommitted local changes to one card set.
///
/// Stored cards carry partial overrides; drafts carry their full fields since the
/// backend has never seen them. Deletion of stored cards is a soft mark so it can
/// be restored before commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSession {
    edited_cards: BTreeMap<PersistedId, CardPatch>,
    new_cards: BTreeMap<DraftId, CardFields>,
    deleted_card_ids: BTreeSet<PersistedId>,
}

impl EditSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn edited_cards(&self) -> &BTreeMap<PersistedId, CardPatch> {
        &self.edited_cards
    }

    #[must_use]
    pub fn new_cards(&self) -> &BTreeMap<DraftId, CardFields> {
        &self.new_cards
    }

    #[must_use]
    pub fn deleted_card_ids(&self) -> &BTreeSet<PersistedId> {
        &self.deleted_card_ids
    }

    #[must_use]
    pub fn patch_for(&self, id: &PersistedId) -> Option<&CardPatch> {
        self.edited_cards.get(id)
    }

    /// Merge `patch` into the pending edit for `id`.
    ///
    /// For stored cards the entry is dropped again when the accumulated patch
    /// matches `original`. Returns `false` for drafts that were never inserted.
    pub fn update_card(
        &mut self,
        id: &CardId,
        patch: CardPatch,
        original: Option<&CardFields>,
    ) -> bool {
        match id {
            CardId::Persisted(id) => {
                let entry = self.edited_cards.entry(id.clone()).or_default();
                entry.merge(patch);
                let prune = match original {
                    Some(original) => entry.is_noop_for(original),
                    None => entry.is_empty(),
                };
                if prune {
                    self.edited_cards.remove(id);
                }
                true
            }
            CardId::Draft(id) => match self.new_cards.get_mut(id) {
                Some(fields) => {
                    *fields = patch.apply(fields);
                    true
                }
                None => false,
            },
        }
    }

    pub fn insert_draft(&mut self, id: DraftId, fields: CardFields) {
        self.new_cards.insert(id, fields);
    }

    pub fn remove_draft(&mut self, id: &DraftId) -> Option<CardFields> {
        self.new_cards.remove(id)
    }

    /// Soft-delete a stored card. Drafts are ignored; returns whether the set changed.
    pub fn mark_card_deleted(&mut self, id: &CardId) -> bool {
        match id {
            CardId::Persisted(id) => self.deleted_card_ids.insert(id.clone()),
            CardId::Draft(_) => false,
        }
    }

    pub fn restore_card(&mut self, id: &CardId) -> bool {
        match id {
            CardId::Persisted(id) => self.deleted_card_ids.remove(id),
            CardId::Draft(_) => false,
        }
    }

    #[must_use]
    pub fn is_deleted(&self, id: &CardId) -> bool {
        id.persisted()
            .is_some_and(|id| self.deleted_card_ids.contains(id))
    }

    pub fn clear(&mut self) {
        self.edited_cards.clear();
        self.new_cards.clear();
        self.deleted_card_ids.clear();
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.edited_cards.is_empty()
            || !self.new_cards.is_empty()
            || !self.deleted_card_ids.is_empty()
    }
}

//
// ─── COMMIT PLAN ───────────────────────────────────────────────────────────────
//

/// Full field set for one card in a batched update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardUpdate {
    pub id: CardId,
    pub fields: CardFields,
}

impl CardUpdate {
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id.is_draft()
    }
}

/// The requests a commit has to issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPlan {
    pub updates: Vec<CardUpdate>,
    pub deletes: Vec<PersistedId>,
}

impl CommitPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty()
    }
}

//
// ─── EDITOR ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EditError {
    #[error("card {0} is not part of this card set")]
    UnknownCard(CardId),

    #[error("position {position} is out of range for {len} cards")]
    OutOfRange { position: usize, len: usize },

    #[error("card {0} has pending changes but is missing from the fetched cards")]
    StaleEdit(PersistedId),
}

/// Manage-view operations over a fetched snapshot and its edit session.
pub struct CardSetEditor<'a> {
    snapshot: &'a [Flashcard],
    session: &'a mut EditSession,
}

impl<'a> CardSetEditor<'a> {
    #[must_use]
    pub fn new(snapshot: &'a [Flashcard], session: &'a mut EditSession) -> Self {
        Self { snapshot, session }
    }

    /// Every card including soft-deleted ones, ordered by `idx`.
    #[must_use]
    pub fn rendered(&self) -> Vec<Flashcard> {
        merge_cards(self.snapshot, self.session)
    }

    #[must_use]
    pub fn visible(&self) -> Vec<Flashcard> {
        visible_cards(self.rendered(), self.session)
    }

    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.session.has_changes()
    }

    fn original(&self, id: &CardId) -> Option<&'a CardFields> {
        self.snapshot
            .iter()
            .find(|card| card.id == *id)
            .map(|card| &card.fields)
    }

    /// Apply a field change, pruning it if it restores the fetched values.
    pub fn update_card(&mut self, id: &CardId, patch: CardPatch) -> Result<(), EditError> {
        let original = self.original(id);
        if original.is_none() && !id.is_draft() {
            return Err(EditError::UnknownCard(id.clone()));
        }
        if self.session.update_card(id, patch, original) {
            Ok(())
        } else {
            Err(EditError::UnknownCard(id.clone()))
        }
    }

    /// Insert a blank draft directly below `anchor`, shifting later cards down.
    pub fn insert_below(
        &mut self,
        anchor: &CardId,
        ids: &mut DraftIdGenerator,
        now: DateTime<Utc>,
    ) -> Result<DraftId, EditError> {
        let rendered = self.rendered();
        let anchor_idx = rendered
            .iter()
            .find(|card| card.id == *anchor)
            .map(Flashcard::idx)
            .ok_or_else(|| EditError::UnknownCard(anchor.clone()))?;
        Ok(self.insert_at(&rendered, anchor_idx + 1, ids, now))
    }

    /// Add a blank draft after the last card.
    pub fn append(&mut self, ids: &mut DraftIdGenerator, now: DateTime<Utc>) -> DraftId {
        let rendered = self.rendered();
        let next_idx = rendered.iter().map(|card| card.idx() + 1).max().unwrap_or(0);
        self.insert_at(&rendered, next_idx, ids, now)
    }

    fn insert_at(
        &mut self,
        rendered: &[Flashcard],
        idx: u32,
        ids: &mut DraftIdGenerator,
        now: DateTime<Utc>,
    ) -> DraftId {
        for card in rendered.iter().filter(|card| card.idx() >= idx) {
            let original = self.original(&card.id);
            self.session
                .update_card(&card.id, CardPatch::idx(card.idx() + 1), original);
        }
        let id = ids.next(now);
        self.session
            .insert_draft(id.clone(), CardFields::blank(idx, now));
        id
    }

    /// Remove a card: drafts are spliced out, stored cards are marked deleted.
    pub fn delete_card(&mut self, id: &CardId) -> Result<(), EditError> {
        match id {
            CardId::Draft(draft) => {
                let removed = self
                    .session
                    .remove_draft(draft)
                    .ok_or_else(|| EditError::UnknownCard(id.clone()))?;
                for card in self.rendered().iter().filter(|c| c.idx() > removed.idx) {
                    let original = self.original(&card.id);
                    self.session
                        .update_card(&card.id, CardPatch::idx(card.idx() - 1), original);
                }
                Ok(())
            }
            CardId::Persisted(_) => {
                if self.original(id).is_none() {
                    return Err(EditError::UnknownCard(id.clone()));
                }
                self.session.mark_card_deleted(id);
                Ok(())
            }
        }
    }

    pub fn restore_card(&mut self, id: &CardId) -> bool {
        self.session.restore_card(id)
    }

    /// Move the card at rendered position `from` to `to` and renumber the list.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), EditError> {
        let mut rendered = self.rendered();
        let len = rendered.len();
        for position in [from, to] {
            if position >= len {
                return Err(EditError::OutOfRange { position, len });
            }
        }
        let moved = rendered.remove(from);
        rendered.insert(to, moved);

        for (position, card) in rendered.iter().enumerate() {
            let idx = u32::try_from(position).unwrap_or(u32::MAX);
            if card.idx() != idx {
                let original = self.original(&card.id);
                self.session
                    .update_card(&card.id, CardPatch::idx(idx), original);
            }
        }
        Ok(())
    }

    /// Drop every pending change; the rendered list falls back to the snapshot.
    pub fn revert(&mut self) {
        self.session.clear();
    }

    /// Check the cards a commit would send.
    ///
    /// # Errors
    ///
    /// Returns one entry per card with blank required fields.
    pub fn validate(&self) -> Result<(), Vec<CardValidationError>> {
        let errors: Vec<CardValidationError> = self
            .pending_updates()
            .into_iter()
            .filter_map(|update| {
                update
                    .fields
                    .validate()
                    .err()
                    .map(|errors| CardValidationError {
                        card_id: update.id,
                        errors,
                    })
            })
            .collect();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn pending_updates(&self) -> Vec<CardUpdate> {
        self.rendered()
            .into_iter()
            .filter(|card| !self.session.is_deleted(&card.id))
            .filter(|card| match &card.id {
                CardId::Persisted(id) => self.session.patch_for(id).is_some(),
                CardId::Draft(_) => true,
            })
            .map(|card| CardUpdate {
                id: card.id,
                fields: card.fields,
            })
            .collect()
    }

    /// Batches to send: merged fields for edited or new cards, ids for deletions.
    ///
    /// # Errors
    ///
    /// Returns `EditError::StaleEdit` when an edit or deletion targets a card the
    /// snapshot does not hold, since it could not be sent.
    pub fn commit_plan(&self) -> Result<CommitPlan, EditError> {
        let stale = self
            .session
            .edited_cards()
            .keys()
            .chain(self.session.deleted_card_ids())
            .find(|&id| !self.snapshot.iter().any(|card| card.id.persisted() == Some(id)));
        if let Some(id) = stale {
            return Err(EditError::StaleEdit(id.clone()));
        }
        Ok(CommitPlan {
            updates: self.pending_updates(),
            deletes: self.session.deleted_card_ids().iter().cloned().collect(),
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IdConvention;
    use crate::time::fixed_now;

    fn card(raw: &str, idx: u32) -> Flashcard {
        Flashcard::new(
            IdConvention::default().classify(raw),
            CardFields {
                question: format!("Q {raw}"),
                answer: format!("A {raw}"),
                ..CardFields::blank(idx, fixed_now())
            },
        )
    }

    fn id(raw: &str) -> CardId {
        IdConvention::default().classify(raw)
    }

    fn idx_pairs(cards: &[Flashcard]) -> Vec<(String, u32)> {
        cards.iter().map(|c| (c.id.to_string(), c.idx())).collect()
    }

    #[test]
    fn noop_edit_is_pruned() {
        let snapshot = vec![card("cfc-1", 0)];
        let mut session = EditSession::new();
        let mut editor = CardSetEditor::new(&snapshot, &mut session);

        editor
            .update_card(&id("cfc-1"), CardPatch::question("Q cfc-1"))
            .unwrap();
        assert!(!editor.has_unsaved_changes());

        editor
            .update_card(&id("cfc-1"), CardPatch::question("changed"))
            .unwrap();
        assert!(editor.has_unsaved_changes());
        editor
            .update_card(&id("cfc-1"), CardPatch::question("Q cfc-1"))
            .unwrap();
        assert!(!editor.has_unsaved_changes());
    }

    #[test]
    fn marking_deleted_twice_is_idempotent() {
        let mut session = EditSession::new();
        assert!(session.mark_card_deleted(&id("cfc-2")));
        assert!(!session.mark_card_deleted(&id("cfc-2")));
        assert_eq!(session.deleted_card_ids().len(), 1);
    }

    #[test]
    fn drafts_are_never_soft_deleted() {
        let mut session = EditSession::new();
        assert!(!session.mark_card_deleted(&id("1699999999")));
        assert!(!session.has_changes());
    }

    #[test]
    fn restore_keeps_prior_edits() {
        let snapshot = vec![card("cfc-1", 0), card("cfc-2", 1)];
        let mut session = EditSession::new();
        let mut editor = CardSetEditor::new(&snapshot, &mut session);
        editor
            .update_card(&id("cfc-2"), CardPatch::answer("edited"))
            .unwrap();
        editor.delete_card(&id("cfc-2")).unwrap();
        assert_eq!(editor.visible().len(), 1);

        assert!(editor.restore_card(&id("cfc-2")));
        let visible = editor.visible();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[1].fields.answer, "edited");
    }

    #[test]
    fn deleting_new_card_closes_the_gap() {
        let snapshot = vec![card("cfc-1", 0), card("cfc-3", 1)];
        let mut session = EditSession::new();
        let mut ids = DraftIdGenerator::new();
        let mut editor = CardSetEditor::new(&snapshot, &mut session);

        let draft = editor
            .insert_below(&id("cfc-1"), &mut ids, fixed_now())
            .unwrap();
        let rendered = editor.rendered();
        assert_eq!(
            idx_pairs(&rendered),
            vec![
                ("cfc-1".to_string(), 0),
                (draft.to_string(), 1),
                ("cfc-3".to_string(), 2)
            ]
        );

        editor.delete_card(&CardId::Draft(draft)).unwrap();
        assert_eq!(
            idx_pairs(&editor.rendered()),
            vec![("cfc-1".to_string(), 0), ("cfc-3".to_string(), 1)]
        );
        assert!(!editor.has_unsaved_changes());
    }

    #[test]
    fn indices_stay_contiguous_across_inserts_and_deletes() {
        let snapshot: Vec<_> = (0..5).map(|i| card(&format!("cfc-{i}"), i)).collect();
        let mut session = EditSession::new();
        let mut ids = DraftIdGenerator::new();
        let mut clock = crate::time::fixed_clock();
        let mut editor = CardSetEditor::new(&snapshot, &mut session);

        let mut drafts = Vec::new();
        for anchor in ["cfc-0", "cfc-2", "cfc-4", "cfc-0"] {
            clock.advance(chrono::Duration::milliseconds(1));
            drafts.push(editor.insert_below(&id(anchor), &mut ids, clock.now()).unwrap());
        }
        editor.append(&mut ids, clock.now());
        editor.delete_card(&CardId::Draft(drafts[1].clone())).unwrap();
        editor.delete_card(&CardId::Draft(drafts[3].clone())).unwrap();

        let rendered = editor.rendered();
        let indices: Vec<u32> = rendered.iter().map(Flashcard::idx).collect();
        let expected: Vec<u32> = (0..u32::try_from(rendered.len()).unwrap()).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn reorder_renumbers_moved_cards() {
        let snapshot: Vec<_> = (0..3).map(|i| card(&format!("cfc-{i}"), i)).collect();
        let mut session = EditSession::new();
        let mut editor = CardSetEditor::new(&snapshot, &mut session);

        editor.reorder(2, 0).unwrap();
        assert_eq!(
            idx_pairs(&editor.rendered()),
            vec![
                ("cfc-2".to_string(), 0),
                ("cfc-0".to_string(), 1),
                ("cfc-1".to_string(), 2)
            ]
        );
        assert_eq!(session.edited_cards().len(), 3);

        let mut editor = CardSetEditor::new(&snapshot, &mut session);
        editor.reorder(0, 2).unwrap();
        assert!(!editor.has_unsaved_changes());
        assert!(matches!(
            editor.reorder(0, 7),
            Err(EditError::OutOfRange { position: 7, len: 3 })
        ));
    }

    #[test]
    fn commit_plan_flags_new_cards_and_skips_deleted() {
        let snapshot = vec![card("cfc-1", 0), card("cfc-2", 1)];
        let mut session = EditSession::new();
        let mut ids = DraftIdGenerator::new();
        let mut editor = CardSetEditor::new(&snapshot, &mut session);

        editor
            .update_card(&id("cfc-1"), CardPatch::question("new Q"))
            .unwrap();
        editor
            .update_card(&id("cfc-2"), CardPatch::starred(true))
            .unwrap();
        editor.delete_card(&id("cfc-2")).unwrap();
        let draft = editor.append(&mut ids, fixed_now());
        editor
            .update_card(
                &CardId::Draft(draft.clone()),
                CardPatch {
                    question: Some("Draft Q".into()),
                    answer: Some("Draft A".into()),
                    ..CardPatch::default()
                },
            )
            .unwrap();

        let plan = editor.commit_plan().unwrap();
        assert_eq!(plan.updates.len(), 2);
        assert_eq!(plan.updates[0].fields.question, "new Q");
        assert!(!plan.updates[0].is_new());
        assert!(plan.updates[1].is_new());
        assert_eq!(plan.updates[1].id, CardId::Draft(draft));
        assert_eq!(plan.deletes.len(), 1);
        assert!(editor.validate().is_ok());
    }

    #[test]
    fn validation_blocks_blank_drafts() {
        let snapshot = vec![card("cfc-1", 0)];
        let mut session = EditSession::new();
        let mut ids = DraftIdGenerator::new();
        let mut editor = CardSetEditor::new(&snapshot, &mut session);
        let draft = editor.append(&mut ids, fixed_now());

        let errors = editor.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].card_id, CardId::Draft(draft));
    }

    #[test]
    fn revert_discards_everything() {
        let snapshot = vec![card("cfc-1", 0)];
        let mut session = EditSession::new();
        let mut ids = DraftIdGenerator::new();
        let mut editor = CardSetEditor::new(&snapshot, &mut session);
        editor.append(&mut ids, fixed_now());
        editor.delete_card(&id("cfc-1")).unwrap();

        editor.revert();
        assert_eq!(editor.rendered(), snapshot);
        assert!(!session.has_changes());
    }

    #[test]
    fn unknown_cards_are_rejected() {
        let snapshot = vec![card("cfc-1", 0)];
        let mut session = EditSession::new();
        let mut editor = CardSetEditor::new(&snapshot, &mut session);
        assert!(matches!(
            editor.update_card(&id("cfc-9"), CardPatch::starred(true)),
            Err(EditError::UnknownCard(_))
        ));
        assert!(editor.delete_card(&id("123")).is_err());
    }

    #[test]
    fn changes_to_cards_outside_the_snapshot_block_the_plan() {
        let full = vec![card("cfc-1", 0), card("cfc-2", 1)];
        let mut session = EditSession::new();
        CardSetEditor::new(&full, &mut session)
            .update_card(&id("cfc-2"), CardPatch::question("edited Q2"))
            .unwrap();

        let partial = vec![card("cfc-1", 0)];
        let editor = CardSetEditor::new(&partial, &mut session);
        assert_eq!(
            editor.commit_plan(),
            Err(EditError::StaleEdit(
                IdConvention::default().persisted("cfc-2").unwrap()
            ))
        );
        assert!(session.has_changes());
    }
}
