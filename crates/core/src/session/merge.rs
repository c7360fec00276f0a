use crate::model::{CardId, Flashcard};

use super::edit::EditSession;

/// Reconcile the fetched card list with pending edits.
///
/// Overrides are applied to fetched cards, unsaved drafts are appended and the
/// result is sorted by `idx` (stable, so fetched order breaks ties). Cards marked
/// deleted stay in the output; use [`visible_cards`] to hide them.
#[must_use]
pub fn merge_cards(fetched: &[Flashcard], edits: &EditSession) -> Vec<Flashcard> {
    let mut merged: Vec<Flashcard> = Vec::with_capacity(fetched.len() + edits.new_cards().len());

    for card in fetched {
        let fields = match card.id.persisted().and_then(|id| edits.patch_for(id)) {
            Some(patch) => patch.apply(&card.fields),
            None => card.fields.clone(),
        };
        merged.push(Flashcard::new(card.id.clone(), fields));
    }

    for (id, fields) in edits.new_cards() {
        let card_id = CardId::Draft(id.clone());
        if fetched.iter().any(|card| card.id == card_id) {
            continue;
        }
        merged.push(Flashcard::new(card_id, fields.clone()));
    }

    merged.sort_by_key(Flashcard::idx);
    merged
}

/// The merged list without soft-deleted cards.
#[must_use]
pub fn visible_cards(merged: Vec<Flashcard>, edits: &EditSession) -> Vec<Flashcard> {
    merged
        .into_iter()
        .filter(|card| !edits.is_deleted(&card.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardFields, CardPatch, DraftIdGenerator, IdConvention};
    use crate::time::fixed_now;
    use std::collections::HashSet;

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

    #[test]
    fn overrides_apply_and_drafts_append_sorted() {
        let fetched = vec![card("cfc-1", 0), card("cfc-2", 1)];
        let mut edits = EditSession::new();
        let id1 = fetched[0].id.clone();
        edits.update_card(&id1, CardPatch::question("new Q"), Some(&fetched[0].fields));
        edits.update_card(&id1, CardPatch::idx(5), Some(&fetched[0].fields));

        let draft = DraftIdGenerator::new().next(fixed_now());
        edits.insert_draft(draft.clone(), CardFields::blank(2, fixed_now()));

        let merged = merge_cards(&fetched, &edits);
        assert_eq!(merged.len(), 3);
        let ids: Vec<_> = merged.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, vec!["cfc-2".to_string(), draft.to_string(), "cfc-1".to_string()]);
        assert_eq!(merged[2].fields.question, "new Q");
        assert_eq!(merged[0].fields.question, "Q cfc-2");
    }

    #[test]
    fn merge_keeps_every_fetched_id_without_duplicates() {
        let fetched: Vec<_> = (0..20).map(|i| card(&format!("cfc-{i}"), 19 - i)).collect();
        let mut edits = EditSession::new();
        for c in fetched.iter().step_by(3) {
            edits.update_card(&c.id, CardPatch::starred(true), Some(&c.fields));
            edits.mark_card_deleted(&c.id);
        }
        let merged = merge_cards(&fetched, &edits);
        assert_eq!(merged.len(), fetched.len());
        let unique: HashSet<_> = merged.iter().map(|c| c.id.clone()).collect();
        assert_eq!(unique.len(), fetched.len());
        assert!(merged.windows(2).all(|w| w[0].idx() <= w[1].idx()));
    }

    #[test]
    fn deleted_cards_are_hidden_only_at_render_time() {
        let fetched = vec![card("cfc-1", 0), card("cfc-2", 1)];
        let mut edits = EditSession::new();
        edits.mark_card_deleted(&fetched[1].id);

        let merged = merge_cards(&fetched, &edits);
        assert_eq!(merged.len(), 2);
        let visible = visible_cards(merged, &edits);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, fetched[0].id);
    }
}
