use std::cmp::Ordering;

use crate::model::Flashcard;

use super::modifiers::DisplayModifiers;

/// Order cards for the manage view in active-recall mode.
///
/// Starred cards lead when the starred filter is on, then cards tagged with a
/// selected key concept, then earliest `next_review_at` (unscheduled cards last,
/// by `idx`). Never touches `idx` itself.
pub fn active_recall_order(cards: &mut [Flashcard], modifiers: &DisplayModifiers) {
    cards.sort_by(|a, b| compare(a, b, modifiers));
}

fn compare(a: &Flashcard, b: &Flashcard, modifiers: &DisplayModifiers) -> Ordering {
    let starred = if modifiers.show_only_starred {
        b.fields.is_starred.cmp(&a.fields.is_starred)
    } else {
        Ordering::Equal
    };

    starred
        .then_with(|| selected(b, modifiers).cmp(&selected(a, modifiers)))
        .then_with(|| match (a.fields.next_review_at, b.fields.next_review_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.idx().cmp(&b.idx()))
}

fn selected(card: &Flashcard, modifiers: &DisplayModifiers) -> bool {
    card.fields
        .key_concept
        .as_ref()
        .is_some_and(|kc| modifiers.selected_key_concepts.contains(&kc.id))
}
