use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::model::Flashcard;

/// Filter parameters forwarded to card and progress fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFilter {
    pub starred_only: bool,
    pub key_concepts: Vec<String>,
}

/// View filters and ordering toggles, independent of pending edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayModifiers {
    pub is_shuffled: bool,
    pub show_only_starred: bool,
    pub selected_key_concepts: BTreeSet<String>,
}

impl DisplayModifiers {
    pub fn toggle_shuffle(&mut self) {
        self.is_shuffled = !self.is_shuffled;
    }

    pub fn set_show_only_starred(&mut self, value: bool) {
        self.show_only_starred = value;
    }

    /// Select or deselect a key concept; returns whether it is now selected.
    pub fn toggle_key_concept(&mut self, id: &str) -> bool {
        if self.selected_key_concepts.remove(id) {
            false
        } else {
            self.selected_key_concepts.insert(id.to_string());
            true
        }
    }

    pub fn clear_key_concepts(&mut self) {
        self.selected_key_concepts.clear();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// True when some cards may be hidden by the current filters.
    #[must_use]
    pub fn is_filtering(&self) -> bool {
        self.show_only_starred || !self.selected_key_concepts.is_empty()
    }

    #[must_use]
    pub fn matches(&self, card: &Flashcard) -> bool {
        if self.show_only_starred && !card.fields.is_starred {
            return false;
        }
        if self.selected_key_concepts.is_empty() {
            return true;
        }
        card.fields
            .key_concept
            .as_ref()
            .is_some_and(|kc| self.selected_key_concepts.contains(&kc.id))
    }

    /// Filter `cards` and shuffle them when shuffling is on.
    #[must_use]
    pub fn apply<R: Rng + ?Sized>(&self, cards: Vec<Flashcard>, rng: &mut R) -> Vec<Flashcard> {
        let mut out: Vec<Flashcard> = cards.into_iter().filter(|c| self.matches(c)).collect();
        if self.is_shuffled {
            out.shuffle(rng);
        }
        out
    }

    #[must_use]
    pub fn filter_query(&self) -> CardFilter {
        CardFilter {
            starred_only: self.show_only_starred,
            key_concepts: self.selected_key_concepts.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardFields, IdConvention, KeyConceptRef};
    use crate::time::fixed_now;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn card(raw: &str, starred: bool, concept: Option<&str>) -> Flashcard {
        Flashcard::new(
            IdConvention::default().classify(raw),
            CardFields {
                is_starred: starred,
                key_concept: concept.map(|id| KeyConceptRef {
                    id: id.into(),
                    collection: "keyConcepts".into(),
                }),
                ..CardFields::blank(0, fixed_now())
            },
        )
    }

    #[test]
    fn filters_by_star_and_key_concept() {
        let cards = vec![
            card("cfc-1", true, Some("kc-a")),
            card("cfc-2", false, Some("kc-a")),
            card("cfc-3", true, None),
        ];
        let mut modifiers = DisplayModifiers::default();
        modifiers.set_show_only_starred(true);
        assert!(modifiers.toggle_key_concept("kc-a"));

        let mut rng = StdRng::seed_from_u64(7);
        let out = modifiers.apply(cards, &mut rng);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id.to_string(), "cfc-1");
    }

    #[test]
    fn shuffle_preserves_membership() {
        let cards: Vec<_> = (0..30)
            .map(|i| card(&format!("cfc-{i}"), false, None))
            .collect();
        let mut modifiers = DisplayModifiers::default();
        modifiers.toggle_shuffle();
        let mut rng = StdRng::seed_from_u64(1);
        let mut out = modifiers.apply(cards.clone(), &mut rng);
        out.sort_by(|a, b| a.id.cmp(&b.id));
        let mut expected = cards;
        expected.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(out, expected);
    }

    #[test]
    fn reset_returns_to_defaults() {
        let mut modifiers = DisplayModifiers::default();
        modifiers.toggle_shuffle();
        modifiers.toggle_key_concept("kc-b");
        assert!(modifiers.is_filtering());
        assert_eq!(modifiers.filter_query().key_concepts, vec!["kc-b".to_string()]);

        modifiers.reset();
        assert!(modifiers.is_default());
    }
}
