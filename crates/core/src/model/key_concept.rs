use serde::{Deserialize, Serialize};

use crate::model::card::{KeyConceptRef, SourceLocator};

/// A key concept extracted from a content item, offered as a card filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConcept {
    pub id: String,
    pub collection: String,
    pub label: String,
    pub source: Option<SourceLocator>,
}

impl KeyConcept {
    #[must_use]
    pub fn reference(&self) -> KeyConceptRef {
        KeyConceptRef {
            id: self.id.clone(),
            collection: self.collection.clone(),
        }
    }
}

/// Label for a card badge, falling back to nothing when the concept is unknown.
#[must_use]
pub fn badge_label<'a>(concepts: &'a [KeyConcept], reference: &KeyConceptRef) -> Option<&'a str> {
    concepts
        .iter()
        .find(|concept| concept.id == reference.id)
        .map(|concept| concept.label.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_label_looks_up_by_id() {
        let concepts = vec![KeyConcept {
            id: "kc-1".into(),
            collection: "keyConcepts".into(),
            label: "Ownership".into(),
            source: Some(SourceLocator::Page(4)),
        }];
        let reference = concepts[0].reference();
        assert_eq!(badge_label(&concepts, &reference), Some("Ownership"));

        let missing = KeyConceptRef {
            id: "kc-9".into(),
            collection: "keyConcepts".into(),
        };
        assert_eq!(badge_label(&concepts, &missing), None);
    }
}
