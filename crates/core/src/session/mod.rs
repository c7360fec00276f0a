//! Client-side state for one card set: pending edits, view filters, ordering
//! and the screen state machine.

mod edit;
mod merge;
mod modifiers;
mod ordering;
mod view;

pub use edit::{CardSetEditor, CardUpdate, CommitPlan, EditError, EditSession};
pub use merge::{merge_cards, visible_cards};
pub use modifiers::{CardFilter, DisplayModifiers};
pub use ordering::active_recall_order;
pub use view::{
    Action, AuthState, CardFace, Effect, ReturnTo, StudyMode, StudyState, View, ViewError,
};
