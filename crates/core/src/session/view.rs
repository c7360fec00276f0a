use std::fmt;

use thiserror::Error;

use crate::model::ContentId;

use super::edit::EditSession;
use super::modifiers::DisplayModifiers;

//
// ─── VIEW / MODE / AUTH ────────────────────────────────────────────────────────
//

/// The screen shown for a content item; exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Display,
    Manage,
    Menu,
    ActiveRecallIntro,
    Edit,
    Result,
}

impl View {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            View::Display => "display",
            View::Manage => "manage",
            View::Menu => "menu",
            View::ActiveRecallIntro => "activeRecallIntro",
            View::Edit => "edit",
            View::Result => "result",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudyMode {
    /// Flip through every card in `idx` order.
    FastReview,
    /// Backend-scheduled spaced repetition.
    ActiveRecall,
}

/// Authentication as reported by the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Resolving,
    Anonymous,
    Authenticated { user_id: String },
}

impl AuthState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }
}

/// Per-card presentation flags, reset whenever the current card changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardFace {
    pub flipped: bool,
    pub show_hint: bool,
    pub show_explanation: bool,
    pub show_answer: bool,
}

impl Default for CardFace {
    fn default() -> Self {
        Self {
            flipped: false,
            show_hint: false,
            show_explanation: false,
            show_answer: true,
        }
    }
}

//
// ─── ACTIONS / EFFECTS / ERRORS ────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenManage,
    CloseManage,
    /// A commit finished successfully.
    Committed,
    Finish,
    Restart,
    GoBack,
    StartStudying,
    ShowAll,
    Next { total: usize },
    Previous,
    Flip,
    ToggleHint,
    ToggleExplanation,
    /// The backend accepted a rating for the current card.
    Rated { total: usize },
    OpenEdit,
    CloseEdit,
    ShowResult,
    SwitchContent { content_id: ContentId },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::OpenManage => "open_manage",
            Action::CloseManage => "close_manage",
            Action::Committed => "committed",
            Action::Finish => "finish",
            Action::Restart => "restart",
            Action::GoBack => "go_back",
            Action::StartStudying => "start_studying",
            Action::ShowAll => "show_all",
            Action::Next { .. } => "next",
            Action::Previous => "previous",
            Action::Flip => "flip",
            Action::ToggleHint => "toggle_hint",
            Action::ToggleExplanation => "toggle_explanation",
            Action::Rated { .. } => "rated",
            Action::OpenEdit => "open_edit",
            Action::CloseEdit => "close_edit",
            Action::ShowResult => "show_result",
            Action::SwitchContent { .. } => "switch_content",
        }
    }
}

/// Follow-up work a transition asks the caller to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    MarkIntroSeen(ContentId),
    RefetchProgress,
    RefetchCards,
    ResetRenderedList,
}

/// Where to send the user back after signing in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnTo {
    pub content_id: ContentId,
    pub view: View,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ViewError {
    #[error("sign in required to open {}", .return_to.view)]
    AuthRequired { return_to: ReturnTo },

    #[error("save or revert your card changes before studying")]
    UnsavedChanges,

    #[error("cannot {action} from the {from} view")]
    InvalidTransition { from: View, action: &'static str },
}

//
// ─── STUDY STATE ───────────────────────────────────────────────────────────────
//

/// Everything the flashcard screens track for one content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyState {
    content_id: ContentId,
    mode: StudyMode,
    view: View,
    index: usize,
    face: CardFace,
    pub modifiers: DisplayModifiers,
    pub edits: EditSession,
}

impl StudyState {
    /// Initial state on first load of a content item.
    ///
    /// Active recall starts on the intro screen unless it was already seen.
    #[must_use]
    pub fn open(content_id: ContentId, mode: StudyMode, intro_seen: bool) -> Self {
        let view = match mode {
            StudyMode::ActiveRecall if !intro_seen => View::ActiveRecallIntro,
            _ => View::Display,
        };
        Self {
            content_id,
            mode,
            view,
            index: 0,
            face: CardFace::default(),
            modifiers: DisplayModifiers::default(),
            edits: EditSession::default(),
        }
    }

    #[must_use]
    pub fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    #[must_use]
    pub fn mode(&self) -> StudyMode {
        self.mode
    }

    #[must_use]
    pub fn view(&self) -> View {
        self.view
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn face(&self) -> CardFace {
        self.face
    }

    fn invalid(&self, action: &Action) -> ViewError {
        ViewError::InvalidTransition {
            from: self.view,
            action: action.name(),
        }
    }

    fn require_view(&self, expected: &[View], action: &Action) -> Result<(), ViewError> {
        if expected.contains(&self.view) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn require_auth(&self, auth: &AuthState, target: View) -> Result<bool, ViewError> {
        match auth {
            AuthState::Resolving => Ok(false),
            AuthState::Anonymous => Err(ViewError::AuthRequired {
                return_to: ReturnTo {
                    content_id: self.content_id.clone(),
                    view: target,
                },
            }),
            AuthState::Authenticated { .. } => Ok(true),
        }
    }

    fn move_to(&mut self, index: usize) {
        self.index = index;
        self.face = CardFace::default();
    }

    /// Apply one user or system action.
    ///
    /// On error the state is left exactly as it was. While auth is still
    /// resolving, protected actions are ignored without error.
    ///
    /// # Errors
    ///
    /// Returns `ViewError` for blocked or impossible transitions.
    pub fn apply(&mut self, action: Action, auth: &AuthState) -> Result<Vec<Effect>, ViewError> {
        match &action {
            Action::OpenManage => {
                self.require_view(&[View::Display], &action)?;
                if self.require_auth(auth, View::Manage)? {
                    self.view = View::Manage;
                }
                Ok(Vec::new())
            }
            Action::CloseManage => {
                self.require_view(&[View::Manage], &action)?;
                self.view = View::Display;
                Ok(Vec::new())
            }
            Action::Committed => {
                self.require_view(&[View::Manage, View::Edit], &action)?;
                self.edits.clear();
                self.view = View::Display;
                Ok(vec![Effect::RefetchCards, Effect::RefetchProgress])
            }
            Action::OpenEdit => {
                self.require_view(&[View::Display], &action)?;
                if self.require_auth(auth, View::Edit)? {
                    self.view = View::Edit;
                }
                Ok(Vec::new())
            }
            Action::CloseEdit => {
                self.require_view(&[View::Edit], &action)?;
                self.view = View::Display;
                Ok(Vec::new())
            }
            Action::Finish => {
                self.require_view(&[View::Display], &action)?;
                self.view = View::Menu;
                Ok(Vec::new())
            }
            Action::Restart => {
                self.require_view(&[View::Menu, View::Result], &action)?;
                self.modifiers.set_show_only_starred(false);
                self.move_to(0);
                self.view = View::Display;
                Ok(vec![Effect::RefetchCards])
            }
            Action::GoBack => {
                self.require_view(&[View::Menu, View::Result], &action)?;
                self.face = CardFace::default();
                self.view = View::Display;
                Ok(Vec::new())
            }
            Action::ShowResult => {
                self.require_view(&[View::Menu], &action)?;
                self.view = View::Result;
                Ok(Vec::new())
            }
            Action::StartStudying => {
                self.require_view(&[View::ActiveRecallIntro], &action)?;
                if self.edits.has_changes() {
                    return Err(ViewError::UnsavedChanges);
                }
                self.move_to(0);
                self.view = View::Display;
                Ok(vec![Effect::MarkIntroSeen(self.content_id.clone())])
            }
            Action::ShowAll => {
                self.require_view(&[View::Display, View::Menu, View::Result], &action)?;
                self.modifiers.reset();
                self.move_to(0);
                self.view = View::Display;
                Ok(vec![Effect::RefetchCards, Effect::RefetchProgress])
            }
            Action::Next { total } => {
                self.require_view(&[View::Display], &action)?;
                if self.index + 1 >= *total {
                    self.view = View::Menu;
                } else {
                    self.move_to(self.index + 1);
                }
                Ok(Vec::new())
            }
            Action::Previous => {
                self.require_view(&[View::Display], &action)?;
                self.move_to(self.index.saturating_sub(1));
                Ok(Vec::new())
            }
            Action::Flip => {
                self.require_view(&[View::Display], &action)?;
                self.face.flipped = !self.face.flipped;
                Ok(Vec::new())
            }
            Action::ToggleHint => {
                self.require_view(&[View::Display], &action)?;
                self.face.show_hint = !self.face.show_hint;
                Ok(Vec::new())
            }
            Action::ToggleExplanation => {
                self.require_view(&[View::Display], &action)?;
                self.face.show_explanation = !self.face.show_explanation;
                Ok(Vec::new())
            }
            Action::Rated { total } => {
                self.require_view(&[View::Display], &action)?;
                if self.index + 1 >= *total {
                    self.face = CardFace::default();
                    self.view = View::Menu;
                } else {
                    self.move_to(self.index + 1);
                }
                Ok(vec![Effect::RefetchProgress])
            }
            Action::SwitchContent { content_id } => {
                self.content_id = content_id.clone();
                self.modifiers.reset();
                self.edits.clear();
                self.move_to(0);
                self.view = View::Display;
                Ok(vec![
                    Effect::ResetRenderedList,
                    Effect::RefetchCards,
                    Effect::RefetchProgress,
                ])
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
