use thiserror::Error;

use crate::model::{IdError, PreferencesError, ReviewError};
use crate::session::{EditError, ViewError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Preferences(#[from] PreferencesError),
}
