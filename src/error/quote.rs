use thiserror::Error;

use super::CurveError;

/// User-visible quote failures. Every variant renders to a message the UI can show.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error(transparent)]
    Rejected(#[from] CurveError),
}
