use thiserror::Error;

/// Domain error taxonomy. Every failed transition leaves all records
/// unchanged; storage failures are generic and safely retryable because
/// each operation re-evaluates its preconditions from current state.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not authorized: {0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    InvalidState(&'static str),

    #[error("you cannot request your own item")]
    SelfRequest,

    #[error("{0}")]
    Validation(&'static str),

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Storage(e)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
