//! Error types for spindex

use std::collections::TryReserveError;

use crate::VectorId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed vector: {0}")]
    MalformedVector(String),

    #[error("Unknown vector id: {0}")]
    UnknownId(VectorId),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Index is empty")]
    EmptyIndex,

    #[error("Out of memory")]
    OutOfMemory,
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

pub type Result<T> = std::result::Result<T, Error>;
