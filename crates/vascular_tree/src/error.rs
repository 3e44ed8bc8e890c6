//! Error types and result alias for the crate.
//!
//! This module defines [`enum@crate::error::Error`] and the crate-wide [Result] alias. Variants cover
//! invalid configuration, malformed or corrupt input files, bookkeeping failures between the
//! vessel tree and its spatial index, distribution traversal contract violations, IO, and
//! generic errors.
//!
//! Geometric degeneracies and placement failures are not errors: the bifurcation solver falls
//! back to a centroid and placement returns `None`.
use thiserror::Error;

use crate::vessel::VesselId;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed vessel file at line {line}: {message}")]
    MalformedVesselFile { line: usize, message: String },

    #[error("No parent vessel found")]
    NoRootVessel,

    #[error("corrupt tree record: {0}")]
    CorruptRecord(String),

    #[error("unknown vessel {0}")]
    UnknownVessel(VesselId),

    #[error("item {0} is not in the spatial index")]
    NotIndexed(String),

    #[error("terminal vessel {0} could not be connected to an initial macrocell")]
    InitialConnection(VesselId),

    #[error("distribution traversal failed: {0}")]
    Traversal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Other(value.to_owned())
    }
}
