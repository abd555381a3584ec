//! Error types for the Ternion node.

use ternion_tree::{MemberId, Tier};
use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resolution failed
    #[error("Resolver error: {0}")]
    Resolver(#[from] ternion_resolver::Error),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The caller may not perform this action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The write conflicts with existing data
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The parent already has a full set of children
    #[error("Parent {0} has no free slot")]
    CapacityExceeded(MemberId),

    /// No active member at or above the sponsor reference
    #[error("No active sponsor for {0}")]
    NoActiveSponsor(String),

    /// Compression reached the top without a qualified receiver
    #[error("No qualified {tier} beneficiary for {payer}")]
    NoBeneficiary { payer: MemberId, tier: Tier },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<ternion_tree::ParseError> for Error {
    fn from(e: ternion_tree::ParseError) -> Self {
        Error::InvalidInput(e.to_string())
    }
}
