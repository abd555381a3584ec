//! Parse errors for tree types.

use thiserror::Error;

/// Errors produced when parsing tree types from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Not a known tier name or rank.
    #[error("unknown tier: {0:?}")]
    UnknownTier(String),

    /// Not a known member status.
    #[error("unknown member status: {0:?}")]
    UnknownStatus(String),

    /// An empty member reference.
    #[error("empty member reference")]
    EmptyKey,
}
