//! Error types for ternion-resolver.

use ternion_tree::{MemberId, MemberKey, Tier};
use thiserror::Error;

/// Result type for resolver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure to read from the member directory.
///
/// Opaque on purpose: the directory backend decides what went wrong, the
/// resolver only needs to abort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    /// Wrap any displayable backend error.
    pub fn new(e: impl std::fmt::Display) -> Self {
        Self(e.to_string())
    }
}

/// Errors that abort a resolution.
///
/// Expected dead-ends (no qualified beneficiary, no active sponsor, a degraded
/// placement) are not errors; they come back as `Ok` values.
#[derive(Debug, Error)]
pub enum Error {
    /// The directory could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A referenced id or email does not resolve to a member.
    #[error("member not found: {0}")]
    NotFound(MemberKey),

    /// The tier is never purchased, so there is nobody to pay.
    #[error("tier {0} cannot be paid for")]
    InvalidTier(Tier),

    /// The ancestor chain ended before the tier's nominal ascent completed.
    #[error("orphaned branch: {member} has no parent after {hops_taken} of {hops_required} hops")]
    OrphanedBranch {
        member: MemberId,
        hops_taken: usize,
        hops_required: usize,
    },

    /// A parent link led back to an already visited member.
    #[error("parent links form a cycle at {0}")]
    CycleDetected(MemberId),
}
