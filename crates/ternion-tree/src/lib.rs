//! Ternion Placement Tree
//!
//! Domain types for a capacity-3 ternary placement tree.
//!
//! # Structure
//!
//! Every member hangs under exactly one structural parent (`parent_id`), except
//! the single root. No node ever has more than [`MATRIX_WIDTH`] direct
//! children, and new members fill the tree breadth-first, left to right.
//!
//! The structural parent is independent of the sponsor (the member who
//! referred a registrant). Once a sponsor's three slots are taken, new
//! referrals spill over into the sponsor's downline.
//!
//! # Tiers
//!
//! A member climbs four fixed tiers, [`Tier::Guest`] through [`Tier::Tier3`].
//! Buying tier `T` pays the ancestor `T` hops up the tree, or the nearest
//! qualified ancestor above it when that one cannot receive.

mod error;
mod member;
mod tier;

pub use error::ParseError;
pub use member::{
    normalize_email, ChildLink, CycleRecord, Member, MemberId, MemberKey, MemberStatus,
};
pub use tier::Tier;

/// Maximum number of direct children per node.
pub const MATRIX_WIDTH: usize = 3;

/// Depth of the matrix below a member that pays out at the top tier.
pub const MATRIX_DEPTH: u32 = 3;

/// Top-tier receipts a member collects before the cycle is complete.
pub const COMPLETION_RECEIPTS: u32 = (MATRIX_WIDTH as u32).pow(MATRIX_DEPTH);

// The deepest tier must pay out exactly as far as the matrix is deep.
const _: () = assert!(Tier::Tier3.rank() as u32 == MATRIX_DEPTH);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_full_matrix() {
        assert_eq!(COMPLETION_RECEIPTS, 27);
    }

    #[test]
    fn top_tier_matches_depth() {
        assert_eq!(Tier::TOP.hops(), Some(MATRIX_DEPTH as usize));
    }
}
