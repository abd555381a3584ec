//! The member directory seam.
//!
//! Resolvers only read. They see the tree through three primitives, and
//! child lookups are batched per tree level: `get_children` takes every
//! parent of the current frontier at once, so a search costs one round-trip
//! per level instead of one per node.

use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use ternion_tree::{ChildLink, Member, MemberId, MemberKey};

/// Read access to member records.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look a member up by id or by email.
    async fn get_member(&self, key: &MemberKey) -> Result<Option<Member>, StoreError>;

    /// Number of direct children of `parent`.
    async fn count_children(&self, parent: &MemberId) -> Result<usize, StoreError>;

    /// Children of every id in `parents`, in one query.
    ///
    /// Links are grouped by parent in the order of `parents`, and ordered by
    /// creation time within each parent.
    async fn get_children(&self, parents: &[MemberId]) -> Result<Vec<ChildLink>, StoreError>;
}

#[async_trait]
impl<D: Directory + ?Sized> Directory for Arc<D> {
    async fn get_member(&self, key: &MemberKey) -> Result<Option<Member>, StoreError> {
        (**self).get_member(key).await
    }

    async fn count_children(&self, parent: &MemberId) -> Result<usize, StoreError> {
        (**self).count_children(parent).await
    }

    async fn get_children(&self, parents: &[MemberId]) -> Result<Vec<ChildLink>, StoreError> {
        (**self).get_children(parents).await
    }
}
