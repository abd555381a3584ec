//! Spillover placement.
//!
//! A new member goes directly under its sponsor while the sponsor has a free
//! slot. Once the sponsor is full, the sponsor's downline is searched level by
//! level, left to right, and the member lands under the first node with fewer
//! than [`MATRIX_WIDTH`] children.
//!
//! # Cost
//!
//! The fast path is a single `count_children` call. The search issues one
//! batched `get_children` per level, so round-trips grow with the depth of the
//! free slot, not with the size of the downline.
//!
//! # Safety valve
//!
//! The search stops after `max_visited` nodes, or when a level yields no new
//! children, and falls back to the sponsor as [`Placement::Degraded`]. The
//! caller must flag that result; the store's capacity check will refuse the
//! write if the sponsor really is full.

use crate::config::ResolverConfig;
use crate::directory::Directory;
use crate::error::Result;
use std::collections::{HashMap, HashSet};
use ternion_tree::{MemberId, MATRIX_WIDTH};

/// Where a new member should be attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// A node with a free slot, found by breadth-first search.
    Slot(MemberId),
    /// The search gave up; this is the original sponsor.
    Degraded(MemberId),
}

impl Placement {
    /// The id to use as `parent_id`.
    pub fn parent_id(&self) -> &MemberId {
        match self {
            Self::Slot(id) | Self::Degraded(id) => id,
        }
    }

    /// Consume into the parent id.
    pub fn into_parent_id(self) -> MemberId {
        match self {
            Self::Slot(id) | Self::Degraded(id) => id,
        }
    }

    /// Whether the search fell back to the sponsor.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Find the attach point for a new member referred by `sponsor`.
pub async fn resolve_placement<D>(
    directory: &D,
    config: &ResolverConfig,
    sponsor: &MemberId,
) -> Result<Placement>
where
    D: Directory + ?Sized,
{
    let direct = directory.count_children(sponsor).await?;
    if direct < MATRIX_WIDTH {
        tracing::debug!("Sponsor {} has {} children, placing directly", sponsor, direct);
        return Ok(Placement::Slot(sponsor.clone()));
    }

    let mut frontier = vec![sponsor.clone()];
    let mut visited: HashSet<MemberId> = HashSet::from([sponsor.clone()]);
    let mut depth = 0usize;

    loop {
        let children = directory.get_children(&frontier).await?;

        let mut counts: HashMap<&MemberId, usize> = HashMap::with_capacity(frontier.len());
        for link in &children {
            *counts.entry(&link.parent_id).or_default() += 1;
        }

        // Frontier order is creation order, so earlier branches fill first.
        if let Some(slot) = frontier
            .iter()
            .find(|id| counts.get(*id).copied().unwrap_or(0) < MATRIX_WIDTH)
        {
            tracing::debug!(
                "Spillover under sponsor {}: slot {} at depth {}",
                sponsor,
                slot,
                depth
            );
            return Ok(Placement::Slot(slot.clone()));
        }

        let next: Vec<MemberId> = children
            .into_iter()
            .map(|link| link.id)
            .filter(|id| visited.insert(id.clone()))
            .collect();

        if next.is_empty() {
            tracing::warn!(
                "Spillover under sponsor {} found no new nodes at depth {}, falling back to sponsor",
                sponsor,
                depth
            );
            return Ok(Placement::Degraded(sponsor.clone()));
        }

        if visited.len() > config.max_visited {
            tracing::warn!(
                "Spillover under sponsor {} visited {} nodes (limit {}), falling back to sponsor",
                sponsor,
                visited.len(),
                config.max_visited
            );
            return Ok(Placement::Degraded(sponsor.clone()));
        }

        frontier = next;
        depth += 1;
    }
}
