//! Commission beneficiary resolution with dynamic compression.
//!
//! A payment for tier `T` nominally goes to the ancestor exactly `T` hops
//! above the payer. If that ancestor cannot receive it (not ACTIVE, or
//! leveled below `T`), the payment moves up one ancestor at a time until
//! someone qualifies. The root qualifies for every tier unless suspended.
//!
//! The nominal ascent and the compression walk are separate phases: running
//! out of ancestors during the ascent is an error (the branch is orphaned or
//! too shallow), while running out during compression is the expected
//! [`Beneficiary::NoBeneficiary`] outcome.

use crate::config::ResolverConfig;
use crate::directory::Directory;
use crate::error::{Error, Result};
use std::collections::HashSet;
use ternion_tree::{Member, MemberId, MemberKey, Tier};

/// Outcome of a beneficiary resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Beneficiary {
    /// The member entitled to the payment.
    Found(MemberId),
    /// Compression reached the top of the tree without a qualified member.
    NoBeneficiary {
        /// The last member examined
        last_checked: MemberId,
    },
}

impl Beneficiary {
    /// The beneficiary id, if one was found.
    pub fn member_id(&self) -> Option<&MemberId> {
        match self {
            Self::Found(id) => Some(id),
            Self::NoBeneficiary { .. } => None,
        }
    }
}

/// Resolve who receives `payer`'s payment for `target`.
pub async fn resolve_beneficiary<D>(
    directory: &D,
    config: &ResolverConfig,
    payer: &MemberId,
    target: Tier,
) -> Result<Beneficiary>
where
    D: Directory + ?Sized,
{
    let hops = target.hops().ok_or(Error::InvalidTier(target))?;
    let mut walk = Ascent::new(directory, payer).await?;

    for taken in 0..hops {
        if !walk.step().await? {
            return Err(Error::OrphanedBranch {
                member: walk.current.id,
                hops_taken: taken,
                hops_required: hops,
            });
        }
    }

    let nominal = walk.current.id.clone();
    loop {
        if walk.current.can_receive(target, &config.root_id) {
            if walk.current.id != nominal {
                tracing::debug!(
                    "Compressed {} payment from {}: {} -> {}",
                    target,
                    payer,
                    nominal,
                    walk.current.id
                );
            }
            return Ok(Beneficiary::Found(walk.current.id));
        }

        if !walk.step().await? {
            tracing::warn!(
                "No qualified {} beneficiary above {} (top reached at {})",
                target,
                payer,
                walk.current.id
            );
            return Ok(Beneficiary::NoBeneficiary {
                last_checked: walk.current.id,
            });
        }
    }
}

/// Parent-link walk that refuses to revisit a member.
struct Ascent<'a, D: ?Sized> {
    directory: &'a D,
    current: Member,
    visited: HashSet<MemberId>,
}

impl<'a, D> Ascent<'a, D>
where
    D: Directory + ?Sized,
{
    async fn new(directory: &'a D, start: &MemberId) -> Result<Self> {
        let current = fetch(directory, start).await?;
        let visited = HashSet::from([current.id.clone()]);
        Ok(Self {
            directory,
            current,
            visited,
        })
    }

    /// Move to the parent. `false` when there is none.
    async fn step(&mut self) -> Result<bool> {
        let Some(parent) = self.current.parent_id.clone() else {
            return Ok(false);
        };
        if !self.visited.insert(parent.clone()) {
            return Err(Error::CycleDetected(parent));
        }
        self.current = fetch(self.directory, &parent).await?;
        Ok(true)
    }
}

async fn fetch<D>(directory: &D, id: &MemberId) -> Result<Member>
where
    D: Directory + ?Sized,
{
    let key = MemberKey::Id(id.clone());
    directory
        .get_member(&key)
        .await?
        .ok_or(Error::NotFound(key))
}
