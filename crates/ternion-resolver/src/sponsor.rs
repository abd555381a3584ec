//! Nearest active sponsor.
//!
//! Walks up from a sponsor reference to the first member that can currently
//! sponsor: the reference itself when it is ACTIVE or the root, otherwise the
//! closest such ancestor.

use crate::config::ResolverConfig;
use crate::directory::Directory;
use crate::error::{Error, Result};
use std::collections::HashSet;
use ternion_tree::{MemberId, MemberKey};

/// Resolve `key` (id or email) to the nearest usable sponsor.
///
/// Returns `Ok(None)` when the chain ends without a qualifying member, or when
/// a parent link points at a record that no longer exists. The reference
/// itself must exist; an unknown id or email is [`Error::NotFound`].
pub async fn resolve_active_sponsor<D>(
    directory: &D,
    config: &ResolverConfig,
    key: &MemberKey,
) -> Result<Option<MemberId>>
where
    D: Directory + ?Sized,
{
    let mut member = directory
        .get_member(key)
        .await?
        .ok_or_else(|| Error::NotFound(key.clone()))?;
    let mut visited = HashSet::new();

    loop {
        if !visited.insert(member.id.clone()) {
            return Err(Error::CycleDetected(member.id));
        }

        if member.is_active_sponsor(&config.root_id) {
            if visited.len() > 1 {
                tracing::debug!(
                    "Sponsor {} is not active, using ancestor {}",
                    key,
                    member.id
                );
            }
            return Ok(Some(member.id));
        }

        let Some(parent) = member.parent_id.take() else {
            tracing::debug!("No active sponsor above {}: chain ends at {}", key, member.id);
            return Ok(None);
        };

        member = match directory.get_member(&MemberKey::Id(parent.clone())).await? {
            Some(next) => next,
            None => {
                tracing::warn!("Member {} has dangling parent link {}", member.id, parent);
                return Ok(None);
            }
        };
    }
}
