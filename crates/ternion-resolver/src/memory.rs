//! In-memory member directory.
//!
//! Keeps members in insertion order, which stands in for creation order.
//! Capacity is not enforced here; it is a plain record store.

use crate::directory::Directory;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use ternion_tree::{ChildLink, Member, MemberId, MemberKey};

#[derive(Default)]
struct Inner {
    members: HashMap<MemberId, Member>,
    emails: HashMap<String, MemberId>,
    children: HashMap<MemberId, Vec<MemberId>>,
}

/// A [`Directory`] held entirely in memory.
///
/// Every primitive call counts as one round-trip, so callers can check how
/// many queries a resolution took.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: RwLock<Inner>,
    round_trips: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from members in creation order.
    pub fn with_members(members: impl IntoIterator<Item = Member>) -> Self {
        let dir = Self::new();
        for member in members {
            dir.insert(member);
        }
        dir
    }

    /// Insert or replace a member.
    ///
    /// A replaced member keeps its position among its parent's children
    /// unless its parent changed.
    pub fn insert(&self, member: Member) {
        let mut inner = self.write();
        if let Some(old) = inner.members.remove(&member.id) {
            inner.emails.remove(&old.email);
            if old.parent_id != member.parent_id {
                if let Some(parent) = &old.parent_id {
                    if let Some(siblings) = inner.children.get_mut(parent) {
                        siblings.retain(|id| id != &old.id);
                    }
                }
                if let Some(parent) = &member.parent_id {
                    inner.children.entry(parent.clone()).or_default().push(member.id.clone());
                }
            }
        } else if let Some(parent) = &member.parent_id {
            inner.children.entry(parent.clone()).or_default().push(member.id.clone());
        }
        inner.emails.insert(member.email.clone(), member.id.clone());
        inner.members.insert(member.id.clone(), member);
    }

    /// Number of members stored.
    pub fn len(&self) -> usize {
        self.read().members.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Primitive calls served (or refused) so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Reset the round-trip counter.
    pub fn reset_round_trips(&self) {
        self.round_trips.store(0, Ordering::SeqCst);
    }

    /// Make every subsequent call fail with a [`StoreError`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError("directory unavailable".into()));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_member(&self, key: &MemberKey) -> Result<Option<Member>, StoreError> {
        self.begin()?;
        let inner = self.read();
        let id = match key {
            MemberKey::Id(id) => Some(id),
            MemberKey::Email(email) => inner.emails.get(email),
        };
        Ok(id.and_then(|id| inner.members.get(id)).cloned())
    }

    async fn count_children(&self, parent: &MemberId) -> Result<usize, StoreError> {
        self.begin()?;
        Ok(self.read().children.get(parent).map_or(0, Vec::len))
    }

    async fn get_children(&self, parents: &[MemberId]) -> Result<Vec<ChildLink>, StoreError> {
        self.begin()?;
        let inner = self.read();
        let links = parents
            .iter()
            .flat_map(|parent| {
                inner
                    .children
                    .get(parent)
                    .into_iter()
                    .flatten()
                    .map(move |child| ChildLink::new(child.clone(), parent.clone()))
            })
            .collect();
        Ok(links)
    }
}
