//! Persistent storage using RocksDB.
//!
//! Key layout:
//!
//! - `member:{id}` - member record (JSON)
//! - `email:{email}` - member id for the email lookup key
//! - `child:{parent}:{seq}` - child id, `seq` zero-padded so children of one
//!   parent iterate in creation order
//! - `payment:{id}` - payment record (JSON)
//! - `sent:{sender}:{id}`, `recv:{receiver}:{id}` - payment ids by member
//! - `meta:seq` - last creation sequence number
//!
//! Capacity is enforced here, at write time: [`Storage::attach_member`]
//! re-counts the parent's children under the write lock and refuses a
//! fourth child. Resolvers only advise; this check is the point of truth.

use crate::error::{Error, Result};
use crate::models::PaymentRecord;
use async_trait::async_trait;
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use ternion_resolver::{Directory, StoreError};
use ternion_tree::{normalize_email, ChildLink, Member, MemberId, MemberKey, MATRIX_WIDTH};

const SEQ_KEY: &[u8] = b"meta:seq";

/// Storage backend for node data.
pub struct Storage {
    db: DB,
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Members ---

    /// Get a member by id.
    pub fn member(&self, id: &MemberId) -> Result<Option<Member>> {
        let key = format!("member:{}", id);
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Get a member by email.
    pub fn member_by_email(&self, email: &str) -> Result<Option<Member>> {
        let key = format!("email:{}", normalize_email(email));
        match self.db.get(key.as_bytes())? {
            Some(id) => self.member(&MemberId::new(String::from_utf8_lossy(&id))),
            None => Ok(None),
        }
    }

    /// Get a member by either lookup key.
    pub fn find_member(&self, key: &MemberKey) -> Result<Option<Member>> {
        match key {
            MemberKey::Id(id) => self.member(id),
            MemberKey::Email(email) => self.member_by_email(email),
        }
    }

    /// Ids of a member's direct children, in creation order.
    pub fn child_ids(&self, parent: &MemberId) -> Result<Vec<MemberId>> {
        let prefix = format!("child:{}:", parent);
        let mut children = Vec::new();

        let iter = self.db.prefix_iterator(prefix.as_bytes());
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(prefix.as_bytes()) {
                children.push(MemberId::new(String::from_utf8_lossy(&value)));
            } else {
                break;
            }
        }

        Ok(children)
    }

    /// Number of direct children of a member.
    pub fn child_count(&self, parent: &MemberId) -> Result<usize> {
        Ok(self.child_ids(parent)?.len())
    }

    /// Children of several parents, grouped in the order given.
    pub fn child_links(&self, parents: &[MemberId]) -> Result<Vec<ChildLink>> {
        let mut links = Vec::new();
        for parent in parents {
            for child in self.child_ids(parent)? {
                links.push(ChildLink {
                    id: child,
                    parent_id: parent.clone(),
                });
            }
        }
        Ok(links)
    }

    /// Insert a new member under its `parent_id`.
    ///
    /// Fails with [`Error::CapacityExceeded`] when the parent already has
    /// [`MATRIX_WIDTH`] children, and with [`Error::Conflict`] when the id or
    /// email is taken.
    pub fn attach_member(&self, member: &Member) -> Result<()> {
        validate_id(&member.id)?;
        let _guard = self.lock();

        if self.member(&member.id)?.is_some() {
            return Err(Error::Conflict(format!("member {} already exists", member.id)));
        }
        if self.member_by_email(&member.email)?.is_some() {
            return Err(Error::Conflict(format!("email {} already registered", member.email)));
        }

        let mut batch = WriteBatch::default();
        if let Some(parent) = &member.parent_id {
            if self.member(parent)?.is_none() {
                return Err(Error::NotFound(format!("parent {}", parent)));
            }
            if self.child_count(parent)? >= MATRIX_WIDTH {
                return Err(Error::CapacityExceeded(parent.clone()));
            }
            let seq = self.next_seq()?;
            let child_key = format!("child:{}:{:020}", parent, seq);
            batch.put(child_key.as_bytes(), member.id.as_str().as_bytes());
            batch.put(SEQ_KEY, seq.to_be_bytes());
        }

        let member_key = format!("member:{}", member.id);
        let email_key = format!("email:{}", member.email);
        batch.put(member_key.as_bytes(), serde_json::to_vec(member)?);
        batch.put(email_key.as_bytes(), member.id.as_str().as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    /// Replace an existing member record.
    ///
    /// Placement and identity are immutable: the parent link and email must
    /// match the stored record.
    pub fn update_member(&self, member: &Member) -> Result<()> {
        let _guard = self.lock();
        let mut batch = WriteBatch::default();
        self.stage_update(&mut batch, member)?;
        self.db.write(batch)?;
        Ok(())
    }

    /// Ensure the root member exists, creating it if needed.
    pub fn ensure_root(&self, root_id: &MemberId, root_email: &str) -> Result<Member> {
        if let Some(root) = self.member(root_id)? {
            return Ok(root);
        }
        let mut root = Member::new(root_id.clone(), root_email);
        root.username = "root".to_string();
        root.level = ternion_tree::Tier::TOP;
        root.created_at = crate::now_millis();
        self.attach_member(&root)?;
        tracing::info!("Created root member {}", root_id);
        Ok(root)
    }

    fn next_seq(&self) -> Result<u64> {
        let last = match self.db.get(SEQ_KEY)? {
            Some(data) => {
                let bytes: [u8; 8] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Invalid sequence counter".into()))?;
                u64::from_be_bytes(bytes)
            }
            None => 0,
        };
        Ok(last + 1)
    }

    fn stage_update(&self, batch: &mut WriteBatch, member: &Member) -> Result<()> {
        let stored = self
            .member(&member.id)?
            .ok_or_else(|| Error::NotFound(format!("member {}", member.id)))?;
        if stored.parent_id != member.parent_id || stored.email != member.email {
            return Err(Error::InvalidInput(format!(
                "member {} cannot change parent or email",
                member.id
            )));
        }
        let key = format!("member:{}", member.id);
        batch.put(key.as_bytes(), serde_json::to_vec(member)?);
        Ok(())
    }

    // --- Payments ---

    /// Store a new payment and index it by sender and receiver.
    ///
    /// Refuses to overwrite an existing payment id.
    pub fn insert_payment(&self, payment: &PaymentRecord) -> Result<()> {
        let _guard = self.lock();
        let key = format!("payment:{}", payment.id);
        if self.db.get(key.as_bytes())?.is_some() {
            return Err(Error::Conflict(format!("payment {} already exists", payment.id)));
        }

        let sent_key = format!("sent:{}:{}", payment.sender_id, payment.id);
        let recv_key = format!("recv:{}:{}", payment.receiver_id, payment.id);
        let mut batch = WriteBatch::default();
        batch.put(key.as_bytes(), serde_json::to_vec(payment)?);
        batch.put(sent_key.as_bytes(), payment.id.as_bytes());
        batch.put(recv_key.as_bytes(), payment.id.as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    /// Get a payment by ID.
    pub fn get_payment(&self, id: &str) -> Result<Option<PaymentRecord>> {
        let key = format!("payment:{}", id);
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Payments reached through one index prefix.
    fn indexed_payments(&self, prefix: &str) -> Result<Vec<PaymentRecord>> {
        let mut payments = Vec::new();

        let iter = self.db.prefix_iterator(prefix.as_bytes());
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let id = String::from_utf8_lossy(&value);
            match self.get_payment(&id)? {
                Some(payment) => payments.push(payment),
                None => tracing::warn!("Payment index {} points at missing {}", prefix, id),
            }
        }

        Ok(payments)
    }

    /// Payments a member sent.
    pub fn payments_sent(&self, sender: &MemberId) -> Result<Vec<PaymentRecord>> {
        self.indexed_payments(&format!("sent:{}:", sender))
    }

    /// Payments a member sent or receives, oldest first.
    pub fn payments_for(&self, member: &MemberId) -> Result<Vec<PaymentRecord>> {
        let mut payments = self.payments_sent(member)?;
        payments.extend(self.indexed_payments(&format!("recv:{}:", member))?);
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    /// Write a payment and the members it changes in one atomic batch.
    pub fn commit_payment(&self, payment: &PaymentRecord, members: &[Member]) -> Result<()> {
        let _guard = self.lock();
        let mut batch = WriteBatch::default();
        for member in members {
            self.stage_update(&mut batch, member)?;
        }
        let key = format!("payment:{}", payment.id);
        batch.put(key.as_bytes(), serde_json::to_vec(payment)?);
        self.db.write(batch)?;
        Ok(())
    }
}

fn validate_id(id: &MemberId) -> Result<()> {
    if id.as_str().is_empty() || id.as_str().contains(':') {
        return Err(Error::InvalidInput(format!("invalid member id {:?}", id.as_str())));
    }
    Ok(())
}

#[async_trait]
impl Directory for Storage {
    async fn get_member(&self, key: &MemberKey) -> std::result::Result<Option<Member>, StoreError> {
        self.find_member(key).map_err(StoreError::new)
    }

    async fn count_children(&self, parent: &MemberId) -> std::result::Result<usize, StoreError> {
        self.child_count(parent).map_err(StoreError::new)
    }

    async fn get_children(
        &self,
        parents: &[MemberId],
    ) -> std::result::Result<Vec<ChildLink>, StoreError> {
        self.child_links(parents).map_err(StoreError::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentKind, PaymentStatus};
    use tempfile::tempdir;
    use ternion_tree::{MemberStatus, Tier};

    fn child(id: &str, parent: &str) -> Member {
        let mut m = Member::new(id.into(), &format!("{}@example.com", id));
        m.parent_id = Some(parent.into());
        m.sponsor_id = Some(parent.into());
        m
    }

    fn open_with_root() -> (tempfile::TempDir, Storage) {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        storage.ensure_root(&"root".into(), "root@example.com").unwrap();
        (dir, storage)
    }

    #[test]
    fn member_roundtrip() {
        let (_dir, storage) = open_with_root();
        storage.attach_member(&child("a", "root")).unwrap();

        let by_id = storage.member(&"a".into()).unwrap().unwrap();
        let by_email = storage.member_by_email("A@Example.com").unwrap().unwrap();
        assert_eq!(by_id, by_email);
        assert_eq!(by_id.parent_id, Some("root".into()));
    }

    #[test]
    fn root_is_created_once() {
        let (_dir, storage) = open_with_root();
        let root = storage.ensure_root(&"root".into(), "other@example.com").unwrap();
        assert_eq!(root.email, "root@example.com");
        assert_eq!(root.level, Tier::Tier3);
        assert!(root.parent_id.is_none());
    }

    #[test]
    fn children_in_creation_order() {
        let (_dir, storage) = open_with_root();
        for id in ["c", "a", "b"] {
            storage.attach_member(&child(id, "root")).unwrap();
        }
        let ids: Vec<String> = storage
            .child_ids(&"root".into())
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn fourth_child_is_refused() {
        let (_dir, storage) = open_with_root();
        for id in ["a", "b", "c"] {
            storage.attach_member(&child(id, "root")).unwrap();
        }
        let err = storage.attach_member(&child("d", "root")).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(ref p) if p.as_str() == "root"));
        assert!(storage.member(&"d".into()).unwrap().is_none());
        assert_eq!(storage.child_count(&"root".into()).unwrap(), 3);
    }

    #[test]
    fn concurrent_attaches_respect_capacity() {
        let (_dir, storage) = open_with_root();
        let storage = std::sync::Arc::new(storage);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let storage = std::sync::Arc::clone(&storage);
                std::thread::spawn(move || storage.attach_member(&child(&format!("m{}", i), "root")))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::CapacityExceeded(_))));
        assert_eq!(storage.child_count(&"root".into()).unwrap(), 3);
    }

    #[test]
    fn duplicate_email_is_refused() {
        let (_dir, storage) = open_with_root();
        storage.attach_member(&child("a", "root")).unwrap();
        let mut twin = child("b", "root");
        twin.email = "a@example.com".into();
        assert!(matches!(storage.attach_member(&twin), Err(Error::Conflict(_))));
    }

    #[test]
    fn unknown_parent_is_refused() {
        let (_dir, storage) = open_with_root();
        let err = storage.attach_member(&child("a", "ghost")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn ids_with_separator_are_refused() {
        let (_dir, storage) = open_with_root();
        let err = storage.attach_member(&child("a:b", "root")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn update_cannot_move_member() {
        let (_dir, storage) = open_with_root();
        storage.attach_member(&child("a", "root")).unwrap();
        storage.attach_member(&child("b", "root")).unwrap();

        let mut a = storage.member(&"a".into()).unwrap().unwrap();
        a.status = MemberStatus::Inactive;
        storage.update_member(&a).unwrap();
        assert_eq!(
            storage.member(&"a".into()).unwrap().unwrap().status,
            MemberStatus::Inactive
        );

        a.parent_id = Some("b".into());
        assert!(matches!(storage.update_member(&a), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn payment_commit_is_atomic() {
        let (_dir, storage) = open_with_root();
        storage.attach_member(&child("a", "root")).unwrap();

        let mut payment =
            PaymentRecord::new("a".into(), "root".into(), Tier::Tier1, PaymentKind::Upgrade, 1);
        storage.insert_payment(&payment).unwrap();

        let mut a = storage.member(&"a".into()).unwrap().unwrap();
        a.level = Tier::Tier1;
        payment.status = PaymentStatus::Confirmed;
        let ghost = child("ghost", "root");
        assert!(storage.commit_payment(&payment, &[a.clone(), ghost]).is_err());
        assert!(storage.get_payment(&payment.id).unwrap().unwrap().is_pending());

        storage.commit_payment(&payment, &[a]).unwrap();
        assert_eq!(
            storage.get_payment(&payment.id).unwrap().unwrap().status,
            PaymentStatus::Confirmed
        );
        assert_eq!(storage.member(&"a".into()).unwrap().unwrap().level, Tier::Tier1);
        assert_eq!(storage.payments_for(&"root".into()).unwrap().len(), 1);
    }

    #[test]
    fn payment_ids_are_never_overwritten() {
        let (_dir, storage) = open_with_root();
        let first =
            PaymentRecord::new("a".into(), "root".into(), Tier::Tier1, PaymentKind::Upgrade, 1);
        storage.insert_payment(&first).unwrap();

        let mut clash = first.clone();
        clash.receipt_url = Some("https://example.com/r".into());
        let err = storage.insert_payment(&clash).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(storage.get_payment(&first.id).unwrap(), Some(first));
    }

    #[test]
    fn payments_are_indexed_by_member() {
        let (_dir, storage) = open_with_root();
        let up = PaymentRecord::new("a".into(), "root".into(), Tier::Tier1, PaymentKind::Upgrade, 1);
        let down = PaymentRecord::new("ab".into(), "a".into(), Tier::Tier1, PaymentKind::Upgrade, 2);
        storage.insert_payment(&down).unwrap();
        storage.insert_payment(&up).unwrap();

        let sent: Vec<String> = storage
            .payments_sent(&"a".into())
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(sent, vec![up.id.clone()]);

        let history: Vec<String> = storage
            .payments_for(&"a".into())
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(history, vec![up.id, down.id]);
        assert!(storage.payments_sent(&"root".into()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn directory_view_matches_storage() {
        let (_dir, storage) = open_with_root();
        for id in ["a", "b"] {
            storage.attach_member(&child(id, "root")).unwrap();
        }
        storage.attach_member(&child("a1", "a")).unwrap();

        assert_eq!(Directory::count_children(&storage, &"root".into()).await.unwrap(), 2);
        let links = Directory::get_children(&storage, &["b".into(), "a".into(), "root".into()])
            .await
            .unwrap();
        let ids: Vec<&str> = links.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a", "b"]);
        let found = Directory::get_member(&storage, &MemberKey::email("a1@example.com"))
            .await
            .unwrap();
        assert_eq!(found.map(|m| m.id), Some("a1".into()));
    }
}
