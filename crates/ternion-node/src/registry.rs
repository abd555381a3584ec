//! Member registration and payment flows.
//!
//! The registry is the only writer of the tree. Resolvers decide where a
//! member goes and who a payment is owed to; the registry applies the
//! resulting write through [`Storage`], which has the final say on capacity.

use crate::error::{Error, Result};
use crate::models::{PaymentKind, PaymentRecord, PaymentStatus};
use crate::now_millis;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ternion_resolver::{
    resolve_placement, Beneficiary, Placement, Resolver, ResolverConfig,
};
use ternion_tree::{CycleRecord, Member, MemberId, MemberKey, MemberStatus, Tier};
use tokio::sync::Mutex;

/// Attempts at placing one registrant before giving up on a contended slot.
const MAX_PLACEMENT_ATTEMPTS: usize = 5;

/// How much further the fallback search may look after a degraded placement.
const DEEP_SEARCH_FACTOR: usize = 16;

/// A registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMember {
    pub email: String,
    #[serde(default)]
    pub username: String,
    /// Sponsor id or email; the root when absent
    #[serde(default)]
    pub sponsor: Option<String>,
}

/// Result of a successful registration.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub member: Member,
    /// The active sponsor the member was placed under
    pub sponsor_id: MemberId,
    /// The bounded search gave up and the slot came from the deep search
    pub placement_degraded: bool,
}

/// Registration, payment and administration over one store.
pub struct Registry {
    storage: Arc<Storage>,
    resolver: Resolver<Arc<Storage>>,
    /// Serializes payment state transitions and status changes
    writes: Mutex<()>,
}

impl Registry {
    /// Create a registry over `storage`.
    pub fn new(storage: Arc<Storage>, config: ResolverConfig) -> Self {
        let resolver = Resolver::new(Arc::clone(&storage), config);
        Self {
            storage,
            resolver,
            writes: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn resolver(&self) -> &Resolver<Arc<Storage>> {
        &self.resolver
    }

    pub fn root_id(&self) -> &MemberId {
        &self.resolver.config().root_id
    }

    /// Look up a member by id or email.
    pub fn member(&self, key: &MemberKey) -> Result<Member> {
        self.storage
            .find_member(key)?
            .ok_or_else(|| Error::NotFound(format!("member {}", key)))
    }

    /// Direct children of a member, in creation order.
    pub fn children(&self, id: &MemberId) -> Result<Vec<Member>> {
        let parent = self.member(&id.into())?;
        let mut children = Vec::new();
        for child in self.storage.child_ids(&parent.id)? {
            match self.storage.member(&child)? {
                Some(member) => children.push(member),
                None => tracing::warn!("Child link {} -> {} has no record", parent.id, child),
            }
        }
        Ok(children)
    }

    // --- Registration ---

    /// Register a new member under the nearest active sponsor.
    pub async fn register(&self, request: NewMember) -> Result<Registration> {
        let email = request.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::InvalidInput(format!("invalid email {:?}", request.email)));
        }
        if self.storage.member_by_email(email)?.is_some() {
            return Err(Error::Conflict(format!("email {} already registered", email)));
        }

        let key = match request.sponsor.as_deref().map(str::trim) {
            Some(reference) if !reference.is_empty() => MemberKey::parse(reference)?,
            _ => MemberKey::Id(self.root_id().clone()),
        };
        let sponsor_id = self
            .resolver
            .active_sponsor(&key)
            .await?
            .ok_or_else(|| Error::NoActiveSponsor(key.to_string()))?;

        let created_at = now_millis();
        let id = generate_member_id(email, created_at);

        for attempt in 1..=MAX_PLACEMENT_ATTEMPTS {
            let (parent_id, degraded) = self.place_under(&sponsor_id).await?;

            let mut member = Member::new(id.clone(), email);
            member.username = request.username.trim().to_string();
            member.parent_id = Some(parent_id.clone());
            member.sponsor_id = Some(sponsor_id.clone());
            member.created_at = created_at;

            match self.storage.attach_member(&member) {
                Ok(()) => {
                    tracing::info!(
                        "Registered {} ({}) under {} sponsored by {}",
                        member.id,
                        member.email,
                        parent_id,
                        sponsor_id
                    );
                    return Ok(Registration {
                        member,
                        sponsor_id,
                        placement_degraded: degraded,
                    });
                }
                Err(Error::CapacityExceeded(full)) => {
                    tracing::warn!(
                        "Slot under {} taken during registration of {} (attempt {}/{})",
                        full,
                        email,
                        attempt,
                        MAX_PLACEMENT_ATTEMPTS
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::CapacityExceeded(sponsor_id))
    }

    /// Resolve a parent, widening the search once when the bounded one gives up.
    async fn place_under(&self, sponsor: &MemberId) -> Result<(MemberId, bool)> {
        match self.resolver.placement(sponsor).await? {
            Placement::Slot(parent) => Ok((parent, false)),
            Placement::Degraded(_) => {
                let config = self.resolver.config();
                let deep = config
                    .clone()
                    .with_max_visited(config.max_visited.saturating_mul(DEEP_SEARCH_FACTOR));
                match resolve_placement(self.storage.as_ref(), &deep, sponsor).await? {
                    Placement::Slot(parent) => Ok((parent, true)),
                    Placement::Degraded(fallback) => Err(Error::CapacityExceeded(fallback)),
                }
            }
        }
    }

    // --- Payments ---

    /// Open an upgrade payment to the payer's next tier.
    pub async fn submit_upgrade(
        &self,
        payer: &MemberId,
        receipt_url: Option<String>,
    ) -> Result<PaymentRecord> {
        let _guard = self.writes.lock().await;
        let payer = self.member(&payer.into())?;
        if payer.status != MemberStatus::Active {
            return Err(Error::Forbidden(format!("member {} is {}", payer.id, payer.status)));
        }
        let target = payer
            .level
            .next()
            .ok_or_else(|| Error::InvalidInput(format!("member {} is at the top tier", payer.id)))?;
        self.ensure_no_pending(&payer.id)?;

        let receiver = match self.resolver.beneficiary(&payer.id, target).await? {
            Beneficiary::Found(id) => id,
            Beneficiary::NoBeneficiary { last_checked } => {
                tracing::warn!(
                    "No {} beneficiary for {} (stopped at {})",
                    target,
                    payer.id,
                    last_checked
                );
                return Err(Error::NoBeneficiary { payer: payer.id, tier: target });
            }
        };

        let mut payment =
            PaymentRecord::new(payer.id, receiver, target, PaymentKind::Upgrade, now_millis());
        payment.receipt_url = receipt_url;
        self.storage.insert_payment(&payment)?;
        tracing::info!(
            "Upgrade payment {}: {} -> {} for {} (${})",
            payment.id,
            payment.sender_id,
            payment.receiver_id,
            target,
            payment.amount_usd
        );
        Ok(payment)
    }

    /// Open a restart payment for a member who completed a cycle.
    pub async fn submit_restart(
        &self,
        member: &MemberId,
        receipt_url: Option<String>,
    ) -> Result<PaymentRecord> {
        let _guard = self.writes.lock().await;
        let member = self.member(&member.into())?;
        if member.status != MemberStatus::Completed {
            return Err(Error::Forbidden(format!(
                "member {} is {}, not COMPLETED",
                member.id, member.status
            )));
        }
        self.ensure_no_pending(&member.id)?;

        let receiver = self.restart_receiver(&member).await?;
        let mut payment = PaymentRecord::new(
            member.id,
            receiver,
            Tier::Tier1,
            PaymentKind::Restart,
            now_millis(),
        );
        payment.receipt_url = receipt_url;
        self.storage.insert_payment(&payment)?;
        tracing::info!(
            "Restart payment {}: {} -> {}",
            payment.id,
            payment.sender_id,
            payment.receiver_id
        );
        Ok(payment)
    }

    async fn restart_receiver(&self, member: &Member) -> Result<MemberId> {
        let root = self.root_id().clone();
        let Some(sponsor) = &member.sponsor_id else {
            return Ok(root);
        };
        match self.resolver.active_sponsor(&sponsor.into()).await {
            Ok(Some(id)) => Ok(id),
            Ok(None) => Ok(root),
            Err(ternion_resolver::Error::NotFound(key)) => {
                tracing::warn!("Sponsor {} of {} is gone, paying the root", key, member.id);
                Ok(root)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_no_pending(&self, sender: &MemberId) -> Result<()> {
        let pending = self
            .storage
            .payments_sent(sender)?
            .into_iter()
            .find(PaymentRecord::is_pending);
        match pending {
            Some(p) => Err(Error::Conflict(format!("payment {} is still pending", p.id))),
            None => Ok(()),
        }
    }

    /// Payments a member sent or receives, oldest first.
    pub fn payments(&self, key: &MemberKey) -> Result<Vec<PaymentRecord>> {
        let member = self.member(key)?;
        self.storage.payments_for(&member.id)
    }

    /// Get a payment by id.
    pub fn payment(&self, id: &str) -> Result<PaymentRecord> {
        self.storage
            .get_payment(id)?
            .ok_or_else(|| Error::NotFound(format!("payment {}", id)))
    }

    /// Confirm receipt of a pending payment and apply its effects.
    ///
    /// The receiver is credited the amount. A top-tier receipt counts toward
    /// completing the receiver's cycle.
    pub async fn confirm_payment(&self, id: &str, confirmer: &MemberId) -> Result<PaymentRecord> {
        let _guard = self.writes.lock().await;
        let mut payment = self.decidable_payment(id, confirmer)?;
        let mut sender = self.member(&(&payment.sender_id).into())?;
        let mut receiver = self.member(&(&payment.receiver_id).into())?;
        let mut sender_changed = false;

        match payment.kind {
            PaymentKind::Upgrade => {
                if sender.level.next() == Some(payment.level_target) {
                    sender.level = payment.level_target;
                    sender_changed = true;
                } else {
                    tracing::warn!(
                        "Payment {} targets {} but {} is already {}",
                        payment.id,
                        payment.level_target,
                        sender.id,
                        sender.level
                    );
                }
            }
            PaymentKind::Restart => {
                if sender.status == MemberStatus::Completed {
                    sender.status = MemberStatus::Active;
                    sender.level = Tier::Tier1;
                    sender.cycle += 1;
                    sender.top_tier_receipts = 0;
                    sender_changed = true;
                } else {
                    tracing::warn!(
                        "Restart payment {} confirmed but {} is {}",
                        payment.id,
                        sender.id,
                        sender.status
                    );
                }
            }
        }

        receiver.earnings_usd += u64::from(payment.amount_usd);
        if payment.kind == PaymentKind::Upgrade && payment.level_target == Tier::TOP {
            receiver.top_tier_receipts += 1;
            if !receiver.is_root(self.root_id())
                && receiver.status == MemberStatus::Active
                && receiver.has_completed_cycle()
            {
                receiver.status = MemberStatus::Completed;
                receiver.cycle_history.push(CycleRecord {
                    cycle: receiver.cycle,
                    completed_at: now_millis(),
                    earnings_usd: receiver.earnings_usd,
                });
                tracing::info!("Member {} completed cycle {}", receiver.id, receiver.cycle);
            }
        }

        let mut changed = vec![receiver];
        if sender_changed {
            changed.push(sender);
        }

        payment.status = PaymentStatus::Confirmed;
        self.storage.commit_payment(&payment, &changed)?;
        tracing::info!("Payment {} confirmed by {}", payment.id, confirmer);
        Ok(payment)
    }

    /// Mark a pending payment as disputed.
    pub async fn dispute_payment(&self, id: &str, confirmer: &MemberId) -> Result<PaymentRecord> {
        let _guard = self.writes.lock().await;
        let mut payment = self.decidable_payment(id, confirmer)?;
        payment.status = PaymentStatus::Disputed;
        self.storage.commit_payment(&payment, &[])?;
        tracing::warn!("Payment {} disputed by {}", payment.id, confirmer);
        Ok(payment)
    }

    fn decidable_payment(&self, id: &str, confirmer: &MemberId) -> Result<PaymentRecord> {
        let payment = self.payment(id)?;
        if &payment.receiver_id != confirmer {
            return Err(Error::Forbidden(format!(
                "only {} can decide payment {}",
                payment.receiver_id, payment.id
            )));
        }
        if !payment.is_pending() {
            return Err(Error::Conflict(format!(
                "payment {} is already {:?}",
                payment.id, payment.status
            )));
        }
        Ok(payment)
    }

    // --- Administration ---

    /// Administrative suspension.
    pub async fn suspend(&self, key: &MemberKey) -> Result<Member> {
        let _guard = self.writes.lock().await;
        let member = self.member(key)?;
        self.write_status(member, MemberStatus::Inactive)
    }

    /// Lift a suspension.
    ///
    /// Only INACTIVE members can be reinstated. A member whose current cycle
    /// is complete goes back to COMPLETED; leaving that state takes a
    /// confirmed restart payment.
    pub async fn reinstate(&self, key: &MemberKey) -> Result<Member> {
        let _guard = self.writes.lock().await;
        let member = self.member(key)?;
        if member.status != MemberStatus::Inactive {
            return Err(Error::Conflict(format!(
                "member {} is {}, not INACTIVE",
                member.id, member.status
            )));
        }
        let restored = if !member.is_root(self.root_id()) && member.has_completed_cycle() {
            MemberStatus::Completed
        } else {
            MemberStatus::Active
        };
        self.write_status(member, restored)
    }

    fn write_status(&self, mut member: Member, status: MemberStatus) -> Result<Member> {
        if member.status != status {
            tracing::info!("Member {}: {} -> {}", member.id, member.status, status);
            member.status = status;
            self.storage.update_member(&member)?;
        }
        Ok(member)
    }
}

/// Derive a member id from the email and registration time.
pub fn generate_member_id(email: &str, created_at: u64) -> MemberId {
    let content = format!("{}:{}", ternion_tree::normalize_email(email), created_at);
    let hash = blake3::hash(content.as_bytes());
    MemberId::new(format!("mbr_{}", &hex::encode(hash.as_bytes())[..16]))
}
