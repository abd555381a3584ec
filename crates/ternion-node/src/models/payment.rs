//! Payment records.

use serde::{Deserialize, Serialize};
use ternion_tree::{MemberId, Tier};

/// Lifecycle of a peer-to-peer payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Reported by the sender, awaiting the receiver
    Pending,
    /// Receiver confirmed the funds arrived
    Confirmed,
    /// Receiver disputes the payment
    Disputed,
}

/// What a payment is for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    /// Buying the next tier
    Upgrade,
    /// Re-entering after a completed cycle
    Restart,
}

/// A payment from one member to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    /// Unique identifier
    pub id: String,

    /// Paying member
    pub sender_id: MemberId,

    /// Receiving member
    pub receiver_id: MemberId,

    /// Amount in whole US dollars
    pub amount_usd: u32,

    /// Current status
    pub status: PaymentStatus,

    /// Tier the sender reaches once confirmed
    pub level_target: Tier,

    /// Upgrade or restart
    pub kind: PaymentKind,

    /// Optional receipt reference supplied by the sender
    #[serde(default)]
    pub receipt_url: Option<String>,

    /// Creation time, unix milliseconds
    pub created_at: u64,
}

impl PaymentRecord {
    /// A pending payment for `level_target`, priced from the tier.
    pub fn new(
        sender_id: MemberId,
        receiver_id: MemberId,
        level_target: Tier,
        kind: PaymentKind,
        created_at: u64,
    ) -> Self {
        let id = Self::generate_id(&sender_id, &receiver_id, level_target, kind, created_at);
        Self {
            id,
            sender_id,
            receiver_id,
            amount_usd: level_target.price_usd(),
            status: PaymentStatus::Pending,
            level_target,
            kind,
            receipt_url: None,
            created_at,
        }
    }

    /// Derive an id from both parties, the tier, the kind and the time.
    ///
    /// Storage refuses to overwrite an id, so a collision surfaces as a
    /// conflict rather than a lost payment.
    pub fn generate_id(
        sender_id: &MemberId,
        receiver_id: &MemberId,
        level_target: Tier,
        kind: PaymentKind,
        created_at: u64,
    ) -> String {
        let content = format!(
            "{}:{}:{}:{:?}:{}",
            sender_id, receiver_id, level_target, kind, created_at
        );
        let hash = blake3::hash(content.as_bytes());
        format!("pay_{}", &hex::encode(hash.as_bytes())[..16])
    }

    /// Whether the payment still awaits a decision.
    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }
}
