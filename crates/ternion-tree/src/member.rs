//! Members of the placement tree.

use crate::{ParseError, Tier};
use std::fmt;
use std::str::FromStr;

/// Primary identifier of a member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct MemberId(String);

impl MemberId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A lookup key for a member: either the primary id or the email address.
///
/// Sponsor references typed in by people may use either form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberKey {
    /// Primary id
    Id(MemberId),
    /// Email address, normalized to lower case
    Email(String),
}

impl MemberKey {
    /// Parse a free-form reference. Anything containing `@` is an email.
    pub fn parse(reference: &str) -> Result<Self, ParseError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ParseError::EmptyKey);
        }
        if reference.contains('@') {
            Ok(Self::email(reference))
        } else {
            Ok(Self::Id(MemberId::new(reference)))
        }
    }

    /// Email key with normalization applied.
    pub fn email(email: &str) -> Self {
        Self::Email(normalize_email(email))
    }
}

impl From<MemberId> for MemberKey {
    fn from(id: MemberId) -> Self {
        Self::Id(id)
    }
}

impl From<&MemberId> for MemberKey {
    fn from(id: &MemberId) -> Self {
        Self::Id(id.clone())
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{}", id),
            Self::Email(email) => write!(f, "email:{}", email),
        }
    }
}

/// Canonical form of an email address used as a lookup key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Standing of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum MemberStatus {
    /// In good standing; can sponsor and receive
    #[default]
    Active,
    /// Received every top-tier payment of the current cycle
    Completed,
    /// Suspended or opted out
    Inactive,
}

impl MemberStatus {
    /// Canonical upper-case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Active, Self::Completed, Self::Inactive]
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::UnknownStatus(s.to_string()))
    }
}

/// A participant node in the placement tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Member {
    /// Unique, immutable identifier
    pub id: MemberId,

    /// Alternate lookup key (normalized)
    pub email: String,

    /// Display name
    #[cfg_attr(feature = "serde", serde(default))]
    pub username: String,

    /// Structural parent; `None` only for the root
    pub parent_id: Option<MemberId>,

    /// Who referred this member
    pub sponsor_id: Option<MemberId>,

    /// Highest tier paid for in the current cycle
    #[cfg_attr(feature = "serde", serde(default))]
    pub level: Tier,

    /// Current standing
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: MemberStatus,

    /// Cycle counter, starting at 1
    #[cfg_attr(feature = "serde", serde(default = "first_cycle"))]
    pub cycle: u32,

    /// Top-tier payments received in the current cycle
    #[cfg_attr(feature = "serde", serde(default))]
    pub top_tier_receipts: u32,

    /// Total confirmed payments received, in whole US dollars
    #[cfg_attr(feature = "serde", serde(default))]
    pub earnings_usd: u64,

    /// One entry per completed cycle, oldest first
    #[cfg_attr(feature = "serde", serde(default))]
    pub cycle_history: Vec<CycleRecord>,

    /// Creation time, unix milliseconds
    #[cfg_attr(feature = "serde", serde(default))]
    pub created_at: u64,
}

/// A completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CycleRecord {
    /// The cycle that completed
    pub cycle: u32,
    /// When it completed, unix milliseconds
    pub completed_at: u64,
    /// The member's total earnings at that point
    pub earnings_usd: u64,
}

#[cfg(feature = "serde")]
fn first_cycle() -> u32 {
    1
}

impl Member {
    /// A freshly registered member: GUEST, ACTIVE, first cycle, unplaced.
    pub fn new(id: MemberId, email: &str) -> Self {
        Self {
            id,
            email: normalize_email(email),
            username: String::new(),
            parent_id: None,
            sponsor_id: None,
            level: Tier::Guest,
            status: MemberStatus::Active,
            cycle: 1,
            top_tier_receipts: 0,
            earnings_usd: 0,
            cycle_history: Vec::new(),
            created_at: 0,
        }
    }

    /// Whether the current cycle has received every top-tier payment.
    pub fn has_completed_cycle(&self) -> bool {
        self.top_tier_receipts >= crate::COMPLETION_RECEIPTS
    }

    /// Whether this member is the configured root.
    pub fn is_root(&self, root_id: &MemberId) -> bool {
        &self.id == root_id
    }

    /// Whether this member can currently sponsor a registration or restart.
    ///
    /// The root always can.
    pub fn is_active_sponsor(&self, root_id: &MemberId) -> bool {
        self.is_root(root_id) || self.status == MemberStatus::Active
    }

    /// Whether this member may receive a payment for `target`.
    ///
    /// The root qualifies for every tier unless it has been suspended.
    /// Everyone else must be ACTIVE and leveled at least at `target`.
    pub fn can_receive(&self, target: Tier, root_id: &MemberId) -> bool {
        if self.is_root(root_id) {
            return self.status != MemberStatus::Inactive;
        }
        self.status == MemberStatus::Active && self.level.covers(target)
    }
}

/// The `(id, parent_id)` pair returned by batched child queries.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChildLink {
    /// The child
    pub id: MemberId,
    /// Its structural parent
    pub parent_id: MemberId,
}

impl ChildLink {
    /// Create a link.
    pub fn new(id: impl Into<MemberId>, parent_id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn root() -> MemberId {
        MemberId::from("root")
    }

    fn member(id: &str, level: Tier, status: MemberStatus) -> Member {
        let mut m = Member::new(id.into(), &format!("{}@example.com", id));
        m.level = level;
        m.status = status;
        m
    }

    #[test]
    fn new_member_defaults() {
        let m = Member::new("a".into(), "  Alice@Example.COM ");
        assert_eq!(m.email, "alice@example.com");
        assert_eq!(m.level, Tier::Guest);
        assert_eq!(m.status, MemberStatus::Active);
        assert_eq!(m.cycle, 1);
        assert!(m.parent_id.is_none());
    }

    #[test]
    fn completion_follows_receipts() {
        let mut m = member("a", Tier::Tier3, MemberStatus::Active);
        m.top_tier_receipts = crate::COMPLETION_RECEIPTS - 1;
        assert!(!m.has_completed_cycle());
        m.top_tier_receipts += 1;
        assert!(m.has_completed_cycle());
    }

    #[test]
    fn key_parsing() {
        assert_eq!(
            MemberKey::parse("usr_42").unwrap(),
            MemberKey::Id(MemberId::from("usr_42"))
        );
        assert_eq!(
            MemberKey::parse(" Bob@Mail.com").unwrap(),
            MemberKey::Email("bob@mail.com".into())
        );
        assert_eq!(MemberKey::parse("   "), Err(ParseError::EmptyKey));
    }

    #[test]
    fn status_parsing() {
        assert_eq!("completed".parse::<MemberStatus>().unwrap(), MemberStatus::Completed);
        assert!("gone".parse::<MemberStatus>().is_err());
    }

    #[test]
    fn root_qualifies_unless_inactive() {
        let mut r = member("root", Tier::Guest, MemberStatus::Completed);
        assert!(r.can_receive(Tier::Tier3, &root()));
        r.status = MemberStatus::Inactive;
        assert!(!r.can_receive(Tier::Tier1, &root()));
    }

    #[test]
    fn completed_member_cannot_receive() {
        let m = member("a", Tier::Tier3, MemberStatus::Completed);
        assert!(!m.can_receive(Tier::Tier1, &root()));
    }

    #[test]
    fn active_sponsor_rules() {
        assert!(member("a", Tier::Guest, MemberStatus::Active).is_active_sponsor(&root()));
        assert!(!member("a", Tier::Tier3, MemberStatus::Inactive).is_active_sponsor(&root()));
        assert!(member("root", Tier::Guest, MemberStatus::Inactive).is_active_sponsor(&root()));
    }

    fn any_tier() -> impl Strategy<Value = Tier> {
        (0u8..=3).prop_map(|r| Tier::from_rank(r).unwrap())
    }

    fn any_status() -> impl Strategy<Value = MemberStatus> {
        prop_oneof![
            Just(MemberStatus::Active),
            Just(MemberStatus::Completed),
            Just(MemberStatus::Inactive),
        ]
    }

    proptest! {
        #[test]
        fn non_root_receiver_is_active_and_leveled(
            level in any_tier(),
            status in any_status(),
            target in any_tier(),
        ) {
            let m = member("a", level, status);
            if m.can_receive(target, &root()) {
                prop_assert_eq!(m.status, MemberStatus::Active);
                prop_assert!(m.level.rank() >= target.rank());
            }
        }
    }
}
