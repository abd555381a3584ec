//! Payment tiers.
//!
//! Tiers are ordered by their numeric rank. The rank is used twice: as the
//! number of hops a tier payment travels up the tree, and as the minimum
//! level a member needs to receive it.

use crate::ParseError;
use std::fmt;
use std::str::FromStr;

/// A tier a member can be qualified at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Tier {
    /// Registered, nothing paid yet
    #[default]
    Guest,
    /// First paid tier
    Tier1,
    /// Second paid tier
    Tier2,
    /// Top tier
    Tier3,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Self; 4] = [Self::Guest, Self::Tier1, Self::Tier2, Self::Tier3];

    /// The highest tier.
    pub const TOP: Self = Self::Tier3;

    /// Numeric rank: GUEST=0, TIER1=1, TIER2=2, TIER3=3.
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Guest => 0,
            Self::Tier1 => 1,
            Self::Tier2 => 2,
            Self::Tier3 => 3,
        }
    }

    /// Tier for a numeric rank.
    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Self::Guest),
            1 => Some(Self::Tier1),
            2 => Some(Self::Tier2),
            3 => Some(Self::Tier3),
            _ => None,
        }
    }

    /// Hops up the tree a payment for this tier travels before compression.
    ///
    /// `None` for [`Tier::Guest`], which is never purchased.
    pub const fn hops(&self) -> Option<usize> {
        match self {
            Self::Guest => None,
            tier => Some(tier.rank() as usize),
        }
    }

    /// Price of the tier in whole US dollars.
    pub const fn price_usd(&self) -> u32 {
        match self {
            Self::Guest => 0,
            Self::Tier1 => 2,
            Self::Tier2 => 6,
            Self::Tier3 => 20,
        }
    }

    /// The next tier up, if any.
    pub const fn next(&self) -> Option<Self> {
        Self::from_rank(self.rank() + 1)
    }

    /// Whether a member at this level may receive a payment for `target`.
    pub fn covers(&self, target: Tier) -> bool {
        self.rank() >= target.rank()
    }

    /// Canonical upper-case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "GUEST",
            Self::Tier1 => "TIER1",
            Self::Tier2 => "TIER2",
            Self::Tier3 => "TIER3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ParseError;

    /// Accepts the canonical name in any case, or the numeric rank.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(rank) = s.parse::<u8>() {
            return Self::from_rank(rank).ok_or_else(|| ParseError::UnknownTier(s.to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownTier(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_ordered() {
        for pair in Tier::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].rank() + 1, pair[1].rank());
        }
    }

    #[test]
    fn hops_match_rank() {
        assert_eq!(Tier::Guest.hops(), None);
        assert_eq!(Tier::Tier1.hops(), Some(1));
        assert_eq!(Tier::Tier2.hops(), Some(2));
        assert_eq!(Tier::Tier3.hops(), Some(3));
    }

    #[test]
    fn next_stops_at_top() {
        assert_eq!(Tier::Guest.next(), Some(Tier::Tier1));
        assert_eq!(Tier::Tier2.next(), Some(Tier::Tier3));
        assert_eq!(Tier::Tier3.next(), None);
    }

    #[test]
    fn covers_is_at_least() {
        assert!(Tier::Tier2.covers(Tier::Tier1));
        assert!(Tier::Tier2.covers(Tier::Tier2));
        assert!(!Tier::Tier2.covers(Tier::Tier3));
        assert!(!Tier::Guest.covers(Tier::Tier1));
    }

    #[test]
    fn prices() {
        let prices: Vec<u32> = Tier::ALL.iter().map(Tier::price_usd).collect();
        assert_eq!(prices, vec![0, 2, 6, 20]);
    }

    #[test]
    fn parse_names_and_ranks() {
        assert_eq!("TIER2".parse::<Tier>().unwrap(), Tier::Tier2);
        assert_eq!("tier1".parse::<Tier>().unwrap(), Tier::Tier1);
        assert_eq!(" guest ".parse::<Tier>().unwrap(), Tier::Guest);
        assert_eq!("3".parse::<Tier>().unwrap(), Tier::Tier3);
        assert!("4".parse::<Tier>().is_err());
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for tier in Tier::ALL {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), tier);
        }
    }
}
