//! Customer tier classification
//!
//! Tiers are derived purely from lifetime earned tokens. The classifier is
//! re-evaluated every time `total_earned` increases; it never downgrades on
//! the issuance path because lifetime earnings are monotonic.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifetime earnings where Silver starts
pub const SILVER_THRESHOLD: u64 = 1_000;
/// Lifetime earnings where Gold starts
pub const GOLD_THRESHOLD: u64 = 10_000;
/// Lifetime earnings where Platinum starts
pub const PLATINUM_THRESHOLD: u64 = 50_000;

/// Bronze multiplier (hundredths, 100 = 1.0x)
pub const BRONZE_MULTIPLIER: u64 = 100;
/// Silver multiplier (1.25x)
pub const SILVER_MULTIPLIER: u64 = 125;
/// Gold multiplier (1.5x)
pub const GOLD_MULTIPLIER: u64 = 150;
/// Platinum multiplier (2.0x)
pub const PLATINUM_MULTIPLIER: u64 = 200;

/// Customer tier, derived from lifetime earned tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// 0 - 999 lifetime tokens
    Bronze,
    /// 1,000 - 9,999
    Silver,
    /// 10,000 - 49,999
    Gold,
    /// 50,000+
    Platinum,
}

impl Tier {
    /// Reward multiplier for this tier (hundredths, 100 = 1.0x)
    pub fn multiplier(&self) -> u64 {
        match self {
            Tier::Bronze => BRONZE_MULTIPLIER,
            Tier::Silver => SILVER_MULTIPLIER,
            Tier::Gold => GOLD_MULTIPLIER,
            Tier::Platinum => PLATINUM_MULTIPLIER,
        }
    }

    /// Compact wire form used on transaction records
    pub fn as_u8(&self) -> u8 {
        match self {
            Tier::Bronze => 0,
            Tier::Silver => 1,
            Tier::Gold => 2,
            Tier::Platinum => 3,
        }
    }

    /// Decode the compact wire form
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Tier::Bronze),
            1 => Ok(Tier::Silver),
            2 => Ok(Tier::Gold),
            3 => Ok(Tier::Platinum),
            other => Err(Error::InvalidTier(other)),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
        };
        write!(f, "{}", name)
    }
}

/// Classify a lifetime-earned total into a tier
pub fn tier_of(total_earned: u64) -> Tier {
    match total_earned {
        0..=999 => Tier::Bronze,
        1_000..=9_999 => Tier::Silver,
        10_000..=49_999 => Tier::Gold,
        _ => Tier::Platinum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(tier_of(0), Tier::Bronze);
        assert_eq!(tier_of(999), Tier::Bronze);
        assert_eq!(tier_of(SILVER_THRESHOLD), Tier::Silver);
        assert_eq!(tier_of(9_999), Tier::Silver);
        assert_eq!(tier_of(GOLD_THRESHOLD), Tier::Gold);
        assert_eq!(tier_of(49_999), Tier::Gold);
        assert_eq!(tier_of(PLATINUM_THRESHOLD), Tier::Platinum);
        assert_eq!(tier_of(u64::MAX), Tier::Platinum);
    }

    #[test]
    fn test_tier_multipliers() {
        assert_eq!(Tier::Bronze.multiplier(), 100);
        assert_eq!(Tier::Silver.multiplier(), 125);
        assert_eq!(Tier::Gold.multiplier(), 150);
        assert_eq!(Tier::Platinum.multiplier(), 200);
    }

    #[test]
    fn test_tier_wire_form_round_trip() {
        for tier in [Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Platinum] {
            assert_eq!(Tier::from_u8(tier.as_u8()).unwrap(), tier);
        }
    }

    #[test]
    fn test_tier_wire_form_rejects_unknown() {
        assert!(matches!(Tier::from_u8(4), Err(Error::InvalidTier(4))));
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Bronze < Tier::Silver);
        assert!(Tier::Silver < Tier::Gold);
        assert!(Tier::Gold < Tier::Platinum);
    }
}
