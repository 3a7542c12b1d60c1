//! Reward rule evaluation
//!
//! Decides whether an optional promotional rule applies to a purchase and
//! with which multiplier. A referenced rule that is inactive or outside its
//! time window is an error; a purchase below the rule's minimum silently
//! falls back to the base multiplier, so under-threshold purchases still
//! earn the unboosted reward.

use crate::types::RewardRule;
use crate::{Error, Result};

/// Base multiplier when no rule applies (hundredths, 100 = 1.0x)
pub const BASE_MULTIPLIER: u64 = 100;

/// Result of evaluating a rule against a purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Multiplier to apply (hundredths)
    pub multiplier: u64,

    /// Whether the referenced rule actually applied
    pub applied: bool,

    /// Name of the applied rule, for the issuance breakdown
    pub rule_name: Option<String>,
}

impl RuleOutcome {
    /// Outcome when no rule reference was supplied or the rule did not match
    pub fn base() -> Self {
        Self {
            multiplier: BASE_MULTIPLIER,
            applied: false,
            rule_name: None,
        }
    }
}

/// Evaluate an optional rule against a purchase at `now`
pub fn evaluate(
    rule: Option<&RewardRule>,
    purchase_amount: u64,
    now: i64,
) -> Result<RuleOutcome> {
    let rule = match rule {
        Some(rule) => rule,
        None => return Ok(RuleOutcome::base()),
    };

    if !rule.is_active {
        return Err(Error::RuleNotActive);
    }
    if now < rule.start_time {
        return Err(Error::RuleNotActive);
    }
    if rule.end_time != 0 && now > rule.end_time {
        return Err(Error::RuleNotActive);
    }

    if purchase_amount < rule.min_purchase {
        tracing::debug!(
            rule = %rule.name,
            purchase_amount,
            min_purchase = rule.min_purchase,
            "Purchase below rule minimum, applying base multiplier"
        );
        return Ok(RuleOutcome::base());
    }

    Ok(RuleOutcome {
        multiplier: rule.multiplier,
        applied: true,
        rule_name: Some(rule.name.clone()),
    })
}

/// Validate a rule's time bounds: `end_time == 0` means unbounded
pub fn validate_time_range(start_time: i64, end_time: i64) -> Result<()> {
    if end_time != 0 && end_time <= start_time {
        return Err(Error::InvalidTimeRange);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, RuleType};

    fn test_rule() -> RewardRule {
        RewardRule {
            merchant: AccountId::new("merchant-1"),
            rule_id: 1,
            name: "Weekend 2x".to_string(),
            rule_type: RuleType::BonusMultiplier,
            multiplier: 200,
            min_purchase: 500,
            is_active: true,
            start_time: 100,
            end_time: 1_000,
        }
    }

    #[test]
    fn test_no_rule_is_base() {
        let outcome = evaluate(None, 1_000, 500).unwrap();
        assert_eq!(outcome, RuleOutcome::base());
    }

    #[test]
    fn test_applicable_rule() {
        let rule = test_rule();
        let outcome = evaluate(Some(&rule), 1_000, 500).unwrap();
        assert_eq!(outcome.multiplier, 200);
        assert!(outcome.applied);
        assert_eq!(outcome.rule_name.as_deref(), Some("Weekend 2x"));
    }

    #[test]
    fn test_inactive_rule_is_error() {
        let mut rule = test_rule();
        rule.is_active = false;
        assert!(matches!(
            evaluate(Some(&rule), 1_000, 500),
            Err(Error::RuleNotActive)
        ));
    }

    #[test]
    fn test_rule_outside_window_is_error() {
        let rule = test_rule();
        assert!(matches!(
            evaluate(Some(&rule), 1_000, 50),
            Err(Error::RuleNotActive)
        ));
        assert!(matches!(
            evaluate(Some(&rule), 1_000, 1_001),
            Err(Error::RuleNotActive)
        ));
    }

    #[test]
    fn test_unbounded_end_time() {
        let mut rule = test_rule();
        rule.end_time = 0;
        let outcome = evaluate(Some(&rule), 1_000, i64::MAX).unwrap();
        assert!(outcome.applied);
    }

    #[test]
    fn test_under_minimum_falls_back_silently() {
        let rule = test_rule();
        let outcome = evaluate(Some(&rule), 499, 500).unwrap();
        assert_eq!(outcome, RuleOutcome::base());
    }

    #[test]
    fn test_validate_time_range() {
        assert!(validate_time_range(100, 200).is_ok());
        assert!(validate_time_range(100, 0).is_ok());
        assert!(matches!(
            validate_time_range(200, 100),
            Err(Error::InvalidTimeRange)
        ));
        assert!(matches!(
            validate_time_range(100, 100),
            Err(Error::InvalidTimeRange)
        ));
    }
}
