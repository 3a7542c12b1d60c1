//! Engine events for the analytics collaborator
//!
//! Every committed state change publishes one event on a broadcast channel.
//! Events are fire-and-forget: a slow or absent subscriber never blocks the
//! engine, and the transaction history in storage remains the durable
//! record.

use crate::tier::Tier;
use crate::types::{AccountId, OfferType, RuleType};
use serde::Serialize;
use tokio::sync::broadcast;

/// Management action carried on rule/offer change events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Record created
    Created,
    /// Record fields updated
    Updated,
    /// Active status flipped
    Toggled,
    /// Record removed
    Deleted,
}

/// Events emitted by the engine after each committed request
#[derive(Debug, Clone, Serialize)]
pub enum EngineEvent {
    /// A merchant registered
    MerchantRegistered {
        /// Merchant authority
        merchant: AccountId,
        /// Business name
        name: String,
        /// Tokens per currency unit
        reward_rate: u64,
        /// Event timestamp
        timestamp: i64,
    },

    /// A merchant profile changed
    MerchantUpdated {
        /// Merchant authority
        merchant: AccountId,
        /// New reward rate, if changed
        reward_rate: Option<u64>,
        /// New active status, if changed
        is_active: Option<bool>,
        /// Event timestamp
        timestamp: i64,
    },

    /// A customer registered
    CustomerRegistered {
        /// Customer wallet
        customer: AccountId,
        /// Event timestamp
        timestamp: i64,
    },

    /// A reward rule was created, updated, toggled, or deleted
    RewardRuleChanged {
        /// Owning merchant authority
        merchant: AccountId,
        /// Rule ID
        rule_id: u64,
        /// Rule name
        name: String,
        /// Rule type
        rule_type: RuleType,
        /// Multiplier (hundredths)
        multiplier: u64,
        /// Active status after the change
        is_active: bool,
        /// What happened
        action: ChangeAction,
        /// Event timestamp
        timestamp: i64,
    },

    /// A redemption offer was created, updated, toggled, or deleted
    RedemptionOfferChanged {
        /// Owning merchant authority
        merchant: AccountId,
        /// Offer name
        name: String,
        /// Token cost
        cost: u64,
        /// What the offer grants
        offer_type: OfferType,
        /// Active status after the change
        is_active: bool,
        /// Redemptions so far
        quantity_claimed: u64,
        /// What happened
        action: ChangeAction,
        /// Event timestamp
        timestamp: i64,
    },

    /// Rewards were issued, with the full multiplier breakdown
    RewardsIssued {
        /// Issuing merchant authority
        merchant: AccountId,
        /// Receiving customer wallet
        customer: AccountId,
        /// Purchase amount in cents
        purchase_amount: u64,
        /// Reward before multipliers
        base_reward: u64,
        /// Tier multiplier applied (hundredths)
        tier_multiplier: u64,
        /// Rule multiplier applied (hundredths)
        rule_multiplier: u64,
        /// Whether a promotional rule applied
        rule_applied: bool,
        /// Name of the applied rule
        rule_name: Option<String>,
        /// Tokens credited to the customer
        final_reward: u64,
        /// Fee credited to the platform treasury
        platform_fee: u64,
        /// Customer tier after the issuance
        customer_tier: Tier,
        /// Event timestamp
        timestamp: i64,
    },

    /// Rewards were redeemed and a voucher created
    RewardsRedeemed {
        /// Redeeming customer wallet
        customer: AccountId,
        /// Merchant that owns the offer
        merchant: AccountId,
        /// Offer name
        offer_name: String,
        /// Tokens deducted
        amount: u64,
        /// Voucher code
        redemption_code: String,
        /// Voucher seed
        voucher_seed: u64,
        /// Event timestamp
        timestamp: i64,
    },

    /// A customer crossed a tier threshold
    TierUpgraded {
        /// Customer wallet
        customer: AccountId,
        /// Tier before the issuance
        old_tier: Tier,
        /// Tier after the issuance
        new_tier: Tier,
        /// Lifetime tokens earned
        total_earned: u64,
        /// Event timestamp
        timestamp: i64,
    },

    /// A voucher was consumed at the merchant
    VoucherUsed {
        /// Customer wallet
        customer: AccountId,
        /// Merchant authority
        merchant: AccountId,
        /// Offer name
        offer_name: String,
        /// Voucher code
        redemption_code: String,
        /// Event timestamp
        timestamp: i64,
    },
}

/// Create the engine's event channel
pub fn channel(capacity: usize) -> (broadcast::Sender<EngineEvent>, broadcast::Receiver<EngineEvent>) {
    broadcast::channel(capacity)
}
