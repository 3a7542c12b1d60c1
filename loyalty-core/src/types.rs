//! Core record types for the loyalty ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (u64 token amounts, checked everywhere they move)
//!
//! Records are pure data; the engines in [`crate::engine`] own all behavior
//! that mutates them.

use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum program / merchant / rule name length
pub const MAX_NAME_LEN: usize = 32;
/// Maximum redemption offer name length
pub const MAX_OFFER_NAME_LEN: usize = 64;
/// Maximum description length
pub const MAX_DESCRIPTION_LEN: usize = 256;
/// Maximum avatar URL length
pub const MAX_AVATAR_LEN: usize = 128;
/// Maximum offer icon length
pub const MAX_ICON_LEN: usize = 32;
/// Maximum merchant category length
pub const MAX_CATEGORY_LEN: usize = 32;

/// Account identifier (wallet address, authority id, treasury id, mint id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get as bytes (for key derivation)
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a required name field against a maximum length
pub fn validate_name(name: &str, max_len: usize) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::NameEmpty);
    }
    if name.len() > max_len {
        return Err(crate::Error::NameTooLong);
    }
    Ok(())
}

/// Validate an optional text field (may be empty) against a maximum length
pub fn validate_text(text: &str, max_len: usize) -> crate::Result<()> {
    if text.len() > max_len {
        return Err(crate::Error::NameTooLong);
    }
    Ok(())
}

/// Loyalty program, one per authority
///
/// Holds the aggregate counters the whole ledger must stay consistent with:
/// `total_tokens_issued >= total_tokens_redeemed`, and `total_tokens_issued`
/// equals the sum of every merchant's `total_issued`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Program authority (admin)
    pub authority: AccountId,

    /// Platform treasury that receives issuance fees
    pub treasury: AccountId,

    /// Reward-token mint id
    pub mint: AccountId,

    /// Program name
    pub name: String,

    /// Total registered merchants
    pub total_merchants: u64,

    /// Total registered customers
    pub total_customers: u64,

    /// Total tokens ever issued
    pub total_tokens_issued: u64,

    /// Total tokens ever redeemed
    pub total_tokens_redeemed: u64,

    /// Total platform fees collected
    pub total_fees_collected: u64,

    /// Platform fee rate in basis points (500 = 5%)
    pub interest_rate: i16,

    /// Creation timestamp (unix seconds)
    pub created_at: i64,
}

/// Merchant profile and aggregate counters, keyed by (authority, program)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    /// Merchant wallet address
    pub authority: AccountId,

    /// Associated loyalty program authority
    pub program: AccountId,

    /// Business name
    pub name: String,

    /// Business description
    pub description: String,

    /// Avatar URL
    pub avatar_url: String,

    /// Business category
    pub category: String,

    /// Tokens per currency unit spent (e.g. 10 = 10 tokens per $1)
    pub reward_rate: u64,

    /// Total tokens issued by this merchant
    pub total_issued: u64,

    /// Total tokens redeemed at this merchant
    pub total_redeemed: u64,

    /// Active status
    pub is_active: bool,

    /// Registration timestamp
    pub created_at: i64,
}

/// Customer account, keyed by (wallet, program)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Customer wallet address
    pub wallet: AccountId,

    /// Associated loyalty program authority
    pub program: AccountId,

    /// Lifetime tokens earned
    pub total_earned: u64,

    /// Lifetime tokens redeemed
    pub total_redeemed: u64,

    /// Current tier
    pub tier: Tier,

    /// Number of transactions
    pub transaction_count: u64,

    /// Consecutive days active
    pub streak_days: u16,

    /// Last activity timestamp
    pub last_activity: i64,

    /// Registration timestamp
    pub joined_at: i64,
}

impl Customer {
    /// Spendable balance: lifetime earned minus lifetime redeemed
    pub fn available_balance(&self) -> u64 {
        self.total_earned.saturating_sub(self.total_redeemed)
    }
}

/// Reward rule category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleType {
    /// Standard earning rate
    BaseReward,
    /// 2x, 3x events
    BonusMultiplier,
    /// One-time bonus
    FirstPurchaseBonus,
    /// Referral rewards
    ReferralBonus,
    /// Tier-based multiplier
    TierBonus,
    /// Consecutive activity bonus
    StreakBonus,
}

/// Promotional reward rule, keyed by (merchant, rule_id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRule {
    /// Owning merchant authority
    pub merchant: AccountId,

    /// Rule ID (part of the storage key)
    pub rule_id: u64,

    /// Rule name
    pub name: String,

    /// Rule type
    pub rule_type: RuleType,

    /// Bonus multiplier (hundredths, 100 = 1x, 200 = 2x)
    pub multiplier: u64,

    /// Minimum purchase to trigger (in cents)
    pub min_purchase: u64,

    /// Active status
    pub is_active: bool,

    /// Start time (0 = immediate)
    pub start_time: i64,

    /// End time (0 = no expiry)
    pub end_time: i64,
}

/// What a redemption offer grants, with per-variant payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferType {
    /// Percentage discount on a purchase
    Discount {
        /// Discount percentage (0-100)
        percentage: u8,
    },
    /// A free product
    FreeProduct {
        /// Merchant-side product identifier
        product_id: String,
    },
    /// Cash back in the settlement currency's smallest unit
    Cashback {
        /// Amount returned
        amount: u64,
    },
    /// Access to an exclusive perk
    ExclusiveAccess {
        /// Kind of access granted
        access_type: String,
    },
    /// Merchant-defined offer
    Custom {
        /// Merchant-side type name
        type_name: String,
    },
}

/// Why an offer cannot be redeemed right now
///
/// Callers only ever see `OfferNotAvailable`; the specific cause is kept for
/// logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferUnavailable {
    /// The offer has been toggled off
    Inactive,
    /// The offer's expiration has passed
    Expired,
    /// The quantity limit has been reached
    SoldOut,
}

impl fmt::Display for OfferUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            OfferUnavailable::Inactive => "inactive",
            OfferUnavailable::Expired => "expired",
            OfferUnavailable::SoldOut => "sold out",
        };
        write!(f, "{}", reason)
    }
}

/// Redemption offer, keyed by (merchant, name)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionOffer {
    /// Owning merchant authority
    pub merchant: AccountId,

    /// Associated loyalty program authority
    pub program: AccountId,

    /// Offer name (part of the storage key)
    pub name: String,

    /// Offer description
    pub description: String,

    /// Display icon
    pub icon: String,

    /// Token cost
    pub cost: u64,

    /// What the offer grants
    pub offer_type: OfferType,

    /// Maximum redemptions (None = unlimited)
    pub quantity_limit: Option<u64>,

    /// Redemptions so far
    pub quantity_claimed: u64,

    /// Expiration timestamp (None = never)
    pub expiration: Option<i64>,

    /// Active status
    pub is_active: bool,

    /// Creation timestamp
    pub created_at: i64,
}

impl RedemptionOffer {
    /// Check whether the offer can be redeemed at `now`
    pub fn availability(&self, now: i64) -> std::result::Result<(), OfferUnavailable> {
        if !self.is_active {
            return Err(OfferUnavailable::Inactive);
        }

        if let Some(expiration) = self.expiration {
            if now >= expiration {
                return Err(OfferUnavailable::Expired);
            }
        }

        if let Some(limit) = self.quantity_limit {
            if self.quantity_claimed >= limit {
                return Err(OfferUnavailable::SoldOut);
            }
        }

        Ok(())
    }
}

/// Immutable redemption receipt, keyed by (customer, merchant, offer, seed)
///
/// Only `is_used` / `used_at` may change after creation, and only once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionVoucher {
    /// Redeeming customer wallet
    pub customer: AccountId,

    /// Merchant that owns the offer
    pub merchant: AccountId,

    /// Offer name at redemption time
    pub offer_name: String,

    /// Caller-supplied seed making the voucher key unique
    pub voucher_seed: u64,

    /// Merchant name snapshot
    pub merchant_name: String,

    /// Offer description snapshot
    pub offer_description: String,

    /// Tokens spent
    pub cost: u64,

    /// Unique human-presentable code (format: RV-XXXX-XXXX)
    pub redemption_code: String,

    /// Creation timestamp
    pub created_at: i64,

    /// Expiry timestamp
    pub expires_at: i64,

    /// Whether the voucher has been consumed
    pub is_used: bool,

    /// When the voucher was consumed (if it was)
    pub used_at: Option<i64>,
}

impl RedemptionVoucher {
    /// A voucher is valid while unused and unexpired
    pub fn is_valid(&self, now: i64) -> bool {
        !self.is_used && now < self.expires_at
    }

    /// Consume the voucher
    pub fn mark_as_used(&mut self, now: i64) {
        self.is_used = true;
        self.used_at = Some(now);
    }
}

/// Transaction direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Tokens issued to a customer
    Issue,
    /// Tokens redeemed by a customer
    Redeem,
}

/// Append-only transaction history entry, keyed by (customer, index)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Customer wallet
    pub customer: AccountId,

    /// Merchant involved
    pub merchant: AccountId,

    /// Issue or Redeem
    pub kind: TransactionKind,

    /// Token amount
    pub amount: u64,

    /// Customer tier at time of transaction (compact wire form)
    pub tier: u8,

    /// Timestamp
    pub timestamp: i64,

    /// Per-customer sequential index (for ordering)
    pub index: u64,
}

/// Merchant/customer relationship aggregate, one row per pair
///
/// Maintained in lockstep with the customer and merchant totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantCustomerRecord {
    /// Merchant authority
    pub merchant: AccountId,

    /// Customer wallet
    pub customer: AccountId,

    /// Total tokens issued to this customer by this merchant
    pub total_issued: u64,

    /// Total tokens redeemed by this customer at this merchant
    pub total_redeemed: u64,

    /// Number of transactions (issue + redeem)
    pub transaction_count: u64,

    /// First transaction timestamp
    pub first_transaction: i64,

    /// Last transaction timestamp
    pub last_transaction: i64,
}

/// Per-voucher redemption analytics row, keyed by (offer, customer, seed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRedemptionRecord {
    /// Offer name
    pub offer_name: String,

    /// Merchant that owns the offer
    pub merchant: AccountId,

    /// Redeeming customer wallet
    pub customer: AccountId,

    /// Voucher seed
    pub voucher_seed: u64,

    /// Tokens spent
    pub amount: u64,

    /// Redemption timestamp
    pub timestamp: i64,

    /// Whether the voucher has been consumed
    pub is_used: bool,

    /// When the voucher was consumed (if it was)
    pub used_at: Option<i64>,
}

/// Merchant registration profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantProfile {
    /// Business name
    pub name: String,
    /// Avatar URL
    pub avatar_url: String,
    /// Business category
    pub category: String,
    /// Business description (defaults to empty)
    pub description: Option<String>,
    /// Tokens per currency unit spent
    pub reward_rate: u64,
}

/// Per-field optional merchant update ("update if present, else keep")
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MerchantUpdate {
    /// New reward rate
    pub reward_rate: Option<u64>,
    /// New description
    pub description: Option<String>,
    /// New avatar URL
    pub avatar_url: Option<String>,
    /// New category
    pub category: Option<String>,
    /// New active status
    pub is_active: Option<bool>,
}

impl MerchantUpdate {
    /// Pure merge: validate each present field, return the updated record
    pub fn apply(self, merchant: &Merchant) -> crate::Result<Merchant> {
        let mut updated = merchant.clone();

        if let Some(rate) = self.reward_rate {
            if rate == 0 {
                return Err(crate::Error::InvalidRewardAmount);
            }
            updated.reward_rate = rate;
        }

        if let Some(description) = self.description {
            validate_text(&description, MAX_DESCRIPTION_LEN)?;
            updated.description = description;
        }

        if let Some(avatar_url) = self.avatar_url {
            validate_text(&avatar_url, MAX_AVATAR_LEN)?;
            updated.avatar_url = avatar_url;
        }

        if let Some(category) = self.category {
            validate_name(&category, MAX_CATEGORY_LEN)?;
            updated.category = category;
        }

        if let Some(is_active) = self.is_active {
            updated.is_active = is_active;
        }

        Ok(updated)
    }
}

/// Per-field optional reward-rule update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleUpdate {
    /// New name
    pub name: Option<String>,
    /// New rule type
    pub rule_type: Option<RuleType>,
    /// New multiplier
    pub multiplier: Option<u64>,
    /// New minimum purchase
    pub min_purchase: Option<u64>,
    /// New start time
    pub start_time: Option<i64>,
    /// New end time
    pub end_time: Option<i64>,
}

impl RuleUpdate {
    /// Pure merge: validate each present field, return the updated record
    ///
    /// The time-range check runs against the effective start time, so an
    /// update that moves both bounds is validated as a whole.
    pub fn apply(self, rule: &RewardRule) -> crate::Result<RewardRule> {
        let mut updated = rule.clone();

        if let Some(name) = self.name {
            validate_name(&name, MAX_NAME_LEN)?;
            updated.name = name;
        }

        if let Some(rule_type) = self.rule_type {
            updated.rule_type = rule_type;
        }

        if let Some(multiplier) = self.multiplier {
            if multiplier < 100 {
                return Err(crate::Error::InvalidRewardAmount);
            }
            updated.multiplier = multiplier;
        }

        if let Some(min_purchase) = self.min_purchase {
            updated.min_purchase = min_purchase;
        }

        if let Some(start_time) = self.start_time {
            updated.start_time = start_time;
        }

        if let Some(end_time) = self.end_time {
            updated.end_time = end_time;
        }

        crate::rules::validate_time_range(updated.start_time, updated.end_time)?;

        Ok(updated)
    }
}

/// Per-field optional redemption-offer update
///
/// `quantity_limit` and `expiration` are doubly optional: the outer `Option`
/// is "touch this field at all", the inner one is the new value (None clears
/// the limit / expiration).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferUpdate {
    /// New description
    pub description: Option<String>,
    /// New icon
    pub icon: Option<String>,
    /// New cost
    pub cost: Option<u64>,
    /// New offer type
    pub offer_type: Option<OfferType>,
    /// New quantity limit
    pub quantity_limit: Option<Option<u64>>,
    /// New expiration
    pub expiration: Option<Option<i64>>,
}

impl OfferUpdate {
    /// Pure merge: validate each present field, return the updated record
    pub fn apply(self, offer: &RedemptionOffer) -> crate::Result<RedemptionOffer> {
        let mut updated = offer.clone();

        if let Some(description) = self.description {
            validate_text(&description, MAX_DESCRIPTION_LEN)?;
            updated.description = description;
        }

        if let Some(icon) = self.icon {
            validate_text(&icon, MAX_ICON_LEN)?;
            updated.icon = icon;
        }

        if let Some(cost) = self.cost {
            if cost == 0 {
                return Err(crate::Error::InvalidRewardAmount);
            }
            updated.cost = cost;
        }

        if let Some(offer_type) = self.offer_type {
            updated.offer_type = offer_type;
        }

        if let Some(quantity_limit) = self.quantity_limit {
            updated.quantity_limit = quantity_limit;
        }

        if let Some(expiration) = self.expiration {
            updated.expiration = expiration;
        }

        Ok(updated)
    }
}
