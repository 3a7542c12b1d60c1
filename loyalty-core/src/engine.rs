//! Reward issuance and redemption engines
//!
//! All balance-moving operations live here. Every operation follows the same
//! shape: load the touched records, validate, compute the new record states
//! on copies, stage everything (including history rows) into one
//! [`Batch`], and commit it atomically. A failed precondition or a checked
//! arithmetic overflow returns before anything is staged, so no partial
//! mutation is ever observable.
//!
//! The engine performs no retries; a failed request returns a specific error
//! and the caller decides whether to resubmit.

use crate::codes;
use crate::events::{ChangeAction, EngineEvent};
use crate::metrics::Metrics;
use crate::recorder::Recorder;
use crate::rules;
use crate::storage::{Batch, Storage};
use crate::tier::{tier_of, Tier};
use crate::types::{
    validate_name, validate_text, AccountId, Customer, Merchant, MerchantCustomerRecord,
    MerchantProfile, MerchantUpdate, OfferType, OfferUpdate, Program, RedemptionOffer,
    RedemptionVoucher, RewardRule, RuleType, RuleUpdate, TransactionKind, TransactionRecord,
    MAX_DESCRIPTION_LEN, MAX_AVATAR_LEN, MAX_CATEGORY_LEN, MAX_ICON_LEN, MAX_NAME_LEN,
    MAX_OFFER_NAME_LEN,
};
use crate::{Config, Error, Result};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Divisor for percentage-scaled multipliers (100 = 1.0x)
pub const PERCENTAGE_DIVISOR: u64 = 100;

/// Divisor for basis-point rates (10_000 = 100%)
pub const BASIS_POINTS: u64 = 10_000;

/// Maximum platform fee rate (basis points)
pub const MAX_INTEREST_RATE_BPS: i16 = 10_000;

/// Derive the reward-token mint id for a program
///
/// Pure: the same authority always resolves to the same mint id.
pub fn derive_mint_id(authority: &AccountId) -> AccountId {
    AccountId::new(format!("mint:{}", authority))
}

/// Reward rule creation parameters
#[derive(Debug, Clone)]
pub struct RuleParams {
    /// Rule ID (part of the storage key)
    pub rule_id: u64,
    /// Rule name
    pub name: String,
    /// Rule type
    pub rule_type: RuleType,
    /// Bonus multiplier (hundredths, >= 100)
    pub multiplier: u64,
    /// Minimum purchase to trigger (cents)
    pub min_purchase: u64,
    /// Start time (0 = immediate)
    pub start_time: i64,
    /// End time (0 = no expiry)
    pub end_time: i64,
}

/// Redemption offer creation parameters
#[derive(Debug, Clone)]
pub struct OfferParams {
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
    /// Expiration timestamp (None = never)
    pub expiration: Option<i64>,
}

/// A reward issuance request
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Issuing merchant authority (the caller)
    pub merchant: AccountId,
    /// Program authority
    pub program: AccountId,
    /// Receiving customer wallet
    pub customer: AccountId,
    /// Purchase amount in cents (e.g. 1000 = $10.00)
    pub purchase_amount: u64,
    /// Optional promotional rule to apply
    pub rule_id: Option<u64>,
    /// Caller's view of the platform treasury receiving the fee
    pub treasury: AccountId,
}

/// A redemption request
#[derive(Debug, Clone)]
pub struct RedeemRequest {
    /// Redeeming customer wallet (the caller)
    pub customer: AccountId,
    /// Program authority
    pub program: AccountId,
    /// Merchant that owns the offer
    pub merchant: AccountId,
    /// Offer name
    pub offer_name: String,
    /// Tokens to spend
    pub amount: u64,
    /// Caller-supplied seed; resubmitting the same seed is rejected as a
    /// duplicate, never double-deducted
    pub voucher_seed: u64,
    /// Caller's view of the reward-token mint
    pub mint: AccountId,
}

/// The result of a reward issuance, with the full multiplier breakdown
#[derive(Debug, Clone, serde::Serialize)]
pub struct RewardBreakdown {
    /// Purchase amount in cents
    pub purchase_amount: u64,
    /// Reward before multipliers
    pub base_reward: u64,
    /// Rule multiplier applied (hundredths)
    pub rule_multiplier: u64,
    /// Whether a promotional rule applied
    pub rule_applied: bool,
    /// Name of the applied rule
    pub rule_name: Option<String>,
    /// Tier multiplier applied (hundredths)
    pub tier_multiplier: u64,
    /// The tier that priced this reward (held going into the purchase)
    pub tier: Tier,
    /// Tokens credited to the customer
    pub final_reward: u64,
    /// Fee credited to the platform treasury
    pub platform_fee: u64,
    /// Tier after the issuance, when the purchase crossed a threshold
    pub upgraded_to: Option<Tier>,
}

/// The loyalty ledger engine
///
/// Must be driven by a single writer; the actor in [`crate::actor`] owns the
/// engine and serializes all requests through its mailbox.
pub struct Engine {
    storage: Arc<Storage>,
    recorder: Recorder,
    config: Config,
    metrics: Metrics,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Create an engine over the shared store
    pub fn new(
        storage: Arc<Storage>,
        config: Config,
        metrics: Metrics,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        let recorder = Recorder::new(storage.clone());
        Self {
            storage,
            recorder,
            config,
            metrics,
            events,
        }
    }

    fn publish(&self, event: EngineEvent) {
        // Nobody listening is fine; history in storage is the durable record
        let _ = self.events.send(event);
    }

    // Program operations

    /// Initialize a loyalty program for an authority
    pub fn initialize_program(
        &self,
        authority: &AccountId,
        name: &str,
        interest_rate_bps: Option<i16>,
        now: i64,
    ) -> Result<Program> {
        validate_name(name, MAX_NAME_LEN)?;

        let rate = interest_rate_bps.unwrap_or(self.config.default_interest_rate_bps);
        if !(0..=MAX_INTEREST_RATE_BPS).contains(&rate) {
            return Err(Error::InvalidInterestRate);
        }

        if self.storage.try_get_program(authority)?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "program",
                key: authority.to_string(),
            });
        }

        let program = Program {
            authority: authority.clone(),
            treasury: authority.clone(),
            mint: derive_mint_id(authority),
            name: name.to_string(),
            total_merchants: 0,
            total_customers: 0,
            total_tokens_issued: 0,
            total_tokens_redeemed: 0,
            total_fees_collected: 0,
            interest_rate: rate,
            created_at: now,
        };

        let mut batch = Batch::new();
        batch.put_program(&program)?;
        self.storage.commit(batch)?;

        tracing::info!(program = %authority, name, rate, "Loyalty program initialized");

        Ok(program)
    }

    // Merchant operations

    /// Register a merchant under a program
    pub fn register_merchant(
        &self,
        authority: &AccountId,
        program: &AccountId,
        profile: MerchantProfile,
        now: i64,
    ) -> Result<Merchant> {
        validate_name(&profile.name, MAX_NAME_LEN)?;
        validate_text(&profile.avatar_url, MAX_AVATAR_LEN)?;
        validate_name(&profile.category, MAX_CATEGORY_LEN)?;
        let description = profile.description.unwrap_or_default();
        validate_text(&description, MAX_DESCRIPTION_LEN)?;
        if profile.reward_rate == 0 {
            return Err(Error::InvalidRewardAmount);
        }

        let mut program_record = self.storage.get_program(program)?;

        if self.storage.try_get_merchant(program, authority)?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "merchant",
                key: authority.to_string(),
            });
        }

        let merchant = Merchant {
            authority: authority.clone(),
            program: program.clone(),
            name: profile.name,
            description,
            avatar_url: profile.avatar_url,
            category: profile.category,
            reward_rate: profile.reward_rate,
            total_issued: 0,
            total_redeemed: 0,
            is_active: true,
            created_at: now,
        };

        program_record.total_merchants = program_record
            .total_merchants
            .checked_add(1)
            .ok_or(Error::Overflow)?;

        let mut batch = Batch::new();
        batch.put_merchant(&merchant)?;
        batch.put_program(&program_record)?;
        self.storage.commit(batch)?;

        tracing::info!(
            merchant = %authority,
            name = %merchant.name,
            reward_rate = merchant.reward_rate,
            "Merchant registered"
        );

        self.publish(EngineEvent::MerchantRegistered {
            merchant: authority.clone(),
            name: merchant.name.clone(),
            reward_rate: merchant.reward_rate,
            timestamp: now,
        });

        Ok(merchant)
    }

    /// Update a merchant profile, per-field
    pub fn update_merchant(
        &self,
        authority: &AccountId,
        program: &AccountId,
        update: MerchantUpdate,
        now: i64,
    ) -> Result<Merchant> {
        let merchant = self.storage.get_merchant(program, authority)?;

        let reward_rate = update.reward_rate;
        let is_active = update.is_active;
        let updated = update.apply(&merchant)?;

        let mut batch = Batch::new();
        batch.put_merchant(&updated)?;
        self.storage.commit(batch)?;

        tracing::info!(merchant = %authority, "Merchant updated");

        self.publish(EngineEvent::MerchantUpdated {
            merchant: authority.clone(),
            reward_rate,
            is_active,
            timestamp: now,
        });

        Ok(updated)
    }

    /// Close a merchant account
    ///
    /// Refused while the merchant still has active reward rules; remaining
    /// inactive rules and offers are removed in the same commit.
    pub fn close_merchant(&self, authority: &AccountId, program: &AccountId) -> Result<()> {
        let merchant = self.storage.get_merchant(program, authority)?;
        let mut program_record = self.storage.get_program(program)?;

        let remaining_rules = self.storage.rules_for_merchant(program, authority)?;
        if remaining_rules.iter().any(|rule| rule.is_active) {
            return Err(Error::MerchantHasActiveRules);
        }

        program_record.total_merchants = program_record.total_merchants.saturating_sub(1);

        let mut batch = Batch::new();
        batch.delete_merchant(program, authority);
        for rule in &remaining_rules {
            batch.delete_rule(program, authority, rule.rule_id);
        }
        for offer in self.storage.offers_for_merchant(program, authority)? {
            batch.delete_offer(program, authority, &offer.name);
        }
        batch.put_program(&program_record)?;
        self.storage.commit(batch)?;

        tracing::info!(merchant = %authority, name = %merchant.name, "Merchant closed");

        Ok(())
    }

    // Customer operations

    /// Register a customer under a program
    pub fn register_customer(
        &self,
        wallet: &AccountId,
        program: &AccountId,
        now: i64,
    ) -> Result<Customer> {
        let mut program_record = self.storage.get_program(program)?;

        if self.storage.try_get_customer(program, wallet)?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "customer",
                key: wallet.to_string(),
            });
        }

        let customer = Customer {
            wallet: wallet.clone(),
            program: program.clone(),
            total_earned: 0,
            total_redeemed: 0,
            tier: Tier::Bronze,
            transaction_count: 0,
            streak_days: 0,
            last_activity: now,
            joined_at: now,
        };

        program_record.total_customers = program_record
            .total_customers
            .checked_add(1)
            .ok_or(Error::Overflow)?;

        let mut batch = Batch::new();
        batch.put_customer(&customer)?;
        batch.put_program(&program_record)?;
        self.storage.commit(batch)?;

        tracing::info!(customer = %wallet, "Customer registered with Bronze tier");

        self.publish(EngineEvent::CustomerRegistered {
            customer: wallet.clone(),
            timestamp: now,
        });

        Ok(customer)
    }

    // Reward rule operations

    /// Create a reward rule for a merchant
    pub fn set_reward_rule(
        &self,
        authority: &AccountId,
        program: &AccountId,
        params: RuleParams,
        now: i64,
    ) -> Result<RewardRule> {
        // Merchant must exist; rule creation is allowed while paused
        self.storage.get_merchant(program, authority)?;

        validate_name(&params.name, MAX_NAME_LEN)?;
        if params.multiplier < 100 {
            return Err(Error::InvalidRewardAmount);
        }
        rules::validate_time_range(params.start_time, params.end_time)?;

        if self
            .storage
            .try_get_rule(program, authority, params.rule_id)?
            .is_some()
        {
            return Err(Error::AlreadyExists {
                kind: "reward rule",
                key: format!("{}/{}", authority, params.rule_id),
            });
        }

        let rule = RewardRule {
            merchant: authority.clone(),
            rule_id: params.rule_id,
            name: params.name,
            rule_type: params.rule_type,
            multiplier: params.multiplier,
            min_purchase: params.min_purchase,
            is_active: true,
            start_time: params.start_time,
            end_time: params.end_time,
        };

        let mut batch = Batch::new();
        batch.put_rule(program, &rule)?;
        self.storage.commit(batch)?;

        tracing::info!(
            merchant = %authority,
            rule_id = rule.rule_id,
            name = %rule.name,
            multiplier = rule.multiplier,
            "Reward rule created"
        );

        self.publish(rule_event(&rule, ChangeAction::Created, now));

        Ok(rule)
    }

    /// Update a reward rule, per-field
    pub fn update_reward_rule(
        &self,
        authority: &AccountId,
        program: &AccountId,
        rule_id: u64,
        update: RuleUpdate,
        now: i64,
    ) -> Result<RewardRule> {
        let rule = self.storage.get_rule(program, authority, rule_id)?;
        let updated = update.apply(&rule)?;

        let mut batch = Batch::new();
        batch.put_rule(program, &updated)?;
        self.storage.commit(batch)?;

        tracing::info!(merchant = %authority, rule_id, "Reward rule updated");

        self.publish(rule_event(&updated, ChangeAction::Updated, now));

        Ok(updated)
    }

    /// Set a reward rule's active status
    pub fn toggle_reward_rule(
        &self,
        authority: &AccountId,
        program: &AccountId,
        rule_id: u64,
        is_active: bool,
        now: i64,
    ) -> Result<RewardRule> {
        let mut rule = self.storage.get_rule(program, authority, rule_id)?;
        rule.is_active = is_active;

        let mut batch = Batch::new();
        batch.put_rule(program, &rule)?;
        self.storage.commit(batch)?;

        tracing::info!(
            merchant = %authority,
            rule_id,
            is_active,
            "Reward rule toggled"
        );

        self.publish(rule_event(&rule, ChangeAction::Toggled, now));

        Ok(rule)
    }

    /// Delete a reward rule
    pub fn delete_reward_rule(
        &self,
        authority: &AccountId,
        program: &AccountId,
        rule_id: u64,
        now: i64,
    ) -> Result<()> {
        let rule = self.storage.get_rule(program, authority, rule_id)?;

        let mut batch = Batch::new();
        batch.delete_rule(program, authority, rule_id);
        self.storage.commit(batch)?;

        tracing::info!(merchant = %authority, rule_id, "Reward rule deleted");

        self.publish(rule_event(&rule, ChangeAction::Deleted, now));

        Ok(())
    }

    // Redemption offer operations

    /// Create a redemption offer for a merchant
    pub fn create_redemption_offer(
        &self,
        authority: &AccountId,
        program: &AccountId,
        params: OfferParams,
        now: i64,
    ) -> Result<RedemptionOffer> {
        let merchant = self.storage.get_merchant(program, authority)?;
        if !merchant.is_active {
            return Err(Error::MerchantNotActive);
        }

        validate_name(&params.name, MAX_OFFER_NAME_LEN)?;
        validate_text(&params.description, MAX_DESCRIPTION_LEN)?;
        validate_text(&params.icon, MAX_ICON_LEN)?;
        if params.cost == 0 {
            return Err(Error::InvalidRewardAmount);
        }

        if self
            .storage
            .try_get_offer(program, authority, &params.name)?
            .is_some()
        {
            return Err(Error::AlreadyExists {
                kind: "redemption offer",
                key: format!("{}/{}", authority, params.name),
            });
        }

        let offer = RedemptionOffer {
            merchant: authority.clone(),
            program: program.clone(),
            name: params.name,
            description: params.description,
            icon: params.icon,
            cost: params.cost,
            offer_type: params.offer_type,
            quantity_limit: params.quantity_limit,
            quantity_claimed: 0,
            expiration: params.expiration,
            is_active: true,
            created_at: now,
        };

        let mut batch = Batch::new();
        batch.put_offer(&offer)?;
        self.storage.commit(batch)?;

        tracing::info!(
            merchant = %authority,
            offer = %offer.name,
            cost = offer.cost,
            "Redemption offer created"
        );

        self.publish(offer_event(&offer, ChangeAction::Created, now));

        Ok(offer)
    }

    /// Update a redemption offer, per-field
    pub fn update_redemption_offer(
        &self,
        authority: &AccountId,
        program: &AccountId,
        name: &str,
        update: OfferUpdate,
        now: i64,
    ) -> Result<RedemptionOffer> {
        let offer = self.storage.get_offer(program, authority, name)?;
        let updated = update.apply(&offer)?;

        let mut batch = Batch::new();
        batch.put_offer(&updated)?;
        self.storage.commit(batch)?;

        tracing::info!(merchant = %authority, offer = %name, "Redemption offer updated");

        self.publish(offer_event(&updated, ChangeAction::Updated, now));

        Ok(updated)
    }

    /// Flip a redemption offer's active status
    pub fn toggle_redemption_offer(
        &self,
        authority: &AccountId,
        program: &AccountId,
        name: &str,
        now: i64,
    ) -> Result<RedemptionOffer> {
        let mut offer = self.storage.get_offer(program, authority, name)?;
        offer.is_active = !offer.is_active;

        let mut batch = Batch::new();
        batch.put_offer(&offer)?;
        self.storage.commit(batch)?;

        tracing::info!(
            merchant = %authority,
            offer = %name,
            is_active = offer.is_active,
            "Redemption offer toggled"
        );

        self.publish(offer_event(&offer, ChangeAction::Toggled, now));

        Ok(offer)
    }

    /// Delete a redemption offer
    pub fn delete_redemption_offer(
        &self,
        authority: &AccountId,
        program: &AccountId,
        name: &str,
        now: i64,
    ) -> Result<()> {
        let offer = self.storage.get_offer(program, authority, name)?;

        let mut batch = Batch::new();
        batch.delete_offer(program, authority, name);
        self.storage.commit(batch)?;

        tracing::info!(merchant = %authority, offer = %name, "Redemption offer deleted");

        self.publish(offer_event(&offer, ChangeAction::Deleted, now));

        Ok(())
    }

    // Issuance engine

    /// Issue rewards for a purchase
    ///
    /// The tier multiplier reflects the tier the customer held going into
    /// the purchase: a purchase that crosses a threshold is rewarded at the
    /// old tier and the upgrade becomes visible afterward.
    pub fn issue_rewards(&self, request: IssueRequest, now: i64) -> Result<RewardBreakdown> {
        let mut program = self.storage.get_program(&request.program)?;
        if request.treasury != program.treasury {
            return Err(Error::InvalidTreasury);
        }

        let mut merchant = self.storage.get_merchant(&request.program, &request.merchant)?;
        if !merchant.is_active {
            return Err(Error::MerchantNotActive);
        }
        if request.purchase_amount == 0 {
            return Err(Error::InvalidRewardAmount);
        }

        let mut customer = self.storage.get_customer(&request.program, &request.customer)?;

        let rule = match request.rule_id {
            Some(rule_id) => Some(self.storage.get_rule(&request.program, &request.merchant, rule_id)?),
            None => None,
        };
        let outcome = rules::evaluate(rule.as_ref(), request.purchase_amount, now)?;

        // Base reward: purchase_amount * reward_rate / 100, truncating
        let base_reward = request
            .purchase_amount
            .checked_mul(merchant.reward_rate)
            .ok_or(Error::Overflow)?
            .checked_div(PERCENTAGE_DIVISOR)
            .ok_or(Error::Overflow)?;

        // Tier multiplier from lifetime earnings before this purchase
        let tier = tier_of(customer.total_earned);
        let tier_multiplier = tier.multiplier();

        let final_reward = base_reward
            .checked_mul(outcome.multiplier)
            .ok_or(Error::Overflow)?
            .checked_div(PERCENTAGE_DIVISOR)
            .ok_or(Error::Overflow)?
            .checked_mul(tier_multiplier)
            .ok_or(Error::Overflow)?
            .checked_div(PERCENTAGE_DIVISOR)
            .ok_or(Error::Overflow)?;

        if final_reward == 0 {
            return Err(Error::InvalidRewardAmount);
        }

        let platform_fee = final_reward
            .checked_mul(program.interest_rate as u64)
            .ok_or(Error::Overflow)?
            .checked_div(BASIS_POINTS)
            .ok_or(Error::Overflow)?;

        // All mutations on copies; committed below as one batch
        let index = customer.transaction_count;
        customer.total_earned = customer
            .total_earned
            .checked_add(final_reward)
            .ok_or(Error::Overflow)?;
        customer.transaction_count = customer
            .transaction_count
            .checked_add(1)
            .ok_or(Error::Overflow)?;
        customer.last_activity = now;

        merchant.total_issued = merchant
            .total_issued
            .checked_add(final_reward)
            .ok_or(Error::Overflow)?;

        program.total_tokens_issued = program
            .total_tokens_issued
            .checked_add(final_reward)
            .ok_or(Error::Overflow)?;
        program.total_fees_collected = program
            .total_fees_collected
            .checked_add(platform_fee)
            .ok_or(Error::Overflow)?;

        let new_tier = tier_of(customer.total_earned);
        let upgraded_to = if new_tier != customer.tier {
            customer.tier = new_tier;
            Some(new_tier)
        } else {
            None
        };

        let mut batch = Batch::new();
        batch.put_customer(&customer)?;
        batch.put_merchant(&merchant)?;
        batch.put_program(&program)?;
        self.recorder.append_transaction(
            &mut batch,
            &request.program,
            &request.customer,
            &request.merchant,
            TransactionKind::Issue,
            final_reward,
            tier,
            index,
            now,
        )?;
        self.recorder.upsert_relation(
            &mut batch,
            &request.program,
            &request.merchant,
            &request.customer,
            TransactionKind::Issue,
            final_reward,
            now,
        )?;
        self.storage.commit(batch)?;

        self.metrics.record_issuance(final_reward);

        tracing::info!(
            merchant = %request.merchant,
            customer = %request.customer,
            purchase_amount = request.purchase_amount,
            base_reward,
            rule_multiplier = outcome.multiplier,
            tier_multiplier,
            final_reward,
            platform_fee,
            "Rewards issued"
        );

        if let Some(new_tier) = upgraded_to {
            self.metrics.record_tier_upgrade();
            tracing::info!(
                customer = %request.customer,
                old_tier = %tier,
                new_tier = %new_tier,
                "Customer tier upgraded"
            );
            self.publish(EngineEvent::TierUpgraded {
                customer: request.customer.clone(),
                old_tier: tier,
                new_tier,
                total_earned: customer.total_earned,
                timestamp: now,
            });
        }

        self.publish(EngineEvent::RewardsIssued {
            merchant: request.merchant.clone(),
            customer: request.customer.clone(),
            purchase_amount: request.purchase_amount,
            base_reward,
            tier_multiplier,
            rule_multiplier: outcome.multiplier,
            rule_applied: outcome.applied,
            rule_name: outcome.rule_name.clone(),
            final_reward,
            platform_fee,
            customer_tier: customer.tier,
            timestamp: now,
        });

        Ok(RewardBreakdown {
            purchase_amount: request.purchase_amount,
            base_reward,
            rule_multiplier: outcome.multiplier,
            rule_applied: outcome.applied,
            rule_name: outcome.rule_name,
            tier_multiplier,
            tier,
            final_reward,
            platform_fee,
            upgraded_to,
        })
    }

    // Redemption engine

    /// Redeem tokens against an offer, producing a voucher
    pub fn redeem_rewards(&self, request: RedeemRequest, now: i64) -> Result<RedemptionVoucher> {
        let mut program = self.storage.get_program(&request.program)?;
        if request.mint != program.mint {
            return Err(Error::InvalidMint);
        }

        let mut customer = self.storage.get_customer(&request.program, &request.customer)?;
        let mut merchant = self.storage.get_merchant(&request.program, &request.merchant)?;
        let mut offer = self
            .storage
            .get_offer(&request.program, &request.merchant, &request.offer_name)?;

        if request.amount == 0 {
            return Err(Error::InvalidRewardAmount);
        }
        if customer.available_balance() < request.amount {
            return Err(Error::InsufficientBalance);
        }
        if let Err(cause) = offer.availability(now) {
            tracing::warn!(
                offer = %offer.name,
                merchant = %request.merchant,
                %cause,
                "Redemption rejected, offer not available"
            );
            return Err(Error::OfferNotAvailable);
        }

        if self
            .storage
            .try_get_voucher(
                &request.program,
                &request.customer,
                &request.merchant,
                &request.offer_name,
                request.voucher_seed,
            )?
            .is_some()
        {
            return Err(Error::AlreadyExists {
                kind: "voucher",
                key: format!("{}/{}", request.offer_name, request.voucher_seed),
            });
        }

        // All mutations on copies; committed below as one batch
        let index = customer.transaction_count;
        customer.total_redeemed = customer
            .total_redeemed
            .checked_add(request.amount)
            .ok_or(Error::Overflow)?;
        customer.transaction_count = customer
            .transaction_count
            .checked_add(1)
            .ok_or(Error::Overflow)?;
        customer.last_activity = now;

        merchant.total_redeemed = merchant
            .total_redeemed
            .checked_add(request.amount)
            .ok_or(Error::Overflow)?;

        program.total_tokens_redeemed = program
            .total_tokens_redeemed
            .checked_add(request.amount)
            .ok_or(Error::Overflow)?;

        offer.quantity_claimed = offer
            .quantity_claimed
            .checked_add(1)
            .ok_or(Error::Overflow)?;

        let redemption_code = codes::redemption_code(
            &request.customer,
            &request.merchant,
            &request.offer_name,
            request.voucher_seed,
        );

        let voucher = RedemptionVoucher {
            customer: request.customer.clone(),
            merchant: request.merchant.clone(),
            offer_name: offer.name.clone(),
            voucher_seed: request.voucher_seed,
            merchant_name: merchant.name.clone(),
            offer_description: offer.description.clone(),
            cost: request.amount,
            redemption_code: redemption_code.clone(),
            created_at: now,
            expires_at: now + self.config.voucher.validity_secs,
            is_used: false,
            used_at: None,
        };

        let mut batch = Batch::new();
        batch.put_customer(&customer)?;
        batch.put_merchant(&merchant)?;
        batch.put_program(&program)?;
        batch.put_offer(&offer)?;
        batch.put_voucher(&request.program, &voucher)?;
        self.recorder.append_transaction(
            &mut batch,
            &request.program,
            &request.customer,
            &request.merchant,
            TransactionKind::Redeem,
            request.amount,
            customer.tier,
            index,
            now,
        )?;
        self.recorder.upsert_relation(
            &mut batch,
            &request.program,
            &request.merchant,
            &request.customer,
            TransactionKind::Redeem,
            request.amount,
            now,
        )?;
        self.recorder.append_redemption(
            &mut batch,
            &request.program,
            &request.merchant,
            &request.offer_name,
            &request.customer,
            request.voucher_seed,
            request.amount,
            now,
        )?;
        self.storage.commit(batch)?;

        self.metrics.record_redemption(request.amount);

        tracing::info!(
            customer = %request.customer,
            merchant = %request.merchant,
            offer = %request.offer_name,
            amount = request.amount,
            code = %redemption_code,
            "Rewards redeemed"
        );

        self.publish(EngineEvent::RewardsRedeemed {
            customer: request.customer.clone(),
            merchant: request.merchant.clone(),
            offer_name: request.offer_name.clone(),
            amount: request.amount,
            redemption_code,
            voucher_seed: request.voucher_seed,
            timestamp: now,
        });

        Ok(voucher)
    }

    /// Mark a voucher as used, exactly once
    ///
    /// Gated on the merchant that owns the voucher; a second call fails with
    /// `VoucherAlreadyUsed` and has no effect.
    #[allow(clippy::too_many_arguments)]
    pub fn use_voucher(
        &self,
        authority: &AccountId,
        program: &AccountId,
        customer: &AccountId,
        merchant: &AccountId,
        offer_name: &str,
        voucher_seed: u64,
        now: i64,
    ) -> Result<RedemptionVoucher> {
        let mut voucher =
            self.storage
                .get_voucher(program, customer, merchant, offer_name, voucher_seed)?;

        if voucher.merchant != *authority {
            return Err(Error::UnauthorizedAccess);
        }
        if voucher.is_used {
            return Err(Error::VoucherAlreadyUsed);
        }
        if now >= voucher.expires_at {
            return Err(Error::VoucherExpired);
        }

        voucher.mark_as_used(now);

        let mut batch = Batch::new();
        batch.put_voucher(program, &voucher)?;
        if let Some(mut record) =
            self.storage
                .try_get_redemption(program, merchant, offer_name, customer, voucher_seed)?
        {
            record.is_used = true;
            record.used_at = Some(now);
            batch.put_redemption(program, &record)?;
        }
        self.storage.commit(batch)?;

        self.metrics.record_voucher_used();

        tracing::info!(
            merchant = %authority,
            customer = %customer,
            code = %voucher.redemption_code,
            "Voucher used"
        );

        self.publish(EngineEvent::VoucherUsed {
            customer: customer.clone(),
            merchant: merchant.clone(),
            offer_name: offer_name.to_string(),
            redemption_code: voucher.redemption_code.clone(),
            timestamp: now,
        });

        Ok(voucher)
    }

    // Read surface

    /// Get a program
    pub fn get_program(&self, authority: &AccountId) -> Result<Program> {
        self.storage.get_program(authority)
    }

    /// Get a merchant
    pub fn get_merchant(&self, program: &AccountId, authority: &AccountId) -> Result<Merchant> {
        self.storage.get_merchant(program, authority)
    }

    /// Get a customer
    pub fn get_customer(&self, program: &AccountId, wallet: &AccountId) -> Result<Customer> {
        self.storage.get_customer(program, wallet)
    }

    /// Get a voucher
    pub fn get_voucher(
        &self,
        program: &AccountId,
        customer: &AccountId,
        merchant: &AccountId,
        offer_name: &str,
        voucher_seed: u64,
    ) -> Result<RedemptionVoucher> {
        self.storage
            .get_voucher(program, customer, merchant, offer_name, voucher_seed)
    }

    /// All vouchers held by a customer
    pub fn customer_vouchers(
        &self,
        program: &AccountId,
        customer: &AccountId,
    ) -> Result<Vec<RedemptionVoucher>> {
        self.storage.vouchers_for_customer(program, customer)
    }

    /// A customer's transaction history in append order
    pub fn transaction_history(
        &self,
        program: &AccountId,
        customer: &AccountId,
    ) -> Result<Vec<TransactionRecord>> {
        self.storage.transactions_for_customer(program, customer)
    }

    /// Merchant/customer relation, if the pair has transacted
    pub fn merchant_customer_record(
        &self,
        program: &AccountId,
        merchant: &AccountId,
        customer: &AccountId,
    ) -> Result<Option<MerchantCustomerRecord>> {
        self.storage.try_get_relation(program, merchant, customer)
    }

    /// All reward rules owned by a merchant
    pub fn reward_rules(
        &self,
        program: &AccountId,
        merchant: &AccountId,
    ) -> Result<Vec<RewardRule>> {
        self.storage.rules_for_merchant(program, merchant)
    }

    /// All redemption offers owned by a merchant
    pub fn redemption_offers(
        &self,
        program: &AccountId,
        merchant: &AccountId,
    ) -> Result<Vec<RedemptionOffer>> {
        self.storage.offers_for_merchant(program, merchant)
    }
}

fn rule_event(rule: &RewardRule, action: ChangeAction, now: i64) -> EngineEvent {
    EngineEvent::RewardRuleChanged {
        merchant: rule.merchant.clone(),
        rule_id: rule.rule_id,
        name: rule.name.clone(),
        rule_type: rule.rule_type,
        multiplier: rule.multiplier,
        is_active: rule.is_active,
        action,
        timestamp: now,
    }
}

fn offer_event(offer: &RedemptionOffer, action: ChangeAction, now: i64) -> EngineEvent {
    EngineEvent::RedemptionOfferChanged {
        merchant: offer.merchant.clone(),
        name: offer.name.clone(),
        cost: offer.cost,
        offer_type: offer.offer_type.clone(),
        is_active: offer.is_active,
        quantity_claimed: offer.quantity_claimed,
        action,
        timestamp: now,
    }
}
