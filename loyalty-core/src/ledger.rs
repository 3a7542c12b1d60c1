//! Main ledger orchestration layer
//!
//! Ties together storage, engine, and actor components into a high-level
//! API for loyalty requests.
//!
//! # Example
//!
//! ```no_run
//! use loyalty_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> loyalty_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     // let program = ledger.initialize_program(&authority, "City Rewards", None).await?;
//!
//!     ledger.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! Time-sensitive operations (issuance, redemption, voucher use) evaluate
//! rule windows and offer expirations against the caller-supplied time; the
//! plain methods default to wall clock, the `*_at` variants take it
//! explicitly.

use crate::actor::{spawn_engine_actor, EngineHandle, EngineMessage};
use crate::engine::{Engine, IssueRequest, OfferParams, RedeemRequest, RewardBreakdown, RuleParams};
use crate::events::{self, EngineEvent};
use crate::metrics::Metrics;
use crate::storage::Storage;
use crate::types::{
    AccountId, Customer, Merchant, MerchantCustomerRecord, MerchantProfile, MerchantUpdate,
    OfferUpdate, Program, RedemptionOffer, RedemptionVoucher, RewardRule, RuleUpdate,
    TransactionRecord,
};
use crate::{Config, Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Main loyalty ledger interface
pub struct Ledger {
    /// Actor handle for serialized request execution
    handle: EngineHandle,

    /// Event channel shared with the engine
    events: broadcast::Sender<EngineEvent>,

    /// Metrics (shared with the engine)
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let (events, _rx) = events::channel(config.event_capacity);
        let metrics =
            Metrics::new().map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        let engine = Engine::new(storage, config, metrics.clone(), events.clone());
        let handle = spawn_engine_actor(engine);

        Ok(Self {
            handle,
            events,
            metrics,
        })
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Metrics registry for scraping
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }

    // Program / registration surface

    /// Initialize a loyalty program
    pub async fn initialize_program(
        &self,
        authority: &AccountId,
        name: &str,
        interest_rate_bps: Option<i16>,
    ) -> Result<Program> {
        let authority = authority.clone();
        let name = name.to_string();
        self.handle
            .execute(|response| EngineMessage::InitializeProgram {
                authority,
                name,
                interest_rate_bps,
                now: Self::now(),
                response,
            })
            .await
    }

    /// Register a merchant
    pub async fn register_merchant(
        &self,
        authority: &AccountId,
        program: &AccountId,
        profile: MerchantProfile,
    ) -> Result<Merchant> {
        let authority = authority.clone();
        let program = program.clone();
        self.handle
            .execute(|response| EngineMessage::RegisterMerchant {
                authority,
                program,
                profile,
                now: Self::now(),
                response,
            })
            .await
    }

    /// Update a merchant profile
    pub async fn update_merchant(
        &self,
        authority: &AccountId,
        program: &AccountId,
        update: MerchantUpdate,
    ) -> Result<Merchant> {
        let authority = authority.clone();
        let program = program.clone();
        self.handle
            .execute(|response| EngineMessage::UpdateMerchant {
                authority,
                program,
                update,
                now: Self::now(),
                response,
            })
            .await
    }

    /// Close a merchant account
    pub async fn close_merchant(&self, authority: &AccountId, program: &AccountId) -> Result<()> {
        let authority = authority.clone();
        let program = program.clone();
        self.handle
            .execute(|response| EngineMessage::CloseMerchant {
                authority,
                program,
                response,
            })
            .await
    }

    /// Register a customer
    pub async fn register_customer(
        &self,
        wallet: &AccountId,
        program: &AccountId,
    ) -> Result<Customer> {
        let wallet = wallet.clone();
        let program = program.clone();
        self.handle
            .execute(|response| EngineMessage::RegisterCustomer {
                wallet,
                program,
                now: Self::now(),
                response,
            })
            .await
    }

    // Reward rule surface

    /// Create a reward rule
    pub async fn set_reward_rule(
        &self,
        authority: &AccountId,
        program: &AccountId,
        params: RuleParams,
    ) -> Result<RewardRule> {
        let authority = authority.clone();
        let program = program.clone();
        self.handle
            .execute(|response| EngineMessage::SetRewardRule {
                authority,
                program,
                params,
                now: Self::now(),
                response,
            })
            .await
    }

    /// Update a reward rule
    pub async fn update_reward_rule(
        &self,
        authority: &AccountId,
        program: &AccountId,
        rule_id: u64,
        update: RuleUpdate,
    ) -> Result<RewardRule> {
        let authority = authority.clone();
        let program = program.clone();
        self.handle
            .execute(|response| EngineMessage::UpdateRewardRule {
                authority,
                program,
                rule_id,
                update,
                now: Self::now(),
                response,
            })
            .await
    }

    /// Set a reward rule's active status
    pub async fn toggle_reward_rule(
        &self,
        authority: &AccountId,
        program: &AccountId,
        rule_id: u64,
        is_active: bool,
    ) -> Result<RewardRule> {
        let authority = authority.clone();
        let program = program.clone();
        self.handle
            .execute(|response| EngineMessage::ToggleRewardRule {
                authority,
                program,
                rule_id,
                is_active,
                now: Self::now(),
                response,
            })
            .await
    }

    /// Delete a reward rule
    pub async fn delete_reward_rule(
        &self,
        authority: &AccountId,
        program: &AccountId,
        rule_id: u64,
    ) -> Result<()> {
        let authority = authority.clone();
        let program = program.clone();
        self.handle
            .execute(|response| EngineMessage::DeleteRewardRule {
                authority,
                program,
                rule_id,
                now: Self::now(),
                response,
            })
            .await
    }

    // Redemption offer surface

    /// Create a redemption offer
    pub async fn create_redemption_offer(
        &self,
        authority: &AccountId,
        program: &AccountId,
        params: OfferParams,
    ) -> Result<RedemptionOffer> {
        let authority = authority.clone();
        let program = program.clone();
        self.handle
            .execute(|response| EngineMessage::CreateRedemptionOffer {
                authority,
                program,
                params,
                now: Self::now(),
                response,
            })
            .await
    }

    /// Update a redemption offer
    pub async fn update_redemption_offer(
        &self,
        authority: &AccountId,
        program: &AccountId,
        name: &str,
        update: OfferUpdate,
    ) -> Result<RedemptionOffer> {
        let authority = authority.clone();
        let program = program.clone();
        let name = name.to_string();
        self.handle
            .execute(|response| EngineMessage::UpdateRedemptionOffer {
                authority,
                program,
                name,
                update,
                now: Self::now(),
                response,
            })
            .await
    }

    /// Flip a redemption offer's active status
    pub async fn toggle_redemption_offer(
        &self,
        authority: &AccountId,
        program: &AccountId,
        name: &str,
    ) -> Result<RedemptionOffer> {
        let authority = authority.clone();
        let program = program.clone();
        let name = name.to_string();
        self.handle
            .execute(|response| EngineMessage::ToggleRedemptionOffer {
                authority,
                program,
                name,
                now: Self::now(),
                response,
            })
            .await
    }

    /// Delete a redemption offer
    pub async fn delete_redemption_offer(
        &self,
        authority: &AccountId,
        program: &AccountId,
        name: &str,
    ) -> Result<()> {
        let authority = authority.clone();
        let program = program.clone();
        let name = name.to_string();
        self.handle
            .execute(|response| EngineMessage::DeleteRedemptionOffer {
                authority,
                program,
                name,
                now: Self::now(),
                response,
            })
            .await
    }

    // Issuance / redemption surface

    /// Issue rewards for a purchase at wall-clock time
    pub async fn issue_rewards(&self, request: IssueRequest) -> Result<RewardBreakdown> {
        self.issue_rewards_at(request, Self::now()).await
    }

    /// Issue rewards for a purchase at an explicit time
    pub async fn issue_rewards_at(
        &self,
        request: IssueRequest,
        now: i64,
    ) -> Result<RewardBreakdown> {
        self.handle
            .execute(|response| EngineMessage::IssueRewards {
                request,
                now,
                response,
            })
            .await
    }

    /// Redeem tokens against an offer at wall-clock time
    pub async fn redeem_rewards(&self, request: RedeemRequest) -> Result<RedemptionVoucher> {
        self.redeem_rewards_at(request, Self::now()).await
    }

    /// Redeem tokens against an offer at an explicit time
    pub async fn redeem_rewards_at(
        &self,
        request: RedeemRequest,
        now: i64,
    ) -> Result<RedemptionVoucher> {
        self.handle
            .execute(|response| EngineMessage::RedeemRewards {
                request,
                now,
                response,
            })
            .await
    }

    /// Mark a voucher as used at wall-clock time
    pub async fn use_voucher(
        &self,
        authority: &AccountId,
        program: &AccountId,
        customer: &AccountId,
        merchant: &AccountId,
        offer_name: &str,
        voucher_seed: u64,
    ) -> Result<RedemptionVoucher> {
        self.use_voucher_at(
            authority,
            program,
            customer,
            merchant,
            offer_name,
            voucher_seed,
            Self::now(),
        )
        .await
    }

    /// Mark a voucher as used at an explicit time
    #[allow(clippy::too_many_arguments)]
    pub async fn use_voucher_at(
        &self,
        authority: &AccountId,
        program: &AccountId,
        customer: &AccountId,
        merchant: &AccountId,
        offer_name: &str,
        voucher_seed: u64,
        now: i64,
    ) -> Result<RedemptionVoucher> {
        let authority = authority.clone();
        let program = program.clone();
        let customer = customer.clone();
        let merchant = merchant.clone();
        let offer_name = offer_name.to_string();
        self.handle
            .execute(|response| EngineMessage::UseVoucher {
                authority,
                program,
                customer,
                merchant,
                offer_name,
                voucher_seed,
                now,
                response,
            })
            .await
    }

    // Read surface

    /// Get a program
    pub async fn program(&self, authority: &AccountId) -> Result<Program> {
        let authority = authority.clone();
        self.handle
            .execute(|response| EngineMessage::GetProgram {
                authority,
                response,
            })
            .await
    }

    /// Get a merchant
    pub async fn merchant(&self, program: &AccountId, authority: &AccountId) -> Result<Merchant> {
        let program = program.clone();
        let authority = authority.clone();
        self.handle
            .execute(|response| EngineMessage::GetMerchant {
                program,
                authority,
                response,
            })
            .await
    }

    /// Get a customer
    pub async fn customer(&self, program: &AccountId, wallet: &AccountId) -> Result<Customer> {
        let program = program.clone();
        let wallet = wallet.clone();
        self.handle
            .execute(|response| EngineMessage::GetCustomer {
                program,
                wallet,
                response,
            })
            .await
    }

    /// Get a voucher
    pub async fn voucher(
        &self,
        program: &AccountId,
        customer: &AccountId,
        merchant: &AccountId,
        offer_name: &str,
        voucher_seed: u64,
    ) -> Result<RedemptionVoucher> {
        let program = program.clone();
        let customer = customer.clone();
        let merchant = merchant.clone();
        let offer_name = offer_name.to_string();
        self.handle
            .execute(|response| EngineMessage::GetVoucher {
                program,
                customer,
                merchant,
                offer_name,
                voucher_seed,
                response,
            })
            .await
    }

    /// List a customer's vouchers
    pub async fn customer_vouchers(
        &self,
        program: &AccountId,
        customer: &AccountId,
    ) -> Result<Vec<RedemptionVoucher>> {
        let program = program.clone();
        let customer = customer.clone();
        self.handle
            .execute(|response| EngineMessage::ListVouchers {
                program,
                customer,
                response,
            })
            .await
    }

    /// A customer's transaction history in append order
    pub async fn transaction_history(
        &self,
        program: &AccountId,
        customer: &AccountId,
    ) -> Result<Vec<TransactionRecord>> {
        let program = program.clone();
        let customer = customer.clone();
        self.handle
            .execute(|response| EngineMessage::TransactionHistory {
                program,
                customer,
                response,
            })
            .await
    }

    /// Merchant/customer relation, if the pair has transacted
    pub async fn merchant_customer_record(
        &self,
        program: &AccountId,
        merchant: &AccountId,
        customer: &AccountId,
    ) -> Result<Option<MerchantCustomerRecord>> {
        let program = program.clone();
        let merchant = merchant.clone();
        let customer = customer.clone();
        self.handle
            .execute(|response| EngineMessage::GetRelation {
                program,
                merchant,
                customer,
                response,
            })
            .await
    }

    /// List a merchant's reward rules
    pub async fn reward_rules(
        &self,
        program: &AccountId,
        merchant: &AccountId,
    ) -> Result<Vec<RewardRule>> {
        let program = program.clone();
        let merchant = merchant.clone();
        self.handle
            .execute(|response| EngineMessage::ListRules {
                program,
                merchant,
                response,
            })
            .await
    }

    /// List a merchant's redemption offers
    pub async fn redemption_offers(
        &self,
        program: &AccountId,
        merchant: &AccountId,
    ) -> Result<Vec<RedemptionOffer>> {
        let program = program.clone();
        let merchant = merchant.clone();
        self.handle
            .execute(|response| EngineMessage::ListOffers {
                program,
                merchant,
                response,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OfferType;

    async fn create_test_ledger() -> Ledger {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        Ledger::open(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_ledger_open_and_shutdown() {
        let ledger = create_test_ledger().await;
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_issuance_and_redemption_flow() {
        let ledger = create_test_ledger().await;
        let authority = AccountId::new("program-authority");
        let merchant = AccountId::new("merchant-1");
        let wallet = AccountId::new("wallet-1");

        let program = ledger
            .initialize_program(&authority, "City Rewards", None)
            .await
            .unwrap();

        ledger
            .register_merchant(
                &merchant,
                &authority,
                MerchantProfile {
                    name: "Corner Cafe".to_string(),
                    avatar_url: String::new(),
                    category: "food".to_string(),
                    description: None,
                    reward_rate: 10,
                },
            )
            .await
            .unwrap();
        ledger.register_customer(&wallet, &authority).await.unwrap();

        let breakdown = ledger
            .issue_rewards(IssueRequest {
                merchant: merchant.clone(),
                program: authority.clone(),
                customer: wallet.clone(),
                purchase_amount: 1_000,
                rule_id: None,
                treasury: program.treasury.clone(),
            })
            .await
            .unwrap();
        assert_eq!(breakdown.final_reward, 100);

        ledger
            .create_redemption_offer(
                &merchant,
                &authority,
                OfferParams {
                    name: "Free Coffee".to_string(),
                    description: "One free coffee".to_string(),
                    icon: "coffee".to_string(),
                    cost: 100,
                    offer_type: OfferType::FreeProduct {
                        product_id: "sku-1".to_string(),
                    },
                    quantity_limit: None,
                    expiration: None,
                },
            )
            .await
            .unwrap();

        let voucher = ledger
            .redeem_rewards(RedeemRequest {
                customer: wallet.clone(),
                program: authority.clone(),
                merchant: merchant.clone(),
                offer_name: "Free Coffee".to_string(),
                amount: 100,
                voucher_seed: 1,
                mint: program.mint.clone(),
            })
            .await
            .unwrap();
        assert!(voucher.redemption_code.starts_with("RV-"));

        let customer = ledger.customer(&authority, &wallet).await.unwrap();
        assert_eq!(customer.available_balance(), 0);

        let history = ledger.transaction_history(&authority, &wallet).await.unwrap();
        assert_eq!(history.len(), 2);

        ledger
            .use_voucher(&merchant, &authority, &wallet, &merchant, "Free Coffee", 1)
            .await
            .unwrap();

        let vouchers = ledger.customer_vouchers(&authority, &wallet).await.unwrap();
        assert_eq!(vouchers.len(), 1);
        assert!(vouchers[0].is_used);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let ledger = create_test_ledger().await;
        let mut events = ledger.subscribe();

        let authority = AccountId::new("program-authority");
        let merchant = AccountId::new("merchant-1");

        ledger
            .initialize_program(&authority, "City Rewards", None)
            .await
            .unwrap();
        ledger
            .register_merchant(
                &merchant,
                &authority,
                MerchantProfile {
                    name: "Corner Cafe".to_string(),
                    avatar_url: String::new(),
                    category: "food".to_string(),
                    description: None,
                    reward_rate: 10,
                },
            )
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::MerchantRegistered { .. }));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_is_cloneable_across_tasks() {
        let ledger = create_test_ledger().await;
        let authority = AccountId::new("program-authority");
        ledger
            .initialize_program(&authority, "City Rewards", None)
            .await
            .unwrap();

        // Reads go through the same serialized mailbox
        let program = ledger.program(&authority).await.unwrap();
        assert_eq!(program.name, "City Rewards");
        assert_eq!(program.interest_rate, 500);

        ledger.shutdown().await.unwrap();
    }
}
