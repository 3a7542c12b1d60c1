//! Actor-based concurrency for the ledger engine
//!
//! The engine is owned by a single task and all requests flow through its
//! mailbox, so no two requests ever mutate the same accounts concurrently.
//! This is the serial, non-reentrant execution model the engine assumes:
//! the mailbox is the per-request exclusive lock over the whole store.
//!
//! Unlike an append-only event log there is nothing to batch here; each
//! request already commits all of its writes in one atomic `WriteBatch`.

use crate::engine::{
    Engine, IssueRequest, OfferParams, RedeemRequest, RewardBreakdown, RuleParams,
};
use crate::types::{
    AccountId, Customer, Merchant, MerchantCustomerRecord, MerchantProfile, MerchantUpdate,
    OfferUpdate, Program, RedemptionOffer, RedemptionVoucher, RewardRule, RuleUpdate,
    TransactionRecord,
};
use crate::{Error, Result};
use tokio::sync::{mpsc, oneshot};

/// Message sent to the engine actor
pub enum EngineMessage {
    /// Initialize a loyalty program
    InitializeProgram {
        /// Program authority
        authority: AccountId,
        /// Program name
        name: String,
        /// Fee rate override
        interest_rate_bps: Option<i16>,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<Program>>,
    },

    /// Register a merchant
    RegisterMerchant {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Merchant profile
        profile: MerchantProfile,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<Merchant>>,
    },

    /// Update a merchant profile
    UpdateMerchant {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Per-field update
        update: MerchantUpdate,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<Merchant>>,
    },

    /// Close a merchant account
    CloseMerchant {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Register a customer
    RegisterCustomer {
        /// Customer wallet
        wallet: AccountId,
        /// Program authority
        program: AccountId,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<Customer>>,
    },

    /// Create a reward rule
    SetRewardRule {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Rule parameters
        params: RuleParams,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<RewardRule>>,
    },

    /// Update a reward rule
    UpdateRewardRule {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Rule ID
        rule_id: u64,
        /// Per-field update
        update: RuleUpdate,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<RewardRule>>,
    },

    /// Set a reward rule's active status
    ToggleRewardRule {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Rule ID
        rule_id: u64,
        /// New active status
        is_active: bool,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<RewardRule>>,
    },

    /// Delete a reward rule
    DeleteRewardRule {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Rule ID
        rule_id: u64,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Create a redemption offer
    CreateRedemptionOffer {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Offer parameters
        params: OfferParams,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<RedemptionOffer>>,
    },

    /// Update a redemption offer
    UpdateRedemptionOffer {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Offer name
        name: String,
        /// Per-field update
        update: OfferUpdate,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<RedemptionOffer>>,
    },

    /// Flip a redemption offer's active status
    ToggleRedemptionOffer {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Offer name
        name: String,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<RedemptionOffer>>,
    },

    /// Delete a redemption offer
    DeleteRedemptionOffer {
        /// Merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Offer name
        name: String,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Issue rewards for a purchase
    IssueRewards {
        /// Issuance request
        request: IssueRequest,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<RewardBreakdown>>,
    },

    /// Redeem tokens against an offer
    RedeemRewards {
        /// Redemption request
        request: RedeemRequest,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<RedemptionVoucher>>,
    },

    /// Mark a voucher as used
    UseVoucher {
        /// Calling merchant authority
        authority: AccountId,
        /// Program authority
        program: AccountId,
        /// Customer wallet on the voucher
        customer: AccountId,
        /// Merchant on the voucher
        merchant: AccountId,
        /// Offer name on the voucher
        offer_name: String,
        /// Voucher seed
        voucher_seed: u64,
        /// Request time
        now: i64,
        /// Reply channel
        response: oneshot::Sender<Result<RedemptionVoucher>>,
    },

    /// Get a program
    GetProgram {
        /// Program authority
        authority: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<Program>>,
    },

    /// Get a merchant
    GetMerchant {
        /// Program authority
        program: AccountId,
        /// Merchant authority
        authority: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<Merchant>>,
    },

    /// Get a customer
    GetCustomer {
        /// Program authority
        program: AccountId,
        /// Customer wallet
        wallet: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<Customer>>,
    },

    /// Get a voucher
    GetVoucher {
        /// Program authority
        program: AccountId,
        /// Customer wallet on the voucher
        customer: AccountId,
        /// Merchant on the voucher
        merchant: AccountId,
        /// Offer name on the voucher
        offer_name: String,
        /// Voucher seed
        voucher_seed: u64,
        /// Reply channel
        response: oneshot::Sender<Result<RedemptionVoucher>>,
    },

    /// List a customer's vouchers
    ListVouchers {
        /// Program authority
        program: AccountId,
        /// Customer wallet
        customer: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<RedemptionVoucher>>>,
    },

    /// Get a customer's transaction history
    TransactionHistory {
        /// Program authority
        program: AccountId,
        /// Customer wallet
        customer: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<TransactionRecord>>>,
    },

    /// Get a merchant/customer relation
    GetRelation {
        /// Program authority
        program: AccountId,
        /// Merchant authority
        merchant: AccountId,
        /// Customer wallet
        customer: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<Option<MerchantCustomerRecord>>>,
    },

    /// List a merchant's reward rules
    ListRules {
        /// Program authority
        program: AccountId,
        /// Merchant authority
        merchant: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<RewardRule>>>,
    },

    /// List a merchant's redemption offers
    ListOffers {
        /// Program authority
        program: AccountId,
        /// Merchant authority
        merchant: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<RedemptionOffer>>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes engine messages serially
pub struct EngineActor {
    engine: Engine,
    mailbox: mpsc::Receiver<EngineMessage>,
}

impl EngineActor {
    /// Create new actor
    pub fn new(engine: Engine, mailbox: mpsc::Receiver<EngineMessage>) -> Self {
        Self { engine, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if matches!(msg, EngineMessage::Shutdown) {
                break;
            }
            self.handle_message(msg);
        }
        tracing::info!("Engine actor stopped");
    }

    fn handle_message(&mut self, msg: EngineMessage) {
        match msg {
            EngineMessage::InitializeProgram {
                authority,
                name,
                interest_rate_bps,
                now,
                response,
            } => {
                let result = self
                    .engine
                    .initialize_program(&authority, &name, interest_rate_bps, now);
                let _ = response.send(result);
            }

            EngineMessage::RegisterMerchant {
                authority,
                program,
                profile,
                now,
                response,
            } => {
                let result = self.engine.register_merchant(&authority, &program, profile, now);
                let _ = response.send(result);
            }

            EngineMessage::UpdateMerchant {
                authority,
                program,
                update,
                now,
                response,
            } => {
                let result = self.engine.update_merchant(&authority, &program, update, now);
                let _ = response.send(result);
            }

            EngineMessage::CloseMerchant {
                authority,
                program,
                response,
            } => {
                let result = self.engine.close_merchant(&authority, &program);
                let _ = response.send(result);
            }

            EngineMessage::RegisterCustomer {
                wallet,
                program,
                now,
                response,
            } => {
                let result = self.engine.register_customer(&wallet, &program, now);
                let _ = response.send(result);
            }

            EngineMessage::SetRewardRule {
                authority,
                program,
                params,
                now,
                response,
            } => {
                let result = self.engine.set_reward_rule(&authority, &program, params, now);
                let _ = response.send(result);
            }

            EngineMessage::UpdateRewardRule {
                authority,
                program,
                rule_id,
                update,
                now,
                response,
            } => {
                let result = self
                    .engine
                    .update_reward_rule(&authority, &program, rule_id, update, now);
                let _ = response.send(result);
            }

            EngineMessage::ToggleRewardRule {
                authority,
                program,
                rule_id,
                is_active,
                now,
                response,
            } => {
                let result = self
                    .engine
                    .toggle_reward_rule(&authority, &program, rule_id, is_active, now);
                let _ = response.send(result);
            }

            EngineMessage::DeleteRewardRule {
                authority,
                program,
                rule_id,
                now,
                response,
            } => {
                let result = self.engine.delete_reward_rule(&authority, &program, rule_id, now);
                let _ = response.send(result);
            }

            EngineMessage::CreateRedemptionOffer {
                authority,
                program,
                params,
                now,
                response,
            } => {
                let result = self
                    .engine
                    .create_redemption_offer(&authority, &program, params, now);
                let _ = response.send(result);
            }

            EngineMessage::UpdateRedemptionOffer {
                authority,
                program,
                name,
                update,
                now,
                response,
            } => {
                let result = self
                    .engine
                    .update_redemption_offer(&authority, &program, &name, update, now);
                let _ = response.send(result);
            }

            EngineMessage::ToggleRedemptionOffer {
                authority,
                program,
                name,
                now,
                response,
            } => {
                let result = self
                    .engine
                    .toggle_redemption_offer(&authority, &program, &name, now);
                let _ = response.send(result);
            }

            EngineMessage::DeleteRedemptionOffer {
                authority,
                program,
                name,
                now,
                response,
            } => {
                let result = self
                    .engine
                    .delete_redemption_offer(&authority, &program, &name, now);
                let _ = response.send(result);
            }

            EngineMessage::IssueRewards {
                request,
                now,
                response,
            } => {
                let result = self.engine.issue_rewards(request, now);
                let _ = response.send(result);
            }

            EngineMessage::RedeemRewards {
                request,
                now,
                response,
            } => {
                let result = self.engine.redeem_rewards(request, now);
                let _ = response.send(result);
            }

            EngineMessage::UseVoucher {
                authority,
                program,
                customer,
                merchant,
                offer_name,
                voucher_seed,
                now,
                response,
            } => {
                let result = self.engine.use_voucher(
                    &authority,
                    &program,
                    &customer,
                    &merchant,
                    &offer_name,
                    voucher_seed,
                    now,
                );
                let _ = response.send(result);
            }

            EngineMessage::GetProgram {
                authority,
                response,
            } => {
                let _ = response.send(self.engine.get_program(&authority));
            }

            EngineMessage::GetMerchant {
                program,
                authority,
                response,
            } => {
                let _ = response.send(self.engine.get_merchant(&program, &authority));
            }

            EngineMessage::GetCustomer {
                program,
                wallet,
                response,
            } => {
                let _ = response.send(self.engine.get_customer(&program, &wallet));
            }

            EngineMessage::GetVoucher {
                program,
                customer,
                merchant,
                offer_name,
                voucher_seed,
                response,
            } => {
                let _ = response.send(self.engine.get_voucher(
                    &program,
                    &customer,
                    &merchant,
                    &offer_name,
                    voucher_seed,
                ));
            }

            EngineMessage::ListVouchers {
                program,
                customer,
                response,
            } => {
                let _ = response.send(self.engine.customer_vouchers(&program, &customer));
            }

            EngineMessage::TransactionHistory {
                program,
                customer,
                response,
            } => {
                let _ = response.send(self.engine.transaction_history(&program, &customer));
            }

            EngineMessage::GetRelation {
                program,
                merchant,
                customer,
                response,
            } => {
                let _ = response.send(
                    self.engine
                        .merchant_customer_record(&program, &merchant, &customer),
                );
            }

            EngineMessage::ListRules {
                program,
                merchant,
                response,
            } => {
                let _ = response.send(self.engine.reward_rules(&program, &merchant));
            }

            EngineMessage::ListOffers {
                program,
                merchant,
                response,
            } => {
                let _ = response.send(self.engine.redemption_offers(&program, &merchant));
            }

            EngineMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    /// Dispatch a message that carries its own reply channel
    pub async fn execute<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> EngineMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Engine mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| Error::Concurrency("Engine actor dropped reply".to_string()))?
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EngineMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Engine mailbox closed".to_string()))
    }
}

/// Spawn the engine actor, returning its handle
pub fn spawn_engine_actor(engine: Engine) -> EngineHandle {
    let (sender, mailbox) = mpsc::channel(256);
    let actor = EngineActor::new(engine, mailbox);
    tokio::spawn(actor.run());
    EngineHandle { sender }
}
