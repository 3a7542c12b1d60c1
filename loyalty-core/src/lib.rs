//! Solward Loyalty Core
//!
//! Reward-issuance and redemption ledger engine for merchant loyalty
//! tokens.
//!
//! # Architecture
//!
//! - **Single Writer**: one actor task owns the engine, serializing requests
//! - **Atomic Requests**: every request commits all record mutations and
//!   history appends in one RocksDB `WriteBatch`, or nothing at all
//! - **Append-only History**: transaction records are never modified
//! - **Checked Arithmetic**: every counter moves through overflow-detecting
//!   math; overflow aborts the request
//!
//! # Invariants
//!
//! - Customer: `total_earned >= total_redeemed` at all times
//! - Program: `total_tokens_issued == Σ merchant.total_issued`, same for
//!   redeemed
//! - Customer tier always equals the classifier of lifetime earnings after
//!   an issuance

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod codes;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod recorder;
pub mod rules;
pub mod storage;
pub mod tier;
pub mod types;

// Re-exports
pub use config::Config;
pub use engine::{Engine, IssueRequest, OfferParams, RedeemRequest, RewardBreakdown, RuleParams};
pub use error::{Error, Result};
pub use events::EngineEvent;
pub use ledger::Ledger;
pub use tier::{tier_of, Tier};
pub use types::{
    AccountId, Customer, Merchant, MerchantProfile, MerchantUpdate, OfferType, OfferUpdate,
    Program, RedemptionOffer, RedemptionVoucher, RewardRule, RuleType, RuleUpdate,
    TransactionKind, TransactionRecord,
};
