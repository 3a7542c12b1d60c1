//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the ledger engine.
//!
//! # Metrics
//!
//! - `loyalty_tokens_issued_total` - Total tokens issued
//! - `loyalty_tokens_redeemed_total` - Total tokens redeemed
//! - `loyalty_vouchers_created_total` - Total vouchers created
//! - `loyalty_vouchers_used_total` - Total vouchers consumed
//! - `loyalty_tier_upgrades_total` - Total tier upgrades
//! - `loyalty_reward_amount` - Histogram of per-issuance reward sizes

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total tokens issued
    pub tokens_issued: IntCounter,

    /// Total tokens redeemed
    pub tokens_redeemed: IntCounter,

    /// Total vouchers created
    pub vouchers_created: IntCounter,

    /// Total vouchers consumed
    pub vouchers_used: IntCounter,

    /// Total tier upgrades
    pub tier_upgrades: IntCounter,

    /// Per-issuance reward size histogram
    pub reward_amount: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let tokens_issued =
            IntCounter::new("loyalty_tokens_issued_total", "Total tokens issued")?;
        registry.register(Box::new(tokens_issued.clone()))?;

        let tokens_redeemed =
            IntCounter::new("loyalty_tokens_redeemed_total", "Total tokens redeemed")?;
        registry.register(Box::new(tokens_redeemed.clone()))?;

        let vouchers_created =
            IntCounter::new("loyalty_vouchers_created_total", "Total vouchers created")?;
        registry.register(Box::new(vouchers_created.clone()))?;

        let vouchers_used =
            IntCounter::new("loyalty_vouchers_used_total", "Total vouchers consumed")?;
        registry.register(Box::new(vouchers_used.clone()))?;

        let tier_upgrades =
            IntCounter::new("loyalty_tier_upgrades_total", "Total tier upgrades")?;
        registry.register(Box::new(tier_upgrades.clone()))?;

        let reward_amount = Histogram::with_opts(
            HistogramOpts::new(
                "loyalty_reward_amount",
                "Histogram of per-issuance reward sizes",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 500.0, 1_000.0, 5_000.0, 10_000.0, 50_000.0,
            ]),
        )?;
        registry.register(Box::new(reward_amount.clone()))?;

        Ok(Self {
            tokens_issued,
            tokens_redeemed,
            vouchers_created,
            vouchers_used,
            tier_upgrades,
            reward_amount,
            registry,
        })
    }

    /// Record a committed issuance
    pub fn record_issuance(&self, final_reward: u64) {
        self.tokens_issued.inc_by(final_reward);
        self.reward_amount.observe(final_reward as f64);
    }

    /// Record a committed redemption
    pub fn record_redemption(&self, amount: u64) {
        self.tokens_redeemed.inc_by(amount);
        self.vouchers_created.inc();
    }

    /// Record a consumed voucher
    pub fn record_voucher_used(&self) {
        self.vouchers_used.inc();
    }

    /// Record a tier upgrade
    pub fn record_tier_upgrade(&self) {
        self.tier_upgrades.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("metrics registration cannot fail on a fresh registry")
    }
}
