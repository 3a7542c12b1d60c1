//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Balance conservation: total_earned >= total_redeemed, always
//! - Aggregate consistency: program totals equal the sum over merchants
//! - Tier consistency: stored tier equals the classifier of lifetime
//!   earnings after every issuance
//! - Idempotency: a reused voucher seed never deducts twice

use loyalty_core::{
    events, tier_of, AccountId, Config, Engine, Error, IssueRequest, MerchantProfile, OfferParams,
    OfferType, RedeemRequest,
};
use loyalty_core::metrics::Metrics;
use loyalty_core::storage::Storage;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000;

struct Fixture {
    engine: Engine,
    program: AccountId,
    treasury: AccountId,
    mint: AccountId,
    _temp: TempDir,
}

/// Engine over a throwaway store with one program initialized
fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp.path().to_path_buf();

    let storage = Arc::new(Storage::open(&config).unwrap());
    let (sender, _rx) = events::channel(config.event_capacity);
    let engine = Engine::new(storage, config, Metrics::default(), sender);

    let authority = AccountId::new("program-authority");
    let program = engine
        .initialize_program(&authority, "City Rewards", Some(0), NOW)
        .unwrap();

    Fixture {
        engine,
        program: authority,
        treasury: program.treasury,
        mint: program.mint,
        _temp: temp,
    }
}

fn register_merchant(fx: &Fixture, id: &str, reward_rate: u64) -> AccountId {
    let merchant = AccountId::new(id);
    fx.engine
        .register_merchant(
            &merchant,
            &fx.program,
            MerchantProfile {
                name: format!("Shop {}", id),
                avatar_url: String::new(),
                category: "retail".to_string(),
                description: None,
                reward_rate,
            },
            NOW,
        )
        .unwrap();
    merchant
}

fn register_customer(fx: &Fixture, id: &str) -> AccountId {
    let wallet = AccountId::new(id);
    fx.engine.register_customer(&wallet, &fx.program, NOW).unwrap();
    wallet
}

fn create_offer(fx: &Fixture, merchant: &AccountId, name: &str) {
    fx.engine
        .create_redemption_offer(
            merchant,
            &fx.program,
            OfferParams {
                name: name.to_string(),
                description: String::new(),
                icon: String::new(),
                cost: 1,
                offer_type: OfferType::Discount { percentage: 10 },
                quantity_limit: None,
                expiration: None,
            },
            NOW,
        )
        .unwrap();
}

fn issue(fx: &Fixture, merchant: &AccountId, customer: &AccountId, purchase_amount: u64) -> u64 {
    fx.engine
        .issue_rewards(
            IssueRequest {
                merchant: merchant.clone(),
                program: fx.program.clone(),
                customer: customer.clone(),
                purchase_amount,
                rule_id: None,
                treasury: fx.treasury.clone(),
            },
            NOW,
        )
        .unwrap()
        .final_reward
}

fn redeem(
    fx: &Fixture,
    merchant: &AccountId,
    customer: &AccountId,
    offer_name: &str,
    amount: u64,
    seed: u64,
) -> loyalty_core::Result<loyalty_core::RedemptionVoucher> {
    fx.engine.redeem_rewards(
        RedeemRequest {
            customer: customer.clone(),
            program: fx.program.clone(),
            merchant: merchant.clone(),
            offer_name: offer_name.to_string(),
            amount,
            voucher_seed: seed,
            mint: fx.mint.clone(),
        },
        NOW,
    )
}

/// Strategy for purchase amounts large enough to never truncate to zero
fn purchase_strategy() -> impl Strategy<Value = u64> {
    100u64..100_000
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: issuing then redeeming everything lands exactly on zero,
    /// and one token more is rejected without effect
    #[test]
    fn prop_round_trip_balance_never_negative(
        purchases in prop::collection::vec(purchase_strategy(), 1..10)
    ) {
        let fx = fixture();
        let merchant = register_merchant(&fx, "merchant-1", 10);
        let customer = register_customer(&fx, "wallet-1");
        create_offer(&fx, &merchant, "Prize");

        let mut earned = 0u64;
        for purchase in &purchases {
            earned += issue(&fx, &merchant, &customer, *purchase);
        }

        let record = fx.engine.get_customer(&fx.program, &customer).unwrap();
        prop_assert_eq!(record.available_balance(), earned);

        // Over-redeeming is rejected with no side effects
        let result = redeem(&fx, &merchant, &customer, "Prize", earned + 1, 1);
        prop_assert!(matches!(result, Err(Error::InsufficientBalance)));

        // Redeeming exactly the earned amount lands on zero
        redeem(&fx, &merchant, &customer, "Prize", earned, 2).unwrap();
        let record = fx.engine.get_customer(&fx.program, &customer).unwrap();
        prop_assert_eq!(record.available_balance(), 0);
        prop_assert!(record.total_earned >= record.total_redeemed);
    }

    /// Property: program aggregates equal the sum over merchants
    #[test]
    fn prop_program_totals_match_merchant_sums(
        purchases in prop::collection::vec((0usize..3, purchase_strategy()), 1..12)
    ) {
        let fx = fixture();
        let merchants: Vec<AccountId> = (0..3)
            .map(|i| register_merchant(&fx, &format!("merchant-{}", i), 10))
            .collect();
        let customer = register_customer(&fx, "wallet-1");
        for merchant in &merchants {
            create_offer(&fx, merchant, "Prize");
        }

        for (merchant_index, purchase) in &purchases {
            issue(&fx, &merchants[*merchant_index], &customer, *purchase);
        }

        // Redeem a little at the first merchant
        let balance = fx
            .engine
            .get_customer(&fx.program, &customer)
            .unwrap()
            .available_balance();
        if balance > 0 {
            redeem(&fx, &merchants[0], &customer, "Prize", balance / 2 + 1, 1).unwrap();
        }

        let program = fx.engine.get_program(&fx.program).unwrap();
        let mut issued_sum = 0u64;
        let mut redeemed_sum = 0u64;
        for merchant in &merchants {
            let record = fx.engine.get_merchant(&fx.program, merchant).unwrap();
            issued_sum += record.total_issued;
            redeemed_sum += record.total_redeemed;
        }

        prop_assert_eq!(program.total_tokens_issued, issued_sum);
        prop_assert_eq!(program.total_tokens_redeemed, redeemed_sum);
        prop_assert!(program.total_tokens_issued >= program.total_tokens_redeemed);
    }

    /// Property: the stored tier always matches the classifier after an
    /// issuance
    #[test]
    fn prop_tier_matches_classifier(
        purchases in prop::collection::vec(purchase_strategy(), 1..10)
    ) {
        let fx = fixture();
        let merchant = register_merchant(&fx, "merchant-1", 50);
        let customer = register_customer(&fx, "wallet-1");

        for purchase in &purchases {
            issue(&fx, &merchant, &customer, *purchase);
            let record = fx.engine.get_customer(&fx.program, &customer).unwrap();
            prop_assert_eq!(record.tier, tier_of(record.total_earned));
        }
    }

    /// Property: a reused voucher seed is rejected and never deducts twice
    #[test]
    fn prop_voucher_seed_idempotent(purchase in purchase_strategy(), seed in any::<u64>()) {
        let fx = fixture();
        let merchant = register_merchant(&fx, "merchant-1", 10);
        let customer = register_customer(&fx, "wallet-1");
        create_offer(&fx, &merchant, "Prize");

        let earned = issue(&fx, &merchant, &customer, purchase);
        let amount = earned / 2 + 1;

        redeem(&fx, &merchant, &customer, "Prize", amount, seed).unwrap();
        let after_first = fx.engine.get_customer(&fx.program, &customer).unwrap();

        let result = redeem(&fx, &merchant, &customer, "Prize", amount, seed);
        prop_assert!(
            matches!(result, Err(Error::AlreadyExists { .. })),
            "expected AlreadyExists error"
        );

        let after_second = fx.engine.get_customer(&fx.program, &customer).unwrap();
        prop_assert_eq!(after_first.total_redeemed, after_second.total_redeemed);

        let offers = fx.engine.redemption_offers(&fx.program, &merchant).unwrap();
        prop_assert_eq!(offers[0].quantity_claimed, 1);
    }

    /// Property: the breakdown arithmetic is exactly
    /// purchase * rate / 100, then rule and tier multipliers over 100
    #[test]
    fn prop_breakdown_math(purchase in purchase_strategy(), rate in 1u64..100) {
        let fx = fixture();
        let merchant = register_merchant(&fx, "merchant-1", rate);
        let customer = register_customer(&fx, "wallet-1");

        let breakdown = fx
            .engine
            .issue_rewards(
                IssueRequest {
                    merchant: merchant.clone(),
                    program: fx.program.clone(),
                    customer: customer.clone(),
                    purchase_amount: purchase,
                    rule_id: None,
                    treasury: fx.treasury.clone(),
                },
                NOW,
            )
            .unwrap();

        let base = purchase * rate / 100;
        prop_assert_eq!(breakdown.base_reward, base);
        let expected = base * breakdown.rule_multiplier / 100 * breakdown.tier_multiplier / 100;
        prop_assert_eq!(breakdown.final_reward, expected);
    }
}

mod integration_tests {
    use super::*;
    use loyalty_core::{Config, Ledger};

    #[tokio::test]
    async fn test_conservation_across_merchants_via_facade() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let ledger = Ledger::open(config).await.unwrap();

        let authority = AccountId::new("program-authority");
        let wallet = AccountId::new("wallet-1");
        let program = ledger
            .initialize_program(&authority, "City Rewards", None)
            .await
            .unwrap();
        ledger.register_customer(&wallet, &authority).await.unwrap();

        for (id, rate, purchase) in [("cafe", 10u64, 10_000u64), ("books", 5, 20_000)] {
            let merchant = AccountId::new(id);
            ledger
                .register_merchant(
                    &merchant,
                    &authority,
                    MerchantProfile {
                        name: format!("Shop {}", id),
                        avatar_url: String::new(),
                        category: "retail".to_string(),
                        description: None,
                        reward_rate: rate,
                    },
                )
                .await
                .unwrap();
            ledger
                .issue_rewards(IssueRequest {
                    merchant: merchant.clone(),
                    program: authority.clone(),
                    customer: wallet.clone(),
                    purchase_amount: purchase,
                    rule_id: None,
                    treasury: program.treasury.clone(),
                })
                .await
                .unwrap();
        }

        let program_record = ledger.program(&authority).await.unwrap();
        let cafe = ledger.merchant(&authority, &AccountId::new("cafe")).await.unwrap();
        let books = ledger.merchant(&authority, &AccountId::new("books")).await.unwrap();
        assert_eq!(
            program_record.total_tokens_issued,
            cafe.total_issued + books.total_issued
        );

        ledger.shutdown().await.unwrap();
    }
}
