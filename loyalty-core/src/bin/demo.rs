//! End-to-end demo driver for the loyalty ledger
//!
//! Initializes a program, registers a merchant and a customer, then walks a
//! purchase/redemption flow and prints the resulting breakdowns and events.

use loyalty_core::{
    AccountId, Config, IssueRequest, Ledger, MerchantProfile, OfferParams, OfferType,
    RedeemRequest, RuleParams, RuleType,
};
use rand::Rng;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Solward loyalty demo");

    let mut config = Config::from_env()?;
    if std::env::var("LOYALTY_DATA_DIR").is_err() {
        config.data_dir = std::path::PathBuf::from("./data/loyalty-demo");
    }

    let ledger = Ledger::open(config).await?;
    let mut events = ledger.subscribe();

    let authority = AccountId::new("demo-authority");
    let merchant = AccountId::new("demo-cafe");
    let wallet = AccountId::new("demo-wallet");

    let program = ledger
        .initialize_program(&authority, "City Rewards", None)
        .await?;
    tracing::info!(treasury = %program.treasury, mint = %program.mint, "Program ready");

    ledger
        .register_merchant(
            &merchant,
            &authority,
            MerchantProfile {
                name: "Corner Cafe".to_string(),
                avatar_url: "https://cdn.example/cafe.png".to_string(),
                category: "food".to_string(),
                description: Some("Espresso bar on 5th".to_string()),
                reward_rate: 10,
            },
        )
        .await?;
    ledger.register_customer(&wallet, &authority).await?;

    ledger
        .set_reward_rule(
            &merchant,
            &authority,
            RuleParams {
                rule_id: 1,
                name: "Weekend 2x".to_string(),
                rule_type: RuleType::BonusMultiplier,
                multiplier: 200,
                min_purchase: 2_000,
                start_time: 0,
                end_time: 0,
            },
        )
        .await?;

    ledger
        .create_redemption_offer(
            &merchant,
            &authority,
            OfferParams {
                name: "Free Coffee".to_string(),
                description: "One free coffee, any size".to_string(),
                icon: "coffee".to_string(),
                cost: 150,
                offer_type: OfferType::FreeProduct {
                    product_id: "coffee-any".to_string(),
                },
                quantity_limit: Some(100),
                expiration: None,
            },
        )
        .await?;

    // A handful of purchases, some crossing the rule minimum
    let mut rng = rand::thread_rng();
    for _ in 0..5 {
        let purchase_amount = rng.gen_range(500..5_000);
        let breakdown = ledger
            .issue_rewards(IssueRequest {
                merchant: merchant.clone(),
                program: authority.clone(),
                customer: wallet.clone(),
                purchase_amount,
                rule_id: Some(1),
                treasury: program.treasury.clone(),
            })
            .await?;
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
    }

    let voucher = ledger
        .redeem_rewards(RedeemRequest {
            customer: wallet.clone(),
            program: authority.clone(),
            merchant: merchant.clone(),
            offer_name: "Free Coffee".to_string(),
            amount: 150,
            voucher_seed: rng.gen(),
            mint: program.mint.clone(),
        })
        .await?;
    println!("Voucher code: {}", voucher.redemption_code);

    ledger
        .use_voucher(
            &merchant,
            &authority,
            &wallet,
            &merchant,
            &voucher.offer_name,
            voucher.voucher_seed,
        )
        .await?;

    // Drain the events the flow produced
    while let Ok(event) = events.try_recv() {
        println!("event: {}", serde_json::to_string(&event)?);
    }

    let customer = ledger.customer(&authority, &wallet).await?;
    tracing::info!(
        total_earned = customer.total_earned,
        total_redeemed = customer.total_redeemed,
        tier = %customer.tier,
        "Demo complete"
    );

    ledger.shutdown().await?;
    Ok(())
}
