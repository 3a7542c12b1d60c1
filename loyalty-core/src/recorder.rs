//! Ledger recorder
//!
//! Builds the immutable history rows that accompany every balance change:
//! the append-only [`TransactionRecord`], the per-pair
//! [`MerchantCustomerRecord`] aggregate, and the per-voucher
//! [`OfferRedemptionRecord`]. The recorder only stages writes into the
//! request's [`Batch`]; the engine commits them together with the account
//! mutations so history and balances can never diverge.

use crate::storage::{Batch, Storage};
use crate::tier::Tier;
use crate::types::{
    AccountId, MerchantCustomerRecord, OfferRedemptionRecord, TransactionKind, TransactionRecord,
};
use crate::{Error, Result};
use std::sync::Arc;

/// Stages history writes for engine operations
pub struct Recorder {
    storage: Arc<Storage>,
}

impl Recorder {
    /// Create a recorder over the shared store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Stage the transaction record for a balance change
    ///
    /// `index` is the customer's pre-increment transaction count, which makes
    /// the per-customer history sequence gapless and ordered.
    #[allow(clippy::too_many_arguments)]
    pub fn append_transaction(
        &self,
        batch: &mut Batch,
        program: &AccountId,
        customer: &AccountId,
        merchant: &AccountId,
        kind: TransactionKind,
        amount: u64,
        tier: Tier,
        index: u64,
        now: i64,
    ) -> Result<TransactionRecord> {
        let record = TransactionRecord {
            customer: customer.clone(),
            merchant: merchant.clone(),
            kind,
            amount,
            tier: tier.as_u8(),
            timestamp: now,
            index,
        };
        batch.put_transaction(program, &record)?;
        Ok(record)
    }

    /// Stage the merchant/customer aggregate upsert for a balance change
    ///
    /// Creates the row on first contact (setting `first_transaction`), then
    /// keeps its totals in lockstep with the customer and merchant counters.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_relation(
        &self,
        batch: &mut Batch,
        program: &AccountId,
        merchant: &AccountId,
        customer: &AccountId,
        kind: TransactionKind,
        amount: u64,
        now: i64,
    ) -> Result<MerchantCustomerRecord> {
        let mut relation = self
            .storage
            .try_get_relation(program, merchant, customer)?
            .unwrap_or_else(|| MerchantCustomerRecord {
                merchant: merchant.clone(),
                customer: customer.clone(),
                total_issued: 0,
                total_redeemed: 0,
                transaction_count: 0,
                first_transaction: now,
                last_transaction: now,
            });

        match kind {
            TransactionKind::Issue => {
                relation.total_issued = relation
                    .total_issued
                    .checked_add(amount)
                    .ok_or(Error::Overflow)?;
            }
            TransactionKind::Redeem => {
                relation.total_redeemed = relation
                    .total_redeemed
                    .checked_add(amount)
                    .ok_or(Error::Overflow)?;
            }
        }
        relation.transaction_count = relation
            .transaction_count
            .checked_add(1)
            .ok_or(Error::Overflow)?;
        relation.last_transaction = now;

        batch.put_relation(program, &relation)?;
        Ok(relation)
    }

    /// Stage the per-voucher redemption analytics row
    #[allow(clippy::too_many_arguments)]
    pub fn append_redemption(
        &self,
        batch: &mut Batch,
        program: &AccountId,
        merchant: &AccountId,
        offer_name: &str,
        customer: &AccountId,
        voucher_seed: u64,
        amount: u64,
        now: i64,
    ) -> Result<OfferRedemptionRecord> {
        let record = OfferRedemptionRecord {
            offer_name: offer_name.to_string(),
            merchant: merchant.clone(),
            customer: customer.clone(),
            voucher_seed,
            amount,
            timestamp: now,
            is_used: false,
            used_at: None,
        };
        batch.put_redemption(program, &record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    fn test_recorder() -> (Recorder, Arc<Storage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        (Recorder::new(storage.clone()), storage, temp_dir)
    }

    #[test]
    fn test_relation_first_and_last_transaction() {
        let (recorder, storage, _temp) = test_recorder();
        let program = AccountId::new("program-1");
        let merchant = AccountId::new("merchant-1");
        let customer = AccountId::new("wallet-1");

        let mut batch = Batch::new();
        recorder
            .upsert_relation(
                &mut batch,
                &program,
                &merchant,
                &customer,
                TransactionKind::Issue,
                100,
                10,
            )
            .unwrap();
        storage.commit(batch).unwrap();

        let mut batch = Batch::new();
        let relation = recorder
            .upsert_relation(
                &mut batch,
                &program,
                &merchant,
                &customer,
                TransactionKind::Redeem,
                40,
                20,
            )
            .unwrap();
        storage.commit(batch).unwrap();

        assert_eq!(relation.total_issued, 100);
        assert_eq!(relation.total_redeemed, 40);
        assert_eq!(relation.transaction_count, 2);
        assert_eq!(relation.first_transaction, 10);
        assert_eq!(relation.last_transaction, 20);
    }

    #[test]
    fn test_transaction_record_snapshot() {
        let (recorder, storage, _temp) = test_recorder();
        let program = AccountId::new("program-1");

        let mut batch = Batch::new();
        let record = recorder
            .append_transaction(
                &mut batch,
                &program,
                &AccountId::new("wallet-1"),
                &AccountId::new("merchant-1"),
                TransactionKind::Issue,
                250,
                Tier::Silver,
                3,
                99,
            )
            .unwrap();
        storage.commit(batch).unwrap();

        assert_eq!(record.amount, 250);
        assert_eq!(record.tier, Tier::Silver.as_u8());
        assert_eq!(record.index, 3);

        let history = storage
            .transactions_for_customer(&program, &AccountId::new("wallet-1"))
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, 99);
    }
}
