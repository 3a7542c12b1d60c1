//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `programs` - Loyalty programs (key: authority)
//! - `merchants` - Merchant accounts (key: program || authority)
//! - `customers` - Customer accounts (key: program || wallet)
//! - `rules` - Reward rules (key: program || merchant || rule_id)
//! - `offers` - Redemption offers (key: program || merchant || name)
//! - `vouchers` - Redemption vouchers (key: program || customer || merchant || offer || seed)
//! - `transactions` - Append-only history (key: program || customer || index)
//! - `relations` - Merchant/customer aggregates (key: program || merchant || customer)
//! - `redemptions` - Per-voucher redemption analytics (key: program || merchant || offer || customer || seed)
//!
//! # Keys
//!
//! Every key is a sequence of length-prefixed segments produced by
//! [`composite_key`]. The same constituent ids always resolve to the same
//! key, and two distinct id tuples can never alias because segment
//! boundaries are explicit. Numeric segments (rule ids, voucher seeds,
//! transaction indexes) are big-endian, so iteration order within a prefix
//! is numeric order.
//!
//! # Atomicity
//!
//! Mutating operations accumulate typed puts/deletes in a [`Batch`] and
//! commit it with [`Storage::commit`], which writes everything in a single
//! RocksDB `WriteBatch`. Either all records in a request commit, or none do.

use crate::{
    error::{Error, Result},
    types::{
        AccountId, Customer, Merchant, MerchantCustomerRecord, OfferRedemptionRecord, Program,
        RedemptionOffer, RedemptionVoucher, RewardRule, TransactionRecord,
    },
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Column family names
const CF_PROGRAMS: &str = "programs";
const CF_MERCHANTS: &str = "merchants";
const CF_CUSTOMERS: &str = "customers";
const CF_RULES: &str = "rules";
const CF_OFFERS: &str = "offers";
const CF_VOUCHERS: &str = "vouchers";
const CF_TRANSACTIONS: &str = "transactions";
const CF_RELATIONS: &str = "relations";
const CF_REDEMPTIONS: &str = "redemptions";

const ALL_CFS: &[&str] = &[
    CF_PROGRAMS,
    CF_MERCHANTS,
    CF_CUSTOMERS,
    CF_RULES,
    CF_OFFERS,
    CF_VOUCHERS,
    CF_TRANSACTIONS,
    CF_RELATIONS,
    CF_REDEMPTIONS,
];

/// Build a composite key from length-prefixed segments
///
/// Each segment is written as a u16 big-endian length followed by its bytes.
/// A prefix of segments is therefore a byte-prefix of every key that extends
/// it, which is what the scan helpers rely on.
pub fn composite_key(segments: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(segments.iter().map(|s| s.len() + 2).sum());
    for segment in segments {
        debug_assert!(segment.len() <= u16::MAX as usize);
        key.extend_from_slice(&(segment.len() as u16).to_be_bytes());
        key.extend_from_slice(segment);
    }
    key
}

/// Key for a program record
pub fn program_key(authority: &AccountId) -> Vec<u8> {
    composite_key(&[authority.as_bytes()])
}

/// Key for a merchant record
pub fn merchant_key(program: &AccountId, authority: &AccountId) -> Vec<u8> {
    composite_key(&[program.as_bytes(), authority.as_bytes()])
}

/// Key for a customer record
pub fn customer_key(program: &AccountId, wallet: &AccountId) -> Vec<u8> {
    composite_key(&[program.as_bytes(), wallet.as_bytes()])
}

/// Key for a reward rule
pub fn rule_key(program: &AccountId, merchant: &AccountId, rule_id: u64) -> Vec<u8> {
    composite_key(&[
        program.as_bytes(),
        merchant.as_bytes(),
        &rule_id.to_be_bytes(),
    ])
}

/// Key for a redemption offer
pub fn offer_key(program: &AccountId, merchant: &AccountId, name: &str) -> Vec<u8> {
    composite_key(&[program.as_bytes(), merchant.as_bytes(), name.as_bytes()])
}

/// Key for a redemption voucher
pub fn voucher_key(
    program: &AccountId,
    customer: &AccountId,
    merchant: &AccountId,
    offer_name: &str,
    voucher_seed: u64,
) -> Vec<u8> {
    composite_key(&[
        program.as_bytes(),
        customer.as_bytes(),
        merchant.as_bytes(),
        offer_name.as_bytes(),
        &voucher_seed.to_be_bytes(),
    ])
}

/// Key for a transaction record
pub fn transaction_key(program: &AccountId, customer: &AccountId, index: u64) -> Vec<u8> {
    composite_key(&[
        program.as_bytes(),
        customer.as_bytes(),
        &index.to_be_bytes(),
    ])
}

/// Key for a merchant/customer relation record
pub fn relation_key(program: &AccountId, merchant: &AccountId, customer: &AccountId) -> Vec<u8> {
    composite_key(&[
        program.as_bytes(),
        merchant.as_bytes(),
        customer.as_bytes(),
    ])
}

/// Key for an offer redemption record
pub fn redemption_key(
    program: &AccountId,
    merchant: &AccountId,
    offer_name: &str,
    customer: &AccountId,
    voucher_seed: u64,
) -> Vec<u8> {
    composite_key(&[
        program.as_bytes(),
        merchant.as_bytes(),
        offer_name.as_bytes(),
        customer.as_bytes(),
        &voucher_seed.to_be_bytes(),
    ])
}

enum BatchOp {
    Put { value: Vec<u8> },
    Delete,
}

/// A set of typed record writes committed atomically
#[derive(Default)]
pub struct Batch {
    ops: Vec<(&'static str, Vec<u8>, BatchOp)>,
}

impl Batch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no pending operations
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn put<T: serde::Serialize>(&mut self, cf: &'static str, key: Vec<u8>, value: &T) -> Result<()> {
        let value = bincode::serialize(value)?;
        self.ops.push((cf, key, BatchOp::Put { value }));
        Ok(())
    }

    fn delete(&mut self, cf: &'static str, key: Vec<u8>) {
        self.ops.push((cf, key, BatchOp::Delete));
    }

    /// Stage a program write
    pub fn put_program(&mut self, program: &Program) -> Result<()> {
        self.put(CF_PROGRAMS, program_key(&program.authority), program)
    }

    /// Stage a merchant write
    pub fn put_merchant(&mut self, merchant: &Merchant) -> Result<()> {
        self.put(
            CF_MERCHANTS,
            merchant_key(&merchant.program, &merchant.authority),
            merchant,
        )
    }

    /// Stage a merchant delete
    pub fn delete_merchant(&mut self, program: &AccountId, authority: &AccountId) {
        self.delete(CF_MERCHANTS, merchant_key(program, authority));
    }

    /// Stage a customer write
    pub fn put_customer(&mut self, customer: &Customer) -> Result<()> {
        self.put(
            CF_CUSTOMERS,
            customer_key(&customer.program, &customer.wallet),
            customer,
        )
    }

    /// Stage a reward rule write
    pub fn put_rule(&mut self, program: &AccountId, rule: &RewardRule) -> Result<()> {
        self.put(CF_RULES, rule_key(program, &rule.merchant, rule.rule_id), rule)
    }

    /// Stage a reward rule delete
    pub fn delete_rule(&mut self, program: &AccountId, merchant: &AccountId, rule_id: u64) {
        self.delete(CF_RULES, rule_key(program, merchant, rule_id));
    }

    /// Stage a redemption offer write
    pub fn put_offer(&mut self, offer: &RedemptionOffer) -> Result<()> {
        self.put(
            CF_OFFERS,
            offer_key(&offer.program, &offer.merchant, &offer.name),
            offer,
        )
    }

    /// Stage a redemption offer delete
    pub fn delete_offer(&mut self, program: &AccountId, merchant: &AccountId, name: &str) {
        self.delete(CF_OFFERS, offer_key(program, merchant, name));
    }

    /// Stage a voucher write
    pub fn put_voucher(&mut self, program: &AccountId, voucher: &RedemptionVoucher) -> Result<()> {
        self.put(
            CF_VOUCHERS,
            voucher_key(
                program,
                &voucher.customer,
                &voucher.merchant,
                &voucher.offer_name,
                voucher.voucher_seed,
            ),
            voucher,
        )
    }

    /// Stage a transaction record append
    pub fn put_transaction(&mut self, program: &AccountId, record: &TransactionRecord) -> Result<()> {
        self.put(
            CF_TRANSACTIONS,
            transaction_key(program, &record.customer, record.index),
            record,
        )
    }

    /// Stage a merchant/customer relation write
    pub fn put_relation(
        &mut self,
        program: &AccountId,
        relation: &MerchantCustomerRecord,
    ) -> Result<()> {
        self.put(
            CF_RELATIONS,
            relation_key(program, &relation.merchant, &relation.customer),
            relation,
        )
    }

    /// Stage an offer redemption record write
    pub fn put_redemption(
        &mut self,
        program: &AccountId,
        record: &OfferRedemptionRecord,
    ) -> Result<()> {
        self.put(
            CF_REDEMPTIONS,
            redemption_key(
                program,
                &record.merchant,
                &record.offer_name,
                &record.customer,
                record.voucher_seed,
            ),
            record,
        )
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for write-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        // Column family descriptors
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect();

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, column_families = ALL_CFS.len(), "Opened RocksDB");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        match name {
            // Append-only history compresses well and is rarely read
            CF_TRANSACTIONS | CF_VOUCHERS | CF_REDEMPTIONS => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            }
            // Hot account state is read on every request, use LZ4 for speed
            _ => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
        }
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf)?;
        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    // Program operations

    /// Get program if present
    pub fn try_get_program(&self, authority: &AccountId) -> Result<Option<Program>> {
        self.read(CF_PROGRAMS, &program_key(authority))
    }

    /// Get program or fail
    pub fn get_program(&self, authority: &AccountId) -> Result<Program> {
        self.try_get_program(authority)?
            .ok_or_else(|| Error::ProgramNotFound(authority.to_string()))
    }

    // Merchant operations

    /// Get merchant if present
    pub fn try_get_merchant(
        &self,
        program: &AccountId,
        authority: &AccountId,
    ) -> Result<Option<Merchant>> {
        self.read(CF_MERCHANTS, &merchant_key(program, authority))
    }

    /// Get merchant or fail
    pub fn get_merchant(&self, program: &AccountId, authority: &AccountId) -> Result<Merchant> {
        self.try_get_merchant(program, authority)?
            .ok_or_else(|| Error::MerchantNotFound(authority.to_string()))
    }

    // Customer operations

    /// Get customer if present
    pub fn try_get_customer(
        &self,
        program: &AccountId,
        wallet: &AccountId,
    ) -> Result<Option<Customer>> {
        self.read(CF_CUSTOMERS, &customer_key(program, wallet))
    }

    /// Get customer or fail
    pub fn get_customer(&self, program: &AccountId, wallet: &AccountId) -> Result<Customer> {
        self.try_get_customer(program, wallet)?
            .ok_or_else(|| Error::CustomerNotFound(wallet.to_string()))
    }

    // Reward rule operations

    /// Get reward rule if present
    pub fn try_get_rule(
        &self,
        program: &AccountId,
        merchant: &AccountId,
        rule_id: u64,
    ) -> Result<Option<RewardRule>> {
        self.read(CF_RULES, &rule_key(program, merchant, rule_id))
    }

    /// Get reward rule or fail
    pub fn get_rule(
        &self,
        program: &AccountId,
        merchant: &AccountId,
        rule_id: u64,
    ) -> Result<RewardRule> {
        self.try_get_rule(program, merchant, rule_id)?
            .ok_or_else(|| Error::RuleNotFound(format!("{}/{}", merchant, rule_id)))
    }

    /// All reward rules owned by a merchant, in rule-id order
    pub fn rules_for_merchant(
        &self,
        program: &AccountId,
        merchant: &AccountId,
    ) -> Result<Vec<RewardRule>> {
        let prefix = composite_key(&[program.as_bytes(), merchant.as_bytes()]);
        self.scan(CF_RULES, &prefix)
    }

    // Redemption offer operations

    /// Get redemption offer if present
    pub fn try_get_offer(
        &self,
        program: &AccountId,
        merchant: &AccountId,
        name: &str,
    ) -> Result<Option<RedemptionOffer>> {
        self.read(CF_OFFERS, &offer_key(program, merchant, name))
    }

    /// Get redemption offer or fail
    pub fn get_offer(
        &self,
        program: &AccountId,
        merchant: &AccountId,
        name: &str,
    ) -> Result<RedemptionOffer> {
        self.try_get_offer(program, merchant, name)?
            .ok_or_else(|| Error::OfferNotFound(format!("{}/{}", merchant, name)))
    }

    /// All redemption offers owned by a merchant, in name order
    pub fn offers_for_merchant(
        &self,
        program: &AccountId,
        merchant: &AccountId,
    ) -> Result<Vec<RedemptionOffer>> {
        let prefix = composite_key(&[program.as_bytes(), merchant.as_bytes()]);
        self.scan(CF_OFFERS, &prefix)
    }

    // Voucher operations

    /// Get voucher if present
    pub fn try_get_voucher(
        &self,
        program: &AccountId,
        customer: &AccountId,
        merchant: &AccountId,
        offer_name: &str,
        voucher_seed: u64,
    ) -> Result<Option<RedemptionVoucher>> {
        self.read(
            CF_VOUCHERS,
            &voucher_key(program, customer, merchant, offer_name, voucher_seed),
        )
    }

    /// Get voucher or fail
    pub fn get_voucher(
        &self,
        program: &AccountId,
        customer: &AccountId,
        merchant: &AccountId,
        offer_name: &str,
        voucher_seed: u64,
    ) -> Result<RedemptionVoucher> {
        self.try_get_voucher(program, customer, merchant, offer_name, voucher_seed)?
            .ok_or_else(|| {
                Error::VoucherNotFound(format!("{}/{}/{}", customer, offer_name, voucher_seed))
            })
    }

    /// All vouchers held by a customer, in key order
    pub fn vouchers_for_customer(
        &self,
        program: &AccountId,
        customer: &AccountId,
    ) -> Result<Vec<RedemptionVoucher>> {
        let prefix = composite_key(&[program.as_bytes(), customer.as_bytes()]);
        self.scan(CF_VOUCHERS, &prefix)
    }

    // History operations

    /// A customer's transaction history in append order
    pub fn transactions_for_customer(
        &self,
        program: &AccountId,
        customer: &AccountId,
    ) -> Result<Vec<TransactionRecord>> {
        let prefix = composite_key(&[program.as_bytes(), customer.as_bytes()]);
        self.scan(CF_TRANSACTIONS, &prefix)
    }

    /// Get merchant/customer relation if present
    pub fn try_get_relation(
        &self,
        program: &AccountId,
        merchant: &AccountId,
        customer: &AccountId,
    ) -> Result<Option<MerchantCustomerRecord>> {
        self.read(CF_RELATIONS, &relation_key(program, merchant, customer))
    }

    /// Get offer redemption record if present
    pub fn try_get_redemption(
        &self,
        program: &AccountId,
        merchant: &AccountId,
        offer_name: &str,
        customer: &AccountId,
        voucher_seed: u64,
    ) -> Result<Option<OfferRedemptionRecord>> {
        self.read(
            CF_REDEMPTIONS,
            &redemption_key(program, merchant, offer_name, customer, voucher_seed),
        )
    }

    // Batch operations (atomic)

    /// Commit a batch of record writes atomically
    pub fn commit(&self, batch: Batch) -> Result<()> {
        let mut write_batch = WriteBatch::default();

        for (cf_name, key, op) in &batch.ops {
            let cf = self.cf_handle(cf_name)?;
            match op {
                BatchOp::Put { value } => write_batch.put_cf(cf, key, value),
                BatchOp::Delete => write_batch.delete_cf(cf, key),
            }
        }

        let count = batch.ops.len();
        self.db.write(write_batch)?;

        tracing::debug!(writes = count, "Batch committed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::Tier;
    use crate::types::TransactionKind;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_merchant(program: &str, authority: &str) -> Merchant {
        Merchant {
            authority: AccountId::new(authority),
            program: AccountId::new(program),
            name: "Corner Cafe".to_string(),
            description: String::new(),
            avatar_url: String::new(),
            category: "food".to_string(),
            reward_rate: 10,
            total_issued: 0,
            total_redeemed: 0,
            is_active: true,
            created_at: 0,
        }
    }

    #[test]
    fn test_composite_key_no_aliasing() {
        // ("ab", "c") and ("a", "bc") must not produce the same key
        let key1 = composite_key(&[b"ab", b"c"]);
        let key2 = composite_key(&[b"a", b"bc"]);
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        for cf in ALL_CFS {
            assert!(storage.db.cf_handle(cf).is_some());
        }
    }

    #[test]
    fn test_merchant_round_trip() {
        let (storage, _temp) = test_storage();
        let merchant = test_merchant("program-1", "merchant-1");

        let mut batch = Batch::new();
        batch.put_merchant(&merchant).unwrap();
        storage.commit(batch).unwrap();

        let retrieved = storage
            .get_merchant(&merchant.program, &merchant.authority)
            .unwrap();
        assert_eq!(retrieved.name, merchant.name);
        assert_eq!(retrieved.reward_rate, 10);

        assert!(storage
            .try_get_merchant(&merchant.program, &AccountId::new("missing"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_atomic_commit_spans_column_families() {
        let (storage, _temp) = test_storage();
        let program = AccountId::new("program-1");
        let merchant = test_merchant("program-1", "merchant-1");
        let record = TransactionRecord {
            customer: AccountId::new("wallet-1"),
            merchant: merchant.authority.clone(),
            kind: TransactionKind::Issue,
            amount: 100,
            tier: Tier::Bronze.as_u8(),
            timestamp: 1,
            index: 0,
        };

        let mut batch = Batch::new();
        batch.put_merchant(&merchant).unwrap();
        batch.put_transaction(&program, &record).unwrap();
        assert_eq!(batch.len(), 2);
        storage.commit(batch).unwrap();

        assert!(storage
            .try_get_merchant(&program, &merchant.authority)
            .unwrap()
            .is_some());
        let history = storage
            .transactions_for_customer(&program, &record.customer)
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_transaction_scan_is_in_index_order() {
        let (storage, _temp) = test_storage();
        let program = AccountId::new("program-1");
        let customer = AccountId::new("wallet-1");

        // Indexes chosen to catch lexicographic-vs-numeric ordering bugs
        let mut batch = Batch::new();
        for index in [0u64, 2, 300, 1] {
            let record = TransactionRecord {
                customer: customer.clone(),
                merchant: AccountId::new("merchant-1"),
                kind: TransactionKind::Issue,
                amount: 1,
                tier: 0,
                timestamp: 0,
                index,
            };
            batch.put_transaction(&program, &record).unwrap();
        }
        storage.commit(batch).unwrap();

        let history = storage.transactions_for_customer(&program, &customer).unwrap();
        let indexes: Vec<u64> = history.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 300]);
    }

    #[test]
    fn test_rule_scan_isolated_per_merchant() {
        let (storage, _temp) = test_storage();
        let program = AccountId::new("program-1");

        let mut batch = Batch::new();
        for (merchant, rule_id) in [("merchant-1", 1u64), ("merchant-1", 2), ("merchant-2", 1)] {
            let rule = RewardRule {
                merchant: AccountId::new(merchant),
                rule_id,
                name: "Rule".to_string(),
                rule_type: crate::types::RuleType::BonusMultiplier,
                multiplier: 150,
                min_purchase: 0,
                is_active: true,
                start_time: 0,
                end_time: 0,
            };
            batch.put_rule(&program, &rule).unwrap();
        }
        storage.commit(batch).unwrap();

        let rules = storage
            .rules_for_merchant(&program, &AccountId::new("merchant-1"))
            .unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.merchant.as_str() == "merchant-1"));
    }

    #[test]
    fn test_delete_rule() {
        let (storage, _temp) = test_storage();
        let program = AccountId::new("program-1");
        let merchant = AccountId::new("merchant-1");
        let rule = RewardRule {
            merchant: merchant.clone(),
            rule_id: 1,
            name: "Rule".to_string(),
            rule_type: crate::types::RuleType::BonusMultiplier,
            multiplier: 150,
            min_purchase: 0,
            is_active: true,
            start_time: 0,
            end_time: 0,
        };

        let mut batch = Batch::new();
        batch.put_rule(&program, &rule).unwrap();
        storage.commit(batch).unwrap();
        assert!(storage.try_get_rule(&program, &merchant, 1).unwrap().is_some());

        let mut batch = Batch::new();
        batch.delete_rule(&program, &merchant, 1);
        storage.commit(batch).unwrap();
        assert!(storage.try_get_rule(&program, &merchant, 1).unwrap().is_none());
    }
}
