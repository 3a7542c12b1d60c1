//! Error types for the loyalty ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Loyalty ledger errors
///
/// Variant names are the stable identifiers returned to callers; they never
/// change meaning between releases.
#[derive(Error, Debug)]
pub enum Error {
    /// Insufficient token balance for redemption
    #[error("Insufficient token balance for redemption")]
    InsufficientBalance,

    /// Merchant account is not active
    #[error("Merchant account is not active")]
    MerchantNotActive,

    /// Invalid reward amount
    #[error("Invalid reward amount")]
    InvalidRewardAmount,

    /// Arithmetic overflow in calculation
    #[error("Arithmetic overflow in calculation")]
    Overflow,

    /// Invalid customer tier
    #[error("Invalid customer tier: {0}")]
    InvalidTier(u8),

    /// Reward rule is not active
    #[error("Reward rule is not active")]
    RuleNotActive,

    /// Invalid time range for reward rule
    #[error("Invalid time range for reward rule")]
    InvalidTimeRange,

    /// Name exceeds maximum length
    #[error("Name exceeds maximum length")]
    NameTooLong,

    /// Name cannot be empty
    #[error("Name cannot be empty")]
    NameEmpty,

    /// Invalid interest rate
    #[error("Invalid interest rate")]
    InvalidInterestRate,

    /// Unauthorized access to account
    #[error("Unauthorized access to account")]
    UnauthorizedAccess,

    /// Invalid mint for token account
    #[error("Invalid mint for token account")]
    InvalidMint,

    /// Invalid platform treasury account
    #[error("Invalid platform treasury account")]
    InvalidTreasury,

    /// Redemption offer is not available (expired, sold out, or inactive)
    #[error("Redemption offer is not available (expired, sold out, or inactive)")]
    OfferNotAvailable,

    /// Merchant still has active reward rules
    #[error("Merchant has active reward rules. Delete all rules before closing account.")]
    MerchantHasActiveRules,

    /// Voucher has already been used
    #[error("Voucher has already been used")]
    VoucherAlreadyUsed,

    /// Voucher has expired
    #[error("Voucher has expired")]
    VoucherExpired,

    /// Program not found
    #[error("Program not found: {0}")]
    ProgramNotFound(String),

    /// Merchant not found
    #[error("Merchant not found: {0}")]
    MerchantNotFound(String),

    /// Customer not found
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Reward rule not found
    #[error("Reward rule not found: {0}")]
    RuleNotFound(String),

    /// Redemption offer not found
    #[error("Redemption offer not found: {0}")]
    OfferNotFound(String),

    /// Voucher not found
    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),

    /// A record with the same key already exists
    #[error("{kind} already exists: {key}")]
    AlreadyExists {
        /// Record kind (e.g. "merchant", "voucher")
        kind: &'static str,
        /// Human-readable key of the conflicting record
        key: String,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
