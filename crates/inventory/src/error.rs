//! Ledger error taxonomy.

use rust_decimal::Decimal;
use thiserror::Error;

use batchledger_core::{DomainError, ItemId};
use batchledger_units::ConversionError;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Every failure the ledger reports to callers.
///
/// All variants except a committed [`LedgerError::SyncFault`] are raised before
/// any lot is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("converting {from} to {to} requires a density")]
    MissingDensity { from: String, to: String },

    #[error("cannot convert {from} to {to}")]
    UnsupportedConversion { from: String, to: String },

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: Decimal, available: Decimal },

    #[error("unknown change kind '{0}'")]
    UnknownChangeKind(String),

    /// Cached quantity and lot total disagree. `committed = true` means the
    /// mismatch was found after the change set was written.
    #[error(
        "sync fault on item {item_id}: cached {cached_quantity} vs lots {lot_total} (committed: {committed})"
    )]
    SyncFault {
        item_id: ItemId,
        cached_quantity: Decimal,
        lot_total: Decimal,
        committed: bool,
    },

    #[error("inventory item {0} not found")]
    ItemNotFound(ItemId),

    #[error("timed out after {waited_ms}ms waiting for the lock on item {item_id}")]
    LockTimeout { item_id: ItemId, waited_ms: u64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("store error: {0}")]
    Store(String),
}

impl LedgerError {
    /// A committed sync fault cannot be rolled back and must be escalated.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::SyncFault { committed: true, .. })
    }
}

impl From<ConversionError> for LedgerError {
    fn from(value: ConversionError) -> Self {
        match value {
            ConversionError::UnknownUnit(unit) => LedgerError::UnknownUnit(unit),
            ConversionError::InvalidAmount(msg) => LedgerError::InvalidAmount(msg),
            ConversionError::MissingDensity { from, to } => LedgerError::MissingDensity { from, to },
            ConversionError::UnsupportedConversion { from, to, .. } => {
                LedgerError::UnsupportedConversion { from, to }
            }
        }
    }
}
