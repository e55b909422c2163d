//! Infrastructure layer: storage, locking, config and the ledger service.

pub mod config;
pub mod locks;
pub mod service;
pub mod store;

pub use config::LedgerConfig;
pub use locks::ItemLocks;
pub use service::{Adjustment, AdjustmentReceipt, LedgerService, LotDraw};
pub use store::{ChangeSet, InMemoryLedgerStore, LedgerStore, StoreError, Transaction};
