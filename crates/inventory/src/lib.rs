//! Inventory lot ledger (pure domain logic).
//!
//! An [`InventoryItem`] owns its FIFO lots. Adjustments are decided against an
//! immutable snapshot (`Aggregate::handle`) and applied as [`LedgerEvent`]s, so
//! the resulting state can be checked before anything is persisted. Storage,
//! locking and unit conversion are wired together in `batchledger-infra`.

pub mod change_kind;
pub mod error;
pub mod history;
pub mod item;
pub mod ledger;
pub mod lot;
pub mod sync;
pub mod valuation;

pub use change_kind::{ChangeFamily, ChangeKind};
pub use error::{LedgerError, LedgerResult};
pub use history::{HistoryEntry, HistoryPage};
pub use item::{InventoryItem, ItemRecord, NewItem};
pub use ledger::{LedgerCommand, LedgerEvent};
pub use lot::Lot;
pub use sync::SyncReport;
pub use valuation::Valuation;
