//! `batchledger-core`: shared building blocks for the lot ledger.
//!
//! Pure domain primitives only: identifiers, the domain error model, aggregate
//! traits and decimal quantity helpers. Nothing here performs IO.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod quantity;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{HistoryEntryId, ItemId, LotId, OrganizationId, UserId};
pub use quantity::{Quantity, QUANTITY_SCALE, SYNC_TOLERANCE};
