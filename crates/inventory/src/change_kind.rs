//! Closed set of ledger change kinds.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Which ledger path a change kind takes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeFamily {
    /// Creates a new lot.
    Additive,
    /// Draws from existing lots, oldest first.
    Deductive,
    /// Sets an absolute total.
    Recount,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    // additive
    Restock,
    ManualAddition,
    Returned,
    Refunded,
    FinishedBatch,
    InitialStock,
    // deductive
    Use,
    Batch,
    Sale,
    Spoil,
    Trash,
    Expired,
    Damaged,
    Reserved,
    Sample,
    Tester,
    Gift,
    // absolute
    Recount,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 18] = [
        ChangeKind::Restock,
        ChangeKind::ManualAddition,
        ChangeKind::Returned,
        ChangeKind::Refunded,
        ChangeKind::FinishedBatch,
        ChangeKind::InitialStock,
        ChangeKind::Use,
        ChangeKind::Batch,
        ChangeKind::Sale,
        ChangeKind::Spoil,
        ChangeKind::Trash,
        ChangeKind::Expired,
        ChangeKind::Damaged,
        ChangeKind::Reserved,
        ChangeKind::Sample,
        ChangeKind::Tester,
        ChangeKind::Gift,
        ChangeKind::Recount,
    ];

    pub fn family(self) -> ChangeFamily {
        match self {
            ChangeKind::Restock
            | ChangeKind::ManualAddition
            | ChangeKind::Returned
            | ChangeKind::Refunded
            | ChangeKind::FinishedBatch
            | ChangeKind::InitialStock => ChangeFamily::Additive,
            ChangeKind::Use
            | ChangeKind::Batch
            | ChangeKind::Sale
            | ChangeKind::Spoil
            | ChangeKind::Trash
            | ChangeKind::Expired
            | ChangeKind::Damaged
            | ChangeKind::Reserved
            | ChangeKind::Sample
            | ChangeKind::Tester
            | ChangeKind::Gift => ChangeFamily::Deductive,
            ChangeKind::Recount => ChangeFamily::Recount,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Restock => "restock",
            ChangeKind::ManualAddition => "manual_addition",
            ChangeKind::Returned => "returned",
            ChangeKind::Refunded => "refunded",
            ChangeKind::FinishedBatch => "finished_batch",
            ChangeKind::InitialStock => "initial_stock",
            ChangeKind::Use => "use",
            ChangeKind::Batch => "batch",
            ChangeKind::Sale => "sale",
            ChangeKind::Spoil => "spoil",
            ChangeKind::Trash => "trash",
            ChangeKind::Expired => "expired",
            ChangeKind::Damaged => "damaged",
            ChangeKind::Reserved => "reserved",
            ChangeKind::Sample => "sample",
            ChangeKind::Tester => "tester",
            ChangeKind::Gift => "gift",
            ChangeKind::Recount => "recount",
        }
    }
}

impl core::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ChangeKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| LedgerError::UnknownChangeKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_name() {
        for kind in ChangeKind::ALL {
            assert_eq!(kind.as_str().parse::<ChangeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn families_partition_the_kinds() {
        let additive = ChangeKind::ALL
            .iter()
            .filter(|k| k.family() == ChangeFamily::Additive)
            .count();
        let deductive = ChangeKind::ALL
            .iter()
            .filter(|k| k.family() == ChangeFamily::Deductive)
            .count();
        assert_eq!(additive, 6);
        assert_eq!(deductive, 11);
        assert_eq!(ChangeKind::Recount.family(), ChangeFamily::Recount);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "borrowed".parse::<ChangeKind>().unwrap_err();
        assert!(matches!(err, LedgerError::UnknownChangeKind(s) if s == "borrowed"));
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&ChangeKind::FinishedBatch).unwrap();
        assert_eq!(json, "\"finished_batch\"");
    }
}
