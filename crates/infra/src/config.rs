//! Configuration loading and representation.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use batchledger_core::{QUANTITY_SCALE, SYNC_TOLERANCE};

pub const ENV_QUANTITY_SCALE: &str = "BATCHLEDGER_QUANTITY_SCALE";
pub const ENV_SYNC_TOLERANCE: &str = "BATCHLEDGER_SYNC_TOLERANCE";
pub const ENV_LOCK_TIMEOUT_MS: &str = "BATCHLEDGER_LOCK_TIMEOUT_MS";
pub const ENV_MAX_PAGE_SIZE: &str = "BATCHLEDGER_MAX_PAGE_SIZE";
pub const ENV_LOG_CONVERSIONS: &str = "BATCHLEDGER_LOG_CONVERSIONS";

/// Runtime settings for [`LedgerService`](crate::service::LedgerService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Decimal places kept on converted quantities.
    pub quantity_scale: u32,
    /// Allowed gap between the cached total and the lot total.
    pub sync_tolerance: Decimal,
    /// How long an adjustment waits for the item lock.
    pub lock_timeout: Duration,
    /// Upper bound for `get_history` page sizes.
    pub max_page_size: usize,
    /// Attach the conversion log when one is supplied.
    pub log_conversions: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            quantity_scale: QUANTITY_SCALE,
            sync_tolerance: SYNC_TOLERANCE,
            lock_timeout: Duration::from_secs(5),
            max_page_size: 100,
            log_conversions: true,
        }
    }
}

impl LedgerConfig {
    /// Read `BATCHLEDGER_*` variables over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let quantity_scale = parse_or(&lookup, ENV_QUANTITY_SCALE, defaults.quantity_scale);
        let sync_tolerance = match parse_or(&lookup, ENV_SYNC_TOLERANCE, defaults.sync_tolerance) {
            t if t < Decimal::ZERO => {
                tracing::warn!(key = ENV_SYNC_TOLERANCE, "negative tolerance; using default");
                defaults.sync_tolerance
            }
            t => t,
        };
        let lock_timeout = Duration::from_millis(parse_or(
            &lookup,
            ENV_LOCK_TIMEOUT_MS,
            u64::try_from(defaults.lock_timeout.as_millis()).unwrap_or(u64::MAX),
        ));
        let max_page_size = match parse_or(&lookup, ENV_MAX_PAGE_SIZE, defaults.max_page_size) {
            0 => {
                tracing::warn!(key = ENV_MAX_PAGE_SIZE, "page size must be at least 1; using default");
                defaults.max_page_size
            }
            n => n,
        };
        let log_conversions = parse_or(&lookup, ENV_LOG_CONVERSIONS, defaults.log_conversions);

        Self {
            quantity_scale,
            sync_tolerance,
            lock_timeout,
            max_page_size,
            log_conversions,
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "unparseable configuration value; using default");
            default
        }
    }
}
