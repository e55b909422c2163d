//! Conversion engine.
//!
//! Resolution order for a request:
//!
//! 1. organization custom mapping on either side (`custom`)
//! 2. identical units (`direct`)
//! 3. same dimension, by factor (`direct`)
//! 4. weight <-> volume through a density (`density`)
//!
//! Anything else is unconvertible. Results are rounded to the engine's scale.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use batchledger_core::quantity::round_to;
use batchledger_core::{ItemId, OrganizationId, QUANTITY_SCALE};

use crate::catalog::UnitCatalog;
use crate::log::{ConversionLog, ConversionRecord};
use crate::unit::{normalize_unit_name, Dimension, Unit};

/// How a conversion was carried out.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionKind {
    Direct,
    Density,
    Custom,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("converting {from} to {to} requires a density")]
    MissingDensity { from: String, to: String },

    #[error("cannot convert {from_dimension} ({from}) to {to_dimension} ({to})")]
    UnsupportedConversion {
        from: String,
        to: String,
        from_dimension: Dimension,
        to_dimension: Dimension,
    },
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub value: Decimal,
    pub kind: ConversionKind,
    /// Density (g/ml) the conversion went through, when it crossed weight/volume.
    pub density_used: Option<Decimal>,
    pub from_unit: String,
    pub to_unit: String,
}

/// One conversion request.
///
/// `density` is an explicit override; `item_density` is the stored density of
/// the item the quantity belongs to and is only consulted when no override is
/// given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest<'a> {
    pub organization_id: Option<OrganizationId>,
    pub item_id: Option<ItemId>,
    pub amount: Decimal,
    pub from_unit: &'a str,
    pub to_unit: &'a str,
    pub density: Option<Decimal>,
    pub item_density: Option<Decimal>,
}

impl<'a> ConversionRequest<'a> {
    pub fn new(amount: Decimal, from_unit: &'a str, to_unit: &'a str) -> Self {
        Self {
            organization_id: None,
            item_id: None,
            amount,
            from_unit,
            to_unit,
            density: None,
            item_density: None,
        }
    }

    pub fn for_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn for_item(mut self, item_id: ItemId, item_density: Option<Decimal>) -> Self {
        self.item_id = Some(item_id);
        self.item_density = item_density;
        self
    }

    pub fn with_density(mut self, density: Decimal) -> Self {
        self.density = Some(density);
        self
    }
}

/// Parse a user-supplied amount.
pub fn parse_amount(raw: &str) -> Result<Decimal, ConversionError> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ConversionError::InvalidAmount(format!("'{raw}' is not a number")))
}

/// Unrounded intermediate result.
struct Converted {
    value: Decimal,
    kind: ConversionKind,
    density_used: Option<Decimal>,
}

/// A density as handed in, checked only once a conversion actually needs it.
#[derive(Clone, Copy)]
struct SuppliedDensity {
    value: Decimal,
    source: &'static str,
}

/// Converts quantities between units.
pub struct ConversionEngine {
    catalog: Arc<UnitCatalog>,
    log: Option<Arc<dyn ConversionLog>>,
    scale: u32,
}

impl core::fmt::Debug for ConversionEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConversionEngine")
            .field("scale", &self.scale)
            .field("logging", &self.log.is_some())
            .finish()
    }
}

impl ConversionEngine {
    pub fn new(catalog: Arc<UnitCatalog>) -> Self {
        Self {
            catalog,
            log: None,
            scale: QUANTITY_SCALE,
        }
    }

    /// Append every successful conversion to `log`.
    pub fn with_log(mut self, log: Arc<dyn ConversionLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn catalog(&self) -> &UnitCatalog {
        &self.catalog
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn convert(&self, req: &ConversionRequest<'_>) -> Result<ConversionResult, ConversionError> {
        if req.amount < Decimal::ZERO {
            return Err(ConversionError::InvalidAmount(format!(
                "amount cannot be negative (got {})",
                req.amount
            )));
        }
        let density = match (req.density, req.item_density) {
            (Some(d), _) => Some(SuppliedDensity { value: d, source: "density" }),
            (None, Some(d)) => Some(SuppliedDensity { value: d, source: "item density" }),
            (None, None) => None,
        };

        let from_mapping = req
            .organization_id
            .and_then(|org| self.catalog.mapping(org, req.from_unit));
        let to_mapping = req
            .organization_id
            .and_then(|org| self.catalog.mapping(org, req.to_unit));

        let converted = if from_mapping.is_some() || to_mapping.is_some() {
            let (amount, source) = match &from_mapping {
                Some(m) => (mul(req.amount, m.factor())?, m.to_unit().to_string()),
                None => (req.amount, req.from_unit.to_string()),
            };
            let target = to_mapping
                .as_ref()
                .map(|m| m.to_unit().to_string())
                .unwrap_or_else(|| req.to_unit.to_string());

            let inner = self.convert_catalog(req.organization_id, amount, &source, &target, density)?;
            let value = match &to_mapping {
                Some(m) => div(inner.value, m.factor())?,
                None => inner.value,
            };
            Converted {
                value,
                kind: ConversionKind::Custom,
                density_used: inner.density_used,
            }
        } else {
            self.convert_catalog(req.organization_id, req.amount, req.from_unit, req.to_unit, density)?
        };

        let result = ConversionResult {
            value: round_to(converted.value, self.scale),
            kind: converted.kind,
            density_used: converted.density_used,
            from_unit: normalize_unit_name(req.from_unit),
            to_unit: normalize_unit_name(req.to_unit),
        };

        tracing::debug!(
            from = %result.from_unit,
            to = %result.to_unit,
            amount = %req.amount,
            value = %result.value,
            kind = ?result.kind,
            "converted quantity"
        );
        self.record(req, &result);

        Ok(result)
    }

    fn convert_catalog(
        &self,
        organization_id: Option<OrganizationId>,
        amount: Decimal,
        from_name: &str,
        to_name: &str,
        density: Option<SuppliedDensity>,
    ) -> Result<Converted, ConversionError> {
        let from = self.resolve(organization_id, from_name)?;
        let to = self.resolve(organization_id, to_name)?;

        if from.name() == to.name() {
            return Ok(Converted {
                value: amount,
                kind: ConversionKind::Direct,
                density_used: None,
            });
        }

        if from.dimension() == to.dimension() {
            let base = mul(amount, from.factor())?;
            return Ok(Converted {
                value: div(base, to.factor())?,
                kind: ConversionKind::Direct,
                density_used: None,
            });
        }

        if !from.dimension().density_bridgeable(to.dimension()) {
            return Err(ConversionError::UnsupportedConversion {
                from: from.name().to_string(),
                to: to.name().to_string(),
                from_dimension: from.dimension(),
                to_dimension: to.dimension(),
            });
        }

        let supplied = density.ok_or_else(|| ConversionError::MissingDensity {
            from: from.name().to_string(),
            to: to.name().to_string(),
        })?;
        let density = checked_density(supplied.value, supplied.source)?;

        let base = mul(amount, from.factor())?;
        let bridged = match from.dimension() {
            // grams -> millilitres
            Dimension::Weight => div(base, density)?,
            // millilitres -> grams
            _ => mul(base, density)?,
        };

        Ok(Converted {
            value: div(bridged, to.factor())?,
            kind: ConversionKind::Density,
            density_used: Some(density),
        })
    }

    fn resolve(&self, organization_id: Option<OrganizationId>, name: &str) -> Result<Unit, ConversionError> {
        self.catalog
            .resolve(organization_id, name)
            .ok_or_else(|| ConversionError::UnknownUnit(normalize_unit_name(name)))
    }

    fn record(&self, req: &ConversionRequest<'_>, result: &ConversionResult) {
        let Some(log) = &self.log else {
            return;
        };
        let record = ConversionRecord {
            organization_id: req.organization_id,
            item_id: req.item_id,
            amount: req.amount,
            from_unit: result.from_unit.clone(),
            to_unit: result.to_unit.clone(),
            value: result.value,
            kind: result.kind,
            density_used: result.density_used,
            recorded_at: Utc::now(),
        };
        if let Err(e) = log.record(record) {
            tracing::warn!(error = %e, "failed to append conversion log record");
        }
    }
}

fn checked_density(density: Decimal, what: &str) -> Result<Decimal, ConversionError> {
    if density > Decimal::ZERO {
        Ok(density)
    } else {
        Err(ConversionError::InvalidAmount(format!(
            "{what} must be positive (got {density})"
        )))
    }
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal, ConversionError> {
    a.checked_mul(b)
        .ok_or_else(|| ConversionError::InvalidAmount(format!("{a} x {b} overflows")))
}

fn div(a: Decimal, b: Decimal) -> Result<Decimal, ConversionError> {
    a.checked_div(b)
        .ok_or_else(|| ConversionError::InvalidAmount(format!("{a} / {b} is not representable")))
}
