use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use batchledger_core::{DomainError, DomainResult, OrganizationId};

/// Physical dimension a unit measures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Weight,
    Volume,
    Length,
    Area,
    Count,
    Time,
}

impl Dimension {
    /// Name of the unit every factor in this dimension is expressed against.
    pub fn base_unit(self) -> &'static str {
        match self {
            Dimension::Weight => "g",
            Dimension::Volume => "ml",
            Dimension::Length => "m",
            Dimension::Area => "m2",
            Dimension::Count => "count",
            Dimension::Time => "s",
        }
    }

    /// Weight and volume can be bridged with a density; nothing else can.
    pub fn density_bridgeable(self, other: Dimension) -> bool {
        matches!(
            (self, other),
            (Dimension::Weight, Dimension::Volume) | (Dimension::Volume, Dimension::Weight)
        )
    }
}

impl core::fmt::Display for Dimension {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Dimension::Weight => "weight",
            Dimension::Volume => "volume",
            Dimension::Length => "length",
            Dimension::Area => "area",
            Dimension::Count => "count",
            Dimension::Time => "time",
        };
        f.write_str(s)
    }
}

/// Canonical form of a unit name: trimmed, lowercase.
pub fn normalize_unit_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A measurement unit.
///
/// `factor` is how many base units (see [`Dimension::base_unit`]) one of this
/// unit holds, so `1 kg` has factor `1000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    name: String,
    dimension: Dimension,
    factor: Decimal,
    custom: bool,
    aliases: Vec<String>,
}

impl Unit {
    pub fn new(name: &str, dimension: Dimension, factor: Decimal) -> DomainResult<Self> {
        let name = normalize_unit_name(name);
        if name.is_empty() {
            return Err(DomainError::validation("unit name cannot be empty"));
        }
        if factor <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "unit '{name}' must have a positive factor (got {factor})"
            )));
        }
        Ok(Self {
            name,
            dimension,
            factor,
            custom: false,
            aliases: Vec::new(),
        })
    }

    /// An organization-specific unit.
    pub fn custom(name: &str, dimension: Dimension, factor: Decimal) -> DomainResult<Self> {
        let mut unit = Self::new(name, dimension, factor)?;
        unit.custom = true;
        Ok(unit)
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.aliases
            .extend(aliases.into_iter().map(|a| normalize_unit_name(a.as_ref())));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn factor(&self) -> Decimal {
        self.factor
    }

    pub fn is_custom(&self) -> bool {
        self.custom
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }
}

/// Organization-defined override: `1 from_unit == factor to_unit`.
///
/// `from_unit` is usually a packaging or label unit ("bottle", "tray") that
/// has no place in the catalog; `to_unit` must resolve through the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomUnitMapping {
    organization_id: OrganizationId,
    from_unit: String,
    to_unit: String,
    factor: Decimal,
}

impl CustomUnitMapping {
    pub fn new(
        organization_id: OrganizationId,
        from_unit: &str,
        to_unit: &str,
        factor: Decimal,
    ) -> DomainResult<Self> {
        let from_unit = normalize_unit_name(from_unit);
        let to_unit = normalize_unit_name(to_unit);
        if from_unit.is_empty() || to_unit.is_empty() {
            return Err(DomainError::validation("mapping units cannot be empty"));
        }
        if from_unit == to_unit {
            return Err(DomainError::validation(format!(
                "mapping for '{from_unit}' cannot target itself"
            )));
        }
        if factor <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "mapping '{from_unit}' -> '{to_unit}' must have a positive factor (got {factor})"
            )));
        }
        Ok(Self {
            organization_id,
            from_unit,
            to_unit,
            factor,
        })
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn from_unit(&self) -> &str {
        &self.from_unit
    }

    pub fn to_unit(&self) -> &str {
        &self.to_unit
    }

    pub fn factor(&self) -> Decimal {
        self.factor
    }
}
