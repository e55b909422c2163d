//! Unit registry: standard units plus organization-scoped custom units and mappings.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;

use batchledger_core::{DomainError, DomainResult, OrganizationId};

use crate::unit::{normalize_unit_name, CustomUnitMapping, Dimension, Unit};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScopedKey {
    organization_id: OrganizationId,
    name: String,
}

impl ScopedKey {
    fn new(organization_id: OrganizationId, name: &str) -> Self {
        Self {
            organization_id,
            name: normalize_unit_name(name),
        }
    }
}

/// Queryable unit registry.
///
/// Standard units are fixed once the catalog is built. Custom units and custom
/// mappings are registered at runtime per organization and never leak across
/// organizations.
#[derive(Debug, Default)]
pub struct UnitCatalog {
    units: HashMap<String, Unit>,
    aliases: HashMap<String, String>,
    custom_units: RwLock<HashMap<ScopedKey, Unit>>,
    mappings: RwLock<HashMap<ScopedKey, CustomUnitMapping>>,
}

impl UnitCatalog {
    /// A catalog with no units at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard catalog used by small-batch producers (metric, US customary,
    /// kitchen measures, counts).
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        for unit in standard_units() {
            catalog.insert(unit);
        }
        catalog
    }

    /// Add a unit to the standard set (build time only).
    pub fn register(&mut self, unit: Unit) -> DomainResult<()> {
        if self.lookup_standard(unit.name()).is_some() {
            return Err(DomainError::conflict(format!(
                "unit '{}' already registered",
                unit.name()
            )));
        }
        self.insert(unit);
        Ok(())
    }

    fn insert(&mut self, unit: Unit) {
        for alias in unit.aliases() {
            self.aliases.insert(alias.clone(), unit.name().to_string());
        }
        self.units.insert(unit.name().to_string(), unit);
    }

    fn lookup_standard(&self, name: &str) -> Option<&Unit> {
        let name = normalize_unit_name(name);
        self.units.get(&name).or_else(|| {
            self.aliases
                .get(&name)
                .and_then(|canonical| self.units.get(canonical))
        })
    }

    /// Register an organization-specific unit.
    ///
    /// Custom units may not shadow a standard unit or an existing mapping.
    pub fn register_custom_unit(
        &self,
        organization_id: OrganizationId,
        unit: Unit,
    ) -> DomainResult<()> {
        let unit = if unit.is_custom() {
            unit
        } else {
            Unit::custom(unit.name(), unit.dimension(), unit.factor())?
        };

        if self.lookup_standard(unit.name()).is_some() {
            return Err(DomainError::conflict(format!(
                "'{}' is a standard unit",
                unit.name()
            )));
        }
        let key = ScopedKey::new(organization_id, unit.name());
        if self.mapping(organization_id, unit.name()).is_some() {
            return Err(DomainError::conflict(format!(
                "'{}' is already a custom mapping",
                unit.name()
            )));
        }

        let mut custom = self
            .custom_units
            .write()
            .map_err(|_| DomainError::invariant("unit catalog lock poisoned"))?;
        custom.insert(key, unit);
        Ok(())
    }

    /// Register (or replace) an organization's custom mapping.
    ///
    /// The mapping target must resolve to a catalog or custom unit, so lookups
    /// never chain through more than one mapping.
    pub fn register_mapping(&self, mapping: CustomUnitMapping) -> DomainResult<()> {
        let organization_id = mapping.organization_id();
        if self.resolve(Some(organization_id), mapping.to_unit()).is_none() {
            return Err(DomainError::validation(format!(
                "mapping target '{}' is not a known unit",
                mapping.to_unit()
            )));
        }
        if self.lookup_standard(mapping.from_unit()).is_some() {
            return Err(DomainError::conflict(format!(
                "'{}' is a standard unit and cannot be remapped",
                mapping.from_unit()
            )));
        }

        let key = ScopedKey::new(organization_id, mapping.from_unit());
        let mut mappings = self
            .mappings
            .write()
            .map_err(|_| DomainError::invariant("unit catalog lock poisoned"))?;
        mappings.insert(key, mapping);
        Ok(())
    }

    /// Resolve a unit name (or alias). Organization custom units are consulted
    /// after the standard set.
    pub fn resolve(&self, organization_id: Option<OrganizationId>, name: &str) -> Option<Unit> {
        if let Some(unit) = self.lookup_standard(name) {
            return Some(unit.clone());
        }
        let organization_id = organization_id?;
        let custom = self.custom_units.read().ok()?;
        custom.get(&ScopedKey::new(organization_id, name)).cloned()
    }

    /// The organization's custom mapping for `name`, if any.
    pub fn mapping(&self, organization_id: OrganizationId, name: &str) -> Option<CustomUnitMapping> {
        let mappings = self.mappings.read().ok()?;
        mappings.get(&ScopedKey::new(organization_id, name)).cloned()
    }

    /// Standard units of one dimension, sorted by factor.
    pub fn units_in(&self, dimension: Dimension) -> Vec<Unit> {
        let mut units: Vec<Unit> = self
            .units
            .values()
            .filter(|u| u.dimension() == dimension)
            .cloned()
            .collect();
        units.sort_by(|a, b| a.factor().cmp(&b.factor()).then_with(|| a.name().cmp(b.name())));
        units
    }

    /// Custom mappings registered for one organization.
    pub fn mappings_for(&self, organization_id: OrganizationId) -> Vec<CustomUnitMapping> {
        let Ok(mappings) = self.mappings.read() else {
            return vec![];
        };
        let mut out: Vec<_> = mappings
            .iter()
            .filter(|(k, _)| k.organization_id == organization_id)
            .map(|(_, m)| m.clone())
            .collect();
        out.sort_by(|a, b| a.from_unit().cmp(b.from_unit()));
        out
    }
}

fn unit(name: &str, dimension: Dimension, factor: Decimal, aliases: &[&str]) -> Unit {
    match Unit::new(name, dimension, factor) {
        Ok(u) => u.with_aliases(aliases.iter().copied()),
        // Every standard entry below has a non-empty name and positive factor.
        Err(e) => unreachable!("invalid standard unit '{name}': {e}"),
    }
}

fn d(mantissa: i64, scale: u32) -> Decimal {
    Decimal::new(mantissa, scale)
}

fn standard_units() -> Vec<Unit> {
    use Dimension::*;

    vec![
        // weight, base gram
        unit("mg", Weight, d(1, 3), &["milligram", "milligrams"]),
        unit("g", Weight, d(1, 0), &["gram", "grams", "gr"]),
        unit("kg", Weight, d(1000, 0), &["kilogram", "kilograms", "kgs"]),
        unit("oz", Weight, d(28349523125, 9), &["ounce", "ounces"]),
        unit("lb", Weight, d(45359237, 5), &["lbs", "pound", "pounds"]),
        // volume, base millilitre
        unit("ml", Volume, d(1, 0), &["milliliter", "milliliters", "millilitre", "millilitres"]),
        unit("l", Volume, d(1000, 0), &["liter", "liters", "litre", "litres"]),
        unit("tsp", Volume, d(492892, 5), &["teaspoon", "teaspoons"]),
        unit("tbsp", Volume, d(1478676, 5), &["tablespoon", "tablespoons"]),
        unit("floz", Volume, d(2957353, 5), &["fl oz", "fl_oz", "fluid ounce", "fluid ounces"]),
        unit("cup", Volume, d(236588, 3), &["cups"]),
        unit("pint", Volume, d(473176, 3), &["pints", "pt"]),
        unit("quart", Volume, d(946353, 3), &["quarts", "qt"]),
        unit("gallon", Volume, d(3785411, 3), &["gallons", "gal"]),
        // length, base metre
        unit("mm", Length, d(1, 3), &["millimeter", "millimeters"]),
        unit("cm", Length, d(1, 2), &["centimeter", "centimeters"]),
        unit("m", Length, d(1, 0), &["meter", "meters", "metre", "metres"]),
        unit("in", Length, d(254, 4), &["inch", "inches"]),
        unit("ft", Length, d(3048, 4), &["foot", "feet"]),
        // area, base square metre
        unit("cm2", Area, d(1, 4), &["sq cm"]),
        unit("m2", Area, d(1, 0), &["sq m"]),
        unit("in2", Area, d(64516, 8), &["sq in"]),
        unit("ft2", Area, d(9290304, 8), &["sq ft"]),
        // count
        unit("count", Count, d(1, 0), &["each", "ea", "unit", "units", "pc", "pcs", "piece", "pieces"]),
        unit("dozen", Count, d(12, 0), &["dz"]),
        // time, base second
        unit("s", Time, d(1, 0), &["sec", "second", "seconds"]),
        unit("min", Time, d(60, 0), &["minute", "minutes"]),
        unit("h", Time, d(3600, 0), &["hr", "hour", "hours"]),
        unit("day", Time, d(86400, 0), &["days"]),
    ]
}
