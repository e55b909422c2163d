//! Unit catalog and conversion engine.
//!
//! Quantities arrive in whatever unit the caller recorded them in (grams,
//! fluid ounces, "bottles"). This crate resolves unit names, converts within a
//! dimension by factor, crosses weight/volume through a density, and honours
//! organization-defined custom mappings.

pub mod catalog;
pub mod convert;
pub mod log;
pub mod unit;

pub use catalog::UnitCatalog;
pub use convert::{
    parse_amount, ConversionEngine, ConversionError, ConversionKind, ConversionRequest,
    ConversionResult,
};
pub use log::{
    ConversionLog, ConversionLogError, ConversionRecord, InMemoryConversionLog,
    JsonLinesConversionLog,
};
pub use unit::{normalize_unit_name, CustomUnitMapping, Dimension, Unit};
