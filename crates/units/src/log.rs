//! Append-only conversion trace.
//!
//! Logging is best-effort: the engine reports sink failures through `tracing`
//! and still returns the converted value.

use std::io::Write;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use batchledger_core::{ItemId, OrganizationId};

use crate::convert::ConversionKind;

/// One successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub organization_id: Option<OrganizationId>,
    pub item_id: Option<ItemId>,
    pub amount: Decimal,
    pub from_unit: String,
    pub to_unit: String,
    pub value: Decimal,
    pub kind: ConversionKind,
    pub density_used: Option<Decimal>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ConversionLogError {
    #[error("conversion log unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode conversion record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write conversion record: {0}")]
    Io(#[from] std::io::Error),
}

/// Sink for conversion records.
pub trait ConversionLog: Send + Sync {
    fn record(&self, record: ConversionRecord) -> Result<(), ConversionLogError>;
}

/// In-memory log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryConversionLog {
    records: RwLock<Vec<ConversionRecord>>,
}

impl InMemoryConversionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn records(&self) -> Vec<ConversionRecord> {
        match self.records.read() {
            Ok(r) => r.clone(),
            Err(_) => vec![],
        }
    }
}

impl ConversionLog for InMemoryConversionLog {
    fn record(&self, record: ConversionRecord) -> Result<(), ConversionLogError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| ConversionLogError::Unavailable("lock poisoned".to_string()))?;
        records.push(record);
        Ok(())
    }
}

/// Writes one JSON object per line to any writer (file, socket, buffer).
#[derive(Debug)]
pub struct JsonLinesConversionLog<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesConversionLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> Result<W, ConversionLogError> {
        self.writer
            .into_inner()
            .map_err(|_| ConversionLogError::Unavailable("lock poisoned".to_string()))
    }
}

impl<W: Write + Send> ConversionLog for JsonLinesConversionLog<W> {
    fn record(&self, record: ConversionRecord) -> Result<(), ConversionLogError> {
        let line = serde_json::to_string(&record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ConversionLogError::Unavailable("lock poisoned".to_string()))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> ConversionRecord {
        ConversionRecord {
            organization_id: Some(OrganizationId::new()),
            item_id: None,
            amount: dec!(100),
            from_unit: "ml".into(),
            to_unit: "g".into(),
            value: dec!(92),
            kind: ConversionKind::Density,
            density_used: Some(dec!(0.92)),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn json_lines_log_writes_one_line_per_record() {
        let log = JsonLinesConversionLog::new(Vec::new());
        log.record(sample()).unwrap();
        log.record(sample()).unwrap();

        let bytes = log.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: ConversionRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.kind, ConversionKind::Density);
        assert_eq!(parsed.value, dec!(92));
    }

    #[test]
    fn in_memory_log_keeps_order() {
        let log = InMemoryConversionLog::new();
        let mut first = sample();
        first.value = dec!(1);
        log.record(first).unwrap();
        log.record(sample()).unwrap();
        let records = log.records();
        assert_eq!(records[0].value, dec!(1));
        assert_eq!(records[1].value, dec!(92));
    }
}
