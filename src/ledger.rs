use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::interpret::{DiagnosticResult, Verdict};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub id: String,
    pub filename: String,
    pub verdict: Verdict,
    pub probability: f64,
    pub timestamp: String,
}

/// Local ISO-8601 time; the fraction is six digits, or omitted when
/// there are no microseconds.
fn iso_timestamp(at: &DateTime<Local>) -> String {
    if at.timestamp_subsec_micros() == 0 {
        at.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

#[derive(Default)]
struct Entries {
    records: Vec<PredictionRecord>,
    index: HashMap<String, usize>,
}

/// In-memory record of predictions for the lifetime of the process.
///
/// Identifiers have second resolution. A second record within the same
/// second replaces the first one in place, keeping its original position.
#[derive(Default)]
pub struct Ledger {
    entries: Mutex<Entries>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, filename: &str, result: &DiagnosticResult) -> String {
        self.record_at(filename, result, Local::now())
    }

    pub fn record_at(
        &self,
        filename: &str,
        result: &DiagnosticResult,
        at: DateTime<Local>,
    ) -> String {
        let id = at.format("%Y%m%d%H%M%S").to_string();
        let record = PredictionRecord {
            id: id.clone(),
            filename: filename.to_string(),
            verdict: result.verdict,
            probability: result.probability,
            timestamp: iso_timestamp(&at),
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.index.get(&id).copied() {
            Some(pos) => {
                tracing::debug!("prediction {id} overwritten by {filename}");
                entries.records[pos] = record;
            }
            None => {
                let pos = entries.records.len();
                entries.records.push(record);
                entries.index.insert(id.clone(), pos);
            }
        }
        id
    }

    pub fn most_recent(&self) -> Option<PredictionRecord> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.records.last().cloned()
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<PredictionRecord> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.index.get(id).map(|&pos| entries.records[pos].clone())
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }
}
