use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::{now_secs, JfsResult};
use crate::operation::{EntryType, JournalRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub transaction_id: u64,
    pub timestamp: f64,
    #[serde(flatten)]
    pub record: JournalRecord,
    pub checksum: String,
}

impl JournalEntry {
    pub fn new(transaction_id: u64, record: JournalRecord) -> JfsResult<Self> {
        let checksum = record.payload_checksum()?;
        Ok(Self {
            transaction_id,
            timestamp: now_secs(),
            record,
            checksum,
        })
    }

    pub fn entry_type(&self) -> EntryType {
        self.record.entry_type()
    }

    /// Recomputes the payload checksum and compares it to the stored one.
    pub fn verify(&self) -> bool {
        self.record
            .payload_checksum()
            .map(|c| c == self.checksum)
            .unwrap_or(false)
    }
}

/// Append-only, in-memory write-ahead journal.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter()
    }

    pub fn entries_of(&self, kind: EntryType) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter().filter(move |e| e.entry_type() == kind)
    }

    pub fn type_histogram(&self) -> BTreeMap<EntryType, usize> {
        let mut hist = BTreeMap::new();
        for entry in &self.entries {
            *hist.entry(entry.entry_type()).or_insert(0) += 1;
        }
        hist
    }

    pub fn to_json(&self) -> JfsResult<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }
}
