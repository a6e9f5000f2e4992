use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block_store::checksum;
use crate::common::JfsResult;
use crate::models::InodeId;

/// Kind tag of a journal record, as it appears under `entry_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryType {
    Create,
    Write,
    Delete,
    Metadata,
    Checkpoint,
}

/// Per-kind payload of a journal entry.
///
/// Serialized adjacently tagged, so an entry reads as
/// `{"entry_type": "Create", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry_type", content = "payload")]
pub enum JournalRecord {
    Create {
        filename: String,
        size: usize,
        data_checksum: String,
        transaction_id: u64,
    },
    Write {
        inode_id: InodeId,
        offset: u64,
        size: usize,
        data_checksum: String,
        transaction_id: u64,
    },
    Delete {
        inode_id: InodeId,
        filename: String,
        transaction_id: u64,
    },
    Metadata {
        inode_id: InodeId,
        filename: String,
        blocks: Vec<usize>,
        transaction_id: u64,
    },
    Checkpoint {
        timestamp: f64,
        active_inodes: Vec<InodeId>,
        total_operations: usize,
        transaction_id: u64,
    },
}

impl JournalRecord {
    pub fn entry_type(&self) -> EntryType {
        match self {
            JournalRecord::Create { .. } => EntryType::Create,
            JournalRecord::Write { .. } => EntryType::Write,
            JournalRecord::Delete { .. } => EntryType::Delete,
            JournalRecord::Metadata { .. } => EntryType::Metadata,
            JournalRecord::Checkpoint { .. } => EntryType::Checkpoint,
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            JournalRecord::Create { filename, .. }
            | JournalRecord::Delete { filename, .. }
            | JournalRecord::Metadata { filename, .. } => Some(filename),
            _ => None,
        }
    }

    /// The payload as a JSON value. Object keys come out sorted.
    pub fn payload(&self) -> JfsResult<Value> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Checksum over the canonical (sorted-key) JSON text of the payload.
    pub fn payload_checksum(&self) -> JfsResult<String> {
        let text = serde_json::to_string(&self.payload()?)?;
        Ok(checksum(text.as_bytes()))
    }
}
