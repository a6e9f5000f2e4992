use std::collections::{BTreeMap, HashSet};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::block_store::{checksum, SharedStore};
use crate::common::{JfsError, JfsResult};
use crate::models::{FileSummary, InodeId};
use crate::operation::{EntryType, JournalRecord};
use crate::transaction::{Transaction, TransactionManager};
use crate::wal::{Journal, JournalEntry};
use crate::DEFAULT_CHECKPOINT_INTERVAL;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    pub journal_enabled: bool,
    /// A checkpoint is appended whenever the journal length reaches a
    /// multiple of this value. Zero disables checkpoints.
    pub checkpoint_interval: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            journal_enabled: true,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

/// Stored and recomputed checksum of a file whose content changed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumMismatch {
    pub expected: String,
    pub actual: String,
}

/// Content of a file together with the outcome of its integrity check.
#[derive(Debug, Clone)]
pub struct FileRead {
    pub data: Vec<u8>,
    pub mismatch: Option<ChecksumMismatch>,
}

impl FileRead {
    pub fn is_intact(&self) -> bool {
        self.mismatch.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PendingKind {
    #[serde(rename = "FILE_CREATE_PENDING")]
    FileCreatePending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOperation {
    #[serde(rename = "type")]
    pub kind: PendingKind,
    pub filename: String,
    pub transaction_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub recovered: usize,
    pub errors: usize,
    pub pending: Vec<PendingOperation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalStats {
    pub total_entries: usize,
    pub entry_types: BTreeMap<EntryType, usize>,
    pub journal_enabled: bool,
    pub current_transaction: u64,
}

/// File system layer over a shared block store.
///
/// A create goes through intent logged, blocks allocated, inode committed
/// and metadata logged. With journaling disabled the journal stays empty
/// and recovery reports nothing.
pub struct JournalingFileSystem {
    store: SharedStore,
    config: FsConfig,
    journal: Journal,
    txn_manager: TransactionManager,
}

impl JournalingFileSystem {
    pub fn new(store: SharedStore, config: FsConfig) -> Self {
        Self {
            store,
            config,
            journal: Journal::new(),
            txn_manager: TransactionManager::new(),
        }
    }

    pub fn with_journal(store: SharedStore, journal_enabled: bool) -> Self {
        Self::new(
            store,
            FsConfig {
                journal_enabled,
                ..FsConfig::default()
            },
        )
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn journal_enabled(&self) -> bool {
        self.config.journal_enabled
    }

    pub fn checkpoint_interval(&self) -> usize {
        self.config.checkpoint_interval
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn begin_transaction(&mut self) -> Transaction {
        self.txn_manager.begin_transaction()
    }

    /// Appends a record stamped with the running transaction counter, which
    /// may be ahead of the id carried inside the payload.
    pub fn journal_operation(&mut self, record: JournalRecord) -> JfsResult<()> {
        if !self.config.journal_enabled {
            return Ok(());
        }
        let entry = JournalEntry::new(self.txn_manager.current_id(), record)?;
        debug!(
            "journal: {:?} (txn {})",
            entry.entry_type(),
            entry.transaction_id
        );
        self.journal.append(entry);

        let interval = self.config.checkpoint_interval;
        if interval != 0 && self.journal.len() % interval == 0 {
            self.create_checkpoint()?;
        }
        Ok(())
    }

    fn create_checkpoint(&mut self) -> JfsResult<()> {
        let active_inodes = self.store.lock().inode_ids();
        let transaction_id = self.txn_manager.current_id();
        let entry = JournalEntry::new(
            transaction_id,
            JournalRecord::Checkpoint {
                timestamp: crate::common::now_secs(),
                active_inodes,
                total_operations: self.journal.len(),
                transaction_id,
            },
        )?;
        self.journal.append(entry);
        info!("checkpoint created (transaction {})", transaction_id);
        Ok(())
    }

    /// Creates a file and returns its inode id.
    ///
    /// Blocks written before a failing step are not rolled back.
    pub fn create_file(&mut self, filename: &str, data: &[u8]) -> JfsResult<InodeId> {
        let txn = self.begin_transaction();
        match self.create_file_in(txn, filename, data) {
            Ok(inode_id) => {
                info!("file '{}' created (inode {})", filename, inode_id);
                Ok(inode_id)
            }
            Err(e) => {
                error!("failed to create '{}': {}", filename, e);
                Err(e)
            }
        }
    }

    fn create_file_in(&mut self, txn: Transaction, filename: &str, data: &[u8]) -> JfsResult<InodeId> {
        let data_checksum = checksum(data);

        // Phase 1: log the intent
        if self.config.journal_enabled {
            self.journal_operation(JournalRecord::Create {
                filename: filename.to_string(),
                size: data.len(),
                data_checksum: data_checksum.clone(),
                transaction_id: txn.id,
            })?;
        }

        // Phase 2: allocate, write, commit the inode
        let (inode_id, blocks) = {
            let mut store = self.store.lock();
            let block_size = store.block_size();
            let needed = (data.len() + block_size - 1) / block_size;
            let blocks = store.allocate(needed);
            if blocks.is_empty() {
                return Err(JfsError::AllocationFailure {
                    needed,
                    free: store.stats().free_blocks,
                });
            }
            for (chunk, &idx) in data.chunks(block_size).zip(blocks.iter()) {
                store.write_block(idx, chunk);
            }
            let inode_id = store.commit_inode(data.len(), blocks.clone(), data_checksum);
            (inode_id, blocks)
        };

        // Phase 3: log the committed metadata
        if self.config.journal_enabled {
            self.journal_operation(JournalRecord::Metadata {
                inode_id,
                filename: filename.to_string(),
                blocks,
                transaction_id: txn.id,
            })?;
        }
        Ok(inode_id)
    }

    /// Reads a file back. A checksum mismatch does not fail the read; it is
    /// reported next to the data.
    pub fn read_file(&self, inode_id: InodeId) -> JfsResult<FileRead> {
        let store = self.store.lock();
        let inode = store.inode(inode_id).ok_or_else(|| {
            warn!("inode {} not found", inode_id);
            JfsError::NotFound(inode_id)
        })?;

        let mut data = Vec::with_capacity(inode.blocks.len() * store.block_size());
        for &idx in &inode.blocks {
            let block = store.read_block(idx).ok_or_else(|| {
                warn!("block {} of inode {} is not accessible", idx, inode_id);
                JfsError::BlockUnreadable(idx)
            })?;
            data.extend_from_slice(block);
        }
        data.truncate(inode.size);

        let actual = checksum(&data);
        let mismatch = if actual != inode.checksum {
            warn!(
                "checksum mismatch for inode {}: expected {}.., got {}..",
                inode_id,
                short(&inode.checksum),
                short(&actual)
            );
            Some(ChecksumMismatch {
                expected: inode.checksum.clone(),
                actual,
            })
        } else {
            None
        };
        Ok(FileRead { data, mismatch })
    }

    /// Checksum-based reconciliation of `Create` intents against the inode
    /// table. Flags intents that never reached a committed inode; nothing is
    /// replayed. Checkpoints count toward `recovered`.
    pub fn recover_from_journal(&self) -> RecoveryReport {
        if !self.config.journal_enabled {
            return RecoveryReport::default();
        }
        info!("starting journal recovery over {} entries", self.journal.len());

        let committed: HashSet<String> = self
            .store
            .lock()
            .inodes()
            .map(|inode| inode.checksum.clone())
            .collect();

        let mut report = RecoveryReport::default();
        for entry in self.journal.iter() {
            if let JournalRecord::Create {
                filename,
                data_checksum,
                ..
            } = &entry.record
            {
                if !committed.contains(data_checksum) {
                    warn!("pending operation: create '{}'", filename);
                    report.pending.push(PendingOperation {
                        kind: PendingKind::FileCreatePending,
                        filename: filename.clone(),
                        transaction_id: entry.transaction_id,
                    });
                    report.errors += 1;
                }
            }
        }
        report.recovered = self.journal.len() - report.errors;
        info!(
            "recovery finished: {} operations verified, {} pending",
            report.recovered, report.errors
        );
        report
    }

    pub fn journal_stats(&self) -> JournalStats {
        JournalStats {
            total_entries: self.journal.len(),
            entry_types: self.journal.type_histogram(),
            journal_enabled: self.config.journal_enabled,
            current_transaction: self.txn_manager.current_id(),
        }
    }

    pub fn list_files(&self) -> Vec<FileSummary> {
        self.store
            .lock()
            .inodes()
            .map(|inode| FileSummary {
                inode_id: inode.id,
                size: inode.size,
                blocks: inode.blocks.len(),
                checksum: inode.checksum.clone(),
                created_at: inode.created_at,
            })
            .collect()
    }
}

fn short(digest: &str) -> &str {
    digest.get(..16).unwrap_or(digest)
}
