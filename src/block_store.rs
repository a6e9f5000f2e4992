//! In-memory block device: a content arena indexed by block number, a
//! status side table indexed the same way, and the inode table.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use spin::Mutex;

use crate::common::{now_secs, JfsError, JfsResult};
use crate::models::{BlockStatus, Inode, InodeId};
use crate::{DEFAULT_BLOCK_SIZE_KB, DEFAULT_DISK_SIZE_MB};

/// The store as seen by the file system and the crash injector.
pub type SharedStore = Arc<Mutex<BlockStore>>;

/// Disk geometry
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    pub size_mb: usize,
    pub block_size_kb: usize,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            size_mb: DEFAULT_DISK_SIZE_MB,
            block_size_kb: DEFAULT_BLOCK_SIZE_KB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskStats {
    pub total_blocks: usize,
    pub free_blocks: usize,
    pub used_blocks: usize,
    pub corrupted_blocks: usize,
    pub total_inodes: usize,
}

pub struct BlockStore {
    block_size: usize,
    total_blocks: usize,
    data: Vec<u8>,
    status: Vec<BlockStatus>,
    inodes: BTreeMap<InodeId, Inode>,
    next_inode_id: InodeId,
}

impl BlockStore {
    pub fn new(config: DiskConfig) -> JfsResult<Self> {
        let invalid = || JfsError::InvalidGeometry {
            size_mb: config.size_mb,
            block_size_kb: config.block_size_kb,
        };
        let block_size = config
            .block_size_kb
            .checked_mul(1024)
            .filter(|&size| size > 0)
            .ok_or_else(invalid)?;
        let total_blocks = config.size_mb.checked_mul(1024 * 1024).ok_or_else(invalid)? / block_size;
        let capacity = total_blocks.checked_mul(block_size).ok_or_else(invalid)?;
        debug!(
            "block store: {} blocks of {} bytes",
            total_blocks, block_size
        );
        Ok(Self {
            block_size,
            total_blocks,
            data: vec![0u8; capacity],
            status: vec![BlockStatus::Free; total_blocks],
            inodes: BTreeMap::new(),
            next_inode_id: 1,
        })
    }

    pub fn with_geometry(size_mb: usize, block_size_kb: usize) -> JfsResult<Self> {
        Self::new(DiskConfig {
            size_mb,
            block_size_kb,
        })
    }

    /// Wraps the store for sharing between a file system and a crash simulator.
    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    fn range(&self, idx: usize) -> core::ops::Range<usize> {
        let start = idx * self.block_size;
        start..start + self.block_size
    }

    /// Writes `data` into block `idx`, truncating or zero-padding it to the
    /// block size. Returns false for an out-of-range index.
    pub fn write_block(&mut self, idx: usize, data: &[u8]) -> bool {
        if idx >= self.total_blocks {
            return false;
        }
        let len = data.len().min(self.block_size);
        let range = self.range(idx);
        let block = &mut self.data[range];
        block[..len].copy_from_slice(&data[..len]);
        block[len..].fill(0);
        self.status[idx] = BlockStatus::Used;
        true
    }

    /// Corrupted blocks are still readable; corruption only lives in the status table.
    pub fn read_block(&self, idx: usize) -> Option<&[u8]> {
        if idx >= self.total_blocks {
            return None;
        }
        Some(&self.data[self.range(idx)])
    }

    pub fn status(&self, idx: usize) -> Option<BlockStatus> {
        self.status.get(idx).copied()
    }

    pub fn mark_corrupted(&mut self, idx: usize) -> bool {
        match self.status.get_mut(idx) {
            Some(status) => {
                *status = BlockStatus::Corrupted;
                true
            }
            None => false,
        }
    }

    /// First-fit scan for `count` free blocks in ascending order. Returns an
    /// empty vector when fewer than `count` are free; nothing is reserved.
    pub fn allocate(&self, count: usize) -> Vec<usize> {
        if count == 0 {
            return Vec::new();
        }
        let found: Vec<usize> = self
            .status
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == BlockStatus::Free)
            .map(|(i, _)| i)
            .take(count)
            .collect();
        if found.len() == count {
            found
        } else {
            Vec::new()
        }
    }

    pub fn blocks_with_status(&self, status: BlockStatus) -> Vec<usize> {
        self.status
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == status)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count_status(&self, status: BlockStatus) -> usize {
        self.status.iter().filter(|s| **s == status).count()
    }

    pub fn checksum(&self, data: &[u8]) -> String {
        checksum(data)
    }

    /// Records a new inode and returns its id.
    pub fn commit_inode(&mut self, size: usize, blocks: Vec<usize>, checksum: String) -> InodeId {
        let id = self.next_inode_id;
        self.next_inode_id += 1;
        let now = now_secs();
        self.inodes.insert(
            id,
            Inode {
                id,
                size,
                blocks,
                checksum,
                created_at: now,
                modified_at: now,
            },
        );
        id
    }

    pub fn inode(&self, id: InodeId) -> Option<&Inode> {
        self.inodes.get(&id)
    }

    /// Inodes in ascending id order.
    pub fn inodes(&self) -> impl Iterator<Item = &Inode> {
        self.inodes.values()
    }

    pub fn inode_ids(&self) -> Vec<InodeId> {
        self.inodes.keys().copied().collect()
    }

    pub fn stats(&self) -> DiskStats {
        DiskStats {
            total_blocks: self.total_blocks,
            free_blocks: self.count_status(BlockStatus::Free),
            used_blocks: self.count_status(BlockStatus::Used),
            corrupted_blocks: self.count_status(BlockStatus::Corrupted),
            total_inodes: self.inodes.len(),
        }
    }
}

/// SHA-256 of `data` as lowercase hex.
pub fn checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
