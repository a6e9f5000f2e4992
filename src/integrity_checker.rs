//! Post-crash audit of block and inode consistency.
//!
//! The checker only borrows the store immutably. A file is treated as an
//! atomic unit: no partial content is ever reconstructed.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::block_store::{checksum, BlockStore};
use crate::models::{BlockStatus, Inode, InodeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    IntegrityOk,
    ChecksumMismatch { expected: String, actual: String },
    /// Some, but not all, of the file's blocks are corrupted.
    PartiallyRecoverable { corrupted_blocks: usize, total_blocks: usize },
    Lost { corrupted_blocks: usize, total_blocks: usize },
}

impl FileStatus {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FileStatus::IntegrityOk | FileStatus::PartiallyRecoverable { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCheck {
    pub inode_id: InodeId,
    pub size: usize,
    pub blocks_used: usize,
    #[serde(flatten)]
    pub status: FileStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub total_blocks: usize,
    pub free_blocks: usize,
    pub used_blocks: usize,
    pub corrupted_blocks: usize,
    pub inodes_checked: usize,
    pub inodes_integrity_ok: usize,
    pub inodes_integrity_failed: usize,
    /// Intact files
    pub recoverable_files: Vec<FileCheck>,
    /// Everything that failed a check, including partially recoverable files
    pub corrupted_files: Vec<FileCheck>,
    pub block_status_summary: BTreeMap<BlockStatus, usize>,
}

impl IntegrityReport {
    pub fn status_of(&self, inode_id: InodeId) -> Option<&FileStatus> {
        self.recoverable_files
            .iter()
            .chain(self.corrupted_files.iter())
            .find(|f| f.inode_id == inode_id)
            .map(|f| &f.status)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Difference between two integrity reports taken around a crash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateComparison {
    pub blocks_lost: isize,
    pub new_corruptions: usize,
    pub files_recovered: usize,
    pub files_lost: usize,
    pub recovery_rate: f64,
    pub data_integrity_score: f64,
}

pub struct IntegrityChecker<'a> {
    store: &'a BlockStore,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(store: &'a BlockStore) -> Self {
        Self { store }
    }

    pub fn comprehensive_check(&self) -> IntegrityReport {
        info!("starting integrity check");
        let mut report = IntegrityReport {
            total_blocks: self.store.total_blocks(),
            ..IntegrityReport::default()
        };

        for status in BlockStatus::ALL {
            let count = self.store.count_status(status);
            if count > 0 {
                report.block_status_summary.insert(status, count);
            }
            match status {
                BlockStatus::Free => report.free_blocks = count,
                BlockStatus::Used => report.used_blocks = count,
                BlockStatus::Corrupted => report.corrupted_blocks = count,
            }
        }

        for inode in self.store.inodes() {
            report.inodes_checked += 1;
            let check = FileCheck {
                inode_id: inode.id,
                size: inode.size,
                blocks_used: inode.blocks.len(),
                status: self.classify(inode),
            };
            debug!("inode {}: {:?}", inode.id, check.status);
            if check.status == FileStatus::IntegrityOk {
                report.inodes_integrity_ok += 1;
                report.recoverable_files.push(check);
            } else {
                report.inodes_integrity_failed += 1;
                report.corrupted_files.push(check);
            }
        }

        info!(
            "integrity check finished: {}/{} files intact",
            report.inodes_integrity_ok, report.inodes_checked
        );
        report
    }

    fn classify(&self, inode: &Inode) -> FileStatus {
        let accessible = inode
            .blocks
            .iter()
            .all(|&b| matches!(self.store.status(b), Some(s) if s != BlockStatus::Corrupted));

        if accessible {
            let data = self.read_inode_data(inode);
            let actual = checksum(&data);
            if actual == inode.checksum {
                FileStatus::IntegrityOk
            } else {
                FileStatus::ChecksumMismatch {
                    expected: inode.checksum.clone(),
                    actual,
                }
            }
        } else {
            let corrupted_blocks = inode
                .blocks
                .iter()
                .filter(|&&b| self.store.status(b) == Some(BlockStatus::Corrupted))
                .count();
            let total_blocks = inode.blocks.len();
            if corrupted_blocks < total_blocks {
                FileStatus::PartiallyRecoverable {
                    corrupted_blocks,
                    total_blocks,
                }
            } else {
                FileStatus::Lost {
                    corrupted_blocks,
                    total_blocks,
                }
            }
        }
    }

    // Only called once every block index is known to be in range.
    fn read_inode_data(&self, inode: &Inode) -> Vec<u8> {
        let mut data = Vec::with_capacity(inode.blocks.len() * self.store.block_size());
        for &idx in &inode.blocks {
            if let Some(block) = self.store.read_block(idx) {
                data.extend_from_slice(block);
            }
        }
        data.truncate(inode.size);
        data
    }

    pub fn compare_states(before: &IntegrityReport, after: &IntegrityReport) -> StateComparison {
        let percent = |part: usize, whole: usize| {
            if whole > 0 {
                part as f64 / whole as f64 * 100.0
            } else {
                0.0
            }
        };
        StateComparison {
            blocks_lost: before.used_blocks as isize - after.used_blocks as isize,
            new_corruptions: after.corrupted_blocks,
            files_recovered: after.inodes_integrity_ok,
            files_lost: after.corrupted_files.len(),
            recovery_rate: percent(after.inodes_integrity_ok, before.inodes_checked),
            data_integrity_score: percent(after.inodes_integrity_ok, after.inodes_checked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_files(sizes: &[usize]) -> BlockStore {
        let mut store = BlockStore::with_geometry(1, 4).unwrap();
        let mut next = 0;
        for (i, &size) in sizes.iter().enumerate() {
            let data = vec![i as u8 + 1; size];
            let blocks: Vec<usize> = (next..next + (size + 4095) / 4096).collect();
            next += blocks.len();
            for (chunk, &idx) in data.chunks(4096).zip(blocks.iter()) {
                store.write_block(idx, chunk);
            }
            store.commit_inode(size, blocks, checksum(&data));
        }
        store
    }

    #[test]
    fn clean_store_is_intact() {
        let store = store_with_files(&[100, 9000]);
        let report = IntegrityChecker::new(&store).comprehensive_check();
        assert_eq!(report.inodes_checked, 2);
        assert_eq!(report.inodes_integrity_ok, 2);
        assert_eq!(report.used_blocks, 4);
        assert_eq!(report.free_blocks, 252);
        assert_eq!(report.block_status_summary.get(&BlockStatus::Used), Some(&4));
        assert!(report.block_status_summary.get(&BlockStatus::Corrupted).is_none());
        assert!(report.corrupted_files.is_empty());
    }

    #[test]
    fn all_blocks_corrupted_is_lost() {
        let mut store = store_with_files(&[9000]);
        for b in 0..3 {
            store.mark_corrupted(b);
        }
        let report = IntegrityChecker::new(&store).comprehensive_check();
        assert_eq!(
            report.status_of(1),
            Some(&FileStatus::Lost {
                corrupted_blocks: 3,
                total_blocks: 3
            })
        );
        assert!(!report.status_of(1).unwrap().is_recoverable());
    }

    #[test]
    fn subset_corrupted_is_partially_recoverable() {
        let mut store = store_with_files(&[9000]);
        store.mark_corrupted(1);
        let report = IntegrityChecker::new(&store).comprehensive_check();
        let status = report.status_of(1).unwrap();
        assert_eq!(
            status,
            &FileStatus::PartiallyRecoverable {
                corrupted_blocks: 1,
                total_blocks: 3
            }
        );
        assert!(status.is_recoverable());
        assert_eq!(report.inodes_integrity_failed, 1);
        assert_eq!(report.corrupted_blocks, 1);
    }

    #[test]
    fn out_of_range_block_is_not_intact() {
        let mut store = store_with_files(&[100]);
        let id = store.commit_inode(10, vec![999], checksum(b"x"));
        let report = IntegrityChecker::new(&store).comprehensive_check();
        assert_eq!(report.inodes_checked, 2);
        assert_eq!(report.inodes_integrity_ok, 1);
        assert_eq!(report.corrupted_files.len(), 1);
        assert_eq!(report.corrupted_files[0].inode_id, id);
        // nothing is marked corrupted, the block just is not there
        assert_eq!(
            report.status_of(id),
            Some(&FileStatus::PartiallyRecoverable {
                corrupted_blocks: 0,
                total_blocks: 1
            })
        );
    }

    #[test]
    fn altered_content_is_checksum_mismatch() {
        let mut store = store_with_files(&[100]);
        store.write_block(0, b"something else");
        let report = IntegrityChecker::new(&store).comprehensive_check();
        match report.status_of(1) {
            Some(FileStatus::ChecksumMismatch { expected, actual }) => assert_ne!(expected, actual),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn report_serializes_with_status_tags() {
        let mut store = store_with_files(&[9000]);
        store.mark_corrupted(0);
        let report = IntegrityChecker::new(&store).comprehensive_check();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["corrupted_files"][0]["status"], "PARTIALLY_RECOVERABLE");
        assert_eq!(value["corrupted_files"][0]["inode_id"], 1);
        assert_eq!(value["block_status_summary"]["CORRUPTED"], 1);
    }

    #[test]
    fn compare_before_and_after() {
        let mut store = store_with_files(&[100, 100, 100, 100]);
        let before = IntegrityChecker::new(&store).comprehensive_check();
        store.mark_corrupted(2);
        let after = IntegrityChecker::new(&store).comprehensive_check();
        let cmp = IntegrityChecker::compare_states(&before, &after);
        assert_eq!(cmp.blocks_lost, 1);
        assert_eq!(cmp.new_corruptions, 1);
        assert_eq!(cmp.files_recovered, 3);
        assert_eq!(cmp.files_lost, 1);
        assert!((cmp.recovery_rate - 75.0).abs() < 1e-9);
    }
}
