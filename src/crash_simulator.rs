//! Fault injection against the block store.
//!
//! The injector damages media directly through the shared store and never
//! goes through the file system's own paths.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::block_store::{checksum, SharedStore};
use crate::common::JfsResult;
use crate::journaling_fs::JournalingFileSystem;
use crate::models::{BlockStatus, InodeId};
use crate::operation::JournalRecord;

/// Corruption level used when a crash interrupts an operation sequence.
pub const SEQUENCE_CRASH_LEVEL: f64 = 0.02;
/// Upper bound on blocks corrupted by a single `simulate_crash`.
pub const MAX_BLOCKS_PER_CRASH: usize = 3;

const MIN_FILE_SIZE: usize = 3000;
const MAX_FILE_SIZE: usize = 7000;
const CONTROLLED_PAYLOAD: &[u8] = b"Critical operation data that might be interrupted by system crash ";
const CONTROLLED_REPEAT: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrashPoint {
    pub corrupted_blocks: Vec<usize>,
    pub affected_inodes: Vec<InodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrashStatistics {
    pub total_blocks: usize,
    pub used_blocks: usize,
    pub corrupted_blocks: usize,
    pub corruption_rate_total: f64,
    pub corruption_rate_used: f64,
    pub crash_points_recorded: usize,
}

pub struct CrashSimulator<'a> {
    fs: &'a mut JournalingFileSystem,
    store: SharedStore,
    rng: StdRng,
    crash_points: Vec<CrashPoint>,
}

impl<'a> CrashSimulator<'a> {
    pub fn new(fs: &'a mut JournalingFileSystem) -> Self {
        Self::with_rng(fs, StdRng::from_entropy())
    }

    /// Reproducible simulator for tests and demos.
    pub fn with_seed(fs: &'a mut JournalingFileSystem, seed: u64) -> Self {
        Self::with_rng(fs, StdRng::seed_from_u64(seed))
    }

    fn with_rng(fs: &'a mut JournalingFileSystem, rng: StdRng) -> Self {
        let store = fs.store().clone();
        Self {
            fs,
            store,
            rng,
            crash_points: Vec::new(),
        }
    }

    pub fn fs(&self) -> &JournalingFileSystem {
        &*self.fs
    }

    pub fn crash_points(&self) -> &[CrashPoint] {
        &self.crash_points
    }

    /// Creates up to `operations` files of random size, rolling a crash after
    /// each one. Returns how many creations succeeded before stopping.
    pub fn simulate_operation_sequence(&mut self, operations: usize, crash_probability: f64) -> usize {
        info!(
            "simulating {} operations, crash probability {:.0}%",
            operations,
            crash_probability * 100.0
        );
        let mut successful = 0;
        for i in 0..operations {
            let filename = format!("test_file_{}.dat", i);
            let size = self.rng.gen_range(MIN_FILE_SIZE..=MAX_FILE_SIZE);
            let pattern = format!("Test data for file {} ", i);
            let data: Vec<u8> = pattern.bytes().cycle().take(size).collect();

            if self.fs.create_file(&filename, &data).is_ok() {
                successful += 1;
                info!("operation {}: '{}' created ({} bytes)", i + 1, filename, size);
            } else {
                warn!("operation {}: creating '{}' failed", i + 1, filename);
            }

            if self.rng.gen::<f64>() < crash_probability {
                warn!("simulated system crash at operation {}", i + 1);
                self.simulate_crash(SEQUENCE_CRASH_LEVEL);
                break;
            }
        }
        info!("simulation finished: {}/{} operations succeeded", successful, operations);
        successful
    }

    /// Marks a small random subset of used blocks as corrupted and returns
    /// their indices.
    pub fn simulate_crash(&mut self, corruption_level: f64) -> Vec<usize> {
        let used = self.store.lock().count_status(BlockStatus::Used);
        let count = ((used as f64 * corruption_level * 5.0) as usize).clamp(1, MAX_BLOCKS_PER_CRASH);
        self.corrupt_used_blocks(count)
    }

    fn corrupt_used_blocks(&mut self, count: usize) -> Vec<usize> {
        let mut store = self.store.lock();
        let used = store.blocks_with_status(BlockStatus::Used);
        if used.is_empty() {
            warn!("no used blocks to corrupt");
            return Vec::new();
        }

        let mut corrupted: Vec<usize> = used
            .choose_multiple(&mut self.rng, count.min(used.len()))
            .copied()
            .collect();
        corrupted.sort_unstable();
        for &idx in &corrupted {
            store.mark_corrupted(idx);
        }

        let affected_inodes: Vec<InodeId> = store
            .inodes()
            .filter(|inode| inode.blocks.iter().any(|b| corrupted.contains(b)))
            .map(|inode| inode.id)
            .collect();
        info!(
            "crash corrupted {} of {} used blocks ({:.1}%), {} files affected",
            corrupted.len(),
            used.len(),
            corrupted.len() as f64 / used.len() as f64 * 100.0,
            affected_inodes.len()
        );

        self.crash_points.push(CrashPoint {
            corrupted_blocks: corrupted.clone(),
            affected_inodes,
        });
        corrupted
    }

    /// Logs the intent to create `filename` and crashes before any block is
    /// allocated for it. At most one block is corrupted. Returns the id of
    /// the interrupted transaction.
    pub fn controlled_crash_during_operation(&mut self, filename: &str) -> JfsResult<u64> {
        let txn = self.fs.begin_transaction();
        let data = CONTROLLED_PAYLOAD.repeat(CONTROLLED_REPEAT);

        if self.fs.journal_enabled() {
            self.fs.journal_operation(JournalRecord::Create {
                filename: filename.to_string(),
                size: data.len(),
                data_checksum: checksum(&data),
                transaction_id: txn.id,
            })?;
            info!("intent for '{}' logged", filename);
        }

        warn!("controlled crash: transaction {} interrupted", txn.id);
        self.corrupt_used_blocks(1);
        Ok(txn.id)
    }

    pub fn crash_statistics(&self) -> CrashStatistics {
        let stats = self.store.lock().stats();
        let rate = |part: usize, whole: usize| {
            if whole > 0 {
                part as f64 / whole as f64 * 100.0
            } else {
                0.0
            }
        };
        CrashStatistics {
            total_blocks: stats.total_blocks,
            used_blocks: stats.used_blocks,
            corrupted_blocks: stats.corrupted_blocks,
            corruption_rate_total: rate(stats.corrupted_blocks, stats.total_blocks),
            corruption_rate_used: rate(stats.corrupted_blocks, stats.used_blocks),
            crash_points_recorded: self.crash_points.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_store::BlockStore;
    use crate::operation::EntryType;

    fn new_fs(journal_enabled: bool) -> JournalingFileSystem {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = BlockStore::with_geometry(1, 4).unwrap().shared();
        JournalingFileSystem::with_journal(store, journal_enabled)
    }

    #[test]
    fn crash_on_empty_store_is_noop() {
        let mut fs = new_fs(true);
        let mut sim = CrashSimulator::with_seed(&mut fs, 1);
        assert!(sim.simulate_crash(0.5).is_empty());
        assert!(sim.crash_points().is_empty());
    }

    #[test]
    fn crash_corrupts_capped_count_of_used_blocks() {
        let mut fs = new_fs(true);
        for i in 0..10 {
            fs.create_file(&format!("f{}", i), &[i as u8; 5000]).unwrap();
        }
        let mut sim = CrashSimulator::with_seed(&mut fs, 7);
        // 20 used blocks at level 0.3 would be 30, capped to 3
        let hit = sim.simulate_crash(0.3);
        assert_eq!(hit.len(), MAX_BLOCKS_PER_CRASH);
        let store = sim.fs().store().lock();
        for idx in &hit {
            assert_eq!(store.status(*idx), Some(BlockStatus::Corrupted));
        }
        assert_eq!(store.stats().corrupted_blocks, 3);
        assert_eq!(store.stats().used_blocks, 17);
    }

    #[test]
    fn low_level_still_corrupts_one_block() {
        let mut fs = new_fs(true);
        fs.create_file("a", &[1; 100]).unwrap();
        fs.create_file("b", &[2; 100]).unwrap();
        let mut sim = CrashSimulator::with_seed(&mut fs, 3);
        let hit = sim.simulate_crash(0.01);
        assert_eq!(hit.len(), 1);
        assert_eq!(sim.crash_points()[0].affected_inodes.len(), 1);
    }

    #[test]
    fn sequence_without_crash_completes() {
        let mut fs = new_fs(true);
        let mut sim = CrashSimulator::with_seed(&mut fs, 11);
        assert_eq!(sim.simulate_operation_sequence(6, 0.0), 6);
        assert_eq!(sim.crash_statistics().corrupted_blocks, 0);
        assert_eq!(fs.store().lock().stats().total_inodes, 6);
        let files = fs.list_files();
        assert!(files.iter().all(|f| (MIN_FILE_SIZE..=MAX_FILE_SIZE).contains(&f.size)));
    }

    #[test]
    fn sequence_stops_at_first_crash() {
        let mut fs = new_fs(true);
        let mut sim = CrashSimulator::with_seed(&mut fs, 5);
        assert_eq!(sim.simulate_operation_sequence(10, 1.0), 1);
        let stats = sim.crash_statistics();
        assert_eq!(stats.corrupted_blocks, 1);
        assert_eq!(stats.crash_points_recorded, 1);
        assert!(stats.corruption_rate_used > 0.0);
    }

    #[test]
    fn controlled_crash_leaves_pending_intent() {
        let mut fs = new_fs(true);
        let txn = CrashSimulator::with_seed(&mut fs, 9)
            .controlled_crash_during_operation("x")
            .unwrap();
        assert_eq!(txn, 1);
        assert_eq!(fs.journal().len(), 1);
        let entry = &fs.journal().entries()[0];
        assert_eq!(entry.entry_type(), EntryType::Create);
        assert_eq!(entry.record.filename(), Some("x"));
        assert_eq!(fs.store().lock().stats().total_inodes, 0);

        let report = fs.recover_from_journal();
        assert_eq!(report.errors, 1);
        assert_eq!(report.recovered, 0);
        assert_eq!(report.pending.len(), 1);
        assert_eq!(report.pending[0].filename, "x");
    }

    #[test]
    fn controlled_crash_corrupts_at_most_one_block() {
        let mut fs = new_fs(true);
        for i in 0..12 {
            fs.create_file(&format!("f{}", i), &[i as u8; 9000]).unwrap();
        }
        let mut sim = CrashSimulator::with_seed(&mut fs, 2);
        sim.controlled_crash_during_operation("late.dat").unwrap();
        assert_eq!(sim.crash_statistics().corrupted_blocks, 1);
    }

    #[test]
    fn controlled_crash_without_journal_logs_nothing() {
        let mut fs = new_fs(false);
        CrashSimulator::with_seed(&mut fs, 4)
            .controlled_crash_during_operation("x")
            .unwrap();
        assert!(fs.journal().is_empty());
        assert_eq!(fs.recover_from_journal().pending.len(), 0);
    }
}
