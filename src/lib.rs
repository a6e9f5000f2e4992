//! jfsim: a simulated block device with a write-ahead journal, a crash
//! injector and an integrity auditor, for comparing how well files survive
//! a fault with and without journaling.
//!
//! ```rust,ignore
//! use jfsim::{BlockStore, CrashSimulator, IntegrityChecker, JournalingFileSystem};
//!
//! let store = BlockStore::with_geometry(1, 4)?.shared();
//! let mut fs = JournalingFileSystem::with_journal(store.clone(), true);
//! fs.create_file("a.txt", b"hello")?;
//! CrashSimulator::new(&mut fs).simulate_crash(0.3);
//! let report = IntegrityChecker::new(&store.lock()).comprehensive_check();
//! let recovery = fs.recover_from_journal();
//! ```

// Shared model
pub mod common;
pub mod models;

// Storage and journal
pub mod block_store;
pub mod operation;
pub mod transaction;
pub mod wal;

pub mod journaling_fs;

// Fault injection and auditing
pub mod crash_simulator;
pub mod integrity_checker;


pub use block_store::{checksum, BlockStore, DiskConfig, DiskStats, SharedStore};
pub use common::{JfsError, JfsResult};
pub use crash_simulator::{CrashPoint, CrashSimulator, CrashStatistics};
pub use integrity_checker::{FileCheck, FileStatus, IntegrityChecker, IntegrityReport, StateComparison};
pub use journaling_fs::{FileRead, FsConfig, JournalingFileSystem, RecoveryReport};
pub use models::{BlockStatus, Inode, InodeId};
pub use operation::{EntryType, JournalRecord};
pub use wal::{Journal, JournalEntry};

pub const DEFAULT_DISK_SIZE_MB: usize = 10;
pub const DEFAULT_BLOCK_SIZE_KB: usize = 4;
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 5;
