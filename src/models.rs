use core::fmt;

use serde::{Deserialize, Serialize};

pub type InodeId = u64;

/// Per-block state, kept in a side table next to the block arena.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockStatus {
    Free,
    Used,
    Corrupted,
}

impl BlockStatus {
    pub const ALL: [BlockStatus; 3] = [BlockStatus::Free, BlockStatus::Used, BlockStatus::Corrupted];
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockStatus::Free => "FREE",
            BlockStatus::Used => "USED",
            BlockStatus::Corrupted => "CORRUPTED",
        };
        f.write_str(name)
    }
}

/// File metadata owned by the store's inode table
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Inode {
    pub id: InodeId,
    pub size: usize,
    pub blocks: Vec<usize>, // ordered, one per block_size chunk of content
    pub checksum: String,   // SHA-256 over the full content at commit time
    pub created_at: f64,
    pub modified_at: f64,
}

/// Summary row returned by `JournalingFileSystem::list_files`
#[derive(Serialize, Clone, Debug)]
pub struct FileSummary {
    pub inode_id: InodeId,
    pub size: usize,
    pub blocks: usize,
    pub checksum: String,
    pub created_at: f64,
}
