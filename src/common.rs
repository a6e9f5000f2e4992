//! Error type and small helpers shared by every component.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::InodeId;

#[derive(Debug, onlyerror::Error)]
pub enum JfsError {
    #[error("not enough free blocks: needed {needed}, free {free}")]
    AllocationFailure { needed: usize, free: usize },
    #[error("inode {0} not found")]
    NotFound(InodeId),
    #[error("block {0} is out of range or unreadable")]
    BlockUnreadable(usize),
    #[error("invalid disk geometry: {size_mb}MB with {block_size_kb}KB blocks")]
    InvalidGeometry { size_mb: usize, block_size_kb: usize },
    #[error("journal payload serialization failed")]
    Serialize(#[from] serde_json::Error),
}

pub type JfsResult<T> = Result<T, JfsError>;

/// Wall clock in seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
