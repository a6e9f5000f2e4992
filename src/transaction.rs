/// A logical operation attempt. Carries no isolation or rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub id: u64,
}

/// Monotonic transaction id source, one per file system instance.
#[derive(Debug)]
pub struct TransactionManager {
    next_txn_id: u64,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self { next_txn_id: 1 }
    }

    pub fn begin_transaction(&mut self) -> Transaction {
        let id = self.next_txn_id;
        self.next_txn_id += 1;
        Transaction { id }
    }

    /// The running counter, i.e. the id the next transaction will get.
    /// Journal entries are stamped with this value at append time.
    pub fn current_id(&self) -> u64 {
        self.next_txn_id
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
