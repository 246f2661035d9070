//! Per-node mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Registry of one async mutex per node name.
///
/// Every read-modify-write of a node's NodeAllocationState done by the
/// controller holds that node's mutex for its whole duration. The outer lock
/// only guards lazy insertion and is never held across an await.
#[derive(Debug, Default)]
pub struct NodeLockTable {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NodeLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex for `node`, creating it on first use. Repeated calls
    /// with the same name return the same mutex.
    pub fn get(&self, node: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(node.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
