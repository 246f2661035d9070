//! NodeAllocationState persistence.
//!
//! The record is the only channel between the controller and the kubelet
//! plugin, so every write is a compare-and-swap on `resource_version`:
//!
//! - [`NodeStateStore`]: Get/Create/Update/Delete against a backend
//! - [`MemoryNodeStateStore`] and [`SqliteNodeStateStore`]: the backends
//! - [`NodeStateClient`]: a handle bound to one node's record
//! - [`retry_on_conflict`]: bounded retry of a read-modify-write closure

mod client;
mod error;
mod memory;
mod retry;
mod sqlite;
mod store;

pub use client::NodeStateClient;
pub use error::StoreError;
pub use memory::MemoryNodeStateStore;
pub use retry::{retry_on_conflict, ConflictAware, RetryPolicy};
pub use sqlite::SqliteNodeStateStore;
pub use store::NodeStateStore;
