//! Test support shared by the controller, the kubelet plugin and the e2e
//! suite.

mod faulty;
pub mod fixtures;

pub use faulty::ConflictingStore;
