//! Kubelet plugin for the fake DRA driver.
//!
//! Runs on every node. At startup it fabricates the node's devices and
//! publishes them in the node's NodeAllocationState; afterwards it prepares
//! allocated claims by writing CDI specs for the container runtime.

pub mod cdi;
pub mod config;
pub mod driver;
pub mod emulator;
pub mod error;
pub mod server;
pub mod state;

pub use driver::NodeDriver;
pub use error::PluginError;
