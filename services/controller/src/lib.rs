//! Allocation controller for the fake DRA driver.
//!
//! The controller answers the scheduling framework: it resolves claim and
//! class parameters, filters candidate nodes by free device capacity and
//! commits allocations into each node's NodeAllocationState.
//!
//! - [`driver::Driver`]: the framework-facing entry points
//! - [`fake::FakeAllocator`]: device selection for fabricated devices
//! - [`pending::PendingAllocationTracker`]: proposals made during filtering
//! - [`mutex::NodeLockTable`]: per-node serialization of writes
//! - [`server::FrameworkServer`]: the gRPC service the framework talks to

pub mod claim_params;
pub mod config;
pub mod driver;
pub mod error;
pub mod fake;
pub mod mutex;
pub mod params;
pub mod pending;
pub mod server;

pub use driver::Driver;
pub use error::DriverError;
