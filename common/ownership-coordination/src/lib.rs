//! Ownership coordination for partitioned event-stream processors.
//!
//! Processors never talk to each other directly: the only shared state is an
//! ownership/checkpoint store with compare-and-set semantics (eTags). This
//! crate holds the durable record types, the [`PartitionManager`] store
//! contract, an in-memory store implementation for tests and quickstarts,
//! and the [`PartitionLoadBalancer`] decision function that converges a
//! fleet toward an even partition assignment.

pub mod balancer;
pub mod error;
pub mod manager;
pub mod memory;
pub mod types;
pub mod util;

pub use balancer::PartitionLoadBalancer;
pub use error::{Error, Result};
pub use manager::PartitionManager;
pub use memory::InMemoryPartitionManager;
pub use types::{Checkpoint, PartitionOwnership};
