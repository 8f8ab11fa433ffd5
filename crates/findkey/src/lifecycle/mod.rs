//! Lifecycle of a log's partitions: directory ordering, rotation, trim and
//! the node-wide log registry.

pub mod directory;
pub mod log;
pub mod registry;
pub mod trim;

pub use directory::{Coverage, PartitionDescriptor, PartitionDirectory, PartitionRef};
pub use log::LogPartitions;
pub use registry::LogRegistry;
pub use trim::{TrimTracker, MAX_TRIM_POINT};
