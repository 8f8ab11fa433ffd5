//! Partition storage: file layout and the per-partition append-only store.

pub mod layout;
pub mod store;

pub use layout::{PartitionFileInfo, PartitionLayout};
pub use store::{
    IndexEntry, LocalPartitionStore, PartitionMeta, PartitionSnapshot, SealedBounds, StoreBounds,
    StoreState, MAX_PAYLOAD_SIZE, PARTITION_MAGIC, PARTITION_VERSION,
};
