//! Alopex FindKey - timestamp to LSN resolution over local log partitions
//!
//! This crate stores each log as a sequence of time-ordered partition files
//! on local disk and answers FINDKEY: given a timestamp, the LSN of the first
//! record at or after it.
//!
//! # Components
//!
//! - [`LocalPartitionStore`]: append-only partition file with an in-memory index
//! - [`PartitionDirectory`]: ordered partitions of one log
//! - [`LsnResolver`]: the FINDKEY search itself
//! - [`RequestHandler`]: permission gate and response shaping
//! - [`FindKeyService`]: async front with per-request deadlines
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_findkey::{LogRegistry, LsnResolver, RequestHandler, StoreConfig};
//! use alopex_findkey::findkey::FindKeyRequest;
//!
//! let registry = Arc::new(LogRegistry::open(StoreConfig::new("/var/lib/logs"))?);
//! registry.create_log(LogId(1))?.append(Record::new(now_ms, payload))?;
//!
//! let handler = RequestHandler::new(LsnResolver::new(registry), checker);
//! let response = handler.handle(&FindKeyRequest::new(LogId(1), target_ms, identity))?;
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod findkey;
pub mod lifecycle;
pub mod security;
pub mod storage;
pub mod types;

pub use config::{StoreConfig, SyncMode};
pub use error::{FindKeyError, Result};
pub use findkey::{
    FindKeyOutcome, FindKeyRequest, FindKeyResponse, FindKeyResult, FindKeyService,
    FindKeyStatus, LsnResolver, RequestHandler, SearchMode,
};
pub use lifecycle::{LogPartitions, LogRegistry, PartitionDescriptor, PartitionDirectory};
pub use security::{Permission, PermissionCheckStatus, PermissionChecker, PrincipalIdentity};
pub use storage::{LocalPartitionStore, PartitionSnapshot, StoreState};
pub use types::{LogId, Lsn, PartitionId, Record, Timestamp, LSN_INVALID, LSN_MAX, LSN_OLDEST};
