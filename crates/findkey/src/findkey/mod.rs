//! FINDKEY: resolving a timestamp to the first LSN at or after it.

pub mod handler;
pub mod resolver;
pub mod service;

pub use handler::{FindKeyRequest, FindKeyResponse, FindKeyStatus, RequestHandler};
pub use resolver::{find_key_in, FindKeyOutcome, FindKeyResult, LsnResolver, SearchMode};
pub use service::{FindKeyService, DEFAULT_DEADLINE};
