//! Async front for the request handler.
//!
//! Each request runs on tokio's blocking pool, since partition reads and
//! reopens are synchronous file I/O. The caller's deadline bounds how long it
//! waits; work that outlives the deadline (an in-progress `reopen` in
//! particular) still runs to completion and its result is discarded.

use crate::error::{FindKeyError, Result};
use crate::findkey::handler::{FindKeyRequest, FindKeyResponse, RequestHandler};
use crate::security::PermissionChecker;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default per-request deadline (5 seconds).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// Serves FINDKEY requests from async code.
#[derive(Debug)]
pub struct FindKeyService<C: PermissionChecker> {
    handler: Arc<RequestHandler<C>>,
    deadline: Duration,
}

impl<C: PermissionChecker> Clone for FindKeyService<C> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            deadline: self.deadline,
        }
    }
}

impl<C: PermissionChecker + 'static> FindKeyService<C> {
    /// Wraps `handler` with the default deadline.
    pub fn new(handler: RequestHandler<C>) -> Self {
        Self {
            handler: Arc::new(handler),
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Sets the default deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Returns the wrapped handler.
    pub fn handler(&self) -> &RequestHandler<C> {
        &self.handler
    }

    /// Handles `request` within the default deadline.
    pub async fn find_key(&self, request: FindKeyRequest) -> Result<FindKeyResponse> {
        self.find_key_within(request, self.deadline).await
    }

    /// Handles `request` within `deadline`.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` if no result arrived in time, plus
    /// whatever [`RequestHandler::handle`] returns.
    pub async fn find_key_within(
        &self,
        request: FindKeyRequest,
        deadline: Duration,
    ) -> Result<FindKeyResponse> {
        let handler = Arc::clone(&self.handler);
        let log_id = request.log_id;
        let task = tokio::task::spawn_blocking(move || handler.handle(&request));

        match tokio::time::timeout(deadline, task).await {
            Ok(joined) => joined.unwrap_or_else(|e| {
                Err(FindKeyError::Io(io::Error::new(io::ErrorKind::Other, e)))
            }),
            Err(_) => {
                warn!(
                    "FINDKEY on log {} abandoned after {:?}",
                    log_id, deadline
                );
                Err(FindKeyError::DeadlineExceeded(deadline))
            }
        }
    }
}
