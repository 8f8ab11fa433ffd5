//! FINDKEY request handling: validation, permission gate, response shaping.

use crate::error::{FindKeyError, Result};
use crate::findkey::resolver::{FindKeyOutcome, FindKeyResult, LsnResolver, SearchMode};
use crate::security::{Permission, PermissionCheckStatus, PermissionChecker, PrincipalIdentity};
use crate::types::{LogId, Lsn, Timestamp, LSN_INVALID};
use tracing::{debug, error, warn};

/// A FINDKEY request.
#[derive(Debug, Clone)]
pub struct FindKeyRequest {
    /// Log to search.
    pub log_id: LogId,
    /// Timestamp to resolve, in milliseconds.
    pub target_timestamp: Timestamp,
    /// Trim handling.
    pub search_mode: SearchMode,
    /// Authenticated caller.
    pub identity: PrincipalIdentity,
    /// Permission the caller needs on the log.
    pub required_permission: Permission,
}

impl FindKeyRequest {
    /// Creates a strict-mode read request.
    pub fn new(log_id: LogId, target_timestamp: Timestamp, identity: PrincipalIdentity) -> Self {
        Self {
            log_id,
            target_timestamp,
            search_mode: SearchMode::Strict,
            identity,
            required_permission: Permission::Read,
        }
    }

    /// Sets the search mode.
    pub fn with_search_mode(mut self, search_mode: SearchMode) -> Self {
        self.search_mode = search_mode;
        self
    }

    /// Sets the required permission.
    pub fn with_required_permission(mut self, permission: Permission) -> Self {
        self.required_permission = permission;
        self
    }
}

/// Status of a FINDKEY response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindKeyStatus {
    /// The boundary was resolved.
    Ok,
    /// The log has no partitions.
    NotFound,
    /// The caller may not read the log.
    AccessDenied,
    /// Storage or the permission subsystem failed.
    StorageError,
}

/// A FINDKEY response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindKeyResponse {
    /// Outcome status.
    pub status: FindKeyStatus,
    /// Resolved LSN; `LSN_INVALID` unless `status` is `Ok`.
    pub result_lsn: Lsn,
    /// Timestamp belonging to `result_lsn`.
    pub result_timestamp: Timestamp,
    /// True if `result_lsn` is a best-effort bound.
    pub result_approximate: bool,
    /// True if a partition was unavailable and the bound was inferred.
    pub degraded: bool,
    /// True if the same request may succeed when retried.
    pub retryable: bool,
}

impl FindKeyResponse {
    fn found(result: FindKeyResult) -> Self {
        Self {
            status: FindKeyStatus::Ok,
            result_lsn: result.lsn,
            result_timestamp: result.timestamp,
            result_approximate: result.approximate,
            degraded: result.degraded,
            retryable: false,
        }
    }

    fn failed(status: FindKeyStatus, retryable: bool) -> Self {
        Self {
            status,
            result_lsn: LSN_INVALID,
            result_timestamp: 0,
            result_approximate: false,
            degraded: false,
            retryable,
        }
    }
}

/// Front door for FINDKEY requests.
///
/// Validation runs before the permission check, and the permission check
/// runs before any log lookup, so a denied caller learns nothing about
/// which logs exist. The handler never retries.
#[derive(Debug)]
pub struct RequestHandler<C: PermissionChecker> {
    resolver: LsnResolver,
    checker: C,
}

impl<C: PermissionChecker> RequestHandler<C> {
    /// Creates a handler.
    pub fn new(resolver: LsnResolver, checker: C) -> Self {
        Self { resolver, checker }
    }

    /// Returns the permission checker.
    pub fn checker(&self) -> &C {
        &self.checker
    }

    /// Handles one request.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed log id, or for a well-formed id
    /// that names no log once the caller has been allowed. Every other
    /// outcome is a response.
    pub fn handle(&self, request: &FindKeyRequest) -> Result<FindKeyResponse> {
        if !request.log_id.is_valid() {
            return Err(FindKeyError::Validation(format!(
                "invalid log id {}",
                request.log_id
            )));
        }

        match self
            .checker
            .check(&request.identity, request.log_id, request.required_permission)
        {
            PermissionCheckStatus::Allowed => {}
            PermissionCheckStatus::Denied => {
                warn!(
                    "FINDKEY denied: {} lacks {} on log {}",
                    request.identity, request.required_permission, request.log_id
                );
                return Ok(FindKeyResponse::failed(FindKeyStatus::AccessDenied, false));
            }
            PermissionCheckStatus::NotReady => {
                warn!(
                    "FINDKEY on log {}: permission checker not ready",
                    request.log_id
                );
                return Ok(FindKeyResponse::failed(FindKeyStatus::StorageError, true));
            }
        }

        let outcome = self.resolver.find_key(
            request.log_id,
            request.target_timestamp,
            request.search_mode,
        );
        match outcome {
            Ok(FindKeyOutcome::Found(result)) => {
                debug!(
                    "FINDKEY log {} ts {} -> lsn {} (approximate: {})",
                    request.log_id, request.target_timestamp, result.lsn, result.approximate
                );
                Ok(FindKeyResponse::found(result))
            }
            Ok(FindKeyOutcome::NotFound) => Ok(FindKeyResponse::failed(FindKeyStatus::NotFound, false)),
            Err(FindKeyError::Validation(reason)) => Err(FindKeyError::Validation(reason)),
            Err(err @ FindKeyError::InvariantViolation { .. }) => {
                error!("FINDKEY log {} failed: {}", request.log_id, err);
                Ok(FindKeyResponse::failed(FindKeyStatus::StorageError, false))
            }
            Err(err) => {
                warn!("FINDKEY log {} storage failure: {}", request.log_id, err);
                Ok(FindKeyResponse::failed(FindKeyStatus::StorageError, false))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreConfig, SyncMode};
    use crate::lifecycle::LogRegistry;
    use crate::security::{StaticPermissionChecker, IDENTITY_USER, TLS};
    use crate::types::Record;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn alice() -> PrincipalIdentity {
        PrincipalIdentity::new(TLS, (IDENTITY_USER.to_string(), "alice".to_string()))
    }

    fn mallory() -> PrincipalIdentity {
        PrincipalIdentity::new(TLS, (IDENTITY_USER.to_string(), "mallory".to_string()))
    }

    fn handler(temp_dir: &TempDir) -> RequestHandler<StaticPermissionChecker> {
        let config = StoreConfig::new(temp_dir.path()).with_sync_mode(SyncMode::None);
        let registry = Arc::new(LogRegistry::new(config));
        let log = registry.create_log(LogId(1)).unwrap();
        for ts in [10, 20, 30] {
            log.append(Record::new(ts, b"x".to_vec())).unwrap();
        }
        registry.create_log(LogId(2)).unwrap();

        let checker = StaticPermissionChecker::allowing([&alice()], Permission::Read);
        RequestHandler::new(LsnResolver::new(registry), checker)
    }

    /// Counts calls so tests can assert the gate ran.
    struct CountingChecker {
        status: PermissionCheckStatus,
        calls: AtomicUsize,
    }

    impl PermissionChecker for CountingChecker {
        fn check(&self, _: &PrincipalIdentity, _: LogId, _: Permission) -> PermissionCheckStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.status
        }
    }

    #[test]
    fn test_allowed_request_resolves() {
        let temp_dir = TempDir::new().unwrap();
        let handler = handler(&temp_dir);

        let response = handler
            .handle(&FindKeyRequest::new(LogId(1), 15, alice()))
            .unwrap();
        assert_eq!(response.status, FindKeyStatus::Ok);
        assert_eq!(response.result_lsn, 2);
        assert_eq!(response.result_timestamp, 20);
        assert!(!response.result_approximate);
        assert!(!response.retryable);
    }

    #[test]
    fn test_empty_log_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let handler = handler(&temp_dir);

        let response = handler
            .handle(&FindKeyRequest::new(LogId(2), 15, alice()))
            .unwrap();
        assert_eq!(response.status, FindKeyStatus::NotFound);
        assert_eq!(response.result_lsn, LSN_INVALID);
    }

    #[test]
    fn test_denied_regardless_of_log_existence() {
        let temp_dir = TempDir::new().unwrap();
        let handler = handler(&temp_dir);

        for log_id in [LogId(1), LogId(2), LogId(999)] {
            let response = handler
                .handle(&FindKeyRequest::new(log_id, 15, mallory()))
                .unwrap();
            assert_eq!(response.status, FindKeyStatus::AccessDenied);
            assert_eq!(response.result_lsn, LSN_INVALID);
            assert_eq!(response.result_timestamp, 0);
        }
    }

    #[test]
    fn test_not_ready_is_retryable_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        let handler = handler(&temp_dir);
        handler.checker().set_ready(false);

        let response = handler
            .handle(&FindKeyRequest::new(LogId(1), 15, alice()))
            .unwrap();
        assert_eq!(response.status, FindKeyStatus::StorageError);
        assert!(response.retryable);
    }

    #[test]
    fn test_invalid_log_id_skips_permission_check() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(LogRegistry::new(StoreConfig::new(temp_dir.path())));
        let checker = CountingChecker {
            status: PermissionCheckStatus::Allowed,
            calls: AtomicUsize::new(0),
        };
        let handler = RequestHandler::new(LsnResolver::new(registry), checker);

        let err = handler
            .handle(&FindKeyRequest::new(LogId::INVALID, 15, alice()))
            .unwrap_err();
        assert!(matches!(err, FindKeyError::Validation(_)));
        assert_eq!(handler.checker().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_log_after_allow_is_validation_error() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(LogRegistry::new(StoreConfig::new(temp_dir.path())));
        let checker = CountingChecker {
            status: PermissionCheckStatus::Allowed,
            calls: AtomicUsize::new(0),
        };
        let handler = RequestHandler::new(LsnResolver::new(registry), checker);

        let err = handler
            .handle(&FindKeyRequest::new(LogId(5), 15, alice()))
            .unwrap_err();
        assert!(matches!(err, FindKeyError::Validation(_)));
        assert_eq!(handler.checker().calls.load(Ordering::SeqCst), 1);
    }
}
