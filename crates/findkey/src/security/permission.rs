//! Permission checking contract and checkers.
//!
//! The decision itself belongs to an external policy component; this module
//! fixes the synchronous tri-state call contract and provides an allow-list
//! checker plus a cache that can front any checker.

use crate::security::identity::PrincipalIdentity;
use crate::types::LogId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Actions that can be performed on a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Read records or search by timestamp.
    Read,
    /// Append records.
    Append,
    /// Move the trim point.
    Trim,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::Read => "read",
            Permission::Append => "append",
            Permission::Trim => "trim",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCheckStatus {
    /// The action is permitted.
    Allowed,
    /// The action is not permitted.
    Denied,
    /// The permission subsystem cannot decide yet; retry later.
    NotReady,
}

/// Decides whether a principal may perform an action on a log.
pub trait PermissionChecker: Send + Sync {
    /// Checks `action` on `log_id` for `identity`.
    fn check(
        &self,
        identity: &PrincipalIdentity,
        log_id: LogId,
        action: Permission,
    ) -> PermissionCheckStatus;
}

impl<T: PermissionChecker + ?Sized> PermissionChecker for Arc<T> {
    fn check(
        &self,
        identity: &PrincipalIdentity,
        log_id: LogId,
        action: Permission,
    ) -> PermissionCheckStatus {
        (**self).check(identity, log_id, action)
    }
}

type Grant = (u64, Option<LogId>, Permission);

/// Allow-list checker keyed by identity fingerprint.
///
/// Grants name a log or, with `None`, every log. Anything not granted is
/// denied. Marking the checker not ready makes every check return
/// [`PermissionCheckStatus::NotReady`].
#[derive(Debug)]
pub struct StaticPermissionChecker {
    grants: RwLock<HashSet<Grant>>,
    ready: AtomicBool,
}

impl Default for StaticPermissionChecker {
    fn default() -> Self {
        Self {
            grants: RwLock::new(HashSet::new()),
            ready: AtomicBool::new(true),
        }
    }
}

impl StaticPermissionChecker {
    /// Creates a checker that denies everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a checker that grants `action` on every log to every identity
    /// in `identities`.
    pub fn allowing<'a>(
        identities: impl IntoIterator<Item = &'a PrincipalIdentity>,
        action: Permission,
    ) -> Self {
        let checker = Self::new();
        for identity in identities {
            checker.grant(identity, None, action);
        }
        checker
    }

    /// Grants `action` on `log_id` (or every log) to `identity`.
    pub fn grant(&self, identity: &PrincipalIdentity, log_id: Option<LogId>, action: Permission) {
        self.grants
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .insert((identity.fingerprint(), log_id, action));
    }

    /// Revokes a grant previously made with [`grant`](Self::grant).
    pub fn revoke(&self, identity: &PrincipalIdentity, log_id: Option<LogId>, action: Permission) {
        self.grants
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .remove(&(identity.fingerprint(), log_id, action));
    }

    /// Marks the checker ready or not ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl PermissionChecker for StaticPermissionChecker {
    fn check(
        &self,
        identity: &PrincipalIdentity,
        log_id: LogId,
        action: Permission,
    ) -> PermissionCheckStatus {
        if !self.ready.load(Ordering::SeqCst) {
            return PermissionCheckStatus::NotReady;
        }

        let grants = self.grants.read().unwrap_or_else(|err| err.into_inner());
        let fingerprint = identity.fingerprint();
        if grants.contains(&(fingerprint, Some(log_id), action))
            || grants.contains(&(fingerprint, None, action))
        {
            PermissionCheckStatus::Allowed
        } else {
            PermissionCheckStatus::Denied
        }
    }
}

type CacheKey = (u64, LogId, Permission);

/// Caches decisions of an inner checker by identity fingerprint.
///
/// Only `Allowed` and `Denied` are cached; `NotReady` always goes back to the
/// inner checker.
#[derive(Debug)]
pub struct CachingPermissionChecker<C> {
    inner: C,
    cache: RwLock<HashMap<CacheKey, PermissionCheckStatus>>,
}

impl<C: PermissionChecker> CachingPermissionChecker<C> {
    /// Wraps `inner` with an empty cache.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the wrapped checker.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Drops every cached decision.
    pub fn invalidate(&self) {
        self.cache
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .clear();
    }

    /// Returns the number of cached decisions.
    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap_or_else(|err| err.into_inner()).len()
    }
}

impl<C: PermissionChecker> PermissionChecker for CachingPermissionChecker<C> {
    fn check(
        &self,
        identity: &PrincipalIdentity,
        log_id: LogId,
        action: Permission,
    ) -> PermissionCheckStatus {
        let key = (identity.fingerprint(), log_id, action);
        if let Some(status) = self
            .cache
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(&key)
        {
            return *status;
        }

        let status = self.inner.check(identity, log_id, action);
        if status != PermissionCheckStatus::NotReady {
            debug!(
                "Caching {:?} for {} on log {}",
                status, action, log_id
            );
            self.cache
                .write()
                .unwrap_or_else(|err| err.into_inner())
                .insert(key, status);
        }
        status
    }
}
