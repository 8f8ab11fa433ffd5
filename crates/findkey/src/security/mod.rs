//! Principal identities and the permission gate in front of FINDKEY.

pub mod identity;
pub mod permission;

pub use identity::{
    is_valid_identity_type, Claim, PrincipalIdentity, IDENTITY_JOB, IDENTITY_MACHINE,
    IDENTITY_SERVICE, IDENTITY_TIER, IDENTITY_USER, TLS, UNAUTHENTICATED,
};
pub use permission::{
    CachingPermissionChecker, Permission, PermissionCheckStatus, PermissionChecker,
    StaticPermissionChecker,
};
