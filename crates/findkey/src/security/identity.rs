//! Authenticated principal identity and its fingerprint.

use std::fmt;
use xxhash_rust::xxh64::Xxh64;

/// Claim type for an individual user.
pub const IDENTITY_USER: &str = "USER";
/// Claim type for a service account.
pub const IDENTITY_SERVICE: &str = "SERVICE";
/// Claim type for a service tier.
pub const IDENTITY_TIER: &str = "TIER";
/// Claim type for a machine.
pub const IDENTITY_MACHINE: &str = "MACHINE";
/// Claim type for a batch job.
pub const IDENTITY_JOB: &str = "JOB";

/// Principal type of a client that presented no credentials.
pub const UNAUTHENTICATED: &str = "unauthenticated";
/// Principal type of a client authenticated through TLS.
pub const TLS: &str = "tls";

const FINGERPRINT_SEED: u64 = 0;

/// Returns true if `claim_type` is one of the recognized identity types.
pub fn is_valid_identity_type(claim_type: &str) -> bool {
    matches!(
        claim_type,
        IDENTITY_USER | IDENTITY_SERVICE | IDENTITY_TIER | IDENTITY_MACHINE | IDENTITY_JOB
    )
}

/// A (claim-type, claim-value) pair.
pub type Claim = (String, String);

/// The identity a client authenticated as.
///
/// The fingerprint is computed once at construction over the canonical
/// (sorted, deduplicated) claim set, so two identities holding the same
/// claims in any order share a fingerprint. Permission caches key on it.
///
/// # Examples
/// ```rust,ignore
/// use alopex_findkey::security::{PrincipalIdentity, IDENTITY_USER, TLS};
///
/// let identity = PrincipalIdentity::new(TLS, (IDENTITY_USER.into(), "alice".into()));
/// let fingerprint = identity.fingerprint();
/// ```
#[derive(Debug, Clone)]
pub struct PrincipalIdentity {
    principal_type: String,
    primary: Claim,
    identities: Vec<Claim>,
    fingerprint: u64,
}

impl PrincipalIdentity {
    /// Creates an identity holding a single claim, which is also primary.
    pub fn new(principal_type: impl Into<String>, primary: Claim) -> Self {
        Self::with_identities(principal_type, primary.clone(), vec![primary])
    }

    /// Creates an identity with a primary claim and a full claim list.
    pub fn with_identities(
        principal_type: impl Into<String>,
        primary: Claim,
        identities: Vec<Claim>,
    ) -> Self {
        let fingerprint = compute_fingerprint(&primary, &identities);
        Self {
            principal_type: principal_type.into(),
            primary,
            identities,
            fingerprint,
        }
    }

    /// Creates an identity for a client that presented no credentials.
    pub fn unauthenticated() -> Self {
        Self::with_identities(UNAUTHENTICATED, (String::new(), String::new()), Vec::new())
    }

    /// Returns the principal type.
    pub fn principal_type(&self) -> &str {
        &self.principal_type
    }

    /// Returns the primary claim.
    pub fn primary(&self) -> &Claim {
        &self.primary
    }

    /// Returns the claims in presentation order.
    pub fn identities(&self) -> &[Claim] {
        &self.identities
    }

    /// Returns true if every claim carries a recognized identity type.
    pub fn has_valid_claims(&self) -> bool {
        self.identities
            .iter()
            .all(|(claim_type, _)| is_valid_identity_type(claim_type))
    }

    /// Stable 64-bit fingerprint, independent of claim order.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// Hashes the canonical claim set. Each string is length-prefixed so that
/// `("ab", "c")` and `("a", "bc")` hash differently.
fn compute_fingerprint(primary: &Claim, identities: &[Claim]) -> u64 {
    let mut claims: Vec<&Claim> = if identities.is_empty() {
        vec![primary]
    } else {
        identities.iter().collect()
    };
    claims.sort();
    claims.dedup();

    let mut hasher = Xxh64::new(FINGERPRINT_SEED);
    for (claim_type, value) in claims {
        for part in [claim_type, value] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
    }
    hasher.digest()
}

impl PartialEq for PrincipalIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.principal_type == other.principal_type && self.fingerprint == other.fingerprint
    }
}

impl Eq for PrincipalIdentity {}

impl fmt::Display for PrincipalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal type: {}, Identities: ", self.principal_type)?;
        for (claim_type, value) in &self.identities {
            write!(f, "{}:{} ", claim_type, value)?;
        }
        Ok(())
    }
}
