//! The key-resolution interface consumed by the validation pipeline.
//!
//! JWKS retrieval, HTTP refresh, and background rotation are explicitly out
//! of scope for this crate (see `spec.md` §1) — callers implement
//! [`KeyResolver`] against whatever transport they use, the way
//! `global-controller`'s `JwksClient` wraps an HTTP fetch behind a narrow
//! `get_key` method. This crate only needs the trait boundary and ships one
//! trivial in-memory implementation for tests and simple deployments with a
//! fixed key set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey};
use thiserror::Error;

/// The concrete algorithm family of a resolved key, alongside the
/// `jsonwebtoken` decoding material needed to verify a signature with it.
#[derive(Clone)]
pub enum VerificationKey {
    Rsa {
        algorithm: Algorithm,
        key: DecodingKey,
    },
    Ec {
        algorithm: Algorithm,
        key: DecodingKey,
    },
    Hmac {
        algorithm: Algorithm,
        key: DecodingKey,
    },
}

impl VerificationKey {
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa { algorithm, .. } | Self::Ec { algorithm, .. } | Self::Hmac { algorithm, .. } => {
                *algorithm
            }
        }
    }

    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        match self {
            Self::Rsa { key, .. } | Self::Ec { key, .. } | Self::Hmac { key, .. } => key,
        }
    }

    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            Self::Rsa { .. } => "RSA",
            Self::Ec { .. } => "EC",
            Self::Hmac { .. } => "HMAC",
        }
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material, even accidentally via derived Debug.
        f.debug_struct("VerificationKey")
            .field("family", &self.family())
            .field("algorithm", &self.algorithm())
            .finish()
    }
}

/// Failure surfaced by a [`KeyResolver`] implementation.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("no verification key found for the given key id and algorithm")]
    KeyNotFound,
    #[error("key resolution failed: {0}")]
    ResolutionFailed(String),
}

/// Capability the validation pipeline uses to turn a `(kid, alg)` pair into
/// verification key material.
///
/// Implementations must be thread-safe and must not perform synchronous
/// network I/O on this call path; background refresh of the backing JWKS
/// is the implementation's concern, not the pipeline's.
pub trait KeyResolver: Send + Sync {
    /// Resolve a verification key for the given optional key id and
    /// required algorithm name (the JOSE `alg` header value, e.g. `"RS256"`).
    fn resolve(&self, kid: Option<&str>, alg: &str) -> Result<Arc<VerificationKey>, ResolutionError>;
}

/// A fixed, in-memory [`KeyResolver`] keyed by `(kid, alg)`.
///
/// Suitable for tests and for deployments with a small, statically
/// configured key set; production JWKS-backed resolvers belong in the
/// embedding application.
#[derive(Default)]
pub struct StaticKeyResolver {
    keys: HashMap<(Option<String>, String), Arc<VerificationKey>>,
}

impl StaticKeyResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(mut self, kid: Option<&str>, alg: &str, key: VerificationKey) -> Self {
        self.keys.insert(
            (kid.map(str::to_owned), alg.to_owned()),
            Arc::new(key),
        );
        self
    }
}

impl KeyResolver for StaticKeyResolver {
    fn resolve(&self, kid: Option<&str>, alg: &str) -> Result<Arc<VerificationKey>, ResolutionError> {
        self.keys
            .get(&(kid.map(str::to_owned), alg.to_owned()))
            .cloned()
            .ok_or(ResolutionError::KeyNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_resolver_finds_matching_kid_and_alg() {
        let resolver = StaticKeyResolver::new().with_key(
            Some("k1"),
            "HS256",
            VerificationKey::Hmac {
                algorithm: Algorithm::HS256,
                key: DecodingKey::from_secret(b"secret"),
            },
        );

        let found = resolver.resolve(Some("k1"), "HS256");
        assert!(found.is_ok());
    }

    #[test]
    fn static_resolver_reports_not_found_for_unknown_kid() {
        let resolver = StaticKeyResolver::new();
        let err = resolver.resolve(Some("missing"), "HS256").unwrap_err();
        assert!(matches!(err, ResolutionError::KeyNotFound));
    }

    #[test]
    fn verification_key_debug_never_prints_material() {
        let key = VerificationKey::Hmac {
            algorithm: Algorithm::HS256,
            key: DecodingKey::from_secret(b"top-secret-key-material"),
        };
        let debug = format!("{key:?}");
        assert!(!debug.contains("top-secret-key-material"));
    }
}
