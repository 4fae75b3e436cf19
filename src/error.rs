//! Error taxonomy and the security event counter.
//!
//! `EventType` is the single closed enum used both as the machine-readable
//! discriminator on [`ValidationError`] and as the key type of
//! [`SecurityEventCounter`] — one enum, not two parallel ones, so a failure
//! and the counter bump it causes can never drift out of sync.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Closed set of validation outcomes, grouped for documentation only; the
/// grouping carries no runtime meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventType {
    // Format
    TokenEmpty,
    TokenSizeExceeded,
    InvalidJwtFormat,
    FailedToDecodeJwt,
    DecodedPartSizeExceeded,

    // Header
    AlgorithmNotAllowed,
    AlgorithmNoneRejected,
    UnsupportedTokenType,

    // Keys
    KeyNotFound,
    KeyResolutionFailed,

    // Signature
    SignatureInvalid,

    // Claims
    IssuerMismatch,
    AudienceMismatch,
    AuthorizedPartyMismatch,
    AuthorizedPartyMissing,
    SubjectMissing,
    TokenExpired,
    TokenNotYetValid,
    TokenIssuedInFuture,

    // Cache-internal
    AccessTokenCacheHit,
    InternalCacheError,

    // Success
    TokenValidated,
}

impl EventType {
    /// Stable lowercase-snake name, used for metrics/log field values.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TokenEmpty => "token_empty",
            Self::TokenSizeExceeded => "token_size_exceeded",
            Self::InvalidJwtFormat => "invalid_jwt_format",
            Self::FailedToDecodeJwt => "failed_to_decode_jwt",
            Self::DecodedPartSizeExceeded => "decoded_part_size_exceeded",
            Self::AlgorithmNotAllowed => "algorithm_not_allowed",
            Self::AlgorithmNoneRejected => "algorithm_none_rejected",
            Self::UnsupportedTokenType => "unsupported_token_type",
            Self::KeyNotFound => "key_not_found",
            Self::KeyResolutionFailed => "key_resolution_failed",
            Self::SignatureInvalid => "signature_invalid",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::AuthorizedPartyMismatch => "authorized_party_mismatch",
            Self::AuthorizedPartyMissing => "authorized_party_missing",
            Self::SubjectMissing => "subject_missing",
            Self::TokenExpired => "token_expired",
            Self::TokenNotYetValid => "token_not_yet_valid",
            Self::TokenIssuedInFuture => "token_issued_in_future",
            Self::AccessTokenCacheHit => "access_token_cache_hit",
            Self::InternalCacheError => "internal_cache_error",
            Self::TokenValidated => "token_validated",
        }
    }

    /// All variants, for snapshot iteration and tests.
    const ALL: &'static [EventType] = &[
        Self::TokenEmpty,
        Self::TokenSizeExceeded,
        Self::InvalidJwtFormat,
        Self::FailedToDecodeJwt,
        Self::DecodedPartSizeExceeded,
        Self::AlgorithmNotAllowed,
        Self::AlgorithmNoneRejected,
        Self::UnsupportedTokenType,
        Self::KeyNotFound,
        Self::KeyResolutionFailed,
        Self::SignatureInvalid,
        Self::IssuerMismatch,
        Self::AudienceMismatch,
        Self::AuthorizedPartyMismatch,
        Self::AuthorizedPartyMissing,
        Self::SubjectMissing,
        Self::TokenExpired,
        Self::TokenNotYetValid,
        Self::TokenIssuedInFuture,
        Self::AccessTokenCacheHit,
        Self::InternalCacheError,
        Self::TokenValidated,
    ];
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation failure.
///
/// `kind` is the only field a caller should branch on. `message` is for
/// human diagnostics and is deliberately generic for security-sensitive
/// kinds (claims, signature, key lookup) to avoid leaking which check
/// failed across a trust boundary; richer detail goes to `tracing::debug!`
/// at the call site instead of into this field.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: EventType,
    pub message: String,
    pub cause: Option<Box<ValidationError>>,
}

impl ValidationError {
    #[must_use]
    pub fn new(kind: EventType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: ValidationError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl PartialEq for ValidationError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}
impl Eq for ValidationError {}

/// Process-scoped, thread-safe histogram of [`EventType`] occurrences.
///
/// Pure data sink: every fallible stage of the pipeline increments exactly
/// one counter on failure, success increments `TokenValidated`, and a cache
/// hit additionally increments `AccessTokenCacheHit`. Reads never block
/// writes and vice versa — each kind owns one `AtomicU64`.
#[derive(Debug)]
pub struct SecurityEventCounter {
    counts: [AtomicU64; EventType::ALL.len()],
}

impl Default for SecurityEventCounter {
    fn default() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

fn index_of(kind: EventType) -> usize {
    // EventType::ALL is a fixed compile-time table; every variant appears
    // exactly once, so this always succeeds.
    EventType::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(0)
}

impl SecurityEventCounter {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn increment(&self, kind: EventType) {
        if let Some(counter) = self.counts.get(index_of(kind)) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn get(&self, kind: EventType) -> u64 {
        self.counts
            .get(index_of(kind))
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    /// Point-in-time copy of every counter, for reporting.
    #[must_use]
    pub fn snapshot(&self) -> SecurityEventCounterSnapshot {
        let values = EventType::ALL
            .iter()
            .map(|k| (*k, self.get(*k)))
            .collect::<Vec<_>>();
        SecurityEventCounterSnapshot { values }
    }
}

/// An immutable point-in-time copy of a [`SecurityEventCounter`].
#[derive(Debug, Clone)]
pub struct SecurityEventCounterSnapshot {
    values: Vec<(EventType, u64)>,
}

impl SecurityEventCounterSnapshot {
    #[must_use]
    pub fn get(&self, kind: EventType) -> u64 {
        self.values
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, v)| *v)
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (EventType, u64)> + '_ {
        self.values.iter().copied()
    }
}
