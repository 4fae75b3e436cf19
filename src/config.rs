//! Explicit, immutable configuration value types.
//!
//! No builder macros, no overloaded constructors, no global config cell —
//! plain structs with `Default` impls encoding the documented defaults,
//! the same shape as `DatabaseConfig`/`ObservabilityConfig` in the shared
//! configuration conventions this crate follows.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::keys::KeyResolver;

/// Hardening limits applied by [`crate::parser::NonValidatingParser`].
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Hard cap on the raw UTF-8 byte length of the compact token.
    pub max_token_size: usize,
    /// Cap on each base64url-decoded header/payload part.
    pub max_payload_size: usize,
    /// Maximum JSON nesting depth.
    pub max_depth: usize,
    /// Maximum length of any single JSON string value.
    pub max_string_size: usize,
    /// Maximum length of any JSON array value.
    pub max_array_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_token_size: 8 * 1024,
            max_payload_size: 2 * 1024,
            max_depth: 10,
            max_string_size: 4 * 1024,
            max_array_size: 64,
        }
    }
}

/// Access-token cache tuning.
#[derive(Debug, Clone)]
pub struct AccessTokenCacheConfig {
    /// Maximum number of cached entries. `0` disables the cache entirely:
    /// `get` always reports a miss and `put` is a no-op.
    pub max_size: usize,
    /// How often the background sweep scans for expired entries.
    pub eviction_interval: Duration,
}

impl Default for AccessTokenCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            eviction_interval: Duration::from_secs(10),
        }
    }
}

impl AccessTokenCacheConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_size: 0,
            ..Self::default()
        }
    }
}

/// Which [`crate::monitor::MeasurementType`]s are sampled, and how large
/// the ring buffer backing each one is.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Total samples retained per measurement type, spread across stripes.
    pub window_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: 10_000,
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// One trust root: an issuer the validator is configured to accept tokens
/// from, plus the audience/client/algorithm constraints to enforce and the
/// [`KeyResolver`] that supplies verification key material for it.
#[derive(Clone)]
pub struct IssuerConfig {
    /// Matched against the `iss` claim by exact string equality.
    pub issuer_identifier: String,
    /// At least one of these must appear in the token's `aud` claim. An
    /// empty set skips audience validation entirely.
    pub expected_audience: HashSet<String>,
    /// If set, must match the `azp` claim when present.
    pub expected_client_id: Option<String>,
    /// Supplies verification keys by `kid`/`alg`.
    pub key_resolver: Arc<dyn KeyResolver>,
    /// Whitelist of JOSE `alg` values accepted for this issuer. An empty
    /// set rejects every token ("reject all").
    pub supported_algorithms: HashSet<String>,
    /// Clock skew tolerance applied to `exp`/`nbf`/`iat` checks.
    pub clock_skew: Duration,
}

impl IssuerConfig {
    #[must_use]
    pub fn new(issuer_identifier: impl Into<String>, key_resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            issuer_identifier: issuer_identifier.into(),
            expected_audience: HashSet::new(),
            expected_client_id: None,
            key_resolver,
            supported_algorithms: HashSet::new(),
            clock_skew: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl IntoIterator<Item = String>) -> Self {
        self.expected_audience = audience.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.expected_client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = String>) -> Self {
        self.supported_algorithms = algorithms.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }
}

impl std::fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("issuer_identifier", &self.issuer_identifier)
            .field("expected_audience", &self.expected_audience)
            .field("expected_client_id", &self.expected_client_id)
            .field("supported_algorithms", &self.supported_algorithms)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_config_defaults_match_spec() {
        let cfg = ParserConfig::default();
        assert_eq!(cfg.max_token_size, 8192);
        assert_eq!(cfg.max_payload_size, 2048);
        assert_eq!(cfg.max_depth, 10);
        assert_eq!(cfg.max_string_size, 4096);
        assert_eq!(cfg.max_array_size, 64);
    }

    #[test]
    fn cache_config_disabled_has_zero_capacity() {
        assert_eq!(AccessTokenCacheConfig::disabled().max_size, 0);
    }

    #[test]
    fn monitor_config_disabled_flag() {
        assert!(!MonitorConfig::disabled().enabled);
    }
}
