//! The public entry point: `TokenValidator`.
//!
//! Owns the issuer list, cache, pipeline, monitor, and security counter, and
//! wires them together the way the spec's data-flow diagram describes:
//! parse once, select an issuer by `iss`, check the cache, and only run the
//! full pipeline on a miss.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::AccessTokenCache;
use crate::claims::AccessTokenContent;
use crate::config::{AccessTokenCacheConfig, IssuerConfig, MonitorConfig, ParserConfig};
use crate::error::{EventType, SecurityEventCounter, SecurityEventCounterSnapshot, ValidationError};
use crate::monitor::{MeasurementType, Statistics, ValidatorMonitor};
use crate::parser::NonValidatingParser;
use crate::pipeline::ValidationPipeline;

/// Owned configuration for constructing a [`TokenValidator`].
pub struct ValidatorConfig {
    pub issuers: Vec<IssuerConfig>,
    pub parser: ParserConfig,
    pub cache: AccessTokenCacheConfig,
    pub monitor: MonitorConfig,
}

impl ValidatorConfig {
    #[must_use]
    pub fn new(issuers: Vec<IssuerConfig>) -> Self {
        Self {
            issuers,
            parser: ParserConfig::default(),
            cache: AccessTokenCacheConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Core bearer-token validation engine.
///
/// Thread-safe: every field is `Send + Sync` and the type is meant to be
/// wrapped in an `Arc` and shared across tasks/threads. `validate` never
/// suspends indefinitely; the only wait points are bounded CPU work and a
/// `dashmap` shard lock held for the duration of one lookup/insert.
pub struct TokenValidator {
    issuers: Vec<IssuerConfig>,
    parser: NonValidatingParser,
    cache: AccessTokenCache,
    pipeline: ValidationPipeline,
    monitor: ValidatorMonitor,
    counter: Arc<SecurityEventCounter>,
}

impl TokenValidator {
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        let counter = SecurityEventCounter::new();
        let monitor = ValidatorMonitor::from_config(&config.monitor);
        let cache = AccessTokenCache::new(&config.cache, Arc::clone(&counter));
        let pipeline = ValidationPipeline::new(Arc::clone(&counter));
        let parser = NonValidatingParser::new(config.parser);

        Self {
            issuers: config.issuers,
            parser,
            cache,
            pipeline,
            monitor,
            counter,
        }
    }

    /// Validates a compact JWT bearer token end to end: parse, cache lookup,
    /// and on a miss, the full format/header/signature/claims pipeline
    /// followed by a cache store.
    ///
    /// A present-but-expired cache entry is surfaced as `Err(TOKEN_EXPIRED)`
    /// rather than silently falling through to re-validation, matching the
    /// documented cache contract.
    pub fn validate(&self, raw: &str) -> Result<AccessTokenContent, ValidationError> {
        let overall = self.monitor.start(MeasurementType::CompleteValidation);
        let result = self.validate_inner(raw);
        overall.stop_and_record();
        result
    }

    fn validate_inner(&self, raw: &str) -> Result<AccessTokenContent, ValidationError> {
        if let Some(content) = self.cache.get(raw, &self.monitor)? {
            return Ok(content);
        }

        let decoded = self.parser.decode(raw, true, &self.monitor)?;

        let issuer = self.select_issuer(decoded.payload.get("iss").and_then(|v| v.as_str()))?;

        let content = self.pipeline.validate(&decoded, issuer, &self.monitor)?;

        if let Err(err) = self.cache.put(raw, content.clone(), &self.monitor) {
            // A put failure never invalidates an already-successful
            // validation; it only means this particular token won't be
            // served from cache next time.
            warn!(target: "token_guard::validator", kind = %err.kind, "failed to cache validated token");
            self.counter.increment(EventType::InternalCacheError);
        }

        debug!(target: "token_guard::validator", subject = content.subject(), "token validated");
        Ok(content)
    }

    fn select_issuer(&self, iss: Option<&str>) -> Result<&IssuerConfig, ValidationError> {
        let iss = iss.ok_or_else(|| {
            ValidationError::new(EventType::IssuerMismatch, "iss claim missing")
        })?;
        self.issuers
            .iter()
            .find(|issuer| issuer.issuer_identifier == iss)
            .ok_or_else(|| ValidationError::new(EventType::IssuerMismatch, "no issuer configured for this iss"))
    }

    /// Point-in-time snapshot of every [`EventType`] counter.
    #[must_use]
    pub fn security_events(&self) -> SecurityEventCounterSnapshot {
        self.counter.snapshot()
    }

    /// Latency percentiles for one measured pipeline stage.
    #[must_use]
    pub fn monitor_stats(&self, measurement: MeasurementType) -> Statistics {
        self.monitor.statistics(measurement)
    }

    /// Current number of cached tokens.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Stops the cache's background eviction task. Idempotent; safe to call
    /// more than once or on a validator that was never used concurrently.
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}

impl Drop for TokenValidator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::keys::{StaticKeyResolver, VerificationKey};
    use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"validator-test-secret";

    fn sign(claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("k1".to_string());
        jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn validator() -> TokenValidator {
        let resolver = Arc::new(StaticKeyResolver::new().with_key(
            Some("k1"),
            "HS256",
            VerificationKey::Hmac {
                algorithm: Algorithm::HS256,
                key: DecodingKey::from_secret(SECRET),
            },
        ));
        let issuer = IssuerConfig::new("https://issuer.example", resolver)
            .with_algorithms(["HS256".to_string()])
            .with_audience(["client-a".to_string()]);
        TokenValidator::new(ValidatorConfig::new(vec![issuer]))
    }

    #[tokio::test]
    async fn happy_path_validates_and_caches() {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "iss": "https://issuer.example",
            "sub": "u1",
            "aud": "client-a",
            "exp": now + 3600,
            "iat": now,
        });
        let token = sign(&claims);
        let validator = validator();

        let content = validator.validate(&token).unwrap();
        assert_eq!(content.subject(), "u1");
        assert_eq!(validator.cached_entries(), 1);

        // second call should hit the cache
        let content2 = validator.validate(&token).unwrap();
        assert_eq!(content2.subject(), "u1");
        let snap = validator.security_events();
        assert_eq!(snap.get(EventType::AccessTokenCacheHit), 1);
        validator.shutdown();
    }

    #[tokio::test]
    async fn unknown_issuer_is_rejected() {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "iss": "https://other.example",
            "sub": "u1",
            "aud": "client-a",
            "exp": now + 3600,
        });
        let token = sign(&claims);
        let validator = validator();

        let err = validator.validate(&token).unwrap_err();
        assert_eq!(err.kind, EventType::IssuerMismatch);
        validator.shutdown();
    }

    #[tokio::test]
    async fn concurrent_misses_on_the_same_token_converge_on_one_cached_entry() {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "iss": "https://issuer.example",
            "sub": "u1",
            "aud": "client-a",
            "exp": now + 3600,
        });
        let token = Arc::new(sign(&claims));
        let validator = Arc::new(validator());

        let mut handles = Vec::new();
        for _ in 0..100 {
            let validator = Arc::clone(&validator);
            let token = Arc::clone(&token);
            handles.push(tokio::spawn(async move { validator.validate(&token) }));
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.is_ok());
        }
        assert_eq!(validator.cached_entries(), 1);
        validator.shutdown();
    }
}
