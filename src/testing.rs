//! Test-support fixtures, gated behind the `test-support` feature.
//!
//! Mirrors the fluent `TestTokenBuilder` shape used across the wider
//! codebase's `*-test-utils` crates: a small struct with chained `with_*`
//! methods and a terminal `build()`/`sign()` call, rather than a dozen
//! positional constructor arguments.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

/// Builds and HMAC-signs a compact JWT for use in tests.
///
/// Defaults to `alg: HS256`, a one-hour expiry from the given `now`, and a
/// `kid` of `"test-key"`. Every claim can be overridden; `build()` signs
/// with the supplied HMAC secret and returns the compact serialization.
pub struct TestTokenBuilder {
    header_alg: Algorithm,
    kid: Option<String>,
    typ: Option<String>,
    claims: BTreeMap<String, Value>,
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self {
            header_alg: Algorithm::HS256,
            kid: Some("test-key".to_string()),
            typ: Some("JWT".to_string()),
            claims: BTreeMap::new(),
        }
    }
}

impl TestTokenBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_issuer(mut self, iss: impl Into<String>) -> Self {
        self.claims.insert("iss".to_string(), json!(iss.into()));
        self
    }

    #[must_use]
    pub fn with_subject(mut self, sub: impl Into<String>) -> Self {
        self.claims.insert("sub".to_string(), json!(sub.into()));
        self
    }

    #[must_use]
    pub fn with_audience(mut self, aud: impl Into<String>) -> Self {
        self.claims.insert("aud".to_string(), json!(aud.into()));
        self
    }

    #[must_use]
    pub fn with_authorized_party(mut self, azp: impl Into<String>) -> Self {
        self.claims.insert("azp".to_string(), json!(azp.into()));
        self
    }

    #[must_use]
    pub fn with_expiry_in(mut self, now: i64, seconds_from_now: i64) -> Self {
        self.claims
            .insert("exp".to_string(), json!(now + seconds_from_now));
        self
    }

    #[must_use]
    pub fn with_issued_at(mut self, now: i64) -> Self {
        self.claims.insert("iat".to_string(), json!(now));
        self
    }

    #[must_use]
    pub fn with_not_before(mut self, nbf: i64) -> Self {
        self.claims.insert("nbf".to_string(), json!(nbf));
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.claims.insert("scope".to_string(), json!(scope.into()));
        self
    }

    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: Value) -> Self {
        self.claims.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    #[must_use]
    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    #[must_use]
    pub fn with_algorithm(mut self, alg: Algorithm) -> Self {
        self.header_alg = alg;
        self
    }

    /// Signs the accumulated claims with an HMAC secret and returns the
    /// compact serialization. Panics on `EncodingKey` construction or
    /// serialization failure, which can only happen from a programming
    /// error in the test itself (not a valid use of a test fixture).
    #[must_use]
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    pub fn build(self, secret: &[u8]) -> String {
        let mut header = Header::new(self.header_alg);
        header.kid = self.kid;
        header.typ = self.typ;
        let claims: Value = json!(self.claims);
        jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(secret))
            .expect("test token fixture should always encode")
    }
}

/// Current time as Unix seconds, for building realistic `exp`/`iat` claims
/// without depending on a frozen-clock abstraction.
#[must_use]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock should be after the epoch")
        .as_secs() as i64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_a_three_part_token() {
        let now = now_seconds();
        let token = TestTokenBuilder::new()
            .with_issuer("https://issuer.example")
            .with_subject("u1")
            .with_audience("client-a")
            .with_issued_at(now)
            .with_expiry_in(now, 3600)
            .build(b"secret");

        assert_eq!(token.split('.').count(), 3);
    }
}
