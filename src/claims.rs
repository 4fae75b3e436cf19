//! Decoded-token and validated-token data types.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// The JOSE header fields this crate consumes. Any other header field is
/// simply ignored — it never reaches the claim map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtHeader {
    pub alg: String,
    pub kid: Option<String>,
    pub typ: Option<String>,
}

/// The output of [`crate::parser::NonValidatingParser::decode`].
///
/// `signing_input` is the exact ASCII bytes of `header_b64url "." payload_b64url`
/// taken verbatim from the original compact string — it is never rebuilt by
/// re-serializing `header`/`payload`, so it is byte-identical to what the
/// issuer actually signed even if this crate's JSON decoder would round-trip
/// the object differently (key order, numeric formatting, ...).
#[derive(Debug, Clone)]
pub struct DecodedJwt {
    pub raw: String,
    pub header: JwtHeader,
    pub payload: Map<String, Value>,
    pub signature_bytes: Vec<u8>,
    pub signing_input: Vec<u8>,
}

/// A successfully validated access token.
///
/// Immutable after construction. `expiration` is always present;
/// `expiration > issued_at` whenever both are present (enforced by the
/// pipeline before this type is built, not re-checked here).
#[derive(Debug, Clone)]
pub struct AccessTokenContent {
    raw: String,
    issuer: String,
    subject: String,
    audience: HashSet<String>,
    scopes: HashSet<String>,
    roles: HashSet<String>,
    groups: HashSet<String>,
    expiration: DateTime<Utc>,
    not_before: Option<DateTime<Utc>>,
    issued_at: Option<DateTime<Utc>>,
    claims: Map<String, Value>,
}

#[allow(clippy::too_many_arguments)]
impl AccessTokenContent {
    #[must_use]
    pub fn new(
        raw: String,
        issuer: String,
        subject: String,
        audience: HashSet<String>,
        scopes: HashSet<String>,
        roles: HashSet<String>,
        groups: HashSet<String>,
        expiration: DateTime<Utc>,
        not_before: Option<DateTime<Utc>>,
        issued_at: Option<DateTime<Utc>>,
        claims: Map<String, Value>,
    ) -> Self {
        Self {
            raw,
            issuer,
            subject,
            audience,
            scopes,
            roles,
            groups,
            expiration,
            not_before,
            issued_at,
            claims,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }
    #[must_use]
    pub fn audience(&self) -> &HashSet<String> {
        &self.audience
    }
    #[must_use]
    pub fn scopes(&self) -> &HashSet<String> {
        &self.scopes
    }
    #[must_use]
    pub fn roles(&self) -> &HashSet<String> {
        &self.roles
    }
    #[must_use]
    pub fn groups(&self) -> &HashSet<String> {
        &self.groups
    }
    #[must_use]
    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }
    #[must_use]
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }
    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// The full claim map, including extension claims not otherwise exposed
    /// through a typed accessor.
    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Convenience accessor for an extension claim.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

/// Splits a claim that may be a space-separated string or a JSON array of
/// strings into a set — shared by `scope`/`scp`, `roles`, and `groups`.
#[must_use]
pub fn claim_to_string_set(value: Option<&Value>) -> HashSet<String> {
    match value {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_owned).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_owned)
            .collect(),
        _ => HashSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claim_to_string_set_handles_space_separated_scope() {
        let v = json!("read write admin");
        let set = claim_to_string_set(Some(&v));
        assert_eq!(set.len(), 3);
        assert!(set.contains("read"));
    }

    #[test]
    fn claim_to_string_set_handles_array() {
        let v = json!(["a", "b"]);
        let set = claim_to_string_set(Some(&v));
        assert_eq!(set, HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn claim_to_string_set_handles_absent() {
        assert!(claim_to_string_set(None).is_empty());
    }

    #[test]
    fn access_token_content_exposes_accessors() {
        let content = AccessTokenContent::new(
            "raw.jwt.value".to_string(),
            "https://issuer.example".to_string(),
            "u1".to_string(),
            HashSet::from(["client-a".to_string()]),
            HashSet::new(),
            HashSet::new(),
            HashSet::new(),
            Utc::now(),
            None,
            None,
            Map::new(),
        );

        assert_eq!(content.subject(), "u1");
        assert!(content.audience().contains("client-a"));
        assert_eq!(content.raw(), "raw.jwt.value");
    }
}
