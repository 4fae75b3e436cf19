//! Header -> key resolution -> signature -> claims validation.
//!
//! Stages run in a fixed order and the first failure aborts the whole
//! pipeline; no information about later stages is disclosed. Signature
//! verification uses `jsonwebtoken::crypto::verify`, the crate's low-level
//! raw-bytes verify entry point, so the pipeline checks the exact
//! `signing_input`/`signature_bytes` pair produced by the parser instead of
//! re-deriving or re-serializing anything that was signed.

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use jsonwebtoken::Algorithm;
use serde_json::Value;
use tracing::instrument;

use crate::claims::{claim_to_string_set, AccessTokenContent, DecodedJwt};
use crate::config::IssuerConfig;
use crate::error::{EventType, SecurityEventCounter, ValidationError};
use crate::monitor::{MeasurementType, ValidatorMonitor};

fn fail(kind: EventType, message: &str) -> ValidationError {
    ValidationError::new(kind, message)
}

/// Runs the header/key/signature/claims stages against a matching
/// [`IssuerConfig`] and assembles an [`AccessTokenContent`] on success.
pub struct ValidationPipeline {
    counter: std::sync::Arc<SecurityEventCounter>,
}

impl ValidationPipeline {
    #[must_use]
    pub fn new(counter: std::sync::Arc<SecurityEventCounter>) -> Self {
        Self { counter }
    }

    #[instrument(skip(self, decoded, issuer, monitor), fields(issuer = %issuer.issuer_identifier))]
    pub fn validate(
        &self,
        decoded: &DecodedJwt,
        issuer: &IssuerConfig,
        monitor: &ValidatorMonitor,
    ) -> Result<AccessTokenContent, ValidationError> {
        let result = self.validate_inner(decoded, issuer, monitor);
        match &result {
            Ok(_) => self.counter.increment(EventType::TokenValidated),
            Err(err) => self.counter.increment(err.kind),
        }
        result
    }

    fn validate_inner(
        &self,
        decoded: &DecodedJwt,
        issuer: &IssuerConfig,
        monitor: &ValidatorMonitor,
    ) -> Result<AccessTokenContent, ValidationError> {
        let header_ticker = monitor.start(MeasurementType::HeaderValidation);
        self.validate_header(decoded, issuer)?;
        header_ticker.stop_and_record();

        let key_ticker = monitor.start(MeasurementType::KeyResolution);
        let key = issuer
            .key_resolver
            .resolve(decoded.header.kid.as_deref(), &decoded.header.alg)
            .map_err(|err| match err {
                crate::keys::ResolutionError::KeyNotFound => {
                    fail(EventType::KeyNotFound, "no verification key for token")
                }
                crate::keys::ResolutionError::ResolutionFailed(_) => {
                    fail(EventType::KeyResolutionFailed, "key resolution failed")
                }
            })?;
        key_ticker.stop_and_record();

        let sig_ticker = monitor.start(MeasurementType::SignatureValidation);
        self.verify_signature(decoded, key.algorithm(), key.decoding_key())?;
        sig_ticker.stop_and_record();

        let claims_ticker = monitor.start(MeasurementType::ClaimsValidation);
        let content = self.validate_claims(decoded, issuer)?;
        claims_ticker.stop_and_record();

        Ok(content)
    }

    fn validate_header(&self, decoded: &DecodedJwt, issuer: &IssuerConfig) -> Result<(), ValidationError> {
        let alg = decoded.header.alg.as_str();

        // Unconditional: a whitelist that happens to contain "none" must
        // never resurrect it.
        if alg.eq_ignore_ascii_case("none") {
            return Err(fail(EventType::AlgorithmNoneRejected, "alg \"none\" is never accepted"));
        }

        if !issuer.supported_algorithms.contains(alg) {
            return Err(fail(EventType::AlgorithmNotAllowed, "alg is not in the issuer's whitelist"));
        }

        if let Some(typ) = &decoded.header.typ {
            if !(typ.eq_ignore_ascii_case("JWT") || typ.eq_ignore_ascii_case("at+jwt")) {
                return Err(fail(EventType::UnsupportedTokenType, "unsupported typ header"));
            }
        }

        Ok(())
    }

    fn verify_signature(
        &self,
        decoded: &DecodedJwt,
        algorithm: Algorithm,
        key: &jsonwebtoken::DecodingKey,
    ) -> Result<(), ValidationError> {
        if decoded.signature_bytes.is_empty() {
            return Err(fail(EventType::SignatureInvalid, "signature is empty"));
        }

        let signature_b64 = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            &decoded.signature_bytes,
        );

        let valid = jsonwebtoken::crypto::verify(&signature_b64, &decoded.signing_input, key, algorithm)
            .map_err(|_| fail(EventType::SignatureInvalid, "signature verification failed"))?;

        if valid {
            Ok(())
        } else {
            Err(fail(EventType::SignatureInvalid, "signature does not match"))
        }
    }

    fn validate_claims(
        &self,
        decoded: &DecodedJwt,
        issuer: &IssuerConfig,
    ) -> Result<AccessTokenContent, ValidationError> {
        let payload = &decoded.payload;
        let now = Utc::now().timestamp();
        let skew = i64::try_from(issuer.clock_skew.as_secs()).unwrap_or(i64::MAX);

        let iss = payload
            .get("iss")
            .and_then(Value::as_str)
            .ok_or_else(|| fail(EventType::IssuerMismatch, "iss claim missing"))?;
        if iss != issuer.issuer_identifier {
            return Err(fail(EventType::IssuerMismatch, "iss does not match issuer configuration"));
        }

        let exp = numeric_date(payload, "exp")
            .ok_or_else(|| fail(EventType::TokenExpired, "exp claim missing"))?;
        if now >= exp + skew {
            return Err(fail(EventType::TokenExpired, "token has expired"));
        }

        if let Some(nbf) = numeric_date(payload, "nbf") {
            if now + skew < nbf {
                return Err(fail(EventType::TokenNotYetValid, "token not yet valid"));
            }
        }

        if let Some(iat) = numeric_date(payload, "iat") {
            if iat > now + skew {
                return Err(fail(EventType::TokenIssuedInFuture, "iat is too far in the future"));
            }
        }

        if !issuer.expected_audience.is_empty() {
            let aud = audience_set(payload.get("aud"));
            if aud.is_disjoint(&issuer.expected_audience) {
                return Err(fail(EventType::AudienceMismatch, "aud does not intersect expected audience"));
            }
        }

        let azp = payload.get("azp").and_then(Value::as_str);
        if let Some(expected_client_id) = &issuer.expected_client_id {
            match azp {
                Some(azp) if azp == expected_client_id => {}
                Some(_) => {
                    return Err(fail(EventType::AuthorizedPartyMismatch, "azp does not match expected client id"))
                }
                None => {
                    return Err(fail(EventType::AuthorizedPartyMissing, "azp missing but required"))
                }
            }
        }

        let sub = payload
            .get("sub")
            .and_then(Value::as_str)
            .ok_or_else(|| fail(EventType::SubjectMissing, "sub claim missing"))?
            .to_string();

        let audience = audience_set(payload.get("aud"));
        let scopes = claim_to_string_set(payload.get("scope").or_else(|| payload.get("scp")));
        let roles = claim_to_string_set(payload.get("roles"));
        let groups = claim_to_string_set(payload.get("groups"));

        let expiration = Utc
            .timestamp_opt(exp, 0)
            .single()
            .ok_or_else(|| fail(EventType::TokenExpired, "exp out of range"))?;
        let not_before = numeric_date(payload, "nbf").and_then(|v| Utc.timestamp_opt(v, 0).single());
        let issued_at = numeric_date(payload, "iat").and_then(|v| Utc.timestamp_opt(v, 0).single());

        Ok(AccessTokenContent::new(
            decoded.raw.clone(),
            iss.to_string(),
            sub,
            audience,
            scopes,
            roles,
            groups,
            expiration,
            not_before,
            issued_at,
            payload.clone(),
        ))
    }
}

/// Reads a NumericDate claim (RFC 7519 §2): integer or fractional seconds
/// since the epoch, with fractional seconds truncated.
fn numeric_date(payload: &serde_json::Map<String, Value>, key: &str) -> Option<i64> {
    match payload.get(key)? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64().map(|f| f.trunc() as i64)
            }
        }
        _ => None,
    }
}

/// `aud` may be a single string or an array of strings.
fn audience_set(value: Option<&Value>) -> HashSet<String> {
    claim_to_string_set_from_aud(value)
}

fn claim_to_string_set_from_aud(value: Option<&Value>) -> HashSet<String> {
    match value {
        Some(Value::String(s)) => HashSet::from([s.clone()]),
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str()).map(str::to_owned).collect(),
        _ => HashSet::new(),
    }
}
