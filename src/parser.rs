//! Format-level JWT parsing: splits the compact serialization, decodes the
//! two JSON parts under hostile-input limits, and builds a [`DecodedJwt`].
//!
//! This stage never touches key material — it is pure syntax. Limits are
//! enforced while walking the decoded JSON tree, not by trusting
//! `serde_json`'s parse-then-bind result, because the spec requires
//! rejecting duplicate object keys and oversized strings/arrays as part of
//! parsing itself, not as an afterthought over an already-trusting decode.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::claims::{DecodedJwt, JwtHeader};
use crate::config::ParserConfig;
use crate::error::{EventType, ValidationError};
use crate::monitor::{MeasurementType, ValidatorMonitor};

fn fail(kind: EventType, message: &str) -> ValidationError {
    ValidationError::new(kind, message)
}

/// Splits the compact serialization, decodes header/payload JSON under
/// [`ParserConfig`] limits, and returns a [`DecodedJwt`]. Never validates a
/// signature or any claim value.
pub struct NonValidatingParser {
    config: ParserConfig,
}

impl NonValidatingParser {
    #[must_use]
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Decode `raw` into a [`DecodedJwt`], or the first format failure.
    ///
    /// `log_warn` controls whether rejected tokens are logged at `warn`
    /// (useful for interactive debugging) instead of the default `debug`
    /// level used on hot paths serving real traffic.
    #[instrument(skip(self, raw, monitor), fields(token_len = raw.len()))]
    pub fn decode(
        &self,
        raw: &str,
        log_warn: bool,
        monitor: &ValidatorMonitor,
    ) -> Result<DecodedJwt, ValidationError> {
        let ticker = monitor.start(MeasurementType::TokenParsing);
        let result = self.decode_inner(raw, log_warn);
        ticker.stop_and_record();
        result
    }

    fn decode_inner(&self, raw: &str, log_warn: bool) -> Result<DecodedJwt, ValidationError> {
        if raw.is_empty() {
            return Err(self.reject(log_warn, EventType::TokenEmpty, "token is empty"));
        }
        if raw.len() > self.config.max_token_size {
            return Err(self.reject(
                log_warn,
                EventType::TokenSizeExceeded,
                "token exceeds maximum size",
            ));
        }

        let parts: Vec<&str> = raw.split('.').collect();
        let [header_part, payload_part, signature_part] = parts.as_slice() else {
            return Err(self.reject(
                log_warn,
                EventType::InvalidJwtFormat,
                "token does not have exactly three parts",
            ));
        };
        let (header_part, payload_part, signature_part) = (*header_part, *payload_part, *signature_part);

        let header_bytes = self.decode_b64(header_part, log_warn)?;
        let payload_bytes = self.decode_b64(payload_part, log_warn)?;
        let signature_bytes = self.decode_b64(signature_part, log_warn)?;

        if header_bytes.len() > self.config.max_payload_size
            || payload_bytes.len() > self.config.max_payload_size
        {
            return Err(self.reject(
                log_warn,
                EventType::DecodedPartSizeExceeded,
                "decoded header or payload exceeds maximum size",
            ));
        }

        let header_value = self.parse_limited(&header_bytes, log_warn)?;
        let payload_value = self.parse_limited(&payload_bytes, log_warn)?;

        let header = self.header_from_value(header_value, log_warn)?;

        let Value::Object(payload) = payload_value else {
            return Err(self.reject(
                log_warn,
                EventType::FailedToDecodeJwt,
                "payload is not a JSON object",
            ));
        };

        let mut signing_input = Vec::with_capacity(header_part.len() + 1 + payload_part.len());
        signing_input.extend_from_slice(header_part.as_bytes());
        signing_input.push(b'.');
        signing_input.extend_from_slice(payload_part.as_bytes());

        Ok(DecodedJwt {
            raw: raw.to_string(),
            header,
            payload,
            signature_bytes,
            signing_input,
        })
    }

    fn decode_b64(&self, part: &str, log_warn: bool) -> Result<Vec<u8>, ValidationError> {
        URL_SAFE_NO_PAD
            .decode(part)
            .map_err(|_| self.reject(log_warn, EventType::FailedToDecodeJwt, "invalid base64url"))
    }

    /// Parses `bytes` as JSON, enforcing depth/string/array limits and
    /// rejecting duplicate object keys, by walking the raw text ourselves
    /// before trusting `serde_json`'s tree.
    fn parse_limited(&self, bytes: &[u8], log_warn: bool) -> Result<Value, ValidationError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| self.reject(log_warn, EventType::FailedToDecodeJwt, "invalid utf-8"))?;

        reject_duplicate_keys(text)
            .map_err(|_| self.reject(log_warn, EventType::FailedToDecodeJwt, "duplicate JSON key"))?;

        let value: Value = serde_json::from_str(text)
            .map_err(|_| self.reject(log_warn, EventType::FailedToDecodeJwt, "invalid JSON"))?;

        check_limits(&value, 0, &self.config)
            .map_err(|_| self.reject(log_warn, EventType::FailedToDecodeJwt, "JSON exceeds limits"))?;

        Ok(value)
    }

    fn header_from_value(&self, value: Value, log_warn: bool) -> Result<JwtHeader, ValidationError> {
        let Value::Object(map) = value else {
            return Err(self.reject(
                log_warn,
                EventType::FailedToDecodeJwt,
                "header is not a JSON object",
            ));
        };

        let alg = map
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| self.reject(log_warn, EventType::FailedToDecodeJwt, "header missing alg"))?
            .to_string();

        let kid = map.get("kid").and_then(Value::as_str).map(str::to_owned);
        let typ = map.get("typ").and_then(Value::as_str).map(str::to_owned);

        Ok(JwtHeader { alg, kid, typ })
    }

    fn reject(&self, log_warn: bool, kind: EventType, message: &str) -> ValidationError {
        if log_warn {
            tracing::warn!(target: "token_guard::parser", kind = %kind, "token rejected: {message}");
        } else {
            tracing::debug!(target: "token_guard::parser", kind = %kind, "token rejected: {message}");
        }
        fail(kind, message)
    }
}

/// Recursively enforces depth/string/array limits over an already-parsed
/// JSON tree.
fn check_limits(value: &Value, depth: usize, config: &ParserConfig) -> Result<(), ()> {
    if depth > config.max_depth {
        return Err(());
    }
    match value {
        Value::String(s) if s.len() > config.max_string_size => Err(()),
        Value::Array(items) => {
            if items.len() > config.max_array_size {
                return Err(());
            }
            for item in items {
                check_limits(item, depth + 1, config)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for value in map.values() {
                check_limits(value, depth + 1, config)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// A minimal scanner over raw JSON text that rejects an object containing
/// the same key twice at the same nesting level. `serde_json::Value`
/// silently keeps the last of duplicate keys; the spec requires a hard
/// rejection, so we check before handing the text to `serde_json`.
fn reject_duplicate_keys(text: &str) -> Result<(), ()> {
    let mut stack: Vec<std::collections::HashSet<String>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut expecting_key = false;

    while let Some((_, c)) = chars.next() {
        match c {
            '{' => {
                stack.push(std::collections::HashSet::new());
                expecting_key = true;
            }
            '}' => {
                stack.pop();
            }
            '"' if expecting_key => {
                let key = read_string(text, &mut chars)?;
                if let Some(seen) = stack.last_mut() {
                    if !seen.insert(key) {
                        return Err(());
                    }
                }
                expecting_key = false;
            }
            '"' => {
                // A string value or array element; consume and discard.
                read_string(text, &mut chars)?;
            }
            ',' => {
                if stack.last().is_some() {
                    expecting_key = true;
                }
            }
            ':' => {
                expecting_key = false;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Consumes a JSON string body (the caller has already consumed the
/// opening quote) and returns its unescaped content is not required here —
/// only the raw key text matters for duplicate detection, so escapes are
/// left as-is.
fn read_string(
    text: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices>,
) -> Result<String, ()> {
    let mut out = String::new();
    let mut escaped = false;
    for (_, c) in chars.by_ref() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => return Ok(out),
            _ => out.push(c),
        }
    }
    let _ = text;
    Err(())
}
