//! Core bearer-token (JWT/OAuth2) validation engine.
//!
//! This crate implements the format/header/signature/claims validation
//! pipeline, an optimistic lock-free access-token cache, a key-resolution
//! trait boundary, and a striped performance monitor. It does not perform
//! HTTP transport, JWKS fetching, or framework integration — those are the
//! embedding application's concern; this crate only needs a [`keys::KeyResolver`]
//! implementation to talk to whatever key source the caller has.
//!
//! The entry point is [`validator::TokenValidator`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use token_guard::config::IssuerConfig;
//! use token_guard::keys::{KeyResolver, StaticKeyResolver, VerificationKey};
//! use token_guard::validator::{TokenValidator, ValidatorConfig};
//!
//! # fn resolver() -> Arc<dyn KeyResolver> { Arc::new(StaticKeyResolver::new()) }
//! let issuer = IssuerConfig::new("https://issuer.example", resolver())
//!     .with_algorithms(["RS256".to_string()]);
//! let validator = TokenValidator::new(ValidatorConfig::new(vec![issuer]));
//! let result = validator.validate("eyJhbGciOi...");
//! ```

pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod keys;
pub mod monitor;
pub mod parser;
pub mod pipeline;
pub mod validator;

#[cfg(feature = "test-support")]
pub mod testing;

pub use claims::AccessTokenContent;
pub use config::{AccessTokenCacheConfig, IssuerConfig, MonitorConfig, ParserConfig};
pub use error::{EventType, SecurityEventCounter, SecurityEventCounterSnapshot, ValidationError};
pub use keys::{KeyResolver, ResolutionError, StaticKeyResolver, VerificationKey};
pub use monitor::{MeasurementType, Statistics, ValidatorMonitor};
pub use validator::{TokenValidator, ValidatorConfig};
