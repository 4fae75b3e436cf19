//! Throughput benchmark for the validation pipeline, covering both the
//! cache-miss (full cryptographic path) and cache-hit cases.

#![allow(clippy::expect_used)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jsonwebtoken::{Algorithm, DecodingKey};
use token_guard::config::IssuerConfig;
use token_guard::keys::{StaticKeyResolver, VerificationKey};
use token_guard::testing::{now_seconds, TestTokenBuilder};
use token_guard::validator::{TokenValidator, ValidatorConfig};

const SECRET: &[u8] = b"benchmark-secret";

fn build_validator() -> TokenValidator {
    let resolver = Arc::new(StaticKeyResolver::new().with_key(
        Some("test-key"),
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

fn bench_cache_miss(c: &mut Criterion) {
    let now = now_seconds();
    c.bench_function("validate_cache_miss", |b| {
        b.iter(|| {
            let validator = build_validator();
            let token = TestTokenBuilder::new()
                .with_issuer("https://issuer.example")
                .with_subject("u1")
                .with_audience("client-a")
                .with_issued_at(now)
                .with_expiry_in(now, 3600)
                .build(SECRET);
            black_box(validator.validate(&token).expect("bench token should validate"));
            validator.shutdown();
        });
    });
}

fn bench_cache_hit(c: &mut Criterion) {
    let now = now_seconds();
    let validator = build_validator();
    let token = TestTokenBuilder::new()
        .with_issuer("https://issuer.example")
        .with_subject("u1")
        .with_audience("client-a")
        .with_issued_at(now)
        .with_expiry_in(now, 3600)
        .build(SECRET);
    validator.validate(&token).expect("warm the cache");

    c.bench_function("validate_cache_hit", |b| {
        b.iter(|| black_box(validator.validate(&token).expect("cached token should validate")));
    });
    validator.shutdown();
}

criterion_group!(benches, bench_cache_miss, bench_cache_hit);
criterion_main!(benches);
