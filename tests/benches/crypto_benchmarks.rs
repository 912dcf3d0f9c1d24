//! # Wallet Bridge Crypto Benchmarks
//!
//! Every relay frame and every popup RPC passes through one of these:
//!
//! | Path | Operation |
//! |------|-----------|
//! | Relay signer | AES-256-GCM hex frame encrypt/decrypt |
//! | SCW signer | P-256 ECDH key agreement |
//! | SCW signer | JSON content envelope seal/open |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use shared_crypto::{
    decrypt_content, derive_shared_secret, encrypt_content, random_bytes_hex, EcKeyPair,
    RelayCipher, SecretKey,
};
use std::time::Duration;

// ============================================================================
// Relay frames
// ============================================================================

fn bench_relay_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay-cipher");
    group.measurement_time(Duration::from_secs(5));

    let cipher = RelayCipher::from_hex_secret(&random_bytes_hex(32)).unwrap();
    for size in [64usize, 1024, 16 * 1024] {
        let plaintext = "a".repeat(size);
        let sealed = cipher.encrypt(&plaintext).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encrypt", size), &plaintext, |b, text| {
            b.iter(|| black_box(cipher.encrypt(text).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decrypt", size), &sealed, |b, sealed| {
            b.iter(|| black_box(cipher.decrypt(sealed).unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// SCW key agreement and envelopes
// ============================================================================

fn bench_key_agreement(c: &mut Criterion) {
    let mut group = c.benchmark_group("scw-key-agreement");

    let own = EcKeyPair::generate();
    let peer = EcKeyPair::generate().public_key();
    group.bench_function("derive_shared_secret", |b| {
        b.iter(|| black_box(derive_shared_secret(&own, &peer)))
    });
    group.bench_function("spki_hex_round_trip", |b| {
        b.iter(|| {
            let hex = peer.to_spki_hex().unwrap();
            black_box(shared_crypto::EcPublicKey::from_spki_hex(&hex).unwrap())
        })
    });

    group.finish();
}

fn bench_content_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("scw-envelope");

    let key = SecretKey::generate();
    let request = json!({
        "action": {"method": "personal_sign", "params": ["0x68656c6c6f", "0x00000000000000000000000000000000000000aa"]},
        "chainId": 8453
    });
    let envelope = encrypt_content(&request, &key).unwrap();

    group.bench_function("encrypt_content", |b| {
        b.iter(|| black_box(encrypt_content(&request, &key).unwrap()))
    });
    group.bench_function("decrypt_content", |b| {
        b.iter(|| black_box(decrypt_content::<serde_json::Value>(&envelope, &key).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_relay_cipher,
    bench_key_agreement,
    bench_content_envelope
);
criterion_main!(benches);
