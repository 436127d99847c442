use std::io;
use std::sync::OnceLock;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use webpgp::{decrypt, encrypt_with, generate_key_pair_with, EncryptOptions, KeyGenParamsBuilder, KeyPair};

const PASSPHRASE: &str = "bench";

fn key() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| {
        let params = KeyGenParamsBuilder::default()
            .user_id("bench@example.com".into())
            .passphrase(PASSPHRASE.into())
            .bits(2048)
            .build()
            .unwrap();
        generate_key_pair_with(&mut ChaCha8Rng::seed_from_u64(0), &params).unwrap()
    })
}

fn bench_message(c: &mut Criterion) {
    let mut g = c.benchmark_group("message");
    let key = key();

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut plaintext = vec![0u8; 1024 * 1024];
    rng.fill_bytes(&mut plaintext);

    let options = EncryptOptions::default();
    let mut message = Vec::new();
    encrypt_with(
        &plaintext[..],
        &key.public_key_text,
        &key.secret_key_text,
        PASSPHRASE,
        &mut message,
        &options,
        &mut rng,
    )
    .unwrap();

    g.throughput(Throughput::Bytes(plaintext.len() as u64));
    g.bench_function("encrypt_sign_1mib", |b| {
        b.iter(|| {
            encrypt_with(
                &plaintext[..],
                &key.public_key_text,
                &key.secret_key_text,
                PASSPHRASE,
                io::sink(),
                &options,
                &mut rng,
            )
            .unwrap()
        });
    });

    g.bench_function("decrypt_verify_1mib", |b| {
        b.iter(|| {
            black_box(decrypt(&message[..], &key.secret_key_text, PASSPHRASE, io::sink()).unwrap())
        });
    });

    g.finish();
}

criterion_group!(benches, bench_message);
criterion_main!(benches);
