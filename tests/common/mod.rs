#![allow(dead_code)]

use std::sync::OnceLock;

use chrono::DateTime;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use webpgp::{generate_key_pair_with, KeyGenParamsBuilder, KeyPair};

pub const PASSPHRASE: &str = "correct horse";

fn generate(user_id: &str, seed: u64) -> KeyPair {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let params = KeyGenParamsBuilder::default()
        .user_id(user_id.into())
        .passphrase(PASSPHRASE.into())
        .bits(2048)
        .s2k_count(0x10)
        .created_at(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
        .build()
        .unwrap();

    generate_key_pair_with(&mut rng, &params).unwrap()
}

pub fn alice() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| generate("alice@example.com", 10))
}

pub fn bob() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| generate("bob@example.com", 11))
}

pub fn carol() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| generate("carol@example.com", 12))
}
