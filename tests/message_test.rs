mod common;

use std::io;

use pretty_assertions::assert_eq;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use webpgp::crypto::sym::SymmetricKeyAlgorithm;
use webpgp::types::CompressionAlgorithm;
use webpgp::{
    decrypt, decrypt_with, encrypt, encrypt_with, DecryptOptions, EncryptOptions, Error,
    Verification,
};

use common::{alice, bob, carol, PASSPHRASE};

fn encrypt_to(plaintext: &[u8], recipient: &str, options: &EncryptOptions) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut message = Vec::new();
    encrypt_with(
        plaintext,
        recipient,
        &alice().secret_key_text,
        PASSPHRASE,
        &mut message,
        options,
        &mut rng,
    )
    .unwrap();
    message
}

#[test]
fn scenario_a_hello() {
    let _ = pretty_env_logger::try_init();
    let alice = alice();

    let mut message = Vec::new();
    encrypt(
        &b"hello"[..],
        &alice.public_key_text,
        &alice.secret_key_text,
        PASSPHRASE,
        &mut message,
    )
    .unwrap();

    let mut plaintext = Vec::new();
    let result = decrypt(&message[..], &alice.secret_key_text, PASSPHRASE, &mut plaintext).unwrap();
    assert_eq!(plaintext, b"hello");
    assert_eq!(result.verification, Verification::Verified);
    assert_eq!(result.signer, Some(alice.public_key.primary_key.key_id()));
    assert_eq!(result.signer_user_id.as_deref(), Some("alice@example.com"));
}

#[test]
fn scenario_b_large_message() {
    let _ = pretty_env_logger::try_init();
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut plaintext = vec![0u8; 2 * 1024 * 1024];
    rng.fill_bytes(&mut plaintext);

    let options = EncryptOptions::default().chunk_size(8192);
    let message = encrypt_to(&plaintext, &alice().public_key_text, &options);

    let mut out = Vec::new();
    let result = decrypt(&message[..], &alice().secret_key_text, PASSPHRASE, &mut out).unwrap();
    assert!(out == plaintext, "plaintext differs");
    assert!(result.is_verified());
}

#[test]
fn roundtrip_options() {
    let plaintext = b"the quick brown fox ".repeat(100);
    let cases = [
        EncryptOptions::default(),
        EncryptOptions::default().compression(CompressionAlgorithm::Uncompressed),
        EncryptOptions::default()
            .compression(CompressionAlgorithm::ZLIB)
            .sym_alg(SymmetricKeyAlgorithm::AES128),
        EncryptOptions::default().sym_alg(SymmetricKeyAlgorithm::CAST5),
        EncryptOptions::default().sym_alg(SymmetricKeyAlgorithm::TripleDES),
        EncryptOptions::default().chunk_size(512).armor(true),
    ];

    for options in cases {
        let message = encrypt_to(&plaintext, &alice().public_key_text, &options);
        if options.is_armored() {
            assert!(message.starts_with(b"-----BEGIN PGP MESSAGE-----"));
        }

        let mut out = Vec::new();
        let result =
            decrypt(&message[..], &alice().secret_key_text, PASSPHRASE, &mut out).unwrap();
        assert_eq!(out, plaintext, "{options:?}");
        assert!(result.is_verified(), "{options:?}");
    }
}

#[test]
fn empty_plaintext() {
    let message = encrypt_to(b"", &bob().public_key_text, &EncryptOptions::default());

    let options = DecryptOptions::default().verification_keys(vec![alice().public_key.clone()]);
    let mut out = Vec::new();
    let result = decrypt_with(
        &message[..],
        &bob().secret_key_text,
        PASSPHRASE,
        &mut out,
        &options,
    )
    .unwrap();
    assert!(out.is_empty());
    assert!(result.is_verified());
}

#[test]
fn signer_unknown_to_recipient() {
    let message = encrypt_to(b"hi bob", &bob().public_key_text, &EncryptOptions::default());

    let mut out = Vec::new();
    let result = decrypt(&message[..], &bob().secret_key_text, PASSPHRASE, &mut out).unwrap();
    assert_eq!(out, b"hi bob");
    assert_eq!(result.verification, Verification::Unknown);

    let options = DecryptOptions::default().require_valid_signature(true);
    let err = decrypt_with(
        &message[..],
        &bob().secret_key_text,
        PASSPHRASE,
        io::sink(),
        &options,
    )
    .unwrap_err();
    assert!(matches!(err, Error::CryptoOperation { .. }), "{err:?}");
}

#[test]
fn unknown_key() {
    let message = encrypt_to(b"for bob", &bob().public_key_text, &EncryptOptions::default());

    let mut out = Vec::new();
    let err = decrypt(&message[..], &carol().secret_key_text, PASSPHRASE, &mut out).unwrap_err();
    assert!(matches!(err, Error::SecretKeyNotFound), "{err:?}");
    assert!(out.is_empty());
}

#[test]
fn wrong_passphrase() {
    let message = encrypt_to(b"for bob", &bob().public_key_text, &EncryptOptions::default());
    let err = decrypt(&message[..], &bob().secret_key_text, "wrong", io::sink()).unwrap_err();
    assert!(matches!(err, Error::SecretKeyNotFound), "{err:?}");

    // the signer's passphrase is checked before anything is written
    let mut out = Vec::new();
    let err = encrypt(
        &b"x"[..],
        &bob().public_key_text,
        &alice().secret_key_text,
        "wrong",
        &mut out,
    )
    .unwrap_err();
    assert!(matches!(err, Error::PassphraseMismatch { .. }), "{err:?}");
    assert!(out.is_empty());
}

#[test]
fn ring_order_selects_first_key() {
    // bob first, alice second: the message goes to bob
    let mut binary = webpgp::ser::Serialize::to_bytes(&bob().public_key).unwrap();
    binary.extend(webpgp::ser::Serialize::to_bytes(&alice().public_key).unwrap());
    let armored =
        webpgp::armor::encode(webpgp::armor::BlockType::PublicKey, None, &binary).unwrap();

    let message = encrypt_to(b"first", &armored, &EncryptOptions::default());
    let err = decrypt(&message[..], &alice().secret_key_text, PASSPHRASE, io::sink()).unwrap_err();
    assert!(matches!(err, Error::SecretKeyNotFound), "{err:?}");

    let mut out = Vec::new();
    decrypt(&message[..], &bob().secret_key_text, PASSPHRASE, &mut out).unwrap();
    assert_eq!(out, b"first");
}

#[test]
fn tampering_never_verifies_altered_plaintext() {
    let plaintext = b"attack at dawn".repeat(50);
    let options = EncryptOptions::default().compression(CompressionAlgorithm::Uncompressed);
    let message = encrypt_to(&plaintext, &alice().public_key_text, &options);

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for _ in 0..24 {
        let offset = (rng.next_u32() as usize) % message.len();
        let mut tampered = message.clone();
        tampered[offset] ^= 1 << (rng.next_u32() % 8);

        let mut out = Vec::new();
        if let Ok(result) = decrypt(&tampered[..], &alice().secret_key_text, PASSPHRASE, &mut out) {
            assert!(
                !result.is_verified() || out == plaintext,
                "altered plaintext verified at offset {offset}"
            );
        }
    }
}

#[test]
fn invalid_inputs() {
    let err = encrypt(
        &b"x"[..],
        "not a key",
        &alice().secret_key_text,
        PASSPHRASE,
        io::sink(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidKeyMaterial { .. }), "{err:?}");

    let err = decrypt(&b"garbage"[..], &alice().secret_key_text, PASSPHRASE, io::sink())
        .unwrap_err();
    assert!(matches!(err, Error::MalformedArmor { .. }), "{err:?}");

    let err = decrypt(&b"\xff\xff"[..], &alice().secret_key_text, PASSPHRASE, io::sink())
        .unwrap_err();
    assert!(matches!(err, Error::MalformedMessage { .. }), "{err:?}");

    let err = encrypt_with(
        &b"x"[..],
        &alice().public_key_text,
        &alice().secret_key_text,
        PASSPHRASE,
        io::sink(),
        &EncryptOptions::default().chunk_size(100),
        &mut ChaCha8Rng::seed_from_u64(0),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidParameters { .. }), "{err:?}");

    // oversized chunks are rejected before the session key packet is written
    let mut out = Vec::new();
    let err = encrypt_with(
        &b"x"[..],
        &alice().public_key_text,
        &alice().secret_key_text,
        PASSPHRASE,
        &mut out,
        &EncryptOptions::default().chunk_size(1 << 31),
        &mut ChaCha8Rng::seed_from_u64(0),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidParameters { .. }), "{err:?}");
    assert!(out.is_empty());
}
