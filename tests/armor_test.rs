use proptest::prelude::*;
use webpgp::armor::{self, BlockType, Dearmor};
use webpgp::Error;

proptest! {
    #[test]
    fn armor_is_lossless(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let armored = armor::encode(BlockType::Message, None, &data).unwrap();
        prop_assert!(armored.lines().all(|line| line.len() <= 64));
        prop_assert_eq!(armor::decode(armored.as_bytes()).unwrap(), data);
    }

    #[test]
    fn leading_text_is_skipped(prefix in "[a-z ]{0,40}\n", data in proptest::collection::vec(any::<u8>(), 1..256)) {
        let armored = armor::encode(BlockType::PublicKey, None, &data).unwrap();
        let text = format!("{prefix}{armored}");

        let mut dearmor = Dearmor::new(text.as_bytes());
        prop_assert_eq!(dearmor.read_header().unwrap(), BlockType::PublicKey);
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut dearmor, &mut out).unwrap();
        prop_assert_eq!(out, data);
    }
}

#[test]
fn checksum_mismatch() {
    let armored = armor::encode(BlockType::Message, None, b"hello world").unwrap();
    // swap one body character for another valid base64 character
    let corrupted = armored.replacen("aGVsbG8", "aGVsbG9", 1);
    assert_ne!(corrupted, armored);

    let err = armor::decode(corrupted.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::MalformedArmor { .. }), "{err:?}");
}

#[test]
fn broken_envelopes() {
    let armored = armor::encode(BlockType::Message, None, b"hello world").unwrap();

    let wrong_footer = armored.replace("END PGP MESSAGE", "END PGP PUBLIC KEY BLOCK");
    let no_footer = armored.replace("-----END PGP MESSAGE-----\n", "");
    let no_header = armored.replace("-----BEGIN PGP MESSAGE-----\n", "");
    let bad_base64 = armored.replacen("aGVsbG8", "a*VsbG8", 1);

    for input in [wrong_footer, no_footer, no_header, bad_base64] {
        let err = armor::decode(input.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedArmor { .. }), "{input}: {err:?}");
    }
}

#[test]
fn binary_passes_through() {
    let binary = [0xC1, 0x02, 0x03, 0x04];
    assert_eq!(armor::decode(&binary).unwrap(), binary);
}
