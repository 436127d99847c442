use std::io::{self, BufRead, BufReader, Read, Write};

use digest::DynDigest;
use log::{debug, info, warn};
use zeroize::Zeroizing;

use crate::armor::{self, BlockType, Dearmor};
use crate::composed::{find_secret_key_by_id, KeyDetails, KeyRing, SignedSecretKey};
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{bail, ensure, format_err, Error, Result};
use crate::packet::{
    self, Decompressor, LiteralDataHeader, OnePassSignature, PacketBodyReader, PacketHeader,
    PublicKeyEncryptedSessionKey, Signature, SignatureType, SymEncryptedProtectedData,
};
use crate::types::{Capability, KeyId, Tag};

use super::{DecryptOptions, DecryptionResult, Verification};

/// Reads messages addressed to the keys of a secret key ring.
///
/// Plaintext is streamed to the output as it is decrypted. The modification
/// detection code is only checked once the encrypted data is exhausted, so on
/// error the output may already hold content that must be discarded.
#[derive(Debug)]
pub struct MessageDecoder<'a> {
    ring: &'a KeyRing<SignedSecretKey>,
    passphrase: &'a str,
    options: &'a DecryptOptions,
}

impl<'a> MessageDecoder<'a> {
    pub fn new(
        ring: &'a KeyRing<SignedSecretKey>,
        passphrase: &'a str,
        options: &'a DecryptOptions,
    ) -> Self {
        MessageDecoder {
            ring,
            passphrase,
            options,
        }
    }

    /// Decrypts `input`, armored or binary, and writes the literal content to `output`.
    pub fn decrypt<R: Read, W: Write>(&self, input: R, mut output: W) -> Result<DecryptionResult> {
        let mut source = BufReader::new(input);
        if starts_armored(&mut source)? {
            let mut dearmor = Dearmor::new(source);
            let typ = dearmor.read_header()?;
            ensure!(
                typ == BlockType::Message,
                UnsupportedMessageType,
                "expected {}, found {}",
                BlockType::Message,
                typ
            );
            self.decrypt_packets(BufReader::new(dearmor), &mut output)
        } else {
            self.decrypt_packets(source, &mut output)
        }
    }

    fn decrypt_packets<S: BufRead, W: Write>(
        &self,
        mut source: S,
        output: &mut W,
    ) -> Result<DecryptionResult> {
        let mut esks = Vec::new();
        let header = loop {
            let header = next_header(&mut source)?;
            let mut body = PacketBodyReader::new(header, &mut source);
            match header.tag() {
                Tag::PublicKeyEncryptedSessionKey => {
                    let esk = PublicKeyEncryptedSessionKey::from_buf(&body.read_body()?[..])?;
                    debug!("session key packet for {}", esk.id());
                    esks.push(esk);
                }
                Tag::Marker => {
                    body.drain()?;
                }
                Tag::SymEncryptedProtectedData => break header,
                tag @ (Tag::SymKeyEncryptedSessionKey
                | Tag::SymEncryptedData
                | Tag::LiteralData
                | Tag::CompressedData
                | Tag::OnePassSignature
                | Tag::Signature) => {
                    bail!(UnsupportedMessageType, "{:?} packets are not supported", tag)
                }
                tag => bail!(MalformedMessage, "unexpected {:?} packet in message", tag),
            }
        };

        let (alg, session_key) = self.session_key(&esks)?;
        let mut plain = SymEncryptedProtectedData::decryptor(
            alg,
            &session_key,
            PacketBodyReader::new(header, source),
        )?;

        let header = next_header(&mut plain)?;
        let result = if header.tag() == Tag::CompressedData {
            let compressed = PacketBodyReader::new(header, &mut plain);
            let mut decompressed = BufReader::new(Decompressor::from_reader(compressed)?);
            let first = next_header(&mut decompressed)?;
            let result = self.read_content(first, &mut decompressed, output)?;
            skip_trailing(&mut decompressed, "compressed data")?;
            decompressed.into_inner().into_inner().drain()?;
            result
        } else {
            self.read_content(header, &mut plain, output)?
        };

        // reading to the end checks the modification detection code
        skip_trailing(&mut plain, "encrypted data")?;
        output.flush()?;

        ensure!(
            !self.options.require_valid_signature || result.is_verified(),
            CryptoOperation,
            "message signature is {}",
            result.verification
        );
        info!(
            "decrypted message, signature {}{}",
            result.verification,
            result
                .signer
                .map(|id| format!(" by {id}"))
                .unwrap_or_default()
        );

        Ok(result)
    }

    /// The session key from the first packet addressed to an unlockable key.
    fn session_key(
        &self,
        esks: &[PublicKeyEncryptedSessionKey],
    ) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
        for esk in esks {
            if let Some(key) = find_secret_key_by_id(self.ring, esk.id(), self.passphrase)? {
                debug!("decrypting session key with {}", key.key_id());
                return esk.decrypt(key.secret());
            }
        }

        Err(Error::SecretKeyNotFound)
    }

    /// Reads an optionally one-pass signed literal data packet.
    fn read_content<S: BufRead, W: Write>(
        &self,
        header: PacketHeader,
        source: &mut S,
        output: &mut W,
    ) -> Result<DecryptionResult> {
        match header.tag() {
            Tag::OnePassSignature => {
                let ops = OnePassSignature::from_buf(
                    &PacketBodyReader::new(header, &mut *source).read_body()?[..],
                )?;
                debug!("one pass signature by {}", ops.key_id);

                let header = next_header(source)?;
                ensure!(
                    header.tag() == Tag::LiteralData,
                    UnsupportedMessageType,
                    "one pass signature followed by {:?}",
                    header.tag()
                );

                let mut hasher = match ops.hash_algorithm.new_hasher() {
                    Ok(hasher) => Some(hasher),
                    Err(err) => {
                        warn!("can not hash signed content: {}", err);
                        None
                    }
                };
                let literal = read_literal(header, source, output, hasher.as_mut())?;

                let header = next_header(source)?;
                ensure!(
                    header.tag() == Tag::Signature,
                    MalformedMessage,
                    "expected signature packet, found {:?}",
                    header.tag()
                );
                let signature = Signature::from_buf(
                    &PacketBodyReader::new(header, &mut *source).read_body()?[..],
                )?;
                let signer = signature.issuer().copied().unwrap_or(ops.key_id);
                let verification = self.verify(&ops, &signature, &signer, hasher);

                Ok(DecryptionResult {
                    verification,
                    file_name: String::from_utf8_lossy(literal.file_name()).into_owned(),
                    modification_time: *literal.created(),
                    signer: Some(signer),
                    signer_user_id: signature
                        .signers_user_id()
                        .map(|id| String::from_utf8_lossy(id).into_owned()),
                })
            }
            Tag::LiteralData => {
                warn!("message is not signed");
                let literal = read_literal(header, source, output, None)?;

                Ok(DecryptionResult {
                    verification: Verification::Unknown,
                    file_name: String::from_utf8_lossy(literal.file_name()).into_owned(),
                    modification_time: *literal.created(),
                    signer: None,
                    signer_user_id: None,
                })
            }
            tag @ (Tag::CompressedData | Tag::Signature | Tag::SymEncryptedProtectedData) => {
                bail!(
                    UnsupportedMessageType,
                    "{:?} packet inside encrypted data is not supported",
                    tag
                )
            }
            tag => bail!(MalformedMessage, "unexpected {:?} packet in encrypted data", tag),
        }
    }

    fn verify(
        &self,
        ops: &OnePassSignature,
        signature: &Signature,
        signer: &KeyId,
        hasher: Option<Box<dyn DynDigest>>,
    ) -> Verification {
        let Some(hasher) = hasher else {
            return Verification::Unknown;
        };
        if signature.typ() != SignatureType::Binary
            || signature.hash_alg() != ops.hash_algorithm
            || signer != &ops.key_id
        {
            warn!(
                "signature {:?} does not match its one pass header {:?}",
                signature.config, ops
            );
            return Verification::Failed;
        }

        let Some(key) = self.signer_key(signer) else {
            debug!("signer {} not available", signer);
            return Verification::Unknown;
        };
        let key = match key.rsa_public_key() {
            Ok(key) => key,
            Err(err) => {
                warn!("can not verify with key {}: {}", signer, err);
                return Verification::Unknown;
            }
        };

        match signature.verify_hasher(&key, hasher) {
            Ok(()) => Verification::Verified,
            Err(err) => {
                warn!("signature by {} does not verify: {}", signer, err);
                Verification::Failed
            }
        }
    }

    /// Looks up the signer, first among the secret ring's keys, then in the
    /// extra verification keys.
    fn signer_key(&self, id: &KeyId) -> Option<&packet::PublicKey> {
        let ring = self
            .ring
            .iter()
            .filter(|key| key.can(Capability::Signing))
            .map(|key| key.public_key_packet());
        let extra = self
            .options
            .verification_keys
            .iter()
            .filter(|key| key.can(Capability::Signing))
            .map(|key| key.public_key_packet());

        ring.chain(extra).find(|key| &key.key_id() == id)
    }
}

/// Skips leading whitespace, then tells armored text from binary packets.
fn starts_armored<R: BufRead>(source: &mut R) -> Result<bool> {
    loop {
        let buf = source.fill_buf()?;
        if buf.is_empty() {
            bail!(MalformedMessage, "empty message");
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(pos) => {
                let first = buf[pos];
                source.consume(pos);
                return Ok(!armor::is_binary(first));
            }
            None => {
                let len = buf.len();
                source.consume(len);
            }
        }
    }
}

fn next_header<R: BufRead>(source: &mut R) -> Result<PacketHeader> {
    PacketHeader::from_reader(source)?
        .ok_or_else(|| format_err!(MalformedMessage, "unexpected end of message"))
}

/// Streams the content of a literal data packet into `output`, and `hasher`.
fn read_literal<S: BufRead, W: Write>(
    header: PacketHeader,
    source: &mut S,
    output: &mut W,
    mut hasher: Option<&mut Box<dyn DynDigest>>,
) -> Result<LiteralDataHeader> {
    let mut body = PacketBodyReader::new(header, source);
    let literal = LiteralDataHeader::from_reader(&mut body)?;
    debug!("literal data {:?}", literal);

    let mut total = 0u64;
    loop {
        let buf = body.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(buf);
        }
        output.write_all(buf)?;

        let len = buf.len();
        total += len as u64;
        body.consume(len);
    }
    debug!("read {} bytes of literal data", total);

    Ok(literal)
}

fn skip_trailing<R: Read>(source: &mut R, what: &str) -> Result<()> {
    let skipped = io::copy(source, &mut io::sink())?;
    if skipped > 0 {
        warn!("ignored {} trailing bytes in {}", skipped, what);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::message::encoder::encrypt_and_sign;
    use crate::composed::{test_keys, EncryptOptions, SignedPublicKey, UnlockedKey};
    use crate::crypto::hash::HashAlgorithm;
    use crate::crypto::public_key::PublicKeyAlgorithm;
    use crate::packet::{write_packet, PartialBodyWriter, UserId};
    use crate::ser::{u32_to_time, Serialize};

    fn alice_unlocked() -> UnlockedKey {
        test_keys::alice()
            .secret_key
            .unlock(test_keys::PASSPHRASE)
            .unwrap()
    }

    fn encrypt(plaintext: &[u8], recipient: &SignedPublicKey, options: &EncryptOptions) -> Vec<u8> {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let alice = test_keys::alice();
        encrypt_and_sign(
            &mut rng,
            plaintext,
            recipient,
            &alice_unlocked(),
            &alice.public_key,
            options,
            Vec::new(),
        )
        .unwrap()
    }

    fn decrypt(message: &[u8], ring: &KeyRing<SignedSecretKey>) -> Result<(Vec<u8>, DecryptionResult)> {
        let options = DecryptOptions::default();
        let mut out = Vec::new();
        let result = MessageDecoder::new(ring, test_keys::PASSPHRASE, &options).decrypt(message, &mut out)?;
        Ok((out, result))
    }

    fn bob_ring() -> KeyRing<SignedSecretKey> {
        KeyRing::new(vec![test_keys::bob().secret_key.clone()])
    }

    /// Encrypts already framed packets to bob, with no compression layer.
    fn seal_for_bob(packets: &[u8]) -> Vec<u8> {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let alg = SymmetricKeyAlgorithm::AES256;
        let session_key = alg.new_session_key(&mut rng);
        let esk = PublicKeyEncryptedSessionKey::from_session_key(
            &mut rng,
            &session_key,
            alg,
            &test_keys::bob().public_key.primary_key,
        )
        .unwrap();

        let mut message = Vec::new();
        write_packet(&mut message, &esk).unwrap();
        let body = PartialBodyWriter::new(Tag::SymEncryptedProtectedData, 512, message).unwrap();
        let mut encrypted =
            SymEncryptedProtectedData::encryptor(&mut rng, alg, &session_key, body).unwrap();
        encrypted.write_all(packets).unwrap();
        encrypted.finish().unwrap().finish().unwrap()
    }

    fn literal_packet(content: &[u8]) -> Vec<u8> {
        let mut body = LiteralDataHeader::new("plain.txt", u32_to_time(1_600_000_000))
            .unwrap()
            .to_bytes()
            .unwrap();
        body.extend_from_slice(content);

        let mut packet = Vec::new();
        PacketHeader::new_fixed(Tag::LiteralData, body.len())
            .to_writer(&mut packet)
            .unwrap();
        packet.extend(body);
        packet
    }

    #[test]
    fn test_roundtrip_sizes() {
        let _ = pretty_env_logger::try_init();
        let bob = test_keys::bob();
        let options = EncryptOptions::default()
            .chunk_size(512)
            .file_name("hello.txt")
            .modification_time(u32_to_time(1_600_000_000));

        for size in [0, 1, 511, 512, 513, 5000] {
            let plaintext: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let message = encrypt(&plaintext, &bob.public_key, &options);
            let (out, result) = decrypt(&message, &bob_ring()).unwrap();

            assert_eq!(out, plaintext, "size {size}");
            // alice's key is not known to bob's ring
            assert_eq!(result.verification, Verification::Unknown);
            assert_eq!(result.signer, Some(test_keys::alice().public_key.key_id()));
            assert_eq!(result.file_name, "hello.txt");
            assert_eq!(result.modification_time, u32_to_time(1_600_000_000));
            assert_eq!(
                result.signer_user_id.as_deref(),
                Some("Alice <alice@example.com>")
            );
        }
    }

    #[test]
    fn test_verified_with_extra_keys() {
        let bob = test_keys::bob();
        let message = encrypt(b"hello", &bob.public_key, &EncryptOptions::default());

        let options = DecryptOptions::default()
            .verification_keys(vec![test_keys::alice().public_key.clone()])
            .require_valid_signature(true);
        let ring = bob_ring();
        let mut out = Vec::new();
        let result = MessageDecoder::new(&ring, test_keys::PASSPHRASE, &options)
            .decrypt(&message[..], &mut out)
            .unwrap();
        assert_eq!(out, b"hello");
        assert!(result.is_verified());
    }

    #[test]
    fn test_require_valid_signature() {
        let bob = test_keys::bob();
        let message = encrypt(b"hello", &bob.public_key, &EncryptOptions::default());

        let options = DecryptOptions::default().require_valid_signature(true);
        let ring = bob_ring();
        let err = MessageDecoder::new(&ring, test_keys::PASSPHRASE, &options)
            .decrypt(&message[..], io::sink())
            .unwrap_err();
        assert!(matches!(err, Error::CryptoOperation { .. }), "{err:?}");
    }

    #[test]
    fn test_self_encrypted_is_verified() {
        let alice = test_keys::alice();
        let options = EncryptOptions::default().compression(crate::types::CompressionAlgorithm::ZLIB);
        let message = encrypt(b"note to self", &alice.public_key, &options);

        let ring = KeyRing::new(vec![alice.secret_key.clone()]);
        let (out, result) = decrypt(&message, &ring).unwrap();
        assert_eq!(out, b"note to self");
        assert_eq!(result.verification, Verification::Verified);
    }

    #[test]
    fn test_armored_message() {
        let bob = test_keys::bob();
        let message = encrypt(b"armored", &bob.public_key, &EncryptOptions::default());
        let text = armor::encode(BlockType::Message, None, &message).unwrap();

        let (out, _) = decrypt(format!("\n\n{text}").as_bytes(), &bob_ring()).unwrap();
        assert_eq!(out, b"armored");

        // a key block is not a message
        let key = bob.public_key.to_armored_string(None).unwrap();
        let err = decrypt(key.as_bytes(), &bob_ring()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMessageType { .. }), "{err:?}");
    }

    #[test]
    fn test_unknown_recipient() {
        let alice = test_keys::alice();
        let message = encrypt(b"secret", &alice.public_key, &EncryptOptions::default());

        let options = DecryptOptions::default();
        let ring = bob_ring();
        let mut out = Vec::new();
        let err = MessageDecoder::new(&ring, test_keys::PASSPHRASE, &options)
            .decrypt(&message[..], &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::SecretKeyNotFound), "{err:?}");
        assert!(out.is_empty());
    }

    #[test]
    fn test_wrong_passphrase() {
        let bob = test_keys::bob();
        let message = encrypt(b"secret", &bob.public_key, &EncryptOptions::default());

        let options = DecryptOptions::default();
        let ring = bob_ring();
        let err = MessageDecoder::new(&ring, "battery staple", &options)
            .decrypt(&message[..], io::sink())
            .unwrap_err();
        assert!(matches!(err, Error::SecretKeyNotFound), "{err:?}");
    }

    #[test]
    fn test_tampered_ciphertext() {
        let alice = test_keys::alice();
        let ring = KeyRing::new(vec![alice.secret_key.clone()]);
        let options = EncryptOptions::default()
            .compression(crate::types::CompressionAlgorithm::Uncompressed);
        let message = encrypt(&[7u8; 2000], &alice.public_key, &options);
        assert!(decrypt(&message, &ring).unwrap().1.is_verified());

        // flip bytes in the encrypted body, past the session key packet
        for offset in [message.len() / 2, message.len() - 3] {
            let mut tampered = message.clone();
            tampered[offset] ^= 0x01;
            match decrypt(&tampered, &ring) {
                Ok((_, result)) => assert!(!result.is_verified()),
                Err(err) => assert!(
                    matches!(
                        err,
                        Error::CryptoOperation { .. }
                            | Error::MalformedMessage { .. }
                            | Error::UnsupportedMessageType { .. }
                            | Error::Io { .. }
                    ),
                    "{err:?}"
                ),
            }
        }
    }

    #[test]
    fn test_garbage_input() {
        let err = decrypt(b"", &bob_ring()).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }), "{err:?}");

        // a literal data packet on its own is not an encrypted message
        let err = decrypt(&[0xCB, 0x01, b'b'], &bob_ring()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMessageType { .. }), "{err:?}");
    }

    #[test]
    fn test_unsigned_literal() {
        let message = seal_for_bob(&literal_packet(b"plain"));
        let (out, result) = decrypt(&message, &bob_ring()).unwrap();
        assert_eq!(out, b"plain");
        assert_eq!(result.verification, Verification::Unknown);
        assert_eq!(result.signer, None);
        assert_eq!(result.file_name, "plain.txt");
    }

    #[test]
    fn test_one_pass_signature_without_literal() {
        let ops = OnePassSignature::new(
            SignatureType::Binary,
            HashAlgorithm::Sha256,
            PublicKeyAlgorithm::RSA,
            test_keys::alice().public_key.key_id(),
        );
        let mut packets = Vec::new();
        write_packet(&mut packets, &ops).unwrap();
        write_packet(&mut packets, &UserId::new("mallory")).unwrap();
        let message = seal_for_bob(&packets);

        let options = DecryptOptions::default();
        let ring = bob_ring();
        let mut out = Vec::new();
        let err = MessageDecoder::new(&ring, test_keys::PASSPHRASE, &options)
            .decrypt(&message[..], &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMessageType { .. }), "{err:?}");
        assert!(out.is_empty());
    }

    #[test]
    fn test_unexpected_packet_in_encrypted_data() {
        let mut packets = Vec::new();
        write_packet(&mut packets, &UserId::new("mallory")).unwrap();
        let message = seal_for_bob(&packets);

        let err = decrypt(&message, &bob_ring()).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }), "{err:?}");
    }

    #[test]
    fn test_modification_detection_code_mismatch() {
        let mut message = seal_for_bob(&literal_packet(b"plain"));
        assert!(decrypt(&message, &bob_ring()).is_ok());

        // the last octet belongs to the encrypted SHA-1 of the MDC packet
        let last = message.len() - 1;
        message[last] ^= 0x80;
        let err = decrypt(&message, &bob_ring()).unwrap_err();
        assert!(matches!(err, Error::CryptoOperation { .. }), "{err:?}");
    }
}
