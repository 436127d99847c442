use chrono::{DateTime, SubsecRound, Utc};
use derive_builder::Builder;
use log::info;
use rand::{CryptoRng, Rng};
use rsa::RsaPublicKey;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::packet::{
    self, PlainSecretParams, SignatureConfig, SignatureType, Subpacket, SubpacketData, UserId,
};
use crate::types::{CompressionAlgorithm, KeyFlags, StringToKey, DEFAULT_ITER_COUNT};

use super::{SignedKeyDetails, SignedPublicKey, SignedSecretKey, SignedUser};

/// Policy for generating a key pair.
///
/// ```no_run
/// # use webpgp::composed::KeyGenParamsBuilder;
/// let params = KeyGenParamsBuilder::default()
///     .user_id("Alice <alice@example.com>".into())
///     .passphrase("correct horse".into())
///     .build()
///     .expect("valid params");
/// let pair = params.generate(&mut rand::thread_rng()).expect("key generation");
/// println!("{}", pair.public_key_text);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate", error = "Error"))]
pub struct KeyGenParams {
    user_id: String,
    /// Protects the secret key, may be empty.
    #[builder(default)]
    passphrase: String,
    #[builder(default = "3072")]
    bits: usize,
    #[builder(default = "65537")]
    exponent: u64,
    /// Cipher protecting the secret key material.
    #[builder(default = "SymmetricKeyAlgorithm::AES256")]
    sym_alg: SymmetricKeyAlgorithm,
    /// Hash for the self-certification and the S2K.
    #[builder(default = "HashAlgorithm::Sha256")]
    hash_alg: HashAlgorithm,
    /// Coded S2K iteration count.
    #[builder(default = "DEFAULT_ITER_COUNT")]
    s2k_count: u8,
    #[builder(default = "Utc::now().trunc_subsecs(0)")]
    created_at: DateTime<Utc>,
}

impl KeyGenParamsBuilder {
    fn validate(&self) -> std::result::Result<(), Error> {
        if let Some(user_id) = &self.user_id {
            if user_id.trim().is_empty() {
                return Err(Error::InvalidParameters {
                    message: "user id must not be empty".into(),
                });
            }
        }
        if let Some(bits) = self.bits {
            if bits < 2048 {
                return Err(Error::InvalidParameters {
                    message: "Keys with less than 2048bits are considered insecure".into(),
                });
            }
        }
        if let Some(exponent) = self.exponent {
            if exponent < 3 || exponent % 2 == 0 {
                return Err(Error::InvalidParameters {
                    message: format!("invalid public exponent {exponent}"),
                });
            }
        }
        if let Some(sym_alg) = self.sym_alg {
            if !sym_alg.is_supported() {
                return Err(Error::InvalidParameters {
                    message: format!("symmetric algorithm {sym_alg} is not supported"),
                });
            }
        }
        if let Some(hash_alg) = self.hash_alg {
            if hash_alg.digest_size().is_none() {
                return Err(Error::InvalidParameters {
                    message: format!("hash algorithm {hash_alg} is not supported"),
                });
            }
        }

        Ok(())
    }
}

/// A freshly generated key, parsed and armored.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: SignedPublicKey,
    pub secret_key: SignedSecretKey,
    pub public_key_text: String,
    pub secret_key_text: String,
}

impl KeyGenParams {
    /// Generates an RSA key with a positive self-certification of the user id.
    pub fn generate<R: Rng + CryptoRng>(&self, rng: &mut R) -> Result<KeyPair> {
        let rsa_key = crate::crypto::rsa::generate_key(rng, self.bits, self.exponent)?;
        let public = packet::PublicKey::from_rsa(self.created_at, &RsaPublicKey::from(&rsa_key))?;
        let key_id = public.key_id();
        let user = UserId::new(&self.user_id);

        let mut config =
            SignatureConfig::v4(SignatureType::CertPositive, PublicKeyAlgorithm::RSA, self.hash_alg);
        config.hashed_subpackets = vec![
            Subpacket::regular(SubpacketData::SignatureCreationTime(self.created_at)),
            Subpacket::regular(SubpacketData::KeyFlags(KeyFlags::all())),
            Subpacket::regular(SubpacketData::PreferredSymmetricAlgorithms(vec![
                SymmetricKeyAlgorithm::AES256,
                SymmetricKeyAlgorithm::AES128,
                SymmetricKeyAlgorithm::CAST5,
            ])),
            Subpacket::regular(SubpacketData::PreferredHashAlgorithms(vec![
                HashAlgorithm::Sha256,
                HashAlgorithm::Sha512,
                HashAlgorithm::Sha1,
            ])),
            Subpacket::regular(SubpacketData::PreferredCompressionAlgorithms(vec![
                CompressionAlgorithm::ZIP,
                CompressionAlgorithm::ZLIB,
                CompressionAlgorithm::Uncompressed,
            ])),
        ];
        config.unhashed_subpackets = vec![Subpacket::regular(SubpacketData::Issuer(key_id))];
        let certification = config.sign_certification(&rsa_key, &public, &user)?;

        let plain = PlainSecretParams::from_rsa(&rsa_key)?;
        let s2k = StringToKey::new_iterated(rng, self.hash_alg, self.s2k_count);
        let secret = packet::SecretKey::new_protected(
            rng,
            public.clone(),
            &plain,
            self.passphrase.as_bytes(),
            self.sym_alg,
            s2k,
        )?;

        let details = SignedKeyDetails {
            direct_signatures: Vec::new(),
            users: vec![SignedUser::new(user, vec![certification])],
        };
        let public_key = SignedPublicKey::new(public, details.clone());
        let secret_key = SignedSecretKey::new(secret, details);
        info!("generated {} bit key {}", self.bits, key_id);

        Ok(KeyPair {
            public_key_text: public_key.to_armored_string(None)?,
            secret_key_text: secret_key.to_armored_string(None)?,
            public_key,
            secret_key,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::composed::{
        read_public_key_ring, read_secret_key_ring, test_keys, KeyDetails,
    };
    use crate::types::Capability;

    #[test]
    fn test_generated_pair_round_trips() {
        let alice = test_keys::alice();

        let ring = read_public_key_ring(alice.public_key_text.as_bytes()).unwrap();
        let key = &ring.keys()[0];
        assert_eq!(key, &alice.public_key);
        assert_eq!(key.algorithm(), PublicKeyAlgorithm::RSA);
        assert_eq!(key.key_flags(), Some(KeyFlags::all()));
        assert!(key.can(Capability::Encryption));
        assert!(key.can(Capability::Signing));
        // the certification survived verification on read
        assert_eq!(key.details.users[0].signatures.len(), 1);

        let ring = read_secret_key_ring(alice.secret_key_text.as_bytes()).unwrap();
        let secret = &ring.keys()[0];
        assert!(secret.primary_key.is_encrypted());
        let unlocked = secret.unlock(test_keys::PASSPHRASE).unwrap();
        assert_eq!(unlocked.key_id(), key.key_id());
    }

    #[test]
    fn test_wrong_passphrase() {
        let alice = test_keys::alice();
        let err = alice.secret_key.unlock("battery staple").unwrap_err();
        assert!(matches!(err, Error::PassphraseMismatch { .. }), "{err:?}");
    }

    #[test]
    fn test_tampered_certification_is_dropped() {
        let alice = test_keys::alice();
        let mut public = alice.public_key.clone();
        public.details.users[0].id = UserId::new("Mallory <mallory@example.com>");

        let bytes = crate::ser::Serialize::to_bytes(&public).unwrap();
        let ring = read_public_key_ring(&bytes).unwrap();
        let key = &ring.keys()[0];
        assert!(key.details.users[0].signatures.is_empty());
        // no trusted key flags left, the algorithm decides
        assert_eq!(key.key_flags(), None);
        assert!(key.can(Capability::Signing));
    }

    #[test]
    fn test_params_validation() {
        let err = KeyGenParamsBuilder::default()
            .user_id("a".into())
            .bits(1024)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameters { .. }));

        for exponent in [1, 4, 65536] {
            let err = KeyGenParamsBuilder::default()
                .user_id("a".into())
                .exponent(exponent)
                .build()
                .unwrap_err();
            assert!(matches!(err, Error::InvalidParameters { .. }));
        }

        let err = KeyGenParamsBuilder::default()
            .user_id("  ".into())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameters { .. }));

        // the user id is required
        let err = KeyGenParamsBuilder::default().build().unwrap_err();
        assert!(matches!(err, Error::InvalidParameters { .. }));

        let params = KeyGenParamsBuilder::default()
            .user_id("a".into())
            .build()
            .unwrap();
        assert_eq!(params.bits, 3072);
        assert_eq!(params.exponent, 65537);
        assert_eq!(params.sym_alg, SymmetricKeyAlgorithm::AES256);
        assert_eq!(params.hash_alg, HashAlgorithm::Sha256);
        assert_eq!(params.s2k_count, DEFAULT_ITER_COUNT);
    }
}
