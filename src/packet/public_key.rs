use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use chrono::{DateTime, SubsecRound, Utc};
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use sha1::{Digest, Sha1};

use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{bail, ensure_eq, Result};
use crate::packet::PacketTrait;
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, u32_to_time, Serialize};
use crate::types::{Fingerprint, KeyId, Mpi, Tag};

/// Public key material.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum PublicParams {
    RSA { n: Mpi, e: Mpi },
    /// Algorithms this crate does not implement, kept verbatim.
    Unknown {
        #[debug("{}", hex::encode(data))]
        data: Bytes,
    },
}

impl Serialize for PublicParams {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PublicParams::RSA { n, e } => {
                n.to_writer(writer)?;
                e.to_writer(writer)?;
            }
            PublicParams::Unknown { data } => {
                writer.write_all(data)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            PublicParams::RSA { n, e } => n.write_len() + e.write_len(),
            PublicParams::Unknown { data } => data.len(),
        }
    }
}

/// Public Key Packet, version 4.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.2>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    created_at: DateTime<Utc>,
    algorithm: PublicKeyAlgorithm,
    params: PublicParams,
    fingerprint: Fingerprint,
}

impl PublicKey {
    pub fn new(
        created_at: DateTime<Utc>,
        algorithm: PublicKeyAlgorithm,
        params: PublicParams,
    ) -> Result<Self> {
        if algorithm.is_rsa() != matches!(params, PublicParams::RSA { .. }) {
            bail!(
                InvalidKeyMaterial,
                "key parameters do not match algorithm {}",
                algorithm
            );
        }

        // timestamps on the wire have second precision
        let created_at = created_at.trunc_subsecs(0);
        let fingerprint = calculate_fingerprint(&created_at, algorithm, &params)?;

        Ok(PublicKey {
            created_at,
            algorithm,
            params,
            fingerprint,
        })
    }

    /// Wraps an RSA public key (algorithm 1, encrypt and sign).
    pub fn from_rsa(created_at: DateTime<Utc>, key: &RsaPublicKey) -> Result<Self> {
        let params = PublicParams::RSA {
            n: Mpi::from(key.n()),
            e: Mpi::from(key.e()),
        };
        Self::new(created_at, PublicKeyAlgorithm::RSA, params)
    }

    /// Parses the body of a public key packet.
    ///
    /// Consumes only the public part, so secret key packets can continue from here.
    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        ensure_eq!(version, 4, UnsupportedMessageType, "public key version");

        let created_at = u32_to_time(i.read_be_u32()?);
        let algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
        let params = if algorithm.is_rsa() {
            let n = Mpi::from_buf(&mut i)?;
            let e = Mpi::from_buf(&mut i)?;
            PublicParams::RSA { n, e }
        } else {
            PublicParams::Unknown { data: i.rest() }
        };

        Self::new(created_at, algorithm, params)
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn params(&self) -> &PublicParams {
        &self.params
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }

    /// The RSA key for encryption and verification.
    pub fn rsa_public_key(&self) -> Result<RsaPublicKey> {
        match &self.params {
            PublicParams::RSA { n, e } => crate::crypto::rsa::public_key(n, e),
            PublicParams::Unknown { .. } => bail!(
                CryptoOperation,
                "public key algorithm {} is not supported",
                self.algorithm
            ),
        }
    }

    /// Writes the key the way it is hashed for fingerprints and signatures:
    /// `0x99`, a two octet length and the packet body.
    pub fn serialize_for_hashing<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(0x99)?;
        writer.write_u16::<BigEndian>(u16::try_from(self.write_len())?)?;
        self.to_writer(writer)
    }
}

fn write_body<W: io::Write>(
    writer: &mut W,
    created_at: &DateTime<Utc>,
    algorithm: PublicKeyAlgorithm,
    params: &PublicParams,
) -> Result<()> {
    writer.write_u8(4)?;
    writer.write_u32::<BigEndian>(time_to_u32(created_at))?;
    writer.write_u8(algorithm.into())?;
    params.to_writer(writer)
}

fn calculate_fingerprint(
    created_at: &DateTime<Utc>,
    algorithm: PublicKeyAlgorithm,
    params: &PublicParams,
) -> Result<Fingerprint> {
    let mut body = Vec::with_capacity(6 + params.write_len());
    write_body(&mut body, created_at, algorithm, params)?;

    let mut hasher = Sha1::new();
    hasher.update([0x99]);
    hasher.update(u16::try_from(body.len())?.to_be_bytes());
    hasher.update(&body);

    let mut fp = [0u8; 20];
    fp.copy_from_slice(&hasher.finalize());

    Ok(Fingerprint::new(fp))
}

impl Serialize for PublicKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        write_body(writer, &self.created_at, self.algorithm, &self.params)
    }

    fn write_len(&self) -> usize {
        6 + self.params.write_len()
    }
}

impl PacketTrait for PublicKey {
    fn tag(&self) -> Tag {
        Tag::PublicKey
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> PublicKey {
        let params = PublicParams::RSA {
            n: Mpi::from_slice(&[0xC5; 128]),
            e: Mpi::from_slice(&[0x01, 0x00, 0x01]),
        };
        PublicKey::new(u32_to_time(1_600_000_000), PublicKeyAlgorithm::RSA, params).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let key = sample();
        let bytes = key.to_bytes().unwrap();
        assert_eq!(bytes.len(), key.write_len());
        assert_eq!(bytes[0], 4);

        let parsed = PublicKey::from_buf(Bytes::from(bytes)).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.key_id(), key.key_id());
    }

    #[test]
    fn test_fingerprint_matches_hashing_form() {
        let key = sample();
        let mut framed = Vec::new();
        key.serialize_for_hashing(&mut framed).unwrap();
        assert_eq!(framed[0], 0x99);

        let digest = Sha1::digest(&framed);
        assert_eq!(key.fingerprint().as_bytes(), &digest[..]);
        assert_eq!(key.key_id().as_ref(), &digest[12..]);
    }

    #[test]
    fn test_unknown_algorithm_is_kept() {
        let body = [4, 0x5F, 0x5E, 0x10, 0x00, 22, 1, 2, 3];
        let key = PublicKey::from_buf(&body[..]).unwrap();
        assert_eq!(key.algorithm(), PublicKeyAlgorithm::EdDSALegacy);
        assert_eq!(key.to_bytes().unwrap(), body.to_vec());
        assert!(key.rsa_public_key().is_err());
    }

    #[test]
    fn test_v3_is_rejected() {
        let body = [3, 0, 0, 0, 0, 0, 0, 1];
        assert!(PublicKey::from_buf(&body[..]).is_err());
    }
}
