use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use chrono::{DateTime, Utc};
use digest::DynDigest;
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};
use rsa::RsaPublicKey;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{ensure, ensure_eq, format_err, Result};
use crate::packet::{PacketTrait, PublicKey, UserId};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{KeyFlags, KeyId, Mpi, Tag};

mod config;
mod subpacket;

pub(crate) use self::config::hash_certification_data;
pub use self::config::SignatureConfig;
pub use self::subpacket::{Subpacket, SubpacketData, SubpacketType};

/// Signature type octet.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.1>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SignatureType {
    /// Signature of a binary document.
    Binary = 0x00,
    /// Signature of a canonical text document, line endings converted to `<CR><LF>`.
    Text = 0x01,
    /// Signature of only its own subpacket contents.
    Standalone = 0x02,
    /// Generic certification of a User ID and Public-Key packet.
    CertGeneric = 0x10,
    /// Persona certification of a User ID and Public-Key packet.
    CertPersona = 0x11,
    /// Casual certification of a User ID and Public-Key packet.
    CertCasual = 0x12,
    /// Positive certification of a User ID and Public-Key packet.
    CertPositive = 0x13,
    /// Subkey Binding Signature
    SubkeyBinding = 0x18,
    /// Primary Key Binding Signature
    KeyBinding = 0x19,
    /// Signature directly on a key
    Key = 0x1F,
    /// Key revocation signature
    KeyRevocation = 0x20,
    /// Subkey revocation signature
    SubkeyRevocation = 0x28,
    /// Certification revocation signature
    CertRevocation = 0x30,
    /// Timestamp signature.
    Timestamp = 0x40,
    /// Third-Party Confirmation signature.
    ThirdParty = 0x50,

    #[num_enum(catch_all)]
    Other(u8),
}

/// Signature Packet, version 4.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct Signature {
    pub config: SignatureConfig,
    #[debug("{}", hex::encode(signed_hash_value))]
    pub signed_hash_value: [u8; 2],
    /// Algorithm specific values, a single MPI for RSA.
    pub signature: Vec<Mpi>,
}

impl Signature {
    pub fn from_config(
        config: SignatureConfig,
        signed_hash_value: [u8; 2],
        signature: Vec<Mpi>,
    ) -> Self {
        Signature {
            config,
            signed_hash_value,
            signature,
        }
    }

    /// Parses a signature packet body.
    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        ensure_eq!(version, 4, UnsupportedMessageType, "signature version");

        let typ = SignatureType::from(i.read_u8()?);
        let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
        let hash_alg = HashAlgorithm::from(i.read_u8()?);

        let hashed_len = i.read_be_u16()?;
        let hashed_subpackets = Subpacket::from_area(i.read_take(hashed_len.into())?)?;
        let unhashed_len = i.read_be_u16()?;
        let unhashed_subpackets = Subpacket::from_area(i.read_take(unhashed_len.into())?)?;

        let signed_hash_value = i.read_array::<2>()?;
        let mut signature = Vec::new();
        while i.has_remaining() {
            signature.push(Mpi::from_buf(&mut i)?);
        }

        Ok(Signature {
            config: SignatureConfig {
                typ,
                pub_alg,
                hash_alg,
                hashed_subpackets,
                unhashed_subpackets,
            },
            signed_hash_value,
            signature,
        })
    }

    /// Returns what kind of signature this is.
    pub fn typ(&self) -> SignatureType {
        self.config.typ
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        self.config.hash_alg
    }

    pub fn pub_alg(&self) -> PublicKeyAlgorithm {
        self.config.pub_alg
    }

    pub fn issuer(&self) -> Option<&KeyId> {
        self.config.issuer()
    }

    pub fn created(&self) -> Option<&DateTime<Utc>> {
        self.config.created()
    }

    pub fn is_certification(&self) -> bool {
        self.config.is_certification()
    }

    /// Key flags, only trusted from the hashed area.
    pub fn key_flags(&self) -> Option<KeyFlags> {
        self.config
            .hashed_subpackets
            .iter()
            .find_map(|p| match &p.data {
                SubpacketData::KeyFlags(flags) => Some(*flags),
                _ => None,
            })
    }

    pub fn signers_user_id(&self) -> Option<&Bytes> {
        self.config.subpackets().find_map(|p| match &p.data {
            SubpacketData::SignersUserID(id) => Some(id),
            _ => None,
        })
    }

    /// Verify this signature, the signed data was already fed into `hasher`.
    pub fn verify_hasher(&self, key: &RsaPublicKey, hasher: Box<dyn DynDigest>) -> Result<()> {
        let hash = self.config.finish_hash(hasher)?;
        ensure_eq!(
            &self.signed_hash_value[..],
            &hash[0..2],
            CryptoOperation,
            "signature: invalid signed hash value"
        );

        let value = self
            .signature
            .first()
            .ok_or_else(|| format_err!(CryptoOperation, "signature without value"))?;
        crate::crypto::rsa::verify(key, self.config.hash_alg, &hash, value)
    }

    /// Verifies a certification signature binding `id` to `key`, made by `signer`.
    pub fn verify_certification(
        &self,
        signer: &RsaPublicKey,
        key: &PublicKey,
        id: &UserId,
    ) -> Result<()> {
        ensure!(
            self.is_certification(),
            CryptoOperation,
            "{:?} is not a certification",
            self.typ()
        );
        debug!("verifying certification {:?} for {}", self.typ(), key.key_id());

        let mut hasher = self.config.new_hasher()?;
        hash_certification_data(&mut hasher, key, id)?;

        self.verify_hasher(signer, hasher)
    }
}

impl Serialize for Signature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[
            4,
            self.config.typ.into(),
            self.config.pub_alg.into(),
            self.config.hash_alg.into(),
        ])?;

        // hashed subpackets
        writer.write_u16::<BigEndian>(u16::try_from(self.config.hashed_subpackets.write_len())?)?;
        self.config.hashed_subpackets.to_writer(writer)?;

        // unhashed subpackets
        writer
            .write_u16::<BigEndian>(u16::try_from(self.config.unhashed_subpackets.write_len())?)?;
        self.config.unhashed_subpackets.to_writer(writer)?;

        // signed hash value
        writer.write_all(&self.signed_hash_value)?;

        // the actual signature
        self.signature.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        4 + 2
            + self.config.hashed_subpackets.write_len()
            + 2
            + self.config.unhashed_subpackets.write_len()
            + 2
            + self.signature.write_len()
    }
}

impl PacketTrait for Signature {
    fn tag(&self) -> Tag {
        Tag::Signature
    }
}
