use chrono::{DateTime, Utc};
use digest::DynDigest;
use log::debug;
use rsa::RsaPrivateKey;

use super::{Signature, SignatureType, Subpacket, SubpacketData};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{ensure, Result};
use crate::packet::{PublicKey, UserId};
use crate::ser::Serialize;
use crate::types::KeyId;

/// Everything that goes into a v4 signature, except the signature itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureConfig {
    pub typ: SignatureType,
    pub pub_alg: PublicKeyAlgorithm,
    pub hash_alg: HashAlgorithm,

    pub hashed_subpackets: Vec<Subpacket>,
    pub unhashed_subpackets: Vec<Subpacket>,
}

impl SignatureConfig {
    pub fn v4(typ: SignatureType, pub_alg: PublicKeyAlgorithm, hash_alg: HashAlgorithm) -> Self {
        SignatureConfig {
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets: Vec::new(),
            unhashed_subpackets: Vec::new(),
        }
    }

    /// A fresh hasher for this signature, data is fed into it before calling
    /// [`Self::sign_hasher`] or [`Signature::verify_hasher`].
    pub fn new_hasher(&self) -> Result<Box<dyn DynDigest>> {
        self.hash_alg.new_hasher()
    }

    /// Signs whatever was already fed into `hasher`.
    pub fn sign_hasher(self, key: &RsaPrivateKey, hasher: Box<dyn DynDigest>) -> Result<Signature> {
        let hash = self.finish_hash(hasher)?;
        let signed_hash_value = [hash[0], hash[1]];
        let signature = crate::crypto::rsa::sign(key, self.hash_alg, &hash)?;

        Ok(Signature::from_config(self, signed_hash_value, vec![signature]))
    }

    /// Create a certification binding `id` to `key`.
    pub fn sign_certification(
        self,
        signer: &RsaPrivateKey,
        key: &PublicKey,
        id: &UserId,
    ) -> Result<Signature> {
        ensure!(
            self.is_certification(),
            InvalidParameters,
            "can not sign non certification as certification"
        );
        debug!("signing certification {:?}", self.typ);

        let mut hasher = self.new_hasher()?;
        hash_certification_data(&mut hasher, key, id)?;

        self.sign_hasher(signer, hasher)
    }

    /// Appends the hashed part of the signature and the trailer, then finalizes.
    pub(crate) fn finish_hash(&self, mut hasher: Box<dyn DynDigest>) -> Result<Box<[u8]>> {
        let len = self.hash_signature_data(&mut *hasher)?;
        hasher.update(&self.trailer(len)?);

        Ok(hasher.finalize())
    }

    /// Calculate the serialized version of this packet, but only the part relevant for hashing.
    pub fn hash_signature_data(&self, hasher: &mut dyn DynDigest) -> Result<usize> {
        let hashed_len = u16::try_from(self.hashed_subpackets.write_len())?;

        let mut res = Vec::with_capacity(6 + usize::from(hashed_len));
        res.extend_from_slice(&[
            // version
            4,
            // type
            self.typ.into(),
            // public algorithm
            self.pub_alg.into(),
            // hash algorithm
            self.hash_alg.into(),
        ]);
        res.extend_from_slice(&hashed_len.to_be_bytes());
        self.hashed_subpackets.to_writer(&mut res)?;

        hasher.update(&res);

        Ok(res.len())
    }

    /// The v4 trailer: version, `0xFF` and the length of the hashed data.
    pub fn trailer(&self, len: usize) -> Result<[u8; 6]> {
        let mut trailer = [0x04, 0xFF, 0, 0, 0, 0];
        trailer[2..].copy_from_slice(&u32::try_from(len)?.to_be_bytes());
        Ok(trailer)
    }

    /// Returns an iterator over all subpackets of this signature.
    pub fn subpackets(&self) -> impl Iterator<Item = &Subpacket> {
        self.hashed_subpackets
            .iter()
            .chain(self.unhashed_subpackets.iter())
    }

    /// Returns if the signature is a certification or not.
    pub fn is_certification(&self) -> bool {
        matches!(
            self.typ,
            SignatureType::CertGeneric
                | SignatureType::CertPersona
                | SignatureType::CertCasual
                | SignatureType::CertPositive
        )
    }

    pub fn created(&self) -> Option<&DateTime<Utc>> {
        self.hashed_subpackets.iter().find_map(|p| match &p.data {
            SubpacketData::SignatureCreationTime(d) => Some(d),
            _ => None,
        })
    }

    pub fn issuer(&self) -> Option<&KeyId> {
        self.subpackets().find_map(|p| match &p.data {
            SubpacketData::Issuer(id) => Some(id),
            _ => None,
        })
    }
}

/// Key, then user id, both in their hashing forms.
pub(crate) fn hash_certification_data(
    hasher: &mut Box<dyn DynDigest>,
    key: &PublicKey,
    id: &UserId,
) -> Result<()> {
    let mut buf = Vec::with_capacity(key.write_len() + id.write_len() + 8);
    key.serialize_for_hashing(&mut buf)?;
    id.serialize_for_hashing(&mut buf)?;
    hasher.update(&buf);

    Ok(())
}
