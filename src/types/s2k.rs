use std::io;

use bytes::Buf;
use num_enum::{FromPrimitive, IntoPrimitive};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{bail, format_err, Result};
use crate::parsing::BufParsing;
use crate::ser::Serialize;

const EXPBIAS: u32 = 6;

/// Coded iteration count used for newly protected keys (16 MiB of hashing).
pub const DEFAULT_ITER_COUNT: u8 = 224;

/// Available String-To-Key types
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
pub enum StringToKeyType {
    Simple = 0,
    Salted = 1,
    Reserved = 2,
    IteratedAndSalted = 3,
    #[num_enum(catch_all)]
    Other(u8),
}

/// String-To-Key specifier.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-3.7>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringToKey {
    typ: StringToKeyType,
    hash: HashAlgorithm,
    salt: Option<[u8; 8]>,
    count: Option<u8>,
}

impl StringToKey {
    pub fn new_iterated<R: CryptoRng + Rng>(rng: &mut R, hash: HashAlgorithm, count: u8) -> Self {
        let mut salt = [0u8; 8];
        rng.fill(&mut salt[..]);

        StringToKey {
            typ: StringToKeyType::IteratedAndSalted,
            hash,
            salt: Some(salt),
            count: Some(count),
        }
    }

    pub fn typ(&self) -> StringToKeyType {
        self.typ
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    /// Converts a coded count into the count.
    /// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-3.7.1.3>
    pub fn count(&self) -> Option<usize> {
        self.count
            .map(|c| ((16u32 + u32::from(c & 15)) << (u32::from(c >> 4) + EXPBIAS)) as usize)
    }

    /// Derives `key_size` bytes of key material from the passphrase.
    ///
    /// When the key is longer than the digest, additional hash contexts are
    /// run, each preloaded with one more zero octet than the previous.
    pub fn derive_key(&self, passphrase: &[u8], key_size: usize) -> Result<Zeroizing<Vec<u8>>> {
        let digest_size = self
            .hash
            .digest_size()
            .ok_or_else(|| format_err!(InvalidKeyMaterial, "unsupported s2k hash {}", self.hash))?;
        let rounds = key_size.div_ceil(digest_size);
        let mut key = Zeroizing::new(Vec::with_capacity(rounds * digest_size));

        for round in 0..rounds {
            let mut hasher = self.hash.new_hasher()?;
            hasher.update(&vec![0u8; round]);

            match (self.typ, self.salt.as_ref()) {
                (StringToKeyType::Simple, _) => hasher.update(passphrase),
                (StringToKeyType::Salted, Some(salt)) => {
                    hasher.update(salt);
                    hasher.update(passphrase);
                }
                (StringToKeyType::IteratedAndSalted, Some(salt)) => {
                    let mut data = Zeroizing::new(Vec::with_capacity(salt.len() + passphrase.len()));
                    data.extend_from_slice(salt);
                    data.extend_from_slice(passphrase);

                    // the count is the number of octets hashed, but at least one full copy
                    let mut remaining = self.count().unwrap_or_default().max(data.len());
                    let block = Zeroizing::new(data.repeat((4096 / data.len()).max(1)));
                    while remaining >= block.len() {
                        hasher.update(&block);
                        remaining -= block.len();
                    }
                    hasher.update(&block[..remaining]);
                }
                (typ, _) => bail!(InvalidKeyMaterial, "unsupported s2k type {:?}", typ),
            }

            key.extend_from_slice(&hasher.finalize());
        }
        key.truncate(key_size);

        Ok(key)
    }

    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let typ = StringToKeyType::from(i.read_u8()?);
        let hash = HashAlgorithm::from(i.read_u8()?);

        let (salt, count) = match typ {
            StringToKeyType::Simple => (None, None),
            StringToKeyType::Salted => (Some(i.read_array::<8>()?), None),
            StringToKeyType::IteratedAndSalted => {
                (Some(i.read_array::<8>()?), Some(i.read_u8()?))
            }
            _ => bail!(InvalidKeyMaterial, "unsupported s2k type {:?}", typ),
        };

        Ok(StringToKey {
            typ,
            hash,
            salt,
            count,
        })
    }
}

impl Serialize for StringToKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.typ.into(), self.hash.into()])?;

        if let Some(ref salt) = self.salt {
            writer.write_all(salt)?;
        }

        if let Some(count) = self.count {
            writer.write_all(&[count])?;
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        2 + self.salt.map(|s| s.len()).unwrap_or_default() + usize::from(self.count.is_some())
    }
}
