use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use log::debug;
use rand::{CryptoRng, Rng};
use rsa::traits::PrivateKeyParts;
use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::checksum;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{bail, ensure, format_err, Error, Result};
use crate::packet::{PacketTrait, PublicKey, PublicParams};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{Mpi, StringToKey, Tag};

/// Decrypted RSA secret parameters.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.3>
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PlainSecretParams {
    d: Mpi,
    p: Mpi,
    q: Mpi,
    u: Mpi,
}

impl PlainSecretParams {
    /// Extracts the parameters from an RSA key, ordering the primes so that `p < q`.
    pub fn from_rsa(key: &RsaPrivateKey) -> Result<Self> {
        let primes = key.primes();
        ensure!(
            primes.len() == 2,
            InvalidParameters,
            "only two prime RSA keys are supported"
        );
        let (p, q) = if primes[0] < primes[1] {
            (&primes[0], &primes[1])
        } else {
            (&primes[1], &primes[0])
        };
        let u = crate::crypto::rsa::crt_coefficient(p, q)?;

        Ok(PlainSecretParams {
            d: Mpi::from(key.d()),
            p: Mpi::from(p),
            q: Mpi::from(q),
            u: Mpi::from(&u),
        })
    }

    fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let d = Mpi::from_buf(&mut i)?;
        let p = Mpi::from_buf(&mut i)?;
        let q = Mpi::from_buf(&mut i)?;
        let u = Mpi::from_buf(&mut i)?;

        Ok(PlainSecretParams { d, p, q, u })
    }

    /// Combines these with the public parameters into a usable key.
    pub fn to_rsa(&self, public: &PublicParams) -> Result<RsaPrivateKey> {
        match public {
            PublicParams::RSA { n, e } => {
                crate::crypto::rsa::private_key(n, e, &self.d, &self.p, &self.q)
            }
            PublicParams::Unknown { .. } => {
                bail!(InvalidKeyMaterial, "secret parameters do not match the key")
            }
        }
    }

    fn to_bytes_zeroizing(&self) -> Result<Zeroizing<Vec<u8>>> {
        let mut buf = Zeroizing::new(Vec::with_capacity(self.write_len()));
        self.to_writer(&mut *buf)?;
        Ok(buf)
    }
}

impl Serialize for PlainSecretParams {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.d.to_writer(writer)?;
        self.p.to_writer(writer)?;
        self.q.to_writer(writer)?;
        self.u.to_writer(writer)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.d.write_len() + self.p.write_len() + self.q.write_len() + self.u.write_len()
    }
}

impl std::fmt::Debug for PlainSecretParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlainSecretParams([..])")
    }
}

/// How encrypted secret parameters are checked after decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S2kUsage {
    /// Usage `254`, a SHA-1 hash follows the parameters.
    Sha1,
    /// Usage `255`, legacy two octet checksum.
    Checksum,
}

impl From<S2kUsage> for u8 {
    fn from(usage: S2kUsage) -> u8 {
        match usage {
            S2kUsage::Sha1 => 254,
            S2kUsage::Checksum => 255,
        }
    }
}

/// Passphrase protected secret parameters.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct EncryptedSecretParams {
    usage: S2kUsage,
    sym_alg: SymmetricKeyAlgorithm,
    s2k: StringToKey,
    #[debug("{}", hex::encode(iv))]
    iv: Bytes,
    #[debug("{} bytes", data.len())]
    data: Bytes,
}

/// Secret key material, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretParams {
    /// Unprotected, usage `0`.
    Plain(PlainSecretParams),
    Encrypted(EncryptedSecretParams),
    /// Material of algorithms this crate does not implement, kept verbatim.
    Unknown(Bytes),
}

/// Secret Key Packet, version 4.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.3>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKey {
    details: PublicKey,
    secret_params: SecretParams,
}

impl SecretKey {
    /// Protects `plain` with `passphrase` (usage `254`, iterated and salted S2K, CFB).
    pub fn new_protected<R: CryptoRng + Rng>(
        rng: &mut R,
        details: PublicKey,
        plain: &PlainSecretParams,
        passphrase: &[u8],
        sym_alg: SymmetricKeyAlgorithm,
        s2k: StringToKey,
    ) -> Result<Self> {
        ensure!(
            sym_alg.is_supported(),
            InvalidParameters,
            "symmetric algorithm {} is unsupported",
            sym_alg
        );
        let key = s2k.derive_key(passphrase, sym_alg.key_size())?;

        let mut iv = vec![0u8; sym_alg.block_size()];
        rng.fill_bytes(&mut iv);

        let mut data = plain.to_bytes_zeroizing()?;
        let digest = Sha1::digest(&data[..]);
        data.extend_from_slice(&digest);
        sym_alg.encrypt_with_iv(&key, &iv, &mut data)?;

        Ok(SecretKey {
            details,
            secret_params: SecretParams::Encrypted(EncryptedSecretParams {
                usage: S2kUsage::Sha1,
                sym_alg,
                s2k,
                iv: iv.into(),
                data: Bytes::copy_from_slice(&data),
            }),
        })
    }

    /// Parses a secret key packet body.
    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let details = PublicKey::from_buf(&mut i)?;
        if !details.algorithm().is_rsa() {
            return Ok(SecretKey {
                details,
                secret_params: SecretParams::Unknown(i.rest()),
            });
        }

        let usage = i.read_u8()?;
        let secret_params = match usage {
            0 => {
                let mut body = i.rest();
                ensure!(
                    body.len() >= 2,
                    InvalidKeyMaterial,
                    "unprotected secret key too short"
                );
                let sum = body.split_off(body.len() - 2);
                checksum::simple(&sum, &body)
                    .map_err(|_| format_err!(InvalidKeyMaterial, "secret key checksum mismatch"))?;
                SecretParams::Plain(PlainSecretParams::from_buf(body)?)
            }
            254 | 255 => {
                let sym_alg = SymmetricKeyAlgorithm::from(i.read_u8()?);
                ensure!(
                    sym_alg.is_supported(),
                    InvalidKeyMaterial,
                    "secret key protected with unsupported cipher {}",
                    sym_alg
                );
                let s2k = StringToKey::from_buf(&mut i)?;
                let iv = i.read_take(sym_alg.block_size())?;

                SecretParams::Encrypted(EncryptedSecretParams {
                    usage: if usage == 254 {
                        S2kUsage::Sha1
                    } else {
                        S2kUsage::Checksum
                    },
                    sym_alg,
                    s2k,
                    iv,
                    data: i.rest(),
                })
            }
            _ => bail!(
                InvalidKeyMaterial,
                "unsupported secret key protection {}",
                usage
            ),
        };

        Ok(SecretKey {
            details,
            secret_params,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.details
    }

    pub fn secret_params(&self) -> &SecretParams {
        &self.secret_params
    }

    /// Whether a passphrase is needed to use this key.
    pub fn is_encrypted(&self) -> bool {
        matches!(self.secret_params, SecretParams::Encrypted(_))
    }

    /// Decrypts the secret parameters.
    ///
    /// A wrong passphrase surfaces as [`Error::PassphraseMismatch`], anything
    /// structurally wrong with the stored material as [`Error::InvalidKeyMaterial`].
    pub fn unlock(&self, passphrase: &[u8]) -> Result<RsaPrivateKey> {
        let plain = match &self.secret_params {
            SecretParams::Plain(plain) => plain.clone(),
            SecretParams::Encrypted(enc) => self.decrypt_params(enc, passphrase)?,
            SecretParams::Unknown(_) => bail!(
                InvalidKeyMaterial,
                "secret key algorithm {} is not supported",
                self.details.algorithm()
            ),
        };

        plain.to_rsa(self.details.params())
    }

    fn decrypt_params(
        &self,
        enc: &EncryptedSecretParams,
        passphrase: &[u8],
    ) -> Result<PlainSecretParams> {
        let key = enc
            .s2k
            .derive_key(passphrase, enc.sym_alg.key_size())
            .map_err(Error::into_key_material)?;

        let mut data = Zeroizing::new(enc.data.to_vec());
        enc.sym_alg.decrypt_with_iv(&key, &enc.iv, &mut data)?;

        let mismatch = || Error::PassphraseMismatch {
            key_id: self.details.key_id(),
        };
        let params_len = match enc.usage {
            S2kUsage::Sha1 => {
                ensure!(
                    data.len() >= 20,
                    InvalidKeyMaterial,
                    "encrypted secret key too short"
                );
                let split = data.len() - 20;
                if Sha1::digest(&data[..split])[..] != data[split..] {
                    return Err(mismatch());
                }
                split
            }
            S2kUsage::Checksum => {
                ensure!(
                    data.len() >= 2,
                    InvalidKeyMaterial,
                    "encrypted secret key too short"
                );
                let split = data.len() - 2;
                checksum::simple(&data[split..], &data[..split]).map_err(|_| mismatch())?;
                split
            }
        };
        debug!("unlocked secret key {}", self.details.key_id());

        PlainSecretParams::from_buf(&data[..params_len]).map_err(Error::into_key_material)
    }
}

impl Serialize for SecretKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.details.to_writer(writer)?;

        match &self.secret_params {
            SecretParams::Plain(plain) => {
                writer.write_u8(0)?;
                let data = plain.to_bytes_zeroizing()?;
                writer.write_all(&data)?;
                writer.write_u16::<BigEndian>(checksum::calculate_simple(&data))?;
            }
            SecretParams::Encrypted(enc) => {
                writer.write_all(&[enc.usage.into(), enc.sym_alg.into()])?;
                enc.s2k.to_writer(writer)?;
                writer.write_all(&enc.iv)?;
                writer.write_all(&enc.data)?;
            }
            SecretParams::Unknown(data) => {
                writer.write_all(data)?;
            }
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        let secret_len = match &self.secret_params {
            SecretParams::Plain(plain) => 1 + plain.write_len() + 2,
            SecretParams::Encrypted(enc) => {
                2 + enc.s2k.write_len() + enc.iv.len() + enc.data.len()
            }
            SecretParams::Unknown(data) => data.len(),
        };
        self.details.write_len() + secret_len
    }
}

impl PacketTrait for SecretKey {
    fn tag(&self) -> Tag {
        Tag::SecretKey
    }
}
