use aes::{Aes128, Aes192, Aes256};
use cast5::Cast5;
use cfb_mode::{BufDecryptor, BufEncryptor};
use cipher::{BlockCipher, BlockEncryptMut, KeyInit, KeyIvInit};
use des::TdesEde3;
use num_enum::{FromPrimitive, IntoPrimitive};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::errors::{bail, Result};

mod decryptor;
mod encryptor;

pub use self::decryptor::ProtectedDataReader;
pub use self::encryptor::ProtectedDataWriter;

/// Length of the modification detection code packet: tag, length and SHA-1.
pub(crate) const MDC_LEN: usize = 22;

/// Available symmetric key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-9.2>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive, derive_more::Display)]
#[repr(u8)]
pub enum SymmetricKeyAlgorithm {
    /// Plaintext or unencrypted data
    Plaintext = 0,
    /// IDEA
    IDEA = 1,
    /// Triple-DES
    TripleDES = 2,
    /// CAST5
    CAST5 = 3,
    /// Blowfish
    Blowfish = 4,
    /// AES with 128-bit key
    AES128 = 7,
    /// AES with 192-bit key
    AES192 = 8,
    /// AES with 256-bit key
    AES256 = 9,
    /// Twofish with 256-bit key
    Twofish = 10,

    #[num_enum(catch_all)]
    #[display("Other({_0})")]
    Other(u8),
}

impl Default for SymmetricKeyAlgorithm {
    fn default() -> Self {
        Self::AES256
    }
}

/// Running CFB encryption, erased over the block cipher.
pub(crate) trait CfbEncrypt {
    fn encrypt(&mut self, data: &mut [u8]);
}

/// Running CFB decryption, erased over the block cipher.
pub(crate) trait CfbDecrypt {
    fn decrypt(&mut self, data: &mut [u8]);
}

impl<C: BlockEncryptMut + BlockCipher> CfbEncrypt for BufEncryptor<C> {
    fn encrypt(&mut self, data: &mut [u8]) {
        BufEncryptor::encrypt(self, data)
    }
}

impl<C: BlockEncryptMut + BlockCipher> CfbDecrypt for BufDecryptor<C> {
    fn decrypt(&mut self, data: &mut [u8]) {
        BufDecryptor::decrypt(self, data)
    }
}

fn new_encryptor<C>(key: &[u8], iv: &[u8]) -> Result<Box<dyn CfbEncrypt>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit + 'static,
{
    Ok(Box::new(BufEncryptor::<C>::new_from_slices(key, iv)?))
}

fn new_decryptor<C>(key: &[u8], iv: &[u8]) -> Result<Box<dyn CfbDecrypt>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit + 'static,
{
    Ok(Box::new(BufDecryptor::<C>::new_from_slices(key, iv)?))
}

impl SymmetricKeyAlgorithm {
    /// The size of a single block in bytes.
    /// Based on <https://github.com/gpg/libgcrypt/tree/master/cipher>
    pub fn block_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::Plaintext => 0,
            SymmetricKeyAlgorithm::IDEA
            | SymmetricKeyAlgorithm::TripleDES
            | SymmetricKeyAlgorithm::CAST5
            | SymmetricKeyAlgorithm::Blowfish => 8,
            SymmetricKeyAlgorithm::AES128
            | SymmetricKeyAlgorithm::AES192
            | SymmetricKeyAlgorithm::AES256
            | SymmetricKeyAlgorithm::Twofish => 16,
            SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// The size of a single key in bytes.
    /// Based on <https://github.com/gpg/libgcrypt/tree/master/cipher>
    pub const fn key_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::Plaintext => 0,
            SymmetricKeyAlgorithm::IDEA | SymmetricKeyAlgorithm::CAST5 => 16,
            SymmetricKeyAlgorithm::TripleDES => 24,
            SymmetricKeyAlgorithm::Blowfish | SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 24,
            SymmetricKeyAlgorithm::AES256 | SymmetricKeyAlgorithm::Twofish => 32,
            SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// Whether this crate can run the cipher.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            SymmetricKeyAlgorithm::TripleDES
                | SymmetricKeyAlgorithm::CAST5
                | SymmetricKeyAlgorithm::AES128
                | SymmetricKeyAlgorithm::AES192
                | SymmetricKeyAlgorithm::AES256
        )
    }

    pub(crate) fn cfb_encryptor(self, key: &[u8], iv: &[u8]) -> Result<Box<dyn CfbEncrypt>> {
        match self {
            SymmetricKeyAlgorithm::TripleDES => new_encryptor::<TdesEde3>(key, iv),
            SymmetricKeyAlgorithm::CAST5 => new_encryptor::<Cast5>(key, iv),
            SymmetricKeyAlgorithm::AES128 => new_encryptor::<Aes128>(key, iv),
            SymmetricKeyAlgorithm::AES192 => new_encryptor::<Aes192>(key, iv),
            SymmetricKeyAlgorithm::AES256 => new_encryptor::<Aes256>(key, iv),
            _ => bail!(CryptoOperation, "symmetric algorithm {} is unsupported", self),
        }
    }

    pub(crate) fn cfb_decryptor(self, key: &[u8], iv: &[u8]) -> Result<Box<dyn CfbDecrypt>> {
        match self {
            SymmetricKeyAlgorithm::TripleDES => new_decryptor::<TdesEde3>(key, iv),
            SymmetricKeyAlgorithm::CAST5 => new_decryptor::<Cast5>(key, iv),
            SymmetricKeyAlgorithm::AES128 => new_decryptor::<Aes128>(key, iv),
            SymmetricKeyAlgorithm::AES192 => new_decryptor::<Aes192>(key, iv),
            SymmetricKeyAlgorithm::AES256 => new_decryptor::<Aes256>(key, iv),
            _ => bail!(CryptoOperation, "symmetric algorithm {} is unsupported", self),
        }
    }

    /// Encrypt the data in place using plain CFB mode with the given IV.
    pub fn encrypt_with_iv(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        self.cfb_encryptor(key, iv)?.encrypt(data);
        Ok(())
    }

    /// Decrypt the data in place using plain CFB mode with the given IV.
    pub fn decrypt_with_iv(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        self.cfb_decryptor(key, iv)?.decrypt(data);
        Ok(())
    }

    /// Generate a new session key.
    pub fn new_session_key<R: Rng + CryptoRng>(self, rng: &mut R) -> Zeroizing<Vec<u8>> {
        let mut session_key = Zeroizing::new(vec![0u8; self.key_size()]);
        rng.fill_bytes(&mut session_key);
        session_key
    }
}
