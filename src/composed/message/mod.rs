//! Encrypted and signed messages.
//!
//! The layout produced and accepted is
//!
//! ```text
//! PKESK, SEIPD( CompressedData( OnePassSignature, LiteralData, Signature ) )
//! ```
//!
//! where the compressed layer is optional on read, and the one-pass signed
//! part may be a bare literal data packet.

mod decoder;
mod encoder;

use chrono::{DateTime, Utc};

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{ensure, Result};
use crate::packet::{DEFAULT_PARTIAL_CHUNK_SIZE, MAX_PARTIAL_LEN};
use crate::types::{CompressionAlgorithm, KeyId};

use super::SignedPublicKey;

pub use self::decoder::MessageDecoder;
pub use self::encoder::MessageEncoder;
pub(crate) use self::encoder::encrypt_and_sign;

/// Policy for writing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptOptions {
    sym_alg: SymmetricKeyAlgorithm,
    hash_alg: HashAlgorithm,
    compression: CompressionAlgorithm,
    chunk_size: u32,
    armor: bool,
    file_name: String,
    modification_time: Option<DateTime<Utc>>,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        EncryptOptions {
            sym_alg: SymmetricKeyAlgorithm::AES256,
            hash_alg: HashAlgorithm::Sha256,
            compression: CompressionAlgorithm::ZIP,
            chunk_size: DEFAULT_PARTIAL_CHUNK_SIZE,
            armor: false,
            file_name: String::new(),
            modification_time: None,
        }
    }
}

impl EncryptOptions {
    /// Cipher for the session key.
    pub fn sym_alg(mut self, sym_alg: SymmetricKeyAlgorithm) -> Self {
        self.sym_alg = sym_alg;
        self
    }

    /// Hash for the message signature.
    pub fn hash_alg(mut self, hash_alg: HashAlgorithm) -> Self {
        self.hash_alg = hash_alg;
        self
    }

    /// Algorithm for the compressed data layer.
    pub fn compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    /// Size of the partial body chunks and of the reads from the input.
    pub fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Wrap the output in ASCII armor.
    pub fn armor(mut self, armor: bool) -> Self {
        self.armor = armor;
        self
    }

    /// File name recorded in the literal data packet.
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Modification time recorded in the literal data packet, defaults to now.
    pub fn modification_time(mut self, modification_time: DateTime<Utc>) -> Self {
        self.modification_time = Some(modification_time);
        self
    }

    /// Whether the output is wrapped in ASCII armor.
    pub fn is_armored(&self) -> bool {
        self.armor
    }

    pub(crate) fn chunk_len(&self) -> usize {
        self.chunk_size as usize
    }

    /// Fails on options that can not produce a message, before anything is written.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sym_alg.is_supported(),
            InvalidParameters,
            "symmetric algorithm {} is not supported",
            self.sym_alg
        );
        ensure!(
            self.hash_alg.digest_size().is_some(),
            InvalidParameters,
            "hash algorithm {} is not supported",
            self.hash_alg
        );
        ensure!(
            matches!(
                self.compression,
                CompressionAlgorithm::Uncompressed
                    | CompressionAlgorithm::ZIP
                    | CompressionAlgorithm::ZLIB
            ),
            InvalidParameters,
            "compression algorithm {} is not supported",
            self.compression
        );
        ensure!(
            (512..=MAX_PARTIAL_LEN).contains(&self.chunk_size),
            InvalidParameters,
            "chunk size must be at least 512 and at most {}",
            MAX_PARTIAL_LEN
        );
        ensure!(
            self.chunk_size.is_power_of_two(),
            InvalidParameters,
            "chunk size must be a power of two"
        );
        ensure!(
            self.file_name.len() <= 255,
            InvalidParameters,
            "file name too long"
        );

        Ok(())
    }
}

/// Policy for reading a message.
#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    verification_keys: Vec<SignedPublicKey>,
    require_valid_signature: bool,
}

impl DecryptOptions {
    /// Additional keys to look up the signer in, after the secret key ring.
    pub fn verification_keys(mut self, keys: Vec<SignedPublicKey>) -> Self {
        self.verification_keys = keys;
        self
    }

    /// Fail with [`crate::errors::Error::CryptoOperation`] unless the signature verifies.
    pub fn require_valid_signature(mut self, require: bool) -> Self {
        self.require_valid_signature = require;
        self
    }
}

/// Outcome of checking the message signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Verification {
    /// The signature matches the content and a known signer key.
    #[display("verified")]
    Verified,
    /// A signature was present but does not match.
    #[display("failed")]
    Failed,
    /// Unsigned, or the signer key is not available.
    #[display("unknown")]
    Unknown,
}

/// What was learned while decrypting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionResult {
    pub verification: Verification,
    /// File name from the literal data packet.
    pub file_name: String,
    pub modification_time: DateTime<Utc>,
    /// Issuer of the signature, if the message was signed.
    pub signer: Option<KeyId>,
    /// The signer's user id, when the signature names one.
    pub signer_user_id: Option<String>,
}

impl DecryptionResult {
    pub fn is_verified(&self) -> bool {
        self.verification == Verification::Verified
    }
}
