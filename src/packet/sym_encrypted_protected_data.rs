use std::io::{Read, Write};

use rand::{CryptoRng, Rng};

use crate::crypto::sym::{ProtectedDataReader, ProtectedDataWriter, SymmetricKeyAlgorithm};
use crate::errors::{ensure_eq, Result};

/// Symmetrically Encrypted Integrity Protected Data Packet, version 1.
///
/// The body is a version octet followed by OpenPGP CFB ciphertext, see
/// [`ProtectedDataWriter`] and [`ProtectedDataReader`].
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.13>
pub struct SymEncryptedProtectedData;

impl SymEncryptedProtectedData {
    const VERSION: u8 = 1;

    /// Writes the version octet and starts encrypting into `inner`.
    pub fn encryptor<R: CryptoRng + Rng, W: Write>(
        rng: &mut R,
        alg: SymmetricKeyAlgorithm,
        session_key: &[u8],
        mut inner: W,
    ) -> Result<ProtectedDataWriter<W>> {
        inner.write_all(&[Self::VERSION])?;
        ProtectedDataWriter::new(rng, alg, session_key, inner)
    }

    /// Checks the version octet and starts decrypting `body`.
    pub fn decryptor<R: std::io::BufRead>(
        alg: SymmetricKeyAlgorithm,
        session_key: &[u8],
        mut body: R,
    ) -> Result<ProtectedDataReader<R>> {
        let mut version = [0u8; 1];
        body.read_exact(&mut version)?;
        ensure_eq!(
            version[0],
            Self::VERSION,
            UnsupportedMessageType,
            "encrypted data packet version"
        );

        ProtectedDataReader::new(alg, session_key, body)
    }
}
