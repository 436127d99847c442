use std::io::{self, Write};

use log::debug;
use rand::{CryptoRng, Rng};
use sha1::{Digest, Sha1};

use super::{CfbEncrypt, SymmetricKeyAlgorithm, MDC_LEN};
use crate::errors::{ensure, Result};

const BUFFER_SIZE: usize = 1024 * 8;

/// Encrypts a stream in OpenPGP CFB mode, as used by the
/// Symmetrically Encrypted Integrity Protected Data packet (v1).
///
/// The random prefix is written on construction, [`Self::finish`] appends the
/// modification detection code and hands back the inner writer.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.13>
pub struct ProtectedDataWriter<W: Write> {
    encryptor: Box<dyn CfbEncrypt>,
    hasher: Sha1,
    inner: W,
    buffer: Vec<u8>,
}

impl<W: Write> ProtectedDataWriter<W> {
    pub fn new<R: CryptoRng + Rng>(
        rng: &mut R,
        alg: SymmetricKeyAlgorithm,
        key: &[u8],
        mut inner: W,
    ) -> Result<Self> {
        ensure!(
            alg.is_supported(),
            CryptoOperation,
            "symmetric algorithm {} is unsupported",
            alg
        );
        let bs = alg.block_size();

        // random block, with the last two octets repeated as quick check
        let mut prefix = vec![0u8; bs + 2];
        rng.fill_bytes(&mut prefix[..bs]);
        prefix[bs] = prefix[bs - 2];
        prefix[bs + 1] = prefix[bs - 1];

        let mut hasher = Sha1::new();
        hasher.update(&prefix);

        let iv = vec![0u8; bs];
        let mut encryptor = alg.cfb_encryptor(key, &iv)?;
        encryptor.encrypt(&mut prefix);
        inner.write_all(&prefix)?;
        debug!("encrypting with {alg}, prefix {} bytes", prefix.len());

        Ok(ProtectedDataWriter {
            encryptor,
            hasher,
            inner,
            buffer: Vec::with_capacity(BUFFER_SIZE),
        })
    }

    /// Writes the MDC packet and returns the inner writer.
    pub fn finish(self) -> Result<W> {
        let ProtectedDataWriter {
            mut encryptor,
            mut hasher,
            mut inner,
            ..
        } = self;

        let mut mdc = [0u8; MDC_LEN];
        mdc[0] = 0xD3;
        mdc[1] = 0x14;
        hasher.update(&mdc[..2]);
        mdc[2..].copy_from_slice(&hasher.finalize());

        encryptor.encrypt(&mut mdc);
        inner.write_all(&mdc)?;

        Ok(inner)
    }
}

impl<W: Write> Write for ProtectedDataWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len().min(BUFFER_SIZE);
        let data = &buf[..len];
        self.hasher.update(data);

        self.buffer.clear();
        self.buffer.extend_from_slice(data);
        self.encryptor.encrypt(&mut self.buffer);
        self.inner.write_all(&self.buffer)?;

        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
