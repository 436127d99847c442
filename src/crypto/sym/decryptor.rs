use std::io::{self, BufRead, Read};

use bytes::{Buf, BytesMut};
use log::debug;
use sha1::{Digest, Sha1};

use super::{CfbDecrypt, SymmetricKeyAlgorithm, MDC_LEN};
use crate::errors::{ensure, format_err, Result};
use crate::util::fill_buffer;

const BUFFER_SIZE: usize = 1024 * 8;

/// Decrypts a Symmetrically Encrypted Integrity Protected Data (v1) stream.
///
/// Plaintext is released as soon as it is known not to be part of the
/// trailing modification detection code. The MDC is checked when the
/// ciphertext is exhausted, a mismatch surfaces as
/// [`crate::errors::Error::CryptoOperation`] from the final read.
pub struct ProtectedDataReader<R: BufRead> {
    decryptor: Box<dyn CfbDecrypt>,
    hasher: Option<Sha1>,
    source: R,
    /// Decrypted bytes, not yet handed out.
    buffer: BytesMut,
    /// How many bytes at the front of `buffer` are hashed and may be released.
    available: usize,
    done: bool,
}

impl<R: BufRead> ProtectedDataReader<R> {
    pub fn new(alg: SymmetricKeyAlgorithm, key: &[u8], mut source: R) -> Result<Self> {
        ensure!(
            alg.is_supported(),
            CryptoOperation,
            "symmetric algorithm {} is unsupported",
            alg
        );
        let bs = alg.block_size();
        let iv = vec![0u8; bs];
        let mut decryptor = alg.cfb_decryptor(key, &iv)?;

        let mut prefix = vec![0u8; bs + 2];
        let read = fill_buffer(&mut source, &mut prefix)?;
        ensure!(
            read == prefix.len(),
            MalformedMessage,
            "encrypted data too short for its prefix"
        );
        decryptor.decrypt(&mut prefix);

        // The quick check octets are deliberately not validated, only the MDC decides.
        let mut hasher = Sha1::new();
        hasher.update(&prefix);
        debug!("decrypting with {alg}");

        Ok(ProtectedDataReader {
            decryptor,
            hasher: Some(hasher),
            source,
            buffer: BytesMut::with_capacity(BUFFER_SIZE + MDC_LEN),
            available: 0,
            done: false,
        })
    }

    /// Returns the underlying ciphertext reader.
    pub fn into_inner(self) -> R {
        self.source
    }

    /// True once the whole stream was read and the MDC verified.
    pub fn is_done(&self) -> bool {
        self.done && self.available == 0
    }

    fn fill_inner(&mut self) -> Result<()> {
        while !self.done && self.available == 0 {
            let start = self.buffer.len();
            self.buffer.resize(start + BUFFER_SIZE, 0);
            let read = fill_buffer(&mut self.source, &mut self.buffer[start..])?;
            self.buffer.truncate(start + read);
            self.decryptor.decrypt(&mut self.buffer[start..]);

            if read < BUFFER_SIZE {
                self.finish()?;
            } else {
                let releasable = self.buffer.len() - MDC_LEN;
                self.hash_until(releasable);
            }
        }

        Ok(())
    }

    fn hash_until(&mut self, end: usize) {
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&self.buffer[self.available..end]);
        }
        self.available = end;
    }

    fn finish(&mut self) -> Result<()> {
        ensure!(
            self.buffer.len() >= MDC_LEN,
            MalformedMessage,
            "encrypted data too short for its modification detection code"
        );
        let data_len = self.buffer.len() - MDC_LEN;
        self.hash_until(data_len);

        let mdc = self.buffer.split_off(data_len);
        ensure!(
            mdc[0] == 0xD3 && mdc[1] == 0x14,
            CryptoOperation,
            "invalid modification detection code header"
        );

        let mut hasher = self
            .hasher
            .take()
            .ok_or_else(|| format_err!(CryptoOperation, "modification detection code already checked"))?;
        hasher.update(&mdc[..2]);
        let checksum = hasher.finalize();
        ensure!(
            checksum[..] == mdc[2..],
            CryptoOperation,
            "modification detection code mismatch"
        );

        debug!("modification detection code verified");
        self.done = true;
        Ok(())
    }
}

impl<R: BufRead> BufRead for ProtectedDataReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.fill_inner()?;
        Ok(&self.buffer[..self.available])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.available);
        self.buffer.advance(amt);
        self.available -= amt;
    }
}

impl<R: BufRead> Read for ProtectedDataReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}
