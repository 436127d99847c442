use std::io::{self, BufRead, Read, Write};

use flate2::bufread::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;
use log::debug;

use crate::errors::{bail, Result};
use crate::types::CompressionAlgorithm;

/// Compresses the body of a Compressed Data Packet.
///
/// The algorithm octet is written on construction.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.6>
pub enum Compressor<W: Write> {
    Uncompressed(W),
    Zip(DeflateEncoder<W>),
    Zlib(ZlibEncoder<W>),
}

impl<W: Write> Compressor<W> {
    pub fn new(alg: CompressionAlgorithm, mut inner: W) -> Result<Self> {
        let compressor = match alg {
            CompressionAlgorithm::Uncompressed => {
                inner.write_all(&[alg.into()])?;
                Compressor::Uncompressed(inner)
            }
            CompressionAlgorithm::ZIP => {
                inner.write_all(&[alg.into()])?;
                Compressor::Zip(DeflateEncoder::new(inner, Compression::default()))
            }
            CompressionAlgorithm::ZLIB => {
                inner.write_all(&[alg.into()])?;
                Compressor::Zlib(ZlibEncoder::new(inner, Compression::default()))
            }
            CompressionAlgorithm::BZip2 | CompressionAlgorithm::Other(_) => {
                bail!(InvalidParameters, "compression algorithm {:?} is not supported", alg)
            }
        };
        debug!("compressing with {:?}", alg);

        Ok(compressor)
    }

    /// Flushes the compressed stream and returns the inner writer.
    pub fn finish(self) -> Result<W> {
        let inner = match self {
            Compressor::Uncompressed(inner) => inner,
            Compressor::Zip(encoder) => encoder.finish()?,
            Compressor::Zlib(encoder) => encoder.finish()?,
        };
        Ok(inner)
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Compressor::Uncompressed(inner) => inner.write(buf),
            Compressor::Zip(encoder) => encoder.write(buf),
            Compressor::Zlib(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Compressor::Uncompressed(inner) => inner.flush(),
            Compressor::Zip(encoder) => encoder.flush(),
            Compressor::Zlib(encoder) => encoder.flush(),
        }
    }
}

/// Decompresses the body of a Compressed Data Packet.
pub enum Decompressor<R: BufRead> {
    Uncompressed(R),
    Zip(DeflateDecoder<R>),
    Zlib(ZlibDecoder<R>),
}

impl<R: BufRead> Decompressor<R> {
    /// Reads the algorithm octet and sets up the matching decoder.
    pub fn from_reader(mut source: R) -> Result<Self> {
        let mut alg = [0u8; 1];
        source.read_exact(&mut alg)?;
        let alg = CompressionAlgorithm::from(alg[0]);
        debug!("decompressing {:?}", alg);

        let decompressor = match alg {
            CompressionAlgorithm::Uncompressed => Decompressor::Uncompressed(source),
            CompressionAlgorithm::ZIP => Decompressor::Zip(DeflateDecoder::new(source)),
            CompressionAlgorithm::ZLIB => Decompressor::Zlib(ZlibDecoder::new(source)),
            CompressionAlgorithm::BZip2 | CompressionAlgorithm::Other(_) => {
                bail!(
                    UnsupportedMessageType,
                    "compression algorithm {:?} is not supported",
                    alg
                )
            }
        };

        Ok(decompressor)
    }

    pub fn into_inner(self) -> R {
        match self {
            Decompressor::Uncompressed(source) => source,
            Decompressor::Zip(decoder) => decoder.into_inner(),
            Decompressor::Zlib(decoder) => decoder.into_inner(),
        }
    }
}

impl<R: BufRead> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let res = match self {
            Decompressor::Uncompressed(source) => source.read(buf),
            Decompressor::Zip(decoder) => decoder.read(buf),
            Decompressor::Zlib(decoder) => decoder.read(buf),
        };

        // corrupt streams are reported as malformed messages, crate errors from below pass through
        res.map_err(|err| match err.kind() {
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                crate::errors::Error::MalformedMessage {
                    message: format!("invalid compressed data: {err}"),
                }
                .into()
            }
            _ => err,
        })
    }
}
