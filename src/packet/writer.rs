use std::io::{self, Write};

use log::debug;

use super::PacketHeader;
use crate::errors::{ensure, Result};
use crate::ser::Serialize;
use crate::types::Tag;
use crate::util::write_packet_length;

/// Default partial body chunk size.
pub const DEFAULT_PARTIAL_CHUNK_SIZE: u32 = 1024 * 64;

/// Writes a packet body of unknown length using partial body lengths.
///
/// Data is collected into chunks of `chunk_size` bytes, each full chunk is
/// emitted as a partial body segment. [`Self::finish`] writes the remainder
/// as the final, fixed length segment (possibly empty).
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.2.2.4>
pub struct PartialBodyWriter<W: Write> {
    tag: Tag,
    inner: W,
    buffer: Vec<u8>,
    chunk_size: usize,
    header_written: bool,
}

impl<W: Write> PartialBodyWriter<W> {
    pub fn new(tag: Tag, chunk_size: u32, inner: W) -> Result<Self> {
        // validates size and tag
        PacketHeader::new_partial(tag, chunk_size)?;
        ensure!(
            tag.allows_partial_length(),
            InvalidParameters,
            "{:?} packets can not use partial body lengths",
            tag
        );

        Ok(PartialBodyWriter {
            tag,
            inner,
            buffer: Vec::with_capacity(chunk_size as usize),
            chunk_size: chunk_size as usize,
            header_written: false,
        })
    }

    fn write_chunk(&mut self) -> Result<()> {
        if self.header_written {
            PacketHeader::new_partial(self.tag, self.chunk_size as u32)?
                .packet_length()
                .to_writer_new(&mut self.inner)?;
        } else {
            PacketHeader::new_partial(self.tag, self.chunk_size as u32)?.to_writer(&mut self.inner)?;
            self.header_written = true;
        }
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();

        Ok(())
    }

    /// Writes the final segment and returns the inner writer.
    pub fn finish(mut self) -> Result<W> {
        let len = self.buffer.len();
        if self.header_written {
            write_packet_length(len, &mut self.inner)?;
        } else {
            PacketHeader::new_fixed(self.tag, len).to_writer(&mut self.inner)?;
        }
        self.inner.write_all(&self.buffer)?;
        debug!("finished {:?} packet", self.tag);

        Ok(self.inner)
    }
}

impl<W: Write> Write for PartialBodyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // a full chunk is only flushed once more data arrives, so the final segment is never empty
        // unless the whole body is
        if self.buffer.len() == self.chunk_size && !buf.is_empty() {
            self.write_chunk()?;
        }

        let len = buf.len().min(self.chunk_size - self.buffer.len());
        self.buffer.extend_from_slice(&buf[..len]);

        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
