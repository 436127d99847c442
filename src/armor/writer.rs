use std::hash::Hasher;
use std::io::{self, Write};

use base64::engine::{general_purpose::STANDARD, Engine as _};
use crc24::Crc24Hasher;

use super::{BlockType, Headers};
use crate::errors::{format_err, Result};

/// Raw bytes per armored line, 64 base64 characters.
const LINE_BYTES: usize = 48;

/// Streaming armor encoder.
///
/// Writes the header on construction and base64 lines of 64 columns while
/// data comes in, [`Self::finish`] writes the last line, the CRC-24
/// checksum and the footer.
pub struct ArmorWriter<W: Write> {
    inner: W,
    typ: BlockType,
    crc: Crc24Hasher,
    buffer: Vec<u8>,
    line: String,
}

impl<W: Write> ArmorWriter<W> {
    pub fn new(mut inner: W, typ: BlockType, headers: Option<&Headers>) -> Result<Self> {
        // write armor header
        writeln!(inner, "-----BEGIN {typ}-----")?;

        // write armor headers
        if let Some(headers) = headers {
            for (key, values) in headers.iter() {
                for value in values {
                    writeln!(inner, "{key}: {value}")?;
                }
            }
        }
        inner.write_all(b"\n")?;

        Ok(ArmorWriter {
            inner,
            typ,
            crc: Crc24Hasher::new(),
            buffer: Vec::with_capacity(LINE_BYTES * 2),
            line: String::with_capacity(66),
        })
    }

    fn write_line(&mut self, raw: &[u8]) -> io::Result<()> {
        self.line.clear();
        STANDARD.encode_string(raw, &mut self.line);
        self.line.push('\n');
        self.inner.write_all(self.line.as_bytes())
    }

    /// Writes the remaining body, checksum and footer, returns the inner writer.
    pub fn finish(mut self) -> Result<W> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.write_line(&rest)?;
        }

        let crc = (self.crc.finish() & 0xFF_FFFF) as u32;
        let crc_buf = [(crc >> 16) as u8, (crc >> 8) as u8, crc as u8];
        writeln!(self.inner, "={}", STANDARD.encode(crc_buf))?;

        // write footer
        writeln!(self.inner, "-----END {}-----", self.typ)?;
        self.inner.flush()?;

        Ok(self.inner)
    }
}

impl<W: Write> Write for ArmorWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.crc.write(buf);
        self.buffer.extend_from_slice(buf);

        let full = self.buffer.len() - self.buffer.len() % LINE_BYTES;
        if full > 0 {
            let lines = self.buffer.drain(..full).collect::<Vec<u8>>();
            for raw in lines.chunks(LINE_BYTES) {
                self.write_line(raw)?;
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Armors `data` in one go.
pub fn encode(typ: BlockType, headers: Option<&Headers>, data: &[u8]) -> Result<String> {
    let mut writer = ArmorWriter::new(Vec::with_capacity(data.len() * 4 / 3 + 128), typ, headers)?;
    writer.write_all(data)?;
    let out = writer.finish()?;

    String::from_utf8(out).map_err(|_| format_err!(MalformedArmor, "armor output is not ascii"))
}
