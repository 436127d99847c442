use std::io::{self, BufRead};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::errors::{bail, ensure, Error, Result};
use crate::ser::Serialize;
use crate::types::{PacketHeaderVersion, PacketLength, Tag};
use crate::util::packet_length_len;

/// Maximum size of partial packet length.
pub(crate) const MAX_PARTIAL_LEN: u32 = 2u32.pow(30);

/// Represents a packet header.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.2>
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    version: PacketHeaderVersion,
    tag: Tag,
    length: PacketLength,
}

fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        return Error::MalformedMessage {
            message: "truncated packet header".to_string(),
        };
    }
    err.into()
}

impl PacketHeader {
    /// Reads a single packet header.
    ///
    /// Returns `None` if the source is exhausted before the first octet.
    pub fn from_reader<R: BufRead>(mut r: R) -> Result<Option<Self>> {
        let header = {
            let buf = r.fill_buf()?;
            match buf.first() {
                None => return Ok(None),
                Some(b) => *b,
            }
        };
        r.consume(1);

        let header = match header & 0b1100_0000 {
            // new starts with 0b11
            0b1100_0000 => {
                let tag = Tag::from(header & 0b0011_1111);
                let length = PacketLength::try_from_reader(&mut r).map_err(truncated)?;
                PacketHeader {
                    version: PacketHeaderVersion::New,
                    tag,
                    length,
                }
            }
            // old starts with 0b10
            0b1000_0000 => {
                let tag = Tag::from((header >> 2) & 0b0000_1111);
                let length = match header & 0b11 {
                    // One-Octet Lengths
                    0 => PacketLength::Fixed(r.read_u8().map_err(truncated)?.into()),
                    // Two-Octet Lengths
                    1 => PacketLength::Fixed(r.read_u16::<BigEndian>().map_err(truncated)?.into()),
                    // Four-Octet Lengths
                    2 => PacketLength::Fixed(r.read_u32::<BigEndian>().map_err(truncated)? as usize),
                    _ => PacketLength::Indeterminate,
                };
                PacketHeader {
                    version: PacketHeaderVersion::Old,
                    tag,
                    length,
                }
            }
            _ => {
                bail!(MalformedMessage, "invalid packet header {:08b}", header);
            }
        };

        if let PacketLength::Partial(len) = header.length {
            ensure!(
                header.tag.allows_partial_length(),
                MalformedMessage,
                "partial body length is not allowed for {:?}",
                header.tag
            );
            ensure!(
                len >= 512,
                MalformedMessage,
                "first partial body chunk must be at least 512 bytes, got {}",
                len
            );
        }
        debug!("packet header {:?}", header);

        Ok(Some(header))
    }

    /// Creates a `New` style packet header.
    pub fn new_fixed(tag: Tag, length: usize) -> Self {
        PacketHeader {
            version: PacketHeaderVersion::New,
            tag,
            length: PacketLength::Fixed(length),
        }
    }

    /// Creates a `New` style packet header, announcing a first partial chunk.
    pub fn new_partial(tag: Tag, length: u32) -> Result<Self> {
        ensure!(
            length.count_ones() == 1,
            InvalidParameters,
            "partial length must be a power of two"
        );
        ensure!(
            (512..=MAX_PARTIAL_LEN).contains(&length),
            InvalidParameters,
            "partial length must be between 512 and {}",
            MAX_PARTIAL_LEN
        );

        Ok(PacketHeader {
            version: PacketHeaderVersion::New,
            tag,
            length: PacketLength::Partial(length),
        })
    }

    /// Returns the packet header version.
    pub const fn version(&self) -> PacketHeaderVersion {
        self.version
    }

    /// Returns the packet length.
    pub fn packet_length(&self) -> PacketLength {
        self.length
    }

    /// Returns the packet tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

impl Serialize for PacketHeader {
    /// Headers are always written in the new format.
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let tag = u8::from(self.tag);
        ensure!(tag < 64, InvalidParameters, "invalid packet tag {}", tag);
        writer.write_u8(0b1100_0000 | tag)?;
        self.length.to_writer_new(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        match self.length {
            PacketLength::Fixed(len) => 1 + packet_length_len(len),
            PacketLength::Partial(_) | PacketLength::Indeterminate => 2,
        }
    }
}
