use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::{ensure, Error, Result};
use crate::ser::{time_to_u32, u32_to_time, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataMode {
    Binary = b'b',
    Text = b't',
    Utf8 = b'u',
    Mime = b'm',

    #[num_enum(catch_all)]
    Other(u8),
}

fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        return Error::MalformedMessage {
            message: "truncated literal data header".to_string(),
        };
    }
    err.into()
}

/// The header of a Literal Data Packet, the content follows it in the same packet.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.9>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct LiteralDataHeader {
    mode: DataMode,
    #[debug("{:?}", String::from_utf8_lossy(file_name))]
    file_name: Bytes,
    created: DateTime<Utc>,
}

impl LiteralDataHeader {
    /// Creates a binary mode header.
    ///
    /// File names are limited to 255 octets on the wire.
    pub fn new(file_name: &str, created: DateTime<Utc>) -> Result<Self> {
        ensure!(
            file_name.len() <= 255,
            InvalidParameters,
            "file name too long for a literal data packet"
        );

        Ok(LiteralDataHeader {
            mode: DataMode::Binary,
            file_name: Bytes::copy_from_slice(file_name.as_bytes()),
            created: created.trunc_subsecs(0),
        })
    }

    /// Reads the header from the start of the packet body.
    pub fn from_reader<R: Read>(mut r: R) -> Result<Self> {
        let mode = DataMode::from(r.read_u8().map_err(truncated)?);
        let name_len = r.read_u8().map_err(truncated)?;
        let mut file_name = vec![0u8; usize::from(name_len)];
        r.read_exact(&mut file_name).map_err(truncated)?;
        let created = u32_to_time(r.read_u32::<BigEndian>().map_err(truncated)?);

        Ok(LiteralDataHeader {
            mode,
            file_name: file_name.into(),
            created,
        })
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn file_name(&self) -> &[u8] {
        &self.file_name
    }

    pub fn created(&self) -> &DateTime<Utc> {
        &self.created
    }
}

impl Serialize for LiteralDataHeader {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.mode.into())?;
        writer.write_u8(u8::try_from(self.file_name.len())?)?;
        writer.write_all(&self.file_name)?;
        writer.write_u32::<BigEndian>(time_to_u32(&self.created))?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 1 + self.file_name.len() + 4
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = LiteralDataHeader::new("hello.txt", u32_to_time(0x5F00_0000)).unwrap();
        let bytes = header.to_bytes().unwrap();
        assert_eq!(
            bytes,
            [&[b'b', 9][..], b"hello.txt", &[0x5F, 0, 0, 0][..]].concat()
        );

        let parsed = LiteralDataHeader::from_reader(&bytes[..]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.mode(), DataMode::Binary);
    }

    #[test]
    fn test_long_name_is_rejected() {
        let name = "x".repeat(256);
        assert!(LiteralDataHeader::new(&name, Utc::now()).is_err());
    }

    #[test]
    fn test_truncated_header() {
        let err = LiteralDataHeader::from_reader(&[b'b', 5, b'a'][..]).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }), "{err:?}");
    }
}
