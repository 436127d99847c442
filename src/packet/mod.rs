//! # Packet module
//!
//! Handles everything in relationship to packets: framing ([`PacketHeader`],
//! [`PacketBodyReader`], [`PartialBodyWriter`]) and the individual packet
//! bodies used by key blocks and messages.
//!
//! Messages are streamed, so the bulk packets (literal, compressed and
//! encrypted data) only expose their headers and codecs. Key blocks are small
//! and parsed into [`Packet`]s with a [`PacketParser`].
//!
//! Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5>

use std::io::{self, BufRead};

use bytes::Bytes;
use log::{debug, warn};

use crate::errors::{format_err, Result};
use crate::ser::Serialize;
use crate::types::Tag;

mod compressed_data;
mod header;
mod literal_data;
mod marker;
mod one_pass_signature;
mod public_key;
mod public_key_encrypted_session_key;
mod reader;
mod secret_key;
mod signature;
mod sym_encrypted_protected_data;
mod user_id;
mod writer;

pub(crate) use self::header::MAX_PARTIAL_LEN;
pub(crate) use self::signature::hash_certification_data;
pub use self::{
    compressed_data::{Compressor, Decompressor},
    header::PacketHeader,
    literal_data::{DataMode, LiteralDataHeader},
    marker::Marker,
    one_pass_signature::OnePassSignature,
    public_key::{PublicKey, PublicParams},
    public_key_encrypted_session_key::PublicKeyEncryptedSessionKey,
    reader::PacketBodyReader,
    secret_key::{EncryptedSecretParams, PlainSecretParams, S2kUsage, SecretKey, SecretParams},
    signature::{
        Signature, SignatureConfig, SignatureType, Subpacket, SubpacketData, SubpacketType,
    },
    sym_encrypted_protected_data::SymEncryptedProtectedData,
    user_id::UserId,
    writer::{PartialBodyWriter, DEFAULT_PARTIAL_CHUNK_SIZE},
};

pub trait PacketTrait: Serialize {
    fn tag(&self) -> Tag;

    /// Write this packet including a new format packet header.
    fn to_writer_with_header<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        PacketHeader::new_fixed(self.tag(), self.write_len()).to_writer(writer)?;
        self.to_writer(writer)?;

        Ok(())
    }

    /// Length in bytes used when calling `to_writer_with_header`.
    fn write_len_with_header(&self) -> usize {
        let len = self.write_len();
        PacketHeader::new_fixed(self.tag(), len).write_len() + len
    }
}

impl<T: PacketTrait> PacketTrait for &T {
    fn tag(&self) -> Tag {
        (*self).tag()
    }
}

/// A packet as found in a key block.
///
/// Packets that key handling does not look into are kept as raw bodies, so
/// they survive re-serialization untouched.
#[derive(Debug, PartialEq, Eq, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    PublicKey(PublicKey),
    SecretKey(SecretKey),
    UserId(UserId),
    Signature(Signature),
    Marker(Marker),
    Other { tag: Tag, body: Bytes },
}

impl Packet {
    pub fn tag(&self) -> Tag {
        match self {
            Self::PublicKey(p) => p.tag(),
            Self::SecretKey(p) => p.tag(),
            Self::UserId(p) => p.tag(),
            Self::Signature(p) => p.tag(),
            Self::Marker(p) => p.tag(),
            Self::Other { tag, .. } => *tag,
        }
    }

    /// Parses a packet body for the given header.
    pub fn from_body(header: PacketHeader, body: Bytes) -> Result<Self> {
        let packet = match header.tag() {
            Tag::PublicKey => Self::PublicKey(PublicKey::from_buf(body)?),
            Tag::SecretKey => Self::SecretKey(SecretKey::from_buf(body)?),
            Tag::UserId => Self::UserId(UserId::from_bytes(body)),
            Tag::Signature => Self::Signature(Signature::from_buf(body)?),
            Tag::Marker => Self::Marker(Marker::from_buf(body)?),
            tag => Self::Other { tag, body },
        };

        Ok(packet)
    }
}

macro_rules! impl_from_packet {
    ($( $name:ident ),*) => {
        $(
            impl From<$name> for Packet {
                fn from(other: $name) -> Packet {
                    Packet::$name(other)
                }
            }
        )*
    };
}

impl_from_packet!(PublicKey, SecretKey, UserId, Signature, Marker);

impl Serialize for Packet {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Self::PublicKey(p) => p.to_writer_with_header(writer),
            Self::SecretKey(p) => p.to_writer_with_header(writer),
            Self::UserId(p) => p.to_writer_with_header(writer),
            Self::Signature(p) => p.to_writer_with_header(writer),
            Self::Marker(p) => p.to_writer_with_header(writer),
            Self::Other { tag, body } => {
                PacketHeader::new_fixed(*tag, body.len()).to_writer(writer)?;
                writer.write_all(body)?;
                Ok(())
            }
        }
    }

    fn write_len(&self) -> usize {
        match self {
            Self::PublicKey(p) => p.write_len_with_header(),
            Self::SecretKey(p) => p.write_len_with_header(),
            Self::UserId(p) => p.write_len_with_header(),
            Self::Signature(p) => p.write_len_with_header(),
            Self::Marker(p) => p.write_len_with_header(),
            Self::Other { tag, body } => {
                PacketHeader::new_fixed(*tag, body.len()).write_len() + body.len()
            }
        }
    }
}

/// Parse packets, in a streaming fashion from the given reader.
///
/// Iteration stops after the first error.
#[derive(Debug)]
pub struct PacketParser<R: BufRead> {
    reader: Option<R>,
}

impl<R: BufRead> PacketParser<R> {
    pub fn new(source: R) -> Self {
        PacketParser {
            reader: Some(source),
        }
    }

    fn next_packet(mut source: R) -> Result<Option<(Packet, R)>> {
        let Some(header) = PacketHeader::from_reader(&mut source)? else {
            return Ok(None);
        };
        let mut body_reader = PacketBodyReader::new(header, source);
        let body = body_reader.read_body()?;
        debug!("-- parsed packet {:?} ({} bytes) --", header.tag(), body.len());

        let packet = Packet::from_body(header, body.into())?;
        Ok(Some((packet, body_reader.into_inner())))
    }
}

impl<R: BufRead> Iterator for PacketParser<R> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.reader.take()?;
        match Self::next_packet(source) {
            Ok(Some((packet, source))) => {
                self.reader = Some(source);
                Some(Ok(packet))
            }
            Ok(None) => None,
            Err(err) => {
                warn!("stopping packet parsing: {}", err);
                Some(Err(err))
            }
        }
    }
}

/// Write the packet, including its header, to `writer`.
pub fn write_packet<W: io::Write>(writer: &mut W, packet: &impl PacketTrait) -> Result<()> {
    packet.to_writer_with_header(writer)
}

/// Fails if a packet with this tag can not appear at the top level of a key block.
pub(crate) fn ensure_key_block_tag(tag: Tag) -> Result<()> {
    match tag {
        Tag::PublicKey
        | Tag::PublicSubkey
        | Tag::SecretKey
        | Tag::SecretSubkey
        | Tag::UserId
        | Tag::UserAttribute
        | Tag::Signature
        | Tag::Trust
        | Tag::Marker => Ok(()),
        other => Err(format_err!(
            InvalidKeyMaterial,
            "unexpected {:?} packet in key block",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_sequence() {
        let mut bytes = Vec::new();
        write_packet(&mut bytes, &Marker).unwrap();
        write_packet(&mut bytes, &UserId::new("Alice <alice@example.org>")).unwrap();
        // trust packets are kept raw
        Packet::Other {
            tag: Tag::Trust,
            body: Bytes::from_static(&[0, 0]),
        }
        .to_writer(&mut bytes)
        .unwrap();

        let packets = PacketParser::new(&bytes[..])
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], Packet::Marker(Marker));
        assert_eq!(
            packets[1],
            Packet::UserId(UserId::new("Alice <alice@example.org>"))
        );
        assert_eq!(packets[2].tag(), Tag::Trust);

        let mut out = Vec::new();
        packets.to_writer(&mut out).unwrap();
        assert_eq!(out, bytes);
        assert_eq!(packets.write_len(), bytes.len());
    }

    #[test]
    fn test_stops_after_error() {
        // header claims more than is there
        let bytes = [0xCD, 0x10, b'a', b'b'];
        let mut parser = PacketParser::new(&bytes[..]);
        assert!(parser.next().unwrap().is_err());
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_key_block_tags() {
        assert!(ensure_key_block_tag(Tag::UserId).is_ok());
        assert!(ensure_key_block_tag(Tag::LiteralData).is_err());
    }
}
