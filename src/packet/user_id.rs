use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::ser::Serialize;
use crate::types::Tag;

/// User ID Packet
///
/// The content is expected to be UTF-8, but stored as received.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.11>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct UserId {
    #[debug("{:?}", String::from_utf8_lossy(id))]
    id: Bytes,
}

impl UserId {
    pub fn from_bytes(id: Bytes) -> Self {
        UserId { id }
    }

    pub fn new(id: &str) -> Self {
        UserId {
            id: Bytes::copy_from_slice(id.as_bytes()),
        }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// The id as text, invalid UTF-8 is replaced.
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }

    /// Writes the id the way it is hashed for certifications:
    /// `0xB4`, a four octet length and the packet body.
    pub fn serialize_for_hashing<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(0xB4)?;
        writer.write_u32::<BigEndian>(u32::try_from(self.id.len())?)?;
        writer.write_all(&self.id)?;
        Ok(())
    }
}

impl Serialize for UserId {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.id)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.id.len()
    }
}

impl PacketTrait for UserId {
    fn tag(&self) -> Tag {
        Tag::UserId
    }
}
