use std::io;

use bytes::Buf;

use crate::errors::{ensure, Result};
use crate::packet::PacketTrait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::Tag;

const PGP: [u8; 3] = [0x50, 0x47, 0x50];

/// Marker Packet, obsolete and ignored on read.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.8>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker;

impl Marker {
    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let marker = i.read_array::<3>()?;
        ensure!(marker == PGP, MalformedMessage, "invalid marker packet");

        Ok(Marker)
    }
}

impl Serialize for Marker {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&PGP)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        PGP.len()
    }
}

impl PacketTrait for Marker {
    fn tag(&self) -> Tag {
        Tag::Marker
    }
}
