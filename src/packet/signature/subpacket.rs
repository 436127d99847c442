use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use chrono::{DateTime, Utc};

use crate::crypto::{hash::HashAlgorithm, sym::SymmetricKeyAlgorithm};
use crate::errors::{ensure, Result};
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, u32_to_time, Serialize};
use crate::types::{CompressionAlgorithm, KeyFlags, KeyId};
use crate::util::{packet_length_len, write_packet_length};

/// Available signature subpacket types
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SubpacketType {
    SignatureCreationTime,
    SignatureExpirationTime,
    KeyExpirationTime,
    PreferredSymmetricAlgorithms,
    Issuer,
    PreferredHashAlgorithms,
    PreferredCompressionAlgorithms,
    PrimaryUserId,
    KeyFlags,
    SignersUserID,
    Features,
    IssuerFingerprint,
    Other(u8),
}

impl SubpacketType {
    pub fn as_u8(&self, is_critical: bool) -> u8 {
        let raw: u8 = match self {
            SubpacketType::SignatureCreationTime => 2,
            SubpacketType::SignatureExpirationTime => 3,
            SubpacketType::KeyExpirationTime => 9,
            SubpacketType::PreferredSymmetricAlgorithms => 11,
            SubpacketType::Issuer => 16,
            SubpacketType::PreferredHashAlgorithms => 21,
            SubpacketType::PreferredCompressionAlgorithms => 22,
            SubpacketType::PrimaryUserId => 25,
            SubpacketType::KeyFlags => 27,
            SubpacketType::SignersUserID => 28,
            SubpacketType::Features => 30,
            SubpacketType::IssuerFingerprint => 33,
            SubpacketType::Other(n) => *n,
        };

        if is_critical {
            // set critical bit
            raw | 0b1000_0000
        } else {
            raw
        }
    }

    #[inline]
    pub fn from_u8(n: u8) -> (Self, bool) {
        let is_critical = (n >> 7) == 1;
        // remove critical bit
        let n = n & 0b0111_1111;

        let m = match n {
            2 => SubpacketType::SignatureCreationTime,
            3 => SubpacketType::SignatureExpirationTime,
            9 => SubpacketType::KeyExpirationTime,
            11 => SubpacketType::PreferredSymmetricAlgorithms,
            16 => SubpacketType::Issuer,
            21 => SubpacketType::PreferredHashAlgorithms,
            22 => SubpacketType::PreferredCompressionAlgorithms,
            25 => SubpacketType::PrimaryUserId,
            27 => SubpacketType::KeyFlags,
            28 => SubpacketType::SignersUserID,
            30 => SubpacketType::Features,
            33 => SubpacketType::IssuerFingerprint,
            _ => SubpacketType::Other(n),
        };

        (m, is_critical)
    }
}

/// A single signature subpacket.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.3.1>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Subpacket {
    pub is_critical: bool,
    pub data: SubpacketData,
}

impl Subpacket {
    /// Construct a new regular subpacket.
    pub const fn regular(data: SubpacketData) -> Self {
        Subpacket {
            is_critical: false,
            data,
        }
    }

    /// Construct a new critical subpacket.
    pub const fn critical(data: SubpacketData) -> Self {
        Subpacket {
            is_critical: true,
            data,
        }
    }

    pub fn typ(&self) -> SubpacketType {
        match &self.data {
            SubpacketData::SignatureCreationTime(_) => SubpacketType::SignatureCreationTime,
            SubpacketData::Issuer(_) => SubpacketType::Issuer,
            SubpacketData::PreferredSymmetricAlgorithms(_) => {
                SubpacketType::PreferredSymmetricAlgorithms
            }
            SubpacketData::PreferredHashAlgorithms(_) => SubpacketType::PreferredHashAlgorithms,
            SubpacketData::PreferredCompressionAlgorithms(_) => {
                SubpacketType::PreferredCompressionAlgorithms
            }
            SubpacketData::KeyFlags(_) => SubpacketType::KeyFlags,
            SubpacketData::SignersUserID(_) => SubpacketType::SignersUserID,
            SubpacketData::Other(typ, _) => *typ,
        }
    }

    /// Parses all subpackets out of a subpacket area.
    pub fn from_area(mut area: Bytes) -> Result<Vec<Subpacket>> {
        let mut packets = Vec::new();
        while area.has_remaining() {
            packets.push(Subpacket::from_buf(&mut area)?);
        }
        Ok(packets)
    }

    fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let len = read_subpacket_len(&mut i)?;
        ensure!(len > 0, MalformedMessage, "empty signature subpacket");

        let (typ, is_critical) = SubpacketType::from_u8(i.read_u8()?);
        let mut body = i.read_take(len - 1)?;

        let data = match typ {
            SubpacketType::SignatureCreationTime => {
                SubpacketData::SignatureCreationTime(u32_to_time(body.read_be_u32()?))
            }
            SubpacketType::Issuer => SubpacketData::Issuer(KeyId::from(body.read_array::<8>()?)),
            SubpacketType::PreferredSymmetricAlgorithms => {
                SubpacketData::PreferredSymmetricAlgorithms(
                    body.iter().map(|b| SymmetricKeyAlgorithm::from(*b)).collect(),
                )
            }
            SubpacketType::PreferredHashAlgorithms => SubpacketData::PreferredHashAlgorithms(
                body.iter().map(|b| HashAlgorithm::from(*b)).collect(),
            ),
            SubpacketType::PreferredCompressionAlgorithms => {
                SubpacketData::PreferredCompressionAlgorithms(
                    body.iter().map(|b| CompressionAlgorithm::from(*b)).collect(),
                )
            }
            // flags beyond the first octet carry nothing we act on
            SubpacketType::KeyFlags => {
                SubpacketData::KeyFlags(KeyFlags::from_bits(body.first().copied().unwrap_or(0)))
            }
            SubpacketType::SignersUserID => SubpacketData::SignersUserID(body),
            _ => SubpacketData::Other(typ, body),
        };

        Ok(Subpacket { is_critical, data })
    }

    fn body_len(&self) -> usize {
        match &self.data {
            SubpacketData::SignatureCreationTime(_) => 4,
            SubpacketData::Issuer(_) => 8,
            SubpacketData::PreferredSymmetricAlgorithms(algs) => algs.len(),
            SubpacketData::PreferredHashAlgorithms(algs) => algs.len(),
            SubpacketData::PreferredCompressionAlgorithms(algs) => algs.len(),
            SubpacketData::KeyFlags(_) => 1,
            SubpacketData::SignersUserID(id) => id.len(),
            SubpacketData::Other(_, body) => body.len(),
        }
    }

    fn body_to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match &self.data {
            SubpacketData::SignatureCreationTime(t) => {
                writer.write_u32::<BigEndian>(time_to_u32(t))?;
            }
            SubpacketData::Issuer(id) => {
                writer.write_all(id.as_ref())?;
            }
            SubpacketData::PreferredSymmetricAlgorithms(algs) => {
                writer.write_all(&algs.iter().map(|&alg| u8::from(alg)).collect::<Vec<_>>())?;
            }
            SubpacketData::PreferredHashAlgorithms(algs) => {
                writer.write_all(&algs.iter().map(|&alg| u8::from(alg)).collect::<Vec<_>>())?;
            }
            SubpacketData::PreferredCompressionAlgorithms(algs) => {
                writer.write_all(&algs.iter().map(|&alg| u8::from(alg)).collect::<Vec<_>>())?;
            }
            SubpacketData::KeyFlags(flags) => {
                writer.write_u8(flags.bits())?;
            }
            SubpacketData::SignersUserID(id) => {
                writer.write_all(id)?;
            }
            SubpacketData::Other(_, body) => {
                writer.write_all(body)?;
            }
        }

        Ok(())
    }
}

impl Serialize for Subpacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        write_packet_length(1 + self.body_len(), writer)?;
        writer.write_u8(self.typ().as_u8(self.is_critical))?;
        self.body_to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        let len = 1 + self.body_len();
        packet_length_len(len) + len
    }
}

/// Subpacket contents understood by this crate.
#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub enum SubpacketData {
    /// The time the signature was made.
    SignatureCreationTime(DateTime<Utc>),
    /// The OpenPGP Key ID of the key issuing the signature.
    Issuer(KeyId),
    /// List of symmetric algorithms that indicate which algorithms the key holder prefers to use.
    PreferredSymmetricAlgorithms(Vec<SymmetricKeyAlgorithm>),
    /// List of hash algorithms that indicate which algorithms the key holder prefers to use.
    PreferredHashAlgorithms(Vec<HashAlgorithm>),
    /// List of compression algorithms that indicate which algorithms the key holder prefers to use.
    PreferredCompressionAlgorithms(Vec<CompressionAlgorithm>),
    KeyFlags(KeyFlags),
    /// The user id of the signer, as the signer chose to name themselves.
    SignersUserID(#[debug("{:?}", String::from_utf8_lossy(_0))] Bytes),
    Other(SubpacketType, #[debug("{}", hex::encode(_1))] Bytes),
}

fn read_subpacket_len<B: Buf>(i: &mut B) -> Result<usize> {
    let olen = i.read_u8()?;
    let len = match olen {
        // One-Octet Lengths
        0..=191 => olen.into(),
        // Two-Octet Lengths
        192..=254 => ((usize::from(olen) - 192) << 8) + usize::from(i.read_u8()?) + 192,
        // Five-Octet Lengths
        255 => i.read_be_u32()? as usize,
    };
    Ok(len)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_subpacket_roundtrip() {
        let packets = vec![
            Subpacket::regular(SubpacketData::SignatureCreationTime(u32_to_time(1_700_000_000))),
            Subpacket::regular(SubpacketData::Issuer(KeyId::from([1, 2, 3, 4, 5, 6, 7, 8]))),
            Subpacket::regular(SubpacketData::KeyFlags(KeyFlags::all())),
            Subpacket::regular(SubpacketData::PreferredSymmetricAlgorithms(vec![
                SymmetricKeyAlgorithm::AES256,
                SymmetricKeyAlgorithm::AES128,
            ])),
            Subpacket::regular(SubpacketData::SignersUserID(Bytes::from_static(
                b"alice@example.com",
            ))),
            Subpacket::critical(SubpacketData::Other(
                SubpacketType::Other(101),
                Bytes::from_static(&[0xAA; 300]),
            )),
        ];

        let area = packets.to_bytes().unwrap();
        assert_eq!(area.len(), packets.write_len());
        let parsed = Subpacket::from_area(area.into()).unwrap();
        assert_eq!(parsed, packets);
    }

    #[test]
    fn test_creation_time_encoding() {
        let packet =
            Subpacket::regular(SubpacketData::SignatureCreationTime(u32_to_time(0x5000_0001)));
        assert_eq!(packet.to_bytes().unwrap(), vec![5, 2, 0x50, 0, 0, 1]);
    }

    #[test]
    fn test_critical_bit() {
        let (typ, critical) = SubpacketType::from_u8(0x82);
        assert_eq!(typ, SubpacketType::SignatureCreationTime);
        assert!(critical);
        assert_eq!(typ.as_u8(true), 0x82);
    }

    #[test]
    fn test_truncated_area() {
        // claims 5 bytes, only has 3
        let area = Bytes::from_static(&[5, 2, 0, 0]);
        assert!(Subpacket::from_area(area).is_err());
    }
}
