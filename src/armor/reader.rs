use std::hash::Hasher;
use std::io::{self, BufRead, Read};

use base64::engine::{general_purpose::STANDARD, Engine as _};
use crc24::Crc24Hasher;
use log::debug;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    combinator::{all_consuming, rest, value},
    sequence::{delimited, separated_pair},
    IResult, Parser,
};

use super::{BlockType, Headers};
use crate::errors::{bail, ensure, ensure_eq, format_err, Result};

/// Parses the type inside of an ascii armor header.
fn armor_header_type(i: &str) -> IResult<&str, BlockType> {
    alt((
        value(BlockType::PublicKey, tag("PGP PUBLIC KEY BLOCK")),
        value(BlockType::PrivateKey, tag("PGP PRIVATE KEY BLOCK")),
        value(BlockType::PrivateKey, tag("PGP SECRET KEY BLOCK")),
        value(BlockType::Message, tag("PGP MESSAGE")),
    ))
    .parse(i)
}

/// Parses a single armor header line: `-----BEGIN <TYPE>-----`.
fn armor_header_line(i: &str) -> IResult<&str, BlockType> {
    all_consuming(delimited(tag("-----BEGIN "), armor_header_type, tag("-----"))).parse(i)
}

/// Parses a single armor footer line: `-----END <TYPE>-----`.
fn armor_footer_line(i: &str) -> IResult<&str, BlockType> {
    all_consuming(delimited(tag("-----END "), armor_header_type, tag("-----"))).parse(i)
}

/// Parses a single key value pair, for the header.
fn key_value_pair(i: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_till1(|c: char| c == ':' || c.is_whitespace()), tag(":"), rest)
        .parse(i)
}

/// Binary OpenPGP data always starts with a packet tag octet, which has the high bit set.
pub fn is_binary(first: u8) -> bool {
    first & 0x80 != 0
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Header,
    Body,
    Done,
}

/// Streaming armor decoder.
///
/// Reads armored text from `inner` and yields the decoded binary body. The
/// CRC-24 checksum, when present, and the footer type are verified once the
/// footer line is reached; failures surface as
/// [`crate::errors::Error::MalformedArmor`].
pub struct Dearmor<R: BufRead> {
    inner: R,
    typ: Option<BlockType>,
    headers: Headers,
    state: State,
    crc: Crc24Hasher,
    checksum: Option<u32>,
    /// base64 characters not yet decoded, always fewer than four after a decode step
    pending: String,
    decoded: Vec<u8>,
    pos: usize,
    line: Vec<u8>,
}

impl<R: BufRead> Dearmor<R> {
    pub fn new(inner: R) -> Self {
        Dearmor {
            inner,
            typ: None,
            headers: Headers::new(),
            state: State::Header,
            crc: Crc24Hasher::new(),
            checksum: None,
            pending: String::new(),
            decoded: Vec::new(),
            pos: 0,
            line: Vec::new(),
        }
    }

    /// The block type, available after the header was read.
    pub fn typ(&self) -> Option<BlockType> {
        self.typ
    }

    /// The armor headers, available after the header was read.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Reads the header line and the armor headers.
    pub fn read_header(&mut self) -> Result<BlockType> {
        if let Some(typ) = self.typ {
            return Ok(typ);
        }

        // anything before the header line is ignored
        let typ = loop {
            let Some(line) = self.next_line()? else {
                bail!(MalformedArmor, "missing armor header line");
            };
            if !line.starts_with("-----BEGIN ") {
                continue;
            }
            let (_, typ) = armor_header_line(&line)
                .map_err(|_| format_err!(MalformedArmor, "invalid armor header line {:?}", line))?;
            break typ;
        };
        debug!("armor header {typ}");
        self.typ = Some(typ);
        self.state = State::Body;

        loop {
            let Some(line) = self.next_line()? else {
                bail!(MalformedArmor, "missing armor footer");
            };
            if line.is_empty() {
                break;
            }
            match key_value_pair(&line) {
                Ok((_, (key, val))) => {
                    self.headers
                        .entry(key.to_string())
                        .or_default()
                        .push(val.trim().to_string());
                }
                Err(_) => {
                    // no blank separator line, this is already body data
                    self.body_line(&line)?;
                    break;
                }
            }
        }

        Ok(typ)
    }

    /// Reads the next line, without line ending and surrounding whitespace.
    fn next_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        let read = self.inner.read_until(b'\n', &mut self.line)?;
        if read == 0 {
            return Ok(None);
        }
        let line = std::str::from_utf8(&self.line)
            .map_err(|_| format_err!(MalformedArmor, "armor is not valid ascii"))?;

        Ok(Some(line.trim().to_string()))
    }

    fn body_line(&mut self, line: &str) -> Result<()> {
        if let Some(footer) = line.strip_prefix('=').filter(|_| self.pending.len() % 4 == 0) {
            let raw = STANDARD
                .decode(footer)
                .map_err(|err| format_err!(MalformedArmor, "invalid checksum line: {}", err))?;
            ensure_eq!(raw.len(), 3, MalformedArmor, "checksum length");
            self.checksum = Some(u32::from_be_bytes([0, raw[0], raw[1], raw[2]]));
            return Ok(());
        }

        ensure!(
            self.checksum.is_none(),
            MalformedArmor,
            "data after the armor checksum"
        );
        self.pending.push_str(line);

        let usable = self.pending.len() - self.pending.len() % 4;
        let start = self.decoded.len();
        STANDARD
            .decode_vec(&self.pending[..usable], &mut self.decoded)
            .map_err(|err| format_err!(MalformedArmor, "invalid base64: {}", err))?;
        self.crc.write(&self.decoded[start..]);
        self.pending.drain(..usable);

        Ok(())
    }

    fn footer(&mut self, line: &str) -> Result<()> {
        let (_, typ) = armor_footer_line(line)
            .map_err(|_| format_err!(MalformedArmor, "invalid armor footer line {:?}", line))?;
        ensure!(
            Some(typ) == self.typ,
            MalformedArmor,
            "armor footer {} does not match header {:?}",
            typ,
            self.typ
        );
        ensure!(
            self.pending.is_empty(),
            MalformedArmor,
            "base64 body length is not a multiple of four"
        );

        if let Some(expected) = self.checksum {
            let actual = (self.crc.finish() & 0xFF_FFFF) as u32;
            ensure!(
                expected == actual,
                MalformedArmor,
                "checksum mismatch: expected {:06X}, got {:06X}",
                expected,
                actual
            );
        }
        self.state = State::Done;

        Ok(())
    }

    /// Decodes lines until there is output or the footer was consumed.
    fn fill(&mut self) -> Result<()> {
        if self.state == State::Header {
            self.read_header()?;
        }

        while self.pos >= self.decoded.len() && self.state == State::Body {
            self.decoded.clear();
            self.pos = 0;

            let Some(line) = self.next_line()? else {
                bail!(MalformedArmor, "missing armor footer");
            };
            if line.is_empty() {
                continue;
            }
            if line.starts_with("-----") {
                self.footer(&line)?;
            } else {
                self.body_line(&line)?;
            }
        }

        Ok(())
    }
}

impl<R: BufRead> Read for Dearmor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill()?;

        let available = &self.decoded[self.pos..];
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.pos += len;

        Ok(len)
    }
}

/// Decodes armored text into binary. Binary input is returned unchanged.
pub fn decode(input: &[u8]) -> Result<Vec<u8>> {
    match input.first() {
        Some(first) if is_binary(*first) => Ok(input.to_vec()),
        _ => {
            let mut dearmor = Dearmor::new(input);
            let mut out = Vec::new();
            dearmor.read_to_end(&mut out)?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::armor::encode;
    use crate::errors::Error;

    #[test]
    fn test_armor_header_line() {
        assert_eq!(
            armor_header_line("-----BEGIN PGP MESSAGE-----").unwrap(),
            ("", BlockType::Message)
        );
        assert_eq!(
            armor_header_line("-----BEGIN PGP PUBLIC KEY BLOCK-----").unwrap(),
            ("", BlockType::PublicKey)
        );
        assert!(armor_header_line("-----BEGIN PGP MESSAGE, PART 1-----").is_err());
        assert!(armor_header_line("-----BEGIN PGP SIGNATURE-----").is_err());
    }

    #[test]
    fn test_key_value_pair() {
        assert_eq!(
            key_value_pair("Version: GnuPG v1").unwrap(),
            ("", ("Version", " GnuPG v1"))
        );
        assert!(key_value_pair("mQENBFi").is_err());
    }

    #[test]
    fn test_parse_armor_small() {
        let c = "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\
                 Version: GnuPG v1\n\
                 \n\
                 aGVsbG8gd29ybGQ=\n\
                 -----END PGP PUBLIC KEY BLOCK-----\n";

        let mut dearmor = Dearmor::new(c.as_bytes());
        let mut out = Vec::new();
        dearmor.read_to_end(&mut out).unwrap();

        assert_eq!(dearmor.typ(), Some(BlockType::PublicKey));
        assert_eq!(
            dearmor.headers().get("Version"),
            Some(&vec!["GnuPG v1".to_string()])
        );
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_parse_armor_crlf_and_leading_text() {
        let c = "some preamble\r\n-----BEGIN PGP MESSAGE-----\r\n\r\naGVsbG8gd29ybGQ=\r\n-----END PGP MESSAGE-----\r\n";
        assert_eq!(decode(c.as_bytes()).unwrap(), b"hello world");
    }

    #[test]
    fn test_roundtrip_with_checksum() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        let armored = encode(BlockType::Message, None, &data).unwrap();
        assert!(armored.contains("\n="));
        assert_eq!(decode(armored.as_bytes()).unwrap(), data);
    }

    #[test]
    fn test_checksum_mismatch() {
        let armored = encode(BlockType::Message, None, b"hello world").unwrap();
        let tampered = armored.replace("aGVsbG8gd29ybGQ=", "aGVsbG8gd29ybGR=");
        assert_ne!(armored, tampered);
        let err = decode(tampered.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedArmor { .. }), "{err:?}");
    }

    #[test]
    fn test_missing_header_and_footer() {
        let err = decode(b"aGVsbG8gd29ybGQ=\n").unwrap_err();
        assert!(matches!(err, Error::MalformedArmor { .. }), "{err:?}");

        let err = decode(b"-----BEGIN PGP MESSAGE-----\n\naGVsbG8gd29ybGQ=\n").unwrap_err();
        assert!(matches!(err, Error::MalformedArmor { .. }), "{err:?}");
    }

    #[test]
    fn test_footer_type_mismatch() {
        let c = "-----BEGIN PGP MESSAGE-----\n\naGVsbG8gd29ybGQ=\n-----END PGP PUBLIC KEY BLOCK-----\n";
        let err = decode(c.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedArmor { .. }), "{err:?}");
    }

    #[test]
    fn test_invalid_base64() {
        let c = "-----BEGIN PGP MESSAGE-----\n\naGVs*G8gd29ybGQ=\n-----END PGP MESSAGE-----\n";
        let err = decode(c.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedArmor { .. }), "{err:?}");
    }

    #[test]
    fn test_binary_passthrough() {
        let binary = [0xC1u8, 0x02, 0x03];
        assert_eq!(decode(&binary).unwrap(), binary.to_vec());
    }
}
