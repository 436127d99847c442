use std::io::{self, BufRead, Read};

use log::debug;

use super::PacketHeader;
use crate::errors::{format_err, Error, Result};
use crate::types::{PacketLength, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Remaining {
    /// Bytes left in the current (final) segment.
    Fixed(usize),
    /// Bytes left in a partial chunk, another length follows it.
    Partial(usize),
    /// Runs until the source is exhausted.
    Indeterminate,
}

/// Reads the body of a single packet, following partial body chunks.
///
/// The reader never consumes past the end of the packet, so the source can
/// be reused for the next packet once this reader is done (see
/// [`Self::into_inner`]).
#[derive(Debug)]
pub struct PacketBodyReader<R: BufRead> {
    header: PacketHeader,
    source: R,
    remaining: Remaining,
}

fn truncated() -> io::Error {
    Error::MalformedMessage {
        message: "packet body truncated".to_string(),
    }
    .into()
}

impl<R: BufRead> PacketBodyReader<R> {
    pub fn new(header: PacketHeader, source: R) -> Self {
        let remaining = match header.packet_length() {
            PacketLength::Fixed(len) => Remaining::Fixed(len),
            PacketLength::Partial(len) => Remaining::Partial(len as usize),
            PacketLength::Indeterminate => Remaining::Indeterminate,
        };

        PacketBodyReader {
            header,
            source,
            remaining,
        }
    }

    pub fn packet_header(&self) -> PacketHeader {
        self.header
    }

    pub fn tag(&self) -> Tag {
        self.header.tag()
    }

    pub fn is_done(&self) -> bool {
        self.remaining == Remaining::Fixed(0)
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Skips whatever is left of the body.
    pub fn drain(&mut self) -> Result<u64> {
        let skipped = io::copy(self, &mut io::sink())?;
        if skipped > 0 {
            debug!("skipped {} bytes of {:?}", skipped, self.header.tag());
        }
        Ok(skipped)
    }

    /// Reads the whole (remaining) body into memory.
    pub fn read_body(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(self.header.packet_length().maybe_len().unwrap_or(0));
        self.read_to_end(&mut body)?;
        Ok(body)
    }

    /// Moves on to the next chunk once a partial chunk is exhausted.
    fn next_chunk(&mut self) -> io::Result<()> {
        while self.remaining == Remaining::Partial(0) {
            self.remaining = match PacketLength::try_from_reader(&mut self.source) {
                Ok(PacketLength::Fixed(len)) => Remaining::Fixed(len),
                Ok(PacketLength::Partial(len)) => Remaining::Partial(len as usize),
                Ok(PacketLength::Indeterminate) => {
                    return Err(format_err!(MalformedMessage, "invalid partial body length").into())
                }
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Err(truncated()),
                Err(err) => return Err(err),
            };
        }
        Ok(())
    }
}

impl<R: BufRead> BufRead for PacketBodyReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.next_chunk()?;

        let limit = match self.remaining {
            Remaining::Fixed(n) | Remaining::Partial(n) => Some(n),
            Remaining::Indeterminate => None,
        };
        if limit == Some(0) {
            return Ok(&[][..]);
        }

        let buf = self.source.fill_buf()?;
        match limit {
            None => Ok(buf),
            Some(n) => {
                if buf.is_empty() {
                    return Err(truncated());
                }
                let len = buf.len().min(n);
                Ok(&buf[..len])
            }
        }
    }

    fn consume(&mut self, amt: usize) {
        self.source.consume(amt);
        match &mut self.remaining {
            Remaining::Fixed(n) | Remaining::Partial(n) => *n -= amt.min(*n),
            Remaining::Indeterminate => {}
        }
    }
}

impl<R: BufRead> Read for PacketBodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(data: &[u8]) -> (Vec<u8>, usize) {
        let mut source = data;
        let header = PacketHeader::from_reader(&mut source).unwrap().unwrap();
        let mut reader = PacketBodyReader::new(header, &mut source);
        let body = reader.read_body().unwrap();
        assert!(reader.is_done() || header.packet_length() == PacketLength::Indeterminate);
        (body, source.len())
    }

    #[test]
    fn fixed_body_stops_at_packet_end() {
        let (body, rest) = parse(&[0xCB, 0x03, 1, 2, 3, 0xCB, 0x00]);
        assert_eq!(body, vec![1, 2, 3]);
        assert_eq!(rest, 2);
    }

    #[test]
    fn partial_chunks() {
        let mut data = vec![0xCB, 0xE9]; // 512 byte chunk
        data.extend(std::iter::repeat(1u8).take(512));
        data.push(0xE9); // another 512
        data.extend(std::iter::repeat(2u8).take(512));
        data.push(0x03); // final 3
        data.extend([3u8, 3, 3]);
        data.extend([0xFF, 0xFF]); // trailing, not part of the packet

        let (body, rest) = parse(&data);
        assert_eq!(body.len(), 1027);
        assert!(body[..512].iter().all(|b| *b == 1));
        assert!(body[512..1024].iter().all(|b| *b == 2));
        assert_eq!(&body[1024..], &[3, 3, 3]);
        assert_eq!(rest, 2);
    }

    #[test]
    fn partial_with_empty_final_chunk() {
        let mut data = vec![0xCB, 0xE9];
        data.extend(std::iter::repeat(7u8).take(512));
        data.push(0x00);
        let (body, rest) = parse(&data);
        assert_eq!(body.len(), 512);
        assert_eq!(rest, 0);
    }

    #[test]
    fn indeterminate_runs_to_end() {
        let (body, rest) = parse(&[0xAF, 1, 2, 3, 4]);
        assert_eq!(body, vec![1, 2, 3, 4]);
        assert_eq!(rest, 0);
    }

    #[test]
    fn truncated_body() {
        let mut source = &[0xCB, 0x05, 1, 2][..];
        let header = PacketHeader::from_reader(&mut source).unwrap().unwrap();
        let mut reader = PacketBodyReader::new(header, &mut source);
        let err = reader.read_body().unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }), "{err:?}");
    }
}
