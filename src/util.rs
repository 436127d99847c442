//! # Utilities

use std::io;

use byteorder::{BigEndian, WriteBytesExt};

/// Strips leading zero octets, as required for the canonical form of an MPI.
#[inline]
pub fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let offset = bytes.iter().take_while(|b| **b == 0).count();
    &bytes[offset..]
}

/// Left pads `bytes` with zeros to `size` octets.
pub fn left_pad(bytes: &[u8], size: usize) -> Vec<u8> {
    if bytes.len() >= size {
        return bytes.to_vec();
    }
    let mut padded = vec![0u8; size];
    padded[size - bytes.len()..].copy_from_slice(bytes);
    padded
}

/// Reads until `buffer` is full or the source is exhausted.
///
/// Returns the number of bytes read, anything less than `buffer.len()` means EOF.
pub fn fill_buffer<R: io::Read>(mut source: R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut offset = 0;
    while offset < buffer.len() {
        match source.read(&mut buffer[offset..]) {
            Ok(0) => break,
            Ok(read) => offset += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(offset)
}

/// Writes a new style (one, two or five octet) length.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.2.2>
pub fn write_packet_length(len: usize, writer: &mut impl io::Write) -> io::Result<()> {
    if len < 192 {
        writer.write_u8(len as u8)?;
    } else if len < 8384 {
        writer.write_u8((((len - 192) >> 8) + 192) as u8)?;
        writer.write_u8(((len - 192) & 0xFF) as u8)?;
    } else {
        let len = u32::try_from(len).map_err(io::Error::other)?;
        writer.write_u8(255)?;
        writer.write_u32::<BigEndian>(len)?;
    }

    Ok(())
}

/// Number of bytes [`write_packet_length`] emits for `len`.
pub fn packet_length_len(len: usize) -> usize {
    if len < 192 {
        1
    } else if len < 8384 {
        2
    } else {
        5
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn length_encodings() {
        for (len, expected) in [
            (0usize, vec![0u8]),
            (191, vec![191]),
            (192, vec![192, 0]),
            (1723, vec![197, 251]),
            (8383, vec![223, 255]),
            (100_000, vec![255, 0, 1, 134, 160]),
        ] {
            let mut out = Vec::new();
            write_packet_length(len, &mut out).unwrap();
            assert_eq!(out, expected, "length {len}");
            assert_eq!(packet_length_len(len), expected.len());
        }
    }

    #[test]
    fn fill_buffer_short_source() {
        let mut buf = [0u8; 8];
        let read = fill_buffer(&b"abc"[..], &mut buf).unwrap();
        assert_eq!(read, 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn padding() {
        assert_eq!(strip_leading_zeros(&[0, 0, 1, 0]), &[1, 0]);
        assert_eq!(left_pad(&[1, 2], 4), vec![0, 0, 1, 2]);
        assert_eq!(left_pad(&[1, 2], 1), vec![1, 2]);
    }
}
