//! Parsing functions to parse data using [Buf].

use bytes::{Buf, Bytes};

use crate::errors::{format_err, Error};

/// Bounds checked reads over a [`Buf`].
///
/// Every read reports a short buffer as [`Error::MalformedMessage`], naming
/// what was being read.
pub trait BufParsing: Buf + Sized {
    fn read_u8(&mut self) -> Result<u8, Error> {
        self.ensure_remaining(1, "u8")?;
        Ok(self.get_u8())
    }

    fn read_be_u16(&mut self) -> Result<u16, Error> {
        self.ensure_remaining(2, "u16")?;
        Ok(self.get_u16())
    }

    fn read_be_u32(&mut self) -> Result<u32, Error> {
        self.ensure_remaining(4, "u32")?;
        Ok(self.get_u32())
    }

    fn read_array<const C: usize>(&mut self) -> Result<[u8; C], Error> {
        self.ensure_remaining(C, "array")?;
        let mut arr = [0u8; C];
        self.copy_to_slice(&mut arr);
        Ok(arr)
    }

    fn read_take(&mut self, size: usize) -> Result<Bytes, Error> {
        self.ensure_remaining(size, "bytes")?;
        Ok(self.copy_to_bytes(size))
    }

    fn rest(&mut self) -> Bytes {
        let len = self.remaining();
        self.copy_to_bytes(len)
    }

    fn ensure_remaining(&self, size: usize, what: &'static str) -> Result<(), Error> {
        if self.remaining() < size {
            return Err(format_err!(
                MalformedMessage,
                "packet too short reading {}: needed {}, remaining {}",
                what,
                size,
                self.remaining()
            ));
        }

        Ok(())
    }
}

impl<B: Buf> BufParsing for B {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn reads_in_order() {
        let mut buf = Bytes::from_static(&[1, 0, 2, 0, 0, 0, 3, 9, 9]);
        assert_eq!(buf.read_u8().unwrap(), 1);
        assert_eq!(buf.read_be_u16().unwrap(), 2);
        assert_eq!(buf.read_be_u32().unwrap(), 3);
        assert_eq!(buf.read_array::<2>().unwrap(), [9, 9]);
        assert!(buf.rest().is_empty());
    }

    #[test]
    fn short_reads_fail() {
        let mut buf = Bytes::from_static(&[1]);
        let err = buf.read_be_u32().unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
        // nothing consumed
        assert_eq!(buf.remaining(), 1);
    }
}
