use crate::errors::{ensure_eq, Result};

/// Two-octet checksum: the sum of all octets, mod 65536.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.1>
#[inline]
pub fn calculate_simple(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)))
}

/// Verifies a two-octet checksum.
pub fn simple(actual: &[u8], data: &[u8]) -> Result<()> {
    ensure_eq!(
        &actual[..],
        &calculate_simple(data).to_be_bytes()[..],
        CryptoOperation,
        "checksum"
    );
    Ok(())
}
