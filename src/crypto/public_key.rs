use num_enum::{FromPrimitive, IntoPrimitive};

use crate::types::Capability;

/// Public key algorithm ids.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-9.1>
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive, derive_more::Display)]
#[repr(u8)]
pub enum PublicKeyAlgorithm {
    /// RSA (Encrypt and Sign)
    RSA = 1,
    /// DEPRECATED: RSA (Encrypt-Only)
    RSAEncrypt = 2,
    /// DEPRECATED: RSA (Sign-Only)
    RSASign = 3,
    /// Elgamal (Encrypt-Only)
    Elgamal = 16,
    /// DSA (Digital Signature Algorithm)
    DSA = 17,
    /// Elliptic Curve: RFC-6637
    ECDH = 18,
    /// ECDSA: RFC-6637
    ECDSA = 19,
    /// EdDSA legacy format
    EdDSALegacy = 22,

    #[num_enum(catch_all)]
    #[display("Unknown({_0})")]
    Unknown(u8),
}

impl PublicKeyAlgorithm {
    pub fn is_rsa(self) -> bool {
        matches!(
            self,
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign
        )
    }

    /// What the algorithm can do at all, regardless of key flags.
    ///
    /// Only RSA is implemented, every other algorithm reports no capability.
    pub fn can(self, capability: Capability) -> bool {
        match (self, capability) {
            (PublicKeyAlgorithm::RSA, _) => true,
            (PublicKeyAlgorithm::RSAEncrypt, Capability::Encryption) => true,
            (PublicKeyAlgorithm::RSASign, Capability::Signing) => true,
            _ => false,
        }
    }
}
