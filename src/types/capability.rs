use std::fmt;

/// What a key is needed for in an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Capability {
    #[display("encryption")]
    Encryption,
    #[display("signing")]
    Signing,
}

/// Key Flags subpacket contents.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.3.21>
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyFlags(u8);

impl KeyFlags {
    const CERTIFY: u8 = 0x01;
    const SIGN: u8 = 0x02;
    const ENCRYPT_COMMS: u8 = 0x04;
    const ENCRYPT_STORAGE: u8 = 0x08;

    pub fn from_bits(bits: u8) -> Self {
        KeyFlags(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Flags for a primary key used for everything.
    pub fn all() -> Self {
        KeyFlags(Self::CERTIFY | Self::SIGN | Self::ENCRYPT_COMMS | Self::ENCRYPT_STORAGE)
    }

    pub fn certify(self) -> bool {
        self.0 & Self::CERTIFY != 0
    }

    pub fn sign(self) -> bool {
        self.0 & Self::SIGN != 0
    }

    pub fn encrypt_comms(self) -> bool {
        self.0 & Self::ENCRYPT_COMMS != 0
    }

    pub fn encrypt_storage(self) -> bool {
        self.0 & Self::ENCRYPT_STORAGE != 0
    }

    pub fn allows(self, capability: Capability) -> bool {
        match capability {
            Capability::Encryption => self.encrypt_comms() || self.encrypt_storage(),
            Capability::Signing => self.sign(),
        }
    }
}

impl fmt::Debug for KeyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFlags")
            .field("certify", &self.certify())
            .field("sign", &self.sign())
            .field("encrypt_comms", &self.encrypt_comms())
            .field("encrypt_storage", &self.encrypt_storage())
            .finish()
    }
}
