//! # Armor module
//!
//! ASCII armor: the textual envelope around binary keys and messages.
//!
//! Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-6.2>

use std::collections::BTreeMap;
use std::fmt;

mod reader;
mod writer;

pub use self::reader::{decode, is_binary, Dearmor};
pub use self::writer::{encode, ArmorWriter};

/// Armor block types.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum BlockType {
    /// PGP public key
    PublicKey,
    /// PGP private key
    PrivateKey,
    /// PGP message
    Message,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::PublicKey => f.write_str("PGP PUBLIC KEY BLOCK"),
            BlockType::PrivateKey => f.write_str("PGP PRIVATE KEY BLOCK"),
            BlockType::Message => f.write_str("PGP MESSAGE"),
        }
    }
}

/// Armor Headers.
pub type Headers = BTreeMap<String, Vec<String>>;
