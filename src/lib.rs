//! # webpgp
//!
//! A streaming OpenPGP message engine for RSA keys: key generation, key
//! rings, encrypt-and-sign and decrypt-and-verify, with ASCII armor.
//!
//! The [`engine`] functions take key blocks as text and are all most callers
//! need. The [`composed`] and [`packet`] modules expose the layers beneath.
//!
//! Only the RFC 4880 subset needed for messages of the shape
//! `PKESK, SEIPD(CompressedData(OnePassSignature, LiteralData, Signature))`
//! is implemented.

#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod armor;
pub mod composed;
pub mod crypto;
pub mod engine;
pub mod errors;
pub mod packet;
pub mod ser;
pub mod types;

mod parsing;
mod util;

pub use self::composed::{
    DecryptOptions, DecryptionResult, EncryptOptions, KeyGenParams, KeyGenParamsBuilder, KeyPair,
    Verification,
};
pub use self::engine::{
    decrypt, decrypt_file, decrypt_with, encrypt, encrypt_file, encrypt_with, generate_key_pair,
    generate_key_pair_with,
};
pub use self::errors::{Error, Result};
