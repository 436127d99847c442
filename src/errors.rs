use std::io;
use std::num::TryFromIntError;

use snafu::Snafu;

use crate::types::{Capability, KeyId};

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

/// Error types
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("input not found: {path}"))]
    InputNotFound { path: String },
    #[snafu(display("invalid key material: {message}"))]
    InvalidKeyMaterial { message: String },
    #[snafu(display("malformed armor: {message}"))]
    MalformedArmor { message: String },
    #[snafu(display("invalid output path: {message}"))]
    InvalidOutputPath { message: String },
    #[snafu(display("passphrase does not unlock key {key_id}"))]
    PassphraseMismatch { key_id: KeyId },
    #[snafu(display("no key with {capability} capability in key ring"))]
    KeyNotFound { capability: Capability },
    #[snafu(display("no secret key available for any recipient of the message"))]
    SecretKeyNotFound,
    #[snafu(display("unsupported message type: {message}"))]
    UnsupportedMessageType { message: String },
    #[snafu(display("malformed message: {message}"))]
    MalformedMessage { message: String },
    #[snafu(display("crypto operation failed: {message}"))]
    CryptoOperation { message: String },
    #[snafu(display("invalid parameters: {message}"))]
    InvalidParameters { message: String },
    #[snafu(display("io error: {source}"))]
    Io { source: io::Error },
}

impl Error {
    /// Re-labels parse failures as key material failures.
    ///
    /// Packet level parsing is shared between messages and key blocks, key
    /// ring readers report everything they could not understand as
    /// [`Error::InvalidKeyMaterial`].
    pub(crate) fn into_key_material(self) -> Self {
        match self {
            Error::MalformedMessage { message }
            | Error::MalformedArmor { message }
            | Error::UnsupportedMessageType { message } => Error::InvalidKeyMaterial { message },
            Error::Io { source } if source.kind() == io::ErrorKind::UnexpectedEof => {
                Error::InvalidKeyMaterial {
                    message: format!("truncated key block: {source}"),
                }
            }
            other => other,
        }
    }
}

/// Errors travel through `std::io` adapters wrapped in an `io::Error`,
/// this unwraps them again so callers see the original variant.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let kind = err.kind();
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(inner) = err.into_inner() {
                return match inner.downcast::<Error>() {
                    Ok(inner) => *inner,
                    Err(other) => Error::Io {
                        source: io::Error::new(kind, other),
                    },
                };
            }
            return Error::Io {
                source: kind.into(),
            };
        }

        Error::Io { source: err }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::Io { source } => source,
            other => io::Error::other(other),
        }
    }
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Error {
        Error::CryptoOperation {
            message: format!("rsa: {err}"),
        }
    }
}

impl From<cipher::InvalidLength> for Error {
    fn from(_: cipher::InvalidLength) -> Error {
        Error::CryptoOperation {
            message: "cfb: invalid key iv length".to_string(),
        }
    }
}

impl From<TryFromIntError> for Error {
    fn from(err: TryFromIntError) -> Error {
        Error::MalformedMessage {
            message: err.to_string(),
        }
    }
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(err: derive_builder::UninitializedFieldError) -> Error {
        Error::InvalidParameters {
            message: err.to_string(),
        }
    }
}

macro_rules! bail {
    ($kind:ident, $e:expr) => {
        return Err($crate::errors::Error::$kind { message: $e.to_string() })
    };
    ($kind:ident, $fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::$kind { message: format!($fmt, $($arg)+) })
    };
}

macro_rules! format_err {
    ($kind:ident, $e:expr) => {
        $crate::errors::Error::$kind { message: $e.to_string() }
    };
    ($kind:ident, $fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::$kind { message: format!($fmt, $($arg)+) }
    };
}

macro_rules! ensure {
    ($cond:expr, $kind:ident, $e:expr) => {
        if !($cond) {
            $crate::errors::bail!($kind, $e);
        }
    };
    ($cond:expr, $kind:ident, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            $crate::errors::bail!($kind, $fmt, $($arg)+);
        }
    };
}

macro_rules! ensure_eq {
    ($left:expr, $right:expr, $kind:ident, $what:expr) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::errors::bail!(
                        $kind,
                        "{}: expected {:?}, found {:?}",
                        $what,
                        right_val,
                        left_val
                    );
                }
            }
        }
    }};
}

pub(crate) use {bail, ensure, ensure_eq, format_err};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_roundtrip_keeps_variant() {
        let err = Error::CryptoOperation {
            message: "mdc".into(),
        };
        let io_err: io::Error = err.into();
        let back: Error = io_err.into();
        assert!(matches!(back, Error::CryptoOperation { message } if message == "mdc"));
    }

    #[test]
    fn plain_io_errors_stay_io() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let err: Error = io_err.into();
        match err {
            Error::Io { source } => assert_eq!(source.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn key_material_relabel() {
        let err = format_err!(MalformedMessage, "bad tag {}", 3).into_key_material();
        assert!(matches!(err, Error::InvalidKeyMaterial { message } if message == "bad tag 3"));
    }
}
