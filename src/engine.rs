//! # Engine
//!
//! Text-in, stream-out entry points. Keys are passed as armored (or binary)
//! key blocks on every call, nothing is cached between calls.
//!
//! ```no_run
//! # fn main() -> webpgp::errors::Result<()> {
//! let alice = webpgp::generate_key_pair("Alice <alice@example.com>", "correct horse")?;
//!
//! let mut message = Vec::new();
//! webpgp::encrypt(
//!     &b"hello"[..],
//!     &alice.public_key_text,
//!     &alice.secret_key_text,
//!     "correct horse",
//!     &mut message,
//! )?;
//!
//! let mut plaintext = Vec::new();
//! let result = webpgp::decrypt(&message[..], &alice.secret_key_text, "correct horse", &mut plaintext)?;
//! assert!(result.is_verified());
//! # Ok(())
//! # }
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use rand::{thread_rng, CryptoRng, Rng};

use crate::armor::{ArmorWriter, BlockType};
use crate::composed::message::encrypt_and_sign;
use crate::composed::{
    read_public_key_ring, read_secret_key_ring, DecryptOptions, DecryptionResult,
    EncryptOptions, KeyGenParams, KeyGenParamsBuilder, KeyPair, MessageDecoder, SignedPublicKey,
    UnlockedKey,
};
use crate::errors::{ensure, format_err, Error, Result};
use crate::types::Capability;

/// Generates a 3072 bit RSA key pair with the default policy.
pub fn generate_key_pair(user_id: &str, passphrase: &str) -> Result<KeyPair> {
    let params = KeyGenParamsBuilder::default()
        .user_id(user_id.to_string())
        .passphrase(passphrase.to_string())
        .build()?;

    generate_key_pair_with(&mut thread_rng(), &params)
}

pub fn generate_key_pair_with<R: CryptoRng + Rng>(
    rng: &mut R,
    params: &KeyGenParams,
) -> Result<KeyPair> {
    params.generate(rng)
}

/// Encrypts `input` to the first encryption capable key of the recipient
/// block and signs it with the first signing capable key of the signer block.
pub fn encrypt<I: Read, W: Write>(
    input: I,
    recipient_public_key_text: &str,
    signer_private_key_text: &str,
    signer_passphrase: &str,
    output: W,
) -> Result<()> {
    encrypt_with(
        input,
        recipient_public_key_text,
        signer_private_key_text,
        signer_passphrase,
        output,
        &EncryptOptions::default(),
        &mut thread_rng(),
    )
}

pub fn encrypt_with<I: Read, W: Write, R: CryptoRng + Rng>(
    input: I,
    recipient_public_key_text: &str,
    signer_private_key_text: &str,
    signer_passphrase: &str,
    output: W,
    options: &EncryptOptions,
    rng: &mut R,
) -> Result<()> {
    options.validate()?;
    let keys = MessageKeys::prepare(
        recipient_public_key_text,
        signer_private_key_text,
        signer_passphrase,
    )?;

    keys.write_message(rng, input, output, options)
}

/// Recipient and signer of a message, resolved and unlocked before any
/// output is touched.
struct MessageKeys {
    recipient: SignedPublicKey,
    signer: UnlockedKey,
    signer_public: SignedPublicKey,
}

impl MessageKeys {
    fn prepare(
        recipient_public_key_text: &str,
        signer_private_key_text: &str,
        signer_passphrase: &str,
    ) -> Result<Self> {
        let recipients = read_public_key_ring(recipient_public_key_text.as_bytes())?;
        let recipient = recipients.select_first(Capability::Encryption)?.clone();

        let signers = read_secret_key_ring(signer_private_key_text.as_bytes())?;
        let signer = signers.select_first(Capability::Signing)?;
        let signer_public = signer.public_key();
        let signer = signer.unlock(signer_passphrase)?;

        Ok(MessageKeys {
            recipient,
            signer,
            signer_public,
        })
    }

    fn write_message<I: Read, W: Write, R: CryptoRng + Rng>(
        &self,
        rng: &mut R,
        input: I,
        output: W,
        options: &EncryptOptions,
    ) -> Result<()> {
        let MessageKeys {
            recipient,
            signer,
            signer_public,
        } = self;

        let mut output = if options.is_armored() {
            let armored = ArmorWriter::new(output, BlockType::Message, None)?;
            encrypt_and_sign(rng, input, recipient, signer, signer_public, options, armored)?
                .finish()?
        } else {
            encrypt_and_sign(rng, input, recipient, signer, signer_public, options, output)?
        };
        output.flush()?;

        Ok(())
    }
}

/// Decrypts `input`, armored or binary, with the secret key ring, writing the
/// plaintext to `output`.
pub fn decrypt<I: Read, W: Write>(
    input: I,
    secret_key_ring_text: &str,
    passphrase: &str,
    output: W,
) -> Result<DecryptionResult> {
    decrypt_with(
        input,
        secret_key_ring_text,
        passphrase,
        output,
        &DecryptOptions::default(),
    )
}

pub fn decrypt_with<I: Read, W: Write>(
    input: I,
    secret_key_ring_text: &str,
    passphrase: &str,
    output: W,
    options: &DecryptOptions,
) -> Result<DecryptionResult> {
    let ring = read_secret_key_ring(secret_key_ring_text.as_bytes())?;
    MessageDecoder::new(&ring, passphrase, options).decrypt(input, output)
}

/// Encrypts and signs the file at `input_path` into `output_path`.
///
/// The literal data records the input's file name and modification time. On
/// failure a partially written output file is removed.
pub fn encrypt_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    recipient_public_key_text: &str,
    signer_private_key_text: &str,
    passphrase: &str,
    output_path: Q,
) -> Result<()> {
    let input_path = input_path.as_ref();
    let output_path = output_path.as_ref();

    let metadata = check_input(input_path)?;
    check_key_text(recipient_public_key_text, "recipient public key")?;
    check_key_text(signer_private_key_text, "signer private key")?;
    check_output(output_path)?;

    let mut options = EncryptOptions::default().file_name(literal_file_name(input_path));
    match metadata.modified() {
        Ok(modified) => options = options.modification_time(DateTime::<Utc>::from(modified)),
        Err(err) => warn!("no modification time for {}: {}", input_path.display(), err),
    }

    options.validate()?;
    let keys = MessageKeys::prepare(
        recipient_public_key_text,
        signer_private_key_text,
        passphrase,
    )?;

    let input = BufReader::new(File::open(input_path)?);
    with_output(output_path, |output| {
        keys.write_message(&mut thread_rng(), input, output, &options)
    })?;
    info!(
        "encrypted {} to {}",
        input_path.display(),
        output_path.display()
    );

    Ok(())
}

/// Decrypts the file at `input_path` into `output_path`.
///
/// On failure a partially written output file is removed.
pub fn decrypt_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    secret_key_ring_text: &str,
    passphrase: &str,
    output_path: Q,
) -> Result<DecryptionResult> {
    let input_path = input_path.as_ref();
    let output_path = output_path.as_ref();

    check_input(input_path)?;
    check_key_text(secret_key_ring_text, "secret key ring")?;
    check_output(output_path)?;

    let ring = read_secret_key_ring(secret_key_ring_text.as_bytes())?;
    let options = DecryptOptions::default();

    let input = BufReader::new(File::open(input_path)?);
    let result = with_output(output_path, |output| {
        MessageDecoder::new(&ring, passphrase, &options).decrypt(input, output)
    })?;
    info!(
        "decrypted {} to {}",
        input_path.display(),
        output_path.display()
    );

    Ok(result)
}

fn check_input(path: &Path) -> Result<fs::Metadata> {
    let not_found = || Error::InputNotFound {
        path: path.display().to_string(),
    };
    let metadata = fs::metadata(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => not_found(),
        _ => err.into(),
    })?;
    if !metadata.is_file() {
        return Err(not_found());
    }

    Ok(metadata)
}

fn check_key_text(text: &str, what: &str) -> Result<()> {
    ensure!(!text.trim().is_empty(), InvalidKeyMaterial, "{} is empty", what);
    Ok(())
}

fn check_output(path: &Path) -> Result<()> {
    ensure!(
        !path.as_os_str().is_empty(),
        InvalidOutputPath,
        "output path is empty"
    );
    Ok(())
}

/// The input's file name, cut to what fits a literal data packet.
fn literal_file_name(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.len() > 255 {
        let mut end = 255;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Runs `write` against a freshly created file at `path`, removing the file
/// again if anything fails.
fn with_output<T, F>(path: &Path, write: F) -> Result<T>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<T>,
{
    let file = File::create(path)
        .map_err(|err| format_err!(InvalidOutputPath, "{}: {}", path.display(), err))?;
    let mut output = BufWriter::new(file);

    let res = write(&mut output).and_then(|value| {
        output.flush()?;
        Ok(value)
    });
    if res.is_err() {
        drop(output);
        if let Err(err) = fs::remove_file(path) {
            warn!("failed to remove {}: {}", path.display(), err);
        }
    }

    res
}
