use std::io::{self, Read, Write};

use chrono::{SubsecRound, Utc};
use digest::DynDigest;
use log::debug;
use rand::{CryptoRng, Rng};

use crate::composed::{KeyDetails, SignedPublicKey, UnlockedKey};
use crate::crypto::sym::ProtectedDataWriter;
use crate::errors::{ensure, Result};
use crate::packet::{
    write_packet, Compressor, LiteralDataHeader, OnePassSignature, PartialBodyWriter,
    PublicKeyEncryptedSessionKey, SignatureConfig, SignatureType, Subpacket, SubpacketData,
    SymEncryptedProtectedData,
};
use crate::ser::Serialize;
use crate::types::{Capability, Tag};
use crate::util::fill_buffer;

use super::EncryptOptions;

type EncryptedWriter<W> = ProtectedDataWriter<PartialBodyWriter<W>>;
type CompressedWriter<W> = Compressor<PartialBodyWriter<EncryptedWriter<W>>>;
type LiteralWriter<W> = PartialBodyWriter<CompressedWriter<W>>;

/// Streams plaintext into an encrypted, compressed and one-pass signed message.
///
/// Everything up to the literal data header is written on construction.
/// Plaintext written to the encoder is framed as literal data and hashed for
/// the signature in the same pass. [`Self::finish`] appends the signature
/// and closes the layers from the inside out.
///
/// Dropping the encoder without calling [`Self::finish`] leaves a truncated
/// message behind.
pub struct MessageEncoder<'k, W: Write> {
    literal: LiteralWriter<W>,
    hasher: Box<dyn DynDigest>,
    config: SignatureConfig,
    signer: &'k UnlockedKey,
}

impl<'k, W: Write> MessageEncoder<'k, W> {
    /// Writes the session key packet and opens the encrypted, compressed and
    /// literal layers.
    pub fn new<R: CryptoRng + Rng>(
        rng: &mut R,
        recipient: &SignedPublicKey,
        signer: &'k UnlockedKey,
        signer_public: &SignedPublicKey,
        options: &EncryptOptions,
        mut out: W,
    ) -> Result<Self> {
        options.validate()?;
        ensure!(
            recipient.can(Capability::Encryption),
            InvalidParameters,
            "key {} can not be used for encryption",
            recipient.key_id()
        );
        ensure!(
            signer.key_id() == signer_public.key_id(),
            InvalidParameters,
            "signer public key {} does not match the unlocked key {}",
            signer_public.key_id(),
            signer.key_id()
        );

        let created = options
            .modification_time
            .unwrap_or_else(Utc::now)
            .trunc_subsecs(0);
        let literal_header = LiteralDataHeader::new(&options.file_name, created)?;
        let config = signature_config(signer, signer_public, options);
        let hasher = config.new_hasher()?;

        // session key layer
        let session_key = options.sym_alg.new_session_key(rng);
        let esk = PublicKeyEncryptedSessionKey::from_session_key(
            rng,
            &session_key,
            options.sym_alg,
            &recipient.primary_key,
        )?;
        write_packet(&mut out, &esk)?;

        let encrypted = SymEncryptedProtectedData::encryptor(
            rng,
            options.sym_alg,
            &session_key,
            PartialBodyWriter::new(Tag::SymEncryptedProtectedData, options.chunk_size, out)?,
        )?;

        // compression layer
        let mut compressed = Compressor::new(
            options.compression,
            PartialBodyWriter::new(Tag::CompressedData, options.chunk_size, encrypted)?,
        )?;

        // signature intent, then the literal data layer
        let ops = OnePassSignature::new(
            config.typ,
            config.hash_alg,
            config.pub_alg,
            signer.key_id(),
        );
        write_packet(&mut compressed, &ops)?;

        let mut literal = PartialBodyWriter::new(Tag::LiteralData, options.chunk_size, compressed)?;
        literal_header.to_writer(&mut literal)?;
        debug!(
            "writing message to {} signed by {}",
            recipient.key_id(),
            signer.key_id()
        );

        Ok(MessageEncoder {
            literal,
            hasher,
            config,
            signer,
        })
    }

    /// Signs the content, closes all layers and returns the output writer.
    pub fn finish(self) -> Result<W> {
        let MessageEncoder {
            literal,
            hasher,
            config,
            signer,
        } = self;

        let mut compressed = literal.finish()?;
        let signature = config.sign_hasher(signer.secret(), hasher)?;
        write_packet(&mut compressed, &signature)?;

        let encrypted = compressed.finish()?.finish()?;
        let out = encrypted.finish()?.finish()?;
        debug!("message finished");

        Ok(out)
    }
}

impl<W: Write> Write for MessageEncoder<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.literal.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.literal.flush()
    }
}

/// Binary signature over the literal content: creation time and the signer's
/// first user id hashed, the issuer unhashed.
fn signature_config(
    signer: &UnlockedKey,
    signer_public: &SignedPublicKey,
    options: &EncryptOptions,
) -> SignatureConfig {
    let public = signer.public_key();
    let mut config = SignatureConfig::v4(SignatureType::Binary, public.algorithm(), options.hash_alg);

    config.hashed_subpackets = vec![Subpacket::regular(SubpacketData::SignatureCreationTime(
        Utc::now().trunc_subsecs(0),
    ))];
    if let Some(user) = signer_public.details.users.first() {
        config
            .hashed_subpackets
            .push(Subpacket::regular(SubpacketData::SignersUserID(
                user.id.id().to_vec().into(),
            )));
    }
    config.unhashed_subpackets = vec![Subpacket::regular(SubpacketData::Issuer(
        signer.key_id(),
    ))];

    config
}

/// Encrypts and signs everything from `input` into `out`, reading it in
/// chunks of the configured size.
pub(crate) fn encrypt_and_sign<R, I, W>(
    rng: &mut R,
    mut input: I,
    recipient: &SignedPublicKey,
    signer: &UnlockedKey,
    signer_public: &SignedPublicKey,
    options: &EncryptOptions,
    out: W,
) -> Result<W>
where
    R: CryptoRng + Rng,
    I: Read,
    W: Write,
{
    let mut encoder = MessageEncoder::new(rng, recipient, signer, signer_public, options, out)?;

    let mut buffer = vec![0u8; options.chunk_len()];
    let mut total = 0u64;
    loop {
        let read = fill_buffer(&mut input, &mut buffer)?;
        if read == 0 {
            break;
        }
        encoder.write_all(&buffer[..read])?;
        total += read as u64;
    }
    debug!("encrypted {} bytes of plaintext", total);

    encoder.finish()
}
