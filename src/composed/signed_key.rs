use std::io;

use log::{debug, warn};

use crate::armor::{self, BlockType, Headers};
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{bail, ensure, Result};
use crate::packet::{self, ensure_key_block_tag, Packet, PacketTrait, Signature, UserId};
use crate::ser::Serialize;
use crate::types::{Capability, Fingerprint, KeyFlags, KeyId, Tag};

use super::UnlockedKey;

/// A user id with the signatures binding it to the key.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SignedUser {
    pub id: UserId,
    pub signatures: Vec<Signature>,
}

impl SignedUser {
    pub fn new(id: UserId, signatures: Vec<Signature>) -> Self {
        let signatures = signatures
            .into_iter()
            .filter(|sig| {
                if !sig.is_certification() {
                    warn!(
                        "ignoring unexpected signature {:?} after User ID packet",
                        sig.typ()
                    );
                    false
                } else {
                    true
                }
            })
            .collect();

        SignedUser { id, signatures }
    }
}

impl Serialize for SignedUser {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.id.to_writer_with_header(writer)?;
        for sig in &self.signatures {
            sig.to_writer_with_header(writer)?;
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        self.id.write_len_with_header()
            + self
                .signatures
                .iter()
                .map(PacketTrait::write_len_with_header)
                .sum::<usize>()
    }
}

/// Signatures and user ids shared between secret and public keys.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SignedKeyDetails {
    pub direct_signatures: Vec<Signature>,
    pub users: Vec<SignedUser>,
}

impl SignedKeyDetails {
    /// Drops self-certifications that do not verify against `key`.
    ///
    /// Keys this crate can not verify with are left alone, they never get a
    /// capability anyway.
    fn verify_self_certifications(&mut self, key: &packet::PublicKey) {
        let Ok(rsa_key) = key.rsa_public_key() else {
            debug!("not verifying certifications of {} key", key.algorithm());
            return;
        };
        let key_id = key.key_id();

        for user in &mut self.users {
            user.signatures.retain(|sig| {
                if !is_self_issued(sig, &key_id) {
                    return true;
                }
                match sig.verify_certification(&rsa_key, key, &user.id) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(
                            "dropping invalid self-certification of {:?} on {}: {}",
                            user.id, key_id, err
                        );
                        false
                    }
                }
            });
        }
    }

    /// Key flags of the first self-signature carrying them.
    fn key_flags(&self, key_id: &KeyId) -> Option<KeyFlags> {
        self.users
            .iter()
            .flat_map(|user| &user.signatures)
            .chain(&self.direct_signatures)
            .filter(|sig| is_self_issued(sig, key_id))
            .find_map(Signature::key_flags)
    }
}

impl Serialize for SignedKeyDetails {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        for sig in &self.direct_signatures {
            sig.to_writer_with_header(writer)?;
        }
        self.users.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        self.direct_signatures
            .iter()
            .map(PacketTrait::write_len_with_header)
            .sum::<usize>()
            + self.users.write_len()
    }
}

fn is_self_issued(sig: &Signature, key_id: &KeyId) -> bool {
    sig.issuer().map_or(true, |issuer| issuer == key_id)
}

/// Common accessors of [`SignedPublicKey`] and [`SignedSecretKey`].
pub trait KeyDetails {
    fn public_key_packet(&self) -> &packet::PublicKey;

    fn details(&self) -> &SignedKeyDetails;

    fn key_id(&self) -> KeyId {
        self.public_key_packet().key_id()
    }

    fn fingerprint(&self) -> Fingerprint {
        self.public_key_packet().fingerprint()
    }

    fn algorithm(&self) -> PublicKeyAlgorithm {
        self.public_key_packet().algorithm()
    }

    /// User ids in the order they appear in the key block.
    fn user_ids(&self) -> Vec<String> {
        self.details()
            .users
            .iter()
            .map(|user| user.id.as_string())
            .collect()
    }

    fn key_flags(&self) -> Option<KeyFlags> {
        self.details().key_flags(&self.key_id())
    }

    /// Whether this key can be used for `capability`.
    ///
    /// Self-signature key flags decide when present, otherwise the algorithm does.
    fn can(&self, capability: Capability) -> bool {
        let algorithm = self.algorithm();
        if !algorithm.can(capability) {
            return false;
        }

        match self.key_flags() {
            Some(flags) => flags.allows(capability),
            None => true,
        }
    }
}

/// The kinds of primary key packets a key block can start with.
trait PrimaryKey: Sized {
    const TAG: Tag;
    /// The primary key tag of the other kind of key block.
    const OTHER_TAG: Tag;

    fn from_packet(packet: Packet) -> Result<Self>;

    fn public_key_packet(&self) -> &packet::PublicKey;
}

impl PrimaryKey for packet::PublicKey {
    const TAG: Tag = Tag::PublicKey;
    const OTHER_TAG: Tag = Tag::SecretKey;

    fn from_packet(packet: Packet) -> Result<Self> {
        match packet {
            Packet::PublicKey(key) => Ok(key),
            other => bail!(InvalidKeyMaterial, "expected public key, got {:?}", other.tag()),
        }
    }

    fn public_key_packet(&self) -> &packet::PublicKey {
        self
    }
}

impl PrimaryKey for packet::SecretKey {
    const TAG: Tag = Tag::SecretKey;
    const OTHER_TAG: Tag = Tag::PublicKey;

    fn from_packet(packet: Packet) -> Result<Self> {
        match packet {
            Packet::SecretKey(key) => Ok(key),
            other => bail!(InvalidKeyMaterial, "expected secret key, got {:?}", other.tag()),
        }
    }

    fn public_key_packet(&self) -> &packet::PublicKey {
        self.public_key()
    }
}

/// Where the next signature packet belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Direct,
    User,
    /// Signatures of skipped packets (subkeys, user attributes).
    Skipped,
}

/// Groups a packet stream into transferable keys.
///
/// Subkeys, user attributes and trust packets are skipped along with their
/// signatures.
fn parse_keys<K, I>(packets: I) -> Result<Vec<(K, SignedKeyDetails)>>
where
    K: PrimaryKey,
    I: Iterator<Item = Result<Packet>>,
{
    let mut keys: Vec<(K, SignedKeyDetails)> = Vec::new();
    let mut section = Section::Direct;

    for packet in packets {
        let packet = packet?;
        let tag = packet.tag();
        ensure_key_block_tag(tag)?;
        ensure!(
            tag != K::OTHER_TAG,
            InvalidKeyMaterial,
            "unexpected {:?} packet, expected {:?} key block",
            tag,
            K::TAG
        );

        if tag == K::TAG {
            let key = K::from_packet(packet)?;
            debug!("primary key: {}", key.public_key_packet().key_id());
            keys.push((key, SignedKeyDetails::default()));
            section = Section::Direct;
            continue;
        }

        let Some((_, details)) = keys.last_mut() else {
            if tag != Tag::Marker {
                warn!("ignoring {:?} packet before the first key", tag);
            }
            continue;
        };

        match packet {
            Packet::UserId(id) => {
                details.users.push(SignedUser::new(id, Vec::new()));
                section = Section::User;
            }
            Packet::Signature(sig) => match section {
                Section::Direct => details.direct_signatures.push(sig),
                Section::User => {
                    if let Some(user) = details.users.last_mut() {
                        if sig.is_certification() {
                            user.signatures.push(sig);
                        } else {
                            warn!(
                                "ignoring unexpected signature {:?} after User ID packet",
                                sig.typ()
                            );
                        }
                    }
                }
                Section::Skipped => debug!("skipping {:?} signature", sig.typ()),
            },
            Packet::Marker(_) => {}
            Packet::Other { tag, .. } => match tag {
                Tag::Trust => {}
                _ => {
                    debug!("skipping {:?} packet", tag);
                    section = Section::Skipped;
                }
            },
            Packet::PublicKey(_) | Packet::SecretKey(_) => {
                bail!(InvalidKeyMaterial, "unexpected {:?} packet", tag)
            }
        }
    }

    for (key, details) in &mut keys {
        if details.users.is_empty() {
            warn!("key {} has no user ids", key.public_key_packet().key_id());
        }
        details.verify_self_certifications(key.public_key_packet());
    }

    Ok(keys)
}

/// Represents a public OpenPGP key ("Transferable Public Key").
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SignedPublicKey {
    pub primary_key: packet::PublicKey,
    pub details: SignedKeyDetails,
}

impl SignedPublicKey {
    pub fn new(primary_key: packet::PublicKey, details: SignedKeyDetails) -> Self {
        SignedPublicKey {
            primary_key,
            details,
        }
    }

    /// Parses all public keys in `packets`.
    pub fn from_packets(packets: impl Iterator<Item = Result<Packet>>) -> Result<Vec<Self>> {
        let keys = parse_keys::<packet::PublicKey, _>(packets)?;
        Ok(keys
            .into_iter()
            .map(|(key, details)| SignedPublicKey::new(key, details))
            .collect())
    }

    pub fn to_armored_string(&self, headers: Option<&Headers>) -> Result<String> {
        armor::encode(BlockType::PublicKey, headers, &self.to_bytes()?)
    }
}

impl KeyDetails for SignedPublicKey {
    fn public_key_packet(&self) -> &packet::PublicKey {
        &self.primary_key
    }

    fn details(&self) -> &SignedKeyDetails {
        &self.details
    }
}

impl Serialize for SignedPublicKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.primary_key.to_writer_with_header(writer)?;
        self.details.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.primary_key.write_len_with_header() + self.details.write_len()
    }
}

/// Represents a secret OpenPGP key ("Transferable Secret Key").
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SignedSecretKey {
    pub primary_key: packet::SecretKey,
    pub details: SignedKeyDetails,
}

impl SignedSecretKey {
    pub fn new(primary_key: packet::SecretKey, details: SignedKeyDetails) -> Self {
        SignedSecretKey {
            primary_key,
            details,
        }
    }

    /// Parses all secret keys in `packets`.
    pub fn from_packets(packets: impl Iterator<Item = Result<Packet>>) -> Result<Vec<Self>> {
        let keys = parse_keys::<packet::SecretKey, _>(packets)?;
        Ok(keys
            .into_iter()
            .map(|(key, details)| SignedSecretKey::new(key, details))
            .collect())
    }

    /// The public part of this key, with the same user ids and signatures.
    pub fn public_key(&self) -> SignedPublicKey {
        SignedPublicKey::new(
            self.primary_key.public_key().clone(),
            self.details.clone(),
        )
    }

    /// Decrypts the secret material with `passphrase`.
    pub fn unlock(&self, passphrase: &str) -> Result<UnlockedKey> {
        let secret = self.primary_key.unlock(passphrase.as_bytes())?;
        Ok(UnlockedKey::new(
            self.primary_key.public_key().clone(),
            secret,
        ))
    }

    pub fn to_armored_string(&self, headers: Option<&Headers>) -> Result<String> {
        armor::encode(BlockType::PrivateKey, headers, &self.to_bytes()?)
    }
}

impl KeyDetails for SignedSecretKey {
    fn public_key_packet(&self) -> &packet::PublicKey {
        self.primary_key.public_key()
    }

    fn details(&self) -> &SignedKeyDetails {
        &self.details
    }
}

impl Serialize for SignedSecretKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.primary_key.to_writer_with_header(writer)?;
        self.details.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.primary_key.write_len_with_header() + self.details.write_len()
    }
}

impl From<SignedSecretKey> for SignedPublicKey {
    fn from(key: SignedSecretKey) -> Self {
        key.public_key()
    }
}
