//! Reading key blocks and picking keys out of them.
//!
//! A ring is the ordered list of transferable keys found in one block of key
//! material, armored or binary. Selection is always a linear scan in ring
//! order, the first key that fits wins.

use std::io::Read;

use log::{debug, info, warn};

use crate::armor::{self, BlockType, Dearmor};
use crate::errors::{bail, ensure, Error, Result};
use crate::packet::PacketParser;
use crate::types::{Capability, KeyId};

use super::{KeyDetails, SignedPublicKey, SignedSecretKey, UnlockedKey};

/// An ordered set of keys parsed from one key block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRing<K> {
    keys: Vec<K>,
}

impl<K: KeyDetails> KeyRing<K> {
    pub fn new(keys: Vec<K>) -> Self {
        KeyRing { keys }
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<K> {
        self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The first key, in ring order, usable for `capability`.
    pub fn select_first(&self, capability: Capability) -> Result<&K> {
        let key = self
            .keys
            .iter()
            .find(|key| key.can(capability))
            .ok_or(Error::KeyNotFound { capability })?;
        debug!("selected key {} for {}", key.key_id(), capability);

        Ok(key)
    }

    pub fn find_by_id(&self, id: &KeyId) -> Option<&K> {
        self.keys.iter().find(|key| &key.key_id() == id)
    }
}

impl<K> IntoIterator for KeyRing<K> {
    type Item = K;
    type IntoIter = std::vec::IntoIter<K>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

/// Strips the armor of a key block, binary input passes through.
fn key_block_bytes(input: &[u8], expected: BlockType) -> Result<Vec<u8>> {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    let input = &input[start..];
    let Some(first) = input.first() else {
        bail!(InvalidKeyMaterial, "empty key block");
    };
    if armor::is_binary(*first) {
        return Ok(input.to_vec());
    }

    let mut dearmor = Dearmor::new(input);
    let typ = dearmor.read_header()?;
    ensure!(
        typ == expected,
        InvalidKeyMaterial,
        "expected {}, found {}",
        expected,
        typ
    );
    let mut bytes = Vec::new();
    dearmor.read_to_end(&mut bytes)?;

    Ok(bytes)
}

/// Parses a block of public keys, armored or binary.
///
/// Anything that does not parse is reported as [`Error::InvalidKeyMaterial`].
pub fn read_public_key_ring(input: &[u8]) -> Result<KeyRing<SignedPublicKey>> {
    let read = || -> Result<_> {
        let bytes = key_block_bytes(input, BlockType::PublicKey)?;
        SignedPublicKey::from_packets(PacketParser::new(&bytes[..]))
    };
    let keys = read().map_err(Error::into_key_material)?;
    info!("read public key ring with {} keys", keys.len());

    Ok(KeyRing::new(keys))
}

/// Parses a block of secret keys, armored or binary.
///
/// Anything that does not parse is reported as [`Error::InvalidKeyMaterial`].
pub fn read_secret_key_ring(input: &[u8]) -> Result<KeyRing<SignedSecretKey>> {
    let read = || -> Result<_> {
        let bytes = key_block_bytes(input, BlockType::PrivateKey)?;
        SignedSecretKey::from_packets(PacketParser::new(&bytes[..]))
    };
    let keys = read().map_err(Error::into_key_material)?;
    info!("read secret key ring with {} keys", keys.len());

    Ok(KeyRing::new(keys))
}

/// Looks up the secret key `id` and unlocks it.
///
/// An unknown id and a passphrase that does not unlock the key both give
/// `Ok(None)`, so callers can move on to the next candidate. Broken key
/// material is still an error.
pub fn find_secret_key_by_id(
    ring: &KeyRing<SignedSecretKey>,
    id: &KeyId,
    passphrase: &str,
) -> Result<Option<UnlockedKey>> {
    let Some(key) = ring.find_by_id(id) else {
        debug!("no secret key {}", id);
        return Ok(None);
    };

    match key.unlock(passphrase) {
        Ok(unlocked) => Ok(Some(unlocked)),
        Err(Error::PassphraseMismatch { key_id }) => {
            warn!("passphrase does not unlock key {}", key_id);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::composed::test_keys;
    use crate::ser::Serialize;

    #[test]
    fn test_read_armored_and_binary() {
        let alice = test_keys::alice();
        let armored = alice.secret_key.to_armored_string(None).unwrap();
        let ring = read_secret_key_ring(armored.as_bytes()).unwrap();
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.keys()[0], alice.secret_key);

        let binary = alice.public_key.to_bytes().unwrap();
        let ring = read_public_key_ring(&binary).unwrap();
        assert_eq!(ring.keys()[0], alice.public_key);
        assert_eq!(
            ring.keys()[0].user_ids(),
            vec!["Alice <alice@example.com>".to_string()]
        );
    }

    #[test]
    fn test_select_first_in_ring_order() {
        let alice = test_keys::alice();
        let bob = test_keys::bob();
        let mut bytes = bob.public_key.to_bytes().unwrap();
        bytes.extend(alice.public_key.to_bytes().unwrap());

        let ring = read_public_key_ring(&bytes).unwrap();
        assert_eq!(ring.len(), 2);
        let selected = ring.select_first(Capability::Encryption).unwrap();
        assert_eq!(selected.key_id(), bob.public_key.key_id());
        let selected = ring.select_first(Capability::Signing).unwrap();
        assert_eq!(selected.key_id(), bob.public_key.key_id());

        assert!(ring.find_by_id(&alice.public_key.key_id()).is_some());
    }

    #[test]
    fn test_select_from_empty_ring() {
        let ring: KeyRing<SignedPublicKey> = KeyRing::new(Vec::new());
        let err = ring.select_first(Capability::Signing).unwrap_err();
        assert!(matches!(
            err,
            Error::KeyNotFound {
                capability: Capability::Signing
            }
        ));
    }

    #[test]
    fn test_wrong_block_type() {
        let alice = test_keys::alice();
        let armored = alice.public_key.to_armored_string(None).unwrap();
        let err = read_secret_key_ring(armored.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyMaterial { .. }), "{err:?}");

        // a binary public block is not a secret ring either
        let binary = alice.public_key.to_bytes().unwrap();
        let err = read_secret_key_ring(&binary).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyMaterial { .. }), "{err:?}");
    }

    #[test]
    fn test_garbage_is_invalid_key_material() {
        let inputs: [&[u8]; 4] = [b"", b"   ", b"not a key", &[0xC6, 0x05, 0x04]];
        for input in inputs {
            let err = read_public_key_ring(input).unwrap_err();
            assert!(matches!(err, Error::InvalidKeyMaterial { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_find_secret_key_by_id() {
        let alice = test_keys::alice();
        let bob = test_keys::bob();
        let ring = KeyRing::new(vec![alice.secret_key.clone()]);

        let unlocked = find_secret_key_by_id(&ring, &alice.secret_key.key_id(), test_keys::PASSPHRASE)
            .unwrap()
            .unwrap();
        assert_eq!(unlocked.key_id(), alice.secret_key.key_id());

        assert!(find_secret_key_by_id(&ring, &alice.secret_key.key_id(), "wrong")
            .unwrap()
            .is_none());
        assert!(find_secret_key_by_id(&ring, &bob.secret_key.key_id(), test_keys::PASSPHRASE)
            .unwrap()
            .is_none());
    }
}
