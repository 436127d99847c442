use std::io;

use bytes::Buf;
use log::debug;
use rand::{CryptoRng, Rng};
use rsa::RsaPrivateKey;
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{ensure, ensure_eq, format_err, Result};
use crate::packet::{PacketTrait, PublicKey};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{KeyId, Mpi, Tag};

/// Public Key Encrypted Session Key Packet, version 3.
///
/// The encrypted value is the symmetric algorithm octet, the session key and
/// a two octet checksum of the session key.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.1>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEncryptedSessionKey {
    id: KeyId,
    pk_algo: PublicKeyAlgorithm,
    values: Vec<Mpi>,
}

impl PublicKeyEncryptedSessionKey {
    /// Parses a `PublicKeyEncryptedSessionKey` packet body.
    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        ensure_eq!(version, 3, UnsupportedMessageType, "session key packet version");

        let id = KeyId::from(i.read_array::<8>()?);
        let pk_algo = PublicKeyAlgorithm::from(i.read_u8()?);
        let mut values = Vec::new();
        while i.has_remaining() {
            values.push(Mpi::from_buf(&mut i)?);
        }

        Ok(PublicKeyEncryptedSessionKey {
            id,
            pk_algo,
            values,
        })
    }

    /// Encrypts the given session key to `pkey`.
    pub fn from_session_key<R: CryptoRng + Rng>(
        rng: &mut R,
        session_key: &[u8],
        alg: SymmetricKeyAlgorithm,
        pkey: &PublicKey,
    ) -> Result<Self> {
        let key = pkey.rsa_public_key()?;

        let mut data = Zeroizing::new(Vec::with_capacity(session_key.len() + 3));
        data.push(u8::from(alg));
        data.extend_from_slice(session_key);
        data.extend_from_slice(&checksum::calculate_simple(session_key).to_be_bytes());

        let value = crate::crypto::rsa::encrypt(rng, &key, &data)?;
        debug!("encrypted {} session key to {}", alg, pkey.key_id());

        Ok(PublicKeyEncryptedSessionKey {
            id: pkey.key_id(),
            pk_algo: pkey.algorithm(),
            values: vec![value],
        })
    }

    /// Recovers the symmetric algorithm and session key.
    pub fn decrypt(
        &self,
        key: &RsaPrivateKey,
    ) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
        ensure!(
            self.pk_algo.is_rsa(),
            CryptoOperation,
            "session key encrypted with unsupported algorithm {}",
            self.pk_algo
        );
        let value = self
            .values
            .first()
            .ok_or_else(|| format_err!(MalformedMessage, "session key packet without value"))?;

        let decrypted = crate::crypto::rsa::decrypt(key, value)?;
        ensure!(
            decrypted.len() > 3,
            CryptoOperation,
            "decrypted session key too short"
        );

        let alg = SymmetricKeyAlgorithm::from(decrypted[0]);
        let (session_key, sum) = decrypted[1..].split_at(decrypted.len() - 3);
        checksum::simple(sum, session_key)?;
        ensure_eq!(
            session_key.len(),
            alg.key_size(),
            CryptoOperation,
            "session key size"
        );

        Ok((alg, Zeroizing::new(session_key.to_vec())))
    }

    /// The recipient key id, all zero for anonymous recipients.
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.pk_algo
    }
}

impl Serialize for PublicKeyEncryptedSessionKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[3])?;
        writer.write_all(self.id.as_ref())?;
        writer.write_all(&[self.pk_algo.into()])?;
        self.values.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 8 + 1 + self.values.write_len()
    }
}

impl PacketTrait for PublicKeyEncryptedSessionKey {
    fn tag(&self) -> Tag {
        Tag::PublicKeyEncryptedSessionKey
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rsa::RsaPublicKey;

    use super::*;
    use crate::ser::u32_to_time;

    #[test]
    fn test_session_key_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let private = crate::crypto::rsa::generate_key(&mut rng, 1024, 65537).unwrap();
        let public =
            PublicKey::from_rsa(u32_to_time(1_700_000_000), &RsaPublicKey::from(&private)).unwrap();

        let alg = SymmetricKeyAlgorithm::AES256;
        let session_key = alg.new_session_key(&mut rng);
        let pkesk =
            PublicKeyEncryptedSessionKey::from_session_key(&mut rng, &session_key, alg, &public)
                .unwrap();
        assert_eq!(pkesk.id(), &public.key_id());

        let bytes = pkesk.to_bytes().unwrap();
        assert_eq!(bytes.len(), pkesk.write_len());
        let parsed = PublicKeyEncryptedSessionKey::from_buf(Bytes::from(bytes)).unwrap();
        assert_eq!(parsed, pkesk);

        let (dec_alg, dec_key) = parsed.decrypt(&private).unwrap();
        assert_eq!(dec_alg, alg);
        assert_eq!(&dec_key[..], &session_key[..]);

        // a different key can not recover it
        let other = crate::crypto::rsa::generate_key(&mut rng, 1024, 65537).unwrap();
        assert!(parsed.decrypt(&other).is_err());
    }
}
