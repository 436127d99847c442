use rsa::RsaPrivateKey;

use crate::packet::PublicKey;
use crate::types::KeyId;

/// A secret key with its private material decrypted.
///
/// Lives for a single operation; the RSA key material is zeroized when this is dropped.
#[derive(derive_more::Debug)]
pub struct UnlockedKey {
    public: PublicKey,
    #[debug("..")]
    secret: RsaPrivateKey,
}

impl UnlockedKey {
    pub(crate) fn new(public: PublicKey, secret: RsaPrivateKey) -> Self {
        UnlockedKey { public, secret }
    }

    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &RsaPrivateKey {
        &self.secret
    }
}
