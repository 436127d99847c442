//! Keys and messages composed from packets.

mod key_gen;
mod key_ring;
pub mod message;
mod signed_key;
mod unlocked;

pub use self::key_gen::{KeyGenParams, KeyGenParamsBuilder, KeyPair};
pub use self::key_ring::{
    find_secret_key_by_id, read_public_key_ring, read_secret_key_ring, KeyRing,
};
pub use self::message::{
    DecryptOptions, DecryptionResult, EncryptOptions, MessageDecoder, MessageEncoder, Verification,
};
pub use self::signed_key::{
    KeyDetails, SignedKeyDetails, SignedPublicKey, SignedSecretKey, SignedUser,
};
pub use self::unlocked::UnlockedKey;

/// Deterministic keys shared by the unit tests.
#[cfg(test)]
pub(crate) mod test_keys {
    #![allow(clippy::unwrap_used)]

    use std::sync::OnceLock;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{KeyGenParamsBuilder, KeyPair};
    use crate::ser::u32_to_time;

    pub const PASSPHRASE: &str = "correct horse";

    fn generate(user_id: &str, seed: u64) -> KeyPair {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        KeyGenParamsBuilder::default()
            .user_id(user_id.into())
            .passphrase(PASSPHRASE.into())
            .bits(2048)
            // low count keeps the tests fast
            .s2k_count(0x10)
            .created_at(u32_to_time(1_700_000_000))
            .build()
            .unwrap()
            .generate(&mut rng)
            .unwrap()
    }

    pub fn alice() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();
        KEY.get_or_init(|| generate("Alice <alice@example.com>", 1))
    }

    pub fn bob() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();
        KEY.get_or_init(|| generate("Bob <bob@example.com>", 2))
    }
}
