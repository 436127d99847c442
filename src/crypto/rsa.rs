use log::debug;
use num_bigint::{BigUint, ModInverse, ToBigUint};
use rand::{CryptoRng, Rng};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{bail, ensure, format_err, Result};
use crate::types::Mpi;
use crate::util::left_pad;

/// Largest modulus accepted from key material, same bound as for MPIs.
const MAX_KEY_BITS: usize = 16384;

/// Generate an RSA key.
pub fn generate_key<R: Rng + CryptoRng>(
    rng: &mut R,
    bit_size: usize,
    exponent: u64,
) -> Result<RsaPrivateKey> {
    debug!("generating {bit_size} bit RSA key");
    let key = RsaPrivateKey::new_with_exp(rng, bit_size, &BigUint::from(exponent))?;
    Ok(key)
}

/// The CRT coefficient `u = p^-1 mod q` stored in OpenPGP secret keys.
pub fn crt_coefficient(p: &BigUint, q: &BigUint) -> Result<BigUint> {
    p.clone()
        .mod_inverse(q)
        .and_then(|u| u.to_biguint())
        .ok_or_else(|| format_err!(InvalidKeyMaterial, "invalid prime"))
}

/// Builds a public key from the OpenPGP parameters.
pub fn public_key(n: &Mpi, e: &Mpi) -> Result<RsaPublicKey> {
    RsaPublicKey::new_with_max_size(n.to_biguint(), e.to_biguint(), MAX_KEY_BITS)
        .map_err(|err| format_err!(InvalidKeyMaterial, "invalid rsa public key: {}", err))
}

/// Builds a private key from the OpenPGP parameters.
pub fn private_key(n: &Mpi, e: &Mpi, d: &Mpi, p: &Mpi, q: &Mpi) -> Result<RsaPrivateKey> {
    let key = RsaPrivateKey::from_components(
        n.to_biguint(),
        e.to_biguint(),
        d.to_biguint(),
        vec![p.to_biguint(), q.to_biguint()],
    )
    .map_err(|err| format_err!(InvalidKeyMaterial, "invalid rsa private key: {}", err))?;
    key.validate()
        .map_err(|err| format_err!(InvalidKeyMaterial, "invalid rsa private key: {}", err))?;

    Ok(key)
}

/// RSA encryption using PKCS1v15 padding.
pub fn encrypt<R: CryptoRng + Rng>(
    rng: &mut R,
    key: &RsaPublicKey,
    plaintext: &[u8],
) -> Result<Mpi> {
    let data = key.encrypt(rng, Pkcs1v15Encrypt, plaintext)?;
    Ok(Mpi::from_slice(&data))
}

/// RSA decryption using PKCS1v15 padding.
pub fn decrypt(key: &RsaPrivateKey, ciphertext: &Mpi) -> Result<Zeroizing<Vec<u8>>> {
    // leading zeros are stripped on the wire
    let ciphertext = left_pad(ciphertext.as_ref(), key.size());
    let m = key.decrypt(Pkcs1v15Encrypt, &ciphertext)?;
    Ok(Zeroizing::new(m))
}

/// Signs a precomputed digest, PKCS1v15 with the DigestInfo for `hash`.
pub fn sign(key: &RsaPrivateKey, hash: HashAlgorithm, digest: &[u8]) -> Result<Mpi> {
    ensure!(
        Some(digest.len()) == hash.digest_size(),
        CryptoOperation,
        "digest length does not match {}",
        hash
    );
    let sig = key.sign(signature_scheme(hash)?, digest)?;
    Ok(Mpi::from_slice(&sig))
}

/// Verifies a PKCS1v15 signature over a precomputed digest.
pub fn verify(key: &RsaPublicKey, hash: HashAlgorithm, digest: &[u8], sig: &Mpi) -> Result<()> {
    let sig = left_pad(sig.as_ref(), key.size());
    key.verify(signature_scheme(hash)?, digest, &sig)
        .map_err(|_| format_err!(CryptoOperation, "invalid signature"))
}

fn signature_scheme(hash: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    let scheme = match hash {
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::Sha224 => Pkcs1v15Sign::new::<Sha224>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        _ => bail!(CryptoOperation, "unsupported hash algorithm {} for rsa", hash),
    };
    Ok(scheme)
}
