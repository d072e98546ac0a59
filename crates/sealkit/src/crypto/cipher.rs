//! Raw cipher and MAC primitives.
//!
//! These functions know nothing about envelopes, formats or key derivation.
//! They take exact-length keys and IVs and return bytes. AEAD output uses the
//! RustCrypto layout `ciphertext || tag`; the engine rearranges it.

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::{consts::U12, Aead, KeyInit, Nonce, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use aes_gcm_siv::{Aes128GcmSiv, Aes256GcmSiv};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use common::CryptoError;
use hmac::{Hmac, Mac};
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::config::{CipherMode, EncryptionAlgorithm, HashAlgorithm, KeySize};
use crate::random;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Encrypt `plaintext` with the given algorithm.
///
/// `aad` is only consumed by AEAD modes.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if `key` or `iv` has the wrong length.
pub fn encrypt(
    alg: EncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    use CipherMode as M;
    use KeySize as K;
    match (alg.mode, alg.key_size) {
        (M::Cbc, K::Aes128) => cbc_encrypt::<cbc::Encryptor<Aes128>>(key, iv, plaintext),
        (M::Cbc, K::Aes192) => cbc_encrypt::<cbc::Encryptor<Aes192>>(key, iv, plaintext),
        (M::Cbc, K::Aes256) => cbc_encrypt::<cbc::Encryptor<Aes256>>(key, iv, plaintext),
        (M::Ctr, K::Aes128) => ctr_apply::<ctr::Ctr128BE<Aes128>>(key, iv, plaintext),
        (M::Ctr, K::Aes192) => ctr_apply::<ctr::Ctr128BE<Aes192>>(key, iv, plaintext),
        (M::Ctr, K::Aes256) => ctr_apply::<ctr::Ctr128BE<Aes256>>(key, iv, plaintext),
        (M::Gcm, K::Aes128) => aead_seal::<Aes128Gcm>(key, iv, plaintext, aad),
        (M::Gcm, K::Aes192) => aead_seal::<Aes192Gcm>(key, iv, plaintext, aad),
        (M::Gcm, K::Aes256) => aead_seal::<Aes256Gcm>(key, iv, plaintext, aad),
        (M::GcmSiv, K::Aes128) => aead_seal::<Aes128GcmSiv>(key, iv, plaintext, aad),
        (M::GcmSiv, K::Aes256) => aead_seal::<Aes256GcmSiv>(key, iv, plaintext, aad),
        (M::GcmSiv, K::Aes192) => Err(CryptoError::UnsupportedAlgorithm(alg.to_string())),
    }
}

/// Decrypt `ciphertext` (with trailing tag for AEAD modes).
///
/// # Errors
///
/// - [`CryptoError::AuthenticationFailure`] if an AEAD tag does not verify.
/// - [`CryptoError::MalformedEnvelope`] if CBC padding is invalid.
/// - [`CryptoError::InvalidKey`] if `key` or `iv` has the wrong length.
pub fn decrypt(
    alg: EncryptionAlgorithm,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    use CipherMode as M;
    use KeySize as K;
    match (alg.mode, alg.key_size) {
        (M::Cbc, K::Aes128) => cbc_decrypt::<cbc::Decryptor<Aes128>>(key, iv, ciphertext),
        (M::Cbc, K::Aes192) => cbc_decrypt::<cbc::Decryptor<Aes192>>(key, iv, ciphertext),
        (M::Cbc, K::Aes256) => cbc_decrypt::<cbc::Decryptor<Aes256>>(key, iv, ciphertext),
        (M::Ctr, K::Aes128) => ctr_apply::<ctr::Ctr128BE<Aes128>>(key, iv, ciphertext),
        (M::Ctr, K::Aes192) => ctr_apply::<ctr::Ctr128BE<Aes192>>(key, iv, ciphertext),
        (M::Ctr, K::Aes256) => ctr_apply::<ctr::Ctr128BE<Aes256>>(key, iv, ciphertext),
        (M::Gcm, K::Aes128) => aead_open::<Aes128Gcm>(key, iv, ciphertext, aad),
        (M::Gcm, K::Aes192) => aead_open::<Aes192Gcm>(key, iv, ciphertext, aad),
        (M::Gcm, K::Aes256) => aead_open::<Aes256Gcm>(key, iv, ciphertext, aad),
        (M::GcmSiv, K::Aes128) => aead_open::<Aes128GcmSiv>(key, iv, ciphertext, aad),
        (M::GcmSiv, K::Aes256) => aead_open::<Aes256GcmSiv>(key, iv, ciphertext, aad),
        (M::GcmSiv, K::Aes192) => Err(CryptoError::UnsupportedAlgorithm(alg.to_string())),
    }
}

fn bad_key_or_iv() -> CryptoError {
    CryptoError::invalid_key("key or IV length does not match the cipher")
}

fn cbc_encrypt<E: KeyIvInit + BlockEncryptMut>(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let enc = E::new_from_slices(key, iv).map_err(|_| bad_key_or_iv())?;
    Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<D: KeyIvInit + BlockDecryptMut>(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let dec = D::new_from_slices(key, iv).map_err(|_| bad_key_or_iv())?;
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::MalformedEnvelope("invalid block padding".into()))
}

/// CTR encryption and decryption are the same keystream XOR.
fn ctr_apply<C: KeyIvInit + StreamCipher>(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut cipher = C::new_from_slices(key, iv).map_err(|_| bad_key_or_iv())?;
    let mut buf = data.to_vec();
    cipher.apply_keystream(&mut buf);
    Ok(buf)
}

fn aead_seal<A: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    msg: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = A::new_from_slice(key).map_err(|_| bad_key_or_iv())?;
    let nonce = checked_nonce::<A>(nonce)?;
    cipher
        .encrypt(nonce, Payload { msg, aad })
        .map_err(|_| CryptoError::InvalidConfig("aead encryption failed".into()))
}

fn aead_open<A: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = A::new_from_slice(key).map_err(|_| bad_key_or_iv())?;
    let nonce = checked_nonce::<A>(nonce)?;
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailure)
}

fn checked_nonce<A: Aead>(nonce: &[u8]) -> Result<&Nonce<A>, CryptoError> {
    if nonce.len() != std::mem::size_of::<Nonce<A>>() {
        return Err(bad_key_or_iv());
    }
    Ok(Nonce::<A>::from_slice(nonce))
}

/// Incremental HMAC over one of the supported hashes.
///
/// Used directly by the streaming file runner; everything else goes through
/// [`hmac`] and [`verify_hmac`].
pub enum HmacState {
    Sha224(Hmac<Sha224>),
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

macro_rules! with_mac {
    ($state:expr, $mac:ident => $body:expr) => {
        match $state {
            HmacState::Sha224($mac) => $body,
            HmacState::Sha256($mac) => $body,
            HmacState::Sha384($mac) => $body,
            HmacState::Sha512($mac) => $body,
        }
    };
}

impl HmacState {
    pub fn new(alg: HashAlgorithm, key: &[u8]) -> Result<Self, CryptoError> {
        let bad_key = |_| CryptoError::invalid_key("hmac key rejected");
        Ok(match alg {
            HashAlgorithm::Sha224 => {
                HmacState::Sha224(<Hmac<Sha224> as Mac>::new_from_slice(key).map_err(bad_key)?)
            }
            HashAlgorithm::Sha256 => {
                HmacState::Sha256(<Hmac<Sha256> as Mac>::new_from_slice(key).map_err(bad_key)?)
            }
            HashAlgorithm::Sha384 => {
                HmacState::Sha384(<Hmac<Sha384> as Mac>::new_from_slice(key).map_err(bad_key)?)
            }
            HashAlgorithm::Sha512 => {
                HmacState::Sha512(<Hmac<Sha512> as Mac>::new_from_slice(key).map_err(bad_key)?)
            }
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        with_mac!(self, mac => mac.update(data))
    }

    pub fn finalize(self) -> Vec<u8> {
        with_mac!(self, mac => mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time comparison against `expected`.
    pub fn verify(self, expected: &[u8]) -> Result<(), CryptoError> {
        with_mac!(self, mac => mac.verify_slice(expected))
            .map_err(|_| CryptoError::AuthenticationFailure)
    }
}

/// HMAC over the concatenation of `parts`.
pub fn hmac(alg: HashAlgorithm, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
    let mut state = HmacState::new(alg, key)?;
    for part in parts {
        state.update(part);
    }
    Ok(state.finalize())
}

/// Verify an HMAC over the concatenation of `parts` in constant time.
pub fn verify_hmac(
    alg: HashAlgorithm,
    key: &[u8],
    parts: &[&[u8]],
    expected: &[u8],
) -> Result<(), CryptoError> {
    let mut state = HmacState::new(alg, key)?;
    for part in parts {
        state.update(part);
    }
    state.verify(expected)
}

/// Constant-time comparison of two MACs that were computed elsewhere.
///
/// Both sides are re-MACed under a one-off random key so the comparison
/// goes through the same constant-time check as [`verify_hmac`].
pub fn macs_match(a: &[u8], b: &[u8]) -> Result<bool, CryptoError> {
    let blind = random::bytes(32)?;
    let tag = hmac(HashAlgorithm::Sha256, &blind, &[a])?;
    Ok(verify_hmac(HashAlgorithm::Sha256, &blind, &[b], &tag).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [&str; 11] = [
        "aes-128-cbc",
        "aes-192-cbc",
        "aes-256-cbc",
        "aes-128-ctr",
        "aes-192-ctr",
        "aes-256-ctr",
        "aes-128-gcm",
        "aes-192-gcm",
        "aes-256-gcm",
        "aes-128-gcm-siv",
        "aes-256-gcm-siv",
    ];

    #[test]
    fn macs_match_compares_contents() {
        assert!(macs_match(b"same", b"same").unwrap());
        assert!(!macs_match(b"same", b"diff").unwrap());
        assert!(!macs_match(b"same", b"sam").unwrap());
    }

    #[test]
    fn every_algorithm_round_trips() {
        for name in ALL {
            let alg: EncryptionAlgorithm = name.parse().unwrap();
            let key = vec![7u8; alg.key_size.bytes()];
            let iv = vec![9u8; alg.mode.iv_len()];
            let ct = encrypt(alg, &key, &iv, b"attack at dawn", b"aad").unwrap();
            let pt = decrypt(alg, &key, &iv, &ct, b"aad").unwrap();
            assert_eq!(pt, b"attack at dawn", "{name}");
        }
    }

    #[test]
    fn aead_rejects_wrong_aad() {
        let alg: EncryptionAlgorithm = "aes-256-gcm".parse().unwrap();
        let key = [1u8; 32];
        let iv = [2u8; 12];
        let ct = encrypt(alg, &key, &iv, b"x", b"A").unwrap();
        let err = decrypt(alg, &key, &iv, &ct, b"B").unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailure));
    }

    #[test]
    fn wrong_key_length_is_invalid_key() {
        let alg: EncryptionAlgorithm = "aes-256-cbc".parse().unwrap();
        let err = encrypt(alg, &[0u8; 16], &[0u8; 16], b"x", b"").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { .. }));
    }

    #[test]
    fn wrong_nonce_length_does_not_panic() {
        let alg: EncryptionAlgorithm = "aes-128-gcm".parse().unwrap();
        assert!(encrypt(alg, &[0u8; 16], &[0u8; 16], b"x", b"").is_err());
    }

    #[test]
    fn hmac_sha256_known_answer() {
        // RFC 4231 test case 2.
        let mac = hmac(
            HashAlgorithm::Sha256,
            b"Jefe",
            &[b"what do ya want ", b"for nothing?"],
        )
        .unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_hmac_detects_mismatch() {
        let mac = hmac(HashAlgorithm::Sha384, b"k", &[b"data"]).unwrap();
        assert_eq!(mac.len(), 48);
        assert!(verify_hmac(HashAlgorithm::Sha384, b"k", &[b"data"], &mac).is_ok());
        let mut bad = mac.clone();
        bad[0] ^= 1;
        assert!(verify_hmac(HashAlgorithm::Sha384, b"k", &[b"data"], &bad).is_err());
    }
}
