//! Key validation and password-based derivation.
//!
//! A hex key is split at a fixed offset: the first `enc_key_len` bytes encrypt,
//! the remaining `mac_key_len` bytes authenticate. A password is stretched
//! with PBKDF2 using the per-call IV as salt, which yields the same split.

use common::CryptoError;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use zeroize::Zeroize;

use crate::config::{CipherConfig, HashAlgorithm, KeyType};

/// Encryption and MAC sub-keys for a single call.
///
/// Zeroized on drop. Never printed.
pub struct KeyMaterial {
    enc: Vec<u8>,
    mac: Option<Vec<u8>>,
}

impl KeyMaterial {
    pub fn enc_key(&self) -> &[u8] {
        &self.enc
    }

    /// `None` for AEAD modes and when encrypt-then-MAC is off.
    pub fn mac_key(&self) -> Option<&[u8]> {
        self.mac.as_deref()
    }

    fn split(mut bytes: Vec<u8>, enc_len: usize, with_mac: bool) -> Self {
        let mac = with_mac.then(|| bytes[enc_len..].to_vec());
        bytes[enc_len..].zeroize();
        bytes.truncate(enc_len);
        Self { enc: bytes, mac }
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.enc.zeroize();
        if let Some(mac) = self.mac.as_mut() {
            mac.zeroize();
        }
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Derive the sub-keys for one encrypt or decrypt call.
///
/// # Errors
///
/// - [`CryptoError::InvalidKey`] if a hex key has the wrong length or is not hex,
///   or if a password is empty.
/// - [`CryptoError::InvalidConfig`] if the PBKDF2 iteration count is zero.
pub fn derive_keys(
    config: &CipherConfig,
    key: &str,
    iv: &[u8],
) -> Result<KeyMaterial, CryptoError> {
    let total = config.key_len();
    let bytes = match config.key_type {
        KeyType::Key => decode_hex_key(key, total)?,
        KeyType::Password => {
            if key.is_empty() {
                return Err(CryptoError::invalid_key("password must not be empty"));
            }
            if config.pbkdf2_iterations == 0 {
                return Err(CryptoError::InvalidConfig(
                    "pbkdf2 iteration count must be > 0".into(),
                ));
            }
            let mut out = vec![0u8; total];
            stretch_password(
                config.pbkdf2_algorithm,
                key.as_bytes(),
                iv,
                config.pbkdf2_iterations,
                &mut out,
            );
            out
        }
    };
    Ok(KeyMaterial::split(bytes, config.enc_key_len(), config.uses_hmac()))
}

/// Decode a hex key that must be exactly `expected_len` bytes.
///
/// The error names the exact hex length required so misconfiguration is
/// obvious at the first call.
pub fn decode_hex_key(key: &str, expected_len: usize) -> Result<Vec<u8>, CryptoError> {
    let expected_hex = expected_len * 2;
    if key.len() != expected_hex {
        return Err(CryptoError::invalid_key(format!(
            "expected {expected_hex} hex characters ({}-bit key), got {}",
            expected_len * 8,
            key.len()
        )));
    }
    hex::decode(key).map_err(|e| CryptoError::invalid_key(format!("key is not valid hex: {e}")))
}

/// PBKDF2-HMAC with the selected hash.
pub fn stretch_password(
    alg: HashAlgorithm,
    password: &[u8],
    salt: &[u8],
    rounds: u32,
    out: &mut [u8],
) {
    match alg {
        HashAlgorithm::Sha224 => pbkdf2::pbkdf2_hmac::<Sha224>(password, salt, rounds, out),
        HashAlgorithm::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, rounds, out),
        HashAlgorithm::Sha384 => pbkdf2::pbkdf2_hmac::<Sha384>(password, salt, rounds, out),
        HashAlgorithm::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, rounds, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_password_config() -> CipherConfig {
        CipherConfig::default()
            .with_key_type(KeyType::Password)
            .with_pbkdf2(HashAlgorithm::Sha512, 1_000)
    }

    #[test]
    fn splits_hex_key_at_encryption_key_length() {
        let config = CipherConfig::default();
        let key = format!("{}{}", "11".repeat(32), "22".repeat(32));
        let km = derive_keys(&config, &key, &[0u8; 16]).unwrap();
        assert_eq!(km.enc_key(), &[0x11u8; 32][..]);
        assert_eq!(km.mac_key().unwrap(), &[0x22u8; 32][..]);
    }

    #[test]
    fn aead_has_no_mac_key() {
        let config = CipherConfig::default()
            .with_encryption_algorithm("aes-128-gcm".parse().unwrap());
        let km = derive_keys(&config, &"ab".repeat(16), &[0u8; 12]).unwrap();
        assert_eq!(km.enc_key().len(), 16);
        assert!(km.mac_key().is_none());
    }

    #[test]
    fn wrong_length_names_expected_length() {
        let config = CipherConfig::default();
        let err = derive_keys(&config, &"ab".repeat(32), &[0u8; 16]).unwrap_err();
        match err {
            CryptoError::InvalidKey { reason } => {
                assert!(reason.contains("expected 128 hex characters"), "{reason}");
                assert!(reason.contains("got 64"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_hex_key_rejected() {
        let config = CipherConfig::default();
        let err = derive_keys(&config, &"zz".repeat(64), &[0u8; 16]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { .. }));
    }

    #[test]
    fn password_derivation_is_salted_by_iv() {
        let config = fast_password_config();
        let a = derive_keys(&config, "hunter2", &[1u8; 16]).unwrap();
        let b = derive_keys(&config, "hunter2", &[1u8; 16]).unwrap();
        let c = derive_keys(&config, "hunter2", &[2u8; 16]).unwrap();
        assert_eq!(a.enc_key(), b.enc_key());
        assert_ne!(a.enc_key(), c.enc_key());
        assert_eq!(a.mac_key().unwrap().len(), 32);
    }

    #[test]
    fn iteration_count_changes_keys() {
        let a = derive_keys(&fast_password_config(), "pw", &[1u8; 16]).unwrap();
        let other = fast_password_config().with_pbkdf2(HashAlgorithm::Sha512, 1_001);
        let b = derive_keys(&other, "pw", &[1u8; 16]).unwrap();
        assert_ne!(a.enc_key(), b.enc_key());
    }

    #[test]
    fn empty_password_rejected() {
        assert!(derive_keys(&fast_password_config(), "", &[0u8; 16]).is_err());
    }

    #[test]
    fn key_material_redacted_in_debug() {
        let km = derive_keys(&CipherConfig::default(), &"ab".repeat(64), &[0u8; 16]).unwrap();
        assert_eq!(format!("{km:?}"), "KeyMaterial([REDACTED])");
    }
}
