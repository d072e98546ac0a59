//! HMAC signing of values, with optional expiry.
//!
//! # Signed format
//!
//! ```text
//! base64url(payload) . tag [ . expire_ms ] . base64url(HMAC(key, everything before the last '.'))
//! ```
//!
//! `payload` and `tag` are the two halves of the value codec output; `tag` is
//! the decimal type tag. The data is readable by anyone: signing gives
//! integrity and optional expiry, not confidentiality.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::{CryptoError, Value};
use tracing::debug;

use crate::base64url;
use crate::codec::{self, TypeTag};
use crate::config::CipherConfig;
use crate::crypto::{cipher, decode_hex_key};
use crate::random;

/// When a signature stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Absolute time in milliseconds since the Unix epoch.
    At(i64),
    /// Relative to the moment of signing.
    In(Duration),
}

impl Expiry {
    fn to_epoch_millis(self) -> i64 {
        match self {
            Expiry::At(ms) => ms,
            Expiry::In(d) => {
                let ahead = i64::try_from(d.as_millis()).unwrap_or(i64::MAX);
                now_millis().saturating_add(ahead)
            }
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Signs and verifies values under one [`CipherConfig`].
///
/// Only `hashing_algorithm`, `allow_null` and `exception_on_error` are read.
/// The key is hex and must be exactly the hash output length.
#[derive(Debug, Clone)]
pub struct Signer {
    config: CipherConfig,
}

impl Signer {
    pub fn new(config: CipherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CipherConfig {
        &self.config
    }

    pub fn key_len(&self) -> usize {
        self.config.hashing_algorithm.output_len()
    }

    /// Generate a random hex key of the length the hash requires.
    pub fn generate_key(&self) -> Result<String, CryptoError> {
        random::hex(self.key_len())
    }

    /// Sign `value`, optionally with an expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] for a key of the wrong length and
    /// [`CryptoError::TypeMismatch`] for `Null` when `allow_null` is off.
    pub fn sign(
        &self,
        value: &Value,
        key: &str,
        expire: Option<Expiry>,
    ) -> Result<String, CryptoError> {
        let key = decode_hex_key(key, self.key_len())?;
        if value.is_null() && !self.config.allow_null {
            return Err(CryptoError::TypeMismatch(
                "null values cannot be signed unless allow_null is set".into(),
            ));
        }
        let (payload, tag) = codec::encode_parts(value)?;

        let mut signed = format!("{}.{}", base64url::encode(&payload), tag.as_byte());
        if let Some(expire) = expire {
            signed.push('.');
            signed.push_str(&expire.to_epoch_millis().to_string());
        }
        let mac = cipher::hmac(self.config.hashing_algorithm, &key, &[signed.as_bytes()])?;
        signed.push('.');
        signed.push_str(&base64url::encode(mac));
        Ok(signed)
    }

    /// Verify a signed string and return its value.
    ///
    /// Returns `Ok(None)` for malformed, tampered or expired input unless
    /// `exception_on_error` is set. Key errors are always `Err`.
    pub fn verify(&self, signed: &str, key: &str) -> Result<Option<Value>, CryptoError> {
        match self.try_verify(signed, key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_data_failure() && !self.config.exception_on_error => {
                debug!(reason = e.code(), "signature rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn try_verify(&self, signed: &str, key: &str) -> Result<Value, CryptoError> {
        let key = decode_hex_key(key, self.key_len())?;
        let signed = signed.trim();

        let segments = signed.split('.').count();
        if segments != 3 && segments != 4 {
            return Err(CryptoError::MalformedEnvelope(format!(
                "expected 3 or 4 segments, found {segments}"
            )));
        }
        let (signed_part, mac_part) = signed
            .rsplit_once('.')
            .ok_or_else(|| CryptoError::MalformedEnvelope("missing signature segment".into()))?;
        let mac = base64url::decode(mac_part)?;
        cipher::verify_hmac(
            self.config.hashing_algorithm,
            &key,
            &[signed_part.as_bytes()],
            &mac,
        )?;

        let mut fields = signed_part.split('.');
        let payload = base64url::decode(fields.next().unwrap_or_default())?;
        let tag = fields
            .next()
            .unwrap_or_default()
            .parse::<u8>()
            .map_err(|_| CryptoError::TypeDecode("type tag is not a number".into()))
            .and_then(TypeTag::from_byte)?;

        if let Some(expire) = fields.next() {
            let expired_at_ms = expire
                .parse::<i64>()
                .map_err(|_| CryptoError::MalformedEnvelope("expiry is not a number".into()))?;
            if now_millis() > expired_at_ms {
                return Err(CryptoError::ExpiredSignature { expired_at_ms });
            }
        }
        codec::decode_parts(&payload, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashAlgorithm;
    use serde_json::json;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn signer() -> Signer {
        Signer::new(CipherConfig::default())
    }

    fn strict() -> Signer {
        Signer::new(CipherConfig::default().with_exception_on_error(true))
    }

    #[test]
    fn integer_comes_back_as_integer() {
        let s = signer().sign(&Value::Int(12345), KEY, None).unwrap();
        assert_eq!(signer().verify(&s, KEY).unwrap(), Some(Value::Int(12345)));
    }

    #[test]
    fn format_has_three_segments_without_expiry() {
        let s = signer().sign(&"hi".into(), KEY, None).unwrap();
        let parts: Vec<&str> = s.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], base64url::encode("hi"));
        assert_eq!(parts[1], "4");
    }

    #[test]
    fn every_value_type_round_trips() {
        let signer = Signer::new(CipherConfig::default().with_allow_null(true));
        for v in [
            Value::Null,
            Value::Bool(false),
            Value::Int(-7),
            Value::Float(2.5),
            Value::Text("héllo.world".into()),
            Value::Structured(json!({"id": 1, "tags": ["a", "b"]})),
        ] {
            let s = signer.sign(&v, KEY, None).unwrap();
            assert_eq!(signer.verify(&s, KEY).unwrap(), Some(v));
        }
    }

    #[test]
    fn expiry_in_future_verifies() {
        let s = signer()
            .sign(&"x".into(), KEY, Some(Expiry::In(Duration::from_secs(3600))))
            .unwrap();
        assert_eq!(s.split('.').count(), 4);
        assert_eq!(signer().verify(&s, KEY).unwrap(), Some(Value::Text("x".into())));
    }

    #[test]
    fn expired_signature_is_distinct_from_tampering() {
        let past = now_millis() - 1;
        let s = strict().sign(&"x".into(), KEY, Some(Expiry::At(past))).unwrap();
        match strict().verify(&s, KEY).unwrap_err() {
            CryptoError::ExpiredSignature { expired_at_ms } => assert_eq!(expired_at_ms, past),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(signer().verify(&s, KEY).unwrap(), None);
    }

    #[test]
    fn extending_expiry_breaks_signature() {
        let past = now_millis() - 1000;
        let s = strict().sign(&"x".into(), KEY, Some(Expiry::At(past))).unwrap();
        let parts: Vec<&str> = s.split('.').collect();
        let forged = format!("{}.{}.{}.{}", parts[0], parts[1], past + 10_000_000, parts[3]);
        assert!(matches!(
            strict().verify(&forged, KEY).unwrap_err(),
            CryptoError::AuthenticationFailure
        ));
    }

    #[test]
    fn any_flipped_character_fails() {
        let s = signer().sign(&Value::Int(12345), KEY, None).unwrap();
        let bytes = s.as_bytes();
        for i in 0..bytes.len() {
            let mut tampered = bytes.to_vec();
            tampered[i] = if tampered[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(tampered).unwrap();
            if tampered == s {
                continue;
            }
            assert_eq!(signer().verify(&tampered, KEY).unwrap(), None, "index {i}");
        }
    }

    #[test]
    fn wrong_segment_count_is_malformed() {
        for bad in ["abc", "a.b", "a.b.c.d.e"] {
            assert!(matches!(
                strict().verify(bad, KEY).unwrap_err(),
                CryptoError::MalformedEnvelope(_)
            ));
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let s = signer().sign(&"x".into(), KEY, None).unwrap();
        let other = "ff".repeat(32);
        assert!(matches!(
            strict().verify(&s, &other).unwrap_err(),
            CryptoError::AuthenticationFailure
        ));
    }

    #[test]
    fn key_length_follows_hash() {
        let signer =
            Signer::new(CipherConfig::default().with_hashing_algorithm(HashAlgorithm::Sha512));
        assert_eq!(signer.generate_key().unwrap().len(), 128);
        let err = signer.sign(&"x".into(), KEY, None).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { .. }));
        // Key errors are never folded into `None`.
        assert!(signer.verify("a.b.c", KEY).is_err());
    }

    #[test]
    fn null_requires_allow_null() {
        assert!(matches!(
            signer().sign(&Value::Null, KEY, None).unwrap_err(),
            CryptoError::TypeMismatch(_)
        ));
    }
}
