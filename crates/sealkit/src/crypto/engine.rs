//! Authenticated encryption of values into self-contained envelopes.
//!
//! # Envelope layout
//!
//! ```text
//! ciphertext || IV || [AEAD tag | HMAC(mac_key, ciphertext || IV || AAD)]
//! ```
//!
//! The IV is fresh per call and always exactly the cipher's IV/nonce length.
//! Nothing about the algorithm is stored in the envelope; the decrypting side
//! must use the same [`CipherConfig`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{CryptoError, Value};
use tracing::debug;
use zeroize::Zeroize;

use super::cipher;
use super::kdf::{decode_hex_key, derive_keys, KeyMaterial};
use crate::base64url;
use crate::codec;
use crate::config::{CipherConfig, CipherMode, DataFormat, KeyType, ReturnFormat, BLOCK_LEN};
use crate::random;

/// Encrypts and decrypts values under one [`CipherConfig`].
#[derive(Debug, Clone)]
pub struct Encryptor {
    config: CipherConfig,
}

impl Encryptor {
    /// # Errors
    ///
    /// Returns an error if the configuration names an unavailable algorithm
    /// combination.
    pub fn new(config: CipherConfig) -> Result<Self, CryptoError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CipherConfig {
        &self.config
    }

    /// Generate a random hex key of exactly the length this config requires.
    pub fn generate_key(&self) -> Result<String, CryptoError> {
        random::hex(self.config.key_len())
    }

    /// Encrypt a value and encode the envelope with the configured return format.
    ///
    /// For text formats the returned bytes are ASCII; see [`Self::encrypt_to_string`].
    ///
    /// # Errors
    ///
    /// Always returns configuration, key and type errors; encryption itself has
    /// no data-dependent failure mode.
    pub fn encrypt(
        &self,
        value: &Value,
        key: &str,
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        let plaintext = self.encode_value(value)?;
        let envelope = self.seal(&plaintext, key, aad)?;
        Ok(match self.config.return_format {
            ReturnFormat::Base64 => STANDARD.encode(&envelope).into_bytes(),
            ReturnFormat::Base64Url => base64url::encode(&envelope).into_bytes(),
            ReturnFormat::Hex => hex::encode(&envelope).into_bytes(),
            ReturnFormat::Bytes => envelope,
        })
    }

    /// Like [`Self::encrypt`], for the text return formats.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidConfig`] when the return format is
    /// [`ReturnFormat::Bytes`].
    pub fn encrypt_to_string(
        &self,
        value: &Value,
        key: &str,
        aad: Option<&[u8]>,
    ) -> Result<String, CryptoError> {
        if self.config.return_format == ReturnFormat::Bytes {
            return Err(CryptoError::InvalidConfig(
                "raw byte envelopes cannot be returned as text; use encrypt()".into(),
            ));
        }
        let bytes = self.encrypt(value, key, aad)?;
        String::from_utf8(bytes)
            .map_err(|_| CryptoError::InvalidConfig("envelope is not text".into()))
    }

    /// Decrypt an envelope produced by [`Self::encrypt`].
    ///
    /// Returns `Ok(None)` when the envelope is malformed, fails authentication
    /// or carries an unknown type tag, unless `exception_on_error` is set, in
    /// which case those surface as `Err`. Key and configuration errors are
    /// always returned as `Err`.
    pub fn decrypt(
        &self,
        envelope: impl AsRef<[u8]>,
        key: &str,
        aad: Option<&[u8]>,
    ) -> Result<Option<Value>, CryptoError> {
        match self.try_decrypt(envelope.as_ref(), key, aad) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_data_failure() && !self.config.exception_on_error => {
                debug!(reason = e.code(), "envelope rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn try_decrypt(
        &self,
        envelope: &[u8],
        key: &str,
        aad: Option<&[u8]>,
    ) -> Result<Value, CryptoError> {
        self.check_aad(aad)?;
        self.check_key(key)?;
        let raw = match self.config.return_format {
            ReturnFormat::Base64 => STANDARD
                .decode(envelope.trim_ascii())
                .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid base64: {e}")))?,
            ReturnFormat::Base64Url => base64url::decode(envelope.trim_ascii())?,
            ReturnFormat::Hex => hex::decode(envelope.trim_ascii())
                .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid hex: {e}")))?,
            ReturnFormat::Bytes => envelope.to_vec(),
        };
        let plaintext = self.open(&raw, key, aad)?;
        match self.config.data_format {
            DataFormat::TypeByte => codec::decode(&plaintext),
            DataFormat::StringOnly => String::from_utf8(plaintext)
                .map(Value::Text)
                .map_err(|_| CryptoError::TypeDecode("plaintext is not valid UTF-8".into())),
        }
    }

    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CryptoError> {
        if value.is_null() && !self.config.allow_null {
            return Err(CryptoError::TypeMismatch(
                "null values cannot be encrypted unless allow_null is set".into(),
            ));
        }
        match self.config.data_format {
            DataFormat::TypeByte => codec::encode(value),
            DataFormat::StringOnly => match value {
                Value::Text(s) => Ok(s.as_bytes().to_vec()),
                other => Err(CryptoError::TypeMismatch(format!(
                    "string-only data format cannot encrypt a {}",
                    other.type_name()
                ))),
            },
        }
    }

    /// Encrypt raw bytes into a raw envelope.
    ///
    /// No value codec and no return-format encoding are applied.
    pub fn seal(
        &self,
        plaintext: &[u8],
        key: &str,
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        self.check_aad(aad)?;
        let config = &self.config;
        let iv = random::bytes(config.iv_len())?;
        let keys = derive_keys(config, key, &iv)?;
        let aad = aad.unwrap_or_default();

        let mut ciphertext =
            cipher::encrypt(config.encryption_algorithm, keys.enc_key(), &iv, plaintext, aad)?;

        let mut envelope = Vec::with_capacity(ciphertext.len() + iv.len() + config.tag_len());
        if config.mode().is_aead() {
            let tag = ciphertext.split_off(ciphertext.len() - config.tag_len());
            envelope.extend_from_slice(&ciphertext);
            envelope.extend_from_slice(&iv);
            envelope.extend_from_slice(&tag);
        } else {
            envelope.extend_from_slice(&ciphertext);
            envelope.extend_from_slice(&iv);
            if let Some(mac_key) = keys.mac_key() {
                let mac = cipher::hmac(
                    config.hashing_algorithm,
                    mac_key,
                    &[ciphertext.as_slice(), iv.as_slice(), aad],
                )?;
                envelope.extend_from_slice(&mac);
            }
        }
        Ok(envelope)
    }

    /// Authenticate and decrypt a raw envelope produced by [`Self::seal`].
    ///
    /// Unlike [`Self::decrypt`] every failure is returned as `Err`.
    pub fn open(
        &self,
        envelope: &[u8],
        key: &str,
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        self.check_aad(aad)?;
        let config = &self.config;

        self.check_key(key)?;
        let hex_keys = match config.key_type {
            KeyType::Key => Some(derive_keys(config, key, &[])?),
            KeyType::Password => None,
        };

        let (iv_len, tag_len) = (config.iv_len(), config.tag_len());
        let min_ct = if config.mode() == CipherMode::Cbc { BLOCK_LEN } else { 0 };
        if envelope.len() < min_ct + iv_len + tag_len {
            return Err(CryptoError::MalformedEnvelope(format!(
                "envelope too short: {} bytes, need at least {}",
                envelope.len(),
                min_ct + iv_len + tag_len
            )));
        }
        let (body, tag) = envelope.split_at(envelope.len() - tag_len);
        let (ciphertext, iv) = body.split_at(body.len() - iv_len);
        if config.mode() == CipherMode::Cbc && ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::MalformedEnvelope(
                "ciphertext is not a whole number of blocks".into(),
            ));
        }

        let keys: KeyMaterial = match hex_keys {
            Some(k) => k,
            None => derive_keys(config, key, iv)?,
        };
        let aad = aad.unwrap_or_default();
        let alg = config.encryption_algorithm;

        if config.mode().is_aead() {
            let mut combined = Vec::with_capacity(ciphertext.len() + tag.len());
            combined.extend_from_slice(ciphertext);
            combined.extend_from_slice(tag);
            return cipher::decrypt(alg, keys.enc_key(), iv, &combined, aad);
        }
        if let Some(mac_key) = keys.mac_key() {
            cipher::verify_hmac(config.hashing_algorithm, mac_key, &[ciphertext, iv, aad], tag)?;
        }
        cipher::decrypt(alg, keys.enc_key(), iv, ciphertext, aad)
    }

    /// Key errors surface even when the envelope itself is garbage.
    fn check_key(&self, key: &str) -> Result<(), CryptoError> {
        match self.config.key_type {
            KeyType::Key => decode_hex_key(key, self.config.key_len()).map(|mut k| k.zeroize()),
            KeyType::Password if key.is_empty() => {
                Err(CryptoError::invalid_key("password must not be empty"))
            }
            KeyType::Password => Ok(()),
        }
    }

    /// AAD can only be honoured when something authenticates it.
    fn check_aad(&self, aad: Option<&[u8]>) -> Result<(), CryptoError> {
        if aad.is_some() && !self.config.mode().is_aead() && !self.config.encrypt_then_authenticate
        {
            return Err(CryptoError::InvalidConfig(
                "additional authenticated data needs an AEAD mode or encrypt-then-authenticate"
                    .into(),
            ));
        }
        Ok(())
    }
}
