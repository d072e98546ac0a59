//! Cipher configuration: algorithms, key handling and output formats.
//!
//! A [`CipherConfig`] is a plain value. Build one with `Default` plus the
//! consuming `with_*` methods and hand it to an engine; engines own their copy,
//! so a config is never shared and mutated across threads.

use std::fmt;
use std::str::FromStr;

use common::CryptoError;

/// AES block size in bytes; also the IV length for CBC and CTR.
pub const BLOCK_LEN: usize = 16;

/// Nonce length for the GCM family.
pub const AEAD_NONCE_LEN: usize = 12;

/// Authentication tag length for the GCM family.
pub const AEAD_TAG_LEN: usize = 16;

/// Default PBKDF2 iteration count.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;

/// Block cipher mode of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherMode {
    Cbc,
    Ctr,
    Gcm,
    /// AES-GCM-SIV (RFC 8452).
    GcmSiv,
}

impl CipherMode {
    /// `true` when the cipher itself produces the authentication tag.
    pub fn is_aead(self) -> bool {
        matches!(self, CipherMode::Gcm | CipherMode::GcmSiv)
    }

    /// IV or nonce length in bytes.
    pub fn iv_len(self) -> usize {
        if self.is_aead() {
            AEAD_NONCE_LEN
        } else {
            BLOCK_LEN
        }
    }

    fn name(self) -> &'static str {
        match self {
            CipherMode::Cbc => "cbc",
            CipherMode::Ctr => "ctr",
            CipherMode::Gcm => "gcm",
            CipherMode::GcmSiv => "gcm-siv",
        }
    }
}

/// AES key size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl KeySize {
    pub fn bits(self) -> usize {
        match self {
            KeySize::Aes128 => 128,
            KeySize::Aes192 => 192,
            KeySize::Aes256 => 256,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() / 8
    }

    fn from_bits(bits: &str) -> Option<Self> {
        match bits {
            "128" => Some(KeySize::Aes128),
            "192" => Some(KeySize::Aes192),
            "256" => Some(KeySize::Aes256),
            _ => None,
        }
    }
}

/// An AES key size paired with a mode, e.g. `aes-256-cbc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptionAlgorithm {
    pub key_size: KeySize,
    pub mode: CipherMode,
}

impl EncryptionAlgorithm {
    pub const fn new(key_size: KeySize, mode: CipherMode) -> Self {
        Self { key_size, mode }
    }

    /// Reject combinations the underlying crates do not provide.
    pub fn validate(self) -> Result<(), CryptoError> {
        if self.mode == CipherMode::GcmSiv && self.key_size == KeySize::Aes192 {
            return Err(CryptoError::UnsupportedAlgorithm(
                "aes-192-gcm-siv is not available".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EncryptionAlgorithm {
    fn default() -> Self {
        Self::new(KeySize::Aes256, CipherMode::Cbc)
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aes-{}-{}", self.key_size.bits(), self.mode.name())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = CryptoError;

    /// Parses names of the form `aes-<bits>-<mode>`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let unsupported =
            || CryptoError::UnsupportedAlgorithm(format!("encryption algorithm {s:?}"));

        let rest = lower.strip_prefix("aes-").ok_or_else(unsupported)?;
        let (bits, mode) = rest.split_once('-').ok_or_else(unsupported)?;
        let key_size = KeySize::from_bits(bits).ok_or_else(unsupported)?;
        let mode = match mode {
            "cbc" => CipherMode::Cbc,
            "ctr" => CipherMode::Ctr,
            "gcm" => CipherMode::Gcm,
            "gcm-siv" => CipherMode::GcmSiv,
            _ => return Err(unsupported()),
        };
        let alg = Self::new(key_size, mode);
        alg.validate()?;
        Ok(alg)
    }
}

/// Hash function used for HMAC and PBKDF2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Digest length in bytes; also the HMAC key length this toolkit requires.
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha224" => Ok(HashAlgorithm::Sha224),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(CryptoError::UnsupportedAlgorithm(format!("hashing algorithm {s:?}"))),
        }
    }
}

/// How the caller's key string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    /// Hex-encoded key material, split into encryption and MAC sub-keys.
    #[default]
    Key,
    /// UTF-8 password stretched with PBKDF2, salted with the IV.
    Password,
}

impl FromStr for KeyType {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key" => Ok(KeyType::Key),
            "password" => Ok(KeyType::Password),
            _ => Err(CryptoError::InvalidConfig(format!("unknown key type {s:?}"))),
        }
    }
}

/// Whether plaintext carries a trailing type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    #[default]
    TypeByte,
    StringOnly,
}

impl FromStr for DataFormat {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "type-byte" => Ok(DataFormat::TypeByte),
            "string-only" => Ok(DataFormat::StringOnly),
            _ => Err(CryptoError::InvalidConfig(format!("unknown data format {s:?}"))),
        }
    }
}

/// Text or binary encoding of the finished envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnFormat {
    Base64,
    #[default]
    Base64Url,
    Hex,
    Bytes,
}

impl FromStr for ReturnFormat {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base64" => Ok(ReturnFormat::Base64),
            "base64url" => Ok(ReturnFormat::Base64Url),
            "hex" => Ok(ReturnFormat::Hex),
            "bytes" => Ok(ReturnFormat::Bytes),
            _ => Err(CryptoError::InvalidConfig(format!("unknown return format {s:?}"))),
        }
    }
}

/// Everything an engine needs to know for one encrypt/decrypt or sign/verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherConfig {
    pub encryption_algorithm: EncryptionAlgorithm,
    pub hashing_algorithm: HashAlgorithm,
    /// Ignored for AEAD modes.
    pub encrypt_then_authenticate: bool,
    pub key_type: KeyType,
    pub pbkdf2_algorithm: HashAlgorithm,
    pub pbkdf2_iterations: u32,
    pub data_format: DataFormat,
    pub return_format: ReturnFormat,
    pub allow_null: bool,
    pub exception_on_error: bool,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            encryption_algorithm: EncryptionAlgorithm::default(),
            hashing_algorithm: HashAlgorithm::Sha256,
            encrypt_then_authenticate: true,
            key_type: KeyType::Key,
            pbkdf2_algorithm: HashAlgorithm::Sha512,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            data_format: DataFormat::TypeByte,
            return_format: ReturnFormat::Base64Url,
            allow_null: false,
            exception_on_error: false,
        }
    }
}

impl CipherConfig {
    pub fn with_encryption_algorithm(mut self, alg: EncryptionAlgorithm) -> Self {
        self.encryption_algorithm = alg;
        self
    }

    pub fn with_hashing_algorithm(mut self, alg: HashAlgorithm) -> Self {
        self.hashing_algorithm = alg;
        self
    }

    pub fn with_encrypt_then_authenticate(mut self, on: bool) -> Self {
        self.encrypt_then_authenticate = on;
        self
    }

    pub fn with_key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    pub fn with_pbkdf2(mut self, alg: HashAlgorithm, iterations: u32) -> Self {
        self.pbkdf2_algorithm = alg;
        self.pbkdf2_iterations = iterations;
        self
    }

    pub fn with_data_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    pub fn with_return_format(mut self, format: ReturnFormat) -> Self {
        self.return_format = format;
        self
    }

    pub fn with_allow_null(mut self, allow: bool) -> Self {
        self.allow_null = allow;
        self
    }

    pub fn with_exception_on_error(mut self, raise: bool) -> Self {
        self.exception_on_error = raise;
        self
    }

    pub fn mode(&self) -> CipherMode {
        self.encryption_algorithm.mode
    }

    /// `true` when an HMAC is computed and appended (non-AEAD modes only).
    pub fn uses_hmac(&self) -> bool {
        !self.mode().is_aead() && self.encrypt_then_authenticate
    }

    pub fn iv_len(&self) -> usize {
        self.mode().iv_len()
    }

    /// Length of the trailing tag or HMAC, zero if unauthenticated.
    pub fn tag_len(&self) -> usize {
        if self.mode().is_aead() {
            AEAD_TAG_LEN
        } else if self.encrypt_then_authenticate {
            self.hashing_algorithm.output_len()
        } else {
            0
        }
    }

    pub fn enc_key_len(&self) -> usize {
        self.encryption_algorithm.key_size.bytes()
    }

    pub fn mac_key_len(&self) -> usize {
        if self.uses_hmac() {
            self.hashing_algorithm.output_len()
        } else {
            0
        }
    }

    /// Total key material in bytes; a hex key must be twice this many characters.
    pub fn key_len(&self) -> usize {
        self.enc_key_len() + self.mac_key_len()
    }

    /// Check for combinations that cannot work regardless of input.
    pub fn validate(&self) -> Result<(), CryptoError> {
        self.encryption_algorithm.validate()?;
        if self.key_type == KeyType::Password && self.pbkdf2_iterations == 0 {
            return Err(CryptoError::InvalidConfig(
                "pbkdf2 iteration count must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Envelope length for a plaintext of `plaintext_len` bytes.
    ///
    /// This counts the type tag byte when [`DataFormat::TypeByte`] is active,
    /// but not the return-format text encoding.
    pub fn envelope_len(&self, plaintext_len: usize) -> usize {
        let tagged = match self.data_format {
            DataFormat::TypeByte => plaintext_len + 1,
            DataFormat::StringOnly => plaintext_len,
        };
        let ciphertext = match self.mode() {
            CipherMode::Cbc => (tagged / BLOCK_LEN + 1) * BLOCK_LEN,
            _ => tagged,
        };
        ciphertext + self.iv_len() + self.tag_len()
    }
}
