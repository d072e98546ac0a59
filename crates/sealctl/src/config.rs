//! Engine settings for the CLI.
//!
//! All values are read from `SEALCTL_*` environment variables; every one has a
//! default. Keys and passwords are not settings: they arrive through the
//! command line (or `SEALCTL_KEY` / `SEALCTL_PASSWORD`, see [`crate::cli`]).

use anyhow::{Context, Result};
use sealkit::{
    CipherConfig, DataFormat, EncryptionAlgorithm, FileStrategy, HashAlgorithm, ReturnFormat,
};
use serde::Deserialize;

/// Validated CLI configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Cipher and mode, e.g. `aes-256-gcm`.
    #[serde(default = "default_encryption_algorithm")]
    pub encryption_algorithm: String,

    /// HMAC hash for encrypt-then-MAC and for signing.
    #[serde(default = "default_hashing_algorithm")]
    pub hashing_algorithm: String,

    #[serde(default = "default_true")]
    pub encrypt_then_authenticate: bool,

    #[serde(default = "default_pbkdf2_algorithm")]
    pub pbkdf2_algorithm: String,

    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    /// `type-byte` or `string-only`.
    #[serde(default = "default_data_format")]
    pub data_format: String,

    /// `base64`, `base64url` or `hex`.
    #[serde(default = "default_return_format")]
    pub return_format: String,

    #[serde(default)]
    pub allow_null: bool,

    /// Report why a decrypt or verify was rejected instead of a bare refusal.
    #[serde(default)]
    pub exception_on_error: bool,

    /// `native`, `openssl` or `in-memory`.
    #[serde(default = "default_file_strategy")]
    pub file_strategy: String,

    /// Tracing log level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_encryption_algorithm() -> String {
    "aes-256-cbc".into()
}
fn default_hashing_algorithm() -> String {
    "sha256".into()
}
fn default_true() -> bool {
    true
}
fn default_pbkdf2_algorithm() -> String {
    "sha512".into()
}
fn default_pbkdf2_iterations() -> u32 {
    sealkit::config::DEFAULT_PBKDF2_ITERATIONS
}
fn default_data_format() -> String {
    "type-byte".into()
}
fn default_return_format() -> String {
    "base64url".into()
}
fn default_file_strategy() -> String {
    "native".into()
}
fn default_log_level() -> String {
    "warn".into()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            encryption_algorithm: default_encryption_algorithm(),
            hashing_algorithm: default_hashing_algorithm(),
            encrypt_then_authenticate: default_true(),
            pbkdf2_algorithm: default_pbkdf2_algorithm(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
            data_format: default_data_format(),
            return_format: default_return_format(),
            allow_null: false,
            exception_on_error: false,
            file_strategy: default_file_strategy(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load and validate settings from `SEALCTL_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or names an unknown
    /// algorithm or format.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("SEALCTL"))
            .build()
            .context("failed to build configuration from environment")?;

        let s: Settings = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        s.validate()?;
        Ok(s)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    pub fn validate(&self) -> Result<()> {
        self.cipher_config()?;
        self.file_strategy()?;
        if self.pbkdf2_iterations == 0 {
            anyhow::bail!("SEALCTL_PBKDF2_ITERATIONS must be > 0");
        }
        if self.return_format.eq_ignore_ascii_case("bytes") {
            anyhow::bail!("SEALCTL_RETURN_FORMAT must be a text format on the command line");
        }
        Ok(())
    }

    /// Engine configuration for hex keys. Password mode is chosen per call.
    pub fn cipher_config(&self) -> Result<CipherConfig> {
        let encryption: EncryptionAlgorithm = self
            .encryption_algorithm
            .parse()
            .context("SEALCTL_ENCRYPTION_ALGORITHM")?;
        let hashing: HashAlgorithm =
            self.hashing_algorithm.parse().context("SEALCTL_HASHING_ALGORITHM")?;
        let pbkdf2: HashAlgorithm =
            self.pbkdf2_algorithm.parse().context("SEALCTL_PBKDF2_ALGORITHM")?;
        let data_format: DataFormat =
            self.data_format.parse().context("SEALCTL_DATA_FORMAT")?;
        let return_format: ReturnFormat =
            self.return_format.parse().context("SEALCTL_RETURN_FORMAT")?;

        Ok(CipherConfig::default()
            .with_encryption_algorithm(encryption)
            .with_hashing_algorithm(hashing)
            .with_encrypt_then_authenticate(self.encrypt_then_authenticate)
            .with_pbkdf2(pbkdf2, self.pbkdf2_iterations)
            .with_data_format(data_format)
            .with_return_format(return_format)
            .with_allow_null(self.allow_null)
            .with_exception_on_error(self.exception_on_error))
    }

    pub fn file_strategy(&self) -> Result<FileStrategy> {
        self.file_strategy.parse().context("SEALCTL_FILE_STRATEGY")
    }
}
