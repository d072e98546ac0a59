//! Error taxonomy shared across crates.

use thiserror::Error;

/// Every failure the toolkit can report.
///
/// Variants fall into two classes:
/// - **Data failures** ([`CryptoError::is_data_failure`]): the input looked
///   adversarial or corrupt. Value-level `decrypt`/`verify` fold these into
///   `Ok(None)` unless `exception_on_error` is set.
/// - **Everything else**: misconfiguration, entropy, I/O or external command
///   failures. These always propagate.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key has the wrong length or is not valid hex.
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Human-readable description, including the expected length.
        reason: String,
    },

    /// An algorithm name is unknown or the combination is not available.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The configuration is internally inconsistent for the requested call.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A value was rejected before encryption or signing.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Envelope structure is wrong: bad encoding, segment count or size.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Tag or HMAC mismatch: tampered data, wrong key or wrong AAD.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// The trailing type tag could not be decoded after authentication.
    #[error("type decode failed: {0}")]
    TypeDecode(String),

    /// The signature is valid but its expiry time has passed.
    #[error("signature expired at {expired_at_ms} ms since epoch")]
    ExpiredSignature {
        /// Expiry time carried by the signed envelope.
        expired_at_ms: i64,
    },

    /// An external command used by the file engine failed.
    #[error("command `{command}` failed (status: {}): {output}", fmt_status(.status))]
    CommandExecution {
        /// The command line, with key material redacted.
        command: String,
        /// Exit status, if the process ran at all.
        status: Option<i32>,
        /// Captured stdout/stderr or the spawn error.
        output: String,
    },

    /// The operating system could not supply random bytes.
    #[error("entropy source failure: {0}")]
    Entropy(String),

    /// Filesystem error in the file engine.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    /// Returns `true` for failures caused by untrusted input rather than by
    /// the caller's configuration or environment.
    pub fn is_data_failure(&self) -> bool {
        matches!(
            self,
            CryptoError::MalformedEnvelope(_)
                | CryptoError::AuthenticationFailure
                | CryptoError::TypeDecode(_)
                | CryptoError::ExpiredSignature { .. }
        )
    }

    /// Short machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            CryptoError::InvalidKey { .. } => "invalid_key",
            CryptoError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            CryptoError::InvalidConfig(_) => "invalid_config",
            CryptoError::TypeMismatch(_) => "type_mismatch",
            CryptoError::MalformedEnvelope(_) => "malformed_envelope",
            CryptoError::AuthenticationFailure => "authentication_failure",
            CryptoError::TypeDecode(_) => "type_decode",
            CryptoError::ExpiredSignature { .. } => "expired_signature",
            CryptoError::CommandExecution { .. } => "command_execution",
            CryptoError::Entropy(_) => "entropy",
            CryptoError::Io(_) => "io",
        }
    }

    /// Build an [`CryptoError::InvalidKey`] with the given reason.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        CryptoError::InvalidKey {
            reason: reason.into(),
        }
    }
}

fn fmt_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_owned(),
    }
}
