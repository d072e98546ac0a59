//! Command-line surface.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sealkit::{KeyType, Value};

#[derive(Parser, Debug)]
#[command(
    name = "sealctl",
    version,
    about = "Encrypt, sign and seal values and files",
    long_about = "sealctl: authenticated value encryption, HMAC signing and file encryption.\n\
                  Engine settings come from SEALCTL_* environment variables."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encrypt a value and print the envelope
    ///
    /// VALUE is parsed as JSON when possible (`42`, `true`, `{"a":1}`) and
    /// taken as text otherwise.
    Encrypt {
        value: String,
        #[command(flatten)]
        secret: SecretArgs,
        /// Additional authenticated data
        #[arg(long)]
        aad: Option<String>,
    },

    /// Decrypt an envelope and print the value as JSON
    Decrypt {
        envelope: String,
        #[command(flatten)]
        secret: SecretArgs,
        /// Additional authenticated data
        #[arg(long)]
        aad: Option<String>,
    },

    /// Sign a value and print the signed string
    Sign {
        value: String,
        /// Hex HMAC key
        #[arg(long, env = "SEALCTL_KEY", hide_env_values = true)]
        key: String,
        /// Seconds until the signature expires
        #[arg(long, conflicts_with = "expires_at")]
        expires_in: Option<u64>,
        /// Absolute expiry in milliseconds since the Unix epoch
        #[arg(long)]
        expires_at: Option<i64>,
    },

    /// Verify a signed string and print its value as JSON
    Verify {
        signed: String,
        /// Hex HMAC key
        #[arg(long, env = "SEALCTL_KEY", hide_env_values = true)]
        key: String,
    },

    /// Encrypt a file
    EncryptFile {
        input: PathBuf,
        output: PathBuf,
        /// 128-character hex file key
        #[arg(long, env = "SEALCTL_KEY", hide_env_values = true)]
        key: String,
    },

    /// Decrypt a file
    DecryptFile {
        input: PathBuf,
        output: PathBuf,
        /// 128-character hex file key
        #[arg(long, env = "SEALCTL_KEY", hide_env_values = true)]
        key: String,
    },

    /// Print a random key of the length the configured engine requires
    GenerateKey {
        #[arg(value_enum, default_value_t = KeyPurpose::Encrypt)]
        purpose: KeyPurpose,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPurpose {
    Encrypt,
    Sign,
    File,
}

/// Hex key or password for value encryption.
#[derive(Args, Debug)]
pub struct SecretArgs {
    /// Hex key (encryption key followed by MAC key)
    #[arg(long, env = "SEALCTL_KEY", hide_env_values = true)]
    pub key: Option<String>,
    /// Password, stretched with PBKDF2
    #[arg(long, env = "SEALCTL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl SecretArgs {
    /// A hex key wins over a password when both are present.
    pub fn resolve(&self) -> Result<(KeyType, &str)> {
        match (&self.key, &self.password) {
            (Some(key), _) => Ok((KeyType::Key, key.as_str())),
            (None, Some(password)) => Ok((KeyType::Password, password.as_str())),
            (None, None) => bail!("a --key or --password is required"),
        }
    }
}

/// Interpret a command-line value: JSON if it parses, text otherwise.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(Value::from)
        .unwrap_or_else(|_| Value::Text(raw.to_string()))
}
