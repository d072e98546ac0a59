//! `sealctl`: command-line entry point.
//!
//! Startup sequence:
//! 1. Parse the command line.
//! 2. Load and validate [`Settings`] from `SEALCTL_*` environment variables.
//! 3. Initialise structured logging on stderr.
//! 4. Run the command; results go to stdout.

mod cli;
mod config;
mod telemetry;

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use sealkit::{Encryptor, Expiry, FileEncryptor, Signer, Value};
use tracing::info;

use crate::cli::{Cli, Command, KeyPurpose};
use crate::config::Settings;

fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Command line
    // -----------------------------------------------------------------------
    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let settings = Settings::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 3. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(&settings.log_level)?;
    info!(version = env!("CARGO_PKG_VERSION"), "sealctl starting");

    // -----------------------------------------------------------------------
    // 4. Command
    // -----------------------------------------------------------------------
    let output = run(cli.command, &settings)?;
    if let Some(output) = output {
        println!("{output}");
    }
    Ok(())
}

/// Execute one command and return what should be printed.
fn run(command: Command, settings: &Settings) -> Result<Option<String>> {
    let config = settings.cipher_config()?;
    match command {
        Command::Encrypt { value, secret, aad } => {
            let (key_type, key) = secret.resolve()?;
            let encryptor = Encryptor::new(config.with_key_type(key_type))?;
            let envelope = encryptor.encrypt_to_string(
                &cli::parse_value(&value),
                key,
                aad.as_deref().map(str::as_bytes),
            )?;
            Ok(Some(envelope))
        }
        Command::Decrypt { envelope, secret, aad } => {
            let (key_type, key) = secret.resolve()?;
            let encryptor = Encryptor::new(config.with_key_type(key_type))?;
            let value = encryptor
                .decrypt(envelope.as_bytes(), key, aad.as_deref().map(str::as_bytes))?
                .ok_or_else(|| anyhow!("envelope rejected"))?;
            Ok(Some(render(&value)?))
        }
        Command::Sign { value, key, expires_in, expires_at } => {
            let expire = match (expires_in, expires_at) {
                (Some(secs), _) => Some(Expiry::In(Duration::from_secs(secs))),
                (None, Some(ms)) => Some(Expiry::At(ms)),
                (None, None) => None,
            };
            let signed = Signer::new(config).sign(&cli::parse_value(&value), &key, expire)?;
            Ok(Some(signed))
        }
        Command::Verify { signed, key } => {
            let value = Signer::new(config)
                .verify(&signed, &key)?
                .ok_or_else(|| anyhow!("signature rejected"))?;
            Ok(Some(render(&value)?))
        }
        Command::EncryptFile { input, output, key } => {
            FileEncryptor::new(settings.file_strategy()?)?
                .encrypt_file(&input, &output, &key)
                .with_context(|| format!("encrypting {}", input.display()))?;
            Ok(None)
        }
        Command::DecryptFile { input, output, key } => {
            FileEncryptor::new(settings.file_strategy()?)?
                .decrypt_file(&input, &output, &key)
                .with_context(|| format!("decrypting {}", input.display()))?;
            Ok(None)
        }
        Command::GenerateKey { purpose } => {
            let key = match purpose {
                KeyPurpose::Encrypt => Encryptor::new(config)?.generate_key()?,
                KeyPurpose::Sign => Signer::new(config).generate_key()?,
                KeyPurpose::File => FileEncryptor::generate_key()?,
            };
            Ok(Some(key))
        }
    }
}

fn render(value: &Value) -> Result<String> {
    if matches!(value, Value::Float(f) if !f.is_finite()) {
        bail!("decoded float {value:?} has no JSON form");
    }
    serde_json::to_string(&value.to_json()).context("failed to render value")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SecretArgs;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn secret(key: &str) -> SecretArgs {
        SecretArgs {
            key: Some(key.into()),
            password: None,
        }
    }

    #[test]
    fn encrypt_then_decrypt_prints_json() {
        let settings = Settings::default();
        let key = run(
            Command::GenerateKey {
                purpose: KeyPurpose::Encrypt,
            },
            &settings,
        )
        .unwrap()
        .unwrap();
        assert_eq!(key.len(), 128);

        let envelope = run(
            Command::Encrypt {
                value: r#"{"id":7}"#.into(),
                secret: secret(&key),
                aad: None,
            },
            &settings,
        )
        .unwrap()
        .unwrap();
        let out = run(
            Command::Decrypt {
                envelope,
                secret: secret(&key),
                aad: None,
            },
            &settings,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out, r#"{"id":7}"#);
    }

    #[test]
    fn sign_then_verify_keeps_type() {
        let settings = Settings::default();
        let signed = run(
            Command::Sign {
                value: "12345".into(),
                key: KEY.into(),
                expires_in: None,
                expires_at: None,
            },
            &settings,
        )
        .unwrap()
        .unwrap();
        let out = run(
            Command::Verify {
                signed,
                key: KEY.into(),
            },
            &settings,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out, "12345");
    }

    #[test]
    fn rejected_signature_is_an_error() {
        let err = run(
            Command::Verify {
                signed: "a.b.c".into(),
                key: KEY.into(),
            },
            &Settings::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("rejected"), "{err}");
    }
}
