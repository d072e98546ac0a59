//! Cipher and MAC commands for the streaming file strategy.
//!
//! The file engine describes each step as a [`FileCommand`] and hands it to a
//! [`ProcessRunner`]. [`OpensslRunner`] spawns the `openssl` binary;
//! [`NativeRunner`] performs the same commands in-process with a fixed-size
//! buffer. Both produce byte-identical files.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use aes::cipher::generic_array::GenericArray;
use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use common::CryptoError;
use tracing::debug;

use crate::config::{HashAlgorithm, BLOCK_LEN};
use crate::crypto::cipher::HmacState;

/// Read buffer for [`NativeRunner`].
const CHUNK_LEN: usize = 64 * 1024;

/// One step of streaming file encryption or decryption.
///
/// Keys and IVs are hex. Cipher commands are AES-256-CBC with PKCS#7
/// padding; the MAC command is HMAC-SHA256 over the whole file.
#[derive(Clone, PartialEq, Eq)]
pub enum FileCommand {
    Encrypt {
        input: PathBuf,
        output: PathBuf,
        key_hex: String,
        iv_hex: String,
    },
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        key_hex: String,
        iv_hex: String,
    },
    Hmac {
        path: PathBuf,
        key_hex: String,
    },
}

impl FileCommand {
    /// `openssl` arguments for this command.
    pub fn openssl_args(&self) -> Vec<String> {
        match self {
            FileCommand::Encrypt { input, output, key_hex, iv_hex } => {
                enc_args("-e", input, output, key_hex, iv_hex)
            }
            FileCommand::Decrypt { input, output, key_hex, iv_hex } => {
                enc_args("-d", input, output, key_hex, iv_hex)
            }
            FileCommand::Hmac { path, key_hex } => vec![
                "dgst".into(),
                "-sha256".into(),
                "-mac".into(),
                "HMAC".into(),
                "-macopt".into(),
                format!("hexkey:{key_hex}"),
                "-r".into(),
                path.display().to_string(),
            ],
        }
    }

    /// Command line with key material replaced, safe for logs and errors.
    pub fn describe(&self) -> String {
        let mut args = self.openssl_args();
        for arg in args.iter_mut() {
            if arg.starts_with("hexkey:") {
                *arg = "hexkey:<redacted>".into();
            }
        }
        if let Some(pos) = args.iter().position(|a| a == "-K") {
            if let Some(key) = args.get_mut(pos + 1) {
                *key = "<redacted>".into();
            }
        }
        format!("openssl {}", args.join(" "))
    }
}

impl std::fmt::Debug for FileCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

fn enc_args(direction: &str, input: &Path, output: &Path, key: &str, iv: &str) -> Vec<String> {
    vec![
        "enc".into(),
        "-aes-256-cbc".into(),
        direction.into(),
        "-K".into(),
        key.into(),
        "-iv".into(),
        iv.into(),
        "-in".into(),
        input.display().to_string(),
        "-out".into(),
        output.display().to_string(),
    ]
}

/// Executes [`FileCommand`]s and returns their standard output.
///
/// The MAC command prints one line: `<hex digest> *<path>`. Cipher commands
/// print nothing.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: &FileCommand) -> Result<String, CryptoError>;
}

/// Runs commands through the `openssl` executable.
#[derive(Debug, Clone)]
pub struct OpensslRunner {
    program: PathBuf,
}

impl OpensslRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for OpensslRunner {
    fn default() -> Self {
        Self::new("openssl")
    }
}

impl ProcessRunner for OpensslRunner {
    fn run(&self, command: &FileCommand) -> Result<String, CryptoError> {
        let described = command.describe();
        debug!(command = %described, "spawning");

        let output = Command::new(&self.program)
            .args(command.openssl_args())
            .output()
            .map_err(|e| CryptoError::CommandExecution {
                command: described.clone(),
                status: None,
                output: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CryptoError::CommandExecution {
                command: described,
                status: output.status.code(),
                output: format!("{stdout}{stderr}").trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

/// Runs commands in-process with bounded memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRunner;

impl ProcessRunner for NativeRunner {
    fn run(&self, command: &FileCommand) -> Result<String, CryptoError> {
        debug!(command = %command.describe(), "running natively");
        match command {
            FileCommand::Encrypt { input, output, key_hex, iv_hex } => {
                let (key, iv) = (decode_hex(key_hex, 32)?, decode_hex(iv_hex, BLOCK_LEN)?);
                stream_encrypt(input, output, &key, &iv)?;
                Ok(String::new())
            }
            FileCommand::Decrypt { input, output, key_hex, iv_hex } => {
                let (key, iv) = (decode_hex(key_hex, 32)?, decode_hex(iv_hex, BLOCK_LEN)?);
                stream_decrypt(input, output, &key, &iv)?;
                Ok(String::new())
            }
            FileCommand::Hmac { path, key_hex } => {
                let key = hex::decode(key_hex)
                    .map_err(|e| CryptoError::invalid_key(format!("mac key is not hex: {e}")))?;
                let mut mac = HmacState::new(HashAlgorithm::Sha256, &key)?;
                let mut reader = File::open(path)?;
                let mut buf = vec![0u8; CHUNK_LEN];
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    mac.update(&buf[..n]);
                }
                Ok(format!("{} *{}\n", hex::encode(mac.finalize()), path.display()))
            }
        }
    }
}

fn decode_hex(value: &str, len: usize) -> Result<Vec<u8>, CryptoError> {
    match hex::decode(value) {
        Ok(bytes) if bytes.len() == len => Ok(bytes),
        _ => Err(CryptoError::invalid_key(format!("expected {} hex characters", len * 2))),
    }
}

fn stream_encrypt(input: &Path, output: &Path, key: &[u8], iv: &[u8]) -> Result<(), CryptoError> {
    let mut enc = cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
        .map_err(|_| CryptoError::invalid_key("aes-256-cbc key or iv rejected"))?;
    let mut reader = File::open(input)?;
    let mut writer = BufWriter::new(File::create(output)?);
    let mut buf = vec![0u8; CHUNK_LEN];
    let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_LEN + BLOCK_LEN);

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);
        // Whole blocks go out now; the remainder waits for more input or padding.
        let whole = pending.len() / BLOCK_LEN * BLOCK_LEN;
        for block in pending[..whole].chunks_exact_mut(BLOCK_LEN) {
            enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        writer.write_all(&pending[..whole])?;
        pending.drain(..whole);
    }

    let mut last = [0u8; BLOCK_LEN];
    let tail = pending.len();
    last[..tail].copy_from_slice(&pending);
    let padded = enc
        .encrypt_padded_mut::<Pkcs7>(&mut last, tail)
        .map_err(|_| CryptoError::MalformedEnvelope("padding failed".into()))?;
    writer.write_all(padded)?;
    writer.flush()?;
    Ok(())
}

fn stream_decrypt(input: &Path, output: &Path, key: &[u8], iv: &[u8]) -> Result<(), CryptoError> {
    let mut dec = cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
        .map_err(|_| CryptoError::invalid_key("aes-256-cbc key or iv rejected"))?;
    let mut reader = File::open(input)?;
    let mut writer = BufWriter::new(File::create(output)?);
    let mut buf = vec![0u8; CHUNK_LEN];
    let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_LEN + BLOCK_LEN);

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);
        // The final block is held back until EOF so its padding can be stripped.
        let ready = pending.len().saturating_sub(1) / BLOCK_LEN * BLOCK_LEN;
        for block in pending[..ready].chunks_exact_mut(BLOCK_LEN) {
            dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        writer.write_all(&pending[..ready])?;
        pending.drain(..ready);
    }

    if pending.len() != BLOCK_LEN {
        return Err(CryptoError::MalformedEnvelope(
            "ciphertext is not a whole number of blocks".into(),
        ));
    }
    let plain = dec
        .decrypt_padded_mut::<Pkcs7>(&mut pending)
        .map_err(|_| CryptoError::MalformedEnvelope("invalid padding".into()))?;
    writer.write_all(plain)?;
    writer.flush()?;
    Ok(())
}
