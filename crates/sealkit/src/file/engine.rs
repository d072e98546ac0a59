use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::str::FromStr;

use common::CryptoError;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::runner::{FileCommand, NativeRunner, OpensslRunner, ProcessRunner};
use super::{FILE_IV_LEN, FILE_KEY_LEN, FILE_MAC_LEN};
use crate::config::{
    CipherConfig, CipherMode, DataFormat, EncryptionAlgorithm, HashAlgorithm, KeySize, BLOCK_LEN,
};
use crate::crypto::{cipher, decode_hex_key, Encryptor};
use crate::random;

/// How file contents are pushed through the cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileStrategy {
    /// Read the whole file and use the value-level encryption engine.
    InMemory,
    /// Stream through [`NativeRunner`].
    #[default]
    Native,
    /// Stream through the `openssl` executable.
    Openssl,
}

impl FromStr for FileStrategy {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in-memory" | "memory" => Ok(FileStrategy::InMemory),
            "native" => Ok(FileStrategy::Native),
            "openssl" => Ok(FileStrategy::Openssl),
            other => Err(CryptoError::InvalidConfig(format!("unknown file strategy `{other}`"))),
        }
    }
}

enum Backend {
    InMemory(Encryptor),
    Streaming(Box<dyn ProcessRunner>),
}

/// Encrypts and decrypts whole files.
///
/// Layout is `ciphertext || IV (16) || HMAC-SHA256(ciphertext || IV) (32)`
/// with AES-256-CBC, whatever the strategy, so a file written by one strategy
/// is readable by any other. Every failure is returned as `Err`.
pub struct FileEncryptor {
    backend: Backend,
}

impl FileEncryptor {
    pub fn new(strategy: FileStrategy) -> Result<Self, CryptoError> {
        Ok(match strategy {
            FileStrategy::InMemory => Self {
                backend: Backend::InMemory(Encryptor::new(file_config())?),
            },
            FileStrategy::Native => Self::with_runner(NativeRunner),
            FileStrategy::Openssl => Self::with_runner(OpensslRunner::default()),
        })
    }

    /// Stream through a caller-supplied runner.
    pub fn with_runner(runner: impl ProcessRunner + 'static) -> Self {
        Self {
            backend: Backend::Streaming(Box::new(runner)),
        }
    }

    /// Generate a random 128-hex-character file key.
    pub fn generate_key() -> Result<String, CryptoError> {
        random::hex(FILE_KEY_LEN)
    }

    /// Encrypt `input` into `output`.
    ///
    /// The result is staged beside `output` and moved into place only on
    /// success; a failed run leaves any existing `output` untouched.
    pub fn encrypt_file(&self, input: &Path, output: &Path, key: &str) -> Result<(), CryptoError> {
        let key = FileKey::parse(key)?;
        info!(input = %input.display(), output = %output.display(), "encrypting file");
        let mut staged = staging_file(output)?;
        match &self.backend {
            Backend::InMemory(encryptor) => {
                let plaintext = fs::read(input)?;
                let envelope = encryptor.seal(&plaintext, &key.hex, None)?;
                staged.as_file_mut().write_all(&envelope)?;
                staged.as_file_mut().flush()?;
            }
            Backend::Streaming(runner) => {
                encrypt_streaming(runner.as_ref(), input, staged.path(), &key)?;
            }
        }
        commit(staged, output)
    }

    /// Decrypt `input` into `output`.
    ///
    /// The size and the HMAC are checked before any plaintext is written, and
    /// `output` only appears once decryption has finished.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::MalformedEnvelope`] if the size cannot be a valid encrypted file.
    /// - [`CryptoError::AuthenticationFailure`] if the HMAC does not match.
    pub fn decrypt_file(&self, input: &Path, output: &Path, key: &str) -> Result<(), CryptoError> {
        let key = FileKey::parse(key)?;
        info!(input = %input.display(), output = %output.display(), "decrypting file");
        let size = fs::metadata(input)?.len();
        check_encrypted_len(size)?;

        let mut staged = staging_file(output)?;
        match &self.backend {
            Backend::InMemory(encryptor) => {
                let envelope = fs::read(input)?;
                let plaintext = encryptor.open(&envelope, &key.hex, None)?;
                staged.as_file_mut().write_all(&plaintext)?;
                staged.as_file_mut().flush()?;
            }
            Backend::Streaming(runner) => {
                decrypt_streaming(runner.as_ref(), input, output, staged.path(), &key, size)?;
            }
        }
        commit(staged, output)
    }
}

impl std::fmt::Debug for FileEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::InMemory(_) => "in-memory",
            Backend::Streaming(_) => "streaming",
        };
        f.debug_struct("FileEncryptor").field("backend", &backend).finish()
    }
}

/// Engine settings shared by every strategy.
pub fn file_config() -> CipherConfig {
    CipherConfig::default()
        .with_encryption_algorithm(EncryptionAlgorithm::new(KeySize::Aes256, CipherMode::Cbc))
        .with_hashing_algorithm(HashAlgorithm::Sha256)
        .with_encrypt_then_authenticate(true)
        .with_data_format(DataFormat::StringOnly)
        .with_exception_on_error(true)
}

/// Reject sizes that no plaintext could produce.
///
/// Valid sizes are `16k + 16 + 32` for `k >= 1`.
pub fn check_encrypted_len(size: u64) -> Result<(), CryptoError> {
    let overhead = (FILE_IV_LEN + FILE_MAC_LEN) as u64;
    let min = overhead + BLOCK_LEN as u64;
    if size < min || (size - overhead) % BLOCK_LEN as u64 != 0 {
        return Err(CryptoError::MalformedEnvelope(format!(
            "encrypted file size {size} is not a valid AES-256-CBC + HMAC-SHA256 layout"
        )));
    }
    Ok(())
}

/// Hex key split into its encryption and MAC halves.
struct FileKey {
    hex: String,
    enc_hex: String,
    mac_hex: String,
}

impl FileKey {
    fn parse(key: &str) -> Result<Self, CryptoError> {
        decode_hex_key(key, FILE_KEY_LEN)?;
        let (enc_hex, mac_hex) = key.split_at(key.len() / 2);
        Ok(Self {
            hex: key.to_string(),
            enc_hex: enc_hex.into(),
            mac_hex: mac_hex.into(),
        })
    }
}

fn encrypt_streaming(
    runner: &dyn ProcessRunner,
    input: &Path,
    output: &Path,
    key: &FileKey,
) -> Result<(), CryptoError> {
    let iv = random::bytes(FILE_IV_LEN)?;
    runner.run(&FileCommand::Encrypt {
        input: input.into(),
        output: output.into(),
        key_hex: key.enc_hex.clone(),
        iv_hex: hex::encode(&iv),
    })?;

    OpenOptions::new().append(true).open(output)?.write_all(&iv)?;
    let mac = run_hmac(runner, output, key)?;
    OpenOptions::new().append(true).open(output)?.write_all(&mac)?;
    debug!(output = %output.display(), "file sealed");
    Ok(())
}

fn decrypt_streaming(
    runner: &dyn ProcessRunner,
    input: &Path,
    output: &Path,
    staged: &Path,
    key: &FileKey,
    size: u64,
) -> Result<(), CryptoError> {
    let body_len = size - FILE_MAC_LEN as u64;
    let mut source = File::open(input)?;

    let mut stored_mac = [0u8; FILE_MAC_LEN];
    source.seek(SeekFrom::Start(body_len))?;
    source.read_exact(&mut stored_mac)?;

    // Ciphertext plus IV goes to a scratch file beside the output.
    let mut body = staging_file(output)?;
    source.seek(SeekFrom::Start(0))?;
    io::copy(&mut (&mut source).take(body_len), body.as_file_mut())?;
    body.as_file_mut().flush()?;

    let computed = run_hmac(runner, body.path(), key)?;
    if !cipher::macs_match(&computed, &stored_mac)? {
        warn!(input = %input.display(), "file hmac mismatch");
        return Err(CryptoError::AuthenticationFailure);
    }

    let mut iv = [0u8; FILE_IV_LEN];
    let ciphertext_len = body_len - FILE_IV_LEN as u64;
    let file = body.as_file_mut();
    file.seek(SeekFrom::Start(ciphertext_len))?;
    file.read_exact(&mut iv)?;
    file.set_len(ciphertext_len)?;

    runner.run(&FileCommand::Decrypt {
        input: body.path().into(),
        output: staged.into(),
        key_hex: key.enc_hex.clone(),
        iv_hex: hex::encode(iv),
    })?;
    debug!(output = %output.display(), "file opened");
    Ok(())
}

/// Run the MAC command and parse its single `<hex> *<path>` line.
fn run_hmac(
    runner: &dyn ProcessRunner,
    path: &Path,
    key: &FileKey,
) -> Result<Vec<u8>, CryptoError> {
    let command = FileCommand::Hmac {
        path: path.into(),
        key_hex: key.mac_hex.clone(),
    };
    let stdout = runner.run(&command)?;
    let unexpected = |output: &str| CryptoError::CommandExecution {
        command: command.describe(),
        status: Some(0),
        output: output.to_string(),
    };

    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() != 1 {
        return Err(unexpected(&format!("expected 1 output line, got {}", lines.len())));
    }
    let digest = lines[0].split_whitespace().next().unwrap_or_default();
    match hex::decode(digest) {
        Ok(mac) if mac.len() == FILE_MAC_LEN => Ok(mac),
        _ => Err(unexpected(lines[0])),
    }
}

/// Temporary file in the directory of `output`, removed on drop.
fn staging_file(output: &Path) -> Result<NamedTempFile, CryptoError> {
    let dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    Ok(NamedTempFile::new_in(dir)?)
}

/// Move a finished staging file over `output`.
fn commit(staged: NamedTempFile, output: &Path) -> Result<(), CryptoError> {
    staged.persist(output).map_err(|e| CryptoError::Io(e.error))?;
    Ok(())
}
