//! Whole-file encryption.
//!
//! Files always use AES-256-CBC with HMAC-SHA256 over `ciphertext || IV`,
//! keyed by a 128-hex-character key (encryption half first). Decryption checks
//! the size, then the HMAC, and only then writes plaintext.

pub mod engine;
pub mod runner;

pub use engine::{check_encrypted_len, FileEncryptor, FileStrategy};
pub use runner::{FileCommand, NativeRunner, OpensslRunner, ProcessRunner};

/// Raw key length: 32 bytes for AES-256 followed by 32 bytes for HMAC-SHA256.
pub const FILE_KEY_LEN: usize = 64;

pub const FILE_IV_LEN: usize = 16;

pub const FILE_MAC_LEN: usize = 32;
