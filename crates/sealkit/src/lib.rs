//! `sealkit`: symmetric encryption, signing and file encryption for
//! application values.
//!
//! - [`Encryptor`] turns a [`Value`] into a self-describing envelope and back,
//!   using AES in CBC, CTR, GCM or GCM-SIV mode with encrypt-then-MAC or AEAD.
//! - [`Signer`] produces readable, tamper-evident strings with optional expiry.
//! - [`FileEncryptor`] encrypts files in memory or by streaming.
//!
//! Value-level `decrypt`/`verify` return `Ok(None)` for rejected input unless
//! [`CipherConfig::exception_on_error`] is set. Key and configuration errors
//! always surface as `Err`.

pub mod base64url;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod file;
pub mod random;
pub mod signing;

pub use common::{CryptoError, Value};
pub use config::{
    CipherConfig, CipherMode, DataFormat, EncryptionAlgorithm, HashAlgorithm, KeySize, KeyType,
    ReturnFormat,
};
pub use crypto::Encryptor;
pub use file::{FileEncryptor, FileStrategy};
pub use signing::{Expiry, Signer};
