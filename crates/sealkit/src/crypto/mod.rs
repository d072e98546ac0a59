//! Symmetric encryption: raw primitives, key derivation and the envelope engine.
//!
//! # Envelope format
//!
//! ```text
//! ciphertext || IV || [tag-or-HMAC]
//! ```
//!
//! encoded as base64, base64url, hex or left as raw bytes.

pub mod cipher;
pub mod engine;
pub mod kdf;

pub use engine::Encryptor;
pub use kdf::{decode_hex_key, derive_keys, KeyMaterial};
