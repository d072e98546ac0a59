//! Cryptographically secure random bytes from the operating system.
//!
//! There is deliberately no fallback generator: if the OS cannot provide
//! entropy the call fails with [`CryptoError::Entropy`] and callers must abort
//! the operation.

use common::CryptoError;
use rand::{rngs::OsRng, RngCore};

/// Return `n` bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::Entropy`] if the OS entropy source fails.
pub fn bytes(n: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; n];
    fill(&mut buf)?;
    Ok(buf)
}

/// Fill `buf` from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::Entropy`] if the OS entropy source fails.
pub fn fill(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::Entropy(e.to_string()))
}

/// Return `n` random bytes as lowercase hex (`2 * n` characters).
pub fn hex(n: usize) -> Result<String, CryptoError> {
    bytes(n).map(hex::encode)
}
