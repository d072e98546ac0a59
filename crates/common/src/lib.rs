//! Shared value and error types for the `sealkit` workspace.

pub mod error;
pub mod value;

pub use error::CryptoError;
pub use value::Value;
