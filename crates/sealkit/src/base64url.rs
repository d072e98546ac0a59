//! URL-safe base64 without padding.
//!
//! Encoding never emits `=`. Decoding accepts input with or without trailing
//! padding but is otherwise strict: any byte outside the URL-safe alphabet is
//! a [`CryptoError::MalformedEnvelope`], never a partial result.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use common::CryptoError;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_LENIENT.encode(data)
}

/// Decode a base64url string.
///
/// # Errors
///
/// Returns [`CryptoError::MalformedEnvelope`] on any invalid character or length.
pub fn decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_LENIENT
        .decode(input)
        .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid base64url: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_url_safe_alphabet_without_padding() {
        // 0xfb 0xff encodes to "+/8=" in standard base64.
        assert_eq!(encode([0xfb, 0xff]), "-_8");
        assert_eq!(decode("-_8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn tolerates_padding() {
        assert_eq!(decode("-_8=").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn rejects_standard_alphabet() {
        assert!(decode("+/8").is_err());
    }

    #[test]
    fn rejects_garbage() {
        let err = decode("ab$d").unwrap_err();
        assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
    }

    #[test]
    fn empty_round_trip() {
        assert_eq!(encode(b""), "");
        assert!(decode("").unwrap().is_empty());
    }
}
