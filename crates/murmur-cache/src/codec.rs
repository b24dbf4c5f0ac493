//! Hex codec for identifiers crossing the persistence boundary.

/// Lowercase, two digits per byte, no separators.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(bytes)
}

/// Inverse of [`encode`] for even-length input.
pub fn decode(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_lowercase_zero_padded() {
        assert_eq!(encode([0x00, 0x0f, 0xa0, 0xff]), "000fa0ff");
        assert_eq!(encode([0u8; 0]), "");
    }

    #[test]
    fn decode_rejects_odd_length() {
        assert!(decode("abc").is_err());
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
        }
    }
}
