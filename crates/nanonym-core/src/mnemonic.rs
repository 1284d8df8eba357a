//! BIP-39 mnemonic backup of the wallet seed.
//!
//! Only 24-word phrases are accepted; their 32 bytes of entropy are used
//! directly as the ledger seed.

use bip39::{Language, Mnemonic};
use zeroize::Zeroize;

use crate::error::KeyError;
use crate::keys::Seed;

const SEED_ENTROPY_LEN: usize = 32;

/// Convert a 32-byte seed to its 24-word phrase.
pub fn seed_to_mnemonic(seed: &Seed) -> Result<String, KeyError> {
    if seed.as_bytes().len() != SEED_ENTROPY_LEN {
        return Err(KeyError::InvalidMnemonic(
            "only 32-byte seeds have a phrase".into(),
        ));
    }
    let m = Mnemonic::from_entropy_in(Language::English, seed.as_bytes())
        .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
    Ok(m.to_string())
}

/// Parse a phrase back into the seed. Whitespace and case are normalized.
pub fn mnemonic_to_seed(phrase: &str) -> Result<Seed, KeyError> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let m = Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
    let mut entropy = m.to_entropy();
    if entropy.len() != SEED_ENTROPY_LEN {
        let len = entropy.len();
        entropy.zeroize();
        return Err(KeyError::InvalidMnemonic(format!(
            "expected 24 words ({SEED_ENTROPY_LEN} bytes of entropy), got {len} bytes"
        )));
    }
    let seed = Seed::from_bytes(&entropy);
    entropy.zeroize();
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_generated_seed() {
        let seed = Seed::generate();
        let phrase = seed_to_mnemonic(&seed).unwrap();
        assert_eq!(mnemonic_to_seed(&phrase).unwrap().as_bytes(), seed.as_bytes());
    }

    #[test]
    fn all_zero_seed_vector() {
        // BIP-39 reference vector for 32 zero bytes.
        let seed = Seed::from_bytes(&[0u8; 32]).unwrap();
        let phrase = seed_to_mnemonic(&seed).unwrap();
        let expected = format!("{} art", vec!["abandon"; 23].join(" "));
        assert_eq!(phrase, expected);
    }

    #[test]
    fn phrase_has_24_words() {
        let seed = Seed::from_bytes(&[0xab; 32]).unwrap();
        assert_eq!(seed_to_mnemonic(&seed).unwrap().split_whitespace().count(), 24);
    }

    #[test]
    fn wide_seed_has_no_phrase() {
        let seed = Seed::from_bytes(&[1u8; 64]).unwrap();
        assert!(matches!(seed_to_mnemonic(&seed), Err(KeyError::InvalidMnemonic(_))));
    }

    #[test]
    fn messy_whitespace_and_case() {
        let seed = Seed::from_bytes(&[0x55; 32]).unwrap();
        let phrase = seed_to_mnemonic(&seed).unwrap().to_uppercase();
        let messy = phrase.split_whitespace().collect::<Vec<_>>().join(" \t ");
        assert_eq!(mnemonic_to_seed(&messy).unwrap().as_bytes(), seed.as_bytes());
    }

    #[test]
    fn rejects_unknown_word() {
        let err = mnemonic_to_seed("abandon abandon abandon notaword").unwrap_err();
        assert!(err.to_string().contains("invalid mnemonic"));
    }

    #[test]
    fn rejects_bad_checksum() {
        let phrase = format!("{} zoo", vec!["abandon"; 23].join(" "));
        assert!(mnemonic_to_seed(&phrase).is_err());
    }

    #[test]
    fn rejects_twelve_words() {
        // Valid 12-word phrase, but only 16 bytes of entropy.
        let phrase = format!("{} about", vec!["abandon"; 11].join(" "));
        assert!(matches!(mnemonic_to_seed(&phrase), Err(KeyError::InvalidMnemonic(_))));
    }
}
