//! NanoNym address encoding.
//!
//! A NanoNym address publishes a pseudonym's three public keys:
//!
//! ```text
//! version (1) || spend (32) || view (32) || notify (32) || checksum (2)
//! ```
//!
//! The checksum is the first two bytes of a 5-byte Blake2b digest over the
//! preceding 97 bytes. The 99-byte payload is written in the ledger's base32
//! alphabet behind the `nnym_` prefix, giving a 164-character string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::base32;
use crate::constants::{
    NANONYM_CHECKSUM_INPUT_LEN, NANONYM_PAYLOAD_LEN, NANONYM_PREFIX, NANONYM_VERSION,
};
use crate::error::AddressError;
use crate::hash::blake2b_40;
use crate::keys::{KeyTriple, PublicKeys};

/// A decoded NanoNym address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NanoNymAddress {
    version: u8,
    keys: PublicKeys,
}

impl NanoNymAddress {
    /// Create an address for the given public keys at the current version.
    pub fn new(spend: [u8; 32], view: [u8; 32], notify: [u8; 32]) -> Self {
        Self {
            version: NANONYM_VERSION,
            keys: PublicKeys {
                spend,
                view,
                notify,
            },
        }
    }

    /// Create the address published for a key triple.
    pub fn from_keys(keys: &KeyTriple) -> Self {
        let public = keys.public_keys();
        Self::new(public.spend, public.view, public.notify)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn spend_public(&self) -> [u8; 32] {
        self.keys.spend
    }

    pub fn view_public(&self) -> [u8; 32] {
        self.keys.view
    }

    pub fn notify_public(&self) -> [u8; 32] {
        self.keys.notify
    }

    pub fn public_keys(&self) -> PublicKeys {
        self.keys
    }

    /// The raw 99-byte payload including checksum.
    pub fn to_payload(&self) -> [u8; NANONYM_PAYLOAD_LEN] {
        let mut payload = [0u8; NANONYM_PAYLOAD_LEN];
        payload[0] = self.version;
        payload[1..33].copy_from_slice(&self.keys.spend);
        payload[33..65].copy_from_slice(&self.keys.view);
        payload[65..97].copy_from_slice(&self.keys.notify);
        let checksum = checksum(&payload[..NANONYM_CHECKSUM_INPUT_LEN]);
        payload[NANONYM_CHECKSUM_INPUT_LEN..].copy_from_slice(&checksum);
        payload
    }

    /// Parse and verify a raw 99-byte payload.
    ///
    /// The checksum is checked before the version, so a corrupted version
    /// byte reports [`AddressError::ChecksumMismatch`].
    pub fn from_payload(payload: &[u8]) -> Result<Self, AddressError> {
        if payload.len() != NANONYM_PAYLOAD_LEN {
            return Err(AddressError::InvalidLength);
        }
        let (body, sum) = payload.split_at(NANONYM_CHECKSUM_INPUT_LEN);
        if checksum(body) != sum {
            return Err(AddressError::ChecksumMismatch);
        }
        if body[0] != NANONYM_VERSION {
            return Err(AddressError::UnsupportedVersion(body[0]));
        }

        let key = |range: std::ops::Range<usize>| {
            let mut out = [0u8; 32];
            out.copy_from_slice(&body[range]);
            out
        };
        Ok(Self {
            version: body[0],
            keys: PublicKeys {
                spend: key(1..33),
                view: key(33..65),
                notify: key(65..97),
            },
        })
    }

    /// Encode as an `nnym_` string.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(
            NANONYM_PREFIX.len() + base32::encoded_len(NANONYM_PAYLOAD_LEN),
        );
        out.push_str(NANONYM_PREFIX);
        out.push_str(&base32::encode(&self.to_payload()));
        out
    }

    /// Decode an `nnym_` string.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let body = s
            .strip_prefix(NANONYM_PREFIX)
            .ok_or(AddressError::InvalidPrefix)?;
        if body.len() != base32::encoded_len(NANONYM_PAYLOAD_LEN) {
            return Err(AddressError::InvalidLength);
        }
        let payload = base32::decode(body)?;
        Self::from_payload(&payload)
    }
}

fn checksum(body: &[u8]) -> [u8; 2] {
    let digest = blake2b_40(body);
    [digest[0], digest[1]]
}

/// Encode three public keys as an `nnym_` address.
pub fn encode(spend: &[u8; 32], view: &[u8; 32], notify: &[u8; 32]) -> String {
    NanoNymAddress::new(*spend, *view, *notify).encode()
}

/// Decode an `nnym_` address.
pub fn decode(s: &str) -> Result<NanoNymAddress, AddressError> {
    NanoNymAddress::decode(s)
}

/// Whether `s` looks like a NanoNym address rather than a ledger account.
pub fn is_nanonym(s: &str) -> bool {
    s.starts_with(NANONYM_PREFIX)
}

impl fmt::Display for NanoNymAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for NanoNymAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for NanoNymAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for NanoNymAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{derive, Seed};
    use proptest::prelude::*;

    fn sample() -> NanoNymAddress {
        NanoNymAddress::new([0x11; 32], [0x22; 32], [0x33; 32])
    }

    // --- Encoding ---

    #[test]
    fn encode_starts_with_prefix() {
        assert!(sample().encode().starts_with("nnym_"));
    }

    #[test]
    fn encode_length() {
        // "nnym_" (5) + 159 base32 symbols
        assert_eq!(sample().encode().len(), 164);
    }

    #[test]
    fn encode_is_deterministic() {
        assert_eq!(sample().encode(), sample().encode());
    }

    #[test]
    fn payload_layout() {
        let payload = sample().to_payload();
        assert_eq!(payload[0], 1);
        assert_eq!(&payload[1..33], &[0x11; 32]);
        assert_eq!(&payload[33..65], &[0x22; 32]);
        assert_eq!(&payload[65..97], &[0x33; 32]);
        let digest = blake2b_40(&payload[..97]);
        assert_eq!(&payload[97..], &digest[..2]);
    }

    #[test]
    fn free_functions_match_methods() {
        let s = encode(&[0x11; 32], &[0x22; 32], &[0x33; 32]);
        assert_eq!(s, sample().encode());
        assert_eq!(decode(&s).unwrap(), sample());
    }

    // --- Decoding ---

    #[test]
    fn decode_roundtrip() {
        let decoded = NanoNymAddress::decode(&sample().encode()).unwrap();
        assert_eq!(decoded.version(), 1);
        assert_eq!(decoded.spend_public(), [0x11; 32]);
        assert_eq!(decoded.view_public(), [0x22; 32]);
        assert_eq!(decoded.notify_public(), [0x33; 32]);
    }

    #[test]
    fn decode_missing_prefix() {
        let encoded = sample().encode();
        assert_eq!(
            NanoNymAddress::decode(&encoded[5..]).unwrap_err(),
            AddressError::InvalidPrefix
        );
        let swapped = encoded.replacen("nnym_", "nano_", 1);
        assert_eq!(
            NanoNymAddress::decode(&swapped).unwrap_err(),
            AddressError::InvalidPrefix
        );
    }

    #[test]
    fn decode_wrong_length() {
        let encoded = sample().encode();
        assert_eq!(
            NanoNymAddress::decode(&encoded[..encoded.len() - 1]).unwrap_err(),
            AddressError::InvalidLength
        );
        assert_eq!(
            NanoNymAddress::from_payload(&[1u8; 98]).unwrap_err(),
            AddressError::InvalidLength
        );
    }

    #[test]
    fn decode_unsupported_version_with_valid_checksum() {
        let mut payload = sample().to_payload();
        payload[0] = 2;
        let sum = checksum(&payload[..97]);
        payload[97..].copy_from_slice(&sum);
        let s = format!("nnym_{}", base32::encode(&payload));
        assert_eq!(
            NanoNymAddress::decode(&s).unwrap_err(),
            AddressError::UnsupportedVersion(2)
        );
    }

    #[test]
    fn decode_invalid_character() {
        let mut encoded = sample().encode();
        encoded.replace_range(20..21, "0");
        assert_eq!(
            NanoNymAddress::decode(&encoded).unwrap_err(),
            AddressError::InvalidCharacter('0')
        );
    }

    #[test]
    fn single_bit_flips_fail_checksum() {
        let payload = sample().to_payload();
        for (byte, bit) in [(0, 0), (1, 7), (16, 3), (32, 0), (40, 5), (64, 1), (70, 6), (96, 2), (97, 4), (98, 0)] {
            let mut corrupted = payload;
            corrupted[byte] ^= 1 << bit;
            assert_eq!(
                NanoNymAddress::from_payload(&corrupted).unwrap_err(),
                AddressError::ChecksumMismatch,
                "flip byte {byte} bit {bit}"
            );
        }
    }

    #[test]
    fn from_keys_uses_public_halves() {
        let triple = derive(&Seed::from_bytes(&[4u8; 32]).unwrap(), 0).unwrap();
        let addr = NanoNymAddress::from_keys(&triple);
        assert_eq!(addr.public_keys(), triple.public_keys());
    }

    #[test]
    fn is_nanonym_helper() {
        assert!(is_nanonym(&sample().encode()));
        assert!(!is_nanonym("nano_3t6k35gi95xu6tergt6p69ck76ogmitsa8mnijtpxm9fkcm736xtoncuohr3"));
    }

    // --- Display / FromStr / serde ---

    #[test]
    fn display_and_from_str() {
        let addr = sample();
        let parsed: NanoNymAddress = format!("{addr}").parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn serde_json_as_string() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.starts_with("\"nnym_"));
        let back: NanoNymAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }

    proptest! {
        #[test]
        fn roundtrip_any_keys(
            spend in any::<[u8; 32]>(),
            view in any::<[u8; 32]>(),
            notify in any::<[u8; 32]>(),
        ) {
            let decoded = decode(&encode(&spend, &view, &notify)).unwrap();
            prop_assert_eq!(decoded.version(), 1);
            prop_assert_eq!(decoded.spend_public(), spend);
            prop_assert_eq!(decoded.view_public(), view);
            prop_assert_eq!(decoded.notify_public(), notify);
        }
    }
}
