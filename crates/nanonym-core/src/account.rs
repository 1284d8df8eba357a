//! Ledger account addresses (`nano_...`).
//!
//! An account address is the ledger's canonical encoding of an Ed25519
//! public key:
//!
//! ```text
//! nano_ || base32(4 zero bits || pubkey)  (52 symbols)
//!       || base32(reverse(blake2b-40(pubkey)))  (8 symbols)
//! ```
//!
//! Stealth accounts and pseudonym fallback addresses both use this form.

use crate::base32;
use crate::constants::{ACCOUNT_PREFIX, LEGACY_ACCOUNT_PREFIX};
use crate::error::AddressError;
use crate::hash::blake2b_40;

const KEY_SYMBOLS: usize = 52;
const CHECKSUM_SYMBOLS: usize = 8;

/// Encode a 32-byte public key as a `nano_` account address.
pub fn encode_account(public_key: &[u8; 32]) -> String {
    let mut checksum = blake2b_40(public_key);
    checksum.reverse();

    let mut out = String::with_capacity(ACCOUNT_PREFIX.len() + KEY_SYMBOLS + CHECKSUM_SYMBOLS);
    out.push_str(ACCOUNT_PREFIX);
    out.push_str(&base32::encode(public_key));
    out.push_str(&base32::encode(&checksum));
    out
}

/// Decode a `nano_` (or legacy `xrb_`) account address to its public key.
pub fn decode_account(address: &str) -> Result<[u8; 32], AddressError> {
    let body = address
        .strip_prefix(ACCOUNT_PREFIX)
        .or_else(|| address.strip_prefix(LEGACY_ACCOUNT_PREFIX))
        .ok_or(AddressError::InvalidPrefix)?;

    if body.len() != KEY_SYMBOLS + CHECKSUM_SYMBOLS {
        return Err(AddressError::InvalidLength);
    }

    let key_bytes = base32::decode(&body[..KEY_SYMBOLS])?;
    let mut checksum = base32::decode(&body[KEY_SYMBOLS..])?;
    let public_key: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| AddressError::InvalidLength)?;

    checksum.reverse();
    if checksum != blake2b_40(&public_key) {
        return Err(AddressError::ChecksumMismatch);
    }
    Ok(public_key)
}

/// Whether `address` is a well-formed account address with a valid checksum.
pub fn is_valid_account(address: &str) -> bool {
    decode_account(address).is_ok()
}
