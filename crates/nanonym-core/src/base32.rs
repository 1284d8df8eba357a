//! Base32 with the ledger's 32-symbol alphabet.
//!
//! Unlike RFC 4648, the bit string is padded with zero bits at the *front*
//! so that its length is a multiple of five. A 32-byte key therefore
//! encodes to 52 symbols and the 99-byte NanoNym payload to 159.

use crate::error::AddressError;

/// Ledger base32 alphabet. Omits `0`, `2`, `l` and `v`.
pub const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

/// Number of symbols needed to encode `byte_len` bytes.
pub fn encoded_len(byte_len: usize) -> usize {
    (byte_len * 8).div_ceil(5)
}

/// Encode bytes, left-padding the bit string to a multiple of 5 bits.
pub fn encode(data: &[u8]) -> String {
    let total_bits = data.len() * 8;
    let pad = (5 - total_bits % 5) % 5;
    let mut out = String::with_capacity(encoded_len(data.len()));

    let mut acc: u32 = 0;
    let mut bits: u32 = pad as u32;
    for &byte in data {
        acc = (acc << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((acc >> bits) & 31) as usize] as char);
        }
        acc &= (1 << bits) - 1;
    }
    out
}

/// Decode a base32 string produced by [`encode`].
///
/// The leading pad bits must be zero. Returns the decoded bytes; callers
/// check the length they expect.
pub fn decode(s: &str) -> Result<Vec<u8>, AddressError> {
    let total_bits = s.len() * 5;
    let pad = total_bits % 8;
    let mut out = Vec::with_capacity(total_bits / 8);

    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut skip = pad as u32;
    for c in s.chars() {
        let value = symbol_value(c)?;
        acc = (acc << 5) | value;
        bits += 5;
        if skip > 0 && bits >= skip {
            if acc >> (bits - skip) != 0 {
                return Err(AddressError::InvalidPadding);
            }
            bits -= skip;
            skip = 0;
            acc &= (1 << bits) - 1;
        }
        if skip == 0 && bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Ok(out)
}

fn symbol_value(c: char) -> Result<u32, AddressError> {
    ALPHABET
        .iter()
        .position(|&sym| sym as char == c)
        .map(|p| p as u32)
        .ok_or(AddressError::InvalidCharacter(c))
}
