//! Blake2b helpers at the output sizes the ledger uses.

use blake2::digest::consts::{U5, U32};
use blake2::{Blake2b, Blake2b512, Digest};

/// Blake2b-256 over the concatenation of `parts`.
pub fn blake2b_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Blake2b-512 of `data`.
pub fn blake2b_512(data: &[u8]) -> [u8; 64] {
    let digest = Blake2b512::digest(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// Blake2b with a 5-byte output, used for address checksums.
pub fn blake2b_40(data: &[u8]) -> [u8; 5] {
    Blake2b::<U5>::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_sizes() {
        assert_eq!(blake2b_256(&[b"x"]).len(), 32);
        assert_eq!(blake2b_512(b"x").len(), 64);
        assert_eq!(blake2b_40(b"x").len(), 5);
    }

    #[test]
    fn parts_are_concatenated() {
        assert_eq!(blake2b_256(&[b"ab", b"c"]), blake2b_256(&[b"abc"]));
    }

    #[test]
    fn truncated_outputs_are_not_prefixes() {
        // Blake2b binds the output length into its parameter block.
        let full = blake2b_512(b"nanonym");
        let short = blake2b_256(&[b"nanonym"]);
        assert_ne!(&full[..32], &short[..]);
    }
}
