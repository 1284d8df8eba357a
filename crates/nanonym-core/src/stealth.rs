//! Stealth address cryptography.
//!
//! A sender who knows a pseudonym's public spend and view keys picks an
//! ephemeral key pair `(r, R)` and computes:
//!
//! ```text
//! ss = X25519(r, view_pub)            (receiver: X25519(view_priv, R))
//! t  = Blake2b-256(ss || R || spend_pub) mod L
//! P  = spend_pub + t·B                (receiver: p = spend_scalar + t)
//! ```
//!
//! `P` is a fresh ledger account only the receiver can spend from. Every
//! point read from the outside is checked for canonical encoding and for
//! small order before it touches any arithmetic.

use blake2::Blake2b512;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::hazmat::{raw_sign, raw_verify, ExpandedSecretKey};
use ed25519_dalek::{Signature, VerifyingKey};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::account::encode_account;
use crate::address::NanoNymAddress;
use crate::error::CryptoError;
use crate::hash::blake2b_256;
use crate::keys::{expand_private, Ed25519KeyPair, KeyTriple};

/// Domain tag for the deterministic signing nonce of one-time keys.
const NONCE_DOMAIN: &[u8] = b"nanonym/stealth-nonce";

/// Decompress an Edwards point, rejecting non-canonical and small-order inputs.
pub fn decompress_point(bytes: &[u8; 32]) -> Result<EdwardsPoint, CryptoError> {
    let compressed = CompressedEdwardsY(*bytes);
    let point = compressed.decompress().ok_or(CryptoError::InvalidPoint)?;
    if point.compress() != compressed || point.is_small_order() {
        return Err(CryptoError::InvalidPoint);
    }
    Ok(point)
}

/// Parse a 32-byte hex string into key bytes.
pub fn parse_key_hex(s: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidHex("expected 32 bytes".into()))
}

/// A fresh random ephemeral key pair for one payment.
pub fn generate_ephemeral() -> Ed25519KeyPair {
    Ed25519KeyPair::generate()
}

/// X25519 shared secret between a local Ed25519 private key and a peer's
/// Ed25519 public key.
///
/// The private key is expanded with Blake2b-512 and clamped; the peer point
/// is mapped to its Montgomery form.
pub fn shared_secret(my_private: &[u8; 32], their_public: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let point = decompress_point(their_public)?;
    let mut scalar = expand_private(my_private);
    let secret = point.to_montgomery().mul_clamped(scalar).to_bytes();
    scalar.zeroize();
    if secret == [0u8; 32] {
        return Err(CryptoError::InvalidPoint);
    }
    Ok(secret)
}

fn tweak(shared_secret: &[u8; 32], ephemeral_public: &[u8; 32], spend_public: &[u8; 32]) -> Scalar {
    Scalar::from_bytes_mod_order(blake2b_256(&[shared_secret, ephemeral_public, spend_public]))
}

/// A derived one-time public key and its ledger account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StealthPublicKey {
    pub public_key: [u8; 32],
    pub address: String,
}

/// Compute `P = spend_pub + t·B` for a payment.
pub fn derive_stealth_public_key(
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; 32],
    spend_public: &[u8; 32],
) -> Result<StealthPublicKey, CryptoError> {
    decompress_point(ephemeral_public)?;
    let spend = decompress_point(spend_public)?;
    let t = tweak(shared_secret, ephemeral_public, spend_public);
    let public_key = (spend + EdwardsPoint::mul_base(&t)).compress().to_bytes();
    Ok(StealthPublicKey {
        address: encode_account(&public_key),
        public_key,
    })
}

/// Compute `p = spend_scalar + t mod L`.
///
/// `spend_scalar` must be the canonical encoding of the spend key's scalar
/// (see [`Ed25519KeyPair::scalar`]).
pub fn derive_stealth_private_key(
    spend_scalar: &[u8; 32],
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; 32],
    spend_public: &[u8; 32],
) -> Result<[u8; 32], CryptoError> {
    let spend = Option::<Scalar>::from(Scalar::from_canonical_bytes(*spend_scalar))
        .ok_or(CryptoError::InvalidScalar)?;
    decompress_point(ephemeral_public)?;
    decompress_point(spend_public)?;
    let t = tweak(shared_secret, ephemeral_public, spend_public);
    Ok((spend + t).to_bytes())
}

/// Receiver side: recover the one-time key pair for a payment to `keys`
/// announced with ephemeral key `ephemeral_public`.
pub fn recover(keys: &KeyTriple, ephemeral_public: &[u8; 32]) -> Result<StealthKeyPair, CryptoError> {
    let mut ss = shared_secret(keys.view.private_bytes(), ephemeral_public)?;
    let spend_public = keys.spend.public_key();
    let result = derive_stealth_public_key(&ss, ephemeral_public, &spend_public).and_then(|expected| {
        let mut spend_scalar = keys.spend.scalar().to_bytes();
        let private = derive_stealth_private_key(&spend_scalar, &ss, ephemeral_public, &spend_public);
        spend_scalar.zeroize();
        StealthKeyPair::from_scalar(private?, &expected.public_key)
    });
    ss.zeroize();
    result
}

/// One-time key pair controlling a stealth account.
///
/// The private half is a bare scalar rather than a seed, so signing uses
/// the expanded-key primitives with a nonce prefix derived from the scalar.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StealthKeyPair {
    scalar: [u8; 32],
    #[zeroize(skip)]
    public: [u8; 32],
}

impl StealthKeyPair {
    /// Build from a canonical scalar and check it matches `expected_public`.
    pub fn from_scalar(scalar: [u8; 32], expected_public: &[u8; 32]) -> Result<Self, CryptoError> {
        let kp = Self::from_scalar_unchecked(scalar)?;
        if &kp.public != expected_public {
            return Err(CryptoError::KeyMismatch);
        }
        Ok(kp)
    }

    /// Build from a canonical scalar, computing the public key.
    pub fn from_scalar_unchecked(scalar: [u8; 32]) -> Result<Self, CryptoError> {
        let s = Option::<Scalar>::from(Scalar::from_canonical_bytes(scalar))
            .ok_or(CryptoError::InvalidScalar)?;
        if s == Scalar::ZERO {
            return Err(CryptoError::InvalidScalar);
        }
        let public = EdwardsPoint::mul_base(&s).compress().to_bytes();
        Ok(Self { scalar, public })
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// The private scalar. Handle with care.
    pub fn private_bytes(&self) -> &[u8; 32] {
        &self.scalar
    }

    /// Ledger account address controlled by this key.
    pub fn account(&self) -> String {
        encode_account(&self.public)
    }

    fn expanded(&self) -> Result<(ExpandedSecretKey, VerifyingKey), CryptoError> {
        let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(self.scalar))
            .ok_or(CryptoError::InvalidScalar)?;
        let esk = ExpandedSecretKey {
            scalar,
            hash_prefix: blake2b_256(&[NONCE_DOMAIN, &self.scalar]),
        };
        let vk = VerifyingKey::from_bytes(&self.public).map_err(|_| CryptoError::InvalidPoint)?;
        Ok((esk, vk))
    }

    /// Sign `message` (Ed25519 with Blake2b-512 as the hash).
    pub fn sign(&self, message: &[u8]) -> Result<[u8; 64], CryptoError> {
        let (esk, vk) = self.expanded()?;
        Ok(raw_sign::<Blake2b512>(&esk, message, &vk).to_bytes())
    }
}

/// Verify a signature made by any ledger key (regular or stealth).
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> Result<(), CryptoError> {
    let vk = VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::InvalidPoint)?;
    let sig = Signature::from_bytes(signature);
    raw_verify::<Blake2b512>(&vk, message, &sig).map_err(|_| CryptoError::InvalidSignature)
}

impl fmt::Debug for StealthKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StealthKeyPair")
            .field("public", &hex::encode(self.public))
            .field("scalar", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for StealthKeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for StealthKeyPair {}

/// Sender side of one payment: the ephemeral key to announce and the
/// stealth account to pay.
#[derive(Debug)]
pub struct StealthPayment {
    pub ephemeral: Ed25519KeyPair,
    pub stealth: StealthPublicKey,
}

impl StealthPayment {
    /// Prepare a payment to `recipient` with a fresh ephemeral key.
    pub fn new(recipient: &NanoNymAddress) -> Result<Self, CryptoError> {
        Self::with_ephemeral(recipient, generate_ephemeral())
    }

    /// Prepare a payment with a caller-supplied ephemeral key.
    pub fn with_ephemeral(recipient: &NanoNymAddress, ephemeral: Ed25519KeyPair) -> Result<Self, CryptoError> {
        let ephemeral_public = ephemeral.public_key();
        let mut ss = shared_secret(ephemeral.private_bytes(), &recipient.view_public())?;
        let stealth = derive_stealth_public_key(&ss, &ephemeral_public, &recipient.spend_public());
        ss.zeroize();
        Ok(Self {
            ephemeral,
            stealth: stealth?,
        })
    }

    pub fn ephemeral_public(&self) -> [u8; 32] {
        self.ephemeral.public_key()
    }

    /// The `nano_` account the payer should send to.
    pub fn address(&self) -> &str {
        &self.stealth.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::decode_account;
    use crate::keys::{derive, Seed};
    use curve25519_dalek::constants::EIGHT_TORSION;

    fn recipient(tag: u8, index: u32) -> KeyTriple {
        derive(&Seed::from_bytes(&[tag; 32]).unwrap(), index).unwrap()
    }

    fn ephemeral(tag: u8) -> Ed25519KeyPair {
        Ed25519KeyPair::from_private([tag; 32])
    }

    // --- Shared secret ---

    #[test]
    fn shared_secret_agrees_both_sides() {
        let keys = recipient(1, 0);
        let r = ephemeral(9);
        let sender = shared_secret(r.private_bytes(), &keys.view.public_key()).unwrap();
        let receiver = shared_secret(keys.view.private_bytes(), &r.public_key()).unwrap();
        assert_eq!(sender, receiver);
    }

    #[test]
    fn shared_secret_differs_per_ephemeral() {
        let keys = recipient(1, 0);
        let a = shared_secret(ephemeral(2).private_bytes(), &keys.view.public_key()).unwrap();
        let b = shared_secret(ephemeral(3).private_bytes(), &keys.view.public_key()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn shared_secret_rejects_small_order() {
        let keys = recipient(1, 0);
        for point in EIGHT_TORSION.iter() {
            let bytes = point.compress().to_bytes();
            assert_eq!(
                shared_secret(keys.view.private_bytes(), &bytes).unwrap_err(),
                CryptoError::InvalidPoint
            );
        }
    }

    // --- Point validation ---

    #[test]
    fn decompress_rejects_off_curve() {
        // Roughly half of all y values have no matching x.
        let mut rejected = 0;
        for y in 2u8..64 {
            let mut bytes = [0u8; 32];
            bytes[0] = y;
            if CompressedEdwardsY(bytes).decompress().is_none() {
                assert_eq!(decompress_point(&bytes).unwrap_err(), CryptoError::InvalidPoint);
                rejected += 1;
            }
        }
        assert!(rejected > 0);
    }

    #[test]
    fn decompress_rejects_non_canonical() {
        // y = p + 1 encodes the same point as y = 1 (the identity).
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0xee;
        bytes[31] = 0x7f;
        assert_eq!(decompress_point(&bytes).unwrap_err(), CryptoError::InvalidPoint);
    }

    #[test]
    fn decompress_accepts_real_key() {
        let keys = recipient(5, 0);
        assert!(decompress_point(&keys.spend.public_key()).is_ok());
    }

    #[test]
    fn parse_key_hex_checks_length() {
        let keys = recipient(5, 0);
        let hex_key = hex::encode(keys.view.public_key());
        assert_eq!(parse_key_hex(&hex_key).unwrap(), keys.view.public_key());
        assert!(matches!(parse_key_hex("abcd"), Err(CryptoError::InvalidHex(_))));
        assert!(matches!(parse_key_hex("zz"), Err(CryptoError::InvalidHex(_))));
    }

    // --- Stealth derivation ---

    #[test]
    fn sender_and_receiver_agree() {
        for i in 0..8u8 {
            let keys = recipient(i, i as u32);
            let addr = NanoNymAddress::from_keys(&keys);
            let payment = StealthPayment::with_ephemeral(&addr, ephemeral(100 + i)).unwrap();

            let recovered = recover(&keys, &payment.ephemeral_public()).unwrap();
            assert_eq!(recovered.public_key(), payment.stealth.public_key);
            assert_eq!(recovered.account(), payment.address());
        }
    }

    #[test]
    fn private_key_controls_public_key() {
        let keys = recipient(7, 3);
        let r = ephemeral(8);
        let ss = shared_secret(keys.view.private_bytes(), &r.public_key()).unwrap();
        let public = derive_stealth_public_key(&ss, &r.public_key(), &keys.spend.public_key()).unwrap();
        let private = derive_stealth_private_key(
            &keys.spend.scalar().to_bytes(),
            &ss,
            &r.public_key(),
            &keys.spend.public_key(),
        )
        .unwrap();
        let s = Option::<Scalar>::from(Scalar::from_canonical_bytes(private)).unwrap();
        assert_eq!(EdwardsPoint::mul_base(&s).compress().to_bytes(), public.public_key);
    }

    #[test]
    fn stealth_address_is_ledger_encoding() {
        let keys = recipient(2, 0);
        let payment = StealthPayment::new(&NanoNymAddress::from_keys(&keys)).unwrap();
        assert_eq!(decode_account(payment.address()).unwrap(), payment.stealth.public_key);
    }

    #[test]
    fn unlinkable_across_payments() {
        let keys = recipient(3, 0);
        let addr = NanoNymAddress::from_keys(&keys);
        let a = StealthPayment::new(&addr).unwrap();
        let b = StealthPayment::new(&addr).unwrap();
        assert_ne!(a.address(), b.address());
        assert_ne!(a.address(), keys.spend.account());
    }

    #[test]
    fn wrong_view_key_finds_nothing() {
        let keys = recipient(4, 0);
        let other = recipient(4, 1);
        let payment = StealthPayment::new(&NanoNymAddress::from_keys(&keys)).unwrap();
        let ss = shared_secret(other.view.private_bytes(), &payment.ephemeral_public()).unwrap();
        let guess =
            derive_stealth_public_key(&ss, &payment.ephemeral_public(), &keys.spend.public_key()).unwrap();
        assert_ne!(guess, payment.stealth);
    }

    #[test]
    fn derive_rejects_bad_spend_key() {
        let r = ephemeral(1);
        // Compressed identity point.
        let mut bad = [0u8; 32];
        bad[0] = 1;
        assert_eq!(
            derive_stealth_public_key(&[1u8; 32], &r.public_key(), &bad).unwrap_err(),
            CryptoError::InvalidPoint
        );
    }

    #[test]
    fn derive_private_rejects_non_canonical_scalar() {
        let keys = recipient(1, 0);
        let r = ephemeral(1);
        assert_eq!(
            derive_stealth_private_key(&[0xff; 32], &[1u8; 32], &r.public_key(), &keys.spend.public_key())
                .unwrap_err(),
            CryptoError::InvalidScalar
        );
    }

    // --- One-time key pair ---

    #[test]
    fn from_scalar_detects_mismatch() {
        let kp = StealthKeyPair::from_scalar_unchecked(Scalar::from(42u64).to_bytes()).unwrap();
        let other = StealthKeyPair::from_scalar_unchecked(Scalar::from(43u64).to_bytes()).unwrap();
        assert_eq!(
            StealthKeyPair::from_scalar(*kp.private_bytes(), &other.public_key()).unwrap_err(),
            CryptoError::KeyMismatch
        );
        assert!(StealthKeyPair::from_scalar(*kp.private_bytes(), &kp.public_key()).is_ok());
    }

    #[test]
    fn from_scalar_rejects_zero() {
        assert_eq!(
            StealthKeyPair::from_scalar_unchecked([0u8; 32]).unwrap_err(),
            CryptoError::InvalidScalar
        );
    }

    #[test]
    fn stealth_signature_verifies() {
        let keys = recipient(6, 0);
        let payment = StealthPayment::new(&NanoNymAddress::from_keys(&keys)).unwrap();
        let kp = recover(&keys, &payment.ephemeral_public()).unwrap();

        let msg = b"block hash";
        let sig = kp.sign(msg).unwrap();
        assert!(verify(&payment.stealth.public_key, msg, &sig).is_ok());
        assert_eq!(
            verify(&payment.stealth.public_key, b"other", &sig).unwrap_err(),
            CryptoError::InvalidSignature
        );
    }

    #[test]
    fn signatures_are_deterministic() {
        let kp = StealthKeyPair::from_scalar_unchecked(Scalar::from(7u64).to_bytes()).unwrap();
        assert_eq!(kp.sign(b"m").unwrap(), kp.sign(b"m").unwrap());
    }

    #[test]
    fn debug_redacts_scalar() {
        let kp = StealthKeyPair::from_scalar_unchecked(Scalar::from(7u64).to_bytes()).unwrap();
        let dbg = format!("{kp:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains(&hex::encode(kp.private_bytes())));
    }
}
