//! Seed management and deterministic pseudonym key derivation.
//!
//! Every pseudonym owns three key pairs derived from the wallet seed along
//! the hardened path `44' / 165' / 1000' / index' / key_type`:
//!
//! - **spend** (Ed25519): controls funds on every stealth account
//! - **view** (Ed25519): computes the shared secret to discover payments
//! - **notify** (secp256k1): receives payment notifications off-chain
//!
//! Each path step is a fresh Blake2b-256 over `seed || state || segment`.
//! Ed25519 keys use the ledger's Blake2b variant: the 32-byte private key is
//! expanded with Blake2b-512 and the clamped lower half is the scalar.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::{clamp_integer, Scalar};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::account::encode_account;
use crate::constants::{HARDENED, PATH_COIN_TYPE, PATH_NANONYM, PATH_PURPOSE};
use crate::error::KeyError;
use crate::hash::{blake2b_256, blake2b_512};

/// Accepted seed lengths: a raw ledger seed or a BIP-39 PBKDF2 seed.
const SEED_LENGTHS: [usize; 2] = [32, 64];

/// Wallet master seed.
///
/// Secret material is zeroized on drop to prevent leaking key material
/// in freed memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: Vec<u8>,
}

impl Seed {
    /// Generate a random 32-byte seed from the OS cryptographic RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a seed from raw bytes (32 or 64 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if !SEED_LENGTHS.contains(&bytes.len()) {
            return Err(KeyError::InvalidSeed(format!(
                "expected 32 or 64 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Parse a hex-encoded seed (64 or 128 hex characters).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let mut bytes =
            hex::decode(s.trim()).map_err(|e| KeyError::InvalidSeed(e.to_string()))?;
        let seed = Self::from_bytes(&bytes);
        bytes.zeroize();
        seed
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
        }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Role of a key within a pseudonym's triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyType {
    Spend = 0,
    View = 1,
    Notify = 2,
}

/// Ed25519 key pair in the ledger's Blake2b variant.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Ed25519KeyPair {
    private: [u8; 32],
    #[zeroize(skip)]
    public: [u8; 32],
}

impl Ed25519KeyPair {
    /// Build the key pair for a 32-byte private key.
    pub fn from_private(private: [u8; 32]) -> Self {
        let public = EdwardsPoint::mul_base_clamped(expand_private(&private))
            .compress()
            .to_bytes();
        Self { private, public }
    }

    /// Generate a random key pair (used for ephemeral sender keys).
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut private = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut private);
        let kp = Self::from_private(private);
        private.zeroize();
        kp
    }

    /// The 32-byte private key. Handle with care.
    pub fn private_bytes(&self) -> &[u8; 32] {
        &self.private
    }

    /// The compressed Edwards public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Signing scalar `clamp(Blake2b-512(private)[0..32]) mod L`.
    pub fn scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(clamp_integer(expand_private(&self.private)))
    }

    /// Ledger account address of this key.
    pub fn account(&self) -> String {
        encode_account(&self.public)
    }
}

impl fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

impl PartialEq for Ed25519KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for Ed25519KeyPair {}

/// Lower half of the Blake2b-512 expansion of a private key (unclamped).
pub(crate) fn expand_private(private: &[u8; 32]) -> [u8; 32] {
    let mut expanded = blake2b_512(private);
    let mut lower = [0u8; 32];
    lower.copy_from_slice(&expanded[..32]);
    expanded.zeroize();
    lower
}

/// secp256k1 key pair used to receive notifications.
///
/// The public half is the 32-byte x-only coordinate of `private · G`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct NotifyKeyPair {
    private: [u8; 32],
    #[zeroize(skip)]
    public: [u8; 32],
}

impl NotifyKeyPair {
    /// Build the key pair for a private scalar. Fails for zero or values ≥ n.
    pub fn from_private(private: [u8; 32]) -> Result<Self, KeyError> {
        let secret = k256::SecretKey::from_slice(&private)
            .map_err(|_| KeyError::Derivation("notify scalar out of range".into()))?;
        let point = secret.public_key().to_encoded_point(true);
        let x = point
            .x()
            .ok_or_else(|| KeyError::Derivation("notify public key is identity".into()))?;
        let mut public = [0u8; 32];
        public.copy_from_slice(x);
        Ok(Self { private, public })
    }

    pub fn private_bytes(&self) -> &[u8; 32] {
        &self.private
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// The private half as a `k256` secret key.
    pub fn secret_key(&self) -> Result<k256::SecretKey, KeyError> {
        k256::SecretKey::from_slice(&self.private)
            .map_err(|_| KeyError::Derivation("notify scalar out of range".into()))
    }
}

impl fmt::Debug for NotifyKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyKeyPair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

impl PartialEq for NotifyKeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for NotifyKeyPair {}

/// The three key pairs owned by one pseudonym.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTriple {
    pub spend: Ed25519KeyPair,
    pub view: Ed25519KeyPair,
    pub notify: NotifyKeyPair,
}

/// Public halves of a [`KeyTriple`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PublicKeys {
    pub spend: [u8; 32],
    pub view: [u8; 32],
    pub notify: [u8; 32],
}

impl KeyTriple {
    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys {
            spend: self.spend.public_key(),
            view: self.view.public_key(),
            notify: self.notify.public_key(),
        }
    }
}

/// Derive the key triple for pseudonym `index`.
pub fn derive(seed: &Seed, index: u32) -> Result<KeyTriple, KeyError> {
    let spend = Ed25519KeyPair::from_private(derive_key_seed(seed, index, KeyType::Spend));
    let view = Ed25519KeyPair::from_private(derive_key_seed(seed, index, KeyType::View));
    let mut notify_seed = derive_key_seed(seed, index, KeyType::Notify);
    let notify = NotifyKeyPair::from_private(notify_seed);
    notify_seed.zeroize();
    Ok(KeyTriple {
        spend,
        view,
        notify: notify?,
    })
}

/// Walk the derivation path and return the 32-byte key seed.
pub fn derive_key_seed(seed: &Seed, index: u32, key_type: KeyType) -> [u8; 32] {
    let path = [
        PATH_PURPOSE | HARDENED,
        PATH_COIN_TYPE | HARDENED,
        PATH_NANONYM | HARDENED,
        index | HARDENED,
        key_type as u32,
    ];
    let mut state = [0u8; 32];
    for (depth, segment) in path.iter().enumerate() {
        let previous: &[u8] = if depth == 0 { &[] } else { &state };
        let next = blake2b_256(&[seed.as_bytes(), previous, &segment.to_be_bytes()]);
        state = next;
    }
    state
}

/// The ledger's standard account key at `index`: `Blake2b-256(seed || index)`.
///
/// Backs regular (non-stealth) wallet accounts.
pub fn derive_account(seed: &Seed, index: u32) -> Ed25519KeyPair {
    let mut private = blake2b_256(&[seed.as_bytes(), &index.to_be_bytes()]);
    let kp = Ed25519KeyPair::from_private(private);
    private.zeroize();
    kp
}

// --- serde: private halves are stored, public halves re-derived and checked ---

#[derive(Serialize, Deserialize)]
struct KeyPairRecord {
    private: String,
    public: String,
}

fn parse_private<E: serde::de::Error>(record: &KeyPairRecord) -> Result<[u8; 32], E> {
    let bytes = hex::decode(&record.private).map_err(E::custom)?;
    bytes
        .try_into()
        .map_err(|_| E::custom("private key must be 32 bytes"))
}

impl Serialize for Ed25519KeyPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        KeyPairRecord {
            private: hex::encode(self.private),
            public: hex::encode(self.public),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ed25519KeyPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = KeyPairRecord::deserialize(deserializer)?;
        let kp = Self::from_private(parse_private(&record)?);
        if hex::encode(kp.public) != record.public.to_ascii_lowercase() {
            return Err(serde::de::Error::custom("public key does not match private key"));
        }
        Ok(kp)
    }
}

impl Serialize for NotifyKeyPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        KeyPairRecord {
            private: hex::encode(self.private),
            public: hex::encode(self.public),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NotifyKeyPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = KeyPairRecord::deserialize(deserializer)?;
        let kp = Self::from_private(parse_private(&record)?).map_err(serde::de::Error::custom)?;
        if hex::encode(kp.public) != record.public.to_ascii_lowercase() {
            return Err(serde::de::Error::custom("public key does not match private key"));
        }
        Ok(kp)
    }
}
