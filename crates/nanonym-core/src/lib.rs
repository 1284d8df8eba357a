//! # nanonym-core
//! Keys, address codecs and stealth cryptography for NanoNym pseudonyms on
//! the Nano ledger.
//!
//! A pseudonym publishes one reusable `nnym_` address. Each payment to it
//! lands on a fresh `nano_` account that only the pseudonym's owner can
//! find and spend from.

pub mod account;
pub mod address;
pub mod amount;
pub mod base32;
pub mod constants;
pub mod error;
pub mod hash;
pub mod keys;
pub mod mnemonic;
pub mod notification;
pub mod stealth;

pub use address::NanoNymAddress;
pub use amount::Raw;
pub use error::{AddressError, AmountError, CryptoError, KeyError, NotificationError};
pub use keys::{derive, Ed25519KeyPair, KeyTriple, NotifyKeyPair, PublicKeys, Seed};
pub use notification::PaymentNotification;
pub use stealth::{StealthKeyPair, StealthPayment, StealthPublicKey};
