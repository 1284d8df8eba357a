//! Error types for the NanoNym protocol core.

use thiserror::Error;

/// Seed, mnemonic and key derivation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Seed is not 32 or 64 bytes, or not valid hex.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// A derived key seed is not a usable scalar.
    #[error("key derivation: {0}")]
    Derivation(String),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
}

/// Curve, scalar and signature failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Not on the curve, non-canonical, or of small order.
    #[error("invalid curve point")]
    InvalidPoint,

    #[error("invalid scalar")]
    InvalidScalar,

    /// A recovered private key does not produce the expected public key.
    #[error("private key does not match public key")]
    KeyMismatch,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// `nnym_` and `nano_` address decoding failures. All are terminal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid prefix")]
    InvalidPrefix,

    #[error("invalid length")]
    InvalidLength,

    /// Symbol outside the ledger base32 alphabet.
    #[error("invalid character: {0}")]
    InvalidCharacter(char),

    /// Non-zero bits in the leading pad.
    #[error("invalid padding bits")]
    InvalidPadding,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// Payment notification validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("unsupported notification version: {0}")]
    UnsupportedVersion(u32),

    #[error("unknown protocol tag: {0}")]
    UnknownProtocol(String),

    /// `R` is not 32 bytes of hex.
    #[error("invalid ephemeral key: {0}")]
    InvalidEphemeralKey(String),

    #[error("missing transaction reference")]
    MissingTxReference,

    /// The payload is not a JSON notification.
    #[error("malformed notification: {0}")]
    Malformed(String),
}

/// Amount parsing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid amount: {0}")]
    Invalid(String),

    #[error("amount overflow")]
    Overflow,
}
