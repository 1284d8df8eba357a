//! Wallet error types.

use nanonym_core::error::{AddressError, AmountError, CryptoError, KeyError, NotificationError};
use nanonym_core::Raw;
use thiserror::Error;

/// Failures reported by ledger collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Network or node hiccup; the same request may succeed later.
    #[error("transient ledger error: {0}")]
    Transient(String),

    /// The ledger rejected the request; retrying will not help.
    #[error("ledger rejected request: {0}")]
    Permanent(String),

    /// The call did not finish within the configured timeout.
    #[error("ledger call timed out")]
    Timeout,
}

impl LedgerError {
    /// Whether a background retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout)
    }
}

/// Failures of the pseudonym store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization: {0}")]
    Serialization(String),

    #[error("encryption: {0}")]
    Encryption(String),

    /// Wrong password for the store file.
    #[error("invalid password")]
    InvalidPassword,

    /// Store file is corrupted or has invalid format.
    #[error("corrupted file: {0}")]
    CorruptedFile(String),

    #[error("store call timed out")]
    Timeout,
}

/// Failures of the notification channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("channel closed")]
    Closed,

    #[error("channel call timed out")]
    Timeout,
}

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Funded stealth accounts cannot cover the requested amount.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: Raw, need: Raw },

    /// A stealth account is unknown or still has no blocks on the ledger.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Background opening gave up after the retry ceiling.
    #[error("opening {address} abandoned after {attempts} attempts")]
    OpenExhausted { address: String, attempts: u32 },

    /// Some, but not all, send blocks of a multi-account send were broadcast.
    #[error("partial send: {sent_count} of {total_count} sends broadcast ({sent_amount} raw): {reason}")]
    PartialSendFailure {
        sent_count: usize,
        total_count: usize,
        sent_amount: Raw,
        tx_hashes: Vec<String>,
        reason: String,
    },

    /// Spend keys are locked; no block can be submitted.
    #[error("wallet is locked")]
    WalletLocked,

    #[error("pseudonym {0} not found")]
    PseudonymNotFound(u32),

    /// A multi-account send needs the caller to accept the linkage first.
    #[error("privacy warning not acknowledged: send links {accounts} accounts")]
    PrivacyWarningNotAcknowledged { accounts: usize },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Amount(#[from] AmountError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_insufficient_funds() {
        let e = WalletError::InsufficientFunds {
            have: Raw(100),
            need: Raw(200),
        };
        assert_eq!(e.to_string(), "insufficient funds: have 100, need 200");
    }

    #[test]
    fn display_partial_send() {
        let e = WalletError::PartialSendFailure {
            sent_count: 1,
            total_count: 3,
            sent_amount: Raw(5),
            tx_hashes: vec!["AA".into()],
            reason: "node down".into(),
        };
        assert_eq!(e.to_string(), "partial send: 1 of 3 sends broadcast (5 raw): node down");
    }

    #[test]
    fn retryable_ledger_errors() {
        assert!(LedgerError::Transient("x".into()).is_retryable());
        assert!(LedgerError::Timeout.is_retryable());
        assert!(!LedgerError::Permanent("bad block".into()).is_retryable());
    }

    #[test]
    fn from_core_errors_is_transparent() {
        let wallet: WalletError = AddressError::ChecksumMismatch.into();
        assert_eq!(wallet, WalletError::Address(AddressError::ChecksumMismatch));
        assert_eq!(wallet.to_string(), "checksum mismatch");

        let wallet: WalletError = CryptoError::InvalidPoint.into();
        assert_eq!(wallet.to_string(), "invalid curve point");
    }

    #[test]
    fn from_ledger_error() {
        let wallet: WalletError = LedgerError::Timeout.into();
        assert_eq!(wallet, WalletError::Ledger(LedgerError::Timeout));
    }
}
