//! # nanonym-wallet
//! Pseudonym management for NanoNym: stealth account discovery, background
//! opening, privacy-aware multi-account spending and encrypted storage.
//!
//! The ledger, notification transport and storage are reached through the
//! traits in [`traits`]; [`StealthAccountManager`] ties them together.

pub mod config;
pub mod encryption;
pub mod error;
pub mod manager;
pub mod retry;
pub mod rpc;
pub mod selection;
pub mod store;
pub mod traits;
pub mod types;

pub use config::ManagerConfig;
pub use error::{ChannelError, LedgerError, StoreError, WalletError};
pub use manager::{
    Collaborators, ManagerEvent, ProcessOutcome, SendInput, SendPlan, SendReceipt,
    StealthAccountManager,
};
pub use retry::{RetryPolicy, RetryQueue};
pub use rpc::RpcLedger;
pub use selection::{AccountSelectionResult, AccountSelector, PrivacyImpact, PrivacyLevel};
pub use store::{EncryptedFileStore, MemoryStore};
pub use traits::{
    AccountState, DeliveryReport, InboundMessage, LedgerQuery, LedgerSubmit, NotificationChannel,
    PseudonymStore, SubscriptionId,
};
pub use types::{LedgerStatus, Pseudonym, PseudonymStatus, StealthAccount, WalletAccount};
