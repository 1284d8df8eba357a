//! Collaborator interfaces.
//!
//! The wallet never talks to a node, relay or disk directly. Each external
//! capability is a trait so the manager can be driven by real adapters in
//! the binaries and by in-memory mocks in tests.

use async_trait::async_trait;
use nanonym_core::keys::NotifyKeyPair;
use nanonym_core::stealth::StealthKeyPair;
use nanonym_core::Raw;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ChannelError, LedgerError, StoreError};
use crate::types::Pseudonym;

/// Ledger view of one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: Raw,
    /// Hash of the account's first block, once opened.
    pub open_block: Option<String>,
    /// Sum of sends waiting to be received.
    pub receivable: Option<Raw>,
}

/// Read access to ledger state.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// `Ok(None)` when the ledger has never seen the account.
    async fn account_state(&self, address: &str) -> Result<Option<AccountState>, LedgerError>;
}

/// Block publication. Both calls return the hash of the published block.
#[async_trait]
pub trait LedgerSubmit: Send + Sync {
    /// Receive `source_tx` into the account controlled by `keys`, opening
    /// it if this is its first block.
    async fn submit_receive_block(
        &self,
        keys: &StealthKeyPair,
        source_tx: &str,
    ) -> Result<String, LedgerError>;

    async fn submit_send_block(
        &self,
        keys: &StealthKeyPair,
        destination: &str,
        amount: Raw,
    ) -> Result<String, LedgerError>;
}

pub type SubscriptionId = u64;

/// A decrypted notification delivered to one of our notify keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub recipient_notify: [u8; 32],
    pub payload: String,
}

/// Outcome of publishing over a multi-relay transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub accepted: usize,
    pub rejected: usize,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        self.accepted > 0
    }
}

/// Encrypted pub/sub transport keyed by notify public keys.
///
/// Delivery is at-least-once and unordered; consumers de-duplicate.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Start forwarding messages addressed to `keys` into `sink`.
    async fn subscribe(
        &self,
        keys: &NotifyKeyPair,
        sink: mpsc::Sender<InboundMessage>,
    ) -> Result<SubscriptionId, ChannelError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ChannelError>;

    /// Encrypt `payload` from `sender` to `recipient_notify` and publish it.
    async fn publish(
        &self,
        payload: &str,
        sender: &NotifyKeyPair,
        recipient_notify: &[u8; 32],
    ) -> Result<DeliveryReport, ChannelError>;
}

/// Durable pseudonym records, written through on every change.
#[async_trait]
pub trait PseudonymStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Pseudonym>, StoreError>;
    async fn save(&self, pseudonym: &Pseudonym) -> Result<(), StoreError>;
}
