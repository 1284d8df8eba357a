//! Payment notification payload.
//!
//! After paying a stealth account the sender announces the ephemeral key
//! and the send block hash to the recipient's notify key. The payload is
//! plain JSON; the transport encrypts it.
//!
//! ```json
//! {"version":1,"protocol":"nanonym","R":"<hex>","tx_hash":"<hash>","amount_raw":"1000"}
//! ```

use serde::{Deserialize, Serialize};

use crate::amount::Raw;
use crate::constants::{NOTIFICATION_PROTOCOL, NOTIFICATION_VERSION};
use crate::error::NotificationError;

/// Key that identifies one payment for de-duplication: `(R, tx_hash)`.
pub type DedupKey = ([u8; 32], String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub version: u32,
    pub protocol: String,
    /// Hex-encoded ephemeral public key.
    #[serde(rename = "R")]
    pub ephemeral_public: String,
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_raw: Option<Raw>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl PaymentNotification {
    /// Build a notification for a completed payment.
    pub fn build(
        ephemeral_public: &[u8; 32],
        tx_hash: impl Into<String>,
        amount_raw: Option<Raw>,
        memo: Option<String>,
    ) -> Self {
        Self {
            version: NOTIFICATION_VERSION,
            protocol: NOTIFICATION_PROTOCOL.to_string(),
            ephemeral_public: hex::encode(ephemeral_public),
            tx_hash: tx_hash.into(),
            amount_raw,
            memo,
        }
    }

    /// Check the required fields. Optional fields are not inspected.
    pub fn validate(&self) -> Result<(), NotificationError> {
        if self.version != NOTIFICATION_VERSION {
            return Err(NotificationError::UnsupportedVersion(self.version));
        }
        if self.protocol != NOTIFICATION_PROTOCOL {
            return Err(NotificationError::UnknownProtocol(self.protocol.clone()));
        }
        self.ephemeral_key()?;
        if self.tx_hash.trim().is_empty() {
            return Err(NotificationError::MissingTxReference);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// The decoded ephemeral public key `R`.
    pub fn ephemeral_key(&self) -> Result<[u8; 32], NotificationError> {
        let bytes = hex::decode(&self.ephemeral_public)
            .map_err(|e| NotificationError::InvalidEphemeralKey(e.to_string()))?;
        bytes.try_into().map_err(|b: Vec<u8>| {
            NotificationError::InvalidEphemeralKey(format!("expected 32 bytes, got {}", b.len()))
        })
    }

    /// `(R, tx_hash)`, normalized so differently-cased hex compares equal.
    pub fn dedup_key(&self) -> Result<DedupKey, NotificationError> {
        Ok((self.ephemeral_key()?, self.tx_hash.clone()))
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings and integers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse and validate a JSON payload.
    pub fn from_json(data: &str) -> Result<Self, NotificationError> {
        let notification: Self =
            serde_json::from_str(data).map_err(|e| NotificationError::Malformed(e.to_string()))?;
        notification.validate()?;
        Ok(notification)
    }
}
