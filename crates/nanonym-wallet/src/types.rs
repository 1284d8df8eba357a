//! Wallet records: pseudonyms, the stealth accounts discovered for them,
//! and the tagged account type the rest of the wallet works with.

use chrono::{DateTime, Utc};
use nanonym_core::account::encode_account;
use nanonym_core::error::CryptoError;
use nanonym_core::keys::{derive_account, KeyTriple, Seed};
use nanonym_core::notification::DedupKey;
use nanonym_core::stealth::StealthKeyPair;
use nanonym_core::{NanoNymAddress, PaymentNotification, Raw};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::traits::AccountState;

/// Serde helper: 32-byte keys as lowercase hex.
pub(crate) mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        nanonym_core::stealth::parse_key_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle of a pseudonym. Only `Active` pseudonyms are monitored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PseudonymStatus {
    Active,
    Archived,
}

/// What the ledger last told us about a stealth account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// The ledger could not be reached.
    Unknown,
    /// The ledger confirmed the account has no blocks yet.
    Unopened,
    /// The account has an open block.
    Opened,
}

/// Private scalar of a stealth account, zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretScalar([u8; 32]);

impl SecretScalar {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretScalar([REDACTED])")
    }
}

impl Serialize for SecretScalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        hex32::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for SecretScalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        hex32::deserialize(deserializer).map(Self)
    }
}

/// A one-time account that received a payment to a pseudonym.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthAccount {
    pub address: String,
    #[serde(with = "hex32")]
    pub public_key: [u8; 32],
    pub private_key: SecretScalar,
    #[serde(with = "hex32")]
    pub ephemeral_public_key: [u8; 32],
    pub tx_reference: String,
    /// Amount claimed by the sender's notification.
    pub amount_raw: Option<Raw>,
    pub memo: Option<String>,
    pub received_at: DateTime<Utc>,
    pub parent_index: u32,
    /// Last balance confirmed by the ledger.
    pub balance: Raw,
    pub ledger_status: LedgerStatus,
}

impl StealthAccount {
    /// Record a freshly discovered payment. The ledger state starts unknown.
    pub fn discovered(
        parent_index: u32,
        key_pair: &StealthKeyPair,
        notification: &PaymentNotification,
        ephemeral_public_key: [u8; 32],
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            address: key_pair.account(),
            public_key: key_pair.public_key(),
            private_key: SecretScalar::new(*key_pair.private_bytes()),
            ephemeral_public_key,
            tx_reference: notification.tx_hash.clone(),
            amount_raw: notification.amount_raw,
            memo: notification.memo.clone(),
            received_at,
            parent_index,
            balance: Raw::ZERO,
            ledger_status: LedgerStatus::Unknown,
        }
    }

    /// The one-time key pair, checked against the stored public key.
    pub fn key_pair(&self) -> Result<StealthKeyPair, CryptoError> {
        StealthKeyPair::from_scalar(*self.private_key.as_bytes(), &self.public_key)
    }

    /// Spendable amount for selection and display.
    ///
    /// The ledger balance once opened; the claimed amount while the ledger
    /// confirms the account is unopened; nothing while the state is unknown.
    pub fn effective_balance(&self) -> Raw {
        match self.ledger_status {
            LedgerStatus::Opened => self.balance,
            LedgerStatus::Unopened => self.amount_raw.unwrap_or(Raw::ZERO),
            LedgerStatus::Unknown => Raw::ZERO,
        }
    }

    pub fn is_opened(&self) -> bool {
        self.ledger_status == LedgerStatus::Opened
    }

    pub fn dedup_key(&self) -> DedupKey {
        (self.ephemeral_public_key, self.tx_reference.clone())
    }

    /// Fold a ledger answer into the record. `None` means the ledger has
    /// never seen the account.
    pub fn apply_state(&mut self, state: Option<&AccountState>) {
        match state {
            Some(s) if s.open_block.is_some() => {
                self.ledger_status = LedgerStatus::Opened;
                self.balance = s.balance;
            }
            _ => self.ledger_status = LedgerStatus::Unopened,
        }
    }

    /// Fold the ledger answer read back after our receive block was
    /// accepted. Until the ledger shows the account open its state stays
    /// unknown, so the claimed amount is never counted. Returns whether
    /// the open is confirmed.
    pub fn confirm_receive(&mut self, state: Option<&AccountState>) -> bool {
        match state {
            Some(s) if s.open_block.is_some() => {
                self.apply_state(state);
                true
            }
            _ => {
                self.ledger_status = LedgerStatus::Unknown;
                false
            }
        }
    }
}

/// A reusable payment identity and everything discovered for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pseudonym {
    pub index: u32,
    pub label: String,
    pub address: NanoNymAddress,
    /// Plain `nano_` account of the spend key, for senders without
    /// pseudonym support.
    pub fallback_address: String,
    pub status: PseudonymStatus,
    pub created_at: DateTime<Utc>,
    pub keys: KeyTriple,
    #[serde(default)]
    pub stealth_accounts: Vec<StealthAccount>,
}

impl Pseudonym {
    pub fn new(index: u32, label: impl Into<String>, keys: KeyTriple, created_at: DateTime<Utc>) -> Self {
        Self {
            index,
            label: label.into(),
            address: NanoNymAddress::from_keys(&keys),
            fallback_address: keys.spend.account(),
            status: PseudonymStatus::Active,
            created_at,
            keys,
            stealth_accounts: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PseudonymStatus::Active
    }

    /// Sum of effective balances across stealth accounts.
    pub fn balance(&self) -> Raw {
        self.stealth_accounts.iter().map(StealthAccount::effective_balance).sum()
    }

    pub fn payment_count(&self) -> usize {
        self.stealth_accounts.len()
    }

    pub fn has_payment(&self, key: &DedupKey) -> bool {
        self.stealth_accounts.iter().any(|a| &a.dedup_key() == key)
    }

    pub fn account(&self, address: &str) -> Option<&StealthAccount> {
        self.stealth_accounts.iter().find(|a| a.address == address)
    }

    pub fn account_mut(&mut self, address: &str) -> Option<&mut StealthAccount> {
        self.stealth_accounts.iter_mut().find(|a| a.address == address)
    }
}

/// Any account the wallet can show or spend from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletAccount {
    /// Standard ledger account derived from the seed at `index`.
    RegularAccount {
        index: u32,
        address: String,
        #[serde(with = "hex32")]
        public_key: [u8; 32],
    },
    /// One-time account owned through a pseudonym.
    StealthDerivedAccount(StealthAccount),
}

impl WalletAccount {
    pub fn regular(seed: &Seed, index: u32) -> Self {
        let kp = derive_account(seed, index);
        Self::RegularAccount {
            index,
            address: encode_account(&kp.public_key()),
            public_key: kp.public_key(),
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Self::RegularAccount { address, .. } => address,
            Self::StealthDerivedAccount(account) => &account.address,
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        match self {
            Self::RegularAccount { public_key, .. } => *public_key,
            Self::StealthDerivedAccount(account) => account.public_key,
        }
    }

    pub fn is_stealth(&self) -> bool {
        matches!(self, Self::StealthDerivedAccount(_))
    }

    /// The pseudonym that owns this account, if any.
    pub fn parent_index(&self) -> Option<u32> {
        match self {
            Self::RegularAccount { .. } => None,
            Self::StealthDerivedAccount(account) => Some(account.parent_index),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nanonym_core::keys::derive;
    use nanonym_core::stealth::{recover, StealthPayment};

    pub(crate) fn test_keys(index: u32) -> KeyTriple {
        derive(&Seed::from_bytes(&[3u8; 32]).unwrap(), index).unwrap()
    }

    pub(crate) fn stealth_account(parent: &KeyTriple, parent_index: u32, amount: Option<Raw>) -> StealthAccount {
        let payment = StealthPayment::new(&NanoNymAddress::from_keys(parent)).unwrap();
        let kp = recover(parent, &payment.ephemeral_public()).unwrap();
        let notification =
            PaymentNotification::build(&payment.ephemeral_public(), "ABCD", amount, None);
        StealthAccount::discovered(parent_index, &kp, &notification, payment.ephemeral_public(), Utc::now())
    }

    #[test]
    fn new_pseudonym_addresses() {
        let keys = test_keys(0);
        let p = Pseudonym::new(0, "shop", keys.clone(), Utc::now());
        assert_eq!(p.address, NanoNymAddress::from_keys(&keys));
        assert_eq!(p.fallback_address, keys.spend.account());
        assert!(p.is_active());
        assert_eq!(p.payment_count(), 0);
        assert_eq!(p.balance(), Raw::ZERO);
    }

    #[test]
    fn discovered_account_keys_match() {
        let keys = test_keys(1);
        let account = stealth_account(&keys, 1, Some(Raw(10)));
        assert_eq!(account.key_pair().unwrap().public_key(), account.public_key);
        assert_eq!(account.ledger_status, LedgerStatus::Unknown);
    }

    #[test]
    fn effective_balance_by_status() {
        let keys = test_keys(2);
        let mut account = stealth_account(&keys, 2, Some(Raw(10)));
        assert_eq!(account.effective_balance(), Raw::ZERO);

        account.apply_state(None);
        assert_eq!(account.ledger_status, LedgerStatus::Unopened);
        assert_eq!(account.effective_balance(), Raw(10));

        account.apply_state(Some(&AccountState {
            balance: Raw(7),
            open_block: Some("OPEN".into()),
            receivable: None,
        }));
        assert_eq!(account.ledger_status, LedgerStatus::Opened);
        assert_eq!(account.effective_balance(), Raw(7));
    }

    #[test]
    fn confirmed_receive_takes_ledger_balance() {
        let keys = test_keys(2);
        let mut account = stealth_account(&keys, 2, Some(Raw(500)));
        account.apply_state(None);
        let opened = AccountState {
            balance: Raw(1),
            open_block: Some("OPEN".into()),
            receivable: None,
        };
        assert!(account.confirm_receive(Some(&opened)));
        assert!(account.is_opened());
        assert_eq!(account.balance, Raw(1));
        assert_eq!(account.effective_balance(), Raw(1));
    }

    #[test]
    fn unconfirmed_receive_counts_nothing() {
        let keys = test_keys(2);
        let mut account = stealth_account(&keys, 2, Some(Raw(500)));
        account.apply_state(None);
        assert_eq!(account.effective_balance(), Raw(500));

        assert!(!account.confirm_receive(None));
        assert!(!account.is_opened());
        assert_eq!(account.ledger_status, LedgerStatus::Unknown);
        assert_eq!(account.balance, Raw::ZERO);
        assert_eq!(account.effective_balance(), Raw::ZERO);

        let not_yet = AccountState {
            balance: Raw::ZERO,
            open_block: None,
            receivable: Some(Raw(1)),
        };
        assert!(!account.confirm_receive(Some(&not_yet)));
        assert_eq!(account.effective_balance(), Raw::ZERO);
    }

    #[test]
    fn pseudonym_balance_and_dedup() {
        let keys = test_keys(3);
        let mut p = Pseudonym::new(3, "", keys.clone(), Utc::now());
        let mut account = stealth_account(&keys, 3, Some(Raw(4)));
        account.apply_state(None);
        let key = account.dedup_key();
        p.stealth_accounts.push(account);
        assert!(p.has_payment(&key));
        assert_eq!(p.balance(), Raw(4));
        assert_eq!(p.payment_count(), 1);
    }

    #[test]
    fn serde_roundtrip_and_redaction() {
        let keys = test_keys(4);
        let mut p = Pseudonym::new(4, "donations", keys.clone(), Utc::now());
        p.stealth_accounts.push(stealth_account(&keys, 4, None));
        let json = serde_json::to_string(&p).unwrap();
        let back: Pseudonym = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);

        let dbg = format!("{:?}", p.stealth_accounts[0]);
        assert!(dbg.contains("REDACTED"));
    }

    #[test]
    fn wallet_account_tagging() {
        let seed = Seed::from_bytes(&[3u8; 32]).unwrap();
        let regular = WalletAccount::regular(&seed, 0);
        let json = serde_json::to_value(&regular).unwrap();
        assert_eq!(json["type"], "regular_account");
        assert!(!regular.is_stealth());
        assert_eq!(regular.parent_index(), None);

        let stealth = WalletAccount::StealthDerivedAccount(stealth_account(&test_keys(5), 5, None));
        let json = serde_json::to_value(&stealth).unwrap();
        assert_eq!(json["type"], "stealth_derived_account");
        assert_eq!(stealth.parent_index(), Some(5));
        let back: WalletAccount = serde_json::from_value(json).unwrap();
        assert_eq!(back, stealth);
    }
}
