//! Pseudonym orchestration.
//!
//! [`StealthAccountManager`] owns the wallet's pseudonyms and drives every
//! flow that touches the collaborators: creating and archiving pseudonyms,
//! discovering stealth accounts from inbound notifications, opening them on
//! the ledger (immediately, in the background, or just in time for a send)
//! and spending from them.
//!
//! Operations on one pseudonym are serialized by a per-index async mutex.
//! The pseudonym map itself sits behind a synchronous lock that is never
//! held across an `.await`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use nanonym_core::account::decode_account;
use nanonym_core::keys::{derive, Seed};
use nanonym_core::stealth::{recover, StealthPayment};
use nanonym_core::{KeyError, NanoNymAddress, PaymentNotification, Raw};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::error::{ChannelError, LedgerError, StoreError, WalletError};
use crate::retry::{RetryOutcome, RetryQueue};
use crate::selection::{AccountSelectionResult, AccountSelector, PrivacyImpact};
use crate::traits::{
    DeliveryReport, InboundMessage, LedgerQuery, LedgerSubmit, NotificationChannel,
    PseudonymStore, SubscriptionId,
};
use crate::types::{LedgerStatus, Pseudonym, PseudonymStatus, StealthAccount, WalletAccount};

/// External capabilities the manager drives.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn LedgerQuery>,
    pub submitter: Arc<dyn LedgerSubmit>,
    pub channel: Arc<dyn NotificationChannel>,
    pub store: Arc<dyn PseudonymStore>,
}

/// Progress reported to subscribers of [`StealthAccountManager::subscribe_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    AccountDiscovered {
        index: u32,
        address: String,
        amount_raw: Option<Raw>,
    },
    AccountOpened {
        index: u32,
        address: String,
        block_hash: String,
    },
    /// Opening failed permanently; the account stays unopened.
    OpenFailed {
        index: u32,
        address: String,
        reason: String,
    },
    /// Background opening hit the retry ceiling.
    OpenExhausted {
        index: u32,
        address: String,
        attempts: u32,
    },
}

impl ManagerEvent {
    /// The terminal failure this event reports, if any.
    pub fn into_error(self) -> Option<WalletError> {
        match self {
            Self::OpenExhausted {
                address, attempts, ..
            } => Some(WalletError::OpenExhausted { address, attempts }),
            _ => None,
        }
    }
}

/// Result of processing one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Discovered(StealthAccount),
    /// The `(R, tx_hash)` pair was already recorded.
    Duplicate,
}

/// One send block of a planned send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendInput {
    pub address: String,
    pub amount: Raw,
}

/// A funded, opened set of stealth accounts ready to pay `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendPlan {
    pub index: u32,
    pub destination: String,
    pub amount: Raw,
    pub inputs: Vec<SendInput>,
    pub privacy: PrivacyImpact,
    /// The caller must acknowledge the linkage before executing.
    pub requires_acknowledgement: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub tx_hashes: Vec<String>,
    pub amount: Raw,
}

pub struct StealthAccountManager {
    seed: Seed,
    config: ManagerConfig,
    ledger: Arc<dyn LedgerQuery>,
    submitter: Arc<dyn LedgerSubmit>,
    channel: Arc<dyn NotificationChannel>,
    store: Arc<dyn PseudonymStore>,
    pseudonyms: RwLock<BTreeMap<u32, Pseudonym>>,
    index_locks: DashMap<u32, Arc<tokio::sync::Mutex<()>>>,
    /// Serializes index allocation in `create_pseudonym`.
    create_lock: tokio::sync::Mutex<()>,
    /// Notify public key -> pseudonym index.
    routes: DashMap<[u8; 32], u32>,
    subscriptions: DashMap<u32, SubscriptionId>,
    retries: Mutex<RetryQueue>,
    locked: AtomicBool,
    suppress_privacy_warning: AtomicBool,
    events: broadcast::Sender<ManagerEvent>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
}

impl StealthAccountManager {
    pub fn new(seed: Seed, config: ManagerConfig, collaborators: Collaborators) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_buffer.max(1));
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Arc::new(Self {
            seed,
            ledger: collaborators.ledger,
            submitter: collaborators.submitter,
            channel: collaborators.channel,
            store: collaborators.store,
            pseudonyms: RwLock::new(BTreeMap::new()),
            index_locks: DashMap::new(),
            create_lock: tokio::sync::Mutex::new(()),
            routes: DashMap::new(),
            subscriptions: DashMap::new(),
            retries: Mutex::new(RetryQueue::new(config.retry)),
            locked: AtomicBool::new(false),
            suppress_privacy_warning: AtomicBool::new(config.suppress_privacy_warning),
            events,
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            config,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    // --- Pseudonym lifecycle ---

    /// Load every stored pseudonym, resubscribe the active ones and queue
    /// their unopened accounts for background opening.
    pub async fn load(&self) -> Result<usize, WalletError> {
        let records = self.bounded(self.store.load_all(), StoreError::Timeout).await?;
        let count = records.len();
        let now = Instant::now();

        for pseudonym in records {
            if derive(&self.seed, pseudonym.index)? != pseudonym.keys {
                return Err(KeyError::Derivation(format!(
                    "stored keys for pseudonym {} do not match the wallet seed",
                    pseudonym.index
                ))
                .into());
            }
            {
                let mut retries = self.retries.lock();
                for account in pseudonym.stealth_accounts.iter().filter(|a| !a.is_opened()) {
                    retries.enqueue(&account.address, pseudonym.index, now);
                }
            }
            self.pseudonyms.write().insert(pseudonym.index, pseudonym.clone());
            if pseudonym.is_active() {
                if let Err(e) = self.subscribe(&pseudonym).await {
                    warn!(index = pseudonym.index, "resubscribe failed: {e}");
                }
            }
        }

        info!(pseudonyms = count, pending_opens = self.pending_opens(), "wallet loaded");
        Ok(count)
    }

    /// Derive, persist and start monitoring the pseudonym at the next free index.
    pub async fn create_pseudonym(&self, label: &str) -> Result<Pseudonym, WalletError> {
        let _creating = self.create_lock.lock().await;
        let index = match self.pseudonyms.read().keys().next_back() {
            Some(last) => last
                .checked_add(1)
                .ok_or_else(|| KeyError::Derivation("pseudonym index space exhausted".into()))?,
            None => 0,
        };

        let keys = derive(&self.seed, index)?;
        let pseudonym = Pseudonym::new(index, label, keys, Utc::now());
        self.persist(&pseudonym).await?;
        self.pseudonyms.write().insert(index, pseudonym.clone());
        self.subscribe(&pseudonym).await?;

        info!(index, address = %pseudonym.address, "pseudonym created");
        Ok(pseudonym)
    }

    /// Stop monitoring a pseudonym. Its accounts stay spendable.
    pub async fn archive(&self, index: u32) -> Result<(), WalletError> {
        let pseudonym = self.snapshot(index)?;
        self.unsubscribe(&pseudonym).await;

        let lock = self.index_lock(index);
        let _guard = lock.lock().await;
        self.update(index, |p| p.status = PseudonymStatus::Archived).await?;
        info!(index, "pseudonym archived");
        Ok(())
    }

    pub async fn reactivate(&self, index: u32) -> Result<(), WalletError> {
        let lock = self.index_lock(index);
        let _guard = lock.lock().await;
        let pseudonym = self.update(index, |p| p.status = PseudonymStatus::Active).await?;
        if !self.subscriptions.contains_key(&index) {
            self.subscribe(&pseudonym).await?;
        }
        info!(index, "pseudonym reactivated");
        Ok(())
    }

    pub fn pseudonym(&self, index: u32) -> Option<Pseudonym> {
        self.pseudonyms.read().get(&index).cloned()
    }

    pub fn pseudonyms(&self) -> Vec<Pseudonym> {
        self.pseudonyms.read().values().cloned().collect()
    }

    pub fn account(&self, index: u32, address: &str) -> Option<StealthAccount> {
        self.pseudonyms.read().get(&index)?.account(address).cloned()
    }

    /// The first `regular_count` seed accounts followed by every stealth account.
    pub fn wallet_accounts(&self, regular_count: u32) -> Vec<WalletAccount> {
        let mut accounts: Vec<WalletAccount> = (0..regular_count)
            .map(|i| WalletAccount::regular(&self.seed, i))
            .collect();
        let map = self.pseudonyms.read();
        accounts.extend(
            map.values()
                .flat_map(|p| p.stealth_accounts.iter().cloned())
                .map(WalletAccount::StealthDerivedAccount),
        );
        accounts
    }

    // --- Lock state ---

    /// Withhold spend keys: no block is submitted until [`unlock`](Self::unlock).
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
        info!("wallet locked");
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
        info!(pending_opens = self.pending_opens(), "wallet unlocked");
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn set_suppress_privacy_warning(&self, suppress: bool) {
        self.suppress_privacy_warning.store(suppress, Ordering::SeqCst);
    }

    // --- Receiving ---

    /// Consume notifications delivered by the channel subscriptions and
    /// process each on its own task. Returns when the inbound queue closes.
    pub async fn run(self: &Arc<Self>) {
        let mut inbound = self.inbound_rx.lock().await;
        while let Some(message) = inbound.recv().await {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                match manager.handle_inbound(message).await {
                    Ok(Some(ProcessOutcome::Discovered(account))) => {
                        debug!(address = %account.address, "inbound payment processed");
                    }
                    Ok(_) => {}
                    Err(e) => warn!("inbound notification rejected: {e}"),
                }
            });
        }
        info!("inbound queue closed");
    }

    /// Route one delivered message to its pseudonym and process it.
    /// `Ok(None)` means the message was not addressed to an active pseudonym.
    pub async fn handle_inbound(
        &self,
        message: InboundMessage,
    ) -> Result<Option<ProcessOutcome>, WalletError> {
        let Some(index) = self.routes.get(&message.recipient_notify).map(|r| *r.value()) else {
            debug!("dropping notification for unknown notify key");
            return Ok(None);
        };
        let active = self.pseudonyms.read().get(&index).is_some_and(Pseudonym::is_active);
        if !active {
            debug!(index, "dropping notification for archived pseudonym");
            return Ok(None);
        }
        let notification = PaymentNotification::from_json(&message.payload)?;
        self.process_notification(index, &notification).await.map(Some)
    }

    /// Discover the stealth account announced by `notification`.
    ///
    /// Reprocessing the same `(R, tx_hash)` returns [`ProcessOutcome::Duplicate`].
    /// An unreachable ledger leaves the account `Unknown` and queued for
    /// background opening rather than failing.
    pub async fn process_notification(
        &self,
        index: u32,
        notification: &PaymentNotification,
    ) -> Result<ProcessOutcome, WalletError> {
        notification.validate()?;
        let dedup = notification.dedup_key()?;
        let ephemeral = dedup.0;

        let lock = self.index_lock(index);
        let _guard = lock.lock().await;

        let keys = {
            let map = self.pseudonyms.read();
            let pseudonym = map.get(&index).ok_or(WalletError::PseudonymNotFound(index))?;
            if pseudonym.has_payment(&dedup) {
                debug!(index, tx = %notification.tx_hash, "duplicate notification");
                return Ok(ProcessOutcome::Duplicate);
            }
            pseudonym.keys.clone()
        };

        let key_pair = recover(&keys, &ephemeral)?;
        let mut account =
            StealthAccount::discovered(index, &key_pair, notification, ephemeral, Utc::now());
        match self
            .bounded(self.ledger.account_state(&account.address), LedgerError::Timeout)
            .await
        {
            Ok(state) => account.apply_state(state.as_ref()),
            Err(e) => warn!(index, address = %account.address, "ledger state unavailable: {e}"),
        }

        let updated = {
            let mut map = self.pseudonyms.write();
            let pseudonym = map.get_mut(&index).ok_or(WalletError::PseudonymNotFound(index))?;
            if pseudonym.has_payment(&dedup) {
                return Ok(ProcessOutcome::Duplicate);
            }
            pseudonym.stealth_accounts.push(account.clone());
            pseudonym.clone()
        };
        if let Err(e) = self.persist(&updated).await {
            if let Some(p) = self.pseudonyms.write().get_mut(&index) {
                p.stealth_accounts.retain(|a| a.address != account.address);
            }
            return Err(e);
        }

        info!(index, address = %account.address, status = ?account.ledger_status, "stealth account discovered");
        self.emit(ManagerEvent::AccountDiscovered {
            index,
            address: account.address.clone(),
            amount_raw: account.amount_raw,
        });

        if !account.is_opened() {
            if account.ledger_status == LedgerStatus::Unknown || self.is_locked() {
                self.retries.lock().enqueue(&account.address, index, Instant::now());
                debug!(index, address = %account.address, "open queued");
            } else {
                self.attempt_open(index, &account.address).await;
            }
        }

        let account = self.account(index, &account.address).unwrap_or(account);
        Ok(ProcessOutcome::Discovered(account))
    }

    // --- Opening ---

    /// Number of accounts waiting for a background open.
    pub fn pending_opens(&self) -> usize {
        self.retries.lock().len()
    }

    pub fn is_open_pending(&self, address: &str) -> bool {
        self.retries.lock().contains(address)
    }

    /// Dispatch every due background open and wait for the attempts.
    /// Nothing is dispatched while the wallet is locked.
    pub async fn retry_tick(self: &Arc<Self>) -> usize {
        if self.is_locked() {
            return 0;
        }
        let due = self.retries.lock().tick(Instant::now());
        let dispatched = due.len();

        let mut attempts = JoinSet::new();
        for item in due {
            let manager = Arc::clone(self);
            attempts.spawn(async move {
                let lock = manager.index_lock(item.parent_index);
                let _guard = lock.lock().await;
                manager.attempt_open(item.parent_index, &item.address).await;
            });
        }
        while attempts.join_next().await.is_some() {}
        dispatched
    }

    /// Run [`retry_tick`](Self::retry_tick) every `retry_tick_ms`.
    pub fn spawn_retry_scheduler(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let period = manager.config.retry_tick().max(Duration::from_millis(1));
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                manager.retry_tick().await;
            }
        })
    }

    /// Try to open an account and route the outcome into the retry queue
    /// or the event stream. The caller holds the index lock.
    async fn attempt_open(&self, index: u32, address: &str) {
        match self.open_account(index, address).await {
            Ok(_) => {}
            Err(WalletError::WalletLocked) => {
                self.retries.lock().enqueue(address, index, Instant::now());
            }
            Err(WalletError::Ledger(e)) if e.is_retryable() => {
                self.record_open_failure(index, address, &e.to_string());
            }
            Err(WalletError::Store(e)) => {
                warn!(index, address, "saving opened stealth account failed: {e}");
                self.record_open_failure(index, address, &e.to_string());
            }
            Err(e) => {
                self.retries.lock().remove(address);
                warn!(index, address, "opening stealth account failed: {e}");
                self.emit(ManagerEvent::OpenFailed {
                    index,
                    address: address.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Publish the account's receive block unless the ledger already shows
    /// it open. Returns the new block hash. The caller holds the index lock.
    ///
    /// An account that is open in memory but still queued failed to save
    /// last time; the save is retried before the record is dropped.
    async fn open_account(&self, index: u32, address: &str) -> Result<Option<String>, WalletError> {
        let account = self
            .account(index, address)
            .ok_or_else(|| WalletError::AccountNotFound(address.to_string()))?;
        if account.is_opened() {
            if self.is_open_pending(address) {
                self.persist(&self.snapshot(index)?).await?;
            }
            self.retries.lock().remove(address);
            return Ok(None);
        }
        if self.is_locked() {
            return Err(WalletError::WalletLocked);
        }
        let key_pair = account.key_pair()?;

        let state = self
            .bounded(self.ledger.account_state(address), LedgerError::Timeout)
            .await?;
        if state.as_ref().is_some_and(|s| s.open_block.is_some()) {
            self.update(index, |p| {
                if let Some(a) = p.account_mut(address) {
                    a.apply_state(state.as_ref());
                }
            })
            .await?;
            self.retries.lock().remove(address);
            debug!(index, address, "account already open on the ledger");
            return Ok(None);
        }

        let block_hash = self
            .bounded(
                self.submitter.submit_receive_block(&key_pair, &account.tx_reference),
                LedgerError::Timeout,
            )
            .await?;

        // Read the balance back; the notification's amount is only a claim.
        let confirmed = match self
            .bounded(self.ledger.account_state(address), LedgerError::Timeout)
            .await
        {
            Ok(state) => state,
            Err(e) => {
                warn!(index, address, "reading back opened account failed: {e}");
                None
            }
        };
        let mut is_confirmed = false;
        let recorded = self
            .update(index, |p| {
                if let Some(a) = p.account_mut(address) {
                    is_confirmed = a.confirm_receive(confirmed.as_ref());
                }
            })
            .await;
        {
            let mut retries = self.retries.lock();
            if is_confirmed {
                retries.remove(address);
            } else {
                debug!(index, address, "open not yet visible on the ledger");
                retries.enqueue(address, index, Instant::now());
            }
        }

        info!(index, address, %block_hash, confirmed = is_confirmed, "stealth account opened");
        self.emit(ManagerEvent::AccountOpened {
            index,
            address: address.to_string(),
            block_hash: block_hash.clone(),
        });
        recorded?;
        Ok(Some(block_hash))
    }

    fn record_open_failure(&self, index: u32, address: &str, reason: &str) {
        let outcome = {
            let mut retries = self.retries.lock();
            let now = Instant::now();
            retries.enqueue(address, index, now);
            retries.record_failure(address, reason, now)
        };
        if let RetryOutcome::Exhausted(item) = outcome {
            error!(index, address, attempts = item.attempts, "giving up on opening stealth account");
            self.emit(ManagerEvent::OpenExhausted {
                index,
                address: address.to_string(),
                attempts: item.attempts,
            });
        }
    }

    // --- Spending ---

    /// Plan a send of `amount` from pseudonym `index` to a `nano_` account.
    ///
    /// Balances are refreshed first. Selected accounts that are still
    /// unopened are opened just in time; the send proceeds with the opened
    /// subset only if it still covers `amount`.
    pub async fn prepare_send(
        &self,
        index: u32,
        destination: &str,
        amount: Raw,
    ) -> Result<SendPlan, WalletError> {
        if amount.is_zero() {
            return Err(WalletError::InvalidAmount("amount must be positive".into()));
        }
        decode_account(destination)?;

        let lock = self.index_lock(index);
        let _guard = lock.lock().await;

        self.refresh_balances(index).await?;
        let candidates = self.snapshot(index)?.stealth_accounts;
        let selection = AccountSelector::select(amount, &candidates);
        if selection.is_empty() {
            return Err(WalletError::InsufficientFunds {
                have: AccountSelector::total_balance(&candidates),
                need: amount,
            });
        }

        let pending: Vec<String> = selection
            .accounts
            .iter()
            .filter(|a| !a.is_opened())
            .map(|a| a.address.clone())
            .collect();
        if !pending.is_empty() && self.is_locked() {
            return Err(WalletError::WalletLocked);
        }
        let mut failed = Vec::new();
        for address in &pending {
            if let Err(e) = self.open_account(index, address).await {
                warn!(index, address = %address, "just-in-time open failed: {e}");
                if matches!(&e, WalletError::Ledger(le) if le.is_retryable())
                    || matches!(&e, WalletError::Store(_))
                {
                    self.record_open_failure(index, address, &e.to_string());
                }
                failed.push(address.clone());
            }
        }

        let opened: Vec<StealthAccount> = {
            let current = self.snapshot(index)?;
            selection
                .accounts
                .iter()
                .filter_map(|s| current.account(&s.address).filter(|a| a.is_opened()).cloned())
                .collect()
        };
        let covered = AccountSelector::total_balance(&opened);
        if covered < amount {
            if failed.is_empty() {
                return Err(WalletError::InsufficientFunds {
                    have: covered,
                    need: amount,
                });
            }
            return Err(WalletError::AccountNotFound(failed.join(", ")));
        }

        let mut remaining = amount;
        let mut inputs = Vec::new();
        let mut used = Vec::new();
        for account in opened {
            if remaining.is_zero() {
                break;
            }
            let take = account.effective_balance().min(remaining);
            if take.is_zero() {
                continue;
            }
            remaining = remaining.saturating_sub(take);
            inputs.push(SendInput {
                address: account.address.clone(),
                amount: take,
            });
            used.push(account);
        }

        let funded = AccountSelectionResult {
            total_balance: AccountSelector::total_balance(&used),
            requires_multiple_accounts: used.len() > 1,
            accounts: used,
        };
        let privacy = AccountSelector::privacy_impact(&funded);
        let requires_acknowledgement = funded.requires_multiple_accounts
            && !self.suppress_privacy_warning.load(Ordering::SeqCst);
        if requires_acknowledgement {
            warn!(index, accounts = privacy.account_count, level = ?privacy.level, "send links stealth accounts");
        }

        Ok(SendPlan {
            index,
            destination: destination.to_string(),
            amount,
            inputs,
            privacy,
            requires_acknowledgement,
        })
    }

    /// Broadcast one send block per plan input.
    ///
    /// A failure before the first broadcast aborts with that error. A
    /// failure after some broadcasts is reported as
    /// [`WalletError::PartialSendFailure`], since those blocks are final.
    pub async fn execute_send(
        &self,
        plan: &SendPlan,
        acknowledge_privacy: bool,
    ) -> Result<SendReceipt, WalletError> {
        if plan.requires_acknowledgement && !acknowledge_privacy {
            return Err(WalletError::PrivacyWarningNotAcknowledged {
                accounts: plan.privacy.account_count,
            });
        }
        if self.is_locked() {
            return Err(WalletError::WalletLocked);
        }

        let lock = self.index_lock(plan.index);
        let _guard = lock.lock().await;

        let mut tx_hashes = Vec::with_capacity(plan.inputs.len());
        let mut sent = Raw::ZERO;
        let mut failure = None;
        for input in &plan.inputs {
            match self.send_from(plan.index, input, &plan.destination).await {
                Ok(hash) => {
                    debug!(index = plan.index, from = %input.address, %hash, "send block published");
                    tx_hashes.push(hash);
                    sent = sent.saturating_add(input.amount);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if !tx_hashes.is_empty() {
            let debits: Vec<(String, Raw)> = plan
                .inputs
                .iter()
                .take(tx_hashes.len())
                .map(|i| (i.address.clone(), i.amount))
                .collect();
            let recorded = self
                .update(plan.index, move |p| {
                    for (address, amount) in &debits {
                        if let Some(a) = p.account_mut(address) {
                            a.balance = a.balance.saturating_sub(*amount);
                        }
                    }
                })
                .await;
            if let Err(e) = recorded {
                warn!(index = plan.index, "recording sent amounts failed: {e}");
            }
        }

        match failure {
            None => {
                info!(index = plan.index, blocks = tx_hashes.len(), amount = %sent, "send complete");
                Ok(SendReceipt {
                    tx_hashes,
                    amount: sent,
                })
            }
            Some(e) if tx_hashes.is_empty() => Err(e),
            Some(e) => {
                error!(
                    index = plan.index,
                    sent = tx_hashes.len(),
                    total = plan.inputs.len(),
                    "send partially broadcast: {e}"
                );
                Err(WalletError::PartialSendFailure {
                    sent_count: tx_hashes.len(),
                    total_count: plan.inputs.len(),
                    sent_amount: sent,
                    tx_hashes,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn send_from(
        &self,
        index: u32,
        input: &SendInput,
        destination: &str,
    ) -> Result<String, WalletError> {
        let account = self
            .account(index, &input.address)
            .filter(StealthAccount::is_opened)
            .ok_or_else(|| WalletError::AccountNotFound(input.address.clone()))?;
        if self.is_locked() {
            return Err(WalletError::WalletLocked);
        }
        let key_pair = account.key_pair()?;
        let hash = self
            .bounded(
                self.submitter.submit_send_block(&key_pair, destination, input.amount),
                LedgerError::Timeout,
            )
            .await?;
        Ok(hash)
    }

    /// Re-query every stealth account of `index`. Accounts the ledger
    /// cannot answer for keep their previous state. The caller holds the
    /// index lock.
    async fn refresh_balances(&self, index: u32) -> Result<(), WalletError> {
        let addresses: Vec<String> = self
            .snapshot(index)?
            .stealth_accounts
            .iter()
            .map(|a| a.address.clone())
            .collect();

        let mut states = Vec::with_capacity(addresses.len());
        for address in addresses {
            match self
                .bounded(self.ledger.account_state(&address), LedgerError::Timeout)
                .await
            {
                Ok(state) => states.push((address, state)),
                Err(e) => warn!(index, address = %address, "balance refresh failed: {e}"),
            }
        }
        if states.is_empty() {
            return Ok(());
        }
        self.update(index, move |p| {
            for (address, state) in &states {
                if let Some(a) = p.account_mut(address) {
                    a.apply_state(state.as_ref());
                }
            }
        })
        .await?;
        Ok(())
    }

    // --- Sending to pseudonyms ---

    /// Decode a `nnym_` address and derive a fresh one-time account for it.
    /// The caller pays [`StealthPayment::address`] and then publishes a
    /// notification with [`publish_notification`](Self::publish_notification).
    pub fn prepare_payment(&self, address: &str) -> Result<StealthPayment, WalletError> {
        let recipient = NanoNymAddress::decode(address)?;
        Ok(StealthPayment::new(&recipient)?)
    }

    /// Announce a completed payment to `recipient`, signed with the notify
    /// key of our pseudonym `sender_index`.
    pub async fn publish_notification(
        &self,
        sender_index: u32,
        recipient: &NanoNymAddress,
        notification: &PaymentNotification,
    ) -> Result<DeliveryReport, WalletError> {
        notification.validate()?;
        let sender = self.snapshot(sender_index)?.keys.notify;
        let payload = notification.to_json();
        let report = self
            .bounded(
                self.channel.publish(&payload, &sender, &recipient.notify_public()),
                ChannelError::Timeout,
            )
            .await?;
        if !report.delivered() {
            return Err(ChannelError::Publish("no relay accepted the notification".into()).into());
        }
        info!(sender_index, accepted = report.accepted, rejected = report.rejected, "notification published");
        Ok(report)
    }

    // --- Internals ---

    async fn subscribe(&self, pseudonym: &Pseudonym) -> Result<(), WalletError> {
        let notify_public = pseudonym.keys.notify.public_key();
        self.routes.insert(notify_public, pseudonym.index);
        let subscribed = self
            .bounded(
                self.channel.subscribe(&pseudonym.keys.notify, self.inbound_tx.clone()),
                ChannelError::Timeout,
            )
            .await;
        match subscribed {
            Ok(id) => {
                self.subscriptions.insert(pseudonym.index, id);
                debug!(index = pseudonym.index, subscription = id, "monitoring notify key");
                Ok(())
            }
            Err(e) => {
                self.routes.remove(&notify_public);
                Err(e.into())
            }
        }
    }

    async fn unsubscribe(&self, pseudonym: &Pseudonym) {
        self.routes.remove(&pseudonym.keys.notify.public_key());
        if let Some((_, id)) = self.subscriptions.remove(&pseudonym.index) {
            if let Err(e) = self
                .bounded(self.channel.unsubscribe(id), ChannelError::Timeout)
                .await
            {
                warn!(index = pseudonym.index, "unsubscribe failed: {e}");
            }
        }
    }

    fn index_lock(&self, index: u32) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.index_locks.entry(index).or_default())
    }

    fn snapshot(&self, index: u32) -> Result<Pseudonym, WalletError> {
        self.pseudonym(index).ok_or(WalletError::PseudonymNotFound(index))
    }

    /// Mutate the in-memory record, then write it through. The caller
    /// holds the index lock.
    async fn update<F>(&self, index: u32, f: F) -> Result<Pseudonym, WalletError>
    where
        F: FnOnce(&mut Pseudonym) + Send,
    {
        let updated = {
            let mut map = self.pseudonyms.write();
            let pseudonym = map.get_mut(&index).ok_or(WalletError::PseudonymNotFound(index))?;
            f(pseudonym);
            pseudonym.clone()
        };
        self.persist(&updated).await?;
        Ok(updated)
    }

    async fn persist(&self, pseudonym: &Pseudonym) -> Result<(), WalletError> {
        self.bounded(self.store.save(pseudonym), StoreError::Timeout).await?;
        Ok(())
    }

    /// Bound a collaborator call by the configured timeout.
    async fn bounded<T, E>(
        &self,
        call: impl Future<Output = Result<T, E>>,
        timed_out: E,
    ) -> Result<T, E> {
        tokio::time::timeout(self.config.ledger_timeout(), call)
            .await
            .unwrap_or(Err(timed_out))
    }

    fn emit(&self, event: ManagerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_event_maps_to_error() {
        let event = ManagerEvent::OpenExhausted {
            index: 2,
            address: "nano_x".into(),
            attempts: 12,
        };
        assert_eq!(
            event.into_error(),
            Some(WalletError::OpenExhausted {
                address: "nano_x".into(),
                attempts: 12,
            })
        );
    }

    #[test]
    fn other_events_are_not_errors() {
        let event = ManagerEvent::AccountOpened {
            index: 0,
            address: "nano_x".into(),
            block_hash: "AB".into(),
        };
        assert_eq!(event.into_error(), None);
    }
}
