//! Shared test helpers for E2E and integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nanonym_core::keys::{NotifyKeyPair, Seed};
use nanonym_core::stealth::{self, StealthKeyPair};
use nanonym_core::Raw;
use nanonym_wallet::{
    AccountState, ChannelError, Collaborators, DeliveryReport, InboundMessage, LedgerError,
    LedgerQuery, LedgerSubmit, ManagerConfig, ManagerEvent, MemoryStore, NotificationChannel,
    Pseudonym, PseudonymStore, RetryPolicy, StealthAccountManager, StoreError, SubscriptionId,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

/// A send block recorded by [`MockLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBlock {
    pub from: String,
    pub to: String,
    pub amount: Raw,
    pub hash: String,
}

/// In-memory ledger node answering queries and accepting blocks.
///
/// Payments made with [`pay`](Self::pay) sit as receivable sends until the
/// recipient publishes a receive block for them.
#[derive(Default)]
pub struct MockLedger {
    accounts: Mutex<HashMap<String, AccountState>>,
    /// Source tx hash -> (destination, amount) for unreceived sends.
    receivable: Mutex<HashMap<String, (String, Raw)>>,
    query_failure: Mutex<Option<LedgerError>>,
    receive_failures: Mutex<HashMap<String, LedgerError>>,
    /// Start failing queries right after a receive block is accepted.
    lag_after_receive: AtomicBool,
    /// Fail every send once this many have succeeded.
    send_limit: Mutex<Option<usize>>,
    sends: Mutex<Vec<SentBlock>>,
    receives: Mutex<Vec<String>>,
    next_hash: AtomicU64,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn block_hash(&self) -> String {
        format!("{:064X}", self.next_hash.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Send `amount` from an outside account to `address`. Returns the
    /// send block hash the payer would announce.
    pub fn pay(&self, address: &str, amount: Raw) -> String {
        let hash = self.block_hash();
        self.receivable
            .lock()
            .insert(hash.clone(), (address.to_string(), amount));
        hash
    }

    /// Put `address` on the ledger as an opened account.
    pub fn open_with_balance(&self, address: &str, balance: Raw) {
        let open_block = self.block_hash();
        self.accounts.lock().insert(
            address.to_string(),
            AccountState {
                balance,
                open_block: Some(open_block),
                receivable: None,
            },
        );
    }

    pub fn balance(&self, address: &str) -> Option<Raw> {
        self.accounts.lock().get(address).map(|s| s.balance)
    }

    pub fn fail_queries(&self, error: Option<LedgerError>) {
        *self.query_failure.lock() = error;
    }

    pub fn fail_receive_for(&self, address: &str, error: LedgerError) {
        self.receive_failures.lock().insert(address.to_string(), error);
    }

    /// After the next accepted receive, answer queries with a transient
    /// error until [`fail_queries`](Self::fail_queries) clears it.
    pub fn lag_after_receive(&self, lag: bool) {
        self.lag_after_receive.store(lag, Ordering::SeqCst);
    }

    pub fn limit_sends(&self, limit: Option<usize>) {
        *self.send_limit.lock() = limit;
    }

    pub fn sends(&self) -> Vec<SentBlock> {
        self.sends.lock().clone()
    }

    pub fn receive_count(&self) -> usize {
        self.receives.lock().len()
    }
}

fn check_signature(keys: &StealthKeyPair, message: &[u8]) -> Result<(), LedgerError> {
    let signature = keys
        .sign(message)
        .map_err(|e| LedgerError::Permanent(format!("cannot sign: {e}")))?;
    stealth::verify(&keys.public_key(), message, &signature)
        .map_err(|_| LedgerError::Permanent("bad block signature".into()))
}

#[async_trait]
impl LedgerQuery for MockLedger {
    async fn account_state(&self, address: &str) -> Result<Option<AccountState>, LedgerError> {
        if let Some(err) = self.query_failure.lock().clone() {
            return Err(err);
        }
        Ok(self.accounts.lock().get(address).cloned())
    }
}

#[async_trait]
impl LedgerSubmit for MockLedger {
    async fn submit_receive_block(
        &self,
        keys: &StealthKeyPair,
        source_tx: &str,
    ) -> Result<String, LedgerError> {
        let address = keys.account();
        if let Some(err) = self.receive_failures.lock().get(&address).cloned() {
            return Err(err);
        }
        check_signature(keys, source_tx.as_bytes())?;

        let (destination, amount) = self
            .receivable
            .lock()
            .remove(source_tx)
            .ok_or_else(|| LedgerError::Permanent(format!("unknown source block {source_tx}")))?;
        if destination != address {
            return Err(LedgerError::Permanent("source block pays another account".into()));
        }

        let hash = self.block_hash();
        let mut accounts = self.accounts.lock();
        let state = accounts.entry(address.clone()).or_insert(AccountState {
            balance: Raw::ZERO,
            open_block: None,
            receivable: None,
        });
        state.balance = state.balance.saturating_add(amount);
        state.open_block.get_or_insert_with(|| hash.clone());
        self.receives.lock().push(address);
        if self.lag_after_receive.swap(false, Ordering::SeqCst) {
            *self.query_failure.lock() = Some(LedgerError::Transient("node behind".into()));
        }
        Ok(hash)
    }

    async fn submit_send_block(
        &self,
        keys: &StealthKeyPair,
        destination: &str,
        amount: Raw,
    ) -> Result<String, LedgerError> {
        if let Some(limit) = *self.send_limit.lock() {
            if self.sends.lock().len() >= limit {
                return Err(LedgerError::Transient("connection reset".into()));
            }
        }
        let from = keys.account();
        check_signature(keys, destination.as_bytes())?;

        {
            let mut accounts = self.accounts.lock();
            let state = accounts
                .get_mut(&from)
                .filter(|s| s.open_block.is_some())
                .ok_or_else(|| LedgerError::Permanent("account not opened".into()))?;
            state.balance = state
                .balance
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::Permanent("balance too low".into()))?;
        }

        let hash = self.block_hash();
        self.sends.lock().push(SentBlock {
            from,
            to: destination.to_string(),
            amount,
            hash: hash.clone(),
        });
        Ok(hash)
    }
}

/// In-memory relay that forwards published payloads to every subscriber
/// of the recipient's notify key.
#[derive(Default)]
pub struct MockChannel {
    subscriptions: Mutex<HashMap<SubscriptionId, ([u8; 32], mpsc::Sender<InboundMessage>)>>,
    next_id: AtomicU64,
    reject_publish: AtomicBool,
    /// Deliver every message twice, as redundant relays would.
    duplicate: AtomicBool,
    published: Mutex<Vec<(String, [u8; 32])>>,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn is_subscribed(&self, notify_public: &[u8; 32]) -> bool {
        self.subscriptions
            .lock()
            .values()
            .any(|(key, _)| key == notify_public)
    }

    pub fn reject_publish(&self, reject: bool) {
        self.reject_publish.store(reject, Ordering::SeqCst);
    }

    pub fn duplicate_delivery(&self, duplicate: bool) {
        self.duplicate.store(duplicate, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, [u8; 32])> {
        self.published.lock().clone()
    }

    /// Hand `payload` to every subscriber of `recipient_notify`.
    pub async fn deliver(&self, recipient_notify: &[u8; 32], payload: &str) -> usize {
        let sinks: Vec<mpsc::Sender<InboundMessage>> = self
            .subscriptions
            .lock()
            .values()
            .filter(|(key, _)| key == recipient_notify)
            .map(|(_, sink)| sink.clone())
            .collect();
        let copies = if self.duplicate.load(Ordering::SeqCst) { 2 } else { 1 };

        let mut delivered = 0;
        for sink in sinks {
            for _ in 0..copies {
                let message = InboundMessage {
                    recipient_notify: *recipient_notify,
                    payload: payload.to_string(),
                };
                if sink.send(message).await.is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }
}

#[async_trait]
impl NotificationChannel for MockChannel {
    async fn subscribe(
        &self,
        keys: &NotifyKeyPair,
        sink: mpsc::Sender<InboundMessage>,
    ) -> Result<SubscriptionId, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().insert(id, (keys.public_key(), sink));
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ChannelError> {
        self.subscriptions.lock().remove(&id);
        Ok(())
    }

    async fn publish(
        &self,
        payload: &str,
        _sender: &NotifyKeyPair,
        recipient_notify: &[u8; 32],
    ) -> Result<DeliveryReport, ChannelError> {
        if self.reject_publish.load(Ordering::SeqCst) {
            return Ok(DeliveryReport {
                accepted: 0,
                rejected: 1,
            });
        }
        self.published
            .lock()
            .push((payload.to_string(), *recipient_notify));
        self.deliver(recipient_notify, payload).await;
        Ok(DeliveryReport {
            accepted: 1,
            rejected: 0,
        })
    }
}

/// Memory store whose saves can be switched to fail.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_saves: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            fail_saves: AtomicBool::new(false),
        })
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// The last successfully saved copy of pseudonym `index`.
    pub fn saved(&self, index: u32) -> Option<Pseudonym> {
        self.inner.get(index)
    }
}

#[async_trait]
impl PseudonymStore for FlakyStore {
    async fn load_all(&self) -> Result<Vec<Pseudonym>, StoreError> {
        self.inner.load_all().await
    }

    async fn save(&self, pseudonym: &Pseudonym) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io("no space left on device".into()));
        }
        self.inner.save(pseudonym).await
    }
}

/// Config with immediate retries and short timeouts.
pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        ledger_timeout_ms: 2_000,
        retry_tick_ms: 10,
        retry: RetryPolicy {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: 12,
        },
        ..ManagerConfig::default()
    }
}

pub fn test_seed(byte: u8) -> Seed {
    Seed::from_bytes(&[byte; 32]).unwrap()
}

/// A manager wired to mocks, with handles to each mock.
pub struct TestWallet {
    pub manager: Arc<StealthAccountManager>,
    pub ledger: Arc<MockLedger>,
    pub channel: Arc<MockChannel>,
    pub store: Arc<dyn PseudonymStore>,
}

/// Wallet with its own ledger, relay and memory store.
pub fn test_wallet(seed_byte: u8) -> TestWallet {
    wallet_on(
        test_seed(seed_byte),
        test_config(),
        MockLedger::new(),
        MockChannel::new(),
        Arc::new(MemoryStore::new()),
    )
}

/// Wallet sharing the given ledger, relay and store.
pub fn wallet_on(
    seed: Seed,
    config: ManagerConfig,
    ledger: Arc<MockLedger>,
    channel: Arc<MockChannel>,
    store: Arc<dyn PseudonymStore>,
) -> TestWallet {
    let manager = StealthAccountManager::new(
        seed,
        config,
        Collaborators {
            ledger: ledger.clone(),
            submitter: ledger.clone(),
            channel: channel.clone(),
            store: store.clone(),
        },
    );
    TestWallet {
        manager,
        ledger,
        channel,
        store,
    }
}

/// Wait for the first event matching `pred`, failing after five seconds.
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<ManagerEvent>, mut pred: F) -> ManagerEvent
where
    F: FnMut(&ManagerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for manager event")
}
