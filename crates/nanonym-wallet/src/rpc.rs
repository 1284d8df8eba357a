//! Nano node JSON RPC ledger adapter.

use std::time::Duration;

use async_trait::async_trait;
use nanonym_core::Raw;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::LedgerError;
use crate::traits::{AccountState, LedgerQuery};

/// Error string the node returns for accounts without blocks.
const ACCOUNT_NOT_FOUND: &str = "Account not found";

#[derive(Deserialize)]
struct AccountInfoResponse {
    balance: Raw,
    open_block: Option<String>,
    #[serde(default)]
    receivable: Option<Raw>,
    #[serde(default)]
    pending: Option<Raw>,
}

/// [`LedgerQuery`] over a node's `account_info` action.
pub struct RpcLedger {
    client: Client,
    endpoint: String,
}

impl RpcLedger {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Permanent(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, body: Value) -> Result<Value, LedgerError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Timeout
                } else {
                    LedgerError::Transient(e.to_string())
                }
            })?;

        if resp.status().is_server_error() {
            return Err(LedgerError::Transient(format!("node returned {}", resp.status())));
        }
        resp.json()
            .await
            .map_err(|e| LedgerError::Transient(format!("invalid response body: {e}")))
    }
}

/// Interpret an `account_info` reply.
pub fn parse_account_info(resp: &Value) -> Result<Option<AccountState>, LedgerError> {
    if let Some(err) = resp.get("error").and_then(Value::as_str) {
        if err == ACCOUNT_NOT_FOUND {
            return Ok(None);
        }
        return Err(LedgerError::Permanent(err.to_string()));
    }
    let info: AccountInfoResponse = serde_json::from_value(resp.clone())
        .map_err(|e| LedgerError::Permanent(format!("unexpected account_info reply: {e}")))?;
    Ok(Some(AccountState {
        balance: info.balance,
        open_block: info.open_block,
        // Older nodes only report `pending`.
        receivable: info.receivable.or(info.pending),
    }))
}

#[async_trait]
impl LedgerQuery for RpcLedger {
    async fn account_state(&self, address: &str) -> Result<Option<AccountState>, LedgerError> {
        let body = json!({
            "action": "account_info",
            "account": address,
            "receivable": "true",
        });
        let resp = self.call(body).await?;
        let state = parse_account_info(&resp)?;
        debug!(address, opened = state.as_ref().is_some_and(|s| s.open_block.is_some()), "account_info");
        Ok(state)
    }
}
