//! Bounded retry records for background account opening.
//!
//! A discovered stealth account that could not be opened right away (wallet
//! locked, node unreachable) gets an [`OpenRetry`] record. A periodic tick
//! hands out the records whose delay has elapsed; each failure doubles the
//! delay up to a cap, and after `max_attempts` failures the record is
//! removed and returned to the caller as exhausted.
//!
//! All methods take the current [`Instant`] explicitly so schedules can be
//! tested without sleeping.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nanonym_core::constants::OPEN_RETRY_MAX_ATTEMPTS;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Spacing and ceiling for open attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    #[serde(with = "secs")]
    pub base_delay: Duration,
    #[serde(with = "secs")]
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(600),
            max_attempts: OPEN_RETRY_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failures`-th failure: `base · 2^(failures-1)`, capped.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Durations as whole seconds in config files.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// One pending open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRetry {
    pub address: String,
    pub parent_index: u32,
    /// Failed attempts so far.
    pub attempts: u32,
    pub next_eligible: Instant,
    pub last_error: Option<String>,
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Rescheduled { attempts: u32, next_eligible: Instant },
    /// Ceiling reached; the record has been dropped from the queue.
    Exhausted(OpenRetry),
    /// The address was not queued.
    Unknown,
}

/// Pending opens keyed by stealth account address.
#[derive(Debug)]
pub struct RetryQueue {
    policy: RetryPolicy,
    items: HashMap<String, OpenRetry>,
}

impl RetryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            items: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Queue an address, eligible immediately. Returns `false` if it was
    /// already queued.
    pub fn enqueue(&mut self, address: &str, parent_index: u32, now: Instant) -> bool {
        if self.items.contains_key(address) {
            return false;
        }
        self.items.insert(
            address.to_string(),
            OpenRetry {
                address: address.to_string(),
                parent_index,
                attempts: 0,
                next_eligible: now,
                last_error: None,
            },
        );
        true
    }

    /// Hand out every record due at `now`.
    ///
    /// Each returned record is pushed back by the delay it would get on
    /// failure, so an attempt still in flight at the next tick is not
    /// dispatched twice.
    pub fn tick(&mut self, now: Instant) -> Vec<OpenRetry> {
        let mut due = Vec::new();
        for item in self.items.values_mut() {
            if item.next_eligible <= now {
                due.push(item.clone());
                item.next_eligible = now + self.policy.delay_for(item.attempts + 1);
            }
        }
        due.sort_by(|a, b| a.address.cmp(&b.address));
        due
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self, address: &str, error: &str, now: Instant) -> RetryOutcome {
        let Some(item) = self.items.get_mut(address) else {
            return RetryOutcome::Unknown;
        };
        item.attempts += 1;
        item.last_error = Some(error.to_string());
        if item.attempts >= self.policy.max_attempts {
            return match self.items.remove(address) {
                Some(item) => RetryOutcome::Exhausted(item),
                None => RetryOutcome::Unknown,
            };
        }
        item.next_eligible = now + self.policy.delay_for(item.attempts);
        debug!(address, attempts = item.attempts, "open attempt failed, rescheduled");
        RetryOutcome::Rescheduled {
            attempts: item.attempts,
            next_eligible: item.next_eligible,
        }
    }

    /// Drop a record once the account is open or opening was abandoned.
    pub fn remove(&mut self, address: &str) -> Option<OpenRetry> {
        self.items.remove(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.items.contains_key(address)
    }

    pub fn get(&self, address: &str) -> Option<&OpenRetry> {
        self.items.get(address)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
