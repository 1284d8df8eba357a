//! Stealth account selection for spending.
//!
//! Every stealth account is a separate ledger account, so paying from more
//! than one of them links those accounts on-chain. The selector therefore
//! minimizes the number of accounts rather than leftover change:
//!
//! 1. Drop accounts with no effective balance.
//! 2. Use the first account (in input order) that covers the target alone.
//! 3. Otherwise take accounts largest-first until the target is covered.
//! 4. Shuffle a multi-account result so broadcast order leaks nothing.

use nanonym_core::Raw;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::types::StealthAccount;

/// Accounts chosen to fund a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSelectionResult {
    pub accounts: Vec<StealthAccount>,
    pub total_balance: Raw,
    pub requires_multiple_accounts: bool,
}

impl AccountSelectionResult {
    /// The empty result, signalling insufficient funds.
    pub fn empty() -> Self {
        Self {
            accounts: Vec::new(),
            total_balance: Raw::ZERO,
            requires_multiple_accounts: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// How much a send reveals about common ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PrivacyImpact {
    pub account_count: usize,
    pub level: PrivacyLevel,
    pub description: String,
}

/// Minimum-account selector with randomized ordering.
pub struct AccountSelector;

impl AccountSelector {
    /// Select accounts covering `target` using the thread RNG for ordering.
    pub fn select(target: Raw, candidates: &[StealthAccount]) -> AccountSelectionResult {
        Self::select_with_rng(target, candidates, &mut rand::thread_rng())
    }

    /// Select accounts covering `target`, shuffling with `rng`.
    pub fn select_with_rng<R: Rng + ?Sized>(
        target: Raw,
        candidates: &[StealthAccount],
        rng: &mut R,
    ) -> AccountSelectionResult {
        let funded: Vec<&StealthAccount> = candidates
            .iter()
            .filter(|a| !a.effective_balance().is_zero())
            .collect();

        if let Some(single) = funded.iter().find(|a| a.effective_balance() >= target) {
            return AccountSelectionResult {
                total_balance: single.effective_balance(),
                accounts: vec![(*single).clone()],
                requires_multiple_accounts: false,
            };
        }

        let available = Self::total_balance(candidates);
        if available < target {
            debug!(%available, %target, "insufficient funds across stealth accounts");
            return AccountSelectionResult::empty();
        }

        let mut ordered = funded;
        // Stable sort keeps input order among equal balances.
        ordered.sort_by(|a, b| b.effective_balance().cmp(&a.effective_balance()));

        let mut selected = Vec::new();
        let mut accumulated = Raw::ZERO;
        for account in ordered {
            if accumulated >= target {
                break;
            }
            accumulated = accumulated.saturating_add(account.effective_balance());
            selected.push(account.clone());
        }

        selected.shuffle(rng);
        debug!(count = selected.len(), %accumulated, "selected multiple stealth accounts");
        AccountSelectionResult {
            requires_multiple_accounts: selected.len() > 1,
            accounts: selected,
            total_balance: accumulated,
        }
    }

    /// Sum of effective balances.
    pub fn total_balance(accounts: &[StealthAccount]) -> Raw {
        accounts.iter().map(StealthAccount::effective_balance).sum()
    }

    /// Qualitative linkage cost of a selection.
    pub fn privacy_impact(result: &AccountSelectionResult) -> PrivacyImpact {
        let account_count = result.accounts.len();
        let (level, description) = match account_count {
            0 | 1 => (PrivacyLevel::High, "no accounts are linked".to_string()),
            2..=3 => (
                PrivacyLevel::Medium,
                format!("{account_count} stealth accounts will be linked on-chain"),
            ),
            _ => (
                PrivacyLevel::Low,
                format!("{account_count} stealth accounts will be linked on-chain; consider smaller sends"),
            ),
        };
        PrivacyImpact {
            account_count,
            level,
            description,
        }
    }
}
