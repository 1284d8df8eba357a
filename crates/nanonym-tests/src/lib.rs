//! Integration test suite for NanoNym.
//!
//! `helpers` provides in-memory stand-ins for the ledger node and the
//! notification relay so whole wallets can be driven end to end without
//! any network.

pub mod helpers;
