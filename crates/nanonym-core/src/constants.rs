//! Protocol constants. All monetary values in raw (1 XNO = 10^30 raw).

/// Raw units per XNO.
pub const RAW_PER_XNO: u128 = 1_000_000_000_000_000_000_000_000_000_000;

/// Number of decimal places in one XNO.
pub const XNO_DECIMALS: usize = 30;

/// Prefix of an encoded NanoNym address.
pub const NANONYM_PREFIX: &str = "nnym_";

/// Current NanoNym address version.
pub const NANONYM_VERSION: u8 = 1;

/// Encoded NanoNym payload length: version + three keys + checksum.
pub const NANONYM_PAYLOAD_LEN: usize = 1 + 32 * 3 + 2;

/// Bytes covered by the NanoNym address checksum.
pub const NANONYM_CHECKSUM_INPUT_LEN: usize = NANONYM_PAYLOAD_LEN - 2;

/// Ledger account prefix.
pub const ACCOUNT_PREFIX: &str = "nano_";

/// Legacy ledger account prefix, accepted on decode only.
pub const LEGACY_ACCOUNT_PREFIX: &str = "xrb_";

/// Derivation path purpose segment (hardened).
pub const PATH_PURPOSE: u32 = 44;

/// Ledger coin type segment (SLIP-44 registration for Nano).
pub const PATH_COIN_TYPE: u32 = 165;

/// Sub-purpose segment reserved for pseudonym keys.
pub const PATH_NANONYM: u32 = 1000;

/// Hardened derivation flag.
pub const HARDENED: u32 = 0x8000_0000;

/// Notification payload version.
pub const NOTIFICATION_VERSION: u32 = 1;

/// Protocol tag carried by every payment notification.
pub const NOTIFICATION_PROTOCOL: &str = "nanonym";

/// Default ceiling for background account-open attempts.
pub const OPEN_RETRY_MAX_ATTEMPTS: u32 = 12;
