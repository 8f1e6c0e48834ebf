//! # Protocol Configuration & Constants
//!
//! Every magic number in the custody ledger lives here, next to the one
//! runtime knob set ([`VaultConfig`]) the node is allowed to turn.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The ledger protocol version reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Denomination
// ---------------------------------------------------------------------------

/// Number of decimal places between a base unit and one whole coin.
///
/// 18, same as wei to ether. Display only; arithmetic happens in base units.
pub const AMOUNT_DECIMALS: u32 = 18;

/// Base units per whole coin (`10^AMOUNT_DECIMALS`).
pub const UNITS_PER_COIN: u128 = 1_000_000_000_000_000_000;

/// Ticker shown next to formatted amounts.
pub const COIN_SYMBOL: &str = "ETH";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Account addresses are 20 bytes, rendered as 40 hex characters.
pub const ADDRESS_LENGTH: usize = 20;

/// Prefix used when displaying addresses.
pub const ADDRESS_PREFIX: &str = "0x";

// ---------------------------------------------------------------------------
// Ledger Policy
// ---------------------------------------------------------------------------

/// Default bound on how deeply payouts may re-enter the ledger.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Events a long-running node keeps in memory by default. Older events are
/// dropped from the in-memory log; their sequence numbers are never reused.
pub const DEFAULT_NODE_EVENT_RETENTION: usize = 10_000;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default port for the REST / JSON-RPC API.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Broadcast buffer for live event streaming to WebSocket clients.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Number of deterministic signers the devnet hands out.
pub const DEVNET_SIGNER_COUNT: usize = 10;

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Runtime policy for a ledger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Reject `deposit` calls that attach no value.
    ///
    /// Off by default: a zero deposit is accepted, changes nothing, and still
    /// emits `Deposit(caller, 0)`.
    pub reject_zero_deposits: bool,

    /// How many withdrawals may be nested inside a running payout.
    ///
    /// Top-level calls are never limited. `0` forbids re-entrant withdrawals
    /// while still allowing every ordinary one.
    pub max_call_depth: usize,

    /// How many committed events to keep in memory. `0` keeps all of them.
    pub event_retention: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            reject_zero_deposits: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            event_retention: 0,
        }
    }
}
