//! # Ledger Notifications
//!
//! A ledger emits exactly one [`VaultEvent`] per successful mutating call,
//! after the state change has been applied. Failed calls emit nothing.
//!
//! Each emitted event is wrapped in an [`EventRecord`] carrying its position
//! in the ledger's event log and the wall-clock time it was recorded. The
//! sequence number is dense: the `n`-th committed event has sequence `n`,
//! starting at zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::identity::Address;

/// An observable state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEvent {
    /// `account` deposited exactly `amount`.
    Deposit { account: Address, amount: Amount },
    /// `account` withdrew exactly `amount`.
    Withdrawal { account: Address, amount: Amount },
}

impl VaultEvent {
    /// The account the event is about.
    pub fn account(&self) -> &Address {
        match self {
            VaultEvent::Deposit { account, .. } | VaultEvent::Withdrawal { account, .. } => account,
        }
    }

    /// The amount moved.
    pub fn amount(&self) -> Amount {
        match self {
            VaultEvent::Deposit { amount, .. } | VaultEvent::Withdrawal { amount, .. } => *amount,
        }
    }

    /// Short event name, as it appears in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            VaultEvent::Deposit { .. } => "Deposit",
            VaultEvent::Withdrawal { .. } => "Withdrawal",
        }
    }
}

impl fmt::Display for VaultEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.name(), self.account(), self.amount())
    }
}

/// A committed event and its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Zero-based position in the ledger's event log.
    pub sequence: u64,
    /// The event itself.
    #[serde(flatten)]
    pub event: VaultEvent,
    /// When the ledger recorded the event.
    pub emitted_at: DateTime<Utc>,
}
