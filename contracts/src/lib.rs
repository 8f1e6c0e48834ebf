// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Custody Contracts
//!
//! The ledger logic. One contract lives here:
//!
//! - **SimpleVault**: accepts deposits, tracks a balance per account and a
//!   running total, and lets each account withdraw up to what it holds.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. `checked_add` and
//!    `checked_sub` everywhere, because wrapping arithmetic and money do not
//!    mix.
//! 2. Checks, then effects, then interactions. A withdrawal debits the
//!    account before any value leaves the vault.
//! 3. A call either applies completely or not at all. Failed payouts roll
//!    back through the journal, nested re-entrant calls included.
//! 4. Every public type is serializable (serde) for the API boundary.

pub mod journal;
pub mod payout;
pub mod simple_vault;

pub use payout::{ExternalLedger, NoopPayout, Payout, PayoutError};
pub use simple_vault::{SimpleVault, VaultError, VaultSnapshot};
