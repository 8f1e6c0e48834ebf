// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Custody Protocol: Shared Primitives
//!
//! The vocabulary every other crate in the workspace speaks. Nothing in here
//! moves money; it only describes who holds it, how much of it there is, and
//! what happened to it.
//!
//! ## Modules
//!
//! - **identity**: 20-byte account addresses, hex-encoded on the wire.
//! - **amount**: Base-unit amounts with 18 decimals and checked arithmetic.
//! - **event**: The `Deposit` / `Withdrawal` notifications a ledger emits.
//! - **config**: Protocol constants and runtime ledger policy.
//!
//! ## Design Philosophy
//!
//! 1. Money is an integer. Decimals are for humans, never for arithmetic.
//! 2. Every public type is serializable so it can cross the API boundary
//!    unchanged.
//! 3. If it touches money, it has tests.

pub mod amount;
pub mod config;
pub mod event;
pub mod identity;

pub use amount::{Amount, AmountError};
pub use config::VaultConfig;
pub use event::{EventRecord, VaultEvent};
pub use identity::{Address, AddressError};
