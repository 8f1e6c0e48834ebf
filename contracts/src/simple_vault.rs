//! # SimpleVault
//!
//! A custodial balance book. Callers deposit value, the vault records it
//! against their address, and each caller may withdraw up to exactly what
//! the vault holds for them.
//!
//! ## State
//!
//! ```text
//! balances:       Address -> Amount     (absent == zero)
//! total_deposits: Amount                == sum(balances), always
//! events:         [EventRecord]         one per successful mutation
//! ```
//!
//! Both numbers change together inside a single method, never from two
//! places, so the total cannot drift from the sum of balances.
//!
//! ## Withdrawal ordering
//!
//! 1. **Checks**: amount is non-zero, balance covers it.
//! 2. **Effects**: balance and total are debited.
//! 3. **Interaction**: the [`Payout`] delivers the value. It may call back
//!    into the vault; any such call sees the already-debited balance.
//! 4. **Event**: `Withdrawal(caller, amount)` is emitted once the payout
//!    returns successfully.
//!
//! If the payout fails, every change since step 2 is unwound through the
//! [`Journal`], nested calls included, and no event survives.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use custody_protocol::{Address, Amount, EventRecord, VaultConfig, VaultEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::journal::{Checkpoint, Journal, JournalEntry};
use crate::payout::{Payout, PayoutError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during vault operations.
///
/// Every variant aborts the call with the vault unchanged.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Withdrawal requested for zero.
    #[error("Withdrawal amount must be greater than 0")]
    InvalidAmount,

    /// Withdrawal requested for more than the caller holds.
    #[error("Insufficient balance")]
    InsufficientBalance {
        /// Amount the caller asked for.
        requested: Amount,
        /// Amount the caller holds.
        available: Amount,
    },

    /// Deposit attached no value and the vault is configured to refuse that.
    #[error("Deposit amount must be greater than 0")]
    ZeroDeposit,

    /// The credit would push a balance or the total past `u128::MAX`.
    #[error("amount overflow: operation would exceed representable value")]
    AmountOverflow,

    /// The outbound transfer failed; the withdrawal was rolled back.
    #[error("transfer of {amount} to {recipient} failed")]
    TransferFailed {
        /// Intended recipient.
        recipient: Address,
        /// Amount that was being sent.
        amount: Amount,
        /// What went wrong.
        #[source]
        source: PayoutError,
    },

    /// Re-entrant withdrawals nested deeper than the configured limit.
    #[error("call depth exceeded: limit is {max}")]
    CallDepthExceeded {
        /// The configured limit.
        max: usize,
    },
}

impl VaultError {
    /// `true` for errors the caller fixes by changing its request, as opposed
    /// to failures on the recipient's side.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, VaultError::TransferFailed { .. })
    }

    /// Stable snake_case name of the variant, for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::InvalidAmount => "invalid_amount",
            VaultError::InsufficientBalance { .. } => "insufficient_balance",
            VaultError::ZeroDeposit => "zero_deposit",
            VaultError::AmountOverflow => "amount_overflow",
            VaultError::TransferFailed { .. } => "transfer_failed",
            VaultError::CallDepthExceeded { .. } => "call_depth_exceeded",
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of the vault's books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    /// Funded accounts, ordered by address. Zero balances are omitted.
    pub balances: BTreeMap<Address, Amount>,
    /// Aggregate of all balances.
    pub total_deposits: Amount,
    /// Number of events committed so far.
    pub event_count: u64,
}

// ---------------------------------------------------------------------------
// SimpleVault
// ---------------------------------------------------------------------------

/// The ledger.
///
/// # Examples
///
/// ```
/// use custody_contracts::{NoopPayout, SimpleVault};
/// use custody_protocol::{Address, Amount};
///
/// let mut vault = SimpleVault::new();
/// let alice = Address::derive("alice");
///
/// vault.deposit(&alice, Amount::from_coins(2)).unwrap();
/// vault.withdraw(&alice, Amount::from_coins(2), &mut NoopPayout).unwrap();
///
/// assert_eq!(vault.get_balance(&alice), Amount::ZERO);
/// assert_eq!(vault.get_total_deposits(), Amount::ZERO);
/// ```
#[derive(Debug, Clone)]
pub struct SimpleVault {
    config: VaultConfig,
    balances: HashMap<Address, Amount>,
    total_deposits: Amount,
    events: Vec<EventRecord>,
    /// Sequence number of `events[0]`; non-zero once old events are pruned.
    first_sequence: u64,
    journal: Journal,
    /// Number of withdrawals whose payout is currently running.
    call_depth: usize,
}

impl SimpleVault {
    /// Creates an empty vault with the default policy.
    pub fn new() -> Self {
        Self::with_config(VaultConfig::default())
    }

    /// Creates an empty vault with an explicit policy.
    pub fn with_config(config: VaultConfig) -> Self {
        Self {
            config,
            balances: HashMap::new(),
            total_deposits: Amount::ZERO,
            events: Vec::new(),
            first_sequence: 0,
            journal: Journal::new(),
            call_depth: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Credits `value` to `caller`.
    ///
    /// `value` is the amount transferred in with the call. Returns the
    /// caller's new balance and emits `Deposit(caller, value)`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::ZeroDeposit`] for a zero value when
    /// `reject_zero_deposits` is set, and [`VaultError::AmountOverflow`] if
    /// the balance or total would overflow.
    pub fn deposit(&mut self, caller: &Address, value: Amount) -> Result<Amount, VaultError> {
        if value.is_zero() && self.config.reject_zero_deposits {
            return Err(VaultError::ZeroDeposit);
        }

        let balance = self
            .get_balance(caller)
            .checked_add(value)
            .ok_or(VaultError::AmountOverflow)?;
        let total = self
            .total_deposits
            .checked_add(value)
            .ok_or(VaultError::AmountOverflow)?;

        self.set_balance(*caller, balance);
        self.set_total(total);
        self.emit(VaultEvent::Deposit {
            account: *caller,
            amount: value,
        });

        tracing::debug!(
            account = %caller,
            amount = %value,
            balance = %balance,
            total = %total,
            "deposit accepted"
        );
        Ok(balance)
    }

    /// Debits `amount` from `caller` and sends it out through `payout`.
    ///
    /// Withdrawing the entire balance is allowed and leaves the account at
    /// zero. Returns the caller's balance once the call completes and emits
    /// `Withdrawal(caller, amount)`.
    ///
    /// The debit is applied before `payout` runs, so a payout that re-enters
    /// `withdraw` for the same caller sees the reduced balance.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    ///
    /// 1. [`VaultError::InvalidAmount`] if `amount` is zero.
    /// 2. [`VaultError::InsufficientBalance`] if the balance is below `amount`.
    /// 3. [`VaultError::CallDepthExceeded`] if re-entrant nesting is too deep.
    ///
    /// If the payout fails, returns [`VaultError::TransferFailed`] after
    /// rolling back the debit and everything the payout did to the vault.
    pub fn withdraw<P>(
        &mut self,
        caller: &Address,
        amount: Amount,
        payout: &mut P,
    ) -> Result<Amount, VaultError>
    where
        P: Payout + ?Sized,
    {
        if amount.is_zero() {
            return Err(VaultError::InvalidAmount);
        }

        let available = self.get_balance(caller);
        if available < amount {
            return Err(VaultError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        // `call_depth` counts payouts already in flight, so the top-level call
        // sees 0 and the n-th re-entrant withdrawal sees n.
        if self.call_depth > self.config.max_call_depth {
            return Err(VaultError::CallDepthExceeded {
                max: self.config.max_call_depth,
            });
        }

        let remaining = available
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBalance {
                requested: amount,
                available,
            })?;
        // The total covers every balance, so this only fails if the books
        // were already broken. Treat it like an overdraft rather than panic.
        let total = self
            .total_deposits
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBalance {
                requested: amount,
                available: self.total_deposits,
            })?;

        // Effects. From here until the payout returns, changes are journaled.
        let checkpoint = self.journal.checkpoint();
        self.call_depth += 1;
        self.set_balance(*caller, remaining);
        self.set_total(total);

        // Interaction.
        let outcome = payout.pay(self, caller, amount);
        self.call_depth -= 1;

        match outcome {
            Ok(()) => {
                self.emit(VaultEvent::Withdrawal {
                    account: *caller,
                    amount,
                });
                if self.call_depth == 0 {
                    self.journal.clear();
                }

                tracing::debug!(
                    account = %caller,
                    amount = %amount,
                    total = %self.total_deposits,
                    "withdrawal completed"
                );
                Ok(self.get_balance(caller))
            }
            Err(source) => {
                self.revert_to(checkpoint);
                tracing::debug!(
                    account = %caller,
                    amount = %amount,
                    error = %source,
                    "withdrawal rolled back"
                );
                Err(VaultError::TransferFailed {
                    recipient: *caller,
                    amount,
                    source,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Balance held for `account`; zero if it was never funded.
    pub fn get_balance(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(Amount::ZERO)
    }

    /// Sum of all balances.
    pub fn get_total_deposits(&self) -> Amount {
        self.total_deposits
    }

    /// Number of accounts with a non-zero balance.
    pub fn account_count(&self) -> usize {
        self.balances.len()
    }

    /// Retained committed events, oldest first.
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Retained events with `sequence >= since`. Asking for a pruned
    /// sequence returns everything still retained.
    pub fn events_since(&self, since: u64) -> &[EventRecord] {
        let offset = since.saturating_sub(self.first_sequence);
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.events.len());
        &self.events[start..]
    }

    /// Total number of events ever committed, pruned ones included.
    pub fn event_count(&self) -> u64 {
        self.first_sequence + self.events.len() as u64
    }

    /// The most recently committed event.
    pub fn last_event(&self) -> Option<&EventRecord> {
        self.events.last()
    }

    /// Copies the books.
    pub fn snapshot(&self) -> VaultSnapshot {
        VaultSnapshot {
            balances: self.balances.iter().map(|(a, b)| (*a, *b)).collect(),
            total_deposits: self.total_deposits,
            event_count: self.event_count(),
        }
    }

    /// Recomputes the sum of balances and compares it with the running total.
    ///
    /// Linear in the number of accounts, so it is a diagnostic, not something
    /// the mutation paths call.
    pub fn verify_conservation(&self) -> bool {
        let sum = self
            .balances
            .values()
            .try_fold(Amount::ZERO, |acc, b| acc.checked_add(*b));
        sum == Some(self.total_deposits)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn journaling(&self) -> bool {
        self.call_depth > 0
    }

    fn set_balance(&mut self, account: Address, balance: Amount) {
        let previous = if balance.is_zero() {
            self.balances.remove(&account)
        } else {
            self.balances.insert(account, balance)
        };

        if self.journaling() {
            self.journal.record(JournalEntry::BalanceChanged {
                account,
                previous: previous.unwrap_or(Amount::ZERO),
            });
        }
    }

    fn set_total(&mut self, total: Amount) {
        let previous = std::mem::replace(&mut self.total_deposits, total);
        if self.journaling() {
            self.journal.record(JournalEntry::TotalChanged { previous });
        }
    }

    fn emit(&mut self, event: VaultEvent) {
        let record = EventRecord {
            sequence: self.event_count(),
            event,
            emitted_at: Utc::now(),
        };
        self.events.push(record);

        if self.journaling() {
            self.journal.record(JournalEntry::EventEmitted);
        } else {
            self.prune_events();
        }
    }

    /// Drops the oldest events once the log reaches twice the retention
    /// limit, so the cost of shifting is paid once per `retention` events.
    /// Never runs while a payout is in flight.
    fn prune_events(&mut self) {
        let retention = self.config.event_retention;
        if retention == 0 || self.events.len() < retention.saturating_mul(2) {
            return;
        }
        let excess = self.events.len() - retention;
        self.events.drain(..excess);
        self.first_sequence += excess as u64;
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) {
        for entry in self.journal.unwind(checkpoint) {
            match entry {
                JournalEntry::BalanceChanged { account, previous } => {
                    if previous.is_zero() {
                        self.balances.remove(&account);
                    } else {
                        self.balances.insert(account, previous);
                    }
                }
                JournalEntry::TotalChanged { previous } => {
                    self.total_deposits = previous;
                }
                JournalEntry::EventEmitted => {
                    self.events.pop();
                }
            }
        }
    }
}

impl Default for SimpleVault {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
