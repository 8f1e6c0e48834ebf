//! # Ledger Service
//!
//! Owns the node's one [`SimpleVault`] together with the [`ExternalLedger`]
//! that receives its payouts. Every call takes the same lock, so the vault
//! sees a strictly serial sequence of transactions no matter how many HTTP
//! requests are in flight.
//!
//! Committed events are broadcast to subscribers while the lock is still
//! held, which keeps the live stream in sequence order.

use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use custody_contracts::{ExternalLedger, SimpleVault, VaultError};
use custody_protocol::config::EVENT_CHANNEL_CAPACITY;
use custody_protocol::{Address, Amount, EventRecord, VaultConfig};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Outcome of a committed deposit or withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// The caller.
    pub account: Address,
    /// Value moved by the call.
    pub amount: Amount,
    /// Caller's balance after the call.
    pub balance: Amount,
    /// Vault total after the call.
    pub total_deposits: Amount,
    /// Events the call committed, oldest first.
    pub events: Vec<EventRecord>,
}

/// One account as seen from both sides of the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub address: Address,
    /// Held by the vault.
    pub balance: Amount,
    /// Received from the vault so far.
    pub wallet_balance: Amount,
    pub accepts_payouts: bool,
}

/// Aggregate figures for `/status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub funded_accounts: usize,
    pub total_deposits: Amount,
    pub paid_out: Amount,
    pub event_count: u64,
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Deposit,
    Withdraw,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Deposit => "deposit",
            Operation::Withdraw => "withdraw",
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerService
// ---------------------------------------------------------------------------

struct Books {
    vault: SimpleVault,
    wallets: ExternalLedger,
}

/// Thread-safe front for the vault. Share it behind an `Arc`.
pub struct LedgerService {
    books: Mutex<Books>,
    event_tx: broadcast::Sender<EventRecord>,
    metrics: SharedMetrics,
}

impl LedgerService {
    pub fn new(config: VaultConfig, metrics: SharedMetrics) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            books: Mutex::new(Books {
                vault: SimpleVault::with_config(config),
                wallets: ExternalLedger::new(),
            }),
            event_tx,
            metrics,
        }
    }

    /// Live feed of committed events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.event_tx.subscribe()
    }

    /// Credits `value` to `caller`.
    pub fn deposit(&self, caller: &Address, value: Amount) -> Result<Receipt, VaultError> {
        self.commit(Operation::Deposit, caller, value, |books| {
            books.vault.deposit(caller, value)
        })
    }

    /// Debits `amount` from `caller` and pays it into their external wallet.
    pub fn withdraw(&self, caller: &Address, amount: Amount) -> Result<Receipt, VaultError> {
        self.commit(Operation::Withdraw, caller, amount, |books| {
            let Books { vault, wallets } = books;
            vault.withdraw(caller, amount, wallets)
        })
    }

    pub fn balance(&self, account: &Address) -> Amount {
        self.books.lock().vault.get_balance(account)
    }

    pub fn total_deposits(&self) -> Amount {
        self.books.lock().vault.get_total_deposits()
    }

    pub fn account(&self, address: &Address) -> AccountView {
        let books = self.books.lock();
        AccountView {
            address: *address,
            balance: books.vault.get_balance(address),
            wallet_balance: books.wallets.wallet_balance(address),
            accepts_payouts: books.wallets.accepts(address),
        }
    }

    pub fn status(&self) -> LedgerStatus {
        let books = self.books.lock();
        LedgerStatus {
            funded_accounts: books.vault.account_count(),
            total_deposits: books.vault.get_total_deposits(),
            paid_out: books.wallets.paid_out(),
            event_count: books.vault.event_count(),
        }
    }

    /// Retained events from sequence `since` on, at most `limit` of them.
    pub fn events_since(&self, since: u64, limit: usize) -> Vec<EventRecord> {
        let books = self.books.lock();
        books
            .vault
            .events_since(since)
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Toggles whether the external ledger accepts payouts to `address`.
    pub fn set_accepts_payouts(&self, address: &Address, accepts: bool) {
        let mut books = self.books.lock();
        if accepts {
            books.wallets.accept(address);
        } else {
            books.wallets.refuse(*address);
        }
        tracing::info!(address = %address, accepts, "payout acceptance changed");
    }

    fn commit<F>(
        &self,
        op: Operation,
        caller: &Address,
        amount: Amount,
        apply: F,
    ) -> Result<Receipt, VaultError>
    where
        F: FnOnce(&mut Books) -> Result<Amount, VaultError>,
    {
        let started = Instant::now();
        let mut books = self.books.lock();
        let before = books.vault.event_count();
        let result = apply(&mut *books).map(|balance| {
            let events = books.vault.events_since(before).to_vec();
            for record in &events {
                // No subscribers is fine.
                let _ = self.event_tx.send(record.clone());
            }

            let total_deposits = books.vault.get_total_deposits();
            self.metrics
                .funded_accounts
                .set(books.vault.account_count() as i64);
            self.metrics
                .total_deposits_coins
                .set(total_deposits.as_coins_f64());

            Receipt {
                account: *caller,
                amount,
                balance,
                total_deposits,
                events,
            }
        });
        drop(books);

        self.metrics
            .operation_latency_seconds
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => match op {
                Operation::Deposit => self.metrics.deposits_total.inc(),
                Operation::Withdraw => self.metrics.withdrawals_total.inc(),
            },
            Err(e) => {
                self.metrics.rejected_operations_total.inc();
                tracing::warn!(
                    op = op.as_str(),
                    account = %caller,
                    amount = %amount,
                    error = %e,
                    "ledger call reverted"
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use custody_protocol::VaultEvent;
    use std::sync::Arc;

    fn service() -> (LedgerService, SharedMetrics) {
        let metrics = Arc::new(NodeMetrics::new().expect("metrics"));
        (
            LedgerService::new(VaultConfig::default(), Arc::clone(&metrics)),
            metrics,
        )
    }

    #[test]
    fn withdrawal_lands_in_external_wallet() {
        let (service, _) = service();
        let alice = Address::derive("alice");

        service.deposit(&alice, Amount::from_coins(3)).unwrap();
        let receipt = service.withdraw(&alice, Amount::from_coins(1)).unwrap();

        assert_eq!(receipt.balance, Amount::from_coins(2));
        assert_eq!(receipt.total_deposits, Amount::from_coins(2));
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(receipt.events[0].sequence, 1);

        let view = service.account(&alice);
        assert_eq!(view.balance, Amount::from_coins(2));
        assert_eq!(view.wallet_balance, Amount::from_coins(1));
        assert!(view.accepts_payouts);
        assert_eq!(service.status().paid_out, Amount::from_coins(1));
    }

    #[test]
    fn refused_payout_reverts_and_counts_rejection() {
        let (service, metrics) = service();
        let bob = Address::derive("bob");

        service.deposit(&bob, Amount::from_coins(1)).unwrap();
        service.set_accepts_payouts(&bob, false);

        let err = service.withdraw(&bob, Amount::from_coins(1)).unwrap_err();
        assert!(matches!(err, VaultError::TransferFailed { .. }));
        assert_eq!(service.balance(&bob), Amount::from_coins(1));
        assert_eq!(service.status().event_count, 1);
        assert_eq!(metrics.rejected_operations_total.get(), 1);
        assert_eq!(metrics.withdrawals_total.get(), 0);

        service.set_accepts_payouts(&bob, true);
        service.withdraw(&bob, Amount::from_coins(1)).unwrap();
        assert_eq!(service.total_deposits(), Amount::ZERO);
        assert_eq!(metrics.funded_accounts.get(), 0);
    }

    #[test]
    fn subscribers_receive_events_in_order() {
        let (service, _) = service();
        let mut rx = service.subscribe();
        let carol = Address::derive("carol");

        service.deposit(&carol, Amount::from_coins(2)).unwrap();
        service.withdraw(&carol, Amount::from_coins(2)).unwrap();
        let _ = service.withdraw(&carol, Amount::from_coins(1));

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.sequence, 0);
        assert!(matches!(first.event, VaultEvent::Deposit { .. }));
        assert_eq!(second.sequence, 1);
        assert!(matches!(second.event, VaultEvent::Withdrawal { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_since_honours_limit() {
        let (service, _) = service();
        let dave = Address::derive("dave");
        for _ in 0..5 {
            service.deposit(&dave, Amount::from_units(1)).unwrap();
        }

        let page = service.events_since(1, 2);
        let sequences: Vec<u64> = page.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }
}
