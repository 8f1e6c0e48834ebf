//! # Outbound Transfers
//!
//! [`Payout`] is where value leaves the vault. It is the one place a
//! withdrawal hands control to code the vault does not own, so the trait
//! gives implementations a `&mut SimpleVault`: a recipient is free to call
//! back in, and the vault is built to survive that (see
//! [`SimpleVault::withdraw`](crate::simple_vault::SimpleVault::withdraw)).
//!
//! A payout that returns `Err` aborts the whole withdrawal. The vault rolls
//! back the debit, and anything the payout did to the vault in the meantime.

use std::collections::{HashMap, HashSet};

use custody_protocol::{Address, Amount};
use thiserror::Error;

use crate::simple_vault::{SimpleVault, VaultError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an outbound transfer did not complete.
#[derive(Debug, Error)]
pub enum PayoutError {
    /// The recipient refused the value.
    #[error("recipient {recipient} rejected the transfer: {reason}")]
    Rejected {
        /// Who refused.
        recipient: Address,
        /// Human-readable cause.
        reason: String,
    },

    /// A call the payout made back into the vault failed and the payout
    /// chose to propagate it.
    #[error("re-entrant vault call failed: {0}")]
    Reentry(#[source] Box<VaultError>),
}

impl From<VaultError> for PayoutError {
    fn from(err: VaultError) -> Self {
        PayoutError::Reentry(Box::new(err))
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Delivers withdrawn value to its recipient.
pub trait Payout {
    /// Sends `amount` to `recipient`.
    ///
    /// By the time this runs the vault has already debited `recipient`, so
    /// `vault.get_balance(recipient)` reflects the post-withdrawal balance.
    fn pay(
        &mut self,
        vault: &mut SimpleVault,
        recipient: &Address,
        amount: Amount,
    ) -> Result<(), PayoutError>;
}

/// Closures make convenient one-off payouts, mostly in tests.
impl<F> Payout for F
where
    F: FnMut(&mut SimpleVault, &Address, Amount) -> Result<(), PayoutError>,
{
    fn pay(
        &mut self,
        vault: &mut SimpleVault,
        recipient: &Address,
        amount: Amount,
    ) -> Result<(), PayoutError> {
        self(vault, recipient, amount)
    }
}

// ---------------------------------------------------------------------------
// NoopPayout
// ---------------------------------------------------------------------------

/// Lets value leave without tracking where it went.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPayout;

impl Payout for NoopPayout {
    fn pay(&mut self, _: &mut SimpleVault, _: &Address, _: Amount) -> Result<(), PayoutError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExternalLedger
// ---------------------------------------------------------------------------

/// Wallet balances held outside the vault.
///
/// Every successful payout credits the recipient here. Recipients can be
/// marked as refusing value, which makes their withdrawals fail and roll
/// back; useful for exercising the revert path end to end.
#[derive(Debug, Clone, Default)]
pub struct ExternalLedger {
    wallets: HashMap<Address, Amount>,
    refusing: HashSet<Address>,
    paid_out: Amount,
}

impl ExternalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value this address has received from the vault.
    pub fn wallet_balance(&self, address: &Address) -> Amount {
        self.wallets.get(address).copied().unwrap_or(Amount::ZERO)
    }

    /// Total value paid out across all recipients.
    pub fn paid_out(&self) -> Amount {
        self.paid_out
    }

    /// Makes `address` refuse all future payouts.
    pub fn refuse(&mut self, address: Address) {
        self.refusing.insert(address);
    }

    /// Lets `address` receive payouts again.
    pub fn accept(&mut self, address: &Address) {
        self.refusing.remove(address);
    }

    /// Whether payouts to `address` currently go through.
    pub fn accepts(&self, address: &Address) -> bool {
        !self.refusing.contains(address)
    }
}

impl Payout for ExternalLedger {
    fn pay(
        &mut self,
        _vault: &mut SimpleVault,
        recipient: &Address,
        amount: Amount,
    ) -> Result<(), PayoutError> {
        if self.refusing.contains(recipient) {
            return Err(PayoutError::Rejected {
                recipient: *recipient,
                reason: "recipient does not accept value".into(),
            });
        }

        let current = self.wallet_balance(recipient);
        let overflow = || PayoutError::Rejected {
            recipient: *recipient,
            reason: "recipient wallet overflow".into(),
        };
        let credited = current.checked_add(amount).ok_or_else(overflow)?;
        let paid_out = self.paid_out.checked_add(amount).ok_or_else(overflow)?;

        self.wallets.insert(*recipient, credited);
        self.paid_out = paid_out;
        Ok(())
    }
}
