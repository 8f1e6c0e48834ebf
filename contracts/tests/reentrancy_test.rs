//! Re-entrancy tests.
//!
//! A payout gets `&mut SimpleVault` and may call straight back in. These
//! tests play the part of a hostile or clumsy recipient and check that the
//! vault's books hold up either way.

use custody_contracts::{NoopPayout, Payout, PayoutError, SimpleVault, VaultError};
use custody_protocol::{Address, Amount, VaultConfig, VaultEvent};

fn eth(coins: u64) -> Amount {
    Amount::from_coins(coins)
}

#[test]
fn reentrant_withdraw_sees_debited_balance() {
    let mut vault = SimpleVault::new();
    let attacker = Address::derive("attacker");
    vault.deposit(&attacker, eth(2)).unwrap();

    // On receiving 2, try to take another 2 before the first call finishes.
    let mut nested: Option<Result<Amount, VaultError>> = None;
    let mut attack = |v: &mut SimpleVault, who: &Address, amount: Amount| -> Result<(), PayoutError> {
        if nested.is_none() {
            nested = Some(v.withdraw(who, amount, &mut NoopPayout));
        }
        Ok(())
    };

    vault.withdraw(&attacker, eth(2), &mut attack).unwrap();

    assert!(matches!(
        nested,
        Some(Err(VaultError::InsufficientBalance { available, .. })) if available == Amount::ZERO
    ));
    assert_eq!(vault.get_balance(&attacker), Amount::ZERO);
    assert_eq!(vault.get_total_deposits(), Amount::ZERO);
    assert_eq!(vault.events().len(), 2);
}

#[test]
fn reentrant_withdraw_within_balance_is_accounted_once() {
    let mut vault = SimpleVault::new();
    let user = Address::derive("user");
    vault.deposit(&user, eth(3)).unwrap();

    let mut reentered = false;
    let mut payout = |v: &mut SimpleVault, who: &Address, _: Amount| -> Result<(), PayoutError> {
        if !reentered {
            reentered = true;
            v.withdraw(who, eth(1), &mut NoopPayout)?;
        }
        Ok(())
    };

    let remaining = vault.withdraw(&user, eth(1), &mut payout).unwrap();

    assert_eq!(remaining, eth(1));
    assert_eq!(vault.get_total_deposits(), eth(1));
    assert!(vault.verify_conservation());

    // Inner withdrawal completes first, so its event precedes the outer one.
    let withdrawals: Vec<_> = vault
        .events()
        .iter()
        .filter(|r| matches!(r.event, VaultEvent::Withdrawal { .. }))
        .map(|r| r.sequence)
        .collect();
    assert_eq!(withdrawals, vec![1, 2]);
}

#[test]
fn failed_payout_discards_nested_effects() {
    let mut vault = SimpleVault::new();
    let user = Address::derive("user");
    let other = Address::derive("other");
    vault.deposit(&user, eth(5)).unwrap();
    vault.deposit(&other, eth(1)).unwrap();

    // The payout deposits on someone's behalf, withdraws again, then fails.
    let mut payout = |v: &mut SimpleVault, who: &Address, _: Amount| -> Result<(), PayoutError> {
        v.deposit(&other, eth(4))?;
        v.withdraw(who, eth(1), &mut NoopPayout)?;
        Err(PayoutError::Rejected {
            recipient: *who,
            reason: "receive hook reverted".into(),
        })
    };

    let err = vault.withdraw(&user, eth(2), &mut payout).unwrap_err();

    assert!(matches!(err, VaultError::TransferFailed { .. }));
    assert_eq!(vault.get_balance(&user), eth(5));
    assert_eq!(vault.get_balance(&other), eth(1));
    assert_eq!(vault.get_total_deposits(), eth(6));
    assert_eq!(vault.events().len(), 2);
    assert!(vault.verify_conservation());
}

#[test]
fn swallowed_inner_failure_keeps_outer_withdrawal() {
    let mut vault = SimpleVault::new();
    let user = Address::derive("user");
    vault.deposit(&user, eth(4)).unwrap();

    // Inner withdrawal's own payout fails; the outer payout ignores that.
    let mut payout = |v: &mut SimpleVault, who: &Address, _: Amount| -> Result<(), PayoutError> {
        let mut refuse = |_: &mut SimpleVault, r: &Address, _: Amount| -> Result<(), PayoutError> {
            Err(PayoutError::Rejected {
                recipient: *r,
                reason: "inner".into(),
            })
        };
        let inner = v.withdraw(who, eth(1), &mut refuse);
        assert!(matches!(inner, Err(VaultError::TransferFailed { .. })));
        Ok(())
    };

    vault.withdraw(&user, eth(1), &mut payout).unwrap();

    assert_eq!(vault.get_balance(&user), eth(3));
    assert_eq!(vault.get_total_deposits(), eth(3));
    assert_eq!(vault.events().len(), 2);
}

#[test]
fn unbounded_recursion_hits_call_depth_limit() {
    let mut vault = SimpleVault::with_config(VaultConfig {
        max_call_depth: 4,
        ..VaultConfig::default()
    });
    let user = Address::derive("user");
    vault.deposit(&user, eth(100)).unwrap();

    fn recurse(v: &mut SimpleVault, who: &Address, _: Amount) -> Result<(), PayoutError> {
        v.withdraw(who, eth(1), &mut recurse)?;
        Ok(())
    }

    let err = vault
        .withdraw(&user, eth(1), &mut recurse)
        .unwrap_err();

    // The innermost failure propagates outward through every payout, so the
    // whole chain reverts.
    assert!(matches!(err, VaultError::TransferFailed { .. }));
    assert_eq!(vault.get_balance(&user), eth(100));
    assert_eq!(vault.get_total_deposits(), eth(100));
    assert_eq!(vault.events().len(), 1);
}

/// Re-enters once per payout and records what each nested call returned.
struct Nested {
    outcomes: Vec<Result<Amount, VaultError>>,
}

impl Payout for Nested {
    fn pay(&mut self, vault: &mut SimpleVault, who: &Address, _: Amount) -> Result<(), PayoutError> {
        let outcome = vault.withdraw(who, eth(1), self);
        self.outcomes.push(outcome);
        Ok(())
    }
}

#[test]
fn call_depth_limit_allows_exactly_max_nested_withdrawals() {
    let mut vault = SimpleVault::with_config(VaultConfig {
        max_call_depth: 3,
        ..VaultConfig::default()
    });
    let user = Address::derive("user");
    vault.deposit(&user, eth(10)).unwrap();

    let mut nested = Nested { outcomes: Vec::new() };
    vault.withdraw(&user, eth(1), &mut nested).unwrap();

    // Innermost call is recorded first.
    assert_eq!(nested.outcomes.len(), 4);
    assert!(matches!(
        nested.outcomes[0],
        Err(VaultError::CallDepthExceeded { max: 3 })
    ));
    assert!(nested.outcomes[1..].iter().all(|r| r.is_ok()));

    // Top-level withdrawal plus three nested ones.
    assert_eq!(vault.get_balance(&user), eth(6));
    assert_eq!(vault.get_total_deposits(), eth(6));
    let withdrawals = vault
        .events()
        .iter()
        .filter(|r| matches!(r.event, VaultEvent::Withdrawal { .. }))
        .count();
    assert_eq!(withdrawals, 4);
    assert!(vault.verify_conservation());
}
