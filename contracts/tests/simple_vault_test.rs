//! Integration tests for the SimpleVault ledger.
//!
//! Covers the deposit / withdraw / balance-tracking scenarios a caller sees
//! from outside the crate, plus randomized conservation checks over long
//! operation sequences.

use custody_contracts::{ExternalLedger, NoopPayout, SimpleVault, VaultError};
use custody_protocol::{Address, Amount, VaultEvent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Helper: decimal coins, like `parseEther`.
fn eth(s: &str) -> Amount {
    Amount::parse_coins(s).unwrap()
}

/// Helper: a fresh vault plus three deterministic signers.
fn setup() -> (SimpleVault, Address, Address, Address) {
    (
        SimpleVault::new(),
        Address::derive("owner"),
        Address::derive("addr1"),
        Address::derive("addr2"),
    )
}

/// Helper: a vault where `addr1` has already deposited 2 coins.
fn funded() -> (SimpleVault, Address) {
    let (mut vault, _, addr1, _) = setup();
    vault.deposit(&addr1, eth("2.0")).unwrap();
    (vault, addr1)
}

// ---------------------------------------------------------------------------
// Deposit
// ---------------------------------------------------------------------------

#[test]
fn deposit_records_balance_total_and_event() {
    let (mut vault, _, addr1, _) = setup();

    vault.deposit(&addr1, eth("1.0")).unwrap();

    assert_eq!(
        vault.last_event().unwrap().event,
        VaultEvent::Deposit {
            account: addr1,
            amount: eth("1.0")
        }
    );
    assert_eq!(vault.get_balance(&addr1), eth("1.0"));
    assert_eq!(vault.get_total_deposits(), eth("1.0"));
}

#[test]
fn multiple_deposits_accumulate() {
    let (mut vault, _, addr1, _) = setup();

    vault.deposit(&addr1, eth("1.0")).unwrap();
    vault.deposit(&addr1, eth("0.5")).unwrap();

    assert_eq!(vault.get_balance(&addr1), eth("1.5"));
    assert_eq!(vault.events().len(), 2);
}

// ---------------------------------------------------------------------------
// Withdraw
// ---------------------------------------------------------------------------

#[test]
fn partial_withdrawal_leaves_remaining_balance() {
    let (mut vault, addr1) = funded();
    assert_eq!(vault.get_balance(&addr1), eth("2.0"));

    let remaining = vault.withdraw(&addr1, eth("1.0"), &mut NoopPayout).unwrap();

    assert_eq!(remaining, eth("1.0"));
    assert_eq!(vault.get_balance(&addr1), eth("1.0"));
    assert_eq!(
        vault.last_event().unwrap().event,
        VaultEvent::Withdrawal {
            account: addr1,
            amount: eth("1.0")
        }
    );
}

#[test]
fn full_balance_withdrawal_succeeds() {
    let (mut vault, addr1) = funded();

    vault.withdraw(&addr1, eth("2.0"), &mut NoopPayout).unwrap();

    assert_eq!(vault.get_balance(&addr1), Amount::ZERO);
    assert_eq!(vault.get_total_deposits(), Amount::ZERO);
    assert_eq!(
        vault.last_event().unwrap().event,
        VaultEvent::Withdrawal {
            account: addr1,
            amount: eth("2.0")
        }
    );
}

#[test]
fn withdrawal_exceeding_balance_is_rejected() {
    let (mut vault, addr1) = funded();

    let err = vault
        .withdraw(&addr1, eth("3.0"), &mut NoopPayout)
        .unwrap_err();

    assert!(matches!(err, VaultError::InsufficientBalance { .. }));
    assert_eq!(err.to_string(), "Insufficient balance");
    assert_eq!(vault.get_balance(&addr1), eth("2.0"));
}

#[test]
fn one_unit_over_balance_is_rejected() {
    let (mut vault, addr1) = funded();
    let over = eth("2.0").checked_add(Amount::from_units(1)).unwrap();

    let err = vault.withdraw(&addr1, over, &mut NoopPayout).unwrap_err();

    assert!(matches!(err, VaultError::InsufficientBalance { .. }));
    assert_eq!(vault.get_balance(&addr1), eth("2.0"));
    assert_eq!(vault.get_total_deposits(), eth("2.0"));
}

#[test]
fn zero_withdrawal_is_rejected() {
    let (mut vault, addr1) = funded();

    let err = vault
        .withdraw(&addr1, eth("0"), &mut NoopPayout)
        .unwrap_err();

    assert!(matches!(err, VaultError::InvalidAmount));
    assert_eq!(err.to_string(), "Withdrawal amount must be greater than 0");
    assert_eq!(vault.events().len(), 1);
}

#[test]
fn zero_check_precedes_balance_check() {
    // An unfunded account asking for zero hits InvalidAmount, not
    // InsufficientBalance.
    let (mut vault, _, _, addr2) = setup();
    let err = vault
        .withdraw(&addr2, Amount::ZERO, &mut NoopPayout)
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidAmount));
}

#[test]
fn unfunded_account_cannot_withdraw() {
    let (mut vault, _, _, addr2) = setup();
    let err = vault
        .withdraw(&addr2, Amount::from_units(1), &mut NoopPayout)
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::InsufficientBalance { available, .. } if available == Amount::ZERO
    ));
}

#[test]
fn cannot_withdraw_another_accounts_balance() {
    let (mut vault, addr1) = funded();
    let addr2 = Address::derive("addr2");

    let err = vault
        .withdraw(&addr2, eth("1.0"), &mut NoopPayout)
        .unwrap_err();

    assert!(matches!(err, VaultError::InsufficientBalance { .. }));
    assert_eq!(vault.get_balance(&addr1), eth("2.0"));
}

#[test]
fn withdrawal_is_paid_to_the_caller() {
    let (mut vault, addr1) = funded();
    let mut external = ExternalLedger::new();

    vault.withdraw(&addr1, eth("1.5"), &mut external).unwrap();

    assert_eq!(external.wallet_balance(&addr1), eth("1.5"));
    assert_eq!(external.paid_out(), eth("1.5"));
    assert_eq!(vault.get_balance(&addr1), eth("0.5"));
}

#[test]
fn refused_payout_reverts_withdrawal() {
    let (mut vault, addr1) = funded();
    let mut external = ExternalLedger::new();
    external.refuse(addr1);

    let err = vault
        .withdraw(&addr1, eth("1.0"), &mut external)
        .unwrap_err();

    assert!(matches!(err, VaultError::TransferFailed { .. }));
    assert_eq!(vault.get_balance(&addr1), eth("2.0"));
    assert_eq!(vault.get_total_deposits(), eth("2.0"));
    assert_eq!(vault.events().len(), 1);
    assert_eq!(external.paid_out(), Amount::ZERO);
}

// ---------------------------------------------------------------------------
// Balance Tracking
// ---------------------------------------------------------------------------

#[test]
fn balances_tracked_per_account() {
    let (mut vault, _, addr1, addr2) = setup();

    vault.deposit(&addr1, eth("1.0")).unwrap();
    vault.deposit(&addr2, eth("2.0")).unwrap();

    assert_eq!(vault.get_balance(&addr1), eth("1.0"));
    assert_eq!(vault.get_balance(&addr2), eth("2.0"));
    assert_eq!(vault.get_total_deposits(), eth("3.0"));
    assert_eq!(vault.account_count(), 2);
}

#[test]
fn event_sequence_numbers_are_dense() {
    let (mut vault, _, addr1, addr2) = setup();

    vault.deposit(&addr1, eth("1.0")).unwrap();
    vault.deposit(&addr2, eth("1.0")).unwrap();
    let _ = vault.withdraw(&addr1, eth("5.0"), &mut NoopPayout);
    vault.withdraw(&addr2, eth("1.0"), &mut NoopPayout).unwrap();

    let sequences: Vec<u64> = vault.events().iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

// ---------------------------------------------------------------------------
// Randomized invariants
// ---------------------------------------------------------------------------

#[test]
fn random_sequences_conserve_total() {
    let mut rng = StdRng::seed_from_u64(0x5EED_CAFE);
    let accounts: Vec<Address> = (0..8)
        .map(|i| Address::derive(&format!("signer-{}", i)))
        .collect();

    for _round in 0..20 {
        let mut vault = SimpleVault::new();
        let mut external = ExternalLedger::new();
        let mut deposited = Amount::ZERO;

        for _ in 0..200 {
            let who = accounts[rng.gen_range(0..accounts.len())];
            let amount = Amount::from_units(rng.gen_range(0..5_000u128));
            let before = vault.get_balance(&who);

            if rng.gen_bool(0.55) {
                vault.deposit(&who, amount).unwrap();
                deposited = deposited.checked_add(amount).unwrap();
                assert_eq!(vault.get_balance(&who), before.checked_add(amount).unwrap());
            } else {
                match vault.withdraw(&who, amount, &mut external) {
                    Ok(remaining) => {
                        assert!(amount <= before);
                        assert_eq!(remaining, before.checked_sub(amount).unwrap());
                    }
                    Err(VaultError::InvalidAmount) => assert!(amount.is_zero()),
                    Err(VaultError::InsufficientBalance { available, .. }) => {
                        assert!(amount > before);
                        assert_eq!(available, before);
                        assert_eq!(vault.get_balance(&who), before);
                    }
                    Err(other) => panic!("unexpected error: {}", other),
                }
            }

            assert!(vault.verify_conservation());
        }

        // Everything deposited is either still in the vault or was paid out.
        assert_eq!(
            vault
                .get_total_deposits()
                .checked_add(external.paid_out())
                .unwrap(),
            deposited
        );
    }
}

#[test]
fn draining_every_account_empties_the_vault() {
    let mut vault = SimpleVault::new();
    let accounts: Vec<Address> = (0..5)
        .map(|i| Address::derive(&format!("drain-{}", i)))
        .collect();

    for (i, who) in accounts.iter().enumerate() {
        vault.deposit(who, Amount::from_coins(i as u64 + 1)).unwrap();
    }
    assert_eq!(vault.get_total_deposits(), Amount::from_coins(15));

    for who in &accounts {
        let balance = vault.get_balance(who);
        vault.withdraw(who, balance, &mut NoopPayout).unwrap();
    }

    assert_eq!(vault.get_total_deposits(), Amount::ZERO);
    assert_eq!(vault.account_count(), 0);
    assert!(vault.snapshot().balances.is_empty());
}
