//! Credit ledger invariants: balances never go negative, spends are
//! conditional, grants reach both balances.

mod common;

use common::*;

#[test]
fn test_new_accounts_get_starter_credits() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "starter@example.com");

    assert_eq!(user.measurement_credits, STARTER_MEASUREMENT_CREDITS);
    assert_eq!(user.generation_credits, STARTER_GENERATION_CREDITS);

    let balance = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(balance.measurement_credits, STARTER_MEASUREMENT_CREDITS);
    assert_eq!(balance.generation_credits, STARTER_GENERATION_CREDITS);
}

#[test]
fn test_balance_for_unknown_user_is_none() {
    let conn = setup_test_db();
    assert!(queries::get_credit_balance(&conn, "at_usr_missing")
        .unwrap()
        .is_none());
    assert!(!queries::has_credits(&conn, "at_usr_missing", CreditKind::Measurement).unwrap());
}

#[test]
fn test_spend_decrements_until_exhausted() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "spender@example.com");

    // Starter balance: 1 measurement credit.
    assert!(queries::try_spend_credit(&conn, &user.id, CreditKind::Measurement).unwrap());
    assert!(!queries::try_spend_credit(&conn, &user.id, CreditKind::Measurement).unwrap());

    let balance = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(balance.measurement_credits, 0);
    // The other balance is untouched.
    assert_eq!(balance.generation_credits, STARTER_GENERATION_CREDITS);
}

#[test]
fn test_spend_at_zero_never_mutates() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "exhausted@example.com");
    assert!(queries::try_spend_credit(&conn, &user.id, CreditKind::Measurement).unwrap());

    for _ in 0..5 {
        assert!(!queries::try_spend_credit(&conn, &user.id, CreditKind::Measurement).unwrap());
        let balance = queries::get_credit_balance(&conn, &user.id)
            .unwrap()
            .unwrap();
        assert_eq!(balance.measurement_credits, 0);
    }
}

#[test]
fn test_grant_reaches_both_balances() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "topup@example.com");

    assert!(queries::grant_credits(
        &conn,
        &user.id,
        TOPUP_MEASUREMENT_CREDITS,
        TOPUP_GENERATION_CREDITS
    )
    .unwrap());

    let balance = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(
        balance.measurement_credits,
        STARTER_MEASUREMENT_CREDITS + TOPUP_MEASUREMENT_CREDITS
    );
    assert_eq!(
        balance.generation_credits,
        STARTER_GENERATION_CREDITS + TOPUP_GENERATION_CREDITS
    );
}

#[test]
fn test_grant_for_unknown_user_reports_miss() {
    let conn = setup_test_db();
    assert!(!queries::grant_credits(&conn, "at_usr_missing", 2, 10).unwrap());
}

#[test]
fn test_has_credits_tracks_balance() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "check@example.com");

    assert!(queries::has_credits(&conn, &user.id, CreditKind::Measurement).unwrap());
    queries::try_spend_credit(&conn, &user.id, CreditKind::Measurement).unwrap();
    assert!(!queries::has_credits(&conn, &user.id, CreditKind::Measurement).unwrap());
    assert!(queries::has_credits(&conn, &user.id, CreditKind::Generation).unwrap());
}

/// Concurrent spends against a balance of one: exactly one wins, the balance
/// ends at zero, and it never goes negative.
#[test]
fn test_concurrent_spends_cannot_overdraw() {
    let pool = setup_test_pool();
    let user = {
        let conn = pool.get().unwrap();
        create_test_user(&conn, "race@example.com")
    };

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let user_id = user.id.clone();
        handles.push(std::thread::spawn(move || {
            let conn = pool.get().unwrap();
            queries::try_spend_credit(&conn, &user_id, CreditKind::Measurement).unwrap()
        }));
    }

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(successes, 1, "exactly one concurrent spend may succeed");

    let conn = pool.get().unwrap();
    let balance = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(balance.measurement_credits, 0);
}

/// Interleaved grants and spends keep both balances non-negative.
#[test]
fn test_interleaved_ledger_ops_stay_non_negative() {
    let pool = setup_test_pool();
    let user = {
        let conn = pool.get().unwrap();
        create_test_user(&conn, "mixed-race@example.com")
    };

    let mut handles = Vec::new();
    for i in 0..12 {
        let pool = pool.clone();
        let user_id = user.id.clone();
        handles.push(std::thread::spawn(move || {
            let conn = pool.get().unwrap();
            if i % 3 == 0 {
                queries::grant_credits(&conn, &user_id, 1, 1).unwrap();
            } else {
                let _ = queries::try_spend_credit(&conn, &user_id, CreditKind::Generation).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let conn = pool.get().unwrap();
    let balance = queries::get_credit_balance(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert!(balance.measurement_credits >= 0);
    assert!(balance.generation_credits >= 0);
}
