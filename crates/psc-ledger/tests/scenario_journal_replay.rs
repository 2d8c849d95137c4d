//! Journaled ledger survives a restart and refuses a tampered journal.
//!
//! GREEN when:
//! - Reopening a journal reproduces users, batches, history, alerts and the
//!   chain head exactly.
//! - Editing one committed line makes both `verify_journal` and
//!   `open_journaled` report the break at that line.

use psc_ledger::{
    verify_journal, Ledger, LedgerError, MemoryLedger, NewAlert, NewBatch, NewReading, NewUser,
    TransitionWrite, VerifyResult,
};
use psc_lifecycle::{plan, Recipient, Transition};
use psc_schemas::{Address, AlertType, BatchStatus, Role};

fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

fn seed(l: &MemoryLedger) {
    for (a, role) in [
        ("0xs", Role::IngredientSupplier),
        ("0xm", Role::Manufacturer),
        ("0xf", Role::Fda),
    ] {
        l.register_user(NewUser {
            address: addr(a),
            name: a.to_string(),
            role,
        })
        .unwrap();
    }
    let (batch, _) = l
        .create_batch(NewBatch {
            batch_id: "B1".into(),
            drug_name: "Aspirin".into(),
            creator: addr("0xs"),
        })
        .unwrap();

    let s = l.get_user(&addr("0xs")).unwrap().unwrap();
    let m = l.get_user(&addr("0xm")).unwrap().unwrap();
    let p = plan(
        Transition::TransferToManufacturer,
        &batch,
        &s,
        Some(Recipient {
            address: &m.address,
            user: Some(&m),
        }),
    )
    .unwrap();
    l.append_transaction(TransitionWrite {
        plan: p,
        location: "Supplier Dock".into(),
        remarks: String::new(),
    })
    .unwrap();

    l.append_reading(NewReading {
        batch_id: "B1".into(),
        location: "Warehouse|GPS:40.7128,-74.006".into(),
        temperature_centi: 2700,
        humidity: 40,
        pressure: 101,
        tamper_detected: false,
        recorded_by: Address::system(),
    })
    .unwrap();
    let (alert, _) = l
        .append_alert(NewAlert {
            batch_id: "B1".into(),
            alert_type: AlertType::Temperature,
            message: "too warm".into(),
            raised_by: Address::system(),
        })
        .unwrap();
    l.resolve_alert(alert.id, &addr("0xf")).unwrap();
}

#[test]
fn reopen_replays_identical_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger").join("journal.jsonl");

    let head = {
        let l = MemoryLedger::open_journaled(&path).unwrap();
        seed(&l);
        l.head()
    };
    assert_eq!(head.0, 8);

    assert_eq!(
        verify_journal(&path).unwrap(),
        VerifyResult::Valid { lines: 8 }
    );

    let l = MemoryLedger::open_journaled(&path).unwrap();
    assert_eq!(l.head(), head);
    assert_eq!(l.list_users().unwrap().len(), 3);

    let b = l.get_batch("B1").unwrap().unwrap();
    assert_eq!(b.status, BatchStatus::IngredientsSupplied);
    assert_eq!(b.current_owner, addr("0xm"));

    let history = l.list_transactions_for_batch("B1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].location, "Supplier Dock");

    let readings = l.list_readings_for_batch("B1").unwrap();
    assert_eq!(readings[0].temperature_celsius(), 27.0);

    let alerts = l.list_alerts().unwrap();
    assert!(alerts[0].resolved);
    assert_eq!(alerts[0].resolved_by, Some(addr("0xf")));

    // The chain keeps growing from the replayed head.
    let (_, r) = l
        .register_user(NewUser {
            address: addr("0xd"),
            name: "dist".into(),
            role: Role::Distributor,
        })
        .unwrap();
    assert_eq!(r.seq, 8);
    assert_eq!(
        verify_journal(&path).unwrap(),
        VerifyResult::Valid { lines: 9 }
    );
}

#[test]
fn tampered_line_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    {
        let l = MemoryLedger::open_journaled(&path).unwrap();
        seed(&l);
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    assert!(lines[4].contains("Supplier Dock"));
    lines[4] = lines[4].replace("Supplier Dock", "Somewhere Else");
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    match verify_journal(&path).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 5);
            assert!(reason.contains("hash_self"), "{reason}");
        }
        other => panic!("expected a broken chain, got {other:?}"),
    }

    match MemoryLedger::open_journaled(&path).unwrap_err() {
        LedgerError::Corrupt { line, .. } => assert_eq!(line, 5),
        other => panic!("expected Corrupt, got {other:?}"),
    }
}

#[test]
fn deleted_line_breaks_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    {
        let l = MemoryLedger::open_journaled(&path).unwrap();
        seed(&l);
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let kept: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, l)| l)
        .collect();
    std::fs::write(&path, kept.join("\n") + "\n").unwrap();

    assert!(matches!(
        verify_journal(&path).unwrap(),
        VerifyResult::Broken { line: 2, .. }
    ));
}

#[test]
fn unwritable_journal_leaves_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let l = MemoryLedger::open_journaled(&path).unwrap();

    // Replace the journal file with a directory so the append fails.
    std::fs::create_dir(&path).unwrap();

    let err = l
        .register_user(NewUser {
            address: addr("0xs"),
            name: "s".into(),
            role: Role::IngredientSupplier,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Journal(_)));
    assert!(l.get_user(&addr("0xs")).unwrap().is_none());
    assert_eq!(l.head(), (0, None));
}
