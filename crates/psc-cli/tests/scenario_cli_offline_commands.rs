//! Offline CLI commands: no daemon needed.
//!
//! GREEN when:
//! - `psc --help` lists every top-level subcommand.
//! - `psc config-hash` on the shipped base config prints a 64-hex hash and
//!   the canonical JSON.
//! - `psc config-hash` refuses a layer holding a secret literal.
//! - `psc verify-journal` accepts an untouched journal and fails on an
//!   edited one, naming the broken line.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use psc_ledger::{Ledger, MemoryLedger, NewUser};
use psc_schemas::{Address, Role};

fn base_yaml() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join("base.yaml")
}

fn psc() -> Command {
    Command::cargo_bin("psc").unwrap()
}

#[test]
fn help_lists_subcommands() {
    psc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("config-hash"))
        .stdout(predicate::str::contains("verify-journal"))
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let out = psc()
        .arg("config-hash")
        .arg(base_yaml())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    let mut lines = text.lines();

    let first = lines.next().unwrap();
    let hash = first.strip_prefix("config_hash=").unwrap();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

    let json: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(json["daemon"]["bind_addr"], "127.0.0.1:8899");
}

#[test]
fn config_hash_is_stable_across_runs() {
    let run = || {
        psc()
            .arg("config-hash")
            .arg(base_yaml())
            .assert()
            .success()
            .get_output()
            .stdout
            .clone()
    };
    assert_eq!(run(), run());
}

#[test]
fn config_hash_rejects_secret_literal() {
    let dir = tempfile::tempdir().unwrap();
    let layer = dir.path().join("leak.yaml");
    std::fs::write(
        &layer,
        "credentials:\n  signer_key: \"0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318\"\n",
    )
    .unwrap();

    psc()
        .arg("config-hash")
        .arg(base_yaml())
        .arg(&layer)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("4c0883a6").not());
}

fn write_journal(path: &std::path::Path) {
    let l = MemoryLedger::open_journaled(path).unwrap();
    for (a, role) in [("0xa1", Role::IngredientSupplier), ("0xb1", Role::Manufacturer)] {
        l.register_user(NewUser {
            address: Address::parse(a).unwrap(),
            name: format!("user {a}"),
            role,
        })
        .unwrap();
    }
}

#[test]
fn verify_journal_accepts_untouched_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    write_journal(&path);

    psc()
        .arg("verify-journal")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("journal_valid=true lines=2"));
}

#[test]
fn verify_journal_reports_edited_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    write_journal(&path);

    let content = std::fs::read_to_string(&path).unwrap();
    let edited = content.replacen("user 0xb1", "user 0xzz", 1);
    assert_ne!(content, edited);
    std::fs::write(&path, edited).unwrap();

    psc()
        .arg("verify-journal")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("journal_valid=false line=2"))
        .stderr(predicate::str::contains("JOURNAL_BROKEN"));
}
