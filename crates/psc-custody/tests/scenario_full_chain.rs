//! A batch walks the entire custody chain and its history reads back in
//! order; an FDA rejection ends the chain.

use std::sync::Arc;

use psc_custody::CustodyService;
use psc_ledger::MemoryLedger;
use psc_schemas::{Address, BatchStatus, ErrorKind, Role};

struct Actors {
    supplier: Address,
    manufacturer: Address,
    fda: Address,
    repackager: Address,
    distributor: Address,
    pharmacy: Address,
}

fn setup() -> (CustodyService, Actors) {
    let svc = CustodyService::new(Arc::new(MemoryLedger::new()));
    let reg = |a: &str, name: &str, role: Role| {
        let address = Address::parse(a).unwrap();
        svc.register_user(address.clone(), name, role).unwrap();
        address
    };
    let actors = Actors {
        supplier: reg("0x01", "Supplier", Role::IngredientSupplier),
        manufacturer: reg("0x02", "Manufacturer", Role::Manufacturer),
        fda: reg("0x03", "FDA", Role::Fda),
        repackager: reg("0x04", "Repackager", Role::Repackager),
        distributor: reg("0x05", "Distributor", Role::Distributor),
        pharmacy: reg("0x06", "Pharmacy", Role::Pharmacy),
    };
    (svc, actors)
}

#[test]
fn full_chain_produces_seven_ordered_records() {
    let (svc, a) = setup();

    let (batch, _) = svc.create_batch(&a.supplier, "B1", "Aspirin").unwrap();
    assert_eq!(batch.status, BatchStatus::IngredientsSupplied);
    assert_eq!(batch.current_owner, a.supplier);

    let c = svc
        .transfer_to_manufacturer(&a.supplier, "B1", &a.manufacturer, Some("Supplier Dock"))
        .unwrap();
    assert_eq!(c.batch.current_owner, a.manufacturer);
    assert_eq!(c.record.to, a.manufacturer);

    svc.request_fda_approval(&a.manufacturer, "B1").unwrap();
    let c = svc.approve_drug(&a.fda, "B1", "meets standards").unwrap();
    assert_eq!(c.batch.current_owner, a.manufacturer, "review does not move custody");

    svc.manufacture_drug(&a.manufacturer, "B1").unwrap();
    svc.transfer_to_repackager(&a.manufacturer, "B1", &a.repackager, None)
        .unwrap();
    svc.transfer_to_distributor(&a.repackager, "B1", &a.distributor, Some("Hub"))
        .unwrap();
    let c = svc
        .transfer_to_pharmacy(&a.distributor, "B1", &a.pharmacy, Some("Main St"))
        .unwrap();
    assert_eq!(c.batch.status, BatchStatus::Dispensed);
    assert_eq!(c.batch.current_owner, a.pharmacy);

    let history = svc.history("B1").unwrap();
    let statuses: Vec<BatchStatus> = history.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            BatchStatus::IngredientsSupplied,
            BatchStatus::FdaPending,
            BatchStatus::FdaApproved,
            BatchStatus::Manufactured,
            BatchStatus::Repackaged,
            BatchStatus::Distributed,
            BatchStatus::Dispensed,
        ]
    );

    // Owner after each step equals the record's `to`.
    let stored = svc.batch("B1").unwrap();
    assert_eq!(stored.current_owner, history.last().unwrap().to);

    let decision = svc.fda_decision("B1").unwrap().unwrap();
    assert!(decision.approved);
    assert_eq!(decision.remarks, "meets standards");
    assert_eq!(decision.decided_by, a.fda);

    // Terminal: nothing further is legal, for anyone.
    let err = svc
        .transfer_to_pharmacy(&a.distributor, "B1", &a.pharmacy, None)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized, "distributor no longer owns it");
    assert!(svc.pending_actions(&a.pharmacy).unwrap().is_empty());
}

#[test]
fn fda_rejection_is_terminal() {
    let (svc, a) = setup();
    svc.create_batch(&a.supplier, "B2", "Ibuprofen").unwrap();
    svc.transfer_to_manufacturer(&a.supplier, "B2", &a.manufacturer, None)
        .unwrap();
    svc.request_fda_approval(&a.manufacturer, "B2").unwrap();

    let c = svc.reject_drug(&a.fda, "B2", "contaminated sample").unwrap();
    assert_eq!(c.batch.status, BatchStatus::FdaRejected);
    assert_eq!(c.record.remarks, "contaminated sample");

    let err = svc.manufacture_drug(&a.manufacturer, "B2").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);

    let err = svc.approve_drug(&a.fda, "B2", "changed my mind").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);

    assert_eq!(svc.history("B2").unwrap().len(), 3);
    assert!(!svc.fda_decision("B2").unwrap().unwrap().approved);
}

#[test]
fn pending_actions_follow_custody() {
    let (svc, a) = setup();
    svc.create_batch(&a.supplier, "B3", "Insulin").unwrap();
    assert_eq!(svc.pending_actions(&a.supplier).unwrap().len(), 1);
    assert!(svc.pending_actions(&a.manufacturer).unwrap().is_empty());

    svc.transfer_to_manufacturer(&a.supplier, "B3", &a.manufacturer, None)
        .unwrap();
    assert!(svc.pending_actions(&a.supplier).unwrap().is_empty());
    assert_eq!(svc.pending_actions(&a.manufacturer).unwrap().len(), 1);

    svc.request_fda_approval(&a.manufacturer, "B3").unwrap();
    let fda = svc.notifications(&a.fda).unwrap();
    assert_eq!(fda.len(), 1);
}
