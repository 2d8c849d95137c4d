//! psc-custody
//!
//! Custody service: the only path by which a batch changes status or owner.
//!
//! Every transition runs the same pipeline:
//!
//! 1. batch lookup (`NotFound`)
//! 2. actor lookup (`Unauthorized` if unregistered)
//! 3. [`psc_lifecycle::plan`] checks role, ownership, source status, recipient
//! 4. one [`Ledger::append_transaction`] write, which re-checks the expected
//!    status and owner so concurrent callers cannot both win
//!
//! A refusal at any step leaves the ledger untouched.

use std::sync::Arc;

use psc_ledger::{Ledger, NewAlert, NewBatch, NewUser, Receipt, Resolution, TransitionWrite};
use psc_lifecycle::{
    authorize_create, notifications, pending_actions, plan, Notification, PendingAction, Recipient,
    Transition,
};
use psc_schemas::{
    Address, Alert, AlertType, Batch, CoreError, CoreResult, FdaDecision, Role, TransactionRecord,
    User,
};
use serde::Serialize;
use tracing::debug;

/// A committed transition: the batch as it now stands, the record appended,
/// and the ledger receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Committed {
    pub batch: Batch,
    pub record: TransactionRecord,
    pub receipt: Receipt,
}

/// One role-gated custody action as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub transition: Transition,
    pub batch_id: String,
    pub actor: Address,
    pub recipient: Option<Address>,
    pub location: Option<String>,
    pub remarks: Option<String>,
}

impl TransitionRequest {
    pub fn new(transition: Transition, batch_id: impl Into<String>, actor: Address) -> Self {
        Self {
            transition,
            batch_id: batch_id.into(),
            actor,
            recipient: None,
            location: None,
            remarks: None,
        }
    }

    pub fn to(mut self, recipient: Address) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }
}

fn default_remarks(t: Transition) -> &'static str {
    match t {
        Transition::CreateBatch => "Batch created",
        Transition::TransferToManufacturer => "Ingredients transferred to manufacturer",
        Transition::RequestFdaApproval => "FDA approval requested",
        Transition::ApproveDrug => "Approved by FDA",
        Transition::RejectDrug => "Rejected by FDA",
        Transition::ManufactureDrug => "Drug manufactured",
        Transition::TransferToRepackager => "Transferred to repackager",
        Transition::TransferToDistributor => "Transferred to distributor",
        Transition::TransferToPharmacy => "Dispensed to pharmacy",
    }
}

fn non_empty<'a>(field: &str, value: &'a str) -> CoreResult<&'a str> {
    let v = value.trim();
    if v.is_empty() {
        Err(CoreError::validation(format!("{field} must not be empty")))
    } else {
        Ok(v)
    }
}

#[derive(Clone)]
pub struct CustodyService {
    ledger: Arc<dyn Ledger>,
}

impl CustodyService {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn register_user(
        &self,
        address: Address,
        name: &str,
        role: Role,
    ) -> CoreResult<(User, Receipt)> {
        let name = non_empty("name", name)?.to_string();
        Ok(self.ledger.register_user(NewUser {
            address,
            name,
            role,
        })?)
    }

    pub fn user(&self, address: &Address) -> CoreResult<User> {
        self.ledger
            .get_user(address)?
            .ok_or_else(|| CoreError::not_found(format!("user {address}")))
    }

    /// Registered and active, or `Unauthorized`.
    fn actor(&self, address: &Address) -> CoreResult<User> {
        match self.ledger.get_user(address)? {
            Some(u) if u.is_active => Ok(u),
            Some(_) => Err(CoreError::unauthorized(format!(
                "actor {address} is deactivated"
            ))),
            None => Err(CoreError::unauthorized(format!(
                "actor {address} is not registered"
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    pub fn batch(&self, batch_id: &str) -> CoreResult<Batch> {
        self.ledger
            .get_batch(batch_id)?
            .ok_or_else(|| CoreError::not_found(format!("batch {batch_id}")))
    }

    /// Custody history in order. `NotFound` for an unknown batch rather than
    /// an empty list.
    pub fn history(&self, batch_id: &str) -> CoreResult<Vec<TransactionRecord>> {
        self.batch(batch_id)?;
        Ok(self.ledger.list_transactions_for_batch(batch_id)?)
    }

    pub fn fda_decision(&self, batch_id: &str) -> CoreResult<Option<FdaDecision>> {
        self.batch(batch_id)?;
        Ok(self.ledger.get_fda_decision(batch_id)?)
    }

    pub fn create_batch(
        &self,
        actor: &Address,
        batch_id: &str,
        drug_name: &str,
    ) -> CoreResult<(Batch, Receipt)> {
        let batch_id = non_empty("batchId", batch_id)?;
        let drug_name = non_empty("drugName", drug_name)?;
        let user = self.actor(actor)?;
        authorize_create(&user)?;
        Ok(self.ledger.create_batch(NewBatch {
            batch_id: batch_id.to_string(),
            drug_name: drug_name.to_string(),
            creator: user.address,
        })?)
    }

    /// Run any custody transition through the full validation pipeline.
    pub fn execute(&self, req: TransitionRequest) -> CoreResult<Committed> {
        if req.transition == Transition::CreateBatch {
            return Err(CoreError::validation(
                "createBatch is not a transition of an existing batch",
            ));
        }

        let batch = self.batch(&req.batch_id)?;
        let actor = self.actor(&req.actor)?;

        let rcpt_user = match (&req.recipient, req.transition.rule().recipient) {
            (Some(a), Some(_)) => self.ledger.get_user(a)?,
            _ => None,
        };
        let recipient = req.recipient.as_ref().map(|address| Recipient {
            address,
            user: rcpt_user.as_ref(),
        });

        let p = plan(req.transition, &batch, &actor, recipient).map_err(|e| {
            debug!(batch_id = %req.batch_id, actor = %req.actor, error = %e, "transition refused");
            CoreError::from(e)
        })?;

        let remarks = req
            .remarks
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| default_remarks(req.transition).to_string());
        let (record, receipt) = self.ledger.append_transaction(TransitionWrite {
            plan: p,
            location: req.location.unwrap_or_default(),
            remarks,
        })?;

        let batch = Batch {
            status: record.status,
            current_owner: record.to.clone(),
            ..batch
        };
        Ok(Committed {
            batch,
            record,
            receipt,
        })
    }

    pub fn transfer_to_manufacturer(
        &self,
        actor: &Address,
        batch_id: &str,
        manufacturer: &Address,
        location: Option<&str>,
    ) -> CoreResult<Committed> {
        self.transfer(Transition::TransferToManufacturer, actor, batch_id, manufacturer, location)
    }

    pub fn request_fda_approval(&self, actor: &Address, batch_id: &str) -> CoreResult<Committed> {
        self.execute(TransitionRequest::new(
            Transition::RequestFdaApproval,
            batch_id,
            actor.clone(),
        ))
    }

    pub fn approve_drug(
        &self,
        actor: &Address,
        batch_id: &str,
        remarks: &str,
    ) -> CoreResult<Committed> {
        self.execute(
            TransitionRequest::new(Transition::ApproveDrug, batch_id, actor.clone())
                .remarks(remarks),
        )
    }

    /// A rejection must say why.
    pub fn reject_drug(&self, actor: &Address, batch_id: &str, reason: &str) -> CoreResult<Committed> {
        let reason = non_empty("reason", reason)?;
        self.execute(
            TransitionRequest::new(Transition::RejectDrug, batch_id, actor.clone()).remarks(reason),
        )
    }

    pub fn manufacture_drug(&self, actor: &Address, batch_id: &str) -> CoreResult<Committed> {
        self.execute(TransitionRequest::new(
            Transition::ManufactureDrug,
            batch_id,
            actor.clone(),
        ))
    }

    pub fn transfer_to_repackager(
        &self,
        actor: &Address,
        batch_id: &str,
        repackager: &Address,
        location: Option<&str>,
    ) -> CoreResult<Committed> {
        self.transfer(Transition::TransferToRepackager, actor, batch_id, repackager, location)
    }

    pub fn transfer_to_distributor(
        &self,
        actor: &Address,
        batch_id: &str,
        distributor: &Address,
        location: Option<&str>,
    ) -> CoreResult<Committed> {
        self.transfer(Transition::TransferToDistributor, actor, batch_id, distributor, location)
    }

    /// Ownership change and dispensing in one step.
    pub fn transfer_to_pharmacy(
        &self,
        actor: &Address,
        batch_id: &str,
        pharmacy: &Address,
        location: Option<&str>,
    ) -> CoreResult<Committed> {
        self.transfer(Transition::TransferToPharmacy, actor, batch_id, pharmacy, location)
    }

    fn transfer(
        &self,
        transition: Transition,
        actor: &Address,
        batch_id: &str,
        recipient: &Address,
        location: Option<&str>,
    ) -> CoreResult<Committed> {
        let mut req =
            TransitionRequest::new(transition, batch_id, actor.clone()).to(recipient.clone());
        if let Some(loc) = location {
            req = req.at(loc);
        }
        self.execute(req)
    }

    // -----------------------------------------------------------------------
    // Alerts
    // -----------------------------------------------------------------------

    /// Mark an alert resolved. Any active non-patient actor may resolve;
    /// resolving twice succeeds and keeps the first resolver.
    pub fn resolve_alert(&self, actor: &Address, alert_id: u64) -> CoreResult<Resolution> {
        if self.ledger.get_alert(alert_id)?.is_none() {
            return Err(CoreError::not_found(format!("alert {alert_id}")));
        }
        let user = self.actor(actor)?;
        if user.role == Role::Patient {
            return Err(CoreError::unauthorized("patients cannot resolve alerts"));
        }
        Ok(self.ledger.resolve_alert(alert_id, &user.address)?)
    }

    /// Manual report of a suspected counterfeit or unrecorded hand-off.
    pub fn report_fake_transfer(
        &self,
        actor: &Address,
        batch_id: &str,
        message: &str,
    ) -> CoreResult<(Alert, Receipt)> {
        let message = non_empty("message", message)?;
        self.batch(batch_id)?;
        let user = self.actor(actor)?;
        Ok(self.ledger.append_alert(NewAlert {
            batch_id: batch_id.to_string(),
            alert_type: AlertType::FakeTransfer,
            message: format!("Fake transfer reported by {}: {message}", user.role.label()),
            raised_by: user.address,
        })?)
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    pub fn pending_actions(&self, address: &Address) -> CoreResult<Vec<PendingAction>> {
        let user = self.user(address)?;
        let batches = self.ledger.list_batches()?;
        Ok(pending_actions(&batches, user.role, &user.address))
    }

    pub fn notifications(&self, address: &Address) -> CoreResult<Vec<Notification>> {
        let user = self.user(address)?;
        let batches = self.ledger.list_batches()?;
        let alerts = self.ledger.list_alerts()?;
        Ok(notifications(&batches, &alerts, user.role, &user.address))
    }
}
