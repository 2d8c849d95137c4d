//! Per-actor "what can I do next" derivation.
//!
//! [`derive_action`] reads the same [`RULES`] table the validator enforces,
//! so a suggested action is always one the validator would accept.

use psc_schemas::{Address, Alert, AlertType, Batch, BatchStatus, Role};
use serde::{Deserialize, Serialize};

use crate::transitions::{Transition, RULES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NextAction {
    TransferToManufacturer,
    #[serde(rename = "requestFDAApproval")]
    RequestFdaApproval,
    /// Approve or reject; both rows share a source status and role.
    ReviewFdaSubmission,
    ManufactureDrug,
    TransferToRepackager,
    TransferToDistributor,
    TransferToPharmacy,
}

impl NextAction {
    fn from_transition(t: Transition) -> Option<Self> {
        Some(match t {
            Transition::CreateBatch => return None,
            Transition::TransferToManufacturer => NextAction::TransferToManufacturer,
            Transition::RequestFdaApproval => NextAction::RequestFdaApproval,
            Transition::ApproveDrug | Transition::RejectDrug => NextAction::ReviewFdaSubmission,
            Transition::ManufactureDrug => NextAction::ManufactureDrug,
            Transition::TransferToRepackager => NextAction::TransferToRepackager,
            Transition::TransferToDistributor => NextAction::TransferToDistributor,
            Transition::TransferToPharmacy => NextAction::TransferToPharmacy,
        })
    }

    /// Transitions this action may be fulfilled with.
    pub fn transitions(self) -> &'static [Transition] {
        match self {
            NextAction::TransferToManufacturer => &[Transition::TransferToManufacturer],
            NextAction::RequestFdaApproval => &[Transition::RequestFdaApproval],
            NextAction::ReviewFdaSubmission => &[Transition::ApproveDrug, Transition::RejectDrug],
            NextAction::ManufactureDrug => &[Transition::ManufactureDrug],
            NextAction::TransferToRepackager => &[Transition::TransferToRepackager],
            NextAction::TransferToDistributor => &[Transition::TransferToDistributor],
            NextAction::TransferToPharmacy => &[Transition::TransferToPharmacy],
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            NextAction::TransferToManufacturer => "Transfer to Manufacturer",
            NextAction::RequestFdaApproval => "Request FDA Approval",
            NextAction::ReviewFdaSubmission => "Review FDA Submission",
            NextAction::ManufactureDrug => "Manufacture Drug",
            NextAction::TransferToRepackager => "Transfer to Repackager",
            NextAction::TransferToDistributor => "Transfer to Distributor",
            NextAction::TransferToPharmacy => "Transfer to Pharmacy",
        }
    }
}

/// The single action `address` (holding `role`) can take on `batch`, if any.
pub fn derive_action(batch: &Batch, role: Role, address: &Address) -> Option<NextAction> {
    RULES
        .iter()
        .find(|r| r.transition != Transition::CreateBatch && r.admits(batch, role, address))
        .and_then(|r| NextAction::from_transition(r.transition))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub batch_id: String,
    pub drug_name: String,
    pub status: BatchStatus,
    pub action: NextAction,
    pub title: String,
}

pub fn pending_actions(batches: &[Batch], role: Role, address: &Address) -> Vec<PendingAction> {
    batches
        .iter()
        .filter_map(|b| {
            derive_action(b, role, address).map(|action| PendingAction {
                batch_id: b.batch_id.clone(),
                drug_name: b.drug_name.clone(),
                status: b.status,
                action,
                title: action.title().to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotice {
    pub alert_id: u64,
    pub batch_id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum Notification {
    Action(PendingAction),
    Alert(AlertNotice),
}

/// Action notifications followed by unresolved alerts, newest alert first.
///
/// Patients get nothing: they track batches but never act on them.
pub fn notifications(
    batches: &[Batch],
    alerts: &[Alert],
    role: Role,
    address: &Address,
) -> Vec<Notification> {
    if role == Role::Patient {
        return Vec::new();
    }

    let mut out: Vec<Notification> = pending_actions(batches, role, address)
        .into_iter()
        .map(Notification::Action)
        .collect();

    let mut open: Vec<&Alert> = alerts.iter().filter(|a| !a.resolved).collect();
    open.sort_by(|a, b| b.id.cmp(&a.id));
    out.extend(open.into_iter().map(|a| {
        Notification::Alert(AlertNotice {
            alert_id: a.id,
            batch_id: a.batch_id.clone(),
            alert_type: a.alert_type,
            message: a.message.clone(),
            timestamp: a.timestamp,
        })
    }));
    out
}
