//! Batch custody state machine.
//!
//! # State diagram
//!
//! ```text
//!   createBatch
//!   ─────────► IngredientsSupplied ──transferToManufacturer──┐ (owner → Manufacturer)
//!                      │ ◄────────────────────────────────────┘
//!            requestFDAApproval
//!                      ▼
//!                 FdaPending ──rejectDrug──► FdaRejected (term.)
//!                      │
//!                 approveDrug
//!                      ▼
//!                 FdaApproved ──manufactureDrug──► Manufactured
//!                                                     │
//!                                    transferToRepackager (owner → Repackager)
//!                                                     ▼
//!                                                 Repackaged
//!                                                     │
//!                                    transferToDistributor (owner → Distributor)
//!                                                     ▼
//!                                                 Distributed
//!                                                     │
//!                                    transferToPharmacy (owner → Pharmacy)
//!                                                     ▼
//!                                                 Dispensed (term.)
//! ```
//!
//! Validation order is fixed: role, then ownership, then source status, then
//! recipient. Batch existence is checked by the caller before any of these.

use std::fmt;

use psc_schemas::{Address, Batch, BatchStatus, CoreError, ErrorKind, Role, User};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Every custody action. Declaration order matches [`RULES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    CreateBatch,
    TransferToManufacturer,
    #[serde(rename = "requestFDAApproval")]
    RequestFdaApproval,
    ApproveDrug,
    RejectDrug,
    ManufactureDrug,
    TransferToRepackager,
    TransferToDistributor,
    TransferToPharmacy,
}

impl Transition {
    pub const ALL: [Transition; 9] = [
        Transition::CreateBatch,
        Transition::TransferToManufacturer,
        Transition::RequestFdaApproval,
        Transition::ApproveDrug,
        Transition::RejectDrug,
        Transition::ManufactureDrug,
        Transition::TransferToRepackager,
        Transition::TransferToDistributor,
        Transition::TransferToPharmacy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Transition::CreateBatch => "createBatch",
            Transition::TransferToManufacturer => "transferToManufacturer",
            Transition::RequestFdaApproval => "requestFDAApproval",
            Transition::ApproveDrug => "approveDrug",
            Transition::RejectDrug => "rejectDrug",
            Transition::ManufactureDrug => "manufactureDrug",
            Transition::TransferToRepackager => "transferToRepackager",
            Transition::TransferToDistributor => "transferToDistributor",
            Transition::TransferToPharmacy => "transferToPharmacy",
        }
    }

    pub fn rule(self) -> &'static TransitionRule {
        rule_for(self)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Who besides the role check may invoke a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Caller must be the batch's current owner.
    CurrentOwner,
    /// Any holder of the role (FDA review).
    Unrestricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub transition: Transition,
    pub from: BatchStatus,
    pub role: Role,
    pub ownership: Ownership,
    pub to: BatchStatus,
    /// Role the new owner must hold; `None` keeps the current owner.
    pub recipient: Option<Role>,
}

impl TransitionRule {
    /// True when `actor` (with `role`) may fire this rule against `batch`.
    pub fn admits(&self, batch: &Batch, role: Role, actor: &Address) -> bool {
        self.from == batch.status
            && self.role == role
            && match self.ownership {
                Ownership::CurrentOwner => batch.is_owned_by(actor),
                Ownership::Unrestricted => true,
            }
    }
}

const fn rule(
    transition: Transition,
    from: BatchStatus,
    role: Role,
    ownership: Ownership,
    to: BatchStatus,
    recipient: Option<Role>,
) -> TransitionRule {
    TransitionRule {
        transition,
        from,
        role,
        ownership,
        to,
        recipient,
    }
}

/// The complete custody table.
///
/// `transferToManufacturer` keeps the status at `IngredientsSupplied` and only
/// moves ownership. `CreateBatch` sits at `None` since no stored batch can be
/// in that status; it never matches an existing batch.
pub const RULES: [TransitionRule; 9] = {
    use BatchStatus as S;
    use Ownership::{CurrentOwner, Unrestricted};
    use Role as R;
    use Transition as T;
    [
        rule(T::CreateBatch, S::None, R::IngredientSupplier, Unrestricted, S::IngredientsSupplied, None),
        rule(T::TransferToManufacturer, S::IngredientsSupplied, R::IngredientSupplier, CurrentOwner, S::IngredientsSupplied, Some(R::Manufacturer)),
        rule(T::RequestFdaApproval, S::IngredientsSupplied, R::Manufacturer, CurrentOwner, S::FdaPending, None),
        rule(T::ApproveDrug, S::FdaPending, R::Fda, Unrestricted, S::FdaApproved, None),
        rule(T::RejectDrug, S::FdaPending, R::Fda, Unrestricted, S::FdaRejected, None),
        rule(T::ManufactureDrug, S::FdaApproved, R::Manufacturer, CurrentOwner, S::Manufactured, None),
        rule(T::TransferToRepackager, S::Manufactured, R::Manufacturer, CurrentOwner, S::Repackaged, Some(R::Repackager)),
        rule(T::TransferToDistributor, S::Repackaged, R::Repackager, CurrentOwner, S::Distributed, Some(R::Distributor)),
        rule(T::TransferToPharmacy, S::Distributed, R::Distributor, CurrentOwner, S::Dispensed, Some(R::Pharmacy)),
    ]
};

pub fn rule_for(transition: Transition) -> &'static TransitionRule {
    &RULES[transition as usize]
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Why a transition was refused. Nothing has been written when this is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    InactiveActor {
        actor: Address,
    },
    WrongRole {
        transition: Transition,
        required: Role,
        actual: Role,
    },
    NotOwner {
        transition: Transition,
        owner: Address,
        actor: Address,
    },
    WrongStatus {
        transition: Transition,
        expected: BatchStatus,
        actual: BatchStatus,
    },
    MissingRecipient {
        transition: Transition,
    },
    InvalidRecipient {
        transition: Transition,
        recipient: Address,
        reason: String,
    },
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::InactiveActor { .. }
            | TransitionError::WrongRole { .. }
            | TransitionError::NotOwner { .. } => ErrorKind::Unauthorized,
            TransitionError::WrongStatus { .. } => ErrorKind::InvalidState,
            TransitionError::MissingRecipient { .. } | TransitionError::InvalidRecipient { .. } => {
                ErrorKind::ValidationError
            }
        }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::InactiveActor { actor } => {
                write!(f, "actor {actor} is deactivated")
            }
            TransitionError::WrongRole {
                transition,
                required,
                actual,
            } => write!(
                f,
                "{transition} requires role {} (caller is {})",
                required.label(),
                actual.label()
            ),
            TransitionError::NotOwner {
                transition,
                owner,
                actor,
            } => write!(
                f,
                "{transition}: caller {actor} is not the current owner ({owner})"
            ),
            TransitionError::WrongStatus {
                transition,
                expected,
                actual,
            } => {
                if actual.is_terminal() {
                    write!(
                        f,
                        "{transition}: batch is in terminal status {}",
                        actual.label()
                    )
                } else {
                    write!(
                        f,
                        "{transition} requires status {} (batch is {})",
                        expected.label(),
                        actual.label()
                    )
                }
            }
            TransitionError::MissingRecipient { transition } => {
                write!(f, "{transition} requires a recipient address")
            }
            TransitionError::InvalidRecipient {
                transition,
                recipient,
                reason,
            } => write!(f, "{transition}: recipient {recipient} {reason}"),
        }
    }
}

impl std::error::Error for TransitionError {}

impl From<TransitionError> for CoreError {
    fn from(e: TransitionError) -> Self {
        CoreError::new(e.kind(), e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Target of an ownership transfer as resolved by the caller. `user` is
/// `None` when the address is not registered.
#[derive(Debug, Clone, Copy)]
pub struct Recipient<'a> {
    pub address: &'a Address,
    pub user: Option<&'a User>,
}

/// A validated transition, ready to be written as one ledger operation.
///
/// `expected_status` and `expected_owner` are the precondition the ledger
/// re-checks at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub transition: Transition,
    pub batch_id: String,
    pub actor: Address,
    pub expected_status: BatchStatus,
    pub expected_owner: Address,
    pub next_status: BatchStatus,
    pub next_owner: Address,
}

fn check_actor(transition: Transition, actor: &User) -> Result<(), TransitionError> {
    let r = rule_for(transition);
    if actor.role != r.role {
        return Err(TransitionError::WrongRole {
            transition,
            required: r.role,
            actual: actor.role,
        });
    }
    if !actor.is_active {
        return Err(TransitionError::InactiveActor {
            actor: actor.address.clone(),
        });
    }
    Ok(())
}

/// Batch creation has no source batch; only the actor is checked.
pub fn authorize_create(actor: &User) -> Result<(), TransitionError> {
    check_actor(Transition::CreateBatch, actor)
}

/// Validate `transition` against `batch` and produce the write to perform.
pub fn plan(
    transition: Transition,
    batch: &Batch,
    actor: &User,
    recipient: Option<Recipient<'_>>,
) -> Result<TransitionPlan, TransitionError> {
    let r = rule_for(transition);

    check_actor(transition, actor)?;

    if r.ownership == Ownership::CurrentOwner && !batch.is_owned_by(&actor.address) {
        return Err(TransitionError::NotOwner {
            transition,
            owner: batch.current_owner.clone(),
            actor: actor.address.clone(),
        });
    }

    if batch.status != r.from {
        return Err(TransitionError::WrongStatus {
            transition,
            expected: r.from,
            actual: batch.status,
        });
    }

    let next_owner = match r.recipient {
        None => batch.current_owner.clone(),
        Some(required) => {
            let Some(rcpt) = recipient else {
                return Err(TransitionError::MissingRecipient { transition });
            };
            let invalid = |reason: String| TransitionError::InvalidRecipient {
                transition,
                recipient: rcpt.address.clone(),
                reason,
            };
            let user = rcpt.user.ok_or_else(|| invalid("is not registered".to_string()))?;
            if user.role != required {
                return Err(invalid(format!(
                    "is a {}, expected a {}",
                    user.role.label(),
                    required.label()
                )));
            }
            if !user.is_active {
                return Err(invalid("is deactivated".to_string()));
            }
            user.address.clone()
        }
    };

    Ok(TransitionPlan {
        transition,
        batch_id: batch.batch_id.clone(),
        actor: actor.address.clone(),
        expected_status: batch.status,
        expected_owner: batch.current_owner.clone(),
        next_status: r.to,
        next_owner,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
