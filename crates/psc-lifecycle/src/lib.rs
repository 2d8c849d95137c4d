//! psc-lifecycle
//!
//! Pure batch custody rules: the transition table, its validation, and the
//! per-actor action deriver built on top of it.
//!
//! Nothing here performs IO. Callers fetch the batch and actors from the
//! ledger, ask this crate whether the transition is legal, and hand the
//! resulting [`TransitionPlan`] to the ledger as a single write.

mod actions;
mod transitions;

pub use actions::{
    derive_action, notifications, pending_actions, AlertNotice, NextAction, Notification,
    PendingAction,
};
pub use transitions::{
    authorize_create, plan, rule_for, Ownership, Recipient, Transition, TransitionError,
    TransitionPlan, TransitionRule, RULES,
};
