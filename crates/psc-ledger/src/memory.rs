//! In-process ledger.
//!
//! All state sits behind one mutex together with the chain head, so every
//! write is validated, sealed, journaled and applied without interleaving.
//! Replay goes through the same [`State::apply`] as live writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use psc_lifecycle::{rule_for, Transition};
use psc_schemas::{
    Address, Alert, Batch, BatchStatus, FdaDecision, IotReading, Role, TransactionRecord, User,
};
use tracing::{error, info};

use crate::journal::{JournalEntry, JournalFile, LedgerOp};
use crate::{
    Ledger, LedgerCounts, LedgerError, NewAlert, NewBatch, NewReading, NewUser, Receipt,
    Resolution, TransitionWrite,
};

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<Address, User>,
    /// Registration order.
    user_order: Vec<Address>,
    batches: BTreeMap<String, Batch>,
    /// Creation order.
    batch_order: Vec<String>,
    transactions: Vec<TransactionRecord>,
    tx_by_batch: BTreeMap<String, Vec<usize>>,
    readings: Vec<IotReading>,
    readings_by_batch: BTreeMap<String, Vec<usize>>,
    alerts: Vec<Alert>,
    alerts_by_batch: BTreeMap<String, Vec<usize>>,
    decisions: BTreeMap<String, FdaDecision>,
}

impl State {
    fn active_user(&self, address: &Address) -> Option<&User> {
        self.users.get(address).filter(|u| u.is_active)
    }

    fn require_batch(&self, batch_id: &str) -> Result<&Batch, LedgerError> {
        self.batches
            .get(batch_id)
            .ok_or_else(|| LedgerError::NotFound(format!("batch {batch_id}")))
    }

    /// Apply a sealed op. Live writes validate first, so an error here means
    /// a journal that does not describe a reachable state.
    fn apply(&mut self, op: &LedgerOp) -> Result<(), LedgerError> {
        match op {
            LedgerOp::RegisterUser { user } => {
                if self.users.contains_key(&user.address) {
                    return Err(LedgerError::AlreadyExists(format!("user {}", user.address)));
                }
                self.user_order.push(user.address.clone());
                self.users.insert(user.address.clone(), user.clone());
            }
            LedgerOp::CreateBatch { batch } => {
                if self.batches.contains_key(&batch.batch_id) {
                    return Err(LedgerError::AlreadyExists(format!("batch {}", batch.batch_id)));
                }
                self.batch_order.push(batch.batch_id.clone());
                self.batches.insert(batch.batch_id.clone(), batch.clone());
            }
            LedgerOp::Transition {
                record, decision, ..
            } => {
                let batch = self
                    .batches
                    .get_mut(&record.batch_id)
                    .ok_or_else(|| LedgerError::NotFound(format!("batch {}", record.batch_id)))?;
                batch.status = record.status;
                batch.current_owner = record.to.clone();
                self.tx_by_batch
                    .entry(record.batch_id.clone())
                    .or_default()
                    .push(self.transactions.len());
                self.transactions.push(record.clone());
                if let Some(d) = decision {
                    self.decisions.insert(d.batch_id.clone(), d.clone());
                }
            }
            LedgerOp::AppendReading { reading } => {
                self.require_batch(&reading.batch_id)?;
                self.readings_by_batch
                    .entry(reading.batch_id.clone())
                    .or_default()
                    .push(self.readings.len());
                self.readings.push(reading.clone());
            }
            LedgerOp::AppendAlert { alert } => {
                self.require_batch(&alert.batch_id)?;
                self.alerts_by_batch
                    .entry(alert.batch_id.clone())
                    .or_default()
                    .push(self.alerts.len());
                self.alerts.push(alert.clone());
            }
            LedgerOp::ResolveAlert {
                alert_id,
                resolved_by,
                resolved_at,
            } => {
                let alert = usize::try_from(*alert_id)
                    .ok()
                    .and_then(|i| self.alerts.get_mut(i))
                    .ok_or_else(|| LedgerError::NotFound(format!("alert {alert_id}")))?;
                alert.resolved = true;
                alert.resolved_by = Some(resolved_by.clone());
                alert.resolved_at = Some(*resolved_at);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    state: State,
    journal: Option<JournalFile>,
    seq: u64,
    last_hash: Option<String>,
}

impl Inner {
    fn commit(&mut self, op: LedgerOp) -> Result<Receipt, LedgerError> {
        let entry = JournalEntry::seal(self.seq, self.last_hash.as_deref(), op)?;
        if let Some(journal) = &mut self.journal {
            if let Err(e) = journal.append(&entry) {
                error!(seq = entry.seq, op = entry.op.name(), error = %e, "journal append failed");
                return Err(e);
            }
        }
        self.state.apply(&entry.op)?;
        self.seq += 1;
        self.last_hash = entry.hash_self.clone();
        Ok(Receipt {
            seq: entry.seq,
            tx_hash: entry.tx_hash().to_string(),
        })
    }
}

/// In-memory [`Ledger`], optionally backed by a journal file.
#[derive(Debug)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

impl MemoryLedger {
    /// Volatile ledger. Receipts are still hash-chained.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::default(),
                journal: None,
                seq: 0,
                last_hash: None,
            }),
        }
    }

    /// Open a journaled ledger, replaying any entries already at `path`.
    ///
    /// Fails with [`LedgerError::Corrupt`] if the chain does not verify or an
    /// entry cannot be applied.
    pub fn open_journaled(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let (journal, entries) = JournalFile::open(path)?;
        let mut state = State::default();
        for entry in &entries {
            state.apply(&entry.op).map_err(|e| LedgerError::Corrupt {
                line: entry.seq as usize + 1,
                reason: format!("{} does not apply: {e}", entry.op.name()),
            })?;
        }
        let seq = entries.len() as u64;
        let last_hash = entries.last().and_then(|e| e.hash_self.clone());
        info!(path = ?journal.path(), entries = seq, "ledger journal replayed");
        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                journal: Some(journal),
                seq,
                last_hash,
            }),
        })
    }

    pub fn journal_path(&self) -> Option<PathBuf> {
        self.lock().journal.as_ref().map(|j| j.path().to_path_buf())
    }

    /// Number of committed writes and the hash of the latest one.
    pub fn head(&self) -> (u64, Option<String>) {
        let inner = self.lock();
        (inner.seq, inner.last_hash.clone())
    }

    // Writes either complete or leave state untouched, so a poisoned lock
    // still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Ledger for MemoryLedger {
    fn get_user(&self, address: &Address) -> Result<Option<User>, LedgerError> {
        Ok(self.lock().state.users.get(address).cloned())
    }

    fn register_user(&self, new: NewUser) -> Result<(User, Receipt), LedgerError> {
        let mut inner = self.lock();
        if new.address.is_system() {
            return Err(LedgerError::Invalid(
                "the system address cannot be registered".to_string(),
            ));
        }
        if inner.state.users.contains_key(&new.address) {
            return Err(LedgerError::AlreadyExists(format!("user {}", new.address)));
        }
        let user = User {
            address: new.address,
            name: new.name,
            role: new.role,
            is_active: true,
            registered_at: now(),
        };
        let receipt = inner.commit(LedgerOp::RegisterUser { user: user.clone() })?;
        info!(address = %user.address, role = user.role.label(), seq = receipt.seq, "user registered");
        Ok((user, receipt))
    }

    fn list_users(&self) -> Result<Vec<User>, LedgerError> {
        let inner = self.lock();
        Ok(inner
            .state
            .user_order
            .iter()
            .filter_map(|a| inner.state.users.get(a).cloned())
            .collect())
    }

    fn get_batch(&self, batch_id: &str) -> Result<Option<Batch>, LedgerError> {
        Ok(self.lock().state.batches.get(batch_id).cloned())
    }

    fn create_batch(&self, new: NewBatch) -> Result<(Batch, Receipt), LedgerError> {
        let mut inner = self.lock();
        if new.batch_id.trim().is_empty() {
            return Err(LedgerError::Invalid("batch id must not be empty".to_string()));
        }
        if inner.state.batches.contains_key(&new.batch_id) {
            return Err(LedgerError::AlreadyExists(format!("batch {}", new.batch_id)));
        }
        match inner.state.active_user(&new.creator) {
            Some(u) if u.role == Role::IngredientSupplier => {}
            _ => {
                return Err(LedgerError::Unauthorized(format!(
                    "{} is not an active Ingredient Supplier",
                    new.creator
                )))
            }
        }
        let batch = Batch {
            batch_id: new.batch_id,
            drug_name: new.drug_name,
            current_owner: new.creator,
            status: BatchStatus::IngredientsSupplied,
            created_at: now(),
            exists: true,
        };
        let receipt = inner.commit(LedgerOp::CreateBatch {
            batch: batch.clone(),
        })?;
        info!(batch_id = %batch.batch_id, owner = %batch.current_owner, seq = receipt.seq, "batch created");
        Ok((batch, receipt))
    }

    fn list_batches(&self) -> Result<Vec<Batch>, LedgerError> {
        let inner = self.lock();
        Ok(inner
            .state
            .batch_order
            .iter()
            .filter_map(|id| inner.state.batches.get(id).cloned())
            .collect())
    }

    fn append_transaction(
        &self,
        write: TransitionWrite,
    ) -> Result<(TransactionRecord, Receipt), LedgerError> {
        let TransitionWrite {
            plan,
            location,
            remarks,
        } = write;
        let rule = rule_for(plan.transition);
        let mut inner = self.lock();

        if plan.transition == Transition::CreateBatch
            || plan.expected_status != rule.from
            || plan.next_status != rule.to
        {
            return Err(LedgerError::Invalid(format!(
                "plan for {} does not match the transition table",
                plan.transition
            )));
        }

        let batch = inner.state.require_batch(&plan.batch_id)?;
        if batch.status != plan.expected_status || batch.current_owner != plan.expected_owner {
            return Err(LedgerError::StalePrecondition {
                batch_id: plan.batch_id.clone(),
                expected_status: plan.expected_status,
                actual_status: batch.status,
                expected_owner: plan.expected_owner.clone(),
                actual_owner: batch.current_owner.clone(),
            });
        }

        match inner.state.active_user(&plan.actor) {
            Some(u) if u.role == rule.role => {}
            _ => {
                return Err(LedgerError::Unauthorized(format!(
                    "{} may not {}",
                    plan.actor, plan.transition
                )))
            }
        }

        match rule.recipient {
            Some(role) => match inner.state.active_user(&plan.next_owner) {
                Some(u) if u.role == role => {}
                _ => {
                    return Err(LedgerError::Invalid(format!(
                        "recipient {} is not an active {}",
                        plan.next_owner,
                        role.label()
                    )))
                }
            },
            None if plan.next_owner != plan.expected_owner => {
                return Err(LedgerError::Invalid(format!(
                    "{} does not change ownership",
                    plan.transition
                )));
            }
            None => {}
        }

        let ts = now();
        let decision = match plan.transition {
            Transition::ApproveDrug | Transition::RejectDrug => Some(FdaDecision {
                batch_id: plan.batch_id.clone(),
                approved: plan.transition == Transition::ApproveDrug,
                timestamp: ts,
                remarks: remarks.clone(),
                decided_by: plan.actor.clone(),
            }),
            _ => None,
        };
        let record = TransactionRecord {
            id: inner.state.transactions.len() as u64,
            batch_id: plan.batch_id.clone(),
            from: plan.actor.clone(),
            to: plan.next_owner.clone(),
            status: plan.next_status,
            timestamp: ts,
            location,
            remarks,
        };

        let receipt = inner.commit(LedgerOp::Transition {
            transition: plan.transition,
            record: record.clone(),
            decision,
        })?;
        info!(
            batch_id = %record.batch_id,
            transition = plan.transition.name(),
            status = record.status.label(),
            owner = %record.to,
            seq = receipt.seq,
            "transition committed"
        );
        Ok((record, receipt))
    }

    fn list_transactions_for_batch(
        &self,
        batch_id: &str,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let inner = self.lock();
        Ok(inner
            .state
            .tx_by_batch
            .get(batch_id)
            .map(|ix| ix.iter().map(|&i| inner.state.transactions[i].clone()).collect())
            .unwrap_or_default())
    }

    fn list_all_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>, LedgerError> {
        Ok(self
            .lock()
            .state
            .transactions
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn append_reading(&self, new: NewReading) -> Result<(IotReading, Receipt), LedgerError> {
        let mut inner = self.lock();
        inner.state.require_batch(&new.batch_id)?;
        let reading = IotReading {
            id: inner.state.readings.len() as u64,
            batch_id: new.batch_id,
            timestamp: now(),
            location: new.location,
            temperature_centi: new.temperature_centi,
            humidity: new.humidity,
            pressure: new.pressure,
            tamper_detected: new.tamper_detected,
            recorded_by: new.recorded_by,
        };
        let receipt = inner.commit(LedgerOp::AppendReading {
            reading: reading.clone(),
        })?;
        Ok((reading, receipt))
    }

    fn list_readings_for_batch(&self, batch_id: &str) -> Result<Vec<IotReading>, LedgerError> {
        let inner = self.lock();
        Ok(inner
            .state
            .readings_by_batch
            .get(batch_id)
            .map(|ix| ix.iter().map(|&i| inner.state.readings[i].clone()).collect())
            .unwrap_or_default())
    }

    fn append_alert(&self, new: NewAlert) -> Result<(Alert, Receipt), LedgerError> {
        let mut inner = self.lock();
        inner.state.require_batch(&new.batch_id)?;
        let alert = Alert {
            id: inner.state.alerts.len() as u64,
            batch_id: new.batch_id,
            alert_type: new.alert_type,
            timestamp: now(),
            message: new.message,
            resolved: false,
            raised_by: new.raised_by,
            resolved_by: None,
            resolved_at: None,
        };
        let receipt = inner.commit(LedgerOp::AppendAlert {
            alert: alert.clone(),
        })?;
        Ok((alert, receipt))
    }

    fn get_alert(&self, id: u64) -> Result<Option<Alert>, LedgerError> {
        let inner = self.lock();
        Ok(usize::try_from(id)
            .ok()
            .and_then(|i| inner.state.alerts.get(i))
            .cloned())
    }

    fn list_alerts(&self) -> Result<Vec<Alert>, LedgerError> {
        Ok(self.lock().state.alerts.clone())
    }

    fn list_alerts_for_batch(&self, batch_id: &str) -> Result<Vec<Alert>, LedgerError> {
        let inner = self.lock();
        Ok(inner
            .state
            .alerts_by_batch
            .get(batch_id)
            .map(|ix| ix.iter().map(|&i| inner.state.alerts[i].clone()).collect())
            .unwrap_or_default())
    }

    fn resolve_alert(&self, id: u64, by: &Address) -> Result<Resolution, LedgerError> {
        let mut inner = self.lock();
        let Some(alert) = usize::try_from(id)
            .ok()
            .and_then(|i| inner.state.alerts.get(i))
            .cloned()
        else {
            return Err(LedgerError::NotFound(format!("alert {id}")));
        };

        match inner.state.active_user(by) {
            Some(u) if u.role != Role::Patient => {}
            _ => {
                return Err(LedgerError::Unauthorized(format!(
                    "{by} may not resolve alerts"
                )))
            }
        }

        if alert.resolved {
            return Ok(Resolution {
                alert,
                receipt: None,
            });
        }

        let receipt = inner.commit(LedgerOp::ResolveAlert {
            alert_id: id,
            resolved_by: by.clone(),
            resolved_at: now(),
        })?;
        let alert = inner.state.alerts[alert.id as usize].clone();
        info!(alert_id = id, by = %by, seq = receipt.seq, "alert resolved");
        Ok(Resolution {
            alert,
            receipt: Some(receipt),
        })
    }

    fn get_fda_decision(&self, batch_id: &str) -> Result<Option<FdaDecision>, LedgerError> {
        Ok(self.lock().state.decisions.get(batch_id).cloned())
    }

    fn counts(&self) -> Result<LedgerCounts, LedgerError> {
        let inner = self.lock();
        let s = &inner.state;
        let mut batches_by_status = BTreeMap::new();
        for b in s.batches.values() {
            *batches_by_status.entry(b.status.code()).or_insert(0) += 1;
        }
        Ok(LedgerCounts {
            users: s.users.len(),
            batches: s.batches.len(),
            transactions: s.transactions.len(),
            readings: s.readings.len(),
            alerts: s.alerts.len(),
            unresolved_alerts: s.alerts.iter().filter(|a| !a.resolved).count(),
            batches_by_status,
        })
    }
}
