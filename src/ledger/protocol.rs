//! Validation and planning for Take/Back movements.
//!
//! Planning is pure: it reads snapshots of the pool, the worker and the
//! pair's ledger head, runs every check, and produces a [`Posting`] describing
//! the writes. Nothing is mutated here, so a rejected movement cannot leave
//! residue. [`LedgerDb`](super::db::LedgerDb) applies the posting inside the
//! same transaction the snapshots were read in.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::models::*;
use crate::errors::{LedgerError, Missing};

/// The parts of a ledger entry the protocol needs; history is never loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerHead {
    pub id: RecordId,
    pub cumulative_quantity: Quantity,
}

/// What happens to the pool and worker mirrors for the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorUpdate {
    Set(Quantity),
    Remove,
}

/// The complete set of writes for one movement.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub kind: ResourceKind,
    pub resource_id: RecordId,
    pub worker_id: RecordId,
    /// `None` when the pair has no ledger entry yet and one must be created.
    pub entry_id: Option<RecordId>,
    pub cumulative_quantity: Quantity,
    pub available_quantity: Quantity,
    pub mirror: MirrorUpdate,
    pub record: HistoryRecord,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Gate returns on the same eligibility check as checkouts.
    pub return_requires_eligibility: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            return_requires_eligibility: true,
        }
    }
}

fn check_quantity(quantity: Quantity) -> Result<(), LedgerError> {
    if quantity <= 0 {
        return Err(LedgerError::InvalidQuantity { quantity });
    }
    Ok(())
}

fn check_eligibility(pool: &ResourcePool, worker: &Worker) -> Result<(), LedgerError> {
    if pool.eligibility_level > worker.eligibility_level {
        debug!(
            resource_id = %pool.id,
            worker_id = %worker.id,
            required = pool.eligibility_level,
            actual = worker.eligibility_level,
            "eligibility check failed"
        );
        return Err(LedgerError::PermissionMismatch {
            resource_id: pool.id,
            worker_id: worker.id,
            required: pool.eligibility_level,
            actual: worker.eligibility_level,
        });
    }
    Ok(())
}

fn history_record(operation: Operation, mv: &Movement, at: DateTime<Utc>) -> HistoryRecord {
    HistoryRecord {
        quantity: mv.quantity,
        operation,
        label: mv
            .label
            .clone()
            .unwrap_or_else(|| operation.default_label().to_string()),
        at,
    }
}

/// Plan a checkout of `mv.quantity` from `pool` to `worker`.
pub fn plan_take(
    pool: &ResourcePool,
    worker: &Worker,
    head: Option<&LedgerHead>,
    mv: &Movement,
    at: DateTime<Utc>,
) -> Result<Posting, LedgerError> {
    check_quantity(mv.quantity)?;
    check_eligibility(pool, worker)?;

    if mv.quantity > pool.available_quantity {
        debug!(
            resource_id = %pool.id,
            requested = mv.quantity,
            available = pool.available_quantity,
            "availability check failed"
        );
        return Err(LedgerError::InsufficientAvailability {
            resource_id: pool.id,
            requested: mv.quantity,
            available: pool.available_quantity,
        });
    }

    let held = head.map_or(0, |h| h.cumulative_quantity);
    let cumulative_quantity = held
        .checked_add(mv.quantity)
        .ok_or(LedgerError::InvalidQuantity {
            quantity: mv.quantity,
        })?;

    Ok(Posting {
        kind: pool.kind,
        resource_id: pool.id,
        worker_id: worker.id,
        entry_id: head.map(|h| h.id),
        cumulative_quantity,
        available_quantity: pool.available_quantity - mv.quantity,
        mirror: MirrorUpdate::Set(cumulative_quantity),
        record: history_record(Operation::Take, mv, at),
        note: mv.note.clone(),
        at,
    })
}

/// Plan a return of `mv.quantity` from `worker` to `pool`.
pub fn plan_back(
    pool: &ResourcePool,
    worker: &Worker,
    head: Option<&LedgerHead>,
    mv: &Movement,
    at: DateTime<Utc>,
    policy: Policy,
) -> Result<Posting, LedgerError> {
    check_quantity(mv.quantity)?;
    if policy.return_requires_eligibility {
        check_eligibility(pool, worker)?;
    }

    let head = head.ok_or(LedgerError::NotFound(Missing::Relationship {
        kind: pool.kind,
        resource_id: pool.id,
        worker_id: worker.id,
    }))?;

    if mv.quantity > head.cumulative_quantity {
        debug!(
            resource_id = %pool.id,
            worker_id = %worker.id,
            requested = mv.quantity,
            held = head.cumulative_quantity,
            "excess return rejected"
        );
        return Err(LedgerError::ExcessReturn {
            resource_id: pool.id,
            worker_id: worker.id,
            requested: mv.quantity,
            held: head.cumulative_quantity,
        });
    }

    // A live entry must have live mirrors on both sides.
    let pool_mirror = pool.current_holders.get(&worker.id);
    let worker_mirror = worker.holdings(pool.kind).get(&pool.id);
    if pool_mirror.is_none() || worker_mirror.is_none() {
        let detail = match (pool_mirror, worker_mirror) {
            (None, None) => "both holding mirrors are missing",
            (None, Some(_)) => "pool holder mirror is missing",
            _ => "worker holding mirror is missing",
        };
        warn!(
            resource_id = %pool.id,
            worker_id = %worker.id,
            cumulative = head.cumulative_quantity,
            detail,
            "ledger entry without mirrors"
        );
        return Err(LedgerError::InconsistentState {
            resource_id: pool.id,
            worker_id: worker.id,
            detail: detail.to_string(),
        });
    }

    let available_quantity = pool
        .available_quantity
        .checked_add(mv.quantity)
        .ok_or_else(|| LedgerError::InconsistentState {
            resource_id: pool.id,
            worker_id: worker.id,
            detail: "available quantity overflow".to_string(),
        })?;
    let cumulative_quantity = head.cumulative_quantity - mv.quantity;
    let mirror = if cumulative_quantity == 0 {
        MirrorUpdate::Remove
    } else {
        MirrorUpdate::Set(cumulative_quantity)
    };

    Ok(Posting {
        kind: pool.kind,
        resource_id: pool.id,
        worker_id: worker.id,
        entry_id: Some(head.id),
        cumulative_quantity,
        available_quantity,
        mirror,
        record: history_record(Operation::Back, mv, at),
        note: mv.note.clone(),
        at,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn pool(available: Quantity, level: i32) -> ResourcePool {
        let now = Utc::now();
        ResourcePool {
            id: RecordId::new(),
            kind: ResourceKind::Custody,
            name: "Pattern shears".into(),
            total_quantity: 100,
            available_quantity: available,
            min_threshold: 0,
            max_threshold: 0,
            eligibility_level: level,
            current_holders: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn worker(level: i32) -> Worker {
        Worker {
            id: RecordId::new(),
            name: "Cutter".into(),
            eligibility_level: level,
            current_custody: BTreeMap::new(),
            current_materials: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Pool and worker with `held` already checked out and mirrored.
    fn holding(held: Quantity) -> (ResourcePool, Worker, LedgerHead) {
        let mut p = pool(100 - held, 1);
        let mut w = worker(1);
        p.current_holders.insert(w.id, held);
        w.current_custody.insert(p.id, held);
        let head = LedgerHead {
            id: RecordId::new(),
            cumulative_quantity: held,
        };
        (p, w, head)
    }

    #[test]
    fn take_rejects_worker_below_pool_level() {
        let p = pool(100, 5);
        let w = worker(3);
        let mv = Movement::new(p.id, w.id, 1);
        let err = plan_take(&p, &w, None, &mv, Utc::now()).unwrap_err();
        match err {
            LedgerError::PermissionMismatch {
                required, actual, ..
            } => {
                assert_eq!(required, 5);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected PermissionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn take_allows_worker_at_pool_level() {
        let p = pool(100, 5);
        let w = worker(5);
        let mv = Movement::new(p.id, w.id, 1);
        assert!(plan_take(&p, &w, None, &mv, Utc::now()).is_ok());
    }

    #[test]
    fn take_of_entire_balance_succeeds_and_one_more_fails() {
        let p = pool(70, 0);
        let w = worker(0);

        let posting = plan_take(&p, &w, None, &Movement::new(p.id, w.id, 70), Utc::now()).unwrap();
        assert_eq!(posting.available_quantity, 0);
        assert_eq!(posting.cumulative_quantity, 70);

        let err = plan_take(&p, &w, None, &Movement::new(p.id, w.id, 71), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientAvailability {
                requested: 71,
                available: 70,
                ..
            }
        ));
    }

    #[test]
    fn first_take_requests_entry_creation() {
        let p = pool(100, 0);
        let w = worker(0);
        let posting = plan_take(&p, &w, None, &Movement::new(p.id, w.id, 30), Utc::now()).unwrap();
        assert_eq!(posting.entry_id, None);
        assert_eq!(posting.mirror, MirrorUpdate::Set(30));
        assert_eq!(posting.record.operation, Operation::Take);
        assert_eq!(posting.record.label, "Take");
    }

    #[test]
    fn repeat_take_accumulates_on_existing_entry() {
        let (p, w, head) = holding(30);
        let mv = Movement::new(p.id, w.id, 5).with_label("second shift");
        let posting = plan_take(&p, &w, Some(&head), &mv, Utc::now()).unwrap();
        assert_eq!(posting.entry_id, Some(head.id));
        assert_eq!(posting.cumulative_quantity, 35);
        assert_eq!(posting.available_quantity, 65);
        assert_eq!(posting.record.label, "second shift");
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let p = pool(100, 0);
        let w = worker(0);
        for q in [0, -4] {
            let err = plan_take(&p, &w, None, &Movement::new(p.id, w.id, q), Utc::now()).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidQuantity { quantity } if quantity == q));
        }
    }

    #[test]
    fn back_without_entry_is_not_found() {
        let p = pool(100, 0);
        let w = worker(0);
        let err = plan_back(
            &p,
            &w,
            None,
            &Movement::new(p.id, w.id, 1),
            Utc::now(),
            Policy::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::NotFound(Missing::Relationship { .. })
        ));
    }

    #[test]
    fn back_more_than_held_is_excess_return() {
        let (p, w, head) = holding(20);
        let err = plan_back(
            &p,
            &w,
            Some(&head),
            &Movement::new(p.id, w.id, 21),
            Utc::now(),
            Policy::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ExcessReturn {
                requested: 21,
                held: 20,
                ..
            }
        ));
    }

    #[test]
    fn back_to_zero_removes_mirrors() {
        let (p, w, head) = holding(20);
        let posting = plan_back(
            &p,
            &w,
            Some(&head),
            &Movement::new(p.id, w.id, 20),
            Utc::now(),
            Policy::default(),
        )
        .unwrap();
        assert_eq!(posting.cumulative_quantity, 0);
        assert_eq!(posting.available_quantity, 100);
        assert_eq!(posting.mirror, MirrorUpdate::Remove);
        assert_eq!(posting.record.label, "Back");
    }

    #[test]
    fn partial_back_updates_mirrors() {
        let (p, w, head) = holding(30);
        let posting = plan_back(
            &p,
            &w,
            Some(&head),
            &Movement::new(p.id, w.id, 10),
            Utc::now(),
            Policy::default(),
        )
        .unwrap();
        assert_eq!(posting.mirror, MirrorUpdate::Set(20));
        assert_eq!(posting.available_quantity, 80);
    }

    #[test]
    fn back_with_missing_worker_mirror_is_inconsistent() {
        let (p, mut w, head) = holding(10);
        w.current_custody.clear();
        let err = plan_back(
            &p,
            &w,
            Some(&head),
            &Movement::new(p.id, w.id, 5),
            Utc::now(),
            Policy::default(),
        )
        .unwrap_err();
        match err {
            LedgerError::InconsistentState { detail, .. } => {
                assert!(detail.contains("worker"));
            }
            other => panic!("Expected InconsistentState, got {:?}", other),
        }
    }

    #[test]
    fn back_checks_eligibility_unless_policy_disables_it() {
        let (mut p, w, head) = holding(10);
        p.eligibility_level = 9;
        let mv = Movement::new(p.id, w.id, 5);

        let err = plan_back(&p, &w, Some(&head), &mv, Utc::now(), Policy::default()).unwrap_err();
        assert!(matches!(err, LedgerError::PermissionMismatch { .. }));

        let lenient = Policy {
            return_requires_eligibility: false,
        };
        assert!(plan_back(&p, &w, Some(&head), &mv, Utc::now(), lenient).is_ok());
    }

    #[test]
    fn note_is_carried_into_posting() {
        let p = pool(100, 0);
        let w = worker(0);
        let mv = Movement::new(p.id, w.id, 1).with_note("for sample run");
        let posting = plan_take(&p, &w, None, &mv, Utc::now()).unwrap();
        assert_eq!(posting.note.as_deref(), Some("for sample run"));
    }
}
