//! Typed error hierarchy for the circulation ledger.
//!
//! Every domain failure carries the ids and quantities needed to tell the
//! caller which field was at fault. Storage failures are wrapped but never
//! swallowed.

use thiserror::Error;

use crate::ledger::models::{Quantity, RecordId, ResourceKind};

/// The record a lookup failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Resource { kind: ResourceKind, id: RecordId },
    Worker { id: RecordId },
    /// No ledger entry exists for the pair: the worker never took this resource.
    Relationship {
        kind: ResourceKind,
        resource_id: RecordId,
        worker_id: RecordId,
    },
    Ledger { kind: ResourceKind, id: RecordId },
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Resource { kind, id } => write!(f, "{} resource {}", kind, id),
            Missing::Worker { id } => write!(f, "worker {}", id),
            Missing::Relationship {
                kind,
                resource_id,
                worker_id,
            } => write!(
                f,
                "no relationship between {} resource {} and worker {}",
                kind, resource_id, worker_id
            ),
            Missing::Ledger { kind, id } => write!(f, "{} ledger entry {}", kind, id),
        }
    }
}

/// Errors from the circulation ledger and its directory.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid identifier for '{field}': {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: Quantity },

    #[error("Not found: {0}")]
    NotFound(Missing),

    #[error(
        "Worker {worker_id} has eligibility level {actual}, resource {resource_id} requires {required}"
    )]
    PermissionMismatch {
        resource_id: RecordId,
        worker_id: RecordId,
        required: i32,
        actual: i32,
    },

    #[error("Resource {resource_id} has {available} available, {requested} requested")]
    InsufficientAvailability {
        resource_id: RecordId,
        requested: Quantity,
        available: Quantity,
    },

    #[error("Worker {worker_id} holds {held} of resource {resource_id}, cannot return {requested}")]
    ExcessReturn {
        resource_id: RecordId,
        worker_id: RecordId,
        requested: Quantity,
        held: Quantity,
    },

    #[error("Inconsistent state for resource {resource_id} / worker {worker_id}: {detail}")]
    InconsistentState {
        resource_id: RecordId,
        worker_id: RecordId,
        detail: String,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound(_))
    }

    /// True for failures caused by the request itself rather than by storage.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            LedgerError::Sqlite(_) | LedgerError::Storage(_) | LedgerError::LockPoisoned
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_resource_names_kind_and_id() {
        let id = RecordId::new();
        let err = LedgerError::NotFound(Missing::Resource {
            kind: ResourceKind::Material,
            id,
        });
        assert!(err.is_not_found());
        let msg = err.to_string();
        assert!(msg.contains("material"));
        assert!(msg.contains(&id.to_string()));
    }

    #[test]
    fn relationship_missing_is_not_found() {
        let err = LedgerError::NotFound(Missing::Relationship {
            kind: ResourceKind::Custody,
            resource_id: RecordId::new(),
            worker_id: RecordId::new(),
        });
        assert!(err.is_not_found());
        assert!(err.to_string().contains("no relationship"));
    }

    #[test]
    fn insufficient_availability_carries_quantities() {
        let err = LedgerError::InsufficientAvailability {
            resource_id: RecordId::new(),
            requested: 71,
            available: 70,
        };
        match &err {
            LedgerError::InsufficientAvailability {
                requested,
                available,
                ..
            } => {
                assert_eq!(*requested, 71);
                assert_eq!(*available, 70);
            }
            _ => panic!("Expected InsufficientAvailability"),
        }
        assert!(err.to_string().contains("71"));
        assert!(err.is_rejection());
    }

    #[test]
    fn storage_failures_are_not_rejections() {
        let err: LedgerError = anyhow::anyhow!("disk full").into();
        assert!(!err.is_rejection());
        assert!(!err.is_not_found());
        assert!(!LedgerError::LockPoisoned.is_rejection());
    }

    #[test]
    fn ledger_error_implements_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&LedgerError::LockPoisoned);
    }
}
