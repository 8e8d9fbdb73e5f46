use tracing::{debug, error, info};

use super::db::DbHandle;
use super::models::*;
use super::protocol::Policy;
use crate::errors::{LedgerError, Missing};

/// Tunables for the circulation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    pub history_cap: usize,
    pub policy: Policy,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            policy: Policy::default(),
        }
    }
}

/// Assign, return and query operations over one ledger database.
///
/// Both resource kinds run through the same code; `kind` selects which
/// family of pools and which worker mirror a call touches.
#[derive(Clone)]
pub struct CirculationService {
    db: DbHandle,
    settings: LedgerSettings,
}

impl CirculationService {
    pub fn new(db: DbHandle, settings: LedgerSettings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> LedgerSettings {
        self.settings
    }

    /// Check `mv.quantity` out of the pool into the worker's hands.
    pub async fn assign(&self, kind: ResourceKind, mv: Movement) -> Result<Ack, LedgerError> {
        self.circulate(kind, Operation::Take, mv).await
    }

    /// Return `mv.quantity` from the worker to the pool.
    pub async fn back(&self, kind: ResourceKind, mv: Movement) -> Result<Ack, LedgerError> {
        self.circulate(kind, Operation::Back, mv).await
    }

    async fn circulate(
        &self,
        kind: ResourceKind,
        operation: Operation,
        mv: Movement,
    ) -> Result<Ack, LedgerError> {
        let settings = self.settings;
        let resource_id = mv.resource_id;
        let worker_id = mv.worker_id;
        let quantity = mv.quantity;

        let result = self
            .db
            .call(move |db| {
                db.circulate(kind, operation, &mv, settings.policy, settings.history_cap)
            })
            .await;

        match &result {
            Ok(posting) => info!(
                kind = %kind,
                operation = operation.as_str(),
                resource_id = %resource_id,
                worker_id = %worker_id,
                quantity,
                cumulative = posting.cumulative_quantity,
                available = posting.available_quantity,
                "movement committed"
            ),
            Err(e) if e.is_rejection() => debug!(
                kind = %kind,
                operation = operation.as_str(),
                resource_id = %resource_id,
                worker_id = %worker_id,
                quantity,
                error = %e,
                "movement rejected"
            ),
            Err(e) => error!(
                kind = %kind,
                operation = operation.as_str(),
                resource_id = %resource_id,
                worker_id = %worker_id,
                error = %e,
                "movement failed"
            ),
        }

        result.map(|_| Ack::ok())
    }

    // ── Ledger queries ────────────────────────────────────────────────

    pub async fn list_for_worker(
        &self,
        kind: ResourceKind,
        worker_id: RecordId,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.db
            .call(move |db| db.list_entries_for_worker(kind, worker_id))
            .await
    }

    pub async fn list_for_resource(
        &self,
        kind: ResourceKind,
        resource_id: RecordId,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.db
            .call(move |db| db.list_entries_for_resource(kind, resource_id))
            .await
    }

    pub async fn get_by_id(
        &self,
        kind: ResourceKind,
        id: RecordId,
    ) -> Result<LedgerEntry, LedgerError> {
        self.db
            .call(move |db| db.get_entry(kind, id))
            .await?
            .ok_or(LedgerError::NotFound(Missing::Ledger { kind, id }))
    }

    pub async fn get_by_pair(
        &self,
        kind: ResourceKind,
        resource_id: RecordId,
        worker_id: RecordId,
    ) -> Result<LedgerEntry, LedgerError> {
        self.db
            .call(move |db| db.get_entry_by_pair(kind, resource_id, worker_id))
            .await?
            .ok_or(LedgerError::NotFound(Missing::Relationship {
                kind,
                resource_id,
                worker_id,
            }))
    }

    pub async fn update_note(
        &self,
        kind: ResourceKind,
        id: RecordId,
        note: String,
    ) -> Result<Ack, LedgerError> {
        let updated = self
            .db
            .call(move |db| db.update_note(kind, id, &note))
            .await?;
        if !updated {
            return Err(LedgerError::NotFound(Missing::Ledger { kind, id }));
        }
        Ok(Ack::ok())
    }

    // ── Directory ─────────────────────────────────────────────────────

    pub async fn create_pool(
        &self,
        kind: ResourceKind,
        new: NewPool,
    ) -> Result<ResourcePool, LedgerError> {
        let pool = self.db.call(move |db| db.create_pool(kind, &new)).await?;
        info!(kind = %kind, resource_id = %pool.id, total = pool.total_quantity, "pool created");
        Ok(pool)
    }

    pub async fn get_pool(
        &self,
        kind: ResourceKind,
        id: RecordId,
    ) -> Result<ResourcePool, LedgerError> {
        self.db
            .call(move |db| db.get_pool(kind, id))
            .await?
            .ok_or(LedgerError::NotFound(Missing::Resource { kind, id }))
    }

    pub async fn list_pools(&self, kind: ResourceKind) -> Result<Vec<ResourcePool>, LedgerError> {
        self.db.call(move |db| db.list_pools(kind)).await
    }

    pub async fn create_worker(&self, new: NewWorker) -> Result<Worker, LedgerError> {
        let worker = self.db.call(move |db| db.create_worker(&new)).await?;
        info!(worker_id = %worker.id, level = worker.eligibility_level, "worker created");
        Ok(worker)
    }

    pub async fn get_worker(&self, id: RecordId) -> Result<Worker, LedgerError> {
        self.db
            .call(move |db| db.get_worker(id))
            .await?
            .ok_or(LedgerError::NotFound(Missing::Worker { id }))
    }

    pub async fn reconcile(
        &self,
        kind: ResourceKind,
        id: RecordId,
    ) -> Result<PoolReconciliation, LedgerError> {
        self.db
            .call(move |db| db.reconcile(kind, id))
            .await?
            .ok_or(LedgerError::NotFound(Missing::Resource { kind, id }))
    }
}
