use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::warn;

use super::models::*;
use super::protocol::{LedgerHead, MirrorUpdate, Policy, Posting, plan_back, plan_take};
use crate::errors::{LedgerError, Missing};

type Result<T> = std::result::Result<T, LedgerError>;

/// Async-safe handle to the ledger database.
///
/// Wraps `LedgerDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<LedgerDb>>,
}

impl DbHandle {
    pub fn new(db: LedgerDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut LedgerDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db.lock().map_err(|_| LedgerError::LockPoisoned)?;
            f(&mut guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup, the CLI
    /// and tests; never from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, LedgerDb>> {
        self.inner.lock().map_err(|_| LedgerError::LockPoisoned)
    }
}

pub struct LedgerDb {
    conn: Connection,
}

impl LedgerDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        conn.busy_timeout(busy_timeout)
            .context("Failed to set busy timeout")?;
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .context("Failed to enable WAL journal")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS resource_pools (
                    id TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    name TEXT NOT NULL,
                    total_quantity INTEGER NOT NULL,
                    available_quantity INTEGER NOT NULL,
                    min_threshold INTEGER NOT NULL DEFAULT 0,
                    max_threshold INTEGER NOT NULL DEFAULT 0,
                    eligibility_level INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workers (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    eligibility_level INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS pool_holders (
                    pool_id TEXT NOT NULL REFERENCES resource_pools(id) ON DELETE CASCADE,
                    worker_id TEXT NOT NULL,
                    quantity INTEGER NOT NULL,
                    PRIMARY KEY (pool_id, worker_id)
                );

                CREATE TABLE IF NOT EXISTS worker_holdings (
                    worker_id TEXT NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    resource_id TEXT NOT NULL,
                    quantity INTEGER NOT NULL,
                    PRIMARY KEY (worker_id, resource_id)
                );

                CREATE TABLE IF NOT EXISTS ledger_entries (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    kind TEXT NOT NULL,
                    resource_id TEXT NOT NULL,
                    worker_id TEXT NOT NULL,
                    cumulative_quantity INTEGER NOT NULL DEFAULT 0 CHECK (cumulative_quantity >= 0),
                    history_len INTEGER NOT NULL DEFAULT 0,
                    last_activity_at TEXT NOT NULL,
                    note TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    UNIQUE(kind, resource_id, worker_id)
                );

                CREATE TABLE IF NOT EXISTS ledger_history (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    entry_id TEXT NOT NULL REFERENCES ledger_entries(id),
                    quantity INTEGER NOT NULL,
                    operation TEXT NOT NULL,
                    label TEXT NOT NULL,
                    at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_pools_kind ON resource_pools(kind);
                CREATE INDEX IF NOT EXISTS idx_ledger_worker ON ledger_entries(kind, worker_id);
                CREATE INDEX IF NOT EXISTS idx_ledger_resource ON ledger_entries(kind, resource_id);
                CREATE INDEX IF NOT EXISTS idx_history_entry ON ledger_history(entry_id, seq);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Directory ─────────────────────────────────────────────────────

    pub fn create_pool(&self, kind: ResourceKind, new: &NewPool) -> Result<ResourcePool> {
        if new.total_quantity < 0 {
            return Err(LedgerError::InvalidQuantity {
                quantity: new.total_quantity,
            });
        }
        let id = RecordId::new();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO resource_pools (id, kind, name, total_quantity, available_quantity, min_threshold, max_threshold, eligibility_level, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id.to_string(),
                    kind.as_str(),
                    new.name,
                    new.total_quantity,
                    new.min_threshold,
                    new.max_threshold,
                    new.eligibility_level,
                    now
                ],
            )
            .context("Failed to insert resource pool")?;
        self.get_pool(kind, id)?
            .context("Resource pool not found after insert")
            .map_err(Into::into)
    }

    /// A pool of another kind is reported as absent.
    pub fn get_pool(&self, kind: ResourceKind, id: RecordId) -> Result<Option<ResourcePool>> {
        load_pool(&self.conn, kind, id)
    }

    pub fn list_pools(&self, kind: ResourceKind) -> Result<Vec<ResourcePool>> {
        let ids: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM resource_pools WHERE kind = ?1 ORDER BY created_at, id")
                .context("Failed to prepare list_pools")?;
            let rows = stmt
                .query_map(params![kind.as_str()], |row| row.get(0))
                .context("Failed to query resource pools")?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        let mut pools = Vec::with_capacity(ids.len());
        for raw in ids {
            if let Some(pool) = load_pool(&self.conn, kind, parse_id(&raw)?)? {
                pools.push(pool);
            }
        }
        Ok(pools)
    }

    pub fn create_worker(&self, new: &NewWorker) -> Result<Worker> {
        let id = RecordId::new();
        self.conn
            .execute(
                "INSERT INTO workers (id, name, eligibility_level, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    new.name,
                    new.eligibility_level,
                    Utc::now().to_rfc3339()
                ],
            )
            .context("Failed to insert worker")?;
        self.get_worker(id)?
            .context("Worker not found after insert")
            .map_err(Into::into)
    }

    pub fn get_worker(&self, id: RecordId) -> Result<Option<Worker>> {
        load_worker(&self.conn, id)
    }

    // ── Circulation ───────────────────────────────────────────────────

    /// Validate and apply one movement as a single transaction.
    ///
    /// The transaction is opened `IMMEDIATE`, taking SQLite's write lock
    /// before the first read, so no other writer can interleave between the
    /// reads that feed validation and the writes that follow. Any error drops
    /// the transaction, which rolls it back.
    pub fn circulate(
        &mut self,
        kind: ResourceKind,
        operation: Operation,
        mv: &Movement,
        policy: Policy,
        history_cap: usize,
    ) -> Result<Posting> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin circulation transaction")?;

        let pool = load_pool(&tx, kind, mv.resource_id)?.ok_or(LedgerError::NotFound(
            Missing::Resource {
                kind,
                id: mv.resource_id,
            },
        ))?;
        let worker = load_worker(&tx, mv.worker_id)?
            .ok_or(LedgerError::NotFound(Missing::Worker { id: mv.worker_id }))?;
        let head = load_head(&tx, kind, pool.id, worker.id)?;

        let now = Utc::now();
        let posting = match operation {
            Operation::Take => plan_take(&pool, &worker, head.as_ref(), mv, now)?,
            Operation::Back => plan_back(&pool, &worker, head.as_ref(), mv, now, policy)?,
        };

        apply_posting(&tx, &posting, history_cap)?;
        tx.commit().context("Failed to commit circulation")?;
        Ok(posting)
    }

    // ── Ledger queries ────────────────────────────────────────────────

    pub fn get_entry(&self, kind: ResourceKind, id: RecordId) -> Result<Option<LedgerEntry>> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1 AND kind = ?2", ENTRY_SELECT),
                params![id.to_string(), kind.as_str()],
                EntryRow::from_row,
            )
            .optional()
            .context("Failed to query ledger entry")?;
        row.map(|r| self.hydrate(r)).transpose()
    }

    pub fn get_entry_by_pair(
        &self,
        kind: ResourceKind,
        resource_id: RecordId,
        worker_id: RecordId,
    ) -> Result<Option<LedgerEntry>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "{} WHERE kind = ?1 AND resource_id = ?2 AND worker_id = ?3",
                    ENTRY_SELECT
                ),
                params![kind.as_str(), resource_id.to_string(), worker_id.to_string()],
                EntryRow::from_row,
            )
            .optional()
            .context("Failed to query ledger entry by pair")?;
        row.map(|r| self.hydrate(r)).transpose()
    }

    pub fn list_entries_for_worker(
        &self,
        kind: ResourceKind,
        worker_id: RecordId,
    ) -> Result<Vec<LedgerEntry>> {
        self.list_entries("worker_id", kind, worker_id)
    }

    pub fn list_entries_for_resource(
        &self,
        kind: ResourceKind,
        resource_id: RecordId,
    ) -> Result<Vec<LedgerEntry>> {
        self.list_entries("resource_id", kind, resource_id)
    }

    fn list_entries(
        &self,
        column: &'static str,
        kind: ResourceKind,
        id: RecordId,
    ) -> Result<Vec<LedgerEntry>> {
        let rows: Vec<EntryRow> = {
            let mut stmt = self
                .conn
                .prepare(&format!(
                    "{} WHERE kind = ?1 AND {} = ?2 ORDER BY seq",
                    ENTRY_SELECT, column
                ))
                .context("Failed to prepare ledger listing")?;
            let rows = stmt
                .query_map(params![kind.as_str(), id.to_string()], EntryRow::from_row)
                .context("Failed to query ledger entries")?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        rows.into_iter().map(|r| self.hydrate(r)).collect()
    }

    /// Overwrite the note on an entry. Returns false when the entry does not exist.
    pub fn update_note(&self, kind: ResourceKind, id: RecordId, note: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE ledger_entries SET note = ?1 WHERE id = ?2 AND kind = ?3",
                params![note, id.to_string(), kind.as_str()],
            )
            .context("Failed to update ledger note")?;
        Ok(changed > 0)
    }

    #[cfg(test)]
    pub(crate) fn set_pool_eligibility_level(&self, id: RecordId, level: i32) -> Result<()> {
        self.conn.execute(
            "UPDATE resource_pools SET eligibility_level = ?1 WHERE id = ?2",
            params![level, id.to_string()],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn put_pool_holder(
        &self,
        pool_id: RecordId,
        worker_id: RecordId,
        quantity: Quantity,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO pool_holders (pool_id, worker_id, quantity) VALUES (?1, ?2, ?3)",
            params![pool_id.to_string(), worker_id.to_string(), quantity],
        )?;
        Ok(())
    }

    fn hydrate(&self, row: EntryRow) -> Result<LedgerEntry> {
        let history = load_history(&self.conn, &row.id)?;
        row.into_entry(history)
    }

    // ── Reconciliation ────────────────────────────────────────────────

    /// Compare a pool's balance and mirrors against its ledger entries.
    pub fn reconcile(
        &self,
        kind: ResourceKind,
        resource_id: RecordId,
    ) -> Result<Option<PoolReconciliation>> {
        let Some(pool) = load_pool(&self.conn, kind, resource_id)? else {
            return Ok(None);
        };

        let ledger = query_quantities(
            &self.conn,
            "SELECT worker_id, cumulative_quantity FROM ledger_entries WHERE kind = ?1 AND resource_id = ?2",
            kind,
            resource_id,
        )?;
        let worker_mirrors = query_quantities(
            &self.conn,
            "SELECT worker_id, quantity FROM worker_holdings WHERE kind = ?1 AND resource_id = ?2",
            kind,
            resource_id,
        )?;

        let workers: BTreeSet<RecordId> = ledger
            .keys()
            .chain(pool.current_holders.keys())
            .chain(worker_mirrors.keys())
            .copied()
            .collect();

        let mut drift = Vec::new();
        for worker_id in workers {
            let held = ledger.get(&worker_id).copied().unwrap_or(0);
            let pool_mirror = pool.current_holders.get(&worker_id).copied();
            let worker_mirror = worker_mirrors.get(&worker_id).copied();
            let expected = (held > 0).then_some(held);
            if pool_mirror != expected || worker_mirror != expected {
                drift.push(HoldingDrift {
                    worker_id,
                    ledger: held,
                    pool_mirror,
                    worker_mirror,
                });
            }
        }

        let held_by_mirrors = pool.held_by_mirrors();
        let held_by_ledger = checked_total(ledger.values().copied());
        if held_by_mirrors.is_none() || held_by_ledger.is_none() {
            warn!(kind = %kind, resource_id = %pool.id, "stored holdings overflow their sum");
        }
        let balanced = match (held_by_mirrors, held_by_ledger) {
            (Some(mirrors), Some(ledger)) => {
                pool.available_quantity.checked_add(mirrors) == Some(pool.total_quantity)
                    && mirrors == ledger
                    && drift.is_empty()
            }
            _ => false,
        };

        Ok(Some(PoolReconciliation {
            resource_id: pool.id,
            kind,
            total_quantity: pool.total_quantity,
            available_quantity: pool.available_quantity,
            held_by_mirrors,
            held_by_ledger,
            balanced,
            drift,
        }))
    }
}

// ── Row loading ───────────────────────────────────────────────────────

const ENTRY_SELECT: &str = "SELECT id, kind, resource_id, worker_id, cumulative_quantity, last_activity_at, note, created_at FROM ledger_entries";

fn parse_id(raw: &str) -> Result<RecordId> {
    RecordId::from_str(raw)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to parse stored identifier")
        .map_err(Into::into)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse stored timestamp {:?}", raw))
        .map_err(Into::into)
}

fn load_pool(conn: &Connection, kind: ResourceKind, id: RecordId) -> Result<Option<ResourcePool>> {
    let row = conn
        .query_row(
            "SELECT id, kind, name, total_quantity, available_quantity, min_threshold, max_threshold, eligibility_level, created_at, updated_at
             FROM resource_pools WHERE id = ?1 AND kind = ?2",
            params![id.to_string(), kind.as_str()],
            |row| {
                Ok(PoolRow {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    name: row.get(2)?,
                    total_quantity: row.get(3)?,
                    available_quantity: row.get(4)?,
                    min_threshold: row.get(5)?,
                    max_threshold: row.get(6)?,
                    eligibility_level: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                })
            },
        )
        .optional()
        .context("Failed to query resource pool")?;
    let Some(row) = row else {
        return Ok(None);
    };

    let holders = {
        let mut stmt = conn
            .prepare("SELECT worker_id, quantity FROM pool_holders WHERE pool_id = ?1")
            .context("Failed to prepare pool holders query")?;
        let rows = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Quantity>(1)?))
            })
            .context("Failed to query pool holders")?;
        let mut holders = BTreeMap::new();
        for row in rows {
            let (worker_id, quantity) = row?;
            holders.insert(parse_id(&worker_id)?, quantity);
        }
        holders
    };

    row.into_pool(holders).map(Some)
}

fn load_worker(conn: &Connection, id: RecordId) -> Result<Option<Worker>> {
    let row = conn
        .query_row(
            "SELECT id, name, eligibility_level, created_at FROM workers WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()
        .context("Failed to query worker")?;
    let Some((raw_id, name, eligibility_level, created_at)) = row else {
        return Ok(None);
    };

    let mut current_custody = BTreeMap::new();
    let mut current_materials = BTreeMap::new();
    let mut stmt = conn
        .prepare("SELECT kind, resource_id, quantity FROM worker_holdings WHERE worker_id = ?1")
        .context("Failed to prepare worker holdings query")?;
    let rows = stmt
        .query_map(params![id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Quantity>(2)?,
            ))
        })
        .context("Failed to query worker holdings")?;
    for row in rows {
        let (kind, resource_id, quantity) = row?;
        let kind = ResourceKind::from_str(&kind)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse holding kind")?;
        let target = match kind {
            ResourceKind::Custody => &mut current_custody,
            ResourceKind::Material => &mut current_materials,
        };
        target.insert(parse_id(&resource_id)?, quantity);
    }

    Ok(Some(Worker {
        id: parse_id(&raw_id)?,
        name,
        eligibility_level,
        current_custody,
        current_materials,
        created_at: parse_ts(&created_at)?,
    }))
}

fn load_head(
    conn: &Connection,
    kind: ResourceKind,
    resource_id: RecordId,
    worker_id: RecordId,
) -> Result<Option<LedgerHead>> {
    let row = conn
        .query_row(
            "SELECT id, cumulative_quantity FROM ledger_entries
             WHERE kind = ?1 AND resource_id = ?2 AND worker_id = ?3",
            params![kind.as_str(), resource_id.to_string(), worker_id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Quantity>(1)?)),
        )
        .optional()
        .context("Failed to query ledger head")?;
    row.map(|(id, cumulative_quantity)| {
        Ok(LedgerHead {
            id: parse_id(&id)?,
            cumulative_quantity,
        })
    })
    .transpose()
}

fn load_history(conn: &Connection, entry_id: &str) -> Result<Vec<HistoryRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT quantity, operation, label, at FROM ledger_history WHERE entry_id = ?1 ORDER BY seq",
        )
        .context("Failed to prepare history query")?;
    let rows = stmt
        .query_map(params![entry_id], |row| {
            Ok((
                row.get::<_, Quantity>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .context("Failed to query history")?;
    let mut history = Vec::new();
    for row in rows {
        let (quantity, operation, label, at) = row?;
        let operation = Operation::from_str(&operation)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse history operation")?;
        history.push(HistoryRecord {
            quantity,
            operation,
            label,
            at: parse_ts(&at)?,
        });
    }
    Ok(history)
}

fn query_quantities(
    conn: &Connection,
    sql: &str,
    kind: ResourceKind,
    resource_id: RecordId,
) -> Result<BTreeMap<RecordId, Quantity>> {
    let mut stmt = conn.prepare(sql).context("Failed to prepare quantity query")?;
    let rows = stmt
        .query_map(params![kind.as_str(), resource_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Quantity>(1)?))
        })
        .context("Failed to query quantities")?;
    let mut out = BTreeMap::new();
    for row in rows {
        let (worker_id, quantity) = row?;
        out.insert(parse_id(&worker_id)?, quantity);
    }
    Ok(out)
}

// ── Posting ───────────────────────────────────────────────────────────

/// Write a planned movement. Must run inside the transaction that produced it.
fn apply_posting(conn: &Connection, posting: &Posting, history_cap: usize) -> Result<()> {
    let at = posting.at.to_rfc3339();
    let resource_id = posting.resource_id.to_string();
    let worker_id = posting.worker_id.to_string();

    let entry_id = match posting.entry_id {
        Some(id) => id.to_string(),
        None => {
            // UNIQUE(kind, resource_id, worker_id) rejects a second creator.
            let id = RecordId::new().to_string();
            conn.execute(
                "INSERT INTO ledger_entries (id, kind, resource_id, worker_id, last_activity_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, posting.kind.as_str(), resource_id, worker_id, at],
            )
            .context("Failed to create ledger entry")?;
            id
        }
    };

    let history_len: i64 = conn
        .query_row(
            "SELECT history_len FROM ledger_entries WHERE id = ?1",
            params![entry_id],
            |row| row.get(0),
        )
        .context("Failed to read history length")?;
    let cap = history_cap.max(1) as i64;
    let evict = (history_len - cap + 1).max(0);
    if evict > 0 {
        conn.execute(
            "DELETE FROM ledger_history WHERE seq IN (
                 SELECT seq FROM ledger_history WHERE entry_id = ?1 ORDER BY seq ASC LIMIT ?2
             )",
            params![entry_id, evict],
        )
        .context("Failed to evict oldest history")?;
    }
    conn.execute(
        "INSERT INTO ledger_history (entry_id, quantity, operation, label, at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry_id,
            posting.record.quantity,
            posting.record.operation.as_str(),
            posting.record.label,
            posting.record.at.to_rfc3339()
        ],
    )
    .context("Failed to append history")?;

    conn.execute(
        "UPDATE ledger_entries
         SET cumulative_quantity = ?1, history_len = ?2, last_activity_at = ?3, note = COALESCE(?4, note)
         WHERE id = ?5",
        params![
            posting.cumulative_quantity,
            history_len - evict + 1,
            at,
            posting.note,
            entry_id
        ],
    )
    .context("Failed to update ledger entry")?;

    conn.execute(
        "UPDATE resource_pools SET available_quantity = ?1, updated_at = ?2 WHERE id = ?3",
        params![posting.available_quantity, at, resource_id],
    )
    .context("Failed to update pool balance")?;

    match posting.mirror {
        MirrorUpdate::Set(quantity) => {
            conn.execute(
                "INSERT INTO pool_holders (pool_id, worker_id, quantity) VALUES (?1, ?2, ?3)
                 ON CONFLICT(pool_id, worker_id) DO UPDATE SET quantity = excluded.quantity",
                params![resource_id, worker_id, quantity],
            )
            .context("Failed to upsert pool holder")?;
            conn.execute(
                "INSERT INTO worker_holdings (worker_id, kind, resource_id, quantity) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(worker_id, resource_id) DO UPDATE SET quantity = excluded.quantity",
                params![worker_id, posting.kind.as_str(), resource_id, quantity],
            )
            .context("Failed to upsert worker holding")?;
        }
        MirrorUpdate::Remove => {
            conn.execute(
                "DELETE FROM pool_holders WHERE pool_id = ?1 AND worker_id = ?2",
                params![resource_id, worker_id],
            )
            .context("Failed to remove pool holder")?;
            conn.execute(
                "DELETE FROM worker_holdings WHERE worker_id = ?1 AND resource_id = ?2",
                params![worker_id, resource_id],
            )
            .context("Failed to remove worker holding")?;
        }
    }

    Ok(())
}

/// Intermediate row struct for resource_pools.
struct PoolRow {
    id: String,
    kind: String,
    name: String,
    total_quantity: Quantity,
    available_quantity: Quantity,
    min_threshold: Quantity,
    max_threshold: Quantity,
    eligibility_level: i32,
    created_at: String,
    updated_at: String,
}

impl PoolRow {
    fn into_pool(self, current_holders: BTreeMap<RecordId, Quantity>) -> Result<ResourcePool> {
        let kind = ResourceKind::from_str(&self.kind)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse pool kind")?;
        Ok(ResourcePool {
            id: parse_id(&self.id)?,
            kind,
            name: self.name,
            total_quantity: self.total_quantity,
            available_quantity: self.available_quantity,
            min_threshold: self.min_threshold,
            max_threshold: self.max_threshold,
            eligibility_level: self.eligibility_level,
            current_holders,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// Intermediate row struct for ledger_entries.
struct EntryRow {
    id: String,
    kind: String,
    resource_id: String,
    worker_id: String,
    cumulative_quantity: Quantity,
    last_activity_at: String,
    note: String,
    created_at: String,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            resource_id: row.get(2)?,
            worker_id: row.get(3)?,
            cumulative_quantity: row.get(4)?,
            last_activity_at: row.get(5)?,
            note: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_entry(self, history: Vec<HistoryRecord>) -> Result<LedgerEntry> {
        let kind = ResourceKind::from_str(&self.kind)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ledger kind")?;
        Ok(LedgerEntry {
            id: parse_id(&self.id)?,
            kind,
            resource_id: parse_id(&self.resource_id)?,
            worker_id: parse_id(&self.worker_id)?,
            cumulative_quantity: self.cumulative_quantity,
            last_activity_at: parse_ts(&self.last_activity_at)?,
            note: self.note,
            history,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
