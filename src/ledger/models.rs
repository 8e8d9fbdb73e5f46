use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::LedgerError;

/// Quantity in the resource's smallest unit (pieces, centimetres, grams).
pub type Quantity = i64;

/// Largest history a ledger entry keeps before evicting its oldest record.
pub const DEFAULT_HISTORY_CAP: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a caller-supplied identifier, naming the field on failure.
    pub fn parse(field: &'static str, value: &str) -> Result<Self, LedgerError> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|_| LedgerError::InvalidIdentifier {
                field,
                value: value.to_string(),
            })
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| format!("Invalid identifier: {}", s))
    }
}

/// The two resource families that share the circulation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Tools and equipment handed into a worker's custody.
    Custody,
    /// Raw materials drawn from stock.
    Material,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custody => "custody",
            Self::Material => "material",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custody" => Ok(Self::Custody),
            "material" => Ok(Self::Material),
            _ => Err(format!("Invalid resource kind: {}", s)),
        }
    }
}

/// Direction of a movement. Only these two drive the sign of the delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Take,
    Back,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Take => "take",
            Self::Back => "back",
        }
    }

    /// Label recorded in history when the caller gives none.
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Take => "Take",
            Self::Back => "Back",
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "take" => Ok(Self::Take),
            "back" => Ok(Self::Back),
            _ => Err(format!("Invalid operation: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub quantity: Quantity,
    pub operation: Operation,
    pub label: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePool {
    pub id: RecordId,
    pub kind: ResourceKind,
    pub name: String,
    pub total_quantity: Quantity,
    pub available_quantity: Quantity,
    pub min_threshold: Quantity,
    pub max_threshold: Quantity,
    pub eligibility_level: i32,
    /// Worker id → quantity that worker currently holds. Mirrors the ledger.
    pub current_holders: BTreeMap<RecordId, Quantity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourcePool {
    /// Sum of the holder mirrors, or `None` if it does not fit a `Quantity`.
    pub fn held_by_mirrors(&self) -> Option<Quantity> {
        checked_total(self.current_holders.values().copied())
    }

    /// Advisory only; nothing in the ledger refuses movements on it.
    pub fn below_min_threshold(&self) -> bool {
        self.available_quantity < self.min_threshold
    }
}

/// Overflow-checked sum. Stored quantities may have been edited out of band.
pub fn checked_total(quantities: impl IntoIterator<Item = Quantity>) -> Option<Quantity> {
    quantities
        .into_iter()
        .try_fold(0 as Quantity, |acc, q| acc.checked_add(q))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: RecordId,
    pub name: String,
    pub eligibility_level: i32,
    pub current_custody: BTreeMap<RecordId, Quantity>,
    pub current_materials: BTreeMap<RecordId, Quantity>,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    /// Resource id → quantity held, for one resource kind.
    pub fn holdings(&self, kind: ResourceKind) -> &BTreeMap<RecordId, Quantity> {
        match kind {
            ResourceKind::Custody => &self.current_custody,
            ResourceKind::Material => &self.current_materials,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: RecordId,
    pub kind: ResourceKind,
    pub resource_id: RecordId,
    pub worker_id: RecordId,
    pub cumulative_quantity: Quantity,
    pub last_activity_at: DateTime<Utc>,
    pub note: String,
    /// Oldest first.
    pub history: Vec<HistoryRecord>,
    pub created_at: DateTime<Utc>,
}

/// A validated checkout or return request.
#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    pub resource_id: RecordId,
    pub worker_id: RecordId,
    pub quantity: Quantity,
    pub label: Option<String>,
    pub note: Option<String>,
}

impl Movement {
    pub fn new(resource_id: RecordId, worker_id: RecordId, quantity: Quantity) -> Self {
        Self {
            resource_id,
            worker_id,
            quantity,
            label: None,
            note: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Movement as received from a caller, before identifiers are parsed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRequest {
    pub resource_id: String,
    pub worker_id: String,
    pub quantity: Quantity,
    #[serde(default)]
    pub operation_label: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl MovementRequest {
    pub fn into_movement(self) -> Result<Movement, LedgerError> {
        Ok(Movement {
            resource_id: RecordId::parse("resourceId", &self.resource_id)?,
            worker_id: RecordId::parse("workerId", &self.worker_id)?,
            quantity: self.quantity,
            label: self.operation_label,
            note: self.note,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPool {
    pub name: String,
    pub total_quantity: Quantity,
    #[serde(default)]
    pub min_threshold: Quantity,
    #[serde(default)]
    pub max_threshold: Quantity,
    #[serde(default)]
    pub eligibility_level: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorker {
    pub name: String,
    #[serde(default)]
    pub eligibility_level: i32,
}

/// Status-only acknowledgement of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// A worker whose three views of a holding disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingDrift {
    pub worker_id: RecordId,
    pub ledger: Quantity,
    pub pool_mirror: Option<Quantity>,
    pub worker_mirror: Option<Quantity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolReconciliation {
    pub resource_id: RecordId,
    pub kind: ResourceKind,
    pub total_quantity: Quantity,
    pub available_quantity: Quantity,
    /// `None` when the stored quantities overflow their sum.
    pub held_by_mirrors: Option<Quantity>,
    pub held_by_ledger: Option<Quantity>,
    pub balanced: bool,
    pub drift: Vec<HoldingDrift>,
}
