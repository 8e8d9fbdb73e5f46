//! Resource circulation ledger.
//!
//! | Module     | Role                                                     |
//! |------------|----------------------------------------------------------|
//! | `models`   | Pools, workers, ledger entries and request payloads      |
//! | `protocol` | Pure validation and planning of take/back movements      |
//! | `db`       | SQLite persistence; applies a plan in one transaction    |
//! | `service`  | Async façade used by the CLI and the HTTP API            |
//! | `api`      | axum handlers and error mapping                          |
//! | `server`   | Router assembly and the serve loop                       |

pub mod api;
pub mod db;
pub mod models;
pub mod protocol;
pub mod server;
pub mod service;

pub use models::{Movement, Quantity, RecordId, ResourceKind};
pub use service::{CirculationService, LedgerSettings};
