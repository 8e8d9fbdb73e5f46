//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled                            |
//! |-------------|---------------------------------------------|
//! | `context`   | config resolution shared by every command   |
//! | `serve`     | `Init`, `Serve`                             |
//! | `directory` | `Pool`, `Worker`                            |
//! | `ledger`    | `Assign`, `Back`, `Ledger`, `Reconcile`     |
//! | `config`    | `Config`                                    |

pub mod config;
pub mod context;
pub mod directory;
pub mod ledger;
pub mod serve;

pub use config::cmd_config;
pub use context::resolve_config;
pub use directory::{cmd_pool, cmd_worker};
pub use ledger::{cmd_assign, cmd_back, cmd_ledger, cmd_reconcile};
pub use serve::{cmd_init, cmd_serve};
