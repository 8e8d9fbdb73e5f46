pub mod config;
pub mod errors;
pub mod ledger;
pub mod telemetry;
