//! Database setup and API server commands: `stockroom init`, `stockroom serve`.

use anyhow::Result;
use tracing::info;

use stockroom::config::StockroomToml;
use stockroom::ledger::server::{ServerConfig, start_server};

use super::context::open_db;

pub fn cmd_init(config: &StockroomToml) -> Result<()> {
    open_db(config)?;
    info!(db = %config.storage.db_path.display(), "ledger database ready");
    println!(
        "Ledger database initialized at {}",
        config.storage.db_path.display()
    );
    Ok(())
}

pub async fn cmd_serve(
    config: StockroomToml,
    port: Option<u16>,
    host: Option<String>,
    dev: bool,
) -> Result<()> {
    let settings = config.ledger_settings();
    let busy_timeout = config.busy_timeout();

    start_server(ServerConfig {
        host: host.unwrap_or(config.server.host),
        port: port.unwrap_or(config.server.port),
        db_path: config.storage.db_path,
        busy_timeout,
        settings,
        dev_mode: dev,
    })
    .await
}
