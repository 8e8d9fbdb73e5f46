//! Pool and worker directory commands: `stockroom pool`, `stockroom worker`.

use anyhow::Result;

use stockroom::config::StockroomToml;
use stockroom::ledger::models::{NewPool, NewWorker, RecordId};

use super::super::{PoolCommands, WorkerCommands};
use super::context::{open_service, print_json};

pub async fn cmd_pool(config: &StockroomToml, command: PoolCommands) -> Result<()> {
    let service = open_service(config)?;

    match command {
        PoolCommands::Add {
            kind,
            name,
            total,
            min,
            max,
            level,
        } => {
            let pool = service
                .create_pool(
                    kind,
                    NewPool {
                        name,
                        total_quantity: total,
                        min_threshold: min,
                        max_threshold: max,
                        eligibility_level: level,
                    },
                )
                .await?;
            print_json(&pool)?;
        }
        PoolCommands::List { kind } => {
            let pools = service.list_pools(kind).await?;
            print_json(&pools)?;
        }
        PoolCommands::Show { kind, id } => {
            let id = RecordId::parse("resourceId", &id)?;
            let pool = service.get_pool(kind, id).await?;
            if pool.below_min_threshold() {
                eprintln!(
                    "warning: {} available is below the minimum threshold of {}",
                    pool.available_quantity, pool.min_threshold
                );
            }
            print_json(&pool)?;
        }
    }

    Ok(())
}

pub async fn cmd_worker(config: &StockroomToml, command: WorkerCommands) -> Result<()> {
    let service = open_service(config)?;

    match command {
        WorkerCommands::Add { name, level } => {
            let worker = service
                .create_worker(NewWorker {
                    name,
                    eligibility_level: level,
                })
                .await?;
            print_json(&worker)?;
        }
        WorkerCommands::Show { id } => {
            let id = RecordId::parse("workerId", &id)?;
            print_json(&service.get_worker(id).await?)?;
        }
    }

    Ok(())
}
