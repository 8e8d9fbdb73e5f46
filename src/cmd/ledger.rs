//! Circulation commands: `stockroom assign`, `back`, `ledger`, `reconcile`.

use anyhow::Result;

use stockroom::config::StockroomToml;
use stockroom::ledger::models::{Movement, RecordId, ResourceKind};

use super::super::{LedgerCommands, MovementArgs};
use super::context::{open_service, print_json};

fn movement(args: MovementArgs) -> Result<Movement> {
    let mut mv = Movement::new(
        RecordId::parse("resourceId", &args.resource)?,
        RecordId::parse("workerId", &args.worker)?,
        args.quantity,
    );
    if let Some(label) = args.label {
        mv = mv.with_label(label);
    }
    if let Some(note) = args.note {
        mv = mv.with_note(note);
    }
    Ok(mv)
}

pub async fn cmd_assign(config: &StockroomToml, args: MovementArgs) -> Result<()> {
    let service = open_service(config)?;
    let kind = args.kind;
    let ack = service.assign(kind, movement(args)?).await?;
    print_json(&ack)
}

pub async fn cmd_back(config: &StockroomToml, args: MovementArgs) -> Result<()> {
    let service = open_service(config)?;
    let kind = args.kind;
    let ack = service.back(kind, movement(args)?).await?;
    print_json(&ack)
}

pub async fn cmd_ledger(config: &StockroomToml, command: LedgerCommands) -> Result<()> {
    let service = open_service(config)?;

    match command {
        LedgerCommands::Pair {
            kind,
            resource,
            worker,
        } => {
            let resource_id = RecordId::parse("resourceId", &resource)?;
            let worker_id = RecordId::parse("workerId", &worker)?;
            print_json(&service.get_by_pair(kind, resource_id, worker_id).await?)
        }
        LedgerCommands::Show { kind, id } => {
            let id = RecordId::parse("ledgerId", &id)?;
            print_json(&service.get_by_id(kind, id).await?)
        }
        LedgerCommands::Worker { kind, id } => {
            let id = RecordId::parse("workerId", &id)?;
            print_json(&service.list_for_worker(kind, id).await?)
        }
        LedgerCommands::Resource { kind, id } => {
            let id = RecordId::parse("resourceId", &id)?;
            print_json(&service.list_for_resource(kind, id).await?)
        }
        LedgerCommands::Note { kind, id, text } => {
            let id = RecordId::parse("ledgerId", &id)?;
            print_json(&service.update_note(kind, id, text).await?)
        }
    }
}

pub async fn cmd_reconcile(config: &StockroomToml, kind: ResourceKind, resource: &str) -> Result<()> {
    let service = open_service(config)?;
    let id = RecordId::parse("resourceId", resource)?;
    let report = service.reconcile(kind, id).await?;
    print_json(&report)?;
    if !report.balanced {
        anyhow::bail!("{} pool {} is out of balance", kind, id);
    }
    Ok(())
}
