mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};
use commands::*;
use handover_core::{CoreConfig, PickupService, SystemClock};
use handover_events_memory::MemoryEventBus;
use handover_store_sqlite::SqliteStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CoreConfig::from_env()?;

    let store = Arc::new(SqliteStore::open(&cli.database_url).await?);
    tracing::debug!(database_url = %cli.database_url, "Store opened");

    // One process, one command: notifications have no subscriber to reach.
    let service = PickupService::new(
        store.clone(),
        store,
        Arc::new(MemoryEventBus::new()),
        Arc::new(SystemClock),
        config,
    );

    match cli.command {
        Command::Create {
            donor,
            receiver,
            receiver_kind,
            waste_type,
            item,
            quantity,
            description,
        } => {
            cmd_create(
                &service,
                donor,
                receiver,
                receiver_kind,
                waste_type,
                item,
                quantity,
                description,
            )
            .await?;
        }
        Command::Show { pickup, caller } => cmd_show(&service, &pickup, caller).await?,
        Command::List { caller } => cmd_list(&service, caller).await?,
        Command::Propose {
            pickup,
            caller,
            dates,
        } => cmd_propose(&service, &pickup, caller, &dates).await?,
        Command::Confirm {
            pickup,
            caller,
            date,
        } => cmd_confirm(&service, &pickup, caller, &date).await?,
        Command::RequestToken { pickup, caller } => {
            cmd_request_token(&service, &pickup, caller).await?
        }
        Command::Present {
            pickup,
            caller,
            secret,
        } => cmd_present(&service, &pickup, caller, &secret).await?,
        Command::Complete {
            pickup,
            caller,
            notes,
            bonus,
        } => cmd_complete(&service, &pickup, caller, notes, bonus).await?,
        Command::Cancel { pickup, caller } => cmd_cancel(&service, &pickup, caller).await?,
        Command::Sweep => cmd_sweep(&service).await?,
        Command::Redeliver => cmd_redeliver(&service).await?,
    }

    Ok(())
}
