use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::Serialize;
use waitlist_core::{EquipmentId, MemberId, QueueCoordinator};

use crate::{app::build_coordinator, config::load_config, server, shutdown::Shutdown, telemetry};

pub async fn dispatch(matches: &ArgMatches) -> Result<()> {
    let config_path = matches.get_one::<PathBuf>("config");
    let config = load_config(config_path.map(PathBuf::as_path))
        .await
        .context("Failed to load configuration")?;
    telemetry::init(&config.log.level)?;

    let coordinator = build_coordinator(&config).await?;

    match matches.subcommand() {
        Some(("serve", _)) => {
            let shutdown = Shutdown::new();
            shutdown.trigger_on_signal().await?;
            server::serve(&config, coordinator, shutdown).await
        }
        Some(("sweep", _)) => handle_sweep(&coordinator).await,
        Some(("freed", sub_m)) => handle_freed(&coordinator, sub_m).await,
        Some(("queue", sub_m)) => handle_queue(&coordinator, sub_m).await,
        Some(("position", sub_m)) => handle_position(&coordinator, sub_m).await,
        Some(("history", sub_m)) => handle_history(&coordinator, sub_m).await,
        _ => anyhow::bail!("Unknown command. Run 'waitlist --help' for usage."),
    }
}

async fn handle_sweep(coordinator: &QueueCoordinator) -> Result<()> {
    let report = coordinator.sweep_expired().await?;
    print_json(&report)
}

async fn handle_freed(coordinator: &QueueCoordinator, matches: &ArgMatches) -> Result<()> {
    let promoted = coordinator.on_resource_freed(&equipment(matches)?).await?;
    print_json(&promoted)
}

async fn handle_queue(coordinator: &QueueCoordinator, matches: &ArgMatches) -> Result<()> {
    let view = coordinator.queue(&equipment(matches)?).await?;
    print_json(&view)
}

async fn handle_position(coordinator: &QueueCoordinator, matches: &ArgMatches) -> Result<()> {
    let member = matches
        .get_one::<String>("member")
        .context("member is required")?;
    let view = coordinator
        .position(&equipment(matches)?, &MemberId::new(member.as_str()))
        .await?;
    print_json(&view)
}

async fn handle_history(coordinator: &QueueCoordinator, matches: &ArgMatches) -> Result<()> {
    let limit = matches.get_one::<u32>("limit").copied().unwrap_or(20);
    let events = coordinator.history(&equipment(matches)?, limit).await?;
    print_json(&events)
}

fn equipment(matches: &ArgMatches) -> Result<EquipmentId> {
    matches
        .get_one::<String>("equipment")
        .map(|id| EquipmentId::new(id.as_str()))
        .context("equipment is required")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
