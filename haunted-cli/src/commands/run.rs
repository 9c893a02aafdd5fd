use crate::config::CliConfig;
use crate::output::{print_json, print_log_event, print_snapshot, OutputFormat};
use crate::runtime::Runtime;
use anyhow::bail;
use colored::Colorize;
use haunted_core::models::RoomPhase;

/// Runs a single room in memory against the configured agents, streaming its
/// log to the terminal until the room settles.
pub async fn cmd_run(
    config: &CliConfig,
    owner: &str,
    input: &str,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let config = config.load_without_database()?;
    let runtime = Runtime::build(&config, true).await?;
    let orchestrator = runtime.orchestrator.clone();

    let room = orchestrator.create_room(owner, input).await?;
    let mut logs = orchestrator.subscribe_logs(room.id).await?;
    let handle = orchestrator.start(room.id).await?;

    if matches!(format, OutputFormat::Text) {
        println!("{} Room {}", "→".blue(), room.id.to_string().cyan());
        println!();
    }

    while let Some(event) = logs.next().await {
        if matches!(format, OutputFormat::Text) {
            print_log_event(&event);
        }
    }

    let phase = handle.wait().await?;
    let snapshot = orchestrator.snapshot(room.id).await?;
    runtime.close().await;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Text => {
            println!();
            print_snapshot(&snapshot);
        }
    }

    if phase == RoomPhase::Failed {
        let reason = snapshot
            .room
            .failure()
            .map(|f| f.message)
            .unwrap_or_else(|| "unknown failure".to_string());
        bail!("Room {} failed: {}", room.id, reason);
    }

    Ok(())
}
