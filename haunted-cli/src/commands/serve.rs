use crate::config::CliConfig;
use crate::runtime::Runtime;
use anyhow::Context;
use colored::Colorize;
use haunted_core::api::{serve, AppState};
use std::net::SocketAddr;
use tracing::info;

pub async fn cmd_serve(
    config: &CliConfig,
    addr: Option<String>,
    in_memory: bool,
) -> anyhow::Result<()> {
    let config = if in_memory {
        config.load_without_database()?
    } else {
        config.load()?
    };

    let bind = addr.unwrap_or_else(|| config.server.bind_addr.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", bind))?;

    let runtime = Runtime::build(&config, in_memory).await?;

    let shutdown = runtime.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    println!(
        "{} Serving on {} ({})",
        "→".blue(),
        format!("http://{}", addr).cyan(),
        if in_memory { "in-memory" } else { "postgres" }
    );

    let state = AppState::new(runtime.orchestrator.clone())
        .with_ledger(runtime.ledger.clone())
        .with_cors(config.server.cors_permissive);

    let result = serve(state, addr, runtime.shutdown.clone()).await;
    runtime.close().await;
    result?;

    println!("{} Server stopped", "✓".green());
    Ok(())
}
