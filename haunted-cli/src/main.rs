use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod client;
mod commands;
mod config;
mod output;
mod runtime;

use commands::{
    cmd_init, cmd_logs, cmd_run, cmd_serve, cmd_version, handle_rooms_command, RoomsCommand,
};
use config::CliConfig;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "haunted")]
#[command(version = haunted_core::VERSION)]
#[command(about = "HauntedAI - multi-agent room workflow orchestrator")]
#[command(long_about = r#"
HauntedAI drives each room through the story, asset, code and deploy agents,
retrying transient failures and streaming progress events as it goes.

Use 'haunted init' to prepare the database, 'haunted serve' to expose the HTTP
API, or 'haunted run' for a one-shot local pipeline against the configured agents.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true, help = "Additional config file, loaded last")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run database migrations")]
    Init,

    #[command(about = "Serve the HTTP API")]
    Serve {
        #[arg(short, long, help = "Bind address (defaults to server.bind_addr)")]
        addr: Option<String>,

        #[arg(long, help = "Keep rooms in memory instead of PostgreSQL")]
        in_memory: bool,
    },

    #[command(about = "Run one room through the pipeline locally and stream its log")]
    Run {
        #[arg(short, long, help = "Owner (wallet address or user id)")]
        owner: String,

        #[arg(short, long, help = "Prompt for the story agent")]
        input: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    #[command(about = "Manage rooms on a running server")]
    Rooms {
        #[command(subcommand)]
        action: RoomsCommand,

        #[arg(short, long, global = true, env = "HAUNTED_SERVER_URL")]
        server: Option<String>,
    },

    #[command(about = "Follow a room's log on a running server")]
    Logs {
        #[arg(help = "Room ID (UUID)")]
        room_id: String,

        #[arg(short, long, env = "HAUNTED_SERVER_URL")]
        server: Option<String>,
    },

    #[command(about = "Show version information")]
    Version {
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = CliConfig::new(cli.config.clone());
    init_logging(cli.verbose, &config);

    match run(cli, config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<haunted_core::HauntedError>() {
                Some(err) => eprintln!("{}", haunted_core::CliErrorDisplay::new(err)),
                None => eprintln!("{}: {}", "Error".red().bold(), e),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, config: &CliConfig) {
    let (level, json) = config.logging();

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli, config: CliConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init => cmd_init(&config).await,
        Commands::Serve { addr, in_memory } => cmd_serve(&config, addr, in_memory).await,
        Commands::Run {
            owner,
            input,
            format,
        } => cmd_run(&config, &owner, &input, &format).await,
        Commands::Rooms { action, server } => {
            handle_rooms_command(action, &config.server_url(server)).await
        }
        Commands::Logs { room_id, server } => {
            cmd_logs(&config.server_url(server), &room_id).await
        }
        Commands::Version { detailed } => cmd_version(detailed),
    }
}
