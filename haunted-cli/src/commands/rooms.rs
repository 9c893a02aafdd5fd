use crate::client::ApiClient;
use crate::output::{phase_label, print_json, print_rooms, print_snapshot, OutputFormat};
use clap::Subcommand;
use colored::Colorize;

#[derive(Subcommand)]
pub enum RoomsCommand {
    #[command(about = "Create a room")]
    Create {
        #[arg(short, long, help = "Owner (wallet address or user id)")]
        owner: String,

        #[arg(short, long, help = "Prompt for the story agent")]
        input: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    #[command(about = "Show a room with its stage results and assets")]
    Show {
        #[arg(help = "Room ID (UUID)")]
        room_id: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    #[command(about = "List an owner's rooms, newest first")]
    List {
        #[arg(short, long, help = "Owner (wallet address or user id)")]
        owner: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    #[command(about = "Start the pipeline for an idle room")]
    Start {
        #[arg(help = "Room ID (UUID)")]
        room_id: String,
    },

    #[command(about = "Cancel a running room")]
    Cancel {
        #[arg(help = "Room ID (UUID)")]
        room_id: String,
    },
}

pub async fn handle_rooms_command(cmd: RoomsCommand, server: &str) -> anyhow::Result<()> {
    let client = ApiClient::new(server);

    match cmd {
        RoomsCommand::Create {
            owner,
            input,
            format,
        } => {
            let room = client.create_room(&owner, &input).await?;
            match format {
                OutputFormat::Json => print_json(&room)?,
                OutputFormat::Text => {
                    println!(
                        "{} Created room {}",
                        "✓".green().bold(),
                        room.id.to_string().cyan()
                    );
                    println!(
                        "  Start it with: haunted rooms start {}",
                        room.id.to_string().dimmed()
                    );
                }
            }
        }
        RoomsCommand::Show { room_id, format } => {
            let snapshot = client.get_room(&room_id).await?;
            match format {
                OutputFormat::Json => print_json(&snapshot)?,
                OutputFormat::Text => print_snapshot(&snapshot),
            }
        }
        RoomsCommand::List { owner, format } => {
            let rooms = client.list_rooms(&owner).await?;
            match format {
                OutputFormat::Json => print_json(&rooms)?,
                OutputFormat::Text => print_rooms(&rooms),
            }
        }
        RoomsCommand::Start { room_id } => {
            client.start_room(&room_id).await?;
            println!("{} Room {} started", "✓".green().bold(), room_id.cyan());
            println!(
                "  Follow it with: haunted logs {}",
                room_id.dimmed()
            );
        }
        RoomsCommand::Cancel { room_id } => {
            let room = client.cancel_room(&room_id).await?;
            println!(
                "{} Room {} is now {}",
                "✓".green().bold(),
                room.id.to_string().cyan(),
                phase_label(&room.phase())
            );
        }
    }

    Ok(())
}
