use crate::config::{mask_password, CliConfig};
use colored::Colorize;
use haunted_core::db::Database;
use haunted_core::ensure_config_dir;

pub async fn cmd_init(config: &CliConfig) -> anyhow::Result<()> {
    println!("{}", "Initializing HauntedAI...".cyan().bold());
    println!();

    let config = config.load()?;
    println!(
        "  {} Database URL: {}",
        "→".blue(),
        mask_password(&config.database.url)
    );

    println!("  {} Connecting to database...", "→".blue());
    let db = Database::connect_with_retry(&config.database).await?;

    println!("  {} Running migrations...", "→".blue());
    db.run_migrations().await?;

    println!("  {} Verifying connection...", "→".blue());
    db.health_check().await?;

    db.close().await;

    let config_dir = ensure_config_dir()?;
    println!(
        "  {} Config directory: {}",
        "→".blue(),
        config_dir.display()
    );

    println!();
    println!(
        "{} {}",
        "✓".green().bold(),
        "Database initialized successfully!".green()
    );

    Ok(())
}
