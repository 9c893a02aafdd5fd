use colored::Colorize;
use haunted_core::models::Stage;
use haunted_core::VERSION;

pub fn cmd_version(detailed: bool) -> anyhow::Result<()> {
    if detailed {
        println!("{}", "HauntedAI Version Information".cyan().bold());
        println!("{}", "═".repeat(40).dimmed());
        println!("  {:<15} {}", "Version:".bold(), VERSION);
        println!("  {:<15} {}", "Name:".bold(), env!("CARGO_PKG_NAME"));
        println!();
        println!("  {}", "Pipeline:".bold());
        for stage in Stage::ALL {
            println!("    {}. {}", stage.ordinal() + 1, stage);
        }
        println!();
        println!("  {}", "Build Information:".bold());
        println!("    Rust Edition: 2021");
        #[cfg(debug_assertions)]
        println!("    Build:        Debug");
        #[cfg(not(debug_assertions))]
        println!("    Build:        Release");
    } else {
        println!("haunted {}", VERSION);
    }

    Ok(())
}
