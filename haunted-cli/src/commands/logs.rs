use crate::client::ApiClient;
use crate::output::print_log_event;
use colored::Colorize;

pub async fn cmd_logs(server: &str, room_id: &str) -> anyhow::Result<()> {
    let client = ApiClient::new(server);
    let seen = client.follow_logs(room_id, print_log_event).await?;

    println!();
    println!("{} {} event(s), stream closed", "✓".green(), seen);
    Ok(())
}
