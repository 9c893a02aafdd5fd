use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use haunted_core::models::{LogEvent, LogLevel, Room, RoomPhase, RoomSnapshot};
use serde::Serialize;

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

pub fn print_log_event(event: &LogEvent) {
    let time = event.timestamp.format("%H:%M:%S%.3f").to_string();
    let source = format!("[{}]", event.source);
    let message = if event.is_terminal_level() {
        event.message.bold()
    } else {
        event.message.normal()
    };

    let (icon, source) = match event.level {
        LogLevel::Info => ("→".blue(), source.blue()),
        LogLevel::Warn => ("!".yellow(), source.yellow()),
        LogLevel::Error => ("✗".red(), source.red()),
        LogLevel::Success => ("✓".green(), source.green()),
    };

    println!("{} {} {:<16} {}", time.dimmed(), icon, source, message);
}

pub fn phase_label(phase: &RoomPhase) -> String {
    match phase {
        RoomPhase::Idle => "idle".to_string(),
        RoomPhase::Running(stage) => format!("running ({})", stage),
        RoomPhase::Done => "done".to_string(),
        RoomPhase::Failed => "failed".to_string(),
    }
}

fn phase_cell(phase: &RoomPhase) -> Cell {
    let color = match phase {
        RoomPhase::Idle => Color::White,
        RoomPhase::Running(_) => Color::Yellow,
        RoomPhase::Done => Color::Green,
        RoomPhase::Failed => Color::Red,
    };
    Cell::new(phase_label(phase)).fg(color)
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).fg(Color::White))
                .collect::<Vec<_>>(),
        );
    table
}

pub fn print_rooms(rooms: &[Room]) {
    if rooms.is_empty() {
        println!("{}", "No rooms found.".yellow());
        println!("{}", "Create one with 'haunted rooms create'.".dimmed());
        return;
    }

    let mut table = new_table(&["Room ID", "Status", "Input", "Created"]);
    for room in rooms {
        table.add_row(vec![
            Cell::new(room.id),
            phase_cell(&room.phase()),
            Cell::new(truncate_string(&room.input_text, 40)),
            Cell::new(room.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!("{table}");
    println!();
    println!("  Total: {} room(s)", rooms.len());
}

pub fn print_snapshot(snapshot: &RoomSnapshot) {
    let room = &snapshot.room;

    println!("{}", "Room".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!("  {:<10} {}", "ID:".bold(), room.id);
    println!("  {:<10} {}", "Owner:".bold(), room.owner_id);
    println!("  {:<10} {}", "Status:".bold(), phase_label(&snapshot.phase));
    println!("  {:<10} {}", "Input:".bold(), room.input_text);
    if let Some(failure) = room.failure() {
        println!(
            "  {:<10} {} ({})",
            "Failure:".bold(),
            failure.message.red(),
            failure.kind
        );
    }
    println!();

    if snapshot.results.is_empty() {
        println!("{}", "No stage results yet.".dimmed());
        return;
    }

    let mut table = new_table(&["Stage", "Result", "Attempts", "Duration", "Content ID"]);
    for result in &snapshot.results {
        let outcome = if result.success {
            Cell::new("ok").fg(Color::Green)
        } else {
            Cell::new(result.error.as_deref().unwrap_or("failed")).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(result.stage),
            outcome,
            Cell::new(result.attempts),
            Cell::new(format!("{}ms", result.duration_ms)),
            Cell::new(result.content_id.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");

    if !snapshot.assets.is_empty() {
        println!();
        println!("  {} pinned asset(s)", snapshot.assets.len());
    }
}

pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
