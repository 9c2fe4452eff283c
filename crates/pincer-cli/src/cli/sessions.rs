//! `pincer sessions`: list stored sessions.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use crate::state::AppState;

pub fn list_sessions(state: &AppState, json: bool) -> Result<()> {
    let sessions = state.store.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions yet. Start one with: {}",
            style("i").blue().bold(),
            style("pincer agent -m \"hello\"").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Session").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Summary").fg(Color::White),
        Cell::new("Created").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for info in &sessions {
        table.add_row(vec![
            Cell::new(&info.key).fg(Color::Cyan),
            Cell::new(info.message_count),
            Cell::new(if info.has_summary { "yes" } else { "-" }),
            Cell::new(info.created.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(info.updated.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!("{table}");
    println!(
        "  {} session(s) in {}",
        sessions.len(),
        style(state.data_dir.display()).dim()
    );
    Ok(())
}
