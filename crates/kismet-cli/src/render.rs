//! Terminal output for views and saved records.

use anyhow::Result;
use kismet_core::storage::Record;
use kismet_core::view::{AssetView, ItemView, ViewState};
use owo_colors::OwoColorize;
use serde::Serialize;

pub fn print_view(view: &ViewState, saved: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    if let Some(error) = &view.error {
        println!("{}", error.red());
        return Ok(());
    }

    if !view.title.is_empty() {
        let marker = if saved { " ★" } else { "" };
        println!("{}{}", view.title.bold(), marker.yellow());
    }
    if let Some(summary) = &view.filter_summary {
        println!("{}", summary.dimmed());
    }
    println!();

    for item in &view.items {
        match item {
            ItemView::Text { text, .. } => println!("{text}\n"),
            ItemView::Field { label, value, .. } => {
                if value.contains('\n') {
                    println!("{}\n{value}\n", label.bold());
                } else {
                    println!("{} {value}", format!("{label}:").bold());
                }
            }
            ItemView::Image { prompt, asset, .. } => {
                match asset {
                    AssetView::Ready { asset } => {
                        println!("{} {}", "[image]".magenta(), asset.path().display().cyan())
                    }
                    AssetView::Resolving { placeholder } => {
                        println!("{} {}", "[image]".magenta(), placeholder.dimmed())
                    }
                    AssetView::Pending => println!("{}", "[image not generated]".magenta()),
                }
                println!("  {}\n", prompt.dimmed());
            }
        }
    }
    Ok(())
}

pub fn print_records<R: Record + Serialize>(kind: &str, records: &[R], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("{}", format!("No saved {kind}s.").dimmed());
        return Ok(());
    }
    for record in records {
        let id = record.id().map(|id| id.to_string()).unwrap_or_default();
        println!(
            "{:>5}  {}  {}",
            id.cyan(),
            record.created_at().format("%Y-%m-%d %H:%M").dimmed(),
            truncate(record.natural_key(), 80)
        );
    }
    println!(
        "{}",
        format!("{} saved {kind}(s)", records.len()).dimmed()
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
