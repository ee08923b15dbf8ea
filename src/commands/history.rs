//! History, similarity search, statistics and cleanup commands

use crate::commands::{one_line, open_store};
use crate::config::Config;
use crate::context::ContextComposer;
use crate::error::Result;
use crate::maintenance::MaintenanceOps;
use crate::storage::{ConversationRecord, ConversationStore};
use colored::Colorize;
use prettytable::{format, Table};

fn conversation_table(records: &[ConversationRecord], score: Option<&[usize]>) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    let mut header = prettytable::row!["ID".bold(), "When".bold(), "Model".bold(), "Prompt".bold()];
    if score.is_some() {
        header.add_cell(prettytable::Cell::new(&"Score".bold().to_string()));
    }
    table.add_row(header);

    for (idx, record) in records.iter().enumerate() {
        let model = if record.model_used.is_empty() {
            "-"
        } else {
            record.model_used.as_str()
        };
        let when = record.timestamp.format("%Y-%m-%d %H:%M").to_string();
        let mut row = prettytable::row![
            record.id.to_string().cyan(),
            when,
            model,
            one_line(&record.user_prompt, 50)
        ];
        if let Some(scores) = score {
            row.add_cell(prettytable::Cell::new(&scores[idx].to_string()));
        }
        table.add_row(row);
    }
    table
}

/// Print the most recent conversations
pub fn show_history(config: &Config, limit: usize, project: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let records = store.get_recent_conversations(limit, project)?;

    if records.is_empty() {
        println!("{}", "No conversation history found.".yellow());
        return Ok(());
    }

    println!("\nRecent conversations:");
    conversation_table(&records, None).printstd();
    println!();
    Ok(())
}

/// Print conversations ranked by keyword overlap with `query`
pub fn show_similar(config: &Config, query: &str, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let composer = ContextComposer::new(store, &config.memory);
    let similar = composer.find_similar_conversations(query, limit)?;

    if similar.is_empty() {
        println!("{}", format!("No conversations match '{}'.", query).yellow());
        return Ok(());
    }

    let scores: Vec<usize> = similar.iter().map(|s| s.score).collect();
    let records: Vec<ConversationRecord> = similar.into_iter().map(|s| s.record).collect();
    println!("\nConversations similar to '{}':", query);
    conversation_table(&records, Some(scores.as_slice())).printstd();
    println!();
    Ok(())
}

pub fn show_stats(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let summary = MaintenanceOps::new(store.clone()).statistics_summary()?;

    println!("\n{}", "Memory statistics".bold());
    println!("{}", summary);
    println!("Database:      {}\n", store.db_path().display());
    Ok(())
}

/// Delete conversations older than `days`, or the configured retention
pub fn run_cleanup(config: &Config, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(config.memory.retention_days);
    let store = open_store(config)?;
    let deleted = MaintenanceOps::new(store).cleanup_old_conversations(days)?;

    if days == 0 {
        println!("{}", format!("Deleted all {} conversations.", deleted).green());
    } else {
        println!(
            "{}",
            format!("Deleted {} conversations older than {} days.", deleted, days).green()
        );
    }
    Ok(())
}
