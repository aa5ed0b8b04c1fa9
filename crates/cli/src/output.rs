//! Output formatting utilities

use aqmon_lib::memory::BudgetState;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table of rows
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        print_warning("No items found");
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format megabytes with one decimal
pub fn format_mb(mb: Option<f64>) -> String {
    match mb {
        Some(mb) => format!("{:.1} MB", mb),
        None => "n/a".to_string(),
    }
}

/// Format a chart value, dropping a trailing `.0`
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Color a budget state
pub fn color_state(state: BudgetState) -> String {
    let label = state.to_string();
    match state {
        BudgetState::Ok => label.green().to_string(),
        BudgetState::Warn => label.yellow().to_string(),
        BudgetState::Critical => label.red().to_string(),
        BudgetState::Emergency => label.red().bold().to_string(),
    }
}

/// Color a health or budget status string from the agent
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "ok" | "healthy" => status.green().to_string(),
        "warn" | "degraded" => status.yellow().to_string(),
        "critical" | "unhealthy" => status.red().to_string(),
        "emergency" => status.red().bold().to_string(),
        _ => status.to_string(),
    }
}
