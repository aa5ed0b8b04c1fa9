//! Commands against a running agent

use anyhow::Result;
use aqmon_lib::memory::BudgetState;
use colored::Colorize;
use tabled::Tabled;

use super::InputError;
use crate::client::{AgentClient, AgentStatus, CleanupRequest, CleanupResponse};
use crate::output::{
    color_status, format_mb, print_json, print_success, print_table, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct CacheRow {
    #[tabled(rename = "Cache")]
    name: String,
    #[tabled(rename = "Entries")]
    entries: usize,
    #[tabled(rename = "Items")]
    items: usize,
}

/// Show guard state and cache occupancy
pub async fn show_status(client: &AgentClient, format: OutputFormat) -> Result<()> {
    let status: AgentStatus = client.get("status").await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            let guard = &status.guard;

            println!("{}", "Memory Guard".bold());
            println!("{}", "=".repeat(50));
            println!("State:                  {}", color_status(&guard.state));
            println!("Heap usage:             {}", format_mb(guard.usage_mb));
            println!(
                "Thresholds:             warn {} / critical {} / emergency {} / max {}",
                guard.budget.warn_mb,
                guard.budget.critical_mb,
                guard.budget.emergency_mb,
                guard.budget.hard_max_mb
            );
            println!("Cleanup passes:         {}", guard.cleanup_passes);
            if let Some(updated) = &guard.updated_at {
                println!("Updated:                {}", updated);
            }
            if guard.reload_requested {
                println!();
                print_warning("Reload requested; the agent is restarting");
            }

            println!();
            println!("{}", "Caches".bold());
            let rows: Vec<CacheRow> = status
                .caches
                .iter()
                .map(|cache| CacheRow {
                    name: cache.name.clone(),
                    entries: cache.entries,
                    items: cache.items,
                })
                .collect();
            print_table(rows);
        }
    }

    Ok(())
}

/// Parse a severity accepted by the agent's cleanup endpoint
pub fn parse_severity(severity: &str) -> Result<BudgetState, InputError> {
    match severity.trim().to_ascii_lowercase().as_str() {
        "warn" => Ok(BudgetState::Warn),
        "critical" => Ok(BudgetState::Critical),
        "emergency" => Ok(BudgetState::Emergency),
        other => Err(InputError::Invalid(format!(
            "severity must be warn, critical or emergency, got '{}'",
            other
        ))),
    }
}

/// Queue a cleanup pass on the agent
pub async fn request_cleanup(client: &AgentClient, severity: &str, format: OutputFormat) -> Result<()> {
    let severity = parse_severity(severity)?;
    let request = CleanupRequest {
        severity: severity.to_string(),
    };

    let response: CleanupResponse = client.post("cleanup", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            if response.accepted {
                print_success(&format!("Queued {} cleanup pass", response.severity));
            } else {
                print_warning("Agent did not accept the cleanup request");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_severity() {
        assert_eq!(parse_severity("Critical").unwrap(), BudgetState::Critical);
        assert!(parse_severity("ok").is_err());
        assert!(parse_severity("loud").is_err());
    }
}
