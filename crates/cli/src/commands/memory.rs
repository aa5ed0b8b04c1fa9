//! Heap budget replay

use anyhow::Result;
use aqmon_lib::memory::{CleanupDecision, MemoryBudget, MemoryMonitor, ScriptedProbe, TickOutcome};
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabled::Tabled;

use super::InputError;
use crate::output::{color_state, format_mb, print_json, print_table, OutputFormat};

/// Arguments for `aqmon replay`
#[derive(Debug, Clone)]
pub struct ReplayArgs {
    pub usage: Vec<f64>,
    pub interval_secs: f64,
    pub throttle_secs: f64,
    /// warn, critical, emergency, hard max (MB)
    pub thresholds: [f64; 4],
}

/// One replayed reading
#[derive(Debug, Clone, Serialize)]
pub struct ReplayStep {
    pub elapsed_secs: f64,
    #[serde(flatten)]
    pub outcome: TickOutcome,
}

/// Totals over a replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub ticks: usize,
    pub transitions: usize,
    pub cleanups: usize,
    pub throttled: usize,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    steps: Vec<ReplayStep>,
    summary: ReplaySummary,
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "T+")]
    elapsed: String,
    #[tabled(rename = "Usage")]
    usage: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Decision")]
    decision: String,
}

fn positive_secs(name: &str, secs: f64) -> Result<Duration, InputError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(InputError::Invalid(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, secs
        )));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| {
        InputError::Invalid(format!("{} is out of range, got {}", name, secs))
    })
}

/// Offset of reading `index` from the start of the replay
fn tick_offset(interval: Duration, index: usize) -> Result<Duration, InputError> {
    u32::try_from(index)
        .ok()
        .and_then(|i| interval.checked_mul(i))
        .ok_or_else(|| {
            InputError::Invalid(format!(
                "--interval-secs {} overflows at reading {}",
                interval.as_secs_f64(),
                index
            ))
        })
}

/// Feed readings through a monitor at a fixed cadence
pub fn simulate(args: &ReplayArgs) -> Result<(Vec<ReplayStep>, ReplaySummary)> {
    if args.usage.is_empty() {
        return Err(InputError::Invalid("at least one usage reading is required".to_string()).into());
    }

    let [warn, critical, emergency, hard_max] = args.thresholds;
    let budget = MemoryBudget::new(warn, critical, emergency, hard_max)?;
    let interval = positive_secs("--interval-secs", args.interval_secs)?;
    let throttle = positive_secs("--throttle-secs", args.throttle_secs)?;

    let probe = Arc::new(ScriptedProbe::new(args.usage.iter().copied()));
    let mut monitor = MemoryMonitor::new(budget, probe).with_throttle(throttle);

    let start = Instant::now();
    let mut summary = ReplaySummary::default();
    let mut steps = Vec::with_capacity(args.usage.len());

    for i in 0..args.usage.len() {
        let offset = tick_offset(interval, i)?;
        let at = start.checked_add(offset).ok_or_else(|| {
            InputError::Invalid(format!(
                "--interval-secs {} is too large to replay",
                args.interval_secs
            ))
        })?;
        let outcome = monitor.tick(at);

        summary.ticks += 1;
        if outcome.is_transition() {
            summary.transitions += 1;
        }
        match outcome.decision {
            CleanupDecision::Run(_) => summary.cleanups += 1,
            CleanupDecision::Throttled => summary.throttled += 1,
            CleanupDecision::None => {}
        }

        steps.push(ReplayStep {
            elapsed_secs: offset.as_secs_f64(),
            outcome,
        });
    }

    Ok((steps, summary))
}

fn describe(decision: CleanupDecision) -> String {
    match decision {
        CleanupDecision::None => "-".dimmed().to_string(),
        CleanupDecision::Throttled => "throttled".yellow().to_string(),
        CleanupDecision::Run(severity) => format!("cleanup ({})", severity).bold().to_string(),
    }
}

/// Replay a usage sequence and print every decision
pub fn replay(args: &ReplayArgs, format: OutputFormat) -> Result<()> {
    let (steps, summary) = simulate(args)?;

    match format {
        OutputFormat::Json => print_json(&ReplayReport { steps, summary })?,
        OutputFormat::Table => {
            let rows: Vec<StepRow> = steps
                .iter()
                .map(|step| {
                    let state = if step.outcome.is_transition() {
                        format!("{} -> {}", step.outcome.previous, color_state(step.outcome.state))
                    } else {
                        color_state(step.outcome.state)
                    };
                    StepRow {
                        elapsed: format!("{:.0}s", step.elapsed_secs),
                        usage: format_mb(step.outcome.usage_mb),
                        state,
                        decision: describe(step.outcome.decision),
                    }
                })
                .collect();
            print_table(rows);

            println!();
            println!(
                "{} ticks, {} transitions, {} cleanup passes, {} throttled",
                summary.ticks,
                summary.transitions,
                summary.cleanups.to_string().green(),
                summary.throttled
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqmon_lib::memory::BudgetState;

    fn args(usage: &[f64], interval_secs: f64) -> ReplayArgs {
        ReplayArgs {
            usage: usage.to_vec(),
            interval_secs,
            throttle_secs: 5.0,
            thresholds: [80.0, 120.0, 140.0, 150.0],
        }
    }

    #[test]
    fn test_warn_readings_inside_throttle_run_once() {
        let (steps, summary) = simulate(&args(&[85.0, 86.0, 87.0], 2.0)).unwrap();

        assert_eq!(steps[0].outcome.decision, CleanupDecision::Run(BudgetState::Warn));
        assert_eq!(steps[1].outcome.decision, CleanupDecision::Throttled);
        assert_eq!(steps[2].outcome.decision, CleanupDecision::Throttled);
        assert_eq!(summary.cleanups, 1);
        assert_eq!(summary.throttled, 2);

        // 6s after the first pass the throttle has lapsed
        let (steps, _) = simulate(&args(&[85.0, 86.0, 87.0], 3.0)).unwrap();
        assert_eq!(steps[2].outcome.decision, CleanupDecision::Run(BudgetState::Warn));
    }

    #[test]
    fn test_escalation_bypasses_throttle() {
        let (steps, summary) = simulate(&args(&[50.0, 85.0, 125.0, 145.0], 1.0)).unwrap();

        assert_eq!(steps[0].outcome.decision, CleanupDecision::None);
        assert_eq!(steps[2].outcome.decision, CleanupDecision::Run(BudgetState::Critical));
        assert_eq!(steps[3].outcome.decision, CleanupDecision::Run(BudgetState::Emergency));
        assert_eq!(
            summary,
            ReplaySummary {
                ticks: 4,
                transitions: 3,
                cleanups: 3,
                throttled: 0,
            }
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(simulate(&args(&[], 12.0)).is_err());
        assert!(simulate(&args(&[50.0], -1.0)).is_err());

        let mut unordered = args(&[50.0], 12.0);
        unordered.thresholds = [120.0, 80.0, 140.0, 150.0];
        assert!(simulate(&unordered).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        assert!(simulate(&args(&[50.0], 1e300)).is_err());

        let mut throttle = args(&[50.0], 12.0);
        throttle.throttle_secs = 1e300;
        assert!(simulate(&throttle).is_err());

        // representable interval whose later offsets overflow
        let err = simulate(&args(&[50.0, 60.0, 70.0], 1e19)).unwrap_err();
        assert!(err.downcast_ref::<InputError>().is_some());

        assert!(tick_offset(Duration::MAX, 2).is_err());
        assert_eq!(
            tick_offset(Duration::from_secs(12), 3).unwrap(),
            Duration::from_secs(36)
        );
    }
}
