//! Air quality monitor CLI
//!
//! Offline tooling for the chart pipeline and the heap budget, plus a thin
//! client for a running agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{agent, memory, series};

const DEFAULT_AGENT_URL: &str = "http://localhost:8080";

/// Air quality monitor CLI
#[derive(Parser)]
#[command(name = "aqmon")]
#[command(author, version, about = "CLI for the Air Quality Monitor", long_about = None)]
pub struct Cli {
    /// Agent URL (can also be set via AQMON_AGENT_URL env var)
    #[arg(long, env = "AQMON_AGENT_URL")]
    pub agent_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reduce a JSON sample dump to a bounded chart series
    Downsample {
        /// Path to a JSON array of samples
        input: String,

        /// Range to show (24h, 7d, 30d, 90d, all)
        #[arg(long, short, default_value = "7d")]
        range: String,

        /// Metric to chart (e.g. pm25, temperature)
        #[arg(long, short, default_value = "aqi")]
        metric: String,

        /// Custom window start (RFC 3339); overrides --range
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Custom window end (RFC 3339)
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Surface width in pixels used to pick the point budget
        #[arg(long, short)]
        width: Option<u32>,

        /// Explicit point budget; overrides --width
        #[arg(long, short)]
        budget: Option<usize>,

        /// Reference time (RFC 3339), defaults to now
        #[arg(long)]
        now: Option<String>,

        /// Print every point instead of a summary
        #[arg(long)]
        points: bool,
    },

    /// Show the concrete window, labels and budget for a range
    Resolve {
        /// Range to resolve (24h, 7d, 30d, 90d, all)
        range: String,

        /// Surface width in pixels
        #[arg(long, short)]
        width: Option<u32>,

        /// Reference time (RFC 3339), defaults to now
        #[arg(long)]
        now: Option<String>,
    },

    /// Replay a heap usage sequence through the budget monitor
    Replay {
        /// Usage readings in MB, comma separated (e.g. 50,85,125,145)
        #[arg(long, short, value_delimiter = ',', required = true)]
        usage: Vec<f64>,

        /// Seconds between readings
        #[arg(long, default_value = "12")]
        interval_secs: f64,

        /// Warn-level throttle in seconds
        #[arg(long, default_value = "5")]
        throttle_secs: f64,

        #[arg(long, default_value = "80")]
        warn_mb: f64,

        #[arg(long, default_value = "120")]
        critical_mb: f64,

        #[arg(long, default_value = "140")]
        emergency_mb: f64,

        #[arg(long, default_value = "150")]
        hard_max_mb: f64,
    },

    /// Talk to a running agent
    #[command(subcommand)]
    Agent(AgentCommands),
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Show guard state and cache occupancy
    Status,

    /// Queue a cleanup pass on the agent
    Cleanup {
        /// Severity of the pass (warn, critical, emergency)
        #[arg(long, short, default_value = "warn")]
        severity: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    let format = config::Config::output_format(cli.format, config::Config::load);

    match cli.command {
        Commands::Downsample {
            input,
            range,
            metric,
            start,
            end,
            width,
            budget,
            now,
            points,
        } => {
            let args = series::DownsampleArgs {
                input,
                range,
                metric,
                start,
                end,
                width,
                budget,
                now,
                points,
            };
            series::downsample(&args, format)?;
        }
        Commands::Resolve { range, width, now } => {
            series::resolve(&range, width, now.as_deref(), format)?;
        }
        Commands::Replay {
            usage,
            interval_secs,
            throttle_secs,
            warn_mb,
            critical_mb,
            emergency_mb,
            hard_max_mb,
        } => {
            let args = memory::ReplayArgs {
                usage,
                interval_secs,
                throttle_secs,
                thresholds: [warn_mb, critical_mb, emergency_mb, hard_max_mb],
            };
            memory::replay(&args, format)?;
        }
        Commands::Agent(agent_cmd) => {
            let url = match cli.agent_url {
                Some(url) => url,
                None => config::Config::load()?
                    .agent_url
                    .unwrap_or_else(|| DEFAULT_AGENT_URL.to_string()),
            };
            let client = client::AgentClient::new(&url)?;

            match agent_cmd {
                AgentCommands::Status => agent::show_status(&client, format).await?,
                AgentCommands::Cleanup { severity } => {
                    agent::request_cleanup(&client, &severity, format).await?
                }
            }
        }
    }

    Ok(())
}
