//! Offline chart pipeline commands

use anyhow::Result;
use aqmon_lib::models::{read_samples, MetricKey, TransformResult};
use aqmon_lib::series::{resolve as resolve_window, RangeSelector, SeriesTransform, SizeClass};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::{parse_timestamp, reference_time, InputError};
use crate::output::{format_value, print_info, print_json, print_table, OutputFormat};

/// Arguments for `aqmon downsample`
#[derive(Debug, Clone)]
pub struct DownsampleArgs {
    pub input: String,
    pub range: String,
    pub metric: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub width: Option<u32>,
    pub budget: Option<usize>,
    pub now: Option<String>,
    pub points: bool,
}

/// Row for the point table
#[derive(Tabled)]
struct PointRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Samples")]
    samples: String,
}

/// Resolved window summary printed by `aqmon resolve`
#[derive(Debug, Serialize)]
struct ResolvedRange {
    range: String,
    start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    hours: Option<f64>,
    size_class: SizeClass,
    point_budget: usize,
}

/// Build the range selector, letting explicit bounds win over `--range`
pub fn selector_from_args(
    range: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<RangeSelector> {
    match (start, end) {
        (Some(start), Some(end)) => Ok(RangeSelector::Custom {
            start: Some(parse_timestamp(start)?),
            end: Some(parse_timestamp(end)?),
        }),
        (None, None) => range.parse(),
        _ => Err(InputError::Invalid("--start and --end must be given together".to_string()).into()),
    }
}

fn parse_metric(metric: &str) -> Result<MetricKey, InputError> {
    metric
        .parse()
        .map_err(|_| InputError::UnknownMetric(metric.to_string()))
}

/// Downsample a sample dump for one metric
pub fn downsample(args: &DownsampleArgs, format: OutputFormat) -> Result<()> {
    let selector = selector_from_args(&args.range, args.start.as_deref(), args.end.as_deref())?;
    let metric = parse_metric(&args.metric)?;
    let now = reference_time(args.now.as_deref())?;
    let samples = read_samples(Path::new(&args.input))?;

    let mut transform = SeriesTransform::new(selector, now, args.width);
    if let Some(budget) = args.budget {
        if budget == 0 {
            return Err(InputError::Invalid("--budget must be at least 1".to_string()).into());
        }
        transform = transform.with_point_budget(budget);
    }

    let result = transform.transform(&samples, metric);

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => print_result(&transform, metric, samples.len(), &result, args.points),
    }

    Ok(())
}

fn print_result(
    transform: &SeriesTransform,
    metric: MetricKey,
    fetched: usize,
    result: &TransformResult,
    show_points: bool,
) {
    let window = transform.window();

    println!("{}", format!("Series: {}", metric).bold());
    println!("{}", "=".repeat(50));
    println!("Range:                  {}", transform.selector().to_string().cyan());
    if window.is_unbounded() {
        println!("Window:                 all data up to {}", window.end.to_rfc3339());
    } else {
        println!(
            "Window:                 {} .. {}",
            window.start.to_rfc3339(),
            window.end.to_rfc3339()
        );
    }
    println!("Point budget:           {}", transform.point_budget());
    println!();
    println!("Samples fetched:        {}", fetched);
    println!("Valid in window:        {}", result.meta.original_count);
    println!("Points rendered:        {}", result.meta.rendered_count.to_string().green());
    if result.is_aggregated() {
        println!("Bin width:              {}h", result.meta.bin_width_hours);
    } else {
        println!("Bin width:              {}", "none (raw points)".dimmed());
    }

    if result.points.is_empty() {
        println!();
        print_info("No readings for this metric in the selected window");
        return;
    }

    if show_points {
        println!();
        let rows: Vec<PointRow> = result
            .points
            .iter()
            .map(|point| PointRow {
                timestamp: point.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                label: point.display_label.clone(),
                value: format_value(point.value),
                samples: point
                    .original_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "1".to_string()),
            })
            .collect();
        print_table(rows);
    } else if let (Some(first), Some(last)) = (result.points.first(), result.points.last()) {
        println!();
        println!("First:                  {} ({})", format_value(first.value), first.display_label);
        println!("Last:                   {} ({})", format_value(last.value), last.display_label);
    }
}

/// Show what a range selector resolves to
pub fn resolve(range: &str, width: Option<u32>, now: Option<&str>, format: OutputFormat) -> Result<()> {
    let selector: RangeSelector = range.parse()?;
    let now = reference_time(now)?;
    let window = resolve_window(selector, now);
    let size_class = SizeClass::from_width(width);

    let resolved = ResolvedRange {
        range: selector.to_string(),
        start: (!window.is_unbounded()).then_some(window.start),
        end: window.end,
        hours: (!window.is_unbounded()).then(|| window.hours()),
        size_class,
        point_budget: size_class.point_budget(),
    };

    match format {
        OutputFormat::Json => print_json(&resolved)?,
        OutputFormat::Table => {
            println!("{}", format!("Range: {}", resolved.range).bold());
            println!("{}", "=".repeat(50));
            match resolved.start {
                Some(start) => println!("Start:                  {}", start.to_rfc3339()),
                None => println!("Start:                  {}", "earliest sample".dimmed()),
            }
            println!("End:                    {}", resolved.end.to_rfc3339());
            if let Some(hours) = resolved.hours {
                println!("Span:                   {:.0}h", hours);
            }
            println!("Size class:             {}", format!("{:?}", resolved.size_class).to_lowercase().cyan());
            println!("Point budget:           {}", resolved.point_budget);
        }
    }

    Ok(())
}
