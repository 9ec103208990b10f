//! Curves CLI - epidemic time-series views
//!
//! # Main Commands
//!
//! ```bash
//! curves serve                          # Start HTTP server (port 3000)
//! curves summary data.csv               # Date range, entities, options
//! curves validate data.csv              # Check dataset consistency
//! ```
//!
//! # View Commands
//!
//! ```bash
//! curves timeline data.csv --region Europe --split country --top 5
//! curves progression data.csv --metric deaths --devtime --log-scale
//! curves map data.csv --date 2020-04-01 --per-capita
//! ```

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use curves::{
    human_format, load_dataset, parse_csv_file_auto, validate_dataset, Config, Dataset, Dimension,
    MapOptions, MapSnapshot, Metric, ProgressionOptions, ProgressionView, Selection, TimelineView,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "curves")]
#[command(about = "Epidemic curve views from a daily time-series CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Dataset file (default: CURVES_DATA or data/covid.csv)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Port to listen on (default: CURVES_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show date range, entity counts and filter options
    Summary {
        /// Input CSV file
        input: PathBuf,
    },

    /// Check dataset consistency
    Validate {
        /// Input CSV file
        input: PathBuf,
    },

    /// Timeline view for a selection
    Timeline {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Split dimension (region, subregion, country, country_area)
        #[arg(short, long)]
        split: Option<Dimension>,

        /// Keep the top N categories, merge the rest
        #[arg(short, long)]
        top: Option<String>,

        /// Daily increments instead of cumulative values
        #[arg(long)]
        increments: bool,

        /// Align on development time
        #[arg(long)]
        devtime: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-entity progression curves
    Progression {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Plotted metric
        #[arg(short, long, default_value = "confirmed_cases")]
        metric: Metric,

        /// Keep the top N entities
        #[arg(short, long)]
        top: Option<String>,

        /// Plot rates instead of counts
        #[arg(long)]
        per_capita: bool,

        /// Align on development time
        #[arg(long)]
        devtime: bool,

        /// Log scale (non-positive values dropped)
        #[arg(long)]
        log_scale: bool,

        /// Daily percent change
        #[arg(long)]
        percent: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Map snapshot of one day
    Map {
        /// Input CSV file
        input: PathBuf,

        /// Metric shown
        #[arg(short, long, default_value = "confirmed_cases")]
        metric: Metric,

        /// Snapshot date (YYYY-MM-DD, default: last date)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Rates instead of counts
        #[arg(long)]
        per_capita: bool,

        /// Hide entities below the population threshold
        #[arg(long)]
        exclude_small_population: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Selection filters shared by the view commands.
#[derive(Args)]
struct FilterArgs {
    /// Regions to include (repeatable)
    #[arg(long)]
    region: Vec<String>,

    /// Subregions to include (repeatable)
    #[arg(long)]
    subregion: Vec<String>,

    /// Countries to include (repeatable)
    #[arg(long)]
    country: Vec<String>,

    /// Country areas to include (repeatable)
    #[arg(long)]
    area: Vec<String>,

    /// Hide entities below the population threshold
    #[arg(long)]
    small_pop_exclude: bool,
}

impl FilterArgs {
    fn selection(self) -> Selection {
        Selection {
            region: self.region.into_iter().collect(),
            subregion: self.subregion.into_iter().collect(),
            country: self.country.into_iter().collect(),
            area: self.area.into_iter().collect(),
            small_pop_exclude: self.small_pop_exclude,
            ..Selection::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { data, port } => {
            let config = config.with_data_path(data).with_port(port);
            cmd_serve(config).await
        }

        Commands::Summary { input } => cmd_summary(&input, &config),

        Commands::Validate { input } => cmd_validate(&input, &config),

        Commands::Timeline {
            input,
            filter,
            split,
            top,
            increments,
            devtime,
            output,
        } => {
            let mut selection = filter.selection();
            selection.split = split;
            selection.top_limit = top.as_deref().and_then(curves::models::parse_top_limit);
            selection.increments = increments;
            selection.devtime = devtime;
            cmd_timeline(&input, &config, &selection, output.as_deref())
        }

        Commands::Progression {
            input,
            filter,
            metric,
            top,
            per_capita,
            devtime,
            log_scale,
            percent,
            output,
        } => {
            let mut selection = filter.selection();
            selection.top_limit = top.as_deref().and_then(curves::models::parse_top_limit);
            selection.per_capita = per_capita;
            let options = ProgressionOptions {
                metric,
                devtime,
                log_scale,
                percent,
            };
            cmd_progression(&input, &config, &selection, &options, output.as_deref())
        }

        Commands::Map {
            input,
            metric,
            date,
            per_capita,
            exclude_small_population,
            output,
        } => {
            let options = MapOptions {
                metric,
                per_capita,
                date,
                exclude_small_population,
            };
            cmd_map(&input, &config, &options, output.as_deref())
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    curves::server::start_server(config).await
}

fn load(input: &Path, config: &Config) -> Result<Dataset, Box<dyn std::error::Error>> {
    Ok(load_dataset(input, &config.dataset)?)
}

fn cmd_summary(input: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = load(input, config)?;
    let summary = dataset.summary();

    eprintln!("\n📊 {}", input.display());
    eprintln!("   Rows:      {}", summary.rows);
    eprintln!("   Entities:  {}", summary.entities);
    eprintln!(
        "   Dates:     {} (baseline) / {} to {} ({} days)",
        summary.first_date, summary.begin_date, summary.end_date, summary.days
    );
    eprintln!(
        "   Crossed {} per million: {} of {}",
        summary.devtime_threshold, summary.entities_with_t0, summary.entities
    );
    eprintln!("   Small populations: {}", summary.small_population_entities);

    let json = serde_json::to_string_pretty(&summary)?;
    write_output(&json, None)
}

fn cmd_validate(input: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let parsed = parse_csv_file_auto(input, &config.dataset)?;
    let report = validate_dataset(&parsed.observations);

    for issue in &report.issues {
        eprintln!("   - {}", issue);
    }
    if report.truncated > 0 {
        eprintln!("   ... {} more", report.truncated);
    }

    eprintln!(
        "\n📊 Results: {} rows, {} entities, {} issue(s)",
        report.rows,
        report.entities,
        report.issues.len() + report.truncated
    );

    if !report.is_valid() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_timeline(
    input: &Path,
    config: &Config,
    selection: &Selection,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = load(input, config)?;
    let view = TimelineView::build(&dataset, selection);

    if view.split_active {
        eprintln!("   Order: {}", view.order.join(", "));
    }
    write_json(&view, output)
}

fn cmd_progression(
    input: &Path,
    config: &Config,
    selection: &Selection,
    options: &ProgressionOptions,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = load(input, config)?;
    let view = ProgressionView::build(&dataset, selection, options);

    for point in &view.reference_points {
        let t0 = point
            .t0
            .as_ref()
            .map(|m| m.date.to_string())
            .unwrap_or_else(|| "never".to_string());
        eprintln!("   {}: t0 {}", point.entity, t0);
    }
    write_json(&view, output)
}

fn cmd_map(
    input: &Path,
    config: &Config,
    options: &MapOptions,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = load(input, config)?;
    let snapshot = MapSnapshot::build(&dataset, options);

    let summary = &snapshot.summary;
    eprintln!("\n🗺️  {}", snapshot.date.format("%B %-d"));
    eprintln!(
        "   Cases:  {} ({})  per mio capita: {}",
        summary.cases.label,
        format_variance(summary.cases.day_over_day_variance.value()),
        summary
            .cases
            .rate
            .value()
            .map(human_format)
            .unwrap_or_else(|| "-".to_string())
    );
    eprintln!(
        "   Deaths: {} ({})  as % cases: {}",
        summary.deaths.label,
        format_variance(summary.deaths.day_over_day_variance.value()),
        summary
            .deaths
            .rate
            .value()
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "-".to_string())
    );
    write_json(&snapshot, output)
}

fn format_variance(variance: Option<f64>) -> String {
    variance
        .map(|v| format!("{:+.0}%", v * 100.0))
        .unwrap_or_else(|| "-".to_string())
}

fn write_json<T: Serialize>(
    value: &T,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    write_output(&json, output)
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
