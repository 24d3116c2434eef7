use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use trackdash::format::{format_label, format_number};
use trackdash::views::{CategoryView, MetricView, Tabs};
use trackdash::{AverageMetrics, Category, Dashboard, PopularityBin, TableStore};

#[derive(Parser)]
#[command(name = "trackdash", version, about = "Music track popularity dashboard")]
struct Cli {
    /// Prepared per-track table (CSV)
    #[arg(long, global = true)]
    tracks: Option<PathBuf>,

    /// Popularity-bin summary table (CSV)
    #[arg(long, global = true)]
    histogram: Option<PathBuf>,

    /// Print view payloads as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the metric, category and popularity-bin tabs
    Tabs,

    /// Show the overall average of every metric
    Averages,

    /// Metric distribution across popularity bins
    Metric {
        /// Metric column (or "count")
        #[arg(default_value = "count")]
        metric: String,
    },

    /// Category breakdown of one popularity bin against the whole dataset
    Category {
        /// general_genre, explicit or time_signature
        category: Category,

        /// 0-25, 25-50, 50-75 or 75-100
        bin: PopularityBin,

        /// Zero-based page of the track table
        #[arg(short, long, default_value = "0")]
        page: usize,
    },

    /// Clean a raw track export into the track and summary tables
    Prepare {
        /// Raw track export (CSV)
        input: PathBuf,

        /// Genre to general-genre map (CSV)
        #[arg(long)]
        genre_map: Option<PathBuf>,

        /// Only write the track table, not the summary
        #[arg(long)]
        skip_summary: bool,
    },

    /// Rebuild the popularity-bin summary table from the track table
    Summarize {
        /// Where to write the summary CSV (defaults to the histogram path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Serve view payloads over HTTP
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = trackdash::config::AppConfig::load();

    // Resolve table paths: CLI > config
    let tracks_path = cli.tracks.unwrap_or_else(|| config.tracks_path.clone());
    let histogram_path = cli.histogram.unwrap_or_else(|| config.histogram_path.clone());

    match cli.command {
        Commands::Tabs => {
            let dashboard = load_dashboard(&tracks_path, &histogram_path, config.page_size)?;
            emit(cli.json, &dashboard.tabs(), print_tabs)?;
        }

        Commands::Averages => {
            let dashboard = load_dashboard(&tracks_path, &histogram_path, config.page_size)?;
            emit(cli.json, dashboard.averages(), print_averages)?;
        }

        Commands::Metric { metric } => {
            let dashboard = load_dashboard(&tracks_path, &histogram_path, config.page_size)?;
            let view = dashboard.metric_view(&metric).context("Metric view failed")?;
            emit(cli.json, &view, print_metric_view)?;
        }

        Commands::Category { category, bin, page } => {
            let dashboard = load_dashboard(&tracks_path, &histogram_path, config.page_size)?;
            let view = dashboard
                .category_view(category, bin, page)
                .context("Category view failed")?;
            emit(cli.json, &view, print_category_view)?;
        }

        Commands::Prepare {
            input,
            genre_map,
            skip_summary,
        } => {
            let genre_map = genre_map.unwrap_or_else(|| config.genre_map_path.clone());
            let prepared = trackdash::prepare::prepare_file(&input, &genre_map, &tracks_path)
                .with_context(|| format!("Failed to prepare {}", input.display()))?;
            println!(
                "Prepared {} tracks into {}",
                prepared.height(),
                tracks_path.display()
            );

            if !skip_summary {
                let mut summary = trackdash::summary::build_summary(&prepared)
                    .context("Summary failed")?;
                trackdash::summary::write_summary(&mut summary, &histogram_path)
                    .with_context(|| format!("Failed to write {}", histogram_path.display()))?;
                println!("Summary written to {}", histogram_path.display());
            }
        }

        Commands::Summarize { output } => {
            let output = output.unwrap_or(histogram_path);
            let tracks = TableStore::load_tracks(&tracks_path)
                .with_context(|| format!("Failed to load {}", tracks_path.display()))?;
            let mut summary = trackdash::summary::build_summary(&tracks)
                .context("Summary failed")?;
            trackdash::summary::write_summary(&mut summary, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "Summary complete: {} bins written to {}",
                summary.height(),
                output.display()
            );
        }

        Commands::Serve { host, port } => {
            let dashboard = load_dashboard(&tracks_path, &histogram_path, config.page_size)?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            trackdash::serve::start(&dashboard, &host, port).context("Server failed")?;
        }
    }

    Ok(())
}

/// Load both tables and build the average table once.
fn load_dashboard(tracks: &Path, histogram: &Path, page_size: usize) -> Result<Dashboard> {
    let store = TableStore::load(tracks, histogram).context("Failed to load dashboard tables")?;
    let dashboard = Dashboard::new(store)
        .context("Failed to compute metric averages")?
        .with_page_size(page_size);
    Ok(dashboard)
}

/// Print a payload as pretty JSON or through its text renderer.
fn emit<T: Serialize>(json: bool, payload: &T, text: fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(payload)?);
    } else {
        text(payload);
    }
    Ok(())
}

fn print_tabs(tabs: &Tabs) {
    println!("Metrics:");
    for m in &tabs.metrics {
        println!("  {:<20} {}", m.id, m.label);
    }
    println!();
    println!("Categories:");
    for c in &tabs.categories {
        println!("  {:<20} {}", c.id, c.label);
    }
    println!();
    println!("Popularity bins: {}", tabs.bins.join(", "));
}

fn print_averages(averages: &AverageMetrics) {
    println!("{:<20} {:>12}", "Metric", "Average");
    println!("{}", "-".repeat(33));
    for (metric, value) in averages.iter() {
        println!("{:<20} {:>12}", format_label(metric), format_number(value));
    }
}

fn print_metric_view(view: &MetricView) {
    println!("{}", view.chart.title);
    println!();
    println!("{:<10} {:>12}", view.chart.x_label, view.chart.y_label);
    println!("{}", "-".repeat(40));

    let max = view
        .chart
        .bars
        .iter()
        .filter_map(|b| b.value)
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    for bar in &view.chart.bars {
        let width = match bar.value {
            Some(v) if max > 0.0 => ((v.abs() / max) * 20.0).round() as usize,
            _ => 0,
        };
        println!("{:<10} {:>12}  {}", bar.label, bar.text, "#".repeat(width));
    }

    println!();
    println!("{}: {}", view.average_title, view.average_text);
    println!("{}", view.most_popular);
    println!("{}", view.least_popular);
}

fn print_category_view(view: &CategoryView) {
    let chart = &view.chart;
    println!("{} (bin {})", chart.title, view.bin);
    println!();
    println!(
        "{:<20} {:>12} {:>12}",
        chart.category_label, chart.left_name, chart.right_name
    );
    println!("{}", "-".repeat(46));
    for row in &chart.rows {
        println!(
            "{:<20} {:>12} {:>12}",
            truncate(&row.value, 20),
            row.left_text,
            row.right_text
        );
    }

    let table = &view.table;
    println!();
    println!(
        "Tracks {}-{} of {} (page {} of {})",
        if table.rows.is_empty() { 0 } else { table.page * table.page_size + 1 },
        table.page * table.page_size + table.rows.len(),
        table.total_rows,
        table.page + 1,
        table.total_pages.max(1),
    );
    println!();

    let header: Vec<String> = table.columns.iter().map(|c| truncate(&c.name, 22)).collect();
    println!("{}", format_row(&header));
    println!("{}", "-".repeat(header.len() * 23));
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(|cell| truncate(cell, 22)).collect();
        println!("{}", format_row(&cells));
    }
}

fn format_row(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| format!("{:<22}", c))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate long cell text on a character boundary.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max - 3).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
