use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use visitlytics::analytics::metrics::format_duration;
use visitlytics::analytics::{DistributionEntry, MetricsAggregator, MetricsSourceKind};
use visitlytics::config::Config;
use visitlytics::pagination::{PageRequest, Paginator};
use visitlytics::storage;

#[derive(Parser)]
#[command(name = "visitlytics-admin")]
#[command(about = "Visitlytics admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the visit table and indexes
    Init,
    /// Print dashboard metrics
    Metrics {
        /// Metrics source (rollup, client); defaults to METRICS_SOURCE
        #[arg(long)]
        source: Option<MetricsSourceKind>,
        /// Number of distribution entries to show
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Print one page of the visit log
    Visits {
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long)]
        page_size: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage = storage::connect(&config.database).await?;

    // Ensure database is initialized
    storage.init().await?;

    let offset = config.analytics.reporting_offset();

    match cli.command {
        Commands::Init => {
            println!("✓ Visit store initialized ({} visits)", storage.count().await?);
        }
        Commands::Metrics { source, top } => {
            let kind = source.unwrap_or(config.analytics.metrics_source);
            let aggregator = MetricsAggregator::from_kind(kind, storage, offset);
            let metrics = aggregator.get_metrics(Some(top)).await?;

            println!("Metrics (source: {}, reporting offset {})", metrics.source, offset);
            println!("{}", "-".repeat(60));
            println!("{:<28} {}", "Total visits", metrics.total_visits);
            println!("{:<28} {}", "Unique visitors", metrics.unique_visitors);
            println!(
                "{:<28} {}",
                "Average duration",
                format_duration(metrics.average_duration_seconds)
            );
            println!("{:<28} {}", "Distinct paths", metrics.distinct_paths);

            print_distribution("Devices", &metrics.device_distribution);
            print_distribution("Markets (visitor-days)", &metrics.market_distribution);
        }
        Commands::Visits { page, page_size } => {
            let paginator = Paginator::with_limits(
                storage,
                config.analytics.default_page_size,
                config.analytics.max_page_size,
            );
            let result = paginator
                .get_page(PageRequest {
                    page: Some(page),
                    page_size,
                })
                .await?;

            println!(
                "Page {}/{} ({} visits, {} per page)",
                result.current_page, result.total_pages, result.total_count, result.page_size
            );
            println!(
                "{:<20} {:<24} {:<24} {:<16} {:>8}",
                "Started", "Path", "Visitor", "Platform", "Seconds"
            );
            println!("{}", "-".repeat(96));
            for record in &result.records {
                let visitor = record.user_email.as_deref().unwrap_or("anonymous");
                let seconds = record
                    .visit_end_time
                    .map(|end| format!("{:.1}", (end - record.visit_start_time) as f64 / 1000.0))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<20} {:<24} {:<24} {:<16} {:>8}",
                    format_timestamp(record.visit_start_time, &offset),
                    record.path,
                    visitor,
                    record.device_info.platform_label(),
                    seconds
                );
            }
        }
    }

    Ok(())
}

fn print_distribution(title: &str, entries: &[DistributionEntry]) {
    println!();
    println!("{}", title);
    if entries.is_empty() {
        println!("  (no visits)");
        return;
    }
    for entry in entries {
        println!("  {:<32} {:>8}", entry.name, entry.value);
    }
}

fn format_timestamp(millis: i64, offset: &FixedOffset) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|ts| ts.with_timezone(offset).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
