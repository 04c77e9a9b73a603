mod checkpoint;
mod config;
mod crawler;
mod extract;
mod regions;
mod shutdown;
mod steam;
mod table;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::warn;

use crate::config::Config;
use crate::crawler::{CrawlStats, Crawler};
use crate::extract::RegionPrice;
use crate::steam::SteamClient;
use crate::table::GameTable;

#[derive(Parser)]
#[command(
    name = "steamvr_collector",
    about = "Steam VR catalog and regional price collector"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate the full Steam catalog and collect VR titles
    Crawl {
        /// Max candidates to process this run (default: all remaining)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Discard any existing checkpoint and restart from the top
        #[arg(long)]
        fresh: bool,
    },
    /// Collect a row for every app listed in a CSV (AppID, GameName)
    FromList {
        /// Input table path
        input: PathBuf,
        /// Max candidates to process this run (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show output table statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = Config::load()?;

    let (signal, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current entry before saving");
            signal.trigger();
        }
    });

    let result = match cli.command {
        Commands::Crawl { limit, fresh } => {
            let client = SteamClient::new(&cfg, shutdown.clone())?;
            let universe = client.app_list().await?;
            println!("Fetched app list: {} candidates", universe.len());

            let crawler = Crawler::new(&cfg, &client, shutdown);
            let stats = crawler.run_universe(&universe, limit, fresh).await?;
            print_run_summary(&stats, &cfg);
            Ok(())
        }
        Commands::FromList { input, limit } => {
            let universe = table::load_universe(&input)?;
            if universe.is_empty() {
                println!("No candidates in {}", input.display());
                return Ok(());
            }
            println!(
                "Loaded {} candidates from {}",
                universe.len(),
                input.display()
            );

            let client = SteamClient::new(&cfg, shutdown.clone())?;
            let crawler = Crawler::new(&cfg, &client, shutdown);
            let stats = crawler.run_list(&universe, limit).await?;
            print_run_summary(&stats, &cfg);
            Ok(())
        }
        Commands::Stats => {
            let table = GameTable::load(&cfg.output_file)?;
            if table.is_empty() {
                println!("No data yet in {}", cfg.output_file.display());
                return Ok(());
            }

            let vr_supported = table
                .rows()
                .filter(|r| r.vr_supported == Some(true))
                .count();
            let vr_exclusive = table
                .rows()
                .filter(|r| r.vr_exclusive == Some(true))
                .count();
            let free = table
                .rows()
                .filter(|r| matches!(r.prices.get("USD"), Some(RegionPrice::Free)))
                .count();
            let priced = table
                .rows()
                .filter(|r| {
                    r.prices
                        .values()
                        .any(|p| matches!(p, RegionPrice::Listed { .. }))
                })
                .count();
            let sentinel_only = table.rows().filter(|r| r.vr_supported.is_none()).count();

            println!("Rows:          {}", table.len());
            println!("VR supported:  {}", vr_supported);
            println!("VR exclusive:  {}", vr_exclusive);
            println!("Free-to-play:  {}", free);
            println!("Priced:        {}", priced);
            println!("No data:       {}", sentinel_only);
            println!("File:          {}", cfg.output_file.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_run_summary(stats: &CrawlStats, cfg: &Config) {
    let note = if stats.cancelled {
        " (interrupted, progress saved)"
    } else if stats.completed {
        ""
    } else {
        " (limit reached, progress saved)"
    };
    println!(
        "Processed {} candidates: {} new rows, {} skipped, {} without data{}",
        stats.processed, stats.rows_added, stats.skipped, stats.no_data, note
    );
    println!("Output: {}", cfg.output_file.display());
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
