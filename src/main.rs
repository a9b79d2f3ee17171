mod chart;
mod config;
mod error;
mod export;
mod models;
mod notifier;
mod pipeline;
mod policy;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::chart::ChartRenderer;
use crate::config::AppConfig;
use crate::notifier::{LogNotifier, Notifier, TelegramNotifier};
use crate::pipeline::Pipeline;
use crate::scraper::GoldPageScraper;
use crate::storage::{HistoryStore, StateStore};

#[derive(Parser)]
#[command(name = "gold-watch", about = "Gold price watcher with Telegram alerts", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the price page once and notify if due (cron entry point)
    Run {
        /// Log messages and write the chart locally instead of sending;
        /// history and state files are left untouched
        #[arg(long)]
        dry_run: bool,

        /// Where the dry-run chart is written
        #[arg(long, default_value = "chart.png")]
        chart_out: PathBuf,
    },

    /// Show history and state summary
    Stats,

    /// Render the recent history window to a PNG file
    Chart {
        #[arg(short, long, default_value = "chart.png")]
        out: PathBuf,

        /// Number of trailing records (default: chart.window)
        #[arg(short, long)]
        window: Option<usize>,
    },

    /// Export the full history as CSV
    ExportCsv {
        #[arg(short, long, default_value = "history.csv")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "gold_watch=info,warn",
        1 => "gold_watch=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    if let Err(e) = run(cli.command).await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    let config = AppConfig::load()?;

    match command {
        Command::Run { dry_run, chart_out } => {
            let _t = utils::Timer::start("Price poll");
            let tz = config.policy.tz()?;
            let source = GoldPageScraper::new(&config.scraper).context("Failed to build scraper")?;
            let notifier: Box<dyn Notifier> = if dry_run {
                Box::new(LogNotifier::new(chart_out))
            } else {
                Box::new(TelegramNotifier::new(&config.telegram)?)
            };

            let report = Pipeline::new(&config, Box::new(source), notifier)
                .with_persistence(!dry_run)
                .run(Utc::now().with_timezone(&tz))
                .await?;
            info!(
                "Done: {} | {} records | chart sent: {}",
                report.kind, report.history_len, report.chart_sent
            );
        }

        Command::Stats => {
            let history = HistoryStore::open(&config.storage.history_path);
            let state = StateStore::new(&config.storage.state_path).load();
            let records = history.records();
            let dash = || "—".to_string();
            println!("─────────────────────────────────");
            println!("  Gold Watch — Stats");
            println!("─────────────────────────────────");
            println!("  Records  : {}", utils::group_digits(records.len() as i64, utils::VI_THOUSANDS));
            println!("  From     : {}", records.first().map(|r| r.timestamp_local.clone()).unwrap_or_else(dash));
            println!("  To       : {}", records.last().map(|r| r.timestamp_local.clone()).unwrap_or_else(dash));
            println!("  Buy      : {}", state.last_buy.unwrap_or_else(dash));
            println!("  Sell     : {}", state.last_sell.unwrap_or_else(dash));
            println!("  Heartbeat: {}", state.last_notified_hour.map(|h| format!("{h:02}:00")).unwrap_or_else(dash));
            println!("─────────────────────────────────");
        }

        Command::Chart { out, window } => {
            let history = HistoryStore::open(&config.storage.history_path);
            let window = history.recent_window(window.unwrap_or(config.chart.window))?;
            let png = ChartRenderer::from_config(&config.chart).render(window)?;
            std::fs::write(&out, &png).with_context(|| format!("Could not write {:?}", out))?;
            println!("{} points → {:?} ({} bytes)", window.len(), out, png.len());
        }

        Command::ExportCsv { out } => {
            let history = HistoryStore::open(&config.storage.history_path);
            if history.is_empty() {
                println!("No history yet — run `gold-watch run` first.");
            } else {
                export::export_csv(history.records(), &out)?;
            }
        }
    }

    Ok(())
}
