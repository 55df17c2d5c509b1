//! Synheart Group Sync CLI
//!
//! Replays recorded sensor updates through the synchrony engine and manages
//! the exported session records.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synheart_group_sync::{
    config::Config,
    core::{AggregateRecord, SharedEngine, SyncEngine, UpdateReport},
    sink::{read_jsonl_records, JsonlFileSink},
    transparency::create_shared_log_with_persistence,
    transport::{ReplayConfig, ReplaySource},
    VERSION,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "synheart-sync")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Heart-rate group synchrony engine", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded sensor updates through the engine
    Run {
        /// JSON Lines file with one sensor update per line
        #[arg(long, short)]
        input: PathBuf,

        /// Delay between updates in milliseconds
        #[arg(long, default_value = "0")]
        pace_ms: u64,

        /// Override the configured cluster threshold
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Show cumulative processing statistics
    Status,

    /// Export recorded sessions
    Export {
        /// Output directory for the combined export
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Show configuration
    Config {
        /// Write the current (or default) configuration to disk
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            input,
            pace_ms,
            threshold,
        } => cmd_run(&input, pace_ms, threshold),
        Commands::Status => cmd_status(),
        Commands::Export { output, format } => cmd_export(output, &format),
        Commands::Config { save } => cmd_config(save),
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cmd_run(input: &Path, pace_ms: u64, threshold: Option<f64>) -> Result<()> {
    println!("Synheart Group Sync v{VERSION}");
    println!();

    let mut config = Config::load().context("loading configuration")?;
    if let Some(threshold) = threshold {
        config.threshold = threshold;
    }
    config.validate().context("validating configuration")?;
    let tz = config.tz()?;

    if let Err(e) = config.ensure_directories() {
        warn!("Could not create directories: {e}");
    }

    let registry = config.registry();
    println!("Replaying {input:?}");
    println!(
        "  Sensors: {}",
        registry
            .ids()
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Threshold: {}", config.threshold);
    println!("  Buffer capacity: {}", config.buffer_capacity);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let transparency =
        create_shared_log_with_persistence(config.data_path.join("transparency.json"));

    let export_path = config.export_path.join(format!(
        "session_{}.jsonl",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let sink = JsonlFileSink::create(&export_path)
        .with_context(|| format!("opening record file {export_path:?}"))?;

    let engine = SyncEngine::new(registry, config.engine_config())
        .with_sink(Box::new(sink))
        .with_transparency_log(transparency.clone());
    info!(session_id = engine.session_id(), "Engine ready");
    let shared = SharedEngine::new(engine);

    let mut source =
        ReplaySource::new(ReplayConfig::new(input).with_pace(Duration::from_millis(pace_ms)));
    source.start().context("starting replay")?;

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")?;

    let receiver = source.receiver().clone();
    let mut processed = 0usize;

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(update) => match shared.update(&update) {
                Ok(report) => {
                    processed += 1;
                    print_report(&report, &tz);
                }
                Err(e) => warn!("Update rejected: {e}"),
            },
            Err(RecvTimeoutError::Timeout) => {
                if !source.is_running() && receiver.is_empty() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Replay disconnected unexpectedly");
                break;
            }
        }
    }

    println!();
    println!("Stopping replay...");
    source.stop();

    if let Err(e) = transparency.save() {
        warn!("Could not save transparency log: {e}");
    }

    println!("Processed {processed} updates, records written to {export_path:?}");
    println!();
    println!("{}", transparency.summary());
    Ok(())
}

fn print_report(report: &UpdateReport, tz: &Tz) {
    let record = &report.record;
    println!(
        "[{}] {} hr={:.0} score={:.2} soft={} hard={}{}",
        record.timestamp.with_timezone(tz).format("%H:%M:%S"),
        record.trigger_sensor,
        record
            .sensor(&record.trigger_sensor)
            .map(|s| s.last_hr)
            .unwrap_or_default(),
        record.proximity_score,
        record.active_soft_count(),
        record.active_hard_count(),
        if report.has_warnings() {
            format!(" ({} warnings)", report.warnings.len())
        } else {
            String::new()
        }
    );
}

fn cmd_status() -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Synheart Group Sync Status");
    println!("==========================");
    println!();

    println!("Configuration:");
    println!("  Sensors: {}", config.sensors.join(", "));
    println!("  Threshold: {}", config.threshold);
    println!("  Buffer capacity: {}", config.buffer_capacity);
    println!("  Export path: {:?}", config.export_path);
    println!();

    // Load and show transparency stats if available
    let stats_path = config.data_path.join("transparency.json");
    if stats_path.exists() {
        let content = std::fs::read_to_string(&stats_path)
            .with_context(|| format!("reading {stats_path:?}"))?;
        let stats: serde_json::Value =
            serde_json::from_str(&content).context("parsing transparency stats")?;

        println!("Cumulative Statistics:");
        for key in [
            "updates_processed",
            "updates_rejected",
            "ibis_accepted",
            "ibis_rejected",
            "records_emitted",
            "handoff_failures",
        ] {
            if let Some(value) = stats.get(key) {
                println!("  {}: {value}", key.replace('_', " "));
            }
        }
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_export(output: Option<PathBuf>, format: &str) -> Result<()> {
    if format != "json" && format != "jsonl" {
        bail!("unsupported export format '{format}' (expected json or jsonl)");
    }

    let config = Config::load().context("loading configuration")?;
    let export_dir = output.unwrap_or(config.export_path.clone());

    // Find all session files
    let mut session_files: Vec<PathBuf> = std::fs::read_dir(&config.export_path)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().map(|e| e == "jsonl").unwrap_or(false)
                        && p.file_name()
                            .and_then(|n| n.to_str())
                            .map(|n| n.starts_with("session_"))
                            .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    session_files.sort();

    if session_files.is_empty() {
        println!("No session data found in {:?}", config.export_path);
        println!("Run 'synheart-sync run --input <file>' to record a session.");
        return Ok(());
    }

    println!(
        "Found {} session file(s) in {:?}",
        session_files.len(),
        config.export_path
    );

    // Combine all records
    let mut all_records: Vec<AggregateRecord> = Vec::new();
    for file in &session_files {
        match read_jsonl_records(file) {
            Ok(records) => all_records.extend(records),
            Err(e) => warn!("Skipping {file:?}: {e}"),
        }
    }

    println!("Total records: {}", all_records.len());

    std::fs::create_dir_all(&export_dir)
        .with_context(|| format!("creating {export_dir:?}"))?;
    let output_path = export_dir.join(format!(
        "export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        format
    ));

    let content = if format == "jsonl" {
        all_records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .context("serializing records")?
            .join("\n")
    } else {
        serde_json::to_string_pretty(&all_records).context("serializing records")?
    };

    std::fs::write(&output_path, content)
        .with_context(|| format!("writing {output_path:?}"))?;
    println!("Exported to {output_path:?}");
    Ok(())
}

fn cmd_config(save: bool) -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("serializing configuration")?
    );

    if save {
        config.save().context("saving configuration")?;
        println!();
        println!("Saved.");
    }
    Ok(())
}
