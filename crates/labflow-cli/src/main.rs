use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use labflow_core::config::DEFAULT_ACCESSION_ATTEMPTS;
use labflow_core::{
    Database, DeviceReconciler, LabConfig, NewDeviceReading, ReportAggregator, RequestManager,
    UnmatchedReadingPolicy,
};

#[derive(Parser)]
#[command(name = "labflow")]
#[command(about = "Laboratory result store: device sync, status and reports")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "LABFLOW_DB", default_value = "labflow.db")]
    db: PathBuf,

    /// What sync does with readings that match no open request (retain | drop)
    #[arg(long, env = "LABFLOW_UNMATCHED_READINGS", default_value = "retain")]
    unmatched_readings: String,

    /// Attempts at finding an unused accession code
    #[arg(long, env = "LABFLOW_ACCESSION_ATTEMPTS", default_value_t = DEFAULT_ACCESSION_ATTEMPTS)]
    accession_attempts: u32,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply the schema
    Init,
    /// Reconcile pending device readings into results
    Sync {
        /// Recorded as the writer of device results
        #[arg(long)]
        actor: Option<String>,
    },
    /// Append device readings from a JSON Lines file
    Ingest {
        /// One `{instrument, accession_code, test_code, value, recorded_at}` object per line
        file: PathBuf,
        /// Run a sync once the file is loaded
        #[arg(long)]
        sync: bool,
    },
    /// Show a request's status, progress and results
    Status {
        request_id: String,
    },
    /// Print a patient's report
    Report {
        accession_code: String,
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
        /// Track the report as printed by this user
        #[arg(long)]
        printed_by: Option<String>,
    },
    /// Lab-wide totals
    Stats {
        /// Number of most requested tests to list
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Csv,
}

/// One line of an ingest file.
#[derive(Debug, Deserialize)]
struct IngestRecord {
    instrument: String,
    accession_code: String,
    test_code: String,
    value: f64,
    recorded_at: Option<DateTime<Utc>>,
}

impl From<IngestRecord> for NewDeviceReading {
    fn from(record: IngestRecord) -> Self {
        NewDeviceReading::new(
            record.instrument,
            record.accession_code,
            record.test_code,
            record.value,
            record.recorded_at.unwrap_or_else(Utc::now),
        )
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labflow=info,labflow_core=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'labflow --help' for commands");
        return Ok(());
    };

    let policy: UnmatchedReadingPolicy = cli.unmatched_readings.parse()?;
    let config = LabConfig::new(cli.db, policy, cli.accession_attempts)?;
    let db = Database::open(config.database_path())
        .with_context(|| format!("opening {}", config.database_path().display()))?;

    match command {
        Commands::Init => {
            println!("Database ready at {}", config.database_path().display());
        }
        Commands::Sync { actor } => {
            let summary = DeviceReconciler::new(&db, config.unmatched_reading_policy())
                .reconcile(actor.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Ingest { file, sync } => {
            let appended = ingest_file(&db, &file)?;
            println!("Appended {} readings from {}", appended, file.display());
            if sync {
                let summary = DeviceReconciler::new(&db, config.unmatched_reading_policy())
                    .reconcile(None)?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
        Commands::Status { request_id } => print_status(&db, &request_id)?,
        Commands::Report {
            accession_code,
            format,
            printed_by,
        } => {
            let aggregator = ReportAggregator::new(&db);
            let report = aggregator.patient_report(&accession_code)?;
            match format {
                ReportFormat::Json => println!("{}", report.to_json()?),
                ReportFormat::Csv => print!("{}", report.to_csv()),
            }
            if let Some(user) = printed_by {
                let kind = match format {
                    ReportFormat::Json => "patient_report_json",
                    ReportFormat::Csv => "patient_report_csv",
                };
                let printed =
                    aggregator.record_printed_report(&accession_code, Some(&user), kind, "")?;
                tracing::info!(report_id = %printed.report_id, "Report tracked");
            }
        }
        Commands::Stats { limit } => {
            let stats = ReportAggregator::new(&db).lab_stats(limit)?;
            println!("{}", stats.to_json()?);
        }
    }

    Ok(())
}

fn ingest_file(db: &Database, path: &Path) -> anyhow::Result<usize> {
    let file = File::open(path).with_context(|| format!("reading {}", path.display()))?;
    ingest_lines(db, BufReader::new(file))
}

/// Append every record in a JSON Lines stream. Blank lines are skipped; the first
/// malformed line aborts the load without appending anything.
fn ingest_lines<R: BufRead>(db: &Database, reader: R) -> anyhow::Result<usize> {
    let mut readings = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: IngestRecord = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid reading", index + 1))?;
        if !record.value.is_finite() {
            bail!("line {}: value must be finite", index + 1);
        }
        readings.push(NewDeviceReading::from(record));
    }

    let tx = db.begin()?;
    for reading in &readings {
        db.append_device_reading(reading)?;
    }
    tx.commit()?;
    Ok(readings.len())
}

fn print_status(db: &Database, request_id: &str) -> anyhow::Result<()> {
    let manager = RequestManager::new(db);
    let request = manager.get_request(request_id)?;
    let progress = manager.progress(request_id)?;

    println!("Request:  {}", request.request_id);
    println!("Patient:  {}", request.accession_code);
    println!("Status:   {}", request.status.as_str());
    println!(
        "Progress: {}/{} ({:.1}%)",
        progress.total_entered,
        progress.total_required,
        progress.percentage()
    );
    if !request.panel_codes.is_empty() {
        println!("Panels:   {}", request.panel_codes.join(", "));
    }

    for result in db.list_results_for_request(request_id)? {
        println!(
            "  {:<10} {:<12} {}",
            result.test_code,
            result.value,
            result.status.as_str()
        );
    }
    Ok(())
}
