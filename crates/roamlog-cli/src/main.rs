//! roamlog: command-line media ingest for travel journals.
//!
//! Runs the same pipeline a journal-entry form does: validate the selected
//! files, extract and enrich their metadata, auto-fill the entry's date and
//! location, upload everything into local storage and record the assets.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use roamlog_core::{CandidatePolicy, FileValidator, FormState, SourceFile, ValidatorConfig};
use roamlog_geo::{GeocoderConfig, GeocodingEnricher};
use roamlog_ingest::{IngestSession, MetadataExtractor, UploadConfig, UploadOrchestrator};
use roamlog_storage::{FilesystemStorage, JsonlAssetRepository, StorageConfig};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Exit code when uploads were attempted and none completed.
const EXIT_ALL_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "roamlog")]
#[command(author, version, about = "Media ingest for roamlog travel journals")]
#[command(propagate_version = true)]
struct Cli {
    /// Storage directory for blobs and the asset ledger
    #[arg(long, global = true, env = "ROAMLOG_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Public base URL stored objects are served from
    #[arg(long, global = true, env = "ROAMLOG_PUBLIC_URL")]
    public_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest photos and videos into a trip
    Ingest {
        /// Trip the media belongs to
        #[arg(long)]
        trip: Uuid,

        /// Journal entry the media is attached to
        #[arg(long)]
        entry: Option<Uuid>,

        /// Date already chosen on the entry form (YYYY-MM-DD)
        #[arg(long)]
        form_date: Option<NaiveDate>,

        /// Location already typed on the entry form
        #[arg(long)]
        location: Option<String>,

        /// Skip reverse geocoding of GPS coordinates
        #[arg(long)]
        no_geocode: bool,

        /// Pick the earliest capture among GPS-tagged files for auto-fill
        #[arg(long)]
        earliest: bool,

        /// Files to ingest, in selection order
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },

    /// List recorded media assets for a trip
    Assets {
        #[arg(long)]
        trip: Uuid,
    },

    /// Check that the storage directory is writable
    StorageCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _file_guard = init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing on stderr, keeping stdout for JSON output.
///
/// Environment variables:
///   LOG_FORMAT - "json" or "text" (default: "text")
///   LOG_FILE   - path to log file (optional, daily rotation)
///   RUST_LOG   - standard env filter (default: info for all roamlog crates)
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "roamlog=info,roamlog_core=info,roamlog_geo=info,roamlog_storage=info,roamlog_ingest=info"
            .into()
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("roamlog.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
        None
    };

    tracing::debug!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

fn storage_config(cli: &Cli) -> StorageConfig {
    let mut config = StorageConfig::from_env();
    if let Some(dir) = &cli.storage_dir {
        config = config.with_base_dir(dir);
    }
    if let Some(url) = &cli.public_url {
        config = config.with_public_url(url);
    }
    config
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let storage_config = storage_config(&cli);

    match cli.command {
        Commands::Ingest {
            trip,
            entry,
            form_date,
            location,
            no_geocode,
            earliest,
            files,
        } => {
            let options = IngestOptions {
                trip,
                entry,
                form_date,
                location,
                no_geocode,
                policy: if earliest {
                    CandidatePolicy::EarliestCapture
                } else {
                    CandidatePolicy::FirstInSelection
                },
            };
            cmd_ingest(&storage_config, options, &files).await
        }
        Commands::Assets { trip } => {
            let ledger = JsonlAssetRepository::new(storage_config.ledger_path());
            let assets = ledger.list_for_trip(trip).await?;
            println!("{}", serde_json::to_string_pretty(&assets)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::StorageCheck => {
            let storage = FilesystemStorage::from_config(&storage_config);
            storage
                .validate()
                .await
                .map_err(|e| anyhow::anyhow!("storage check failed: {}", e))?;
            println!("ok: {}", storage.base_path().display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

struct IngestOptions {
    trip: Uuid,
    entry: Option<Uuid>,
    form_date: Option<NaiveDate>,
    location: Option<String>,
    no_geocode: bool,
    policy: CandidatePolicy,
}

async fn cmd_ingest(
    storage_config: &StorageConfig,
    options: IngestOptions,
    paths: &[PathBuf],
) -> anyhow::Result<ExitCode> {
    let mut geocoder_config = GeocoderConfig::from_env();
    if options.no_geocode {
        geocoder_config = geocoder_config.with_enabled(false);
    }
    let geocoder = GeocodingEnricher::from_config(&geocoder_config)
        .context("failed to configure reverse geocoder")?;
    let extractor = MetadataExtractor::new(Arc::new(geocoder));

    let mut form = FormState::new(Utc::now().date_naive());
    if let Some(date) = options.form_date {
        form.set_date_by_user(date);
    }
    if let Some(place) = options.location {
        form.set_location_by_user(Some(place), None);
    }

    let mut session = IngestSession::new(options.trip, form, extractor)
        .with_validator(FileValidator::new(ValidatorConfig::from_env()))
        .with_policy(options.policy);
    if let Some(entry) = options.entry {
        session = session.with_journal_entry(entry);
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_source_file(path).await?);
    }
    let outcome = session.add_files(files).await;

    let storage = Arc::new(FilesystemStorage::from_config(storage_config));
    let ledger = Arc::new(JsonlAssetRepository::new(storage_config.ledger_path()));
    let orchestrator = UploadOrchestrator::new(storage, ledger, UploadConfig::from_env());
    let report = orchestrator.drain(&mut session).await;

    for failed in &report.failed {
        warn!(file = %failed.filename, error = %failed.error, "Not uploaded");
    }

    let form = session.form().clone();
    let summary = session.submit();
    info!(
        trip_id = %options.trip,
        completed = report.completed.len(),
        failed = report.failed.len(),
        rejected = outcome.rejected.len(),
        "Ingest finished"
    );

    let output = json!({
        "trip_id": options.trip,
        "journal_entry_id": options.entry,
        "rejected": outcome.rejected,
        "auto_filled": outcome.proposal.summary(),
        "proposal": outcome.proposal,
        "form": form,
        "report": report,
        "summary": summary,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if report.all_failed() {
        Ok(ExitCode::from(EXIT_ALL_FAILED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Read a file with the attributes a picker would hand over.
async fn read_source_file(path: &Path) -> anyhow::Result<SourceFile> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut file = SourceFile::new(name, data);
    let modified = tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok());
    if let Some(modified) = modified {
        file = file.with_last_modified(DateTime::<Utc>::from(modified));
    }
    Ok(file)
}
