//! Tally CLI - Command-line interface for the offline-first tracker
//!
//! Every write lands in the local database immediately; `tally sync` pushes
//! it to the configured remote when you are ready.

use std::env;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use serde::Serialize;
use tally_core::auth::{OwnerResolver, StaticOwner};
use tally_core::db::{Database, LocalStore, OutboxQueue, SyncOperation};
use tally_core::migration::{JsonFileLegacySource, MigrationAdapter};
use tally_core::models::{
    Activity, ActivityCategory, Intake, IntakeKind, IntakeLog, IntakeUnit, NoteLog, ReadingLog,
    ReadingObject, SessionLog, TrackerEntry,
};
use tally_core::remote::{RestConfig, RestRemoteStore};
use tally_core::services::TrackerService;
use tally_core::sync::{BackgroundSync, StatusPublisher, SyncEngine};
use tally_core::{EntityKind, EntityRecord};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Track activities, intakes, and reading from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Quick capture: tally "my note here"
    #[arg(trailing_var_arg = true)]
    note: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a catalog entry
    #[command(subcommand)]
    Add(AddCommands),
    /// Record a log entry
    #[command(subcommand)]
    Log(LogCommands),
    /// List records of one collection
    List {
        /// Collection to list
        #[arg(value_enum)]
        collection: Collection,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a record (dependent logs are deleted with it)
    Delete {
        /// Collection the record belongs to
        #[arg(value_enum)]
        collection: Collection,
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Push local changes to the remote and retry pending operations
    Sync {
        /// Replace local data with the remote copy instead
        #[arg(long)]
        pull: bool,
        /// Only replay queued operations
        #[arg(long, conflicts_with = "pull")]
        drain: bool,
        /// Keep running and sync periodically
        #[arg(long, conflicts_with_all = ["pull", "drain"])]
        watch: bool,
        /// Seconds between background sync passes
        #[arg(long, value_name = "SECONDS", default_value_t = 30, requires = "watch")]
        interval: u64,
    },
    /// Show store counts and pending operations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Also compare record counts against the remote
        #[arg(long)]
        remote: bool,
    },
    /// Import data from a legacy JSON export
    Migrate {
        /// Path to the legacy JSON file
        #[arg(long, value_name = "PATH")]
        legacy_file: PathBuf,
        /// Only report whether a migration would run
        #[arg(long)]
        check: bool,
        /// Import even when the local store is not empty
        #[arg(long, conflicts_with = "check")]
        force: bool,
    },
    /// Write every collection to one JSON document
    Export {
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AddCommands {
    /// Add an activity to the catalog
    Activity {
        /// Activity name
        name: String,
        /// Category: work, health, learning, leisure, chores, social, other
        #[arg(long)]
        category: ActivityCategory,
        /// Optional sub-activity
        #[arg(long)]
        sub: Option<String>,
        /// Optional sub-sub-activity
        #[arg(long)]
        sub_sub: Option<String>,
        /// Free-form description
        #[arg(long)]
        info: Option<String>,
    },
    /// Add an intake to the catalog
    Intake {
        /// Intake name
        name: String,
        /// Kind: food, drink, supplement, medication, other
        #[arg(long)]
        kind: IntakeKind,
        /// Default quantity for quick logging
        #[arg(long)]
        quantity: f64,
        /// Default unit: mg, g, ml, l, piece, cup, serving
        #[arg(long)]
        unit: IntakeUnit,
        /// Free-form description
        #[arg(long)]
        info: Option<String>,
    },
    /// Add a book or other reading object
    Reading {
        /// Book name
        book: String,
        /// Author name
        #[arg(long)]
        author: String,
        /// Publication year
        #[arg(long)]
        year: Option<i32>,
        /// Free-form description
        #[arg(long)]
        info: Option<String>,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Record a timed activity session
    Session {
        /// Activity ID or unique ID prefix
        activity: String,
        /// Start time, RFC 3339 (e.g. 2026-08-23T07:30:00Z)
        #[arg(long)]
        start: DateTime<Utc>,
        /// End time, RFC 3339
        #[arg(long)]
        end: DateTime<Utc>,
        /// Attach a note (repeatable)
        #[arg(long = "note")]
        notes: Vec<String>,
        /// Tracker reading as NAME=VALUE (repeatable)
        #[arg(long = "tracker", value_name = "NAME=VALUE")]
        trackers: Vec<String>,
    },
    /// Record an intake, defaulting quantity and unit from the catalog
    Intake {
        /// Intake ID or unique ID prefix
        intake: String,
        /// Quantity consumed
        #[arg(long)]
        quantity: Option<f64>,
        /// Unit: mg, g, ml, l, piece, cup, serving
        #[arg(long)]
        unit: Option<IntakeUnit>,
        /// Time of intake, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Record a reading session
    Reading {
        /// Reading object ID or unique ID prefix
        reading: String,
        /// Start time, RFC 3339
        #[arg(long)]
        start: DateTime<Utc>,
        /// End time, RFC 3339
        #[arg(long)]
        end: DateTime<Utc>,
        /// Attach a note (repeatable)
        #[arg(long = "note")]
        notes: Vec<String>,
        /// Tracker reading as NAME=VALUE (repeatable)
        #[arg(long = "tracker", value_name = "NAME=VALUE")]
        trackers: Vec<String>,
    },
    /// Capture a note
    Note {
        /// Note content
        content: Vec<String>,
        /// Optional title
        #[arg(long)]
        title: Option<String>,
        /// Link to an activity by ID or prefix (repeatable)
        #[arg(long = "activity")]
        activities: Vec<String>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Record not found for id/prefix: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Tracker entries use NAME=VALUE, got '{0}'")]
    InvalidTracker(String),
    #[error("No owner configured. Set TALLY_OWNER to your user id to enable storage and sync.")]
    OwnerNotConfigured,
    #[error(
        "Sync is not configured. Set TALLY_REMOTE_URL and TALLY_REMOTE_KEY to enable `tally sync`."
    )]
    SyncNotConfigured,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum Collection {
    Activities,
    Intakes,
    Readings,
    Sessions,
    IntakeLogs,
    ReadingLogs,
    Notes,
}

impl Collection {
    const fn kind(self) -> EntityKind {
        match self {
            Self::Activities => EntityKind::Activity,
            Self::Intakes => EntityKind::Intake,
            Self::Readings => EntityKind::ReadingObject,
            Self::Sessions => EntityKind::SessionLog,
            Self::IntakeLogs => EntityKind::IntakeLog,
            Self::ReadingLogs => EntityKind::ReadingLog,
            Self::Notes => EntityKind::NoteLog,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tally=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add(add)) => run_add(add, &db_path).await?,
        Some(Commands::Log(log)) => run_log(log, &db_path).await?,
        Some(Commands::List { collection, json }) => run_list(collection, json, &db_path).await?,
        Some(Commands::Delete { collection, id }) => {
            run_delete(collection, &id, &db_path).await?;
        }
        Some(Commands::Sync {
            pull,
            drain,
            watch,
            interval,
        }) => {
            if watch {
                run_sync_watch(Duration::from_secs(interval), &db_path).await?;
            } else {
                run_sync(pull, drain, &db_path).await?;
            }
        }
        Some(Commands::Status { json, remote }) => run_status(json, remote, &db_path).await?,
        Some(Commands::Migrate {
            legacy_file,
            check,
            force,
        }) => run_migrate(&legacy_file, check, force, &db_path).await?,
        Some(Commands::Export { output }) => run_export(output.as_deref(), &db_path).await?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            // Quick capture mode: tally "remember to stretch"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                let app = open_app(&db_path).await?;
                let content = resolve_note_content(&cli.note)?;
                let record = app.service.add_record(NoteLog::new(content)).await?;
                println!("{}", record.entity_id());
            }
        }
    }

    Ok(())
}

/// Everything a command needs, short of a remote connection.
struct App {
    service: TrackerService,
    store: LocalStore,
    outbox: OutboxQueue,
    owner: Arc<dyn OwnerResolver>,
}

async fn open_app(db_path: &Path) -> Result<App, CliError> {
    let owner = resolve_owner()?;
    open_app_with(db_path, owner).await
}

async fn open_app_with(db_path: &Path, owner: StaticOwner) -> Result<App, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::open(db_path).await?.into_shared();
    let owner: Arc<dyn OwnerResolver> = Arc::new(owner);
    let store = LocalStore::new(Arc::clone(&db), Arc::clone(&owner));
    let outbox = OutboxQueue::new(db);
    let service = TrackerService::new(store.clone(), outbox.clone(), StatusPublisher::new());

    Ok(App {
        service,
        store,
        outbox,
        owner,
    })
}

fn resolve_owner() -> Result<StaticOwner, CliError> {
    match env::var("TALLY_OWNER") {
        Ok(id) if !id.trim().is_empty() => Ok(StaticOwner::new(id.trim())),
        _ => Err(CliError::OwnerNotConfigured),
    }
}

fn remote_from_env() -> Result<Option<RestRemoteStore>, CliError> {
    let url = env::var("TALLY_REMOTE_URL").unwrap_or_default();
    let api_key = env::var("TALLY_REMOTE_KEY").unwrap_or_default();
    if url.is_empty() || api_key.is_empty() {
        return Ok(None);
    }

    let access_token = env::var("TALLY_REMOTE_TOKEN").ok().filter(|t| !t.is_empty());
    let remote = RestRemoteStore::new(RestConfig {
        base_url: url,
        api_key,
        access_token,
    })?;
    Ok(Some(remote))
}

fn build_engine(app: &App) -> Result<SyncEngine, CliError> {
    let remote = remote_from_env()?.ok_or(CliError::SyncNotConfigured)?;
    tracing::info!("Sync enabled with the remote API");
    Ok(SyncEngine::new(
        app.store.clone(),
        app.outbox.clone(),
        Arc::new(remote),
        Arc::clone(&app.owner),
    ))
}

async fn run_add(command: AddCommands, db_path: &Path) -> Result<(), CliError> {
    let app = open_app(db_path).await?;

    let record = match command {
        AddCommands::Activity {
            name,
            category,
            sub,
            sub_sub,
            info,
        } => {
            let mut activity = Activity::new(name, category);
            activity.sub_activity = sub;
            activity.sub_sub_activity = sub_sub;
            activity.info = info;
            app.service.add_record(activity).await?
        }
        AddCommands::Intake {
            name,
            kind,
            quantity,
            unit,
            info,
        } => {
            let mut intake = Intake::new(name, kind, quantity, unit);
            intake.info = info;
            app.service.add_record(intake).await?
        }
        AddCommands::Reading {
            book,
            author,
            year,
            info,
        } => {
            let mut reading = ReadingObject::new(book, author);
            reading.year = year;
            reading.info = info;
            app.service.add_record(reading).await?
        }
    };

    println!("{}", record.entity_id());
    Ok(())
}

async fn run_log(command: LogCommands, db_path: &Path) -> Result<(), CliError> {
    let app = open_app(db_path).await?;

    let record = match command {
        LogCommands::Session {
            activity,
            start,
            end,
            notes,
            trackers,
        } => {
            let activity_id = resolve_record_id(&app.store, EntityKind::Activity, &activity).await?;
            let mut log = SessionLog::new(activity_id, start, end);
            log.notes = notes;
            log.tracker_entries = parse_tracker_entries(&trackers)?;
            app.service.add_record(log).await?
        }
        LogCommands::Intake {
            intake,
            quantity,
            unit,
            at,
        } => {
            let intake_id = resolve_record_id(&app.store, EntityKind::Intake, &intake).await?;
            let catalog = app.service.list_intakes().await?;
            let entry = catalog
                .iter()
                .find(|i| i.id == intake_id)
                .ok_or_else(|| CliError::RecordNotFound(intake_id.clone()))?;

            let mut log = IntakeLog::new(
                &entry.id,
                quantity.unwrap_or(entry.default_quantity),
                unit.unwrap_or(entry.default_unit),
            );
            if let Some(at) = at {
                log = log.at(at);
            }
            app.service.add_record(log).await?
        }
        LogCommands::Reading {
            reading,
            start,
            end,
            notes,
            trackers,
        } => {
            let reading_id =
                resolve_record_id(&app.store, EntityKind::ReadingObject, &reading).await?;
            let mut log = ReadingLog::new(reading_id, start, end);
            log.notes = notes;
            log.tracker_entries = parse_tracker_entries(&trackers)?;
            app.service.add_record(log).await?
        }
        LogCommands::Note {
            content,
            title,
            activities,
        } => {
            let content = resolve_note_content(&content)?;
            let mut note = NoteLog::new(content);
            note.title = title;
            for query in &activities {
                let activity_id =
                    resolve_record_id(&app.store, EntityKind::Activity, query).await?;
                note.related_activity_ids.push(activity_id);
            }
            app.service.add_record(note).await?
        }
    };

    println!("{}", record.entity_id());
    Ok(())
}

async fn run_list(collection: Collection, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let app = open_app(db_path).await?;
    let records = app.store.list(collection.kind()).await?;

    if as_json {
        let payloads = records
            .iter()
            .map(EntityRecord::to_payload)
            .collect::<tally_core::Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&payloads)?);
    } else {
        let now = Utc::now();
        for record in &records {
            println!("{}", format_record_line(record, now));
        }
    }

    Ok(())
}

async fn run_delete(collection: Collection, id: &str, db_path: &Path) -> Result<(), CliError> {
    let app = open_app(db_path).await?;
    let kind = collection.kind();
    let resolved = resolve_record_id(&app.store, kind, id).await?;

    app.service.delete_record(kind, &resolved).await?;
    println!("{resolved}");
    Ok(())
}

async fn run_sync(pull: bool, drain: bool, db_path: &Path) -> Result<(), CliError> {
    let app = open_app(db_path).await?;
    let engine = build_engine(&app)?;

    if pull {
        match engine.sync_from_cloud().await? {
            Some(report) => println!(
                "Pulled {} record(s), skipped {} with pending deletes",
                report.applied, report.skipped
            ),
            None => println!("Another sync is already running"),
        }
        return Ok(());
    }

    if drain {
        match engine.drain_outbox().await? {
            Some(report) => println!(
                "Outbox: {} resolved, {} retried, {} dropped",
                report.resolved, report.retried, report.dropped
            ),
            None => println!("Another sync is already running"),
        }
        return Ok(());
    }

    match engine.manual_sync().await? {
        Some(report) => {
            println!(
                "Pushed {} record(s), {} failed",
                report.push.pushed, report.push.failed
            );
            println!(
                "Outbox: {} resolved, {} retried, {} dropped",
                report.drain.resolved, report.drain.retried, report.drain.dropped
            );
        }
        None => println!("Another sync is already running"),
    }
    Ok(())
}

async fn run_sync_watch(interval: Duration, db_path: &Path) -> Result<(), CliError> {
    let app = open_app(db_path).await?;
    let engine = Arc::new(build_engine(&app)?);

    // Coming online runs one pass right away; the timer takes over after.
    engine.set_online(true).await;

    let scheduler = BackgroundSync::with_interval(Arc::clone(&engine), interval);
    scheduler.start();
    println!(
        "Syncing every {}s. Press Ctrl-C to stop.",
        interval.as_secs()
    );

    tokio::signal::ctrl_c().await?;
    scheduler.stop();
    println!("Stopped");
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    owner: String,
    total_records: u64,
    counts: Vec<CollectionCount>,
    pending_operations: Vec<SyncOperation>,
}

#[derive(Debug, Serialize)]
struct CollectionCount {
    collection: String,
    count: u64,
}

async fn run_status(as_json: bool, with_remote: bool, db_path: &Path) -> Result<(), CliError> {
    let app = open_app(db_path).await?;
    let report = build_status_report(&app).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Owner:   {}", report.owner);
        println!("Records: {}", report.total_records);
        for entry in &report.counts {
            println!("  {:<16} {}", entry.collection, entry.count);
        }
        println!("Pending operations: {}", report.pending_operations.len());
        let now = Utc::now();
        for op in &report.pending_operations {
            println!(
                "  {:<13}  {:<6}  {:<14}  {:<13}  {}/{} retries  {}",
                short_id(&op.id),
                op.kind.to_string(),
                op.entity_kind.to_string(),
                short_id(&op.entity_id),
                op.retry_count,
                op.max_retries,
                format_relative_time(op.enqueued_at, now),
            );
        }
    }

    if with_remote {
        let engine = build_engine(&app)?;
        if engine.check_sync_needed().await? {
            println!("Remote: record counts differ, sync needed");
        } else {
            println!("Remote: record counts match");
        }
    }

    Ok(())
}

async fn build_status_report(app: &App) -> Result<StatusReport, CliError> {
    let owner = app
        .owner
        .current_owner()
        .ok_or(CliError::OwnerNotConfigured)?;

    let mut counts = Vec::new();
    for kind in EntityKind::ALL {
        counts.push(CollectionCount {
            collection: kind.table_name().to_string(),
            count: app.store.count(kind).await?,
        });
    }

    Ok(StatusReport {
        owner: owner.to_string(),
        total_records: app.store.size().await?,
        counts,
        pending_operations: app.outbox.list_pending().await?,
    })
}

async fn run_migrate(
    legacy_file: &Path,
    check: bool,
    force: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let app = open_app(db_path).await?;
    let adapter = MigrationAdapter::new(
        app.store.clone(),
        Arc::new(JsonFileLegacySource::new(legacy_file)),
    );

    let status = adapter.check_status().await?;
    if check {
        println!(
            "Legacy records: {}, store records: {}",
            status.legacy_count, status.store_count
        );
        println!(
            "Migration {}",
            if status.needs_migration {
                "needed"
            } else {
                "not needed"
            }
        );
        return Ok(());
    }

    if !status.needs_migration && !force {
        println!(
            "Nothing to migrate (legacy: {}, store: {}). Use --force to import anyway.",
            status.legacy_count, status.store_count
        );
        return Ok(());
    }

    let result = adapter.migrate().await?;
    for (kind, count) in &result.counts {
        if *count > 0 {
            println!("  {:<16} {} imported", kind.table_name(), count);
        }
    }
    for (kind, message) in &result.errors {
        eprintln!("  {:<16} failed: {}", kind.table_name(), message);
    }

    println!("Imported {} record(s)", result.total_imported());
    result.into_result()?;
    Ok(())
}

async fn run_export(output_path: Option<&Path>, db_path: &Path) -> Result<(), CliError> {
    let app = open_app(db_path).await?;
    let dump = export_dump(&app).await?;
    let rendered = serde_json::to_string_pretty(&dump)?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

/// All seven collections as one JSON object keyed by collection name.
async fn export_dump(app: &App) -> Result<serde_json::Value, CliError> {
    let mut dump = serde_json::Map::new();
    for kind in EntityKind::ALL {
        let payloads = app
            .store
            .list(kind)
            .await?
            .iter()
            .map(EntityRecord::to_payload)
            .collect::<tally_core::Result<Vec<_>>>()?;
        let key = kind.table_name().to_string();
        dump.insert(key, serde_json::Value::Array(payloads));
    }
    Ok(serde_json::Value::Object(dump))
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "tally", buffer);
}

/// Resolve an exact id or a unique id prefix within one collection.
async fn resolve_record_id(
    store: &LocalStore,
    kind: EntityKind,
    query: &str,
) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyRecordId);
    }

    let records = store.list(kind).await?;
    if records.iter().any(|record| record.entity_id() == trimmed) {
        return Ok(trimmed.to_string());
    }

    let matches: Vec<&str> = records
        .iter()
        .map(EntityRecord::entity_id)
        .filter(|id| id.starts_with(trimmed))
        .collect();

    match matches.len() {
        0 => Err(CliError::RecordNotFound(trimmed.to_string())),
        1 => Ok(matches[0].to_string()),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{trimmed}' is ambiguous; matches: {options}"
            )))
        }
    }
}

fn format_record_line(record: &EntityRecord, now: DateTime<Utc>) -> String {
    match record {
        EntityRecord::Activity(a) => {
            let name = preview(&a.name, 32);
            format!("{:<13}  {name:<32}  {}", short_id(&a.id), a.category)
        }
        EntityRecord::Intake(i) => {
            let name = preview(&i.name, 32);
            format!(
                "{:<13}  {name:<32}  {} ({} {})",
                short_id(&i.id),
                i.kind,
                i.default_quantity,
                i.default_unit
            )
        }
        EntityRecord::ReadingObject(r) => {
            let title = preview(&r.book_name, 32);
            format!("{:<13}  {title:<32}  {}", short_id(&r.id), r.author)
        }
        EntityRecord::SessionLog(s) => format!(
            "{:<13}  {:<13}  {} -> {}  {}",
            short_id(&s.id),
            short_id(&s.activity_id),
            s.time_start.format("%Y-%m-%d %H:%M"),
            s.time_end.format("%H:%M"),
            format_relative_time(s.time_end, now)
        ),
        EntityRecord::IntakeLog(i) => format!(
            "{:<13}  {:<13}  {} {}  {}",
            short_id(&i.id),
            short_id(&i.intake_id),
            i.quantity,
            i.unit,
            format_relative_time(i.timestamp, now)
        ),
        EntityRecord::ReadingLog(r) => format!(
            "{:<13}  {:<13}  {} -> {}  {}",
            short_id(&r.id),
            short_id(&r.reading_id),
            r.time_start.format("%Y-%m-%d %H:%M"),
            r.time_end.format("%H:%M"),
            format_relative_time(r.time_end, now)
        ),
        EntityRecord::NoteLog(n) => {
            let text = n.title.as_deref().unwrap_or(&n.content);
            format!(
                "{:<13}  {:<40}  {}",
                short_id(&n.id),
                preview(text, 40),
                format_relative_time(n.timestamp, now)
            )
        }
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(then).num_milliseconds().max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn parse_tracker_entries(raw: &[String]) -> Result<Vec<TrackerEntry>, CliError> {
    raw.iter().map(|entry| parse_tracker_entry(entry)).collect()
}

fn parse_tracker_entry(raw: &str) -> Result<TrackerEntry, CliError> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(CliError::InvalidTracker(raw.to_string()));
    };
    let name = name.trim();
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidTracker(raw.to_string()))?;
    if name.is_empty() {
        return Err(CliError::InvalidTracker(raw.to_string()));
    }
    Ok(TrackerEntry::new(name, value))
}

fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TALLY_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("tally.db")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use chrono::{Duration, TimeZone, Utc};
    use tally_core::auth::StaticOwner;
    use tally_core::db::OperationKind;
    use tally_core::models::{Activity, ActivityCategory, SessionLog};
    use tally_core::EntityKind;

    use super::{
        build_status_report, export_dump, format_relative_time, normalize_content, open_app_with,
        parse_tracker_entry, preview, resolve_record_id, run_completions, short_id, CliError,
        Collection, CompletionShell,
    };

    #[test]
    fn normalize_content_trims_and_rejects_empty() {
        assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
        assert_eq!(normalize_content(" \n\t "), None);
    }

    #[test]
    fn preview_truncates_with_ellipsis() {
        let text = "This is a very long sentence that should be shortened";
        assert_eq!(preview(text, 20), "This is a very lo...");
        assert_eq!(preview("short", 20), "short");
        assert_eq!(preview("line 1\nline 2", 20), "line 1");
    }

    #[test]
    fn short_id_takes_thirteen_chars() {
        assert_eq!(short_id("0192abcd-1234-7000-8000-ffffffffffff"), "0192abcd-1234");
        assert_eq!(short_id("tiny"), "tiny");
    }

    #[test]
    fn format_relative_time_units() {
        let now = Utc.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
        assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
        assert_eq!(format_relative_time(now - Duration::days(3), now), "3d ago");
        assert_eq!(format_relative_time(now + Duration::minutes(5), now), "just now");
    }

    #[test]
    fn parse_tracker_entry_accepts_name_value_pairs() {
        let entry = parse_tracker_entry("mood=7.5").unwrap();
        assert_eq!(entry.tracker, "mood");
        assert!((entry.value - 7.5).abs() < f64::EPSILON);

        assert!(matches!(
            parse_tracker_entry("mood"),
            Err(CliError::InvalidTracker(_))
        ));
        assert!(matches!(
            parse_tracker_entry("mood=high"),
            Err(CliError::InvalidTracker(_))
        ));
        assert!(matches!(
            parse_tracker_entry("=7"),
            Err(CliError::InvalidTracker(_))
        ));
    }

    #[test]
    fn collections_cover_all_entity_kinds() {
        let mapped = [
            Collection::Activities,
            Collection::Intakes,
            Collection::Readings,
            Collection::Sessions,
            Collection::IntakeLogs,
            Collection::ReadingLogs,
            Collection::Notes,
        ]
        .map(Collection::kind);
        assert_eq!(mapped, EntityKind::ALL);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_record_id_supports_exact_and_prefix() {
        let db_path = unique_test_db_path();
        let app = open_app_with(&db_path, StaticOwner::new("cli-test"))
            .await
            .unwrap();

        let mut left = Activity::new("Left", ActivityCategory::Other);
        left.id = "11111111-1111-7111-8111-111111111111".to_string();
        let mut right = Activity::new("Right", ActivityCategory::Other);
        right.id = "11111111-1111-7111-8111-222222222222".to_string();
        app.service.add_record(left).await.unwrap();
        app.service.add_record(right).await.unwrap();

        let exact = resolve_record_id(
            &app.store,
            EntityKind::Activity,
            "11111111-1111-7111-8111-111111111111",
        )
        .await
        .unwrap();
        assert_eq!(exact, "11111111-1111-7111-8111-111111111111");

        let by_prefix =
            resolve_record_id(&app.store, EntityKind::Activity, "11111111-1111-7111-8111-2")
                .await
                .unwrap();
        assert_eq!(by_prefix, "11111111-1111-7111-8111-222222222222");

        let ambiguous = resolve_record_id(&app.store, EntityKind::Activity, "11111111")
            .await
            .unwrap_err();
        assert!(matches!(ambiguous, CliError::AmbiguousRecordId(_)));

        let missing = resolve_record_id(&app.store, EntityKind::Activity, "99999999")
            .await
            .unwrap_err();
        assert!(matches!(missing, CliError::RecordNotFound(_)));

        let empty = resolve_record_id(&app.store, EntityKind::Activity, "  ")
            .await
            .unwrap_err();
        assert!(matches!(empty, CliError::EmptyRecordId));

        cleanup_db_files(&db_path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleting_an_activity_removes_dependent_sessions() {
        let db_path = unique_test_db_path();
        let app = open_app_with(&db_path, StaticOwner::new("cli-test"))
            .await
            .unwrap();

        let activity = Activity::new("Gym", ActivityCategory::Health);
        let activity_id = activity.id.clone();
        app.service.add_record(activity).await.unwrap();
        let start = Utc::now();
        app.service
            .add_record(SessionLog::new(
                activity_id.clone(),
                start,
                start + Duration::minutes(30),
            ))
            .await
            .unwrap();

        app.service
            .delete_record(EntityKind::Activity, &activity_id)
            .await
            .unwrap();

        assert!(app.service.list_activities().await.unwrap().is_empty());
        assert!(app.service.list_session_logs().await.unwrap().is_empty());

        let pending = app.outbox.list_pending().await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[2].kind, OperationKind::Delete);

        cleanup_db_files(&db_path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_report_counts_records_and_operations() {
        let db_path = unique_test_db_path();
        let app = open_app_with(&db_path, StaticOwner::new("cli-test"))
            .await
            .unwrap();

        app.service
            .add_record(Activity::new("Gym", ActivityCategory::Health))
            .await
            .unwrap();

        let report = build_status_report(&app).await.unwrap();
        assert_eq!(report.owner, "cli-test");
        assert_eq!(report.total_records, 1);
        assert_eq!(report.counts.len(), 7);
        assert_eq!(report.counts[0].collection, "activities");
        assert_eq!(report.counts[0].count, 1);
        assert_eq!(report.pending_operations.len(), 1);

        cleanup_db_files(&db_path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn export_dump_covers_every_collection() {
        let db_path = unique_test_db_path();
        let app = open_app_with(&db_path, StaticOwner::new("cli-test"))
            .await
            .unwrap();

        app.service
            .add_record(Activity::new("Gym", ActivityCategory::Health))
            .await
            .unwrap();

        let dump = export_dump(&app).await.unwrap();
        let object = dump.as_object().unwrap();
        assert_eq!(object.len(), 7);
        assert_eq!(object["activities"].as_array().unwrap().len(), 1);
        assert!(object["note_logs"].as_array().unwrap().is_empty());

        cleanup_db_files(&db_path);
    }

    #[test]
    fn run_completions_writes_bash_script_file() {
        let output_path = std::env::temp_dir().join(format!(
            "tally-completions-test-{}.bash",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ));

        run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

        let script = std::fs::read_to_string(&output_path).unwrap();
        assert!(script.contains("_tally()"));
        assert!(script.contains("complete -F _tally"));

        let _ = std::fs::remove_file(output_path);
    }

    fn unique_test_db_path() -> PathBuf {
        static NEXT_TEST_DB_ID: AtomicU64 = AtomicU64::new(0);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos());
        let sequence = NEXT_TEST_DB_ID.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("tally-cli-test-{timestamp}-{sequence}.db"))
    }

    fn cleanup_db_files(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
    }
}
