use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lumen_descriptor::{
    DescriptorSource, HelperConfig, HelperDescriptorSource, DESCRIPTOR_FILE_NAME,
};
use lumen_project::IdeProject;
use lumen_sync::{
    ImportReport, ProjectRegistry, RegistryState, SyncEngine, SyncState, TrackedProject,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "lumen", version, about = "Lumen CLI (import, refresh, status, watch)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track descriptor files and sync them into the module model
    Import(ImportArgs),
    /// Re-read every tracked descriptor and report the outcome
    Refresh(RefreshArgs),
    /// List tracked projects and their current sync state
    Status(StatusArgs),
    /// Stop tracking a project (`--tidy` also releases its module)
    Remove(RemoveArgs),
    /// Watch tracked descriptors and re-sync on every change
    Watch(WatchArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// `project.clj` files (or their project directories) to track
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Where the tracked-project list is persisted
    #[arg(long, default_value = ".lumen.json")]
    state: PathBuf,
    /// Build tool executable used to read descriptors
    #[arg(long, default_value = "lein")]
    lein: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RefreshArgs {
    /// Where the tracked-project list is persisted
    #[arg(long, default_value = ".lumen.json")]
    state: PathBuf,
    /// Build tool executable used to read descriptors
    #[arg(long, default_value = "lein")]
    lein: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatusArgs {
    /// Where the tracked-project list is persisted
    #[arg(long, default_value = ".lumen.json")]
    state: PathBuf,
    /// Build tool executable used to read descriptors
    #[arg(long, default_value = "lein")]
    lein: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RemoveArgs {
    /// Descriptor file (or project directory) to stop tracking
    path: PathBuf,
    /// Also remove the project's libraries and release its module
    #[arg(long)]
    tidy: bool,
    /// Where the tracked-project list is persisted
    #[arg(long, default_value = ".lumen.json")]
    state: PathBuf,
    /// Build tool executable used to read descriptors
    #[arg(long, default_value = "lein")]
    lein: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct WatchArgs {
    /// Where the tracked-project list is persisted
    #[arg(long, default_value = ".lumen.json")]
    state: PathBuf,
    /// Build tool executable used to read descriptors
    #[arg(long, default_value = "lein")]
    lein: PathBuf,
    /// Quiet window before a changed descriptor is re-synced
    #[arg(long, default_value_t = 500)]
    debounce_ms: u64,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Logs go to stderr so stdout stays machine-readable under `--json`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("LUMEN_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Import(args) => {
            let session = Session::open(&args.state, &args.lein)?;
            let paths: Vec<PathBuf> = args.paths.iter().map(|path| descriptor_file(path)).collect();
            let report = session.engine.import_projects(&paths);
            session.save()?;
            print_report(&session.summarize(&report), args.json)?;
            Ok(if report.failed.is_empty() { 0 } else { 1 })
        }
        Command::Refresh(args) => {
            // Opening the session already re-read every tracked descriptor,
            // so the restore report is the refresh outcome.
            let session = Session::open(&args.state, &args.lein)?;
            session.save()?;
            print_report(&session.summarize(&session.restore), args.json)?;
            Ok(if session.restore.failed.is_empty() { 0 } else { 1 })
        }
        Command::Status(args) => {
            let session = Session::open(&args.state, &args.lein)?;
            for path in &session.restore.skipped {
                eprintln!("warning: dropped {} (descriptor is gone)", path.display());
            }
            let projects = session.engine.registry().all();
            if args.json {
                print_output(&StatusReport { projects })?;
            } else if projects.is_empty() {
                println!("no projects tracked");
            } else {
                let ide = session.engine.ide();
                for project in &projects {
                    let module = project
                        .module
                        .and_then(|id| ide.with_read(|model| Some(model.module(id)?.name.clone())));
                    match module {
                        Some(name) => println!(
                            "{:<10} {} (module {})",
                            state_label(project.state),
                            project.display_name(),
                            name
                        ),
                        None => println!(
                            "{:<10} {}",
                            state_label(project.state),
                            project.display_name()
                        ),
                    }
                }
            }
            Ok(0)
        }
        Command::Remove(args) => {
            let session = Session::open(&args.state, &args.lein)?;
            let path = descriptor_file(&args.path);
            let Some(project) = session.engine.remove_project(&path) else {
                eprintln!("not tracked: {}", path.display());
                return Ok(1);
            };
            if args.tidy {
                session.engine.tidy(project.descriptor_path(), false)?;
            }
            session.save()?;
            if args.json {
                print_output(&serde_json::json!({ "removed": project.descriptor_path() }))?;
            } else {
                println!("untracked {}", project.display_name());
            }
            Ok(0)
        }
        Command::Watch(args) => run_watch(args),
    }
}

#[cfg(feature = "watch-notify")]
fn run_watch(args: WatchArgs) -> Result<i32> {
    use lumen_scheduler::{BackgroundQueue, QueueConfig};
    use lumen_watch::{DescriptorMonitor, MonitorConfig, NotifyFileWatcher};
    use std::time::Duration;

    let session = Session::open(&args.state, &args.lein)?;
    let tracked = session.engine.registry().len();
    if tracked == 0 {
        println!("no projects tracked; nothing to watch");
        return Ok(0);
    }

    let watcher = NotifyFileWatcher::new().context("failed to start the file watcher")?;
    let queue = Arc::new(BackgroundQueue::new(QueueConfig::default()));
    let monitor = DescriptorMonitor::new(
        Arc::clone(&session.engine),
        queue,
        watcher,
        MonitorConfig {
            debounce: Duration::from_millis(args.debounce_ms),
        },
    );

    println!("watching {tracked} project(s); press Enter to stop");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    monitor.flush();
    for project in monitor.engine().registry().all() {
        println!(
            "{:<10} {}",
            state_label(project.state),
            project.display_name()
        );
    }
    session.save()?;
    Ok(0)
}

#[cfg(not(feature = "watch-notify"))]
fn run_watch(_args: WatchArgs) -> Result<i32> {
    anyhow::bail!("this build has no OS file watcher; rebuild with the `watch-notify` feature")
}

/// One CLI invocation: an in-memory IDE session with the persisted project
/// list replayed into it.
struct Session {
    engine: Arc<SyncEngine>,
    state_path: PathBuf,
    restore: ImportReport,
}

impl Session {
    fn open(state_path: &Path, lein: &Path) -> Result<Self> {
        let state = load_state(state_path)?;
        let source: Arc<dyn DescriptorSource> =
            Arc::new(HelperDescriptorSource::new(HelperConfig {
                program: lein.to_path_buf(),
                ..HelperConfig::default()
            }));
        let ide = Arc::new(IdeProject::new());
        let registry = Arc::new(ProjectRegistry::new());
        let engine = Arc::new(SyncEngine::new(ide, registry, source));
        let restore = engine.load_state(&state);
        debug!(
            target: "lumen.cli",
            tracked = engine.registry().len(),
            "session restored"
        );
        Ok(Self {
            engine,
            state_path: state_path.to_path_buf(),
            restore,
        })
    }

    fn save(&self) -> Result<()> {
        let body = serde_json::to_string_pretty(&self.engine.registry().state())?;
        fs::write(&self.state_path, body).with_context(|| {
            format!("failed to write state file {}", self.state_path.display())
        })
    }

    fn summarize(&self, report: &ImportReport) -> ReportSummary {
        let ide = self.engine.ide();
        let synced = report
            .synced
            .iter()
            .map(|(path, module)| SyncedEntry {
                path: path.clone(),
                module: ide.with_read(|model| {
                    model
                        .module(*module)
                        .map(|m| m.name.clone())
                        .unwrap_or_default()
                }),
            })
            .collect();
        let failed = report
            .failed
            .iter()
            .map(|(path, error)| FailedEntry {
                path: path.clone(),
                error: error_chain(error),
            })
            .collect();
        ReportSummary {
            synced,
            failed,
            skipped: report.skipped.clone(),
            conflicted: report.conflicted.clone(),
        }
    }
}

fn load_state(path: &Path) -> Result<RegistryState> {
    if !path.exists() {
        return Ok(RegistryState::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed state file {}", path.display()))
}

/// Accepts either a descriptor file or the project directory holding one.
fn descriptor_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DESCRIPTOR_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

#[derive(Serialize)]
struct ReportSummary {
    synced: Vec<SyncedEntry>,
    failed: Vec<FailedEntry>,
    skipped: Vec<PathBuf>,
    conflicted: Vec<PathBuf>,
}

#[derive(Serialize)]
struct SyncedEntry {
    path: PathBuf,
    module: String,
}

#[derive(Serialize)]
struct FailedEntry {
    path: PathBuf,
    error: String,
}

#[derive(Serialize)]
struct StatusReport {
    projects: Vec<TrackedProject>,
}

fn print_report(summary: &ReportSummary, json: bool) -> Result<()> {
    if json {
        return print_output(summary);
    }
    for entry in &summary.synced {
        println!("synced {} (module {})", entry.path.display(), entry.module);
    }
    for entry in &summary.failed {
        println!("failed {}: {}", entry.path.display(), entry.error);
    }
    for path in &summary.skipped {
        println!("dropped {} (descriptor is gone)", path.display());
    }
    for path in &summary.conflicted {
        println!("released {} (another integration owns it)", path.display());
    }
    println!(
        "summary: {} synced, {} failed",
        summary.synced.len(),
        summary.failed.len()
    );
    Ok(())
}

fn print_output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn state_label(state: SyncState) -> &'static str {
    match state {
        SyncState::Discovered => "discovered",
        SyncState::Synced => "synced",
        SyncState::Failed => "failed",
        SyncState::Removed => "removed",
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
