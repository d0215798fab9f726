//! Command-line interface module for dirsort.
//!
//! Parses the command line, loads settings, starts runs on the engine's
//! background worker and renders the event stream while the run is going.

use crate::config::{ConfigError, Settings, SettingsStore};
use crate::date_resolver::DateBucketMode;
use crate::events;
use crate::file_organizer::{
    EngineConfig, EngineError, OrganizeEngine, RunOutcome, RunReport, RunRequest, StopHandle,
};
use crate::logging::{self, LoggingError, TracingLogSink};
use crate::notify;
use crate::output::{EventView, OutputFormatter};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sort a directory tree into category and date folders.
#[derive(Debug, Parser)]
#[command(name = "dirsort", version, about)]
pub struct Cli {
    /// Settings file to use instead of the default lookup.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print log records on stderr as they are written.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Move files from the source into the destination.
    Organize(RunArgs),
    /// Show what organize would do without touching anything.
    Preview(RunArgs),
    /// Inspect or change the settings file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Directory to organize. Defaults to `default_source_dir`.
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Directory to organize into. Defaults to `default_destination_dir`.
    #[arg(short, long)]
    pub dest: Option<PathBuf>,

    /// Duplicate handling for this run: skip or rename.
    #[arg(long)]
    pub policy: Option<String>,

    /// Date folders for this run: none, year, year-month or year-month-day.
    #[arg(long)]
    pub date_format: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective settings document.
    Show,
    /// Print the settings file location.
    Path,
    /// Change one top-level setting and save.
    Set { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("no source directory given and default_source_dir is not set")]
    MissingSource,
    #[error("no destination directory given and default_destination_dir is not set")]
    MissingDestination,
    #[error("unknown date format '{0}' (expected none, year, year-month or year-month-day)")]
    InvalidDateFormat(String),
    #[error("{0}")]
    RunFailed(String),
}

/// Runs the CLI application.
///
/// ```no_run
/// use clap::Parser;
/// use dirsort::cli::{Cli, run_cli};
///
/// if let Err(e) = run_cli(Cli::parse()) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> Result<(), CliError> {
    let settings_path = Settings::locate(cli.config.as_deref());

    match cli.command {
        Command::Config(command) => run_config(settings_path, command),
        Command::Organize(args) => {
            let store = SettingsStore::open(settings_path)?;
            init_logging(cli.verbose, store.settings());
            let report = run_engine(store.settings(), &args, false, !cli.verbose)?;
            finish(report)
        }
        Command::Preview(args) => {
            let store = SettingsStore::open(settings_path)?;
            init_logging(cli.verbose, store.settings());
            let report = run_engine(store.settings(), &args, true, !cli.verbose)?;
            finish(report)
        }
    }
}

fn finish(report: RunReport) -> Result<(), CliError> {
    OutputFormatter::report(&report);
    match report.outcome {
        RunOutcome::Failed(error) => Err(CliError::RunFailed(error.to_string())),
        RunOutcome::Completed | RunOutcome::Stopped => Ok(()),
    }
}

fn init_logging(verbose: bool, settings: &Settings) {
    match logging::init(verbose, settings.log_file().as_deref()) {
        Ok(()) | Err(LoggingError::AlreadyInstalled) => {}
        Err(e) => OutputFormatter::warning(&format!("Logging to file disabled: {}", e)),
    }
}

fn run_config(settings_path: PathBuf, command: ConfigCommand) -> Result<(), CliError> {
    match command {
        ConfigCommand::Path => {
            OutputFormatter::plain(&settings_path.display().to_string());
        }
        ConfigCommand::Show => {
            let store = SettingsStore::open(settings_path)?;
            OutputFormatter::plain(&store.settings().to_json()?);
        }
        ConfigCommand::Set { key, value } => {
            let mut store = SettingsStore::open(settings_path)?;
            store.set(&key, &value)?;
            OutputFormatter::success(&format!(
                "Set '{}' in {}",
                key,
                store.path().display()
            ));
        }
    }
    Ok(())
}

/// Builds the engine configuration for one run, applying command-line overrides.
pub fn engine_config(settings: &Settings, args: &RunArgs) -> Result<EngineConfig, CliError> {
    let mut config = EngineConfig::from_settings(settings)?;
    if let Some(policy) = &args.policy {
        config.duplicate_handling = policy.clone();
    }
    if let Some(format) = &args.date_format {
        config.date_buckets = DateBucketMode::from_setting(format)
            .ok_or_else(|| CliError::InvalidDateFormat(format.clone()))?;
    }
    Ok(config)
}

/// Resolves source and destination from arguments, falling back to settings.
pub fn run_request(settings: &Settings, args: &RunArgs, preview: bool) -> Result<RunRequest, CliError> {
    let source = args
        .source
        .clone()
        .or_else(|| settings.default_source())
        .ok_or(CliError::MissingSource)?;
    let destination = args
        .dest
        .clone()
        .or_else(|| settings.default_destination())
        .ok_or(CliError::MissingDestination)?;

    Ok(if preview {
        RunRequest::preview(source, destination)
    } else {
        RunRequest::execute(source, destination)
    })
}

fn run_engine(
    settings: &Settings,
    args: &RunArgs,
    preview: bool,
    show_logs: bool,
) -> Result<RunReport, CliError> {
    let config = engine_config(settings, args)?;
    let request = run_request(settings, args, preview)?;

    if preview {
        OutputFormatter::preview_notice("No files will be moved.");
    }

    let (tx, rx) = events::channel();
    let engine = OrganizeEngine::new(
        config,
        Arc::new(TracingLogSink),
        notify::from_setting(settings.enable_desktop_notifications),
        tx,
    );
    install_interrupt_handler(engine.stop_handle());

    let handle = engine.spawn(request)?;
    let mut view = EventView::new(show_logs);

    while !handle.is_finished() {
        for event in rx.drain() {
            view.render(event);
        }
        thread::sleep(POLL_INTERVAL);
    }
    let report = handle.join()?;
    for event in rx.drain() {
        view.render(event);
    }
    view.finish();

    Ok(report)
}

/// Routes Ctrl-C to the most recent run's stop flag.
///
/// `ctrlc` accepts a single handler per process, so the handler is installed
/// once and reads whichever stop handle was registered last.
fn install_interrupt_handler(stop: StopHandle) {
    static CURRENT: OnceLock<parking_lot::Mutex<Option<StopHandle>>> = OnceLock::new();

    let slot = CURRENT.get_or_init(|| {
        let result = ctrlc::set_handler(|| {
            if let Some(slot) = CURRENT.get()
                && let Some(stop) = slot.lock().as_ref()
            {
                stop.request_stop();
            }
        });
        if let Err(e) = result {
            tracing::debug!("Ctrl-C handler not installed: {}", e);
        }
        parking_lot::Mutex::new(None)
    });
    *slot.lock() = Some(stop);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_organize_arguments() {
        let cli = Cli::try_parse_from([
            "dirsort", "--verbose", "organize", "--source", "/in", "--dest", "/out", "--policy",
            "skip",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Organize(args) => {
                assert_eq!(args.source, Some(PathBuf::from("/in")));
                assert_eq!(args.dest, Some(PathBuf::from("/out")));
                assert_eq!(args.policy.as_deref(), Some("skip"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::try_parse_from(["dirsort", "config", "set", "use_exif_date", "false"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Set { ref key, ref value })
                if key == "use_exif_date" && value == "false"
        ));
    }

    #[test]
    fn test_overrides_applied_to_engine_config() {
        let args = RunArgs {
            policy: Some("skip".to_string()),
            date_format: Some("year-month".to_string()),
            ..Default::default()
        };
        let config = engine_config(&Settings::default(), &args).unwrap();
        assert_eq!(config.duplicate_handling, "skip");
        assert_eq!(config.date_buckets, DateBucketMode::YearMonth);
    }

    #[test]
    fn test_invalid_date_format_rejected() {
        let args = RunArgs {
            date_format: Some("fortnight".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            engine_config(&Settings::default(), &args),
            Err(CliError::InvalidDateFormat(_))
        ));
    }

    #[test]
    fn test_request_falls_back_to_settings() {
        let settings = Settings {
            default_source_dir: "/in".to_string(),
            default_destination_dir: "/out".to_string(),
            ..Default::default()
        };
        let request = run_request(&settings, &RunArgs::default(), true).unwrap();
        assert_eq!(request.source, PathBuf::from("/in"));
        assert_eq!(request.destination, PathBuf::from("/out"));

        assert!(matches!(
            run_request(&Settings::default(), &RunArgs::default(), false),
            Err(CliError::MissingSource)
        ));
    }
}
