//! The organize engine: walks a source tree and moves every file into a
//! category folder (optionally nested under a date folder) below a destination.
//!
//! An engine is `Running` from the moment a run is started until the run ends
//! `Completed`, `Stopped`, or `Failed`. A run fails only when the source or
//! destination is unusable, before any file is looked at. Everything the run
//! does is reported on the event channel as it happens; the initiating side
//! only polls that channel and may raise the stop flag, which is checked once
//! before each file.
//!
//! Preview runs compute the same decisions without creating directories or
//! moving anything, and hand back the ordered list of intended actions.

use crate::collision::{self, DuplicatePolicy};
use crate::config::{ConfigError, FileFilter, Settings};
use crate::date_resolver::{DateBucketMode, DateResolver, DateSource};
use crate::events::{EventSender, Reporter};
use crate::file_category::{self, CategoryTable};
use crate::logging::LogSink;
use crate::notify::Notifier;
use crate::walker::{ExcludedDirNames, TreeWalker};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

const SHORT_ALERT: Duration = Duration::from_secs(3);
const LONG_ALERT: Duration = Duration::from_secs(5);

/// Errors that end a run before any file is looked at.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Source directory does not exist: '{}'", .0.display())]
    SourceMissing(PathBuf),
    #[error("Could not create destination directory '{}': {source}", .path.display())]
    DestinationNotCreated {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Destination path is not a directory: '{}'", .0.display())]
    DestinationNotDirectory(PathBuf),
}

impl SetupError {
    fn alert(&self) -> &'static str {
        match self {
            Self::SourceMissing(_) => "Source directory not found!",
            Self::DestinationNotCreated { .. } => "Could not create destination directory!",
            Self::DestinationNotDirectory(_) => "Destination path is not a directory!",
        }
    }

    fn progress_message(&self) -> &'static str {
        match self {
            Self::SourceMissing(_) => "Error: Source directory not found.",
            Self::DestinationNotCreated { .. } => "Error: Could not create destination directory.",
            Self::DestinationNotDirectory(_) => "Error: Destination path is invalid.",
        }
    }
}

/// Errors confined to a single file. They are counted and logged; the run goes on.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("File not found during processing: '{}'", .0.display())]
    NotFound(PathBuf),
    #[error("Permission denied for file: '{}'. Skipping.", .0.display())]
    PermissionDenied(PathBuf),
    #[error("Could not create category directory '{}': {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error moving '{}' to '{}': {source}. Skipping.", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("An unexpected error occurred processing '{}': {source}", .path.display())]
    Unexpected {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    fn from_move(from: &Path, to: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(from.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(from.to_path_buf()),
            _ => Self::Move {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            },
        }
    }
}

/// Errors returned to the caller that starts a run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("an organize run is already active on this engine")]
    AlreadyRunning,
    #[error("could not start the worker thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("the worker thread panicked")]
    WorkerPanicked,
}

/// Organizing rules, read once when a run starts and never changed by it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub categories: CategoryTable,
    pub excluded_dirs: ExcludedDirNames,
    /// Raw duplicate policy setting; normalized at the start of each run.
    pub duplicate_handling: String,
    pub date_buckets: DateBucketMode,
    pub category_date_buckets: HashMap<String, DateBucketMode>,
    pub prefer_metadata: bool,
    pub date_source: DateSource,
    pub image_category: String,
    pub filter: FileFilter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            categories: settings.file_categories,
            excluded_dirs: settings.exclude_folders.into_iter().collect(),
            duplicate_handling: settings.duplicate_handling,
            date_buckets: settings.sort_by_date_format,
            category_date_buckets: HashMap::new(),
            prefer_metadata: settings.use_exif_date,
            date_source: settings.date_source,
            image_category: settings.image_category,
            filter: FileFilter::default(),
        }
    }
}

impl EngineConfig {
    /// Builds the engine configuration from persisted settings.
    ///
    /// Fails only if a file filter pattern does not compile.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            categories: settings.file_categories.clone(),
            excluded_dirs: settings.exclude_folders.iter().cloned().collect(),
            duplicate_handling: settings.duplicate_handling.clone(),
            date_buckets: settings.sort_by_date_format,
            category_date_buckets: settings
                .category_date_formats
                .iter()
                .map(|(name, mode)| (name.clone(), *mode))
                .collect(),
            prefer_metadata: settings.use_exif_date,
            date_source: settings.date_source,
            image_category: settings.image_category.clone(),
            filter: settings.filters.compile()?,
        })
    }

    pub fn bucket_mode_for(&self, category: &str) -> DateBucketMode {
        self.category_date_buckets
            .get(category)
            .copied()
            .unwrap_or(self.date_buckets)
    }
}

/// Whether a run moves files or only reports what it would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Execute,
    Preview,
}

/// One organize or preview invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: RunMode,
}

impl RunRequest {
    pub fn execute(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode: RunMode::Execute,
        }
    }

    pub fn preview(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode: RunMode::Preview,
        }
    }

    fn is_preview(&self) -> bool {
        self.mode == RunMode::Preview
    }
}

/// Lifecycle of the most recent run on an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Stopped,
    Failed(SetupError),
}

/// Per-run counters.
///
/// `moved` includes renamed files; `processed` counts every file whose
/// handling finished, whatever the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub processed: usize,
    pub moved: usize,
    pub renamed: usize,
    pub skipped: usize,
    pub errored: usize,
}

/// What a run did, handed back to whoever started it.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub counters: RunCounters,
    /// Number of files enumerated.
    pub total: usize,
    /// Preview action descriptions, in processing order. Empty for execute runs.
    pub preview_actions: Vec<String>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.outcome, RunOutcome::Stopped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed(_))
    }
}

/// An action a preview run would take for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewAction {
    Move {
        source: PathBuf,
        destination: PathBuf,
    },
    SkipDuplicate {
        source: PathBuf,
        destination: PathBuf,
    },
    RenameAndMove {
        source: PathBuf,
        destination: PathBuf,
    },
    AlreadyInPlace {
        source: PathBuf,
    },
}

impl fmt::Display for PreviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move {
                source,
                destination,
            } => write!(
                f,
                "Move: '{}' (Source: '{}', Destination: '{}')",
                file_name_of(source),
                source.display(),
                destination.display()
            ),
            Self::SkipDuplicate {
                source,
                destination,
            } => write!(
                f,
                "Skip (Duplicate): '{}' (Source: '{}', Destination: '{}')",
                file_name_of(source),
                source.display(),
                destination.display()
            ),
            Self::RenameAndMove {
                source,
                destination,
            } => write!(
                f,
                "Rename & Move to '{}': '{}' (Source: '{}', Destination: '{}')",
                file_name_of(destination),
                file_name_of(source),
                source.display(),
                destination.display()
            ),
            Self::AlreadyInPlace { source } => write!(
                f,
                "Skip (Already in place): '{}' (Source: '{}')",
                file_name_of(source),
                source.display()
            ),
        }
    }
}

/// Shared cooperative stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Asks the running worker to stop before its next file.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Handle on a run executing on the background worker.
pub struct RunHandle {
    thread: JoinHandle<RunReport>,
    stop: StopHandle,
}

impl RunHandle {
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// True once the worker has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the worker and returns its report.
    pub fn join(self) -> Result<RunReport, EngineError> {
        self.thread.join().map_err(|_| EngineError::WorkerPanicked)
    }
}

/// Releases the engine's single run slot when dropped.
struct ActiveRun {
    active: Arc<AtomicBool>,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Mutable state owned by one run.
#[derive(Default)]
struct RunState {
    counters: RunCounters,
    preview_actions: Vec<PreviewAction>,
    /// Destinations already promised to earlier files of a preview run.
    claimed: HashSet<PathBuf>,
}

enum FileOutcome {
    Moved { renamed: bool },
    Skipped,
    AlreadyInPlace,
    Planned(PreviewAction),
}

impl RunState {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Moved { renamed } => {
                self.counters.moved += 1;
                if renamed {
                    self.counters.renamed += 1;
                }
            }
            FileOutcome::Skipped | FileOutcome::AlreadyInPlace => self.counters.skipped += 1,
            FileOutcome::Planned(action) => self.preview_actions.push(action),
        }
    }
}

/// Organizes files according to an [`EngineConfig`].
///
/// Cloning is cheap and every clone shares the same stop flag and run slot, so
/// at most one run is active across all clones.
#[derive(Clone)]
pub struct OrganizeEngine {
    config: Arc<EngineConfig>,
    dates: DateResolver,
    reporter: Reporter,
    notifier: Arc<dyn Notifier>,
    stop: StopHandle,
    active: Arc<AtomicBool>,
    state: Arc<Mutex<EngineState>>,
}

impl OrganizeEngine {
    pub fn new(
        config: EngineConfig,
        log_sink: Arc<dyn LogSink>,
        notifier: Arc<dyn Notifier>,
        events: EventSender,
    ) -> Self {
        let dates = DateResolver::new(config.date_source, config.image_category.clone());
        Self {
            config: Arc::new(config),
            dates,
            reporter: Reporter::new(log_sink, events),
            notifier,
            stop: StopHandle::default(),
            active: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(EngineState::Idle)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Runs on the calling thread until the run reaches a terminal state.
    pub fn run(&self, request: &RunRequest) -> Result<RunReport, EngineError> {
        let _slot = self.claim_slot()?;
        self.stop.reset();
        Ok(self.execute(request))
    }

    /// Starts the run on a background worker and returns immediately.
    pub fn spawn(&self, request: RunRequest) -> Result<RunHandle, EngineError> {
        let slot = self.claim_slot()?;
        self.stop.reset();

        let engine = self.clone();
        let thread = thread::Builder::new()
            .name("dirsort-worker".into())
            .spawn(move || {
                let _slot = slot;
                engine.execute(&request)
            })
            .map_err(|e| {
                self.set_state(EngineState::Idle);
                EngineError::Spawn(e)
            })?;

        Ok(RunHandle {
            thread,
            stop: self.stop.clone(),
        })
    }

    fn claim_slot(&self) -> Result<ActiveRun, EngineError> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::AlreadyRunning)?;
        self.set_state(EngineState::Running);
        Ok(ActiveRun {
            active: self.active.clone(),
        })
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
    }

    fn notify(&self, title: &str, message: &str, timeout: Duration) {
        if let Err(e) = self.notifier.notify(title, message, timeout) {
            tracing::debug!("Notification '{}' not shown: {}", title, e);
        }
    }

    fn execute(&self, request: &RunRequest) -> RunReport {
        let preview = request.is_preview();
        let source = absolute(&request.source);
        let destination = absolute(&request.destination);

        if let Err(error) = self.prepare(&source, &destination, preview) {
            return self.fail(error);
        }

        let policy =
            DuplicatePolicy::from_setting_or_rename(&self.config.duplicate_handling, &self.reporter);

        self.reporter.info(format!(
            "{}Starting file organization from '{}' to '{}'...",
            if preview { "PREVIEW MODE: " } else { "" },
            source.display(),
            destination.display()
        ));

        let files: Vec<PathBuf> = TreeWalker::new(&source)
            .exclude_dirs(self.config.excluded_dirs.clone())
            .prune_path(&destination)
            .filter(self.config.filter.clone())
            .report_to(self.reporter.clone())
            .files()
            .collect();
        let total = files.len();
        let mut state = RunState::default();

        if total == 0 {
            self.reporter
                .info("No files found to organize in the source directory.");
            self.reporter.progress(0, 0, "No files found.");
            self.notify("File Organizer", "No files found to organize.", SHORT_ALERT);
            return self.finish(RunOutcome::Completed, state, total);
        }

        for (index, path) in files.iter().enumerate() {
            if self.stop.is_stop_requested() {
                self.reporter
                    .warning("Organization process was stopped by user.");
                self.notify(
                    "Organizer Stopped",
                    "File organization was interrupted.",
                    SHORT_ALERT,
                );
                self.reporter.progress(index, total, "Process interrupted.");
                return self.finish(RunOutcome::Stopped, state, total);
            }

            self.reporter
                .progress(index, total, format!("Processing: {}", file_name_of(path)));

            match self.process_file(path, &destination, policy, preview, &mut state) {
                Ok(outcome) => state.record(outcome),
                Err(error) => {
                    state.counters.errored += 1;
                    self.reporter.error(error.to_string());
                }
            }
            state.counters.processed += 1;
        }

        if preview {
            let actions: Vec<String> = state.preview_actions.iter().map(|a| a.to_string()).collect();
            let count = actions.len();
            self.reporter.preview_result(actions);
            self.reporter.info(format!(
                "Preview complete. {} potential actions identified.",
                count
            ));
            self.notify(
                "Preview Complete",
                &format!("Identified {} potential actions.", count),
                SHORT_ALERT,
            );
            self.reporter.progress(total, total, "Preview Complete.");
        } else {
            let c = state.counters;
            let summary = format!(
                "Organization complete! Moved {} files, renamed {} files, skipped {} duplicates, encountered {} errors.",
                c.moved, c.renamed, c.skipped, c.errored
            );
            self.reporter.info(summary.clone());
            self.notify("Organization Complete", &summary, LONG_ALERT);
            self.reporter.progress(total, total, summary);
        }

        self.finish(RunOutcome::Completed, state, total)
    }

    fn prepare(&self, source: &Path, destination: &Path, preview: bool) -> Result<(), SetupError> {
        if !source.is_dir() {
            return Err(SetupError::SourceMissing(source.to_path_buf()));
        }

        if !destination.exists() {
            // A preview leaves the filesystem alone; a missing destination
            // simply means nothing collides.
            if preview {
                return Ok(());
            }
            fs::create_dir_all(destination).map_err(|e| SetupError::DestinationNotCreated {
                path: destination.to_path_buf(),
                source: e,
            })?;
            self.reporter.info(format!(
                "Created destination directory: '{}'",
                destination.display()
            ));
        }

        if !destination.is_dir() {
            return Err(SetupError::DestinationNotDirectory(
                destination.to_path_buf(),
            ));
        }
        Ok(())
    }

    fn fail(&self, error: SetupError) -> RunReport {
        self.reporter.error(error.to_string());
        self.notify("Organizer Error", error.alert(), SHORT_ALERT);
        self.reporter.progress(0, 0, error.progress_message());
        self.set_state(EngineState::Failed);
        RunReport {
            outcome: RunOutcome::Failed(error),
            counters: RunCounters::default(),
            total: 0,
            preview_actions: Vec::new(),
        }
    }

    fn finish(&self, outcome: RunOutcome, state: RunState, total: usize) -> RunReport {
        self.set_state(match outcome {
            RunOutcome::Completed => EngineState::Completed,
            RunOutcome::Stopped => EngineState::Stopped,
            RunOutcome::Failed(_) => EngineState::Failed,
        });
        RunReport {
            outcome,
            counters: state.counters,
            total,
            preview_actions: state.preview_actions.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Classify, date, create the target folder, resolve collisions, then move
    /// or record. Always in that order.
    fn process_file(
        &self,
        source: &Path,
        destination_root: &Path,
        policy: DuplicatePolicy,
        preview: bool,
        state: &mut RunState,
    ) -> Result<FileOutcome, FileError> {
        let file_name = source.file_name().ok_or_else(|| FileError::Unexpected {
            path: source.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "file has no name component"),
        })?;
        let name = file_name.to_string_lossy();

        let category = file_category::classify(&name, &self.config.categories);
        let mut target_dir = destination_root.join(category);

        let mode = self.config.bucket_mode_for(category);
        if mode != DateBucketMode::None && !self.config.categories.is_catch_all(category) {
            let date = self
                .dates
                .resolve(source, category, self.config.prefer_metadata, &self.reporter);
            if let Some(segment) = mode.segment(&date) {
                target_dir.push(segment);
            }
        }

        if !preview && !target_dir.is_dir() {
            fs::create_dir_all(&target_dir).map_err(|e| FileError::CreateDirectory {
                path: target_dir.clone(),
                source: e,
            })?;
            self.reporter.info(format!(
                "Created category directory: '{}'",
                target_dir.display()
            ));
        }

        let candidate = target_dir.join(file_name);

        if candidate == source {
            self.reporter
                .info(format!("'{}' is already in place.", name));
            return Ok(if preview {
                FileOutcome::Planned(PreviewAction::AlreadyInPlace {
                    source: source.to_path_buf(),
                })
            } else {
                FileOutcome::AlreadyInPlace
            });
        }

        if preview {
            let claimed = &state.claimed;
            let resolved = collision::resolve_with(&candidate, policy, &self.reporter, |p| {
                p.exists() || claimed.contains(p)
            });
            let action = match resolved {
                None => PreviewAction::SkipDuplicate {
                    source: source.to_path_buf(),
                    destination: candidate,
                },
                Some(destination) => {
                    state.claimed.insert(destination.clone());
                    if destination == candidate {
                        PreviewAction::Move {
                            source: source.to_path_buf(),
                            destination,
                        }
                    } else {
                        PreviewAction::RenameAndMove {
                            source: source.to_path_buf(),
                            destination,
                        }
                    }
                }
            };
            return Ok(FileOutcome::Planned(action));
        }

        let Some(final_path) = collision::resolve(&candidate, policy, &self.reporter) else {
            return Ok(FileOutcome::Skipped);
        };

        move_file(source, &final_path).map_err(|e| FileError::from_move(source, &final_path, e))?;
        self.reporter.info(format!(
            "Moved: '{}' to '{}'",
            name,
            final_path.display()
        ));

        Ok(FileOutcome::Moved {
            renamed: final_path != candidate,
        })
    }
}

/// Moves a file, copying and deleting when the platform refuses to rename
/// across devices.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_then_remove(from, to, |p| fs::remove_file(p))
        }
        Err(e) => Err(e),
    }
}

/// Copies `from` to `to`, then removes `from`. If the source cannot be removed
/// the copy is deleted again, so a failed move never leaves two files behind.
fn copy_then_remove<R>(from: &Path, to: &Path, remove_source: R) -> io::Result<()>
where
    R: FnOnce(&Path) -> io::Result<()>,
{
    fs::copy(from, to)?;
    if let Err(e) = remove_source(from) {
        if let Err(cleanup) = fs::remove_file(to) {
            tracing::warn!(
                "Could not remove copy '{}' after failed move: {}",
                to.display(),
                cleanup
            );
        }
        return Err(e);
    }
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
