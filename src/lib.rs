//! dirsort - sort a directory tree into category and date folders
//!
//! This library classifies files by extension, resolves their effective dates
//! (EXIF capture time for images, filesystem timestamps otherwise), resolves
//! destination name collisions and moves everything on a background worker
//! that reports progress over an event channel and can be stopped between files.

pub mod cli;
pub mod collision;
pub mod config;
pub mod date_resolver;
pub mod events;
pub mod file_category;
pub mod file_organizer;
pub mod logging;
pub mod notify;
pub mod output;
pub mod walker;

pub use collision::DuplicatePolicy;
pub use config::{ConfigError, FileFilter, FilterRules, Settings, SettingsStore};
pub use date_resolver::{DateBucketMode, DateResolver, DateSource};
pub use events::{Event, EventReceiver, EventSender, LogLevel, Reporter};
pub use file_category::{Category, CategoryTable, classify};
pub use file_organizer::{
    EngineConfig, EngineError, EngineState, OrganizeEngine, RunCounters, RunHandle, RunMode,
    RunOutcome, RunReport, RunRequest, StopHandle,
};
pub use logging::{LogSink, TracingLogSink};
pub use notify::Notifier;
pub use walker::{TreeWalker, walk};

pub use cli::{Cli, run_cli};
