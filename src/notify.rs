//! Best-effort user alerts at the end of a run.
//!
//! Notification failures are reported back to the caller as errors, but the
//! engine only ever logs them at debug level: an alert that could not be shown
//! never changes a run's outcome.

use colored::*;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification could not be delivered: {0}")]
    Delivery(#[from] std::io::Error),
}

/// Accepts `(title, message, timeout)` alerts.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str, timeout: Duration) -> Result<(), NotifyError>;
}

/// Prints alerts as a highlighted line on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, message: &str, _timeout: Duration) -> Result<(), NotifyError> {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "{} {}", format!("[{}]", title).magenta().bold(), message)?;
        Ok(())
    }
}

/// Used when notifications are switched off in the settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn notify(&self, _title: &str, _message: &str, _timeout: Duration) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Picks the notifier matching the `enable_desktop_notifications` setting.
pub fn from_setting(enabled: bool) -> Arc<dyn Notifier> {
    if enabled {
        Arc::new(ConsoleNotifier)
    } else {
        Arc::new(DisabledNotifier)
    }
}
