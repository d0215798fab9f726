//! Event channel between the organizing worker and whoever displays its progress.
//!
//! The worker is the only producer during a run; the presentation layer drains
//! the channel without blocking whenever it polls. The channel is unbounded, so a
//! slow consumer only makes events queue up: none are dropped or duplicated, and
//! they are always observed in emission order.

use crate::logging::LogSink;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::fmt;
use std::sync::Arc;

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// A single message emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A log line, mirrored from the log sink.
    Log { level: LogLevel, text: String },
    /// Progress through the current run. `current` counts files already completed.
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    /// The full, ordered list of actions a preview run would perform.
    PreviewResult { actions: Vec<String> },
}

impl Event {
    /// Returns true for the progress event that closes a run.
    pub fn is_terminal_progress(&self) -> bool {
        matches!(self, Event::Progress { current, total, .. } if current == total)
    }
}

/// Producer half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    /// Queues an event. A consumer that has gone away is not an error for the worker.
    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

/// Consumer half of the event channel.
#[derive(Debug, Clone)]
pub struct EventReceiver {
    rx: Receiver<Event>,
}

impl EventReceiver {
    /// Takes every event currently queued, oldest first. Never blocks.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    /// Takes the next queued event, if any.
    pub fn try_next(&self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of events waiting to be drained.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Creates a connected sender/receiver pair.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (EventSender { tx }, EventReceiver { rx })
}

/// Writes every message to the log sink and mirrors it onto the event channel.
///
/// Components that need to report something during a run (collision handling,
/// date fallback, the engine itself) share one reporter, so the log file and the
/// live display always agree on what happened.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn LogSink>,
    events: EventSender,
}

impl Reporter {
    pub fn new(sink: Arc<dyn LogSink>, events: EventSender) -> Self {
        Self { sink, events }
    }

    pub fn log(&self, level: LogLevel, text: impl Into<String>) {
        let text = text.into();
        self.sink.log(level, &text);
        self.events.send(Event::Log { level, text });
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(LogLevel::Info, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.log(LogLevel::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(LogLevel::Error, text);
    }

    pub fn progress(&self, current: usize, total: usize, message: impl Into<String>) {
        self.events.send(Event::Progress {
            current,
            total,
            message: message.into(),
        });
    }

    pub fn preview_result(&self, actions: Vec<String>) {
        self.events.send(Event::PreviewResult { actions });
    }
}
