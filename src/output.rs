//! Output formatting and styling module.
//!
//! Everything the CLI prints goes through here: one-off styled messages, the
//! live rendering of engine events, the preview listing and the run summary.

use crate::events::{Event, LogLevel};
use crate::file_organizer::{RunCounters, RunReport};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Styled one-off messages.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use dirsort::output::OutputFormatter;
    /// OutputFormatter::success("Settings saved");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints the preview notice shown before a preview run starts.
    pub fn preview_notice(message: &str) {
        println!("{}", format!("[PREVIEW] {}", message).yellow());
    }

    /// Creates a progress bar for a run over `total` files.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// One colored line for a log event.
    pub fn log_line(level: LogLevel, text: &str) -> String {
        match level {
            LogLevel::Info => format!("{} {}", "•".cyan(), text),
            LogLevel::Warning => format!("{} {}", "⚠".yellow(), text.yellow()),
            LogLevel::Error => format!("{} {}", "✗".red(), text.red()),
        }
    }

    /// Prints the numbered preview listing.
    pub fn preview_list(actions: &[String]) {
        Self::header("PREVIEW");
        if actions.is_empty() {
            println!("No actions would be taken.");
            return;
        }
        let width = actions.len().to_string().len();
        for (index, action) in actions.iter().enumerate() {
            println!("{:>width$}. {}", index + 1, action, width = width);
        }
    }

    /// Prints the counters of a finished run.
    pub fn summary_table(counters: &RunCounters, total: usize) {
        Self::header("SUMMARY");

        let rows = [
            ("Found", total),
            ("Moved", counters.moved),
            ("Renamed", counters.renamed),
            ("Skipped", counters.skipped),
            ("Errors", counters.errored),
        ];
        let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);

        println!("{}", "-".repeat(label_width + 10));
        for (label, count) in rows {
            let value = if label == "Errors" && count > 0 {
                count.to_string().red().bold()
            } else {
                count.to_string().green()
            };
            println!("{:<width$} | {}", label, value, width = label_width);
        }
        println!("{}", "-".repeat(label_width + 10));
    }

    /// Prints the closing lines for a report.
    pub fn report(report: &RunReport) {
        if report.is_stopped() {
            Self::warning(&format!(
                "Stopped after {} of {} files.",
                report.counters.processed, report.total
            ));
        }
        if !report.is_failed() && report.preview_actions.is_empty() {
            Self::summary_table(&report.counters, report.total);
        }
    }
}

/// Renders the event stream of a run as it is drained.
pub struct EventView {
    bar: Option<ProgressBar>,
    show_logs: bool,
    preview: Option<Vec<String>>,
}

impl EventView {
    /// `show_logs` is off when the console tracing layer already prints the
    /// same lines.
    pub fn new(show_logs: bool) -> Self {
        Self {
            bar: None,
            show_logs,
            preview: None,
        }
    }

    pub fn render(&mut self, event: Event) {
        match event {
            Event::Log { level, text } => {
                if self.show_logs {
                    self.println(&OutputFormatter::log_line(level, &text));
                }
            }
            Event::Progress {
                current,
                total,
                message,
            } => {
                if total == 0 {
                    self.finish();
                    return;
                }
                let bar = self
                    .bar
                    .get_or_insert_with(|| OutputFormatter::create_progress_bar(total as u64));
                bar.set_length(total as u64);
                bar.set_position(current as u64);
                bar.set_message(message);
                if current >= total {
                    self.finish();
                }
            }
            Event::PreviewResult { actions } => {
                self.preview = Some(actions);
            }
        }
    }

    /// Clears the progress bar and prints any preview listing received.
    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        if let Some(actions) = self.preview.take() {
            OutputFormatter::preview_list(&actions);
        }
    }

    fn println(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{}", line),
        }
    }
}
