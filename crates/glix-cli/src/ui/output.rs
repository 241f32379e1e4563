//! Line-oriented terminal reporter.
//!
//! Core pipelines call into this through [`Reporter`]. Download progress
//! redraws a single status line when stdout is a terminal; everything else
//! is printed as one line per event.

use std::io::{Write, stdout};
use std::sync::Mutex;

use crossterm::cursor::MoveToColumn;
use crossterm::style::{Print, Stylize};
use crossterm::terminal::{Clear, ClearType};
use crossterm::tty::IsTty;
use crossterm::{QueueableCommand, queue};
use glix_core::Reporter;
use glix_core::io::download::format_bytes;
use glix_schema::BatchCounts;

use super::theme::{Theme, percent};

#[derive(Debug)]
pub struct Output {
    theme: Theme,
    interactive: bool,
    /// Serializes writes and remembers whether a progress line is showing.
    line: Mutex<bool>,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self {
            theme: Theme::default(),
            interactive: stdout().is_tty(),
            line: Mutex::new(false),
        }
    }

    fn emit(&self, text: &str) {
        let mut progress_shown = self.line.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = stdout().lock();
        if *progress_shown {
            let _ = queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine));
            *progress_shown = false;
        }
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }

    fn redraw(&self, text: &str) {
        let mut progress_shown = self.line.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = stdout().lock();
        let _ = out
            .queue(MoveToColumn(0))
            .and_then(|o| o.queue(Clear(ClearType::CurrentLine)))
            .and_then(|o| o.queue(Print(text)));
        let _ = out.flush();
        *progress_shown = true;
    }

    /// Prints a success message to the console.
    pub fn success(&self, msg: &str) {
        let c = &self.theme.colors;
        self.emit(&format!(
            "  {} {msg}",
            self.theme.icons.success.with(c.success)
        ));
    }

    /// Prints an error message to the console.
    pub fn error(&self, msg: &str) {
        let c = &self.theme.colors;
        self.emit(&format!("  {} {msg}", self.theme.icons.error.with(c.error)));
    }

    /// Print a pre-rendered block such as a table.
    pub fn block(&self, text: &str) {
        self.emit(text);
    }
}

impl Reporter for Output {
    fn section(&self, title: &str) {
        self.emit("");
        self.emit(&title.bold().to_string());
    }

    fn downloading(&self, name: &str, current: u64, total: Option<u64>) {
        if !self.interactive {
            return;
        }
        let c = &self.theme.colors;
        let status = match total {
            Some(t) if t > 0 => format!(
                "{:>3}% {} / {}",
                percent(current, t),
                format_bytes(current),
                format_bytes(t)
            ),
            _ => format_bytes(current),
        };
        self.redraw(&format!(
            "  {} {} {}",
            self.theme.icons.active.with(c.active),
            name,
            status.with(c.secondary)
        ));
    }

    fn extracting(&self, name: &str) {
        tracing::debug!("extracting {name}");
    }

    fn done(&self, name: &str, detail: &str) {
        let c = &self.theme.colors;
        self.emit(&format!(
            "  {} {} {}",
            self.theme.icons.success.with(c.success),
            name,
            detail.with(c.secondary)
        ));
    }

    fn failed(&self, name: &str, reason: &str) {
        let c = &self.theme.colors;
        self.emit(&format!(
            "  {} {} {}",
            self.theme.icons.error.with(c.error),
            name,
            reason.with(c.error)
        ));
    }

    fn info(&self, msg: &str) {
        let c = &self.theme.colors;
        self.emit(&format!("  {} {msg}", self.theme.icons.info.with(c.secondary)));
    }

    fn warning(&self, msg: &str) {
        let c = &self.theme.colors;
        self.emit(&format!(
            "  {} {}",
            self.theme.icons.warning.with(c.warning),
            msg.with(c.warning)
        ));
    }

    fn summary(&self, action: &str, counts: BatchCounts) {
        let c = &self.theme.colors;
        if counts.is_empty() {
            self.emit(&format!("  {action}: nothing to do").with(c.secondary).to_string());
            return;
        }
        let color = if counts.failed == 0 { c.success } else { c.warning };
        self.emit(&format!("  {action}: {counts}").with(color).to_string());
    }
}
