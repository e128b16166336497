//! Result rendering
//!
//! Check results are streamed: each one is formatted and written as soon as
//! the probe that produced it returns. Lines go to the console sink and, when
//! a transcript is attached, to the transcript file as well.

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::transcript::{TranscriptExporter, TranscriptSession};

/// Outcome of one probe step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Ok,
    Warn,
    Error,
    Skipped,
    Unknown,
}

impl CheckStatus {
    pub fn tag(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "[OK]",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Error => "[ERROR]",
            CheckStatus::Skipped => "[SKIPPED]",
            CheckStatus::Unknown => "[UNKNOWN]",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One rendered probe step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub label: String,
    pub status: CheckStatus,
    pub detail: String,
    pub metric: Option<f64>,
}

impl CheckResult {
    pub fn new(status: CheckStatus, label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status,
            detail: detail.into(),
            metric: None,
        }
    }

    pub fn ok(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(CheckStatus::Ok, label, detail)
    }

    pub fn warn(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(CheckStatus::Warn, label, detail)
    }

    pub fn error(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(CheckStatus::Error, label, detail)
    }

    pub fn skipped(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(CheckStatus::Skipped, label, detail)
    }

    pub fn unknown(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(CheckStatus::Unknown, label, detail)
    }

    pub fn with_metric(mut self, metric: f64) -> Self {
        self.metric = Some(metric);
        self
    }

    /// `"  [OK] label: detail"`
    pub fn render(&self) -> String {
        if self.detail.is_empty() {
            format!("  {} {}", self.status.tag(), self.label)
        } else {
            format!("  {} {}: {}", self.status.tag(), self.label, self.detail)
        }
    }
}

/// Destination for rendered lines
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes to stdout
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&self, line: &str) {
        println!("{}", line);
    }
}

/// Collects lines in memory
#[derive(Clone, Default)]
pub struct BufferSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contents(&self) -> String {
        self.lines.lock().join("\n")
    }
}

impl OutputSink for BufferSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Fans rendered lines out to the console and the optional transcript
pub struct Reporter {
    console: Box<dyn OutputSink>,
    transcript: Mutex<Option<TranscriptSession>>,
}

impl Reporter {
    pub fn new(console: Box<dyn OutputSink>) -> Self {
        Self {
            console,
            transcript: Mutex::new(None),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(StdoutSink))
    }

    /// Reporter writing into a buffer that the caller keeps a handle to
    pub fn buffered() -> (Self, BufferSink) {
        let sink = BufferSink::new();
        (Self::new(Box::new(sink.clone())), sink)
    }

    /// Attach a transcript. It is closed when the returned guard is dropped.
    pub fn start_transcript(&self, path: impl AsRef<Path>) -> io::Result<TranscriptGuard<'_>> {
        let session = TranscriptExporter::start(path)?;
        let previous = self.transcript.lock().replace(session);
        drop(previous);
        Ok(TranscriptGuard { reporter: self })
    }

    fn stop_transcript(&self) -> Option<io::Result<std::path::PathBuf>> {
        let session = self.transcript.lock().take();
        session.map(TranscriptSession::stop)
    }

    pub fn has_transcript(&self) -> bool {
        self.transcript.lock().is_some()
    }

    pub fn line(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        self.console.write_line(text);
        let mut transcript = self.transcript.lock();
        if let Some(session) = transcript.as_mut() {
            if let Err(e) = session.write_line(text) {
                warn!("Transcript write failed, detaching: {}", e);
                *transcript = None;
            }
        }
    }

    pub fn blank(&self) {
        self.line("");
    }

    /// Section banner for one module
    pub fn section(&self, title: &str) {
        self.blank();
        self.line(format!("=== {} ===", title));
    }

    pub fn result(&self, result: &CheckResult) {
        self.line(result.render());
    }

    /// Aligned table with a header row and a separator
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        for line in format_table(headers, rows) {
            self.line(line);
        }
    }
}

/// Closes the attached transcript when dropped
pub struct TranscriptGuard<'a> {
    reporter: &'a Reporter,
}

impl TranscriptGuard<'_> {
    /// Close now and report the file that was written
    pub fn stop(self) -> Option<io::Result<std::path::PathBuf>> {
        let result = self.reporter.stop_transcript();
        std::mem::forget(self);
        result
    }
}

impl Drop for TranscriptGuard<'_> {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.reporter.stop_transcript() {
            warn!("Failed to close transcript: {}", e);
        }
    }
}

/// Format rows into aligned columns
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    format_table_limited(headers, rows, None)
}

/// Like `format_table`, emitting at most `limit` rows. Widths still account
/// for every row.
pub fn format_table_limited(headers: &[&str], rows: &[Vec<String>], limit: Option<usize>) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(i) {
                Some(w) => *w = (*w).max(len),
                None => widths.push(len),
            }
        }
    }

    let render_row = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<width$}", c, width = widths.get(i).copied().unwrap_or(0)))
            .collect();
        format!("    {}", padded.join("  ").trim_end())
    };

    let separators: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(render_row(headers.to_vec()));
    lines.push(render_row(separators.iter().map(String::as_str).collect()));
    for row in rows.iter().take(limit.unwrap_or(usize::MAX)) {
        lines.push(render_row(row.iter().map(String::as_str).collect()));
    }
    lines
}

/// Truncate to `width` characters, ending with `...` when cut
pub fn truncate(text: &str, width: usize) -> String {
    let single_line = text.replace(['\r', '\n'], " ");
    if single_line.chars().count() <= width {
        return single_line;
    }
    let keep = width.saturating_sub(3);
    let mut out: String = single_line.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Local wall-clock time for tables and listings
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
