//! Session transcript
//!
//! Mirrors every rendered line into a file. A session writes a header when it
//! starts and a footer when it stops; dropping it stops it, so the footer is
//! written on every exit path.

use chrono::Local;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Opens transcript sessions
pub struct TranscriptExporter;

impl TranscriptExporter {
    /// Start a transcript at `path`, creating parent directories
    pub fn start(path: impl AsRef<Path>) -> io::Result<TranscriptSession> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "**********************")?;
        writeln!(writer, "Transcript started: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(writer, "**********************")?;
        info!("Transcript started at {}", path.display());
        Ok(TranscriptSession {
            path,
            writer,
            lines: 0,
            closed: false,
        })
    }
}

/// An open transcript file
pub struct TranscriptSession {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
    closed: bool,
}

impl TranscriptSession {
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{}", line)?;
        self.lines += 1;
        Ok(())
    }

    /// Write the footer and flush
    pub fn stop(mut self) -> io::Result<PathBuf> {
        self.finish()?;
        Ok(self.path.clone())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        writeln!(self.writer, "**********************")?;
        writeln!(self.writer, "Transcript stopped: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(self.writer, "**********************")?;
        self.writer.flush()?;
        info!("Transcript stopped, {} lines written to {}", self.lines, self.path.display());
        Ok(())
    }
}

impl Drop for TranscriptSession {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Failed to close transcript {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_write_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.log");

        let mut session = TranscriptExporter::start(&path).unwrap();
        session.write_line("[OK] gateway: reachable").unwrap();
        let written = session.stop().unwrap();
        assert_eq!(written, path);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Transcript started"));
        assert!(content.contains("[OK] gateway: reachable"));
        assert!(content.contains("Transcript stopped"));
    }

    #[test]
    fn test_drop_writes_footer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.log");
        {
            let mut session = TranscriptExporter::start(&path).unwrap();
            session.write_line("partial").unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("partial"));
        assert_eq!(content.matches("Transcript stopped").count(), 1);
    }
}
