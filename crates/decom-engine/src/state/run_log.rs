use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use decom_core::config::RunConfig;
use tracing_subscriber::fmt::MakeWriter;

use super::lock::AdvisoryLock;
use crate::retry::RetryPolicy;

/// Plaintext run log, appended one entry at a time.
///
/// Every entry opens the file in append mode under an advisory lock, writes,
/// flushes and closes it again, so a sync client holding the file between
/// entries only costs a retry. An entry that still cannot be written after
/// the retry budget is dropped; the first such drop is reported on stderr.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    policy: RetryPolicy,
    dropped: AtomicBool,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            dropped: AtomicBool::new(false),
        }
    }

    /// `decom-<timestamp>.log` under the configured output directory.
    pub fn for_run(config: &RunConfig, stamp: &str) -> Self {
        let policy = RetryPolicy::fixed(
            config.log_lock_attempts,
            Duration::from_millis(config.log_lock_delay_ms),
        );
        Self::new(config.output_dir.join(format!("decom-{stamp}.log")), policy)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append raw bytes as one entry.
    pub fn append(&self, entry: &[u8]) -> Result<()> {
        if entry.is_empty() {
            return Ok(());
        }
        self.policy.retry(|_| self.append_once(entry))
    }

    /// Append a timestamped line, outside of any tracing subscriber.
    pub fn line(&self, text: &str) -> Result<()> {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        self.append(format!("{stamp} {text}\n").as_bytes())
    }

    fn append_once(&self, entry: &[u8]) -> Result<()> {
        let lock = AdvisoryLock::acquire(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("cannot open log {}", self.path.display()))?;
        file.write_all(entry)?;
        if !entry.ends_with(b"\n") {
            file.write_all(b"\n")?;
        }
        file.flush()?;
        drop(file);
        lock.release()
    }

    fn commit(&self, entry: &[u8]) {
        if let Err(err) = self.append(entry) {
            if !self.dropped.swap(true, Ordering::SeqCst) {
                eprintln!(
                    "warning: dropping run log entries for {}: {err:#}",
                    self.path.display()
                );
            }
        }
    }
}

/// One event's worth of formatted output, committed on flush or drop.
pub struct RunLogWriter<'a> {
    log: &'a RunLog,
    buf: Vec<u8>,
}

impl Write for RunLogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let entry = std::mem::take(&mut self.buf);
        self.log.commit(&entry);
        Ok(())
    }
}

impl Drop for RunLogWriter<'_> {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            let entry = std::mem::take(&mut self.buf);
            self.log.commit(&entry);
        }
    }
}

impl<'a> MakeWriter<'a> for RunLog {
    type Writer = RunLogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter {
            log: self,
            buf: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_millis(1))
    }

    #[test]
    fn each_event_becomes_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("run.log"), quick());

        {
            let mut w = log.make_writer();
            w.write_all(b"first ").unwrap();
            w.write_all(b"event").unwrap();
        }
        log.line("second event").unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "first event");
        assert!(lines[1].ends_with(" second event"));
        assert!(!dir.path().join("run.log.lock").exists());
    }

    #[test]
    fn held_lock_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("run.log"), quick());
        let _held = AdvisoryLock::acquire(log.path()).unwrap();

        assert!(log.line("blocked").is_err());
        // Dropped entries never panic the caller.
        log.make_writer().write_all(b"dropped\n").unwrap();
        assert!(!log.path().exists());
    }

    #[test]
    fn works_as_tracing_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log");
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(RunLog::new(&path, quick()))
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(host = "UKPRAP216", "gate evaluated");
        });
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("gate evaluated"));
        assert!(content.contains("host=\"UKPRAP216\""));
    }
}
