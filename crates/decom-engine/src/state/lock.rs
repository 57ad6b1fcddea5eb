use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Lock files older than this are assumed abandoned by a crashed writer.
const STALE_LOCK_SECS: i64 = 60;

/// Write content atomically: write to a sibling temp file, fsync, rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let temp_path = dir.join(format!(".{}.{nanos:x}.tmp", std::process::id()));

    let mut file = std::fs::File::create(&temp_path)
        .with_context(|| format!("cannot create temp file for {}", path.display()))?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("cannot rename temp to {}", path.display()))?;
    Ok(())
}

/// Advisory lock held next to a shared file (`<file>.lock`).
///
/// The lock file holds the owner PID and a timestamp; a lock older than a
/// minute is treated as stale and taken over.
#[derive(Debug)]
pub struct AdvisoryLock {
    lock_path: PathBuf,
}

impl AdvisoryLock {
    /// Acquire the lock once. Fails if another writer holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut lock_path = path.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        if Self::is_stale(&lock_path) {
            let _ = std::fs::remove_file(&lock_path);
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                bail!("{} is locked by another writer", path.display())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("cannot acquire lock {}", lock_path.display()))
            }
        };

        let ts = chrono::Utc::now().timestamp();
        writeln!(file, "{}\n{ts}", std::process::id())
            .with_context(|| format!("cannot write lock {}", lock_path.display()))?;
        Ok(Self { lock_path })
    }

    fn is_stale(lock_path: &Path) -> bool {
        let Ok(content) = std::fs::read_to_string(lock_path) else {
            return false;
        };
        content
            .lines()
            .nth(1)
            .and_then(|ts| ts.trim().parse::<i64>().ok())
            .is_some_and(|ts| chrono::Utc::now().timestamp() - ts > STALE_LOCK_SECS)
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    pub fn release(self) -> Result<()> {
        if self.lock_path.exists() {
            std::fs::remove_file(&self.lock_path)
                .with_context(|| format!("cannot release lock {}", self.lock_path.display()))?;
        }
        Ok(())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}
