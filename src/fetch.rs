//! Getting the raw bytes of a mailbox source.
//!
//! The sync engine only sees the [`MailboxFetcher`] trait. [`DirectFetcher`]
//! reads the file itself; [`PrivilegedFetcher`] falls back to an external
//! command (by default `sudo -n cat <path>`) when the file is not readable
//! by the current user, bounded by a timeout.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ReaderConfig;
use crate::error::{ArchiveError, Result};

/// Interval between checks on a running privileged command.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Source of raw mailbox bytes.
pub trait MailboxFetcher {
    /// Read the complete mailbox at `path`.
    fn fetch(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Reads mailboxes with the current user's permissions only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectFetcher;

impl MailboxFetcher for DirectFetcher {
    fn fetch(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| open_error(path, e))
    }
}

/// Reads directly when possible, otherwise through an external command.
#[derive(Debug, Clone)]
pub struct PrivilegedFetcher {
    /// Program and leading arguments; the mailbox path is appended.
    command: Vec<String>,
    timeout: Duration,
}

impl PrivilegedFetcher {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &ReaderConfig) -> Self {
        Self::new(config.privileged_command.clone(), config.timeout())
    }

    /// Run the configured command for `path` and collect its stdout.
    fn run_command(&self, path: &Path) -> Result<Vec<u8>> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(ArchiveError::MailboxUnreadable {
                path: path.to_path_buf(),
                reason: "permission denied and no privileged command configured".to_string(),
            });
        };

        debug!(program = %program, path = %path.display(), "Spawning privileged reader");
        let mut child = Command::new(program)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ArchiveError::MailboxUnreadable {
                path: path.to_path_buf(),
                reason: format!("could not run {program}: {e}"),
            })?;

        // Drain both pipes on their own threads so a large mailbox cannot
        // block the child on a full pipe.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(path = %path.display(), timeout = ?self.timeout, "Privileged reader timed out");
                    return Err(ArchiveError::ReaderTimeout {
                        path: path.to_path_buf(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(ArchiveError::io(path, e)),
            }
        };

        let stdout = join(stdout);
        let stderr = join(stderr);

        if !status.success() {
            return Err(ArchiveError::ReaderFailed {
                path: path.to_path_buf(),
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

impl MailboxFetcher for PrivilegedFetcher {
    fn fetch(&self, path: &Path) -> Result<Vec<u8>> {
        match std::fs::read(path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                debug!(path = %path.display(), "Mailbox not directly readable");
                self.run_command(path)
            }
            Err(e) => Err(open_error(path, e)),
        }
    }
}

fn open_error(path: &Path, e: std::io::Error) -> ArchiveError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ArchiveError::MailboxNotFound(path.to_path_buf())
    } else {
        ArchiveError::MailboxUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
