//! PID file and process liveness helpers
//!
//! The daemon records its pid so `serve` refuses to start twice; the
//! registry uses the same liveness check to reap dead bridges.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::config;

/// Default PID file name
const PID_FILE_NAME: &str = "daemon.pid";

/// Get the default PID file path
pub fn default_pid_path() -> PathBuf {
    config::default_config_dir().join(PID_FILE_NAME)
}

/// Read the PID from the PID file
///
/// Returns `Ok(Some(pid))` if the file exists and contains a valid PID,
/// `Ok(None)` if the file doesn't exist, or an error if the file is malformed.
pub fn read_pid_file(path: &Path) -> io::Result<Option<u32>> {
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let pid = contents
                .trim()
                .parse::<u32>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(pid))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write the current process PID to the PID file
///
/// Creates parent directories if they don't exist.
pub fn write_pid_file(path: &Path, pid: u32) -> io::Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", pid)?;
    Ok(())
}

/// Remove the PID file
///
/// Returns `Ok(())` even if the file doesn't exist.
pub fn remove_pid_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Check if a process with the given PID is still alive
///
/// On Unix, uses kill(pid, 0) to check if the process exists.
/// On Windows, uses OpenProcess to check if the process exists.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // kill(pid, 0) returns 0 if the process exists and we have permission to signal it
    // ESRCH (No such process) indicates the process doesn't exist
    // EPERM (Operation not permitted) indicates the process exists but we can't signal it
    unsafe {
        let result = libc::kill(pid as libc::pid_t, 0);
        if result == 0 {
            return true;
        }
        // Check if error is EPERM (process exists but we can't signal it)
        // Use std::io::Error to get errno in a cross-platform way
        let err = std::io::Error::last_os_error();
        err.raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

/// Pid of a live daemon recorded at `path`.
///
/// A pid file pointing at a dead process is stale and gets removed.
pub fn running_daemon_pid(path: &Path) -> io::Result<Option<u32>> {
    match read_pid_file(path)? {
        Some(pid) if pid != std::process::id() && is_process_alive(pid) => Ok(Some(pid)),
        Some(pid) => {
            tracing::debug!("Removing stale PID file {:?} (pid {})", path, pid);
            remove_pid_file(path)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Send SIGTERM to a process
#[cfg(unix)]
pub fn terminate_process(pid: u32) -> io::Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn terminate_process(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signals are not supported on this platform",
    ))
}

/// Guard that removes the PID file when dropped
///
/// Useful for ensuring the PID file is cleaned up even on panic.
pub struct PidFileGuard {
    path: PathBuf,
}

impl PidFileGuard {
    /// Create a new guard and write the PID file
    pub fn new(path: PathBuf, pid: u32) -> io::Result<Self> {
        write_pid_file(&path, pid)?;
        Ok(Self { path })
    }

    /// Path of the guarded file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_pid_file(&self.path) {
            tracing::warn!("Failed to remove PID file {:?}: {}", self.path, e);
        }
    }
}
