//! VGA socket interception
//!
//! `incus console --type=vga` negotiates a SPICE socket and hands its path to
//! `remote-viewer`. A stand-in `remote-viewer` placed first on the child's
//! `PATH` records its arguments and exits successfully, which tells us where
//! the socket is without a viewer window ever opening.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Child;

use cs_core::InterceptionError;

/// Program name the console client launches
pub const HELPER_NAME: &str = "remote-viewer";

/// File the stand-in writes its arguments to
pub const CAPTURE_LOG: &str = "capture.log";

/// An installed stand-in helper.
///
/// Everything lives in one private temporary directory that is removed when
/// the shim is dropped, whatever the outcome of the capture.
#[derive(Debug)]
pub struct CaptureShim {
    dir: TempDir,
}

impl CaptureShim {
    /// Create the stand-in executable under `base_dir`
    pub fn install_capture(base_dir: &Path) -> Result<Self, InterceptionError> {
        std::fs::create_dir_all(base_dir).map_err(InterceptionError::Install)?;
        let dir = tempfile::Builder::new()
            .prefix("capture-")
            .tempdir_in(base_dir)
            .map_err(InterceptionError::Install)?;

        let shim = Self { dir };
        let helper = shim.bin_dir().join(HELPER_NAME);
        std::fs::write(&helper, helper_script(&shim.log_path()))
            .map_err(InterceptionError::Install)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&helper, std::fs::Permissions::from_mode(0o755))
                .map_err(InterceptionError::Install)?;
        }

        tracing::debug!("Installed capture helper at {:?}", helper);
        Ok(shim)
    }

    /// Directory holding the stand-in
    pub fn bin_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Where the stand-in records its invocation
    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join(CAPTURE_LOG)
    }

    /// `PATH` for the console client: the stand-in directory first, then
    /// this process's own search path. Only ever set on the child.
    pub fn search_path(&self) -> OsString {
        let mut dirs = vec![self.bin_dir().to_path_buf()];
        if let Some(current) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&current));
        }
        std::env::join_paths(dirs).unwrap_or_else(|_| self.bin_dir().as_os_str().to_owned())
    }
}

fn helper_script(log_path: &Path) -> String {
    let log = log_path.display().to_string().replace('\'', r"'\''");
    format!(
        "#!/bin/sh\n\
         printf '%s\\n' \"$*\" > '{log}.tmp' && mv '{log}.tmp' '{log}'\n\
         exit 0\n"
    )
}

/// Extract the socket path from the recorded helper arguments.
///
/// Understands both `unix-socket=<path>` option strings and
/// `spice+unix://<path>` URIs.
pub fn parse_capture(content: &str) -> Option<PathBuf> {
    for token in content.split_whitespace() {
        if let Some(idx) = token.find("unix-socket=") {
            let rest = &token[idx + "unix-socket=".len()..];
            let path = rest.split(',').next().unwrap_or_default();
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        if let Some(rest) = token.strip_prefix("spice+unix://") {
            let path = rest.split('?').next().unwrap_or_default();
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
    }
    None
}

/// Poll `log_path` until the stand-in records a socket path.
///
/// The returned path exists at the time of return. A log that never shows
/// up fails with [`InterceptionError::Timeout`]; a path that was captured
/// but has already disappeared fails with [`InterceptionError::SocketMissing`].
pub async fn await_capture(
    log_path: &Path,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<PathBuf, InterceptionError> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if let Ok(content) = tokio::fs::read_to_string(log_path).await {
            if let Some(socket) = parse_capture(&content) {
                if tokio::fs::try_exists(&socket).await.unwrap_or(false) {
                    tracing::debug!("Captured socket {:?}", socket);
                    return Ok(socket);
                }
                return Err(InterceptionError::SocketMissing(socket));
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(InterceptionError::Timeout {
                log_path: log_path.to_path_buf(),
                timeout,
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// A captured SPICE socket and the console client that serves it.
///
/// Dropping it kills the client and removes the socket file.
#[derive(Debug)]
pub struct CapturedSocket {
    path: PathBuf,
    client: Option<Child>,
}

impl CapturedSocket {
    pub fn new(path: PathBuf, client: Option<Child>) -> Self {
        Self { path, client }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid of the console client keeping the socket open
    pub fn client_pid(&self) -> Option<u32> {
        self.client.as_ref().and_then(|c| c.id())
    }
}

impl Drop for CapturedSocket {
    fn drop(&mut self) {
        if let Some(client) = self.client.as_mut() {
            let _ = client.start_kill();
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed captured socket {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove captured socket {:?}: {}", self.path, e),
        }
    }
}
