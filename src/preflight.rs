//! Startup checks for the socket and backing file paths.
//!
//! Everything here runs before the listener binds; any failure is fatal to
//! the process.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Longest socket path `sun_path` can hold, minus the trailing NUL.
#[cfg(target_os = "linux")]
pub const MAX_SOCKET_PATH_LEN: usize = 107;
#[cfg(not(target_os = "linux"))]
pub const MAX_SOCKET_PATH_LEN: usize = 103;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("The socket path {} is too long: {len} bytes, the limit is {max}", .path.display())]
    SocketPathTooLong { path: PathBuf, len: usize, max: usize },

    #[error("The parent directory for the socket path does not exist: {}", .0.display())]
    SocketParentMissing(PathBuf),

    #[error("The specified socket path is a directory: {}", .0.display())]
    SocketPathIsDirectory(PathBuf),

    #[error("The specified file path is a directory: {}", .0.display())]
    FilePathIsDirectory(PathBuf),

    #[error("The file at {} is not writable", .0.display())]
    FileNotWritable(PathBuf),

    #[error("Couldn't prepare {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PreflightError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Validate the socket path. Nothing is created or removed.
pub fn check_socket_path(socket_path: &Path) -> Result<(), PreflightError> {
    let absolute =
        std::path::absolute(socket_path).map_err(|e| PreflightError::io(socket_path, e))?;

    let len = absolute.as_os_str().len();
    if len > MAX_SOCKET_PATH_LEN {
        return Err(PreflightError::SocketPathTooLong {
            path: absolute,
            len,
            max: MAX_SOCKET_PATH_LEN,
        });
    }

    match absolute.parent() {
        Some(parent) if parent.is_dir() => {}
        _ => return Err(PreflightError::SocketParentMissing(absolute)),
    }

    if absolute.is_dir() {
        return Err(PreflightError::SocketPathIsDirectory(absolute));
    }

    Ok(())
}

/// Make sure the backing file (and its parent directory) exists and is writable.
pub fn prepare_backing_file(file_path: &Path) -> Result<(), PreflightError> {
    if file_path.is_dir() {
        return Err(PreflightError::FilePathIsDirectory(file_path.to_path_buf()));
    }

    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| PreflightError::io(parent, e))?;
            info!(path = %parent.display(), "Created parent directory for backing file");
        }
    }

    let existed = file_path.exists();
    if existed {
        let metadata = fs::metadata(file_path).map_err(|e| PreflightError::io(file_path, e))?;
        if metadata.permissions().readonly() {
            return Err(PreflightError::FileNotWritable(file_path.to_path_buf()));
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                PreflightError::FileNotWritable(file_path.to_path_buf())
            }
            _ => PreflightError::io(file_path, e),
        })?;

    if !existed {
        info!(path = %file_path.display(), "Created backing file");
    }
    debug!(path = %file_path.display(), "Backing file is ready");
    Ok(())
}

/// Run every startup check for a socket/file pair.
pub fn check(socket_path: &Path, file_path: &Path) -> Result<(), PreflightError> {
    check_socket_path(socket_path)?;
    prepare_backing_file(file_path)
}
