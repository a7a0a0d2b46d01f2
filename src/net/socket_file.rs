//! Unix socket file hygiene.
//!
//! # Responsibilities
//! - Classify what currently occupies a configured socket path
//! - Remove stale sockets left behind by a previous instance
//! - Refuse to touch anything at the path that is not a socket
//! - Force permission bits onto the socket file after bind
//!
//! # Design Decisions
//! - Classification uses `lstat`, so a symlink is never followed into a delete
//! - `chmod` is used instead of relying on the umask at bind time
//! - Every removal tolerates `NotFound`, the path may vanish between check and unlink

use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::{CleanupError, SocketFileError};
use crate::net::transport::SocketMode;

/// What occupies a socket path on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketFileState {
    Absent,
    RegularFile,
    SocketFile,
    /// Directory, symlink, fifo, device.
    Other,
}

impl fmt::Display for SocketFileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SocketFileState::Absent => "nothing",
            SocketFileState::RegularFile => "regular file",
            SocketFileState::SocketFile => "socket",
            SocketFileState::Other => "non-socket file",
        };
        f.write_str(label)
    }
}

/// Guards one Unix socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketFileGuard {
    path: PathBuf,
}

impl SocketFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inspect the path without following symlinks.
    pub fn state(&self) -> io::Result<SocketFileState> {
        match fs::symlink_metadata(&self.path) {
            Ok(meta) => {
                let file_type = meta.file_type();
                Ok(if file_type.is_socket() {
                    SocketFileState::SocketFile
                } else if file_type.is_file() {
                    SocketFileState::RegularFile
                } else {
                    SocketFileState::Other
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SocketFileState::Absent),
            Err(e) => Err(e),
        }
    }

    /// Make the path available for a fresh bind.
    ///
    /// Returns `true` when a stale socket was removed. Anything at the path
    /// that is not a socket is left untouched and reported as a conflict.
    pub fn ensure_clear(&self) -> Result<bool, SocketFileError> {
        let state = self.state().map_err(|source| SocketFileError::Inspect {
            path: self.path.clone(),
            source,
        })?;

        match state {
            SocketFileState::Absent => Ok(false),
            SocketFileState::SocketFile => match fs::remove_file(&self.path) {
                Ok(()) => {
                    tracing::info!(path = %self.path.display(), "Removed stale socket");
                    Ok(true)
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(source) => Err(SocketFileError::Remove {
                    path: self.path.clone(),
                    source,
                }),
            },
            SocketFileState::RegularFile | SocketFileState::Other => {
                Err(SocketFileError::PathConflict {
                    path: self.path.clone(),
                    state,
                })
            }
        }
    }

    /// Force `mode` onto the socket file. Only meaningful after bind.
    pub fn apply_permissions(&self, mode: SocketMode) -> Result<(), SocketFileError> {
        fs::set_permissions(&self.path, fs::Permissions::from_mode(mode.bits())).map_err(
            |source| SocketFileError::Permissions {
                path: self.path.clone(),
                mode,
                source,
            },
        )?;
        tracing::debug!(path = %self.path.display(), mode = %mode, "Socket permissions applied");
        Ok(())
    }

    /// Best-effort removal at shutdown.
    ///
    /// Returns `true` if a socket was removed, `false` if there was nothing
    /// to do (already gone, or the path is no longer a socket).
    pub fn cleanup(&self) -> Result<bool, CleanupError> {
        let state = self.state().map_err(|source| CleanupError {
            path: self.path.clone(),
            source,
        })?;

        match state {
            SocketFileState::SocketFile => match fs::remove_file(&self.path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(source) => Err(CleanupError {
                    path: self.path.clone(),
                    source,
                }),
            },
            SocketFileState::Absent => Ok(false),
            other => {
                tracing::warn!(
                    path = %self.path.display(),
                    state = %other,
                    "Socket path no longer holds a socket, leaving it in place"
                );
                Ok(false)
            }
        }
    }
}
