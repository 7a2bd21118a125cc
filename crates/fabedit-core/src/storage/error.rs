//! Errors for the files fabedit writes: autosave snapshots, settings and
//! exported catalogs

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// What was being done to a file when an I/O error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
        })
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cannot create directory {}: {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Permission denied: cannot {op} {}", .path.display())]
    PermissionDenied {
        op: Operation,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Out of disk space writing {}", .path.display())]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} does not exist", .path.display())]
    NotFound { path: PathBuf },

    /// Any other I/O failure
    #[error("Cannot {op} {}: {source}", .path.display())]
    Io {
        op: Operation,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file exists but is not a snapshot
    #[error("{} is not a valid autosave snapshot: {details}", .path.display())]
    InvalidSnapshot { path: PathBuf, details: String },

    #[error("Cannot encode snapshot for {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The final rename of an atomic write failed; the temp file is left behind
    #[error("Cannot move {} into place at {}: {source}", .from.display(), .to.display())]
    Replace {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Classify an I/O error on `path`
    pub fn io(op: Operation, error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                op,
                path,
                source: error,
            },
            io::ErrorKind::NotFound => StorageError::NotFound { path },
            _ if op == Operation::Write && is_out_of_space(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::Io {
                op,
                path,
                source: error,
            },
        }
    }

    /// The file the error is about
    pub fn path(&self) -> &Path {
        match self {
            StorageError::CreateDirectory { path, .. }
            | StorageError::PermissionDenied { path, .. }
            | StorageError::DiskFull { path, .. }
            | StorageError::NotFound { path }
            | StorageError::Io { path, .. }
            | StorageError::InvalidSnapshot { path, .. }
            | StorageError::Encode { path, .. } => path,
            StorageError::Replace { to, .. } => to,
        }
    }

    /// Whether the user can fix the cause and retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::DiskFull { .. }
                | StorageError::PermissionDenied { .. }
                | StorageError::InvalidSnapshot { .. }
                | StorageError::CreateDirectory { .. }
        )
    }

    /// A hint for the user, if there is a useful one
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => {
                Some("Check the permissions of the file and of fabedit's data directory.")
            }
            StorageError::InvalidSnapshot { .. } => {
                Some("Delete the snapshot with `fabedit autosave clear`.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Set data_dir to a writable location with `fabedit config set data_dir <path>`.")
            }
            _ => None,
        }
    }
}

/// ENOSPC on Unix, ERROR_DISK_FULL on Windows, or a message saying so
fn is_out_of_space(error: &io::Error) -> bool {
    #[cfg(unix)]
    const OUT_OF_SPACE: i32 = 28;
    #[cfg(not(unix))]
    const OUT_OF_SPACE: i32 = 112;

    if error.raw_os_error() == Some(OUT_OF_SPACE) {
        return true;
    }
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left") || msg.contains("quota exceeded")
}

pub type StorageResult<T> = Result<T, StorageError>;
