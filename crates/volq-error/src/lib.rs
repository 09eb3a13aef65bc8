#![forbid(unsafe_code)]
//! Error types for volq.
//!
//! Defines `VolqError` and a `Result<T>` alias used throughout the
//! workspace, plus `SysError`, the kernel-boundary error that carries the
//! syscall name and the offending argument. Nothing in volq retries: every
//! kernel failure is surfaced upward unchanged in kind.

use std::path::{Path, PathBuf};
use thiserror::Error;
use volq_types::{NameError, ProjectId};

/// A failed syscall, annotated with its name and argument.
#[derive(Debug, Error)]
#[error("{syscall}({arg}) failed: {source}")]
pub struct SysError {
    /// Name of the syscall or ioctl request that failed.
    pub syscall: &'static str,
    /// The argument the kernel rejected (usually a path).
    pub arg: String,
    #[source]
    pub source: std::io::Error,
}

impl SysError {
    /// Wrap the current `errno` for `syscall` applied to `arg`.
    #[must_use]
    pub fn last_os(syscall: &'static str, arg: impl Into<String>) -> Self {
        Self {
            syscall,
            arg: arg.into(),
            source: std::io::Error::last_os_error(),
        }
    }

    /// Like [`SysError::last_os`], with a path argument.
    #[must_use]
    pub fn last_os_path(syscall: &'static str, path: &Path) -> Self {
        Self::last_os(syscall, path.display().to_string())
    }

    /// The raw OS errno, when one was captured.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        self.source.raw_os_error()
    }
}

/// Unified error type for all volq operations.
#[derive(Debug, Error)]
pub enum VolqError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("base path {0} is not writable")]
    NotWritable(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("{0} not found")]
    NotFound(PathBuf),

    #[error("{0} is not on an XFS filesystem")]
    NotXfs(PathBuf),

    #[error("project quotas are not active on {dev}")]
    QuotaUnsupported {
        dev: PathBuf,
        #[source]
        source: Option<SysError>,
    },

    #[error("{path} is outside the controlled tree rooted at {root}")]
    OutsideTree { path: PathBuf, root: PathBuf },

    #[error("no project id registered for {0}")]
    NotRegistered(PathBuf),

    #[error("failed to create backing device at {path}: {source}")]
    BackingDeviceInit { path: PathBuf, source: SysError },

    #[error("project-id attribute access on {path} failed: {source}")]
    ProjectIdIo { path: PathBuf, source: SysError },

    #[error("failed to program quota for project {project_id} on {dev}: {source}")]
    QuotaWriteFailed {
        dev: PathBuf,
        project_id: ProjectId,
        source: SysError,
    },

    #[error("failed to read quota for project {project_id} on {dev}: {source}")]
    QuotaReadFailed {
        dev: PathBuf,
        project_id: ProjectId,
        source: SysError,
    },

    #[error(transparent)]
    NameInvalid(#[from] NameError),

    #[error("quota size must be greater than zero")]
    EmptyQuota,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias using `VolqError`.
pub type Result<T> = std::result::Result<T, VolqError>;
