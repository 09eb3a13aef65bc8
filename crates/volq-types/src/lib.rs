#![forbid(unsafe_code)]
//! Shared value types for volq.
//!
//! Defines the project-id and quota value types exchanged between the
//! syscall adapter, the quota controller and the volume manager, plus
//! the validated volume-name newtype and the reserved on-disk filenames.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name of the block-special file kept at the top of the controlled root.
///
/// The file addresses the backing device for `quotactl` and is never a
/// volume: registry seeding and volume listing must skip it.
pub const BLOCK_DEVICE_NAME: &str = "__control-device";

/// Historical name for the backing device file. Trees created by older
/// deployments still carry it, so it is treated as reserved too.
pub const LEGACY_BLOCK_DEVICE_NAME: &str = "backingFsBlockDev";

/// Whether `name` collides with a reserved backing-device filename.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    name == BLOCK_DEVICE_NAME || name == LEGACY_BLOCK_DEVICE_NAME
}

/// XFS project identifier bound to a directory via its inode attributes.
///
/// Zero is the kernel's "no project id associated" value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ProjectId(pub u32);

impl ProjectId {
    /// The "no project id" sentinel.
    pub const NONE: Self = Self(0);

    /// Whether this id denotes an actual project.
    #[must_use]
    pub fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quota limits and accounting for one project.
///
/// `size_bytes` and `inode_count` are the write side: `set_quota` programs
/// only these two. The `used_*` fields are populated on the read side.
/// A zero limit means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Quota {
    /// Maximum bytes the project may commit. Zero = unlimited.
    pub size_bytes: u64,
    /// Maximum inodes the project may allocate. Zero = unlimited.
    pub inode_count: u64,
    /// Bytes currently charged to the project.
    pub used_size_bytes: u64,
    /// Inodes currently charged to the project.
    pub used_inode_count: u64,
}

impl Quota {
    /// Limits-only quota, as passed to the write side.
    #[must_use]
    pub fn limits(size_bytes: u64, inode_count: u64) -> Self {
        Self {
            size_bytes,
            inode_count,
            used_size_bytes: 0,
            used_inode_count: 0,
        }
    }

    /// The all-zero quota: no limits on either axis.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }
}

/// Why a volume name was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("volume name is empty")]
    Empty,
    #[error("volume name {0:?} collides with the reserved backing-device filename")]
    Reserved(String),
    #[error("volume name {0:?} must be 2..=251 characters, start with an ASCII letter or digit, and continue with letters, digits, '_' or '-'")]
    Malformed(String),
}

/// Validated volume name.
///
/// Accepts `^[A-Za-z0-9][\w\-]{1,250}$` and rejects names that collide
/// with the reserved backing-device filenames. Validation happens once,
/// at construction; everything downstream can trust the inner string to
/// be a single safe path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VolumeName(String);

impl VolumeName {
    /// Validate `name` and wrap it.
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if is_reserved_name(&name) {
            return Err(NameError::Reserved(name));
        }
        if !Self::matches_pattern(&name) {
            return Err(NameError::Malformed(name));
        }
        Ok(Self(name))
    }

    fn matches_pattern(name: &str) -> bool {
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        if !first.is_ascii_alphanumeric() {
            return false;
        }
        let rest = chars.as_str();
        if rest.is_empty() || rest.len() > 250 {
            return false;
        }
        rest.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VolumeName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VolumeName> for String {
    fn from(name: VolumeName) -> Self {
        name.0
    }
}

impl AsRef<str> for VolumeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
