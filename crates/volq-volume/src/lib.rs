#![forbid(unsafe_code)]
//! Volume management over the quota controller.
//!
//! A volume is a direct child directory of the controlled root with a
//! project quota bound to it. [`Manager`] owns the naming rules and the
//! directory lifecycle and delegates every quota decision to
//! [`volq_control::Control`].

pub mod human_size;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use volq_control::{Control, ControlConfig};
use volq_error::{Result, VolqError};
use volq_types::{Quota, VolumeName};

/// Configuration for [`Manager::new`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Absolute path to the controlled root.
    pub root: PathBuf,
    /// Optional project-id allocation floor, passed through to the
    /// controller.
    pub starting_project_id: Option<u32>,
}

/// A volume as reported by listing operations.
#[derive(Debug, Clone, Serialize)]
pub struct Volume {
    pub name: VolumeName,
    pub path: PathBuf,
    pub quota: Quota,
}

/// Parameters for [`Manager::create`].
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub name: VolumeName,
    pub size_bytes: u64,
    pub inode_count: u64,
}

/// Creates, lists and deletes quota-bound volumes under one root.
pub struct Manager {
    control: Control,
}

impl Manager {
    /// Initialise the quota controller under `cfg.root` and wrap it.
    pub fn new(cfg: ManagerConfig) -> Result<Self> {
        let control = Control::new(ControlConfig {
            base_path: cfg.root,
            starting_project_id: cfg.starting_project_id,
        })?;
        Ok(Self::with_control(control))
    }

    /// Wrap an already-constructed controller.
    #[must_use]
    pub fn with_control(control: Control) -> Self {
        Self { control }
    }

    /// The controlled root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.control.base_path()
    }

    /// Absolute path a volume of this name would occupy.
    #[must_use]
    pub fn path_of(&self, name: &VolumeName) -> PathBuf {
        self.root().join(name.as_str())
    }

    /// Create the volume directory and program its quota.
    ///
    /// A zero size is rejected up front: a volume without a disk limit
    /// is just a directory. If programming the quota fails the directory
    /// is removed again, so no unlimited volume is left behind.
    pub fn create(&self, req: &CreateRequest) -> Result<PathBuf> {
        if req.size_bytes == 0 {
            return Err(VolqError::EmptyQuota);
        }

        let path = self.path_of(&req.name);
        fs::create_dir_all(&path)?;

        let quota = Quota::limits(req.size_bytes, req.inode_count);
        if let Err(err) = self.control.set_quota(&path, quota) {
            let _ = fs::remove_dir_all(&path);
            return Err(err);
        }

        info!(
            name = %req.name,
            path = %path.display(),
            size_bytes = req.size_bytes,
            inode_count = req.inode_count,
            "volume created"
        );
        Ok(path)
    }

    /// All volumes under the root with their quotas.
    ///
    /// Directories that predate quota management (no project id bound)
    /// are listed with an all-zero quota; directories whose names do not
    /// satisfy the volume-name rules are not addressable through this
    /// API and are skipped.
    pub fn list(&self) -> Result<Vec<Volume>> {
        let mut volumes = Vec::new();
        for path in self.control.list_volumes()? {
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| VolumeName::new(n).ok())
            else {
                debug!(path = %path.display(), "skipping non-volume directory");
                continue;
            };
            let quota = match self.control.get_quota(&path) {
                Ok(quota) => quota,
                Err(VolqError::NotRegistered(_)) => Quota::default(),
                Err(err) => return Err(err),
            };
            volumes.push(Volume { name, path, quota });
        }
        Ok(volumes)
    }

    /// Look a volume up by name.
    pub fn get(&self, name: &VolumeName) -> Result<Option<Volume>> {
        let path = self.path_of(name);
        if !path.is_dir() {
            return Ok(None);
        }
        let quota = match self.control.get_quota(&path) {
            Ok(quota) => quota,
            Err(VolqError::NotRegistered(_)) => Quota::default(),
            Err(err) => return Err(err),
        };
        Ok(Some(Volume {
            name: name.clone(),
            path,
            quota,
        }))
    }

    /// Remove a volume's directory tree.
    ///
    /// The project id stays allocated on the filesystem side; with a
    /// 2³² id space, leaking one per deleted volume over a mount's
    /// lifetime is an accepted trade.
    pub fn delete(&self, name: &VolumeName) -> Result<()> {
        let path = self.path_of(name);
        if !path.is_dir() {
            return Err(VolqError::NotFound(path));
        }
        fs::remove_dir_all(&path)?;
        info!(name = %name, "volume deleted");
        Ok(())
    }
}
