#![forbid(unsafe_code)]
//! XFS project-quota controller.
//!
//! [`Control`] turns a directory on an XFS mount into a controlled root
//! under which each child directory can be given hard disk-size and
//! inode limits. It composes three pieces: a backing block-device file
//! for `quotactl` to address ([`backing`]), an in-memory registry of
//! directory → project-id bindings primed by scanning the root
//! ([`registry`]), and the syscall adapter behind the [`QuotaBackend`]
//! seam. The filesystem holds the durable state (project ids live in
//! inode attributes, limits in the XFS superblock); two processes
//! sharing a root converge by rescanning.

mod backing;
mod path;
mod registry;

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use volq_error::{Result, SysError, VolqError};
use volq_sys::Dev;
use volq_types::{is_reserved_name, ProjectId, Quota};

use registry::Registry;

// ── Backend seam ────────────────────────────────────────────────────────────

/// The kernel surface the controller runs on.
///
/// One real implementation exists, [`XfsBackend`]; tests substitute an
/// in-memory one. Quota control for other filesystems would slot in
/// here, but none is provided: the controller is deliberately
/// specialised to XFS project quotas.
pub trait QuotaBackend: Send + Sync {
    fn device_of(&self, path: &Path) -> std::result::Result<Dev, SysError>;
    fn mknod_block(&self, path: &Path, dev: Dev) -> std::result::Result<(), SysError>;
    fn unlink_if_exists(&self, path: &Path) -> std::result::Result<(), SysError>;
    fn get_project_id(&self, dir: &Path) -> std::result::Result<ProjectId, SysError>;
    fn set_project_id(&self, dir: &Path, id: ProjectId) -> std::result::Result<(), SysError>;
    fn set_project_quota(
        &self,
        dev: &Path,
        id: ProjectId,
        size_bytes: u64,
        inode_count: u64,
    ) -> std::result::Result<(), SysError>;
    fn get_project_quota(&self, dev: &Path, id: ProjectId)
        -> std::result::Result<Quota, SysError>;
    fn is_quota_enabled(&self, dev: &Path) -> std::result::Result<bool, SysError>;
    fn is_xfs(&self, path: &Path) -> std::result::Result<bool, SysError>;
    fn is_dir(&self, path: &Path) -> std::result::Result<bool, SysError>;
    fn is_writable(&self, path: &Path) -> std::result::Result<bool, SysError>;
}

/// The real backend: straight delegation to the syscall adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct XfsBackend;

impl QuotaBackend for XfsBackend {
    fn device_of(&self, path: &Path) -> std::result::Result<Dev, SysError> {
        volq_sys::device_of(path)
    }

    fn mknod_block(&self, path: &Path, dev: Dev) -> std::result::Result<(), SysError> {
        volq_sys::mknod_block(path, dev)
    }

    fn unlink_if_exists(&self, path: &Path) -> std::result::Result<(), SysError> {
        volq_sys::unlink_if_exists(path)
    }

    fn get_project_id(&self, dir: &Path) -> std::result::Result<ProjectId, SysError> {
        volq_sys::get_project_id(dir)
    }

    fn set_project_id(&self, dir: &Path, id: ProjectId) -> std::result::Result<(), SysError> {
        volq_sys::set_project_id(dir, id)
    }

    fn set_project_quota(
        &self,
        dev: &Path,
        id: ProjectId,
        size_bytes: u64,
        inode_count: u64,
    ) -> std::result::Result<(), SysError> {
        volq_sys::set_project_quota(dev, id, size_bytes, inode_count)
    }

    fn get_project_quota(
        &self,
        dev: &Path,
        id: ProjectId,
    ) -> std::result::Result<Quota, SysError> {
        volq_sys::get_project_quota(dev, id)
    }

    fn is_quota_enabled(&self, dev: &Path) -> std::result::Result<bool, SysError> {
        volq_sys::is_quota_enabled(dev)
    }

    fn is_xfs(&self, path: &Path) -> std::result::Result<bool, SysError> {
        volq_sys::is_xfs(path)
    }

    fn is_dir(&self, path: &Path) -> std::result::Result<bool, SysError> {
        volq_sys::is_dir(path)
    }

    fn is_writable(&self, path: &Path) -> std::result::Result<bool, SysError> {
        volq_sys::is_writable(path)
    }
}

// ── Facade ──────────────────────────────────────────────────────────────────

/// Configuration for [`Control::new`].
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Absolute path to the controlled root. Must exist, be a writable
    /// directory, and sit on an XFS mount with project quotas enabled.
    pub base_path: PathBuf,
    /// Optional floor for project-id allocation; ids at or below the
    /// floor are never handed out. Useful when an operator reserves a
    /// low range for out-of-band `xfs_quota` management.
    pub starting_project_id: Option<u32>,
}

/// Per-directory quota controller over one controlled root.
pub struct Control {
    base_path: PathBuf,
    backing_dev: PathBuf,
    backend: Box<dyn QuotaBackend>,
    registry: RwLock<Registry>,
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control")
            .field("base_path", &self.base_path)
            .field("backing_dev", &self.backing_dev)
            .finish_non_exhaustive()
    }
}

impl Control {
    /// Initialise quota control under `cfg.base_path`.
    ///
    /// Validates the root, (re)creates the backing device, seeds the
    /// registry from the directories already present, then probes the
    /// mount by programming a zero quota on the next free project id.
    /// The probe id stays consumed — one id per construction, out of a
    /// 2³² space — so a registered id can never collide with it.
    pub fn new(cfg: ControlConfig) -> Result<Self> {
        Self::with_backend(cfg, Box::new(XfsBackend))
    }

    /// Like [`Control::new`] with an explicit backend.
    pub fn with_backend(cfg: ControlConfig, backend: Box<dyn QuotaBackend>) -> Result<Self> {
        let base_path = cfg.base_path;
        if base_path.as_os_str().is_empty() {
            return Err(VolqError::InvalidConfig("base path must be provided".into()));
        }
        if !base_path.is_absolute() {
            return Err(VolqError::InvalidConfig(format!(
                "base path {} must be absolute",
                base_path.display()
            )));
        }
        match backend.is_dir(&base_path) {
            Ok(true) => {}
            Ok(false) => return Err(VolqError::NotADirectory(base_path)),
            Err(err) if err.source.kind() == std::io::ErrorKind::NotFound => {
                return Err(VolqError::NotFound(base_path))
            }
            Err(err) => return Err(VolqError::Io(err.source)),
        }
        if !backend.is_writable(&base_path).map_err(io_fallback)? {
            return Err(VolqError::NotWritable(base_path));
        }
        if !backend.is_xfs(&base_path).map_err(io_fallback)? {
            return Err(VolqError::NotXfs(base_path));
        }

        let backing_dev = backing::ensure_backing_device(backend.as_ref(), &base_path)?;

        if !backend.is_quota_enabled(&backing_dev).map_err(io_fallback)? {
            return Err(VolqError::QuotaUnsupported {
                dev: backing_dev,
                source: None,
            });
        }

        let mut registry = Registry::new(cfg.starting_project_id.unwrap_or(0));
        registry.seed(&base_path, backend.as_ref())?;

        // Capability probe: an XFS mount can have accounting on but
        // refuse limit updates. Surfacing that here beats surfacing it
        // on the first volume creation.
        let probe_id = registry.next_id();
        backend
            .set_project_quota(&backing_dev, probe_id, 0, 0)
            .map_err(|source| VolqError::QuotaUnsupported {
                dev: backing_dev.clone(),
                source: Some(source),
            })?;
        registry.consume(probe_id);

        debug!(
            base_path = %base_path.display(),
            last_project_id = registry.last_id(),
            seeded = registry.len(),
            "quota control initialised"
        );

        Ok(Self {
            base_path,
            backing_dev,
            backend,
            registry: RwLock::new(registry),
        })
    }

    /// Bind a project id to `target` (allocating one on first use) and
    /// program its limits.
    ///
    /// `target` must be an existing directory strictly under the base
    /// path; the check runs on a lexically normalised path. The id is
    /// written to the directory's inode attributes before the in-memory
    /// binding is recorded, so a failure there leaves no trace, while a
    /// failure programming the limits leaves the (idempotent, harmless)
    /// binding in place.
    pub fn set_quota(&self, target: &Path, quota: Quota) -> Result<()> {
        let target = self.contained(target)?;
        match self.backend.is_dir(&target) {
            Ok(true) => {}
            Ok(false) => return Err(VolqError::NotADirectory(target)),
            Err(err) if err.source.kind() == std::io::ErrorKind::NotFound => {
                return Err(VolqError::NotFound(target))
            }
            Err(err) => return Err(VolqError::Io(err.source)),
        }

        let mut registry = self.registry.write();
        let project_id = match registry.get(&target) {
            Some(id) => id,
            None => {
                let id = registry.next_id();
                self.backend
                    .set_project_id(&target, id)
                    .map_err(|source| VolqError::ProjectIdIo {
                        path: target.clone(),
                        source,
                    })?;
                registry.insert(target.clone(), id);
                debug!(project_id = id.0, target = %target.display(), "bound new project id");
                id
            }
        };

        debug!(
            project_id = project_id.0,
            target = %target.display(),
            size_bytes = quota.size_bytes,
            inode_count = quota.inode_count,
            "setting quota"
        );
        self.backend
            .set_project_quota(
                &self.backing_dev,
                project_id,
                quota.size_bytes,
                quota.inode_count,
            )
            .map_err(|source| VolqError::QuotaWriteFailed {
                dev: self.backing_dev.clone(),
                project_id,
                source,
            })
    }

    /// Limits and usage for a directory previously configured with
    /// [`Control::set_quota`] (in this process or an earlier one — the
    /// registry is seeded from disk). An unknown path is
    /// [`VolqError::NotRegistered`], distinct from a quota read failure.
    pub fn get_quota(&self, target: &Path) -> Result<Quota> {
        let target = path::normalize_absolute(target)
            .ok_or_else(|| VolqError::NotRegistered(target.to_path_buf()))?;
        let registry = self.registry.read();
        let project_id = registry
            .get(&target)
            .ok_or(VolqError::NotRegistered(target))?;
        self.backend
            .get_project_quota(&self.backing_dev, project_id)
            .map_err(|source| VolqError::QuotaReadFailed {
                dev: self.backing_dev.clone(),
                project_id,
                source,
            })
    }

    /// Project id bound to `target`, if any.
    pub fn project_id_of(&self, target: &Path) -> Option<ProjectId> {
        let target = path::normalize_absolute(target)?;
        self.registry.read().get(&target)
    }

    /// Immediate child directories of the root that may hold volumes.
    /// The reserved backing-device names are never listed.
    pub fn list_volumes(&self) -> Result<Vec<PathBuf>> {
        let mut volumes = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if is_reserved_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            volumes.push(entry.path());
        }
        volumes.sort();
        Ok(volumes)
    }

    /// Path of the backing block-device file.
    #[must_use]
    pub fn backing_device_path(&self) -> &Path {
        &self.backing_dev
    }

    /// The controlled root.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Normalise `target` and enforce containment in the base path.
    fn contained(&self, target: &Path) -> Result<PathBuf> {
        let outside = || VolqError::OutsideTree {
            path: target.to_path_buf(),
            root: self.base_path.clone(),
        };
        let normalized = path::normalize_absolute(target).ok_or_else(outside)?;
        if !path::is_strictly_under(&self.base_path, &normalized) {
            return Err(outside());
        }
        Ok(normalized)
    }
}

fn io_fallback(err: SysError) -> VolqError {
    VolqError::Io(err.source)
}
