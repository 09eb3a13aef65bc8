//! Backing-device factory.
//!
//! `quotactl` needs a path to a block-special file on the filesystem it
//! is asked about. The factory materialises one inside the controlled
//! root, pointing at the device that contains the root, so the file
//! travels with the tree if it is rehomed and always names the device
//! the kernel would charge writes under the tree to.

use std::path::{Path, PathBuf};

use volq_error::{Result, VolqError};
use volq_types::BLOCK_DEVICE_NAME;

use crate::QuotaBackend;

/// Idempotently (re)create the backing device at
/// `<root>/__control-device`.
///
/// Unlink-then-mknod rather than create-if-absent: the underlying device
/// number may have changed since the file was made (tree copied to a new
/// disk, device renumbered across reboots), so a stale node must never
/// survive construction.
pub(crate) fn ensure_backing_device(backend: &dyn QuotaBackend, root: &Path) -> Result<PathBuf> {
    let init_err = |source| VolqError::BackingDeviceInit {
        path: root.to_path_buf(),
        source,
    };

    let dev = backend.device_of(root).map_err(init_err)?;
    let path = root.join(BLOCK_DEVICE_NAME);
    backend.unlink_if_exists(&path).map_err(init_err)?;
    backend.mknod_block(&path, dev).map_err(init_err)?;

    tracing::debug!(
        path = %path.display(),
        major = dev.major(),
        minor = dev.minor(),
        "backing device ready"
    );
    Ok(path)
}
