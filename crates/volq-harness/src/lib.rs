#![forbid(unsafe_code)]
//! Test support for exercising quota enforcement.
//!
//! The e2e suites need two knobs: filling a directory with inodes and
//! filling it with bytes, both in ways that surface `EDQUOT` as a plain
//! `io::Error`. They also need a real XFS mount, which CI machines
//! rarely have; [`xfs_test_root`] reads it from the environment so the
//! suites can be run by hand with
//! `VOLQ_TEST_XFS_MOUNT=/mnt/xfs cargo test -- --ignored`.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable naming a directory on an XFS mount with
/// `prjquota` enabled.
pub const XFS_MOUNT_ENV: &str = "VOLQ_TEST_XFS_MOUNT";

/// The configured XFS test mount, if any.
#[must_use]
pub fn xfs_test_root() -> Option<PathBuf> {
    std::env::var_os(XFS_MOUNT_ENV).map(PathBuf::from)
}

/// A scratch directory on the XFS test mount, removed on drop.
pub fn xfs_scratch_dir() -> Result<tempfile::TempDir> {
    let root = xfs_test_root()
        .with_context(|| format!("{XFS_MOUNT_ENV} must point at an XFS mount"))?;
    tempfile::TempDir::new_in(&root)
        .with_context(|| format!("failed to create scratch dir under {}", root.display()))
}

/// Create `n` empty files under `base`, stopping at the first failure.
pub fn create_files(base: &Path, n: usize) -> std::io::Result<()> {
    for i in 0..n {
        File::create(base.join(i.to_string()))?.sync_all()?;
    }
    Ok(())
}

/// Write `len` copies of `byte` to `writer` in 4 KiB chunks, returning
/// the first write error (quota exhaustion arrives as `EDQUOT` here).
pub fn write_bytes(writer: &mut impl Write, byte: u8, len: u64) -> std::io::Result<()> {
    let chunk = [byte; 4096];
    let mut remaining = len;
    while remaining > 0 {
        let take = remaining.min(chunk.len() as u64) as usize;
        writer.write_all(&chunk[..take])?;
        remaining -= take as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn create_files_populates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        create_files(dir.path(), 10).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 10);
    }

    #[test]
    fn write_bytes_writes_exactly_len() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let mut file = File::create(&path).unwrap();
        write_bytes(&mut file, b'x', 10_000).unwrap();
        file.sync_all().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 10_000);
    }
}
