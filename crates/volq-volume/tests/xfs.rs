#![forbid(unsafe_code)]
//! Manager-level end-to-end tests against a real XFS mount.
//!
//! Point `VOLQ_TEST_XFS_MOUNT` at a directory on an XFS filesystem
//! mounted with `prjquota` and run
//! `cargo test -p volq-volume -- --ignored`.

use std::fs::File;

use volq_harness::{write_bytes, xfs_scratch_dir};
use volq_types::VolumeName;
use volq_volume::{CreateRequest, Manager, ManagerConfig};

const MIB: u64 = 1 << 20;

fn manager() -> (tempfile::TempDir, Manager) {
    let scratch = xfs_scratch_dir().unwrap();
    let manager = Manager::new(ManagerConfig {
        root: scratch.path().to_path_buf(),
        starting_project_id: None,
    })
    .expect("manager construction on XFS scratch dir");
    (scratch, manager)
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn created_volumes_enforce_their_disk_limit() {
    let (_scratch, manager) = manager();
    let name = VolumeName::new("vol-a").unwrap();

    let path = manager
        .create(&CreateRequest {
            name: name.clone(),
            size_bytes: MIB,
            inode_count: 0,
        })
        .unwrap();

    let mut file = File::create(path.join("file")).unwrap();
    let err = write_bytes(&mut file, b'x', 2 * MIB)
        .and_then(|()| file.sync_all())
        .unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EDQUOT));

    let vol = manager.get(&name).unwrap().expect("volume exists");
    assert_eq!(vol.quota.size_bytes, MIB);
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn listing_survives_a_manager_restart() {
    let (scratch, manager) = manager();
    manager
        .create(&CreateRequest {
            name: VolumeName::new("vol-a").unwrap(),
            size_bytes: 10 * MIB,
            inode_count: 100,
        })
        .unwrap();
    drop(manager);

    let manager = Manager::new(ManagerConfig {
        root: scratch.path().to_path_buf(),
        starting_project_id: None,
    })
    .unwrap();
    let vols = manager.list().unwrap();
    assert_eq!(vols.len(), 1);
    assert_eq!(vols[0].name.as_str(), "vol-a");
    assert_eq!(vols[0].quota.size_bytes, 10 * MIB);
    assert_eq!(vols[0].quota.inode_count, 100);
}
