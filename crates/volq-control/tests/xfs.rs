#![forbid(unsafe_code)]
//! End-to-end tests against a real XFS mount.
//!
//! Everything except the non-XFS rejection test needs a directory on an
//! XFS filesystem mounted with `prjquota`, plus `CAP_SYS_ADMIN` for
//! `mknod` and `quotactl`. Point `VOLQ_TEST_XFS_MOUNT` at such a
//! directory and run `cargo test -p volq-control -- --ignored`.

use std::fs::{self, File};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use volq_control::{Control, ControlConfig};
use volq_error::VolqError;
use volq_harness::{create_files, write_bytes, xfs_scratch_dir};
use volq_types::{ProjectId, Quota, BLOCK_DEVICE_NAME};

const MIB: u64 = 1 << 20;

fn control_over(root: &Path) -> Control {
    Control::new(ControlConfig {
        base_path: root.to_path_buf(),
        starting_project_id: None,
    })
    .expect("control construction on XFS scratch dir")
}

fn mkdir(root: &Path, name: &str) -> std::path::PathBuf {
    let path = root.join(name);
    fs::create_dir(&path).unwrap();
    path
}

#[test]
fn construction_outside_xfs_is_rejected() {
    // A plain tempdir sits on tmpfs or the build filesystem, not on an
    // XFS mount with project quotas this process may program.
    let dir = tempfile::tempdir().unwrap();
    let err = Control::new(ControlConfig {
        base_path: dir.path().to_path_buf(),
        starting_project_id: None,
    })
    .unwrap_err();
    assert!(
        matches!(
            err,
            VolqError::NotXfs(_)
                | VolqError::BackingDeviceInit { .. }
                | VolqError::QuotaUnsupported { .. }
        ),
        "unexpected error: {err}"
    );
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn backing_device_is_a_block_special_file_for_the_root_device() {
    let scratch = xfs_scratch_dir().unwrap();
    let ctl = control_over(scratch.path());

    let dev_path = ctl.backing_device_path();
    assert_eq!(dev_path, scratch.path().join(BLOCK_DEVICE_NAME));

    let meta = fs::metadata(dev_path).unwrap();
    assert!(meta.file_type().is_block_device());
    assert_eq!(meta.rdev(), fs::metadata(scratch.path()).unwrap().dev());
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn quota_sizes_round_trip_in_512_byte_units() {
    let scratch = xfs_scratch_dir().unwrap();
    let ctl = control_over(scratch.path());
    let vol = mkdir(scratch.path(), "vol");

    ctl.set_quota(&vol, Quota::limits(MIB, 0)).unwrap();
    assert_eq!(ctl.get_quota(&vol).unwrap().size_bytes, MIB);

    // Non-multiples of 512 are truncated by the kernel interface.
    ctl.set_quota(&vol, Quota::limits(MIB + 100, 0)).unwrap();
    assert_eq!(ctl.get_quota(&vol).unwrap().size_bytes, (MIB + 100) / 512 * 512);
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn project_ids_inherit_to_children_created_afterwards() {
    let scratch = xfs_scratch_dir().unwrap();
    let parent = mkdir(scratch.path(), "parent");

    volq_sys::set_project_id(&parent, ProjectId(543)).unwrap();
    assert_eq!(volq_sys::get_project_id(&parent).unwrap(), ProjectId(543));

    let child = mkdir(&parent, "child");
    assert_eq!(volq_sys::get_project_id(&child).unwrap(), ProjectId(543));
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn disk_limits_are_enforced_per_volume() {
    let scratch = xfs_scratch_dir().unwrap();
    let ctl = control_over(scratch.path());
    let a = mkdir(scratch.path(), "a");
    let b = mkdir(scratch.path(), "b");

    ctl.set_quota(&a, Quota::limits(MIB, 0)).unwrap();
    ctl.set_quota(&b, Quota::limits(2 * MIB, 0)).unwrap();

    let mut file = File::create(a.join("file")).unwrap();
    let err = write_bytes(&mut file, b'x', 2 * MIB)
        .and_then(|()| file.sync_all())
        .unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EDQUOT));

    let mut file = File::create(b.join("file")).unwrap();
    write_bytes(&mut file, b'x', MIB).unwrap();
    file.sync_all().unwrap();
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn inode_limits_are_enforced_per_volume() {
    let scratch = xfs_scratch_dir().unwrap();
    let ctl = control_over(scratch.path());
    let a = mkdir(scratch.path(), "a");
    let b = mkdir(scratch.path(), "b");

    ctl.set_quota(&a, Quota::limits(2 * MIB, 30)).unwrap();
    ctl.set_quota(&b, Quota::limits(2 * MIB, 300)).unwrap();

    assert!(create_files(&a, 100).is_err());
    create_files(&b, 100).unwrap();
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn usage_accounting_tracks_writes() {
    let scratch = xfs_scratch_dir().unwrap();
    let ctl = control_over(scratch.path());
    let vol = mkdir(scratch.path(), "vol");
    ctl.set_quota(&vol, Quota::limits(100 * MIB, 10_000)).unwrap();

    create_files(&vol, 100).unwrap();
    let mut file = File::create(vol.join("payload")).unwrap();
    write_bytes(&mut file, b'x', MIB).unwrap();
    file.sync_all().unwrap();

    let quota = ctl.get_quota(&vol).unwrap();
    assert!(quota.used_inode_count >= 101, "used inodes: {}", quota.used_inode_count);
    assert!(quota.used_size_bytes >= MIB, "used bytes: {}", quota.used_size_bytes);
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn set_quota_outside_the_tree_is_rejected_on_xfs_too() {
    let scratch = xfs_scratch_dir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let ctl = control_over(scratch.path());

    let err = ctl
        .set_quota(outside.path(), Quota::limits(10 * MIB, 0))
        .unwrap_err();
    assert!(matches!(err, VolqError::OutsideTree { .. }));
}

#[test]
#[ignore = "requires VOLQ_TEST_XFS_MOUNT on an XFS mount with prjquota"]
fn a_second_controller_converges_on_the_same_bindings() {
    let scratch = xfs_scratch_dir().unwrap();
    let vol = mkdir(scratch.path(), "vol");

    let first = control_over(scratch.path());
    first.set_quota(&vol, Quota::limits(10 * MIB, 50)).unwrap();
    let id = first.project_id_of(&vol).unwrap();

    // A fresh process rescans the tree and sees the same binding.
    let second = control_over(scratch.path());
    assert_eq!(second.project_id_of(&vol), Some(id));
    let quota = second.get_quota(&vol).unwrap();
    assert_eq!(quota.size_bytes, 10 * MIB);
    assert_eq!(quota.inode_count, 50);
}
