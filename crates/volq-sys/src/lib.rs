//! Syscall adapter for XFS project-quota control.
//!
//! Stateless wrappers around the kernel primitives the quota controller
//! needs: `stat`/`mknod`/`unlink`/`access`, the `FS_IOC_FSGETXATTR` /
//! `FS_IOC_FSSETXATTR` ioctls, and `quotactl` with the XFS quota-manager
//! commands for the project-quota type. This is the only crate in the
//! workspace that contains `unsafe`; everything above it works with
//! [`SysError`]-annotated results.
//!
//! Unit caveat, documented once here: the XFS block limits and block
//! counters (`d_blk_*`, `d_bcount`) are expressed in 512-byte basic
//! blocks. Callers of this module speak bytes; the conversion happens at
//! this boundary and nowhere else.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::mem;
use std::os::fd::AsRawFd;
use std::os::raw::{c_char, c_int};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use volq_error::SysError;
use volq_types::{ProjectId, Quota};

/// Result alias for the syscall boundary.
pub type SysResult<T> = std::result::Result<T, SysError>;

// ── Kernel ABI constants ────────────────────────────────────────────────────

/// `FS_XFLAG_PROJINHERIT`: children created under the directory inherit
/// its project id.
const FS_XFLAG_PROJINHERIT: u32 = 0x0000_0200;

/// `_IOC` direction bits.
const IOC_WRITE: libc::c_ulong = 1;
const IOC_READ: libc::c_ulong = 2;

/// `_IOC(dir, type, nr, size)` from `asm-generic/ioctl.h`.
const fn ioc(
    dir: libc::c_ulong,
    typ: libc::c_ulong,
    nr: libc::c_ulong,
    size: libc::c_ulong,
) -> libc::c_ulong {
    (dir << 30) | (size << 16) | (typ << 8) | nr
}

const FSXATTR_SIZE: libc::c_ulong = mem::size_of::<FsXattr>() as libc::c_ulong;

/// `_IOR('X', 31, struct fsxattr)`
const FS_IOC_FSGETXATTR: libc::c_ulong = ioc(IOC_READ, b'X' as libc::c_ulong, 31, FSXATTR_SIZE);
/// `_IOW('X', 32, struct fsxattr)`
const FS_IOC_FSSETXATTR: libc::c_ulong = ioc(IOC_WRITE, b'X' as libc::c_ulong, 32, FSXATTR_SIZE);

/// XFS quota-manager commands (`linux/dqblk_xfs.h`, `('X' << 8) + n`).
const Q_XGETQUOTA: c_int = 0x5803;
const Q_XSETQLIM: c_int = 0x5804;
const Q_XGETQSTAT: c_int = 0x5805;

/// Project quota type (`linux/quota.h`).
const PRJQUOTA: c_int = 2;

/// `QCMD(cmd, type)` from `linux/quota.h`.
const fn qcmd(cmd: c_int, qtype: c_int) -> c_int {
    (cmd << 8) | (qtype & 0x00ff)
}

/// `fs_disk_quota.d_version`.
const FS_DQUOT_VERSION: i8 = 1;
/// `fs_disk_quota.d_flags` value selecting the project quota type.
const FS_PROJ_QUOTA: i8 = 2;

/// `d_fieldmask` bits.
const FS_DQ_ISOFT: u16 = 1 << 0;
const FS_DQ_IHARD: u16 = 1 << 1;
const FS_DQ_BSOFT: u16 = 1 << 2;
const FS_DQ_BHARD: u16 = 1 << 3;

/// `fs_quota_stat.qs_flags` bits for project accounting/enforcement.
const FS_QUOTA_PDQ_ACCT: u16 = 1 << 4;
const FS_QUOTA_PDQ_ENFD: u16 = 1 << 5;

/// XFS superblock magic as reported by `statfs.f_type` ("XFSB").
const XFS_SUPER_MAGIC: i64 = 0x5846_5342;

/// XFS basic block: the unit of `d_blk_*` limits and `d_bcount`.
const BASIC_BLOCK_SIZE: u64 = 512;

// ── Kernel struct mirrors ───────────────────────────────────────────────────

/// `struct fsxattr` from `linux/fs.h`.
#[repr(C)]
#[allow(dead_code)] // layout mirror; the kernel reads and writes the unused fields
#[derive(Debug, Default, Clone, Copy)]
struct FsXattr {
    fsx_xflags: u32,
    fsx_extsize: u32,
    fsx_nextents: u32,
    fsx_projid: u32,
    fsx_pad: [u8; 12],
}

/// `struct fs_disk_quota` from `linux/dqblk_xfs.h`.
#[repr(C)]
#[allow(dead_code)] // layout mirror; the kernel reads and writes the unused fields
#[derive(Debug, Default, Clone, Copy)]
struct FsDiskQuota {
    d_version: i8,
    d_flags: i8,
    d_fieldmask: u16,
    d_id: u32,
    d_blk_hardlimit: u64,
    d_blk_softlimit: u64,
    d_ino_hardlimit: u64,
    d_ino_softlimit: u64,
    d_bcount: u64,
    d_icount: u64,
    d_itimer: i32,
    d_btimer: i32,
    d_iwarns: u16,
    d_bwarns: u16,
    d_padding2: i32,
    d_rtb_hardlimit: u64,
    d_rtb_softlimit: u64,
    d_rtbcount: u64,
    d_rtbtimer: i32,
    d_rtbwarns: u16,
    d_padding3: i16,
    d_padding4: [u8; 8],
}

/// `struct fs_qfilestat` from `linux/dqblk_xfs.h`.
#[repr(C)]
#[allow(dead_code)] // layout mirror; the kernel reads and writes the unused fields
#[derive(Debug, Default, Clone, Copy)]
struct FsQFileStat {
    qfs_ino: u64,
    qfs_nblks: u64,
    qfs_nextents: u32,
}

/// `struct fs_quota_stat` from `linux/dqblk_xfs.h`.
#[repr(C)]
#[allow(dead_code)] // layout mirror; the kernel reads and writes the unused fields
#[derive(Debug, Default, Clone, Copy)]
struct FsQuotaStat {
    qs_version: i8,
    qs_flags: u16,
    qs_pad: i8,
    qs_uquota: FsQFileStat,
    qs_gquota: FsQFileStat,
    qs_incoredqs: u32,
    qs_btimelimit: i32,
    qs_itimelimit: i32,
    qs_rtbtimelimit: i32,
    qs_bwarnlimit: u16,
    qs_iwarnlimit: u16,
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Device number of a filesystem object, as reported by `stat(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dev(pub libc::dev_t);

impl Dev {
    #[must_use]
    pub fn major(self) -> u32 {
        libc::major(self.0)
    }

    #[must_use]
    pub fn minor(self) -> u32 {
        libc::minor(self.0)
    }
}

fn cstr(path: &Path, syscall: &'static str) -> SysResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| SysError {
        syscall,
        arg: path.display().to_string(),
        source: std::io::Error::from_raw_os_error(libc::EINVAL),
    })
}

fn stat(path: &Path) -> SysResult<libc::stat> {
    let cpath = cstr(path, "stat")?;
    // SAFETY: zeroed stat is a valid out-parameter for stat(2).
    let mut st: libc::stat = unsafe { mem::zeroed() };
    // SAFETY: cpath is a valid NUL-terminated string, st a valid out pointer.
    let rc = unsafe { libc::stat(cpath.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(SysError::last_os_path("stat", path));
    }
    Ok(st)
}

/// Open a directory read-only for ioctl use. The returned `File` owns the
/// fd, so it is released on every exit path.
fn open_dir(path: &Path) -> SysResult<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY | libc::O_CLOEXEC)
        .open(path)
        .map_err(|source| SysError {
            syscall: "open",
            arg: path.display().to_string(),
            source,
        })
}

fn fsgetxattr(file: &File, path: &Path) -> SysResult<FsXattr> {
    let mut attr = FsXattr::default();
    // SAFETY: fd is a live directory fd; attr is a valid fsxattr out pointer.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_FSGETXATTR, &mut attr) };
    if rc != 0 {
        return Err(SysError::last_os_path("ioctl(FS_IOC_FSGETXATTR)", path));
    }
    Ok(attr)
}

// ── Public operations ───────────────────────────────────────────────────────

/// Device number of the filesystem containing `path`.
pub fn device_of(path: &Path) -> SysResult<Dev> {
    Ok(Dev(stat(path)?.st_dev))
}

/// Whether `path` exists and is a directory.
pub fn is_dir(path: &Path) -> SysResult<bool> {
    Ok(stat(path)?.st_mode & libc::S_IFMT == libc::S_IFDIR)
}

/// Whether the process may write to `path` (`access(2)` with `W_OK`).
pub fn is_writable(path: &Path) -> SysResult<bool> {
    let cpath = cstr(path, "access")?;
    // SAFETY: cpath is a valid NUL-terminated string.
    let rc = unsafe { libc::access(cpath.as_ptr(), libc::W_OK) };
    Ok(rc == 0)
}

/// Whether `path` sits on an XFS mount (`statfs.f_type`).
pub fn is_xfs(path: &Path) -> SysResult<bool> {
    let cpath = cstr(path, "statfs")?;
    // SAFETY: zeroed statfs is a valid out-parameter for statfs(2).
    let mut st: libc::statfs = unsafe { mem::zeroed() };
    // SAFETY: cpath is a valid NUL-terminated string, st a valid out pointer.
    let rc = unsafe { libc::statfs(cpath.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(SysError::last_os_path("statfs", path));
    }
    Ok(st.f_type as i64 == XFS_SUPER_MAGIC)
}

/// Create a block-special file at `path` with device number `dev`,
/// mode 0600. Fails with `EEXIST` if the path already exists; callers
/// wanting idempotent re-creation unlink first.
pub fn mknod_block(path: &Path, dev: Dev) -> SysResult<()> {
    let cpath = cstr(path, "mknod")?;
    // SAFETY: cpath is a valid NUL-terminated string.
    let rc = unsafe { libc::mknod(cpath.as_ptr(), libc::S_IFBLK | 0o600, dev.0) };
    if rc != 0 {
        return Err(SysError::last_os_path("mknod", path));
    }
    Ok(())
}

/// Unlink `path`, treating `ENOENT` as success.
pub fn unlink_if_exists(path: &Path) -> SysResult<()> {
    let cpath = cstr(path, "unlink")?;
    // SAFETY: cpath is a valid NUL-terminated string.
    let rc = unsafe { libc::unlink(cpath.as_ptr()) };
    if rc != 0 {
        let err = SysError::last_os_path("unlink", path);
        if err.errno() == Some(libc::ENOENT) {
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

/// Project id of the directory `dir`. `ProjectId::NONE` when no
/// attribute is set. Fails on non-directories and on filesystems that do
/// not support the `fsxattr` ioctls.
pub fn get_project_id(dir: &Path) -> SysResult<ProjectId> {
    let file = open_dir(dir)?;
    let attr = fsgetxattr(&file, dir)?;
    Ok(ProjectId(attr.fsx_projid))
}

/// Bind project id `id` to the directory `dir` and set
/// `FS_XFLAG_PROJINHERIT`, so children created afterwards carry the same
/// id. Read-modify-write: all other `fsxattr` fields are preserved.
pub fn set_project_id(dir: &Path, id: ProjectId) -> SysResult<()> {
    let file = open_dir(dir)?;
    let mut attr = fsgetxattr(&file, dir)?;
    attr.fsx_projid = id.0;
    attr.fsx_xflags |= FS_XFLAG_PROJINHERIT;
    // SAFETY: fd is a live directory fd; attr is a valid fsxattr pointer.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_FSSETXATTR, &attr) };
    if rc != 0 {
        return Err(SysError::last_os_path("ioctl(FS_IOC_FSSETXATTR)", dir));
    }
    Ok(())
}

/// Program hard+soft limits for project `id` on the filesystem addressed
/// by the block-special file `dev`. `size_bytes` is converted to 512-byte
/// basic blocks (truncating); zero limits are written as zero, meaning
/// unlimited.
pub fn set_project_quota(
    dev: &Path,
    id: ProjectId,
    size_bytes: u64,
    inode_count: u64,
) -> SysResult<()> {
    let cdev = cstr(dev, "quotactl")?;
    let blocks = size_bytes / BASIC_BLOCK_SIZE;
    let mut d = FsDiskQuota {
        d_version: FS_DQUOT_VERSION,
        d_flags: FS_PROJ_QUOTA,
        d_fieldmask: FS_DQ_BHARD | FS_DQ_BSOFT | FS_DQ_IHARD | FS_DQ_ISOFT,
        d_id: id.0,
        d_blk_hardlimit: blocks,
        d_blk_softlimit: blocks,
        d_ino_hardlimit: inode_count,
        d_ino_softlimit: inode_count,
        ..FsDiskQuota::default()
    };
    // SAFETY: cdev is a valid NUL-terminated string and d a valid
    // fs_disk_quota; Q_XSETQLIM only reads the struct.
    let rc = unsafe {
        libc::quotactl(
            qcmd(Q_XSETQLIM, PRJQUOTA),
            cdev.as_ptr(),
            id.0 as c_int,
            (&mut d as *mut FsDiskQuota).cast::<c_char>(),
        )
    };
    if rc != 0 {
        return Err(SysError::last_os_path("quotactl(Q_XSETQLIM)", dev));
    }
    Ok(())
}

/// Read limits and usage for project `id` on the filesystem addressed by
/// `dev`. Block quantities are converted back to bytes.
pub fn get_project_quota(dev: &Path, id: ProjectId) -> SysResult<Quota> {
    let cdev = cstr(dev, "quotactl")?;
    let mut d = FsDiskQuota::default();
    // SAFETY: cdev is a valid NUL-terminated string and d a valid
    // fs_disk_quota out pointer.
    let rc = unsafe {
        libc::quotactl(
            qcmd(Q_XGETQUOTA, PRJQUOTA),
            cdev.as_ptr(),
            id.0 as c_int,
            (&mut d as *mut FsDiskQuota).cast::<c_char>(),
        )
    };
    if rc != 0 {
        return Err(SysError::last_os_path("quotactl(Q_XGETQUOTA)", dev));
    }
    Ok(Quota {
        size_bytes: d.d_blk_hardlimit * BASIC_BLOCK_SIZE,
        inode_count: d.d_ino_hardlimit,
        used_size_bytes: d.d_bcount * BASIC_BLOCK_SIZE,
        used_inode_count: d.d_icount,
    })
}

/// Whether project-quota accounting or enforcement is active on the
/// filesystem addressed by `dev`. Kernels without quota support answer
/// the status query with `ENOSYS`/`EINVAL`/`ESRCH`; those map to `false`
/// rather than an error.
pub fn is_quota_enabled(dev: &Path) -> SysResult<bool> {
    let cdev = cstr(dev, "quotactl")?;
    let mut st = FsQuotaStat::default();
    // SAFETY: cdev is a valid NUL-terminated string and st a valid
    // fs_quota_stat out pointer.
    let rc = unsafe {
        libc::quotactl(
            qcmd(Q_XGETQSTAT, PRJQUOTA),
            cdev.as_ptr(),
            0,
            (&mut st as *mut FsQuotaStat).cast::<c_char>(),
        )
    };
    if rc != 0 {
        let err = SysError::last_os_path("quotactl(Q_XGETQSTAT)", dev);
        return match err.errno() {
            Some(libc::ENOSYS) | Some(libc::EINVAL) | Some(libc::ESRCH) => Ok(false),
            _ => Err(err),
        };
    }
    Ok(st.qs_flags & (FS_QUOTA_PDQ_ACCT | FS_QUOTA_PDQ_ENFD) != 0)
}
