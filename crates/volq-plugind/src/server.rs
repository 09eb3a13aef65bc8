//! Line-delimited JSON over a Unix socket.
//!
//! Each connection gets a thread; requests on one connection are
//! answered in order, and the driver's mutex serialises work across
//! connections. A malformed line produces an error response rather than
//! tearing the connection down.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::driver::Driver;
use crate::wire::{Request, Response};

/// Accept connections until the listener fails.
pub fn serve(listener: UnixListener, driver: Arc<Driver>) -> std::io::Result<()> {
    loop {
        let (stream, _addr) = listener.accept()?;
        let driver = Arc::clone(&driver);
        thread::Builder::new()
            .name("volq-conn".to_owned())
            .spawn(move || handle_connection(&stream, &driver))?;
    }
}

fn handle_connection(stream: &UnixStream, driver: &Driver) {
    let reader = BufReader::new(stream);
    let mut writer = stream;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(err = %err, "connection read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => driver.handle(request),
            Err(err) => Response::error(format!("malformed request: {err}")),
        };

        if let Err(err) = write_response(&mut writer, &response) {
            warn!(err = %err, "connection write failed");
            return;
        }
    }
    debug!("connection closed");
}

fn write_response(writer: &mut impl Write, response: &Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, response)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use volq_control::{Control, ControlConfig, QuotaBackend};
    use volq_error::SysError;
    use volq_sys::Dev;
    use volq_types::{ProjectId, Quota};
    use volq_volume::Manager;

    /// Happy-path in-memory backend: every quota operation succeeds.
    #[derive(Default)]
    struct MemBackend {
        project_ids: Mutex<HashMap<PathBuf, ProjectId>>,
        quotas: Mutex<HashMap<u32, Quota>>,
    }

    impl QuotaBackend for MemBackend {
        fn device_of(&self, _path: &Path) -> Result<Dev, SysError> {
            Ok(Dev(0))
        }

        fn mknod_block(&self, _path: &Path, _dev: Dev) -> Result<(), SysError> {
            Ok(())
        }

        fn unlink_if_exists(&self, _path: &Path) -> Result<(), SysError> {
            Ok(())
        }

        fn get_project_id(&self, dir: &Path) -> Result<ProjectId, SysError> {
            Ok(self
                .project_ids
                .lock()
                .get(dir)
                .copied()
                .unwrap_or(ProjectId::NONE))
        }

        fn set_project_id(&self, dir: &Path, id: ProjectId) -> Result<(), SysError> {
            self.project_ids.lock().insert(dir.to_path_buf(), id);
            Ok(())
        }

        fn set_project_quota(
            &self,
            _dev: &Path,
            id: ProjectId,
            size_bytes: u64,
            inode_count: u64,
        ) -> Result<(), SysError> {
            self.quotas
                .lock()
                .insert(id.0, Quota::limits(size_bytes, inode_count));
            Ok(())
        }

        fn get_project_quota(&self, _dev: &Path, id: ProjectId) -> Result<Quota, SysError> {
            Ok(self.quotas.lock().get(&id.0).copied().unwrap_or_default())
        }

        fn is_quota_enabled(&self, _dev: &Path) -> Result<bool, SysError> {
            Ok(true)
        }

        fn is_xfs(&self, _path: &Path) -> Result<bool, SysError> {
            Ok(true)
        }

        fn is_dir(&self, path: &Path) -> Result<bool, SysError> {
            match std::fs::metadata(path) {
                Ok(meta) => Ok(meta.is_dir()),
                Err(source) => Err(SysError {
                    syscall: "stat",
                    arg: path.display().to_string(),
                    source,
                }),
            }
        }

        fn is_writable(&self, _path: &Path) -> Result<bool, SysError> {
            Ok(true)
        }
    }

    fn driver_over(root: &Path) -> Driver {
        let control = Control::with_backend(
            ControlConfig {
                base_path: root.to_path_buf(),
                starting_project_id: None,
            },
            Box::new(MemBackend::default()),
        )
        .expect("control construction");
        Driver::new(Manager::with_control(control))
    }

    fn roundtrip(stream: &UnixStream, request: &str) -> Response {
        let mut writer = stream;
        writer.write_all(request.as_bytes()).unwrap();
        writer.write_all(b"\n").unwrap();
        writer.flush().unwrap();

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn create_list_get_remove_over_the_socket() {
        let root = TempDir::new().unwrap();
        let socket_dir = TempDir::new().unwrap();
        let socket = socket_dir.path().join("volq.sock");

        let listener = UnixListener::bind(&socket).unwrap();
        let driver = Arc::new(driver_over(root.path()));
        {
            let driver = Arc::clone(&driver);
            thread::spawn(move || serve(listener, driver));
        }

        let stream = UnixStream::connect(&socket).unwrap();

        let resp = roundtrip(
            &stream,
            r#"{"method":"Create","name":"vol-a","opts":{"size":"10M","inode":"100"}}"#,
        );
        assert_eq!(resp.err, "");

        let resp = roundtrip(&stream, r#"{"method":"List"}"#);
        let volumes = resp.volumes.expect("volumes present");
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "vol-a");

        let resp = roundtrip(&stream, r#"{"method":"Get","name":"vol-a"}"#);
        let volume = resp.volume.expect("volume present");
        assert_eq!(volume.mountpoint, root.path().join("vol-a").display().to_string());

        let resp = roundtrip(&stream, r#"{"method":"Mount","name":"vol-a","id":"c1"}"#);
        assert_eq!(
            resp.mountpoint.as_deref(),
            Some(root.path().join("vol-a").display().to_string().as_str())
        );

        let resp = roundtrip(&stream, r#"{"method":"Unmount","name":"vol-a","id":"c1"}"#);
        assert_eq!(resp.err, "");

        let resp = roundtrip(&stream, r#"{"method":"Remove","name":"vol-a"}"#);
        assert_eq!(resp.err, "");
        assert!(!root.path().join("vol-a").exists());

        let resp = roundtrip(&stream, r#"{"method":"Get","name":"vol-a"}"#);
        assert!(resp.err.contains("not found"), "err: {}", resp.err);
    }

    #[test]
    fn capabilities_report_global_scope() {
        let root = TempDir::new().unwrap();
        let driver = driver_over(root.path());
        let resp = driver.handle(Request::Capabilities);
        assert_eq!(resp.capabilities.unwrap().scope, "global");
    }

    #[test]
    fn create_applies_the_default_size() {
        let root = TempDir::new().unwrap();
        let driver = driver_over(root.path());

        let resp = driver.handle(Request::Create {
            name: "vol-a".to_owned(),
            opts: HashMap::new(),
        });
        assert_eq!(resp.err, "");

        // 512M decimal, as the default advertises.
        let resp = driver.handle(Request::Get {
            name: "vol-a".to_owned(),
        });
        assert_eq!(resp.err, "");
    }

    #[test]
    fn create_rejects_reserved_and_malformed_names() {
        let root = TempDir::new().unwrap();
        let driver = driver_over(root.path());

        for name in ["__control-device", "backingFsBlockDev", "bad name", ""] {
            let resp = driver.handle(Request::Create {
                name: name.to_owned(),
                opts: HashMap::new(),
            });
            assert!(!resp.err.is_empty(), "name {name:?} must be rejected");
        }
    }

    #[test]
    fn create_rejects_unparseable_options() {
        let root = TempDir::new().unwrap();
        let driver = driver_over(root.path());

        let resp = driver.handle(Request::Create {
            name: "vol-a".to_owned(),
            opts: HashMap::from([("size".to_owned(), "lots".to_owned())]),
        });
        assert!(!resp.err.is_empty());

        let resp = driver.handle(Request::Create {
            name: "vol-a".to_owned(),
            opts: HashMap::from([
                ("size".to_owned(), "10M".to_owned()),
                ("inode".to_owned(), "many".to_owned()),
            ]),
        });
        assert!(!resp.err.is_empty());
    }

    #[test]
    fn malformed_lines_get_an_error_response_without_closing() {
        let root = TempDir::new().unwrap();
        let socket_dir = TempDir::new().unwrap();
        let socket = socket_dir.path().join("volq.sock");

        let listener = UnixListener::bind(&socket).unwrap();
        let driver = Arc::new(driver_over(root.path()));
        thread::spawn(move || serve(listener, driver));

        let stream = UnixStream::connect(&socket).unwrap();
        let resp = roundtrip(&stream, "this is not json");
        assert!(resp.err.contains("malformed request"));

        // The connection is still usable.
        let resp = roundtrip(&stream, r#"{"method":"List"}"#);
        assert!(resp.volumes.is_some());
    }
}
