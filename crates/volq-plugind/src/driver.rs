//! Request dispatch for the volume-plugin daemon.
//!
//! The host container runtime may issue requests from several
//! connections at once; a single coarse mutex around the manager
//! serialises them, which is plenty for a control-plane API whose
//! operations complete in microseconds.

use parking_lot::Mutex;
use tracing::{debug, warn};

use volq_types::VolumeName;
use volq_volume::{human_size, CreateRequest, Manager};

use crate::wire::{Capabilities, Request, Response, VolumeInfo};

/// Size applied when `Create` carries no `size` option.
pub const DEFAULT_SIZE: &str = "512M";

pub struct Driver {
    manager: Mutex<Manager>,
}

impl Driver {
    pub fn new(manager: Manager) -> Self {
        Self {
            manager: Mutex::new(manager),
        }
    }

    /// Dispatch one request. Failures become `err` strings; the
    /// transport never sees them.
    pub fn handle(&self, request: Request) -> Response {
        let manager = self.manager.lock();
        let result = match request {
            Request::Create { name, opts } => self.create(&manager, &name, &opts),
            Request::Get { name } => Self::get(&manager, &name),
            Request::List => Self::list(&manager),
            Request::Path { name } | Request::Mount { name, .. } => {
                Self::mountpoint_of(&manager, &name)
            }
            Request::Remove { name } => Self::remove(&manager, &name),
            Request::Unmount { name, id } => {
                debug!(name = %name, id = %id, "unmount is a no-op");
                Ok(Response::ok())
            }
            Request::Capabilities => Ok(Response {
                capabilities: Some(Capabilities {
                    scope: "global".to_owned(),
                }),
                ..Response::default()
            }),
        };

        result.unwrap_or_else(|err| {
            warn!(err = %err, "request failed");
            Response::error(err)
        })
    }

    fn create(
        &self,
        manager: &Manager,
        name: &str,
        opts: &std::collections::HashMap<String, String>,
    ) -> Result<Response, String> {
        let name = VolumeName::new(name).map_err(|err| err.to_string())?;
        let size = match opts.get("size") {
            Some(size) => size.as_str(),
            None => {
                debug!(default = DEFAULT_SIZE, "no size opt given, using default");
                DEFAULT_SIZE
            }
        };
        let size_bytes = human_size::parse_size(size).map_err(|err| err.to_string())?;
        let inode_count = match opts.get("inode") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| format!("inode option {raw:?} is not an integer"))?,
            None => 0,
        };

        debug!(name = %name, size_bytes, inode_count, "creating volume");
        manager
            .create(&CreateRequest {
                name,
                size_bytes,
                inode_count,
            })
            .map_err(|err| err.to_string())?;
        Ok(Response::ok())
    }

    fn get(manager: &Manager, name: &str) -> Result<Response, String> {
        let volume = Self::lookup(manager, name)?;
        Ok(Response {
            volume: Some(volume),
            ..Response::default()
        })
    }

    fn list(manager: &Manager) -> Result<Response, String> {
        let volumes = manager
            .list()
            .map_err(|err| err.to_string())?
            .into_iter()
            .map(|vol| VolumeInfo {
                name: vol.name.to_string(),
                mountpoint: String::new(),
            })
            .collect();
        Ok(Response {
            volumes: Some(volumes),
            ..Response::default()
        })
    }

    fn mountpoint_of(manager: &Manager, name: &str) -> Result<Response, String> {
        let volume = Self::lookup(manager, name)?;
        Ok(Response::mountpoint(volume.mountpoint))
    }

    fn remove(manager: &Manager, name: &str) -> Result<Response, String> {
        let name = VolumeName::new(name).map_err(|err| err.to_string())?;
        manager.delete(&name).map_err(|err| err.to_string())?;
        Ok(Response::ok())
    }

    fn lookup(manager: &Manager, name: &str) -> Result<VolumeInfo, String> {
        let name = VolumeName::new(name).map_err(|err| err.to_string())?;
        let volume = manager
            .get(&name)
            .map_err(|err| err.to_string())?
            .ok_or_else(|| format!("volume {name} not found"))?;
        Ok(VolumeInfo {
            name: name.to_string(),
            mountpoint: volume.path.display().to_string(),
        })
    }
}
