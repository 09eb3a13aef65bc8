#![forbid(unsafe_code)]
//! Volume-plugin daemon speaking JSON over a Unix socket.
//!
//! Container runtimes create, mount and remove quota-bound volumes
//! through this daemon. The quota state itself lives in the filesystem
//! (project ids in inode attributes, limits in the XFS superblock), so
//! the daemon can be restarted freely.

mod driver;
mod server;
mod wire;

use std::fs;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use volq_volume::{Manager, ManagerConfig};

use driver::Driver;

#[derive(Parser)]
#[command(name = "volq-plugind", about = "XFS project-quota volume plugin daemon")]
struct Args {
    /// Directory under which volumes are created. Must sit on an XFS
    /// mount with prjquota enabled.
    #[arg(long)]
    root: PathBuf,

    /// Unix socket to listen on.
    #[arg(long, default_value = "/run/volq/volq.sock")]
    socket: PathBuf,

    /// Lowest project id to hand out; ids at or below this stay
    /// reserved for out-of-band xfs_quota management.
    #[arg(long)]
    starting_project_id: Option<u32>,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let manager = Manager::new(ManagerConfig {
        root: args.root.clone(),
        starting_project_id: args.starting_project_id,
    })
    .with_context(|| format!("failed to initialise volumes under {}", args.root.display()))?;

    if let Some(parent) = args.socket.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create socket dir {}", parent.display()))?;
    }
    // A stale socket from a previous run would make bind fail.
    match fs::remove_file(&args.socket) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to remove stale socket {}", args.socket.display()))
        }
    }

    let listener = UnixListener::bind(&args.socket)
        .with_context(|| format!("failed to bind {}", args.socket.display()))?;

    info!(
        socket = %args.socket.display(),
        root = %args.root.display(),
        "volume plugin listening"
    );
    server::serve(listener, Arc::new(Driver::new(manager)))?;
    Ok(())
}
