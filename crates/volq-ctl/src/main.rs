#![forbid(unsafe_code)]
//! Operator CLI for XFS project-quota volumes.
//!
//! Works directly against a controlled root, without the plugin daemon:
//! handy for provisioning volumes ahead of time and for inspecting what
//! a daemon manages. Needs the same privileges the daemon does
//! (`CAP_SYS_ADMIN` for `mknod` and `quotactl`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use volq_types::VolumeName;
use volq_volume::human_size::{format_size, parse_size};
use volq_volume::{CreateRequest, Manager, ManagerConfig};

#[derive(Parser)]
#[command(name = "volqctl", about = "Controls XFS project-quota volumes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a volume with project-quota enforcement.
    ///
    /// The root must sit on an XFS filesystem mounted with prjquota,
    /// e.g. `mount -o prjquota /dev/sdb1 /mnt/xfs`.
    Create {
        /// Root of the volume tree (on an XFS filesystem).
        #[arg(long, short)]
        root: PathBuf,
        /// Name of the volume to create.
        #[arg(long, short)]
        name: String,
        /// Disk limit to apply (e.g. 50M, 1GiB).
        #[arg(long, short)]
        size: String,
        /// Maximum number of inodes (0 = unlimited).
        #[arg(long, short, default_value_t = 0)]
        inode: u64,
    },
    /// List the volumes under a root with their quotas.
    Ls {
        /// Root of the volume tree.
        #[arg(long, short)]
        root: PathBuf,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Delete a volume. The directory tree is removed; the project id
    /// stays allocated on the filesystem.
    Delete {
        /// Root of the volume tree.
        #[arg(long, short)]
        root: PathBuf,
        /// Name of the volume to delete.
        #[arg(long, short)]
        name: String,
    },
}

#[derive(Debug, Serialize)]
struct VolumeRow {
    name: String,
    size_bytes: u64,
    inode_count: u64,
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

    let cli = Cli::parse();
    match cli.command {
        Command::Create {
            root,
            name,
            size,
            inode,
        } => create(root, &name, &size, inode),
        Command::Ls { root, json } => ls(root, json),
        Command::Delete { root, name } => delete(root, &name),
    }
}

fn manager_for(root: PathBuf) -> Result<Manager> {
    let display = root.display().to_string();
    Manager::new(ManagerConfig {
        root,
        starting_project_id: None,
    })
    .with_context(|| format!("failed to initialise quota control under {display}"))
}

fn create(root: PathBuf, name: &str, size: &str, inode: u64) -> Result<()> {
    let name = VolumeName::new(name)?;
    let size_bytes =
        parse_size(size).with_context(|| format!("size {size:?} is not a valid human size"))?;

    let manager = manager_for(root)?;
    let path = manager
        .create(&CreateRequest {
            name: name.clone(),
            size_bytes,
            inode_count: inode,
        })
        .with_context(|| format!("failed to create volume {name}"))?;

    println!("{}", path.display());
    Ok(())
}

fn ls(root: PathBuf, json: bool) -> Result<()> {
    let manager = manager_for(root)?;
    let rows: Vec<VolumeRow> = manager
        .list()
        .context("failed to list volumes")?
        .into_iter()
        .map(|vol| VolumeRow {
            name: vol.name.to_string(),
            size_bytes: vol.quota.size_bytes,
            inode_count: vol.quota.inode_count,
        })
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("serialize output")?
        );
        return Ok(());
    }

    println!("{:<24} {:<12} {}", "NAME", "BLK-QUOTA", "INODE-QUOTA");
    for row in rows {
        println!(
            "{:<24} {:<12} {}",
            row.name,
            format_size(row.size_bytes),
            row.inode_count
        );
    }
    Ok(())
}

fn delete(root: PathBuf, name: &str) -> Result<()> {
    let name = VolumeName::new(name)?;
    let manager = manager_for(root)?;
    manager
        .delete(&name)
        .with_context(|| format!("failed to delete volume {name}"))?;
    Ok(())
}
