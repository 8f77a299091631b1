//! The fixed `/dev` and `/proc` skeleton a container init expects.

use anyhow::{Context, Result};
use nix::sys::stat::{Mode, SFlag, makedev, mknod};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::rootfs::{create_parent, is_present};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Char { major: u64, minor: u64 },
    Fifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNode {
    /// Relative to the container root.
    pub path: &'static str,
    pub kind: NodeKind,
    pub mode: u32,
}

const fn chr(path: &'static str, major: u64, minor: u64, mode: u32) -> DeviceNode {
    DeviceNode {
        path,
        kind: NodeKind::Char { major, minor },
        mode,
    }
}

pub const DEVICE_NODES: &[DeviceNode] = &[
    DeviceNode {
        path: "dev/initctl",
        kind: NodeKind::Fifo,
        mode: 0o666,
    },
    chr("dev/null", 1, 3, 0o666),
    chr("dev/zero", 1, 5, 0o666),
    chr("dev/random", 1, 8, 0o666),
    chr("dev/urandom", 1, 9, 0o666),
    chr("dev/tty", 5, 0, 0o666),
    chr("dev/console", 5, 1, 0o600),
    chr("dev/tty0", 4, 0, 0o666),
    chr("dev/tty1", 4, 1, 0o666),
    chr("dev/tty2", 4, 2, 0o666),
    chr("dev/tty3", 4, 3, 0o666),
    chr("dev/tty4", 4, 4, 0o666),
    chr("dev/full", 1, 7, 0o666),
    chr("dev/ptmx", 5, 2, 0o666),
];

/// Directories created with an explicit mode. `proc` stays empty for the
/// launcher to mount procfs on.
pub const DIRECTORIES: &[(&str, u32)] = &[
    ("dev/pts", 0o755),
    ("dev/shm", 0o1777),
    ("proc", 0o755),
];

/// Create the directories and device nodes under `root`.
///
/// Nodes that already exist are skipped. Character devices need
/// `CAP_MKNOD`.
pub fn populate(root: &Path) -> Result<()> {
    for (dir, mode) in DIRECTORIES {
        create_dir_mode(&root.join(dir), *mode)?;
    }

    let mut created = 0;
    for node in DEVICE_NODES {
        if create_node(root, node)? {
            created += 1;
        }
    }
    tracing::info!(created, total = DEVICE_NODES.len(), "device nodes ready");
    Ok(())
}

fn create_dir_mode(path: &Path, mode: u32) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    Ok(())
}

/// Returns `Ok(false)` if the node was already there.
pub(crate) fn create_node(root: &Path, node: &DeviceNode) -> Result<bool> {
    let path = root.join(node.path);
    if is_present(&path) {
        return Ok(false);
    }
    create_parent(&path)?;

    let (kind, dev) = match node.kind {
        NodeKind::Char { major, minor } => (SFlag::S_IFCHR, makedev(major, minor)),
        NodeKind::Fifo => (SFlag::S_IFIFO, 0),
    };
    let perm = Mode::from_bits_truncate(node.mode as libc::mode_t);
    mknod(&path, kind, perm, dev)
        .with_context(|| format!("Failed to create device node {}", path.display()))?;

    // mknod is subject to the umask
    fs::set_permissions(&path, fs::Permissions::from_mode(node.mode))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;

    tracing::debug!(node = %path.display(), kind = ?node.kind, "created device node");
    Ok(true)
}
