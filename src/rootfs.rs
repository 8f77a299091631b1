//! Materializes a dependency closure under a container root.

use anyhow::{Context, Result};
use nix::sys::stat::{UtimensatFlags, utimensat};
use nix::sys::time::TimeSpec;
use nix::unistd::{FchownatFlags, Gid, Uid, chown, fchownat};
use std::fs::{self, OpenOptions};
use std::os::unix::fs::{MetadataExt, symlink};
use std::path::{Path, PathBuf};

use crate::closure::ClosureSet;
use crate::mounts::MountLine;

/// How closure members are placed in the container tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Copy content, metadata and symlinks.
    Copy,
    /// Create empty placeholders to bind-mount over at container start.
    Mountpoint,
}

/// What to do with ownership of copied files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ownership {
    /// Force root:root. Failing to chown aborts the run.
    #[default]
    Root,
    /// Leave whatever owner the copy ends up with.
    Preserve,
}

/// Place `path` under `root`, dropping its leading separator.
pub fn reroot(root: &Path, path: &Path) -> PathBuf {
    root.join(path.strip_prefix("/").unwrap_or(path))
}

/// True if anything, including a dangling symlink, sits at `path`.
pub(crate) fn is_present(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

pub(crate) fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Populates a container root from a closure.
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
    mode: Mode,
    ownership: Ownership,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>, mode: Mode, ownership: Ownership) -> Self {
        Self {
            root: root.into(),
            mode,
            ownership,
        }
    }

    /// Place every closure member and return one mount line per member.
    ///
    /// Destinations that already exist are left alone, so re-running against
    /// a partially built tree completes it.
    pub fn materialize(&self, closure: &ClosureSet) -> Result<Vec<MountLine>> {
        let mut lines = Vec::with_capacity(closure.len());
        for source in closure.iter() {
            let dest = reroot(&self.root, source);
            create_parent(&dest)?;

            match self.mode {
                Mode::Copy => self.copy(source, &dest)?,
                Mode::Mountpoint => touch(&dest)?,
            }
            lines.push(MountLine::new(source, dest));
        }
        Ok(lines)
    }

    fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        if is_present(dst) {
            tracing::debug!(dest = %dst.display(), "already present, skipping");
            return Ok(());
        }

        let meta = fs::symlink_metadata(src)
            .with_context(|| format!("Source file does not exist: {}", src.display()))?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(src)
                .with_context(|| format!("Failed to read symlink {}", src.display()))?;
            symlink(&target, dst).with_context(|| {
                format!(
                    "Failed to create symlink {} -> {}",
                    dst.display(),
                    target.display()
                )
            })?;
            if self.ownership == Ownership::Root {
                fchownat(
                    None,
                    dst,
                    Some(Uid::from_raw(0)),
                    Some(Gid::from_raw(0)),
                    FchownatFlags::NoFollowSymlink,
                )
                .with_context(|| chown_failure(dst))?;
            }
        } else {
            fs::copy(src, dst).with_context(|| {
                format!("Failed to copy {} to {}", src.display(), dst.display())
            })?;
            if self.ownership == Ownership::Root {
                chown(dst, Some(Uid::from_raw(0)), Some(Gid::from_raw(0)))
                    .with_context(|| chown_failure(dst))?;
            }
            // chown clears setuid/setgid, so the mode goes on afterwards
            fs::set_permissions(dst, meta.permissions())
                .with_context(|| format!("Failed to set permissions on {}", dst.display()))?;
            copy_times(&meta, dst)?;
        }

        tracing::debug!(source = %src.display(), dest = %dst.display(), "copied");
        Ok(())
    }
}

fn chown_failure(path: &Path) -> String {
    format!(
        "Failed to set owner of {} to root (run as root or pass --no-chown)",
        path.display()
    )
}

/// Carry access and modification times over from the source.
fn copy_times(meta: &fs::Metadata, dst: &Path) -> Result<()> {
    let atime = TimeSpec::new(meta.atime() as libc::time_t, meta.atime_nsec() as libc::c_long);
    let mtime = TimeSpec::new(meta.mtime() as libc::time_t, meta.mtime_nsec() as libc::c_long);
    utimensat(None, dst, &atime, &mtime, UtimensatFlags::FollowSymlink)
        .with_context(|| format!("Failed to set timestamps on {}", dst.display()))?;
    Ok(())
}

/// Create an empty placeholder file unless something is already there.
fn touch(path: &Path) -> Result<()> {
    if is_present(path) {
        return Ok(());
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create mount point {}", path.display()))?;
    tracing::debug!(dest = %path.display(), "created mount point");
    Ok(())
}
