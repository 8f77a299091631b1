use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::closure::{boot_programs, resolve_closure, with_boot_programs};
use crate::devices;
use crate::etc;
use crate::ldd::DependencyInspector;
use crate::mounts::{MountFormat, MountLine, MountSink};
use crate::rootfs::{Materializer, Mode, Ownership};

/// Everything one run needs to know.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub dest: PathBuf,
    pub mode: Mode,
    pub ownership: Ownership,
    pub programs: Vec<PathBuf>,
    /// Appended to `programs`; `/sbin/init` and `/sbin/shutdown` by default.
    pub boot_programs: Vec<PathBuf>,
    pub fstab: Option<PathBuf>,
    pub lxc_conf: Option<PathBuf>,
    pub user_files: bool,
    pub inittab: bool,
}

impl BuildConfig {
    pub fn new(dest: impl Into<PathBuf>, mode: Mode, programs: Vec<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            mode,
            ownership: Ownership::default(),
            programs,
            boot_programs: boot_programs(),
            fstab: None,
            lxc_conf: None,
            user_files: false,
            inittab: false,
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to make {} absolute", path.display()))
}

/// Resolve, materialize and provision a container root.
///
/// Returns the mount lines for the closure. Stops at the first error; the
/// tree left behind can be completed by running again.
pub fn build(
    config: &BuildConfig,
    inspector: &dyn DependencyInspector,
) -> Result<Vec<MountLine>> {
    let dest = absolute(&config.dest)?;

    // Open sinks first so a bad path fails before any work is done.
    let mut sinks = Vec::new();
    if let Some(path) = &config.fstab {
        sinks.push(MountSink::open(path, MountFormat::Fstab)?);
    }
    if let Some(path) = &config.lxc_conf {
        sinks.push(MountSink::open(path, MountFormat::Lxc)?);
    }

    let requested = config
        .programs
        .iter()
        .map(|p| absolute(p))
        .collect::<Result<Vec<_>>>()?;
    let programs = with_boot_programs(&requested, &config.boot_programs);

    tracing::info!(programs = programs.len(), "resolving dependencies");
    let closure = resolve_closure(inspector, &programs)?;
    tracing::info!(files = closure.len(), "dependency closure resolved");

    if config.mode == Mode::Copy && config.ownership == Ownership::Preserve {
        tracing::warn!("not forcing root ownership on copied files");
    }

    let materializer = Materializer::new(&dest, config.mode, config.ownership);
    tracing::info!(dest = %dest.display(), mode = ?config.mode, "materializing");
    let lines = materializer.materialize(&closure)?;

    devices::populate(&dest)?;

    for sink in &mut sinks {
        sink.write_all(&lines)?;
    }

    if config.user_files {
        etc::write_user_files(&dest)?;
    }
    if config.inittab {
        etc::write_inittab(&dest)?;
    }

    Ok(lines)
}
