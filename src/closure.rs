use anyhow::Result;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ResolveError;
use crate::ldd::{DependencyInspector, resolve_dependencies};

/// Programs every container needs to boot and shut down.
pub const BOOT_PROGRAMS: &[&str] = &["/sbin/init", "/sbin/shutdown"];

/// Deduplicated set of host paths that must exist inside the container.
///
/// Membership uses `Path` equality, which compares components rather than
/// raw strings: `/lib//libc.so`, `/lib/./libc.so` and `/lib/libc.so` are one
/// entry. They all re-root to the same destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureSet {
    paths: BTreeSet<PathBuf>,
}

impl ClosureSet {
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.paths.contains(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

impl FromIterator<PathBuf> for ClosureSet {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// Append the boot programs to the operator's list.
pub fn with_boot_programs(requested: &[PathBuf], boot: &[PathBuf]) -> Vec<PathBuf> {
    requested.iter().chain(boot).cloned().collect()
}

/// Default boot program list.
pub fn boot_programs() -> Vec<PathBuf> {
    BOOT_PROGRAMS.iter().map(PathBuf::from).collect()
}

/// The path itself, plus its fully resolved target when it is a symlink.
pub fn dereference(path: &Path) -> Result<Vec<PathBuf>, ResolveError> {
    let missing = |source| ResolveError::MissingSource {
        path: path.to_path_buf(),
        source,
    };

    let meta = fs::symlink_metadata(path).map_err(missing)?;
    if !meta.file_type().is_symlink() {
        return Ok(vec![path.to_path_buf()]);
    }

    let target = fs::canonicalize(path).map_err(missing)?;
    Ok(vec![path.to_path_buf(), target])
}

/// Compute the dependency closure of `programs`.
///
/// Each program is inspected once. Dependencies are not inspected again
/// because `ldd` already lists the transitive set. Symlinks among the
/// programs and libraries pull in their real targets.
pub fn resolve_closure(
    inspector: &dyn DependencyInspector,
    programs: &[PathBuf],
) -> Result<ClosureSet> {
    let mut files: Vec<PathBuf> = Vec::new();

    for program in programs {
        let deps = resolve_dependencies(inspector, program)?;
        tracing::debug!(
            program = %program.display(),
            libraries = deps.len(),
            "resolved dependencies"
        );
        files.push(program.clone());
        files.extend(deps);
    }

    let mut derefs = Vec::new();
    for file in &files {
        derefs.extend(dereference(file)?);
    }
    files.extend(derefs);

    Ok(files.into_iter().collect())
}
