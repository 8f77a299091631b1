//! Shared-library inspection through the system `ldd`.
//!
//! `ldd` already flattens library-to-library dependencies, so one call per
//! program yields everything that program needs. The text format is fragile
//! and is kept behind [`parse_ldd_output`].

use anyhow::{Context, Result, bail};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::LddError;

/// Output of `ldd` for a statically linked program (glibc).
pub const NOT_DYNAMIC: &str = "not a dynamic executable";

/// Output of `ldd` for a statically linked program (musl, static-pie).
pub const STATICALLY_LINKED: &str = "statically linked";

/// Kernel-injected libraries with no backing file.
pub const VDSO_PREFIXES: &[&str] = &["linux-vdso.", "linux-gate."];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LddOutput {
    Static,
    Dynamic(Vec<PathBuf>),
}

impl LddOutput {
    pub fn into_paths(self) -> Vec<PathBuf> {
        match self {
            LddOutput::Static => Vec::new(),
            LddOutput::Dynamic(paths) => paths,
        }
    }
}

/// Something that can report the raw dependency listing of a program.
#[cfg_attr(test, mockall::automock)]
pub trait DependencyInspector {
    fn inspect(&self, path: &Path) -> Result<String>;
}

/// Runs the host `ldd` (or a compatible replacement).
#[derive(Debug, Clone)]
pub struct Ldd {
    program: OsString,
}

impl Ldd {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Ldd {
    fn default() -> Self {
        Self::new("ldd")
    }
}

impl DependencyInspector for Ldd {
    fn inspect(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            bail!("File does not exist: {}", path.display());
        }

        let output = Command::new(&self.program)
            .arg(path)
            .output()
            .with_context(|| {
                format!("failed to run {:?} on {}", self.program, path.display())
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        // glibc's ldd reports static binaries on stderr with exit status 1
        let stderr = String::from_utf8_lossy(&output.stderr);
        for text in [stderr.trim(), stdout.trim()] {
            if is_static_marker(text) {
                return Ok(text.to_string());
            }
        }

        bail!(
            "{:?} failed on {} ({}): {}",
            self.program,
            path.display(),
            output.status,
            stderr.trim()
        );
    }
}

fn is_static_marker(text: &str) -> bool {
    text == NOT_DYNAMIC || text == STATICALLY_LINKED
}

/// Parse `ldd` output into the list of resolved library paths.
///
/// Example output:
/// ```text
///     linux-vdso.so.1 (0x00007ffd3a5f2000)
///     libc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x00007f2b1c200000)
///     /lib64/ld-linux-x86-64.so.2 (0x00007f2b1c45e000)
/// ```
pub fn parse_ldd_output(output: &str) -> Result<LddOutput, LddError> {
    let output = output.trim();
    if is_static_marker(output) {
        return Ok(LddOutput::Static);
    }

    let mut libs = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = fields.first() else {
            continue;
        };
        if VDSO_PREFIXES.iter().any(|prefix| first.starts_with(prefix)) {
            continue;
        }

        let path = match fields.as_slice() {
            [path, _addr] => *path,
            [library, "=>", "not", "found", ..] => {
                return Err(LddError::LibraryNotFound {
                    library: library.to_string(),
                });
            }
            [_name, "=>", path, ..] => *path,
            _ => {
                return Err(LddError::MalformedLine {
                    line: line.trim().to_string(),
                });
            }
        };

        if !path.starts_with('/') {
            return Err(LddError::RelativePath {
                path: path.to_string(),
                line: line.trim().to_string(),
            });
        }
        libs.push(PathBuf::from(path));
    }

    Ok(LddOutput::Dynamic(libs))
}

/// Resolve the libraries one program links against.
pub fn resolve_dependencies(
    inspector: &dyn DependencyInspector,
    path: &Path,
) -> Result<Vec<PathBuf>> {
    let output = inspector.inspect(path)?;
    let parsed = parse_ldd_output(&output)
        .with_context(|| format!("could not read dependencies of {}", path.display()))?;
    Ok(parsed.into_paths())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LS_OUTPUT: &str = "\
\tlinux-vdso.so.1 (0x00007ffc8a9e5000)
\tlibselinux.so.1 => /lib/x86_64-linux-gnu/libselinux.so.1 (0x00007f1c2a5d0000)
\tlibc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x00007f1c2a200000)
\tlibpcre2-8.so.0 => /lib/x86_64-linux-gnu/libpcre2-8.so.0 (0x00007f1c2a169000)
\t/lib64/ld-linux-x86-64.so.2 (0x00007f1c2a62d000)
";

    #[test]
    fn test_parse_ldd_output() {
        let parsed = parse_ldd_output(LS_OUTPUT).unwrap();
        assert_eq!(
            parsed,
            LddOutput::Dynamic(vec![
                PathBuf::from("/lib/x86_64-linux-gnu/libselinux.so.1"),
                PathBuf::from("/lib/x86_64-linux-gnu/libc.so.6"),
                PathBuf::from("/lib/x86_64-linux-gnu/libpcre2-8.so.0"),
                PathBuf::from("/lib64/ld-linux-x86-64.so.2"),
            ])
        );
    }

    #[test]
    fn test_parse_static_markers() {
        assert_eq!(
            parse_ldd_output("\tnot a dynamic executable\n").unwrap(),
            LddOutput::Static
        );
        assert_eq!(
            parse_ldd_output("statically linked").unwrap(),
            LddOutput::Static
        );
    }

    #[test]
    fn test_static_marker_is_not_a_substring_match() {
        let err = parse_ldd_output("foo: not a dynamic executable").unwrap_err();
        assert!(matches!(err, LddError::MalformedLine { .. }));
    }

    #[test]
    fn test_vdso_filtered_in_every_shape() {
        let output = "\
linux-vdso.so.1 (0x00007ffc8a9e5000)
linux-vdso.so.1 => (0x00007ffc8a9e5000)
linux-gate.so.1 => /fake/linux-gate.so.1 (0xf7f00000)
linux-vdso.so.1
libc.so.6 => /lib/libc.so.6 (0x00007f1c2a200000)
";
        let paths = parse_ldd_output(output).unwrap().into_paths();
        assert_eq!(paths, vec![PathBuf::from("/lib/libc.so.6")]);
    }

    #[test]
    fn test_library_not_found() {
        let output = "libmissing.so.3 => not found\n";
        assert_eq!(
            parse_ldd_output(output).unwrap_err(),
            LddError::LibraryNotFound {
                library: "libmissing.so.3".to_string()
            }
        );
    }

    #[test]
    fn test_single_field_line_is_rejected() {
        let err = parse_ldd_output("garbage\n").unwrap_err();
        assert_eq!(
            err,
            LddError::MalformedLine {
                line: "garbage".to_string()
            }
        );
    }

    #[test]
    fn test_relative_path_is_rejected() {
        let err = parse_ldd_output("libfoo.so => libfoo.so (0x1000)\n").unwrap_err();
        assert!(matches!(err, LddError::RelativePath { .. }));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let output = "\n\tlibc.so.6 => /lib/libc.so.6 (0x1000)\n\n";
        assert_eq!(
            parse_ldd_output(output).unwrap().into_paths(),
            vec![PathBuf::from("/lib/libc.so.6")]
        );
    }

    #[test]
    fn test_resolve_dependencies_uses_inspector() {
        let mut inspector = MockDependencyInspector::new();
        inspector
            .expect_inspect()
            .times(1)
            .returning(|_| Ok(NOT_DYNAMIC.to_string()));

        let deps = resolve_dependencies(&inspector, Path::new("/bin/busybox")).unwrap();
        assert!(deps.is_empty());
    }

    #[test]
    fn test_resolve_dependencies_reports_program() {
        let mut inspector = MockDependencyInspector::new();
        inspector
            .expect_inspect()
            .returning(|_| Ok("bogus\n".to_string()));

        let err = resolve_dependencies(&inspector, Path::new("/bin/odd")).unwrap_err();
        assert!(format!("{err:#}").contains("/bin/odd"));
    }

    #[test]
    fn test_ldd_missing_file() {
        let result = Ldd::default().inspect(Path::new("/nonexistent/path/to/binary"));
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("does not exist"), "got: {}", err_msg);
    }

    #[test]
    fn test_ldd_missing_program() {
        let ldd = Ldd::new("/nonexistent/ldd");
        assert!(ldd.inspect(Path::new("/")).is_err());
    }
}
