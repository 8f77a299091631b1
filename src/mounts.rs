//! Bind-mount directives for the materialized closure.

use anyhow::{Context, Result};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Key LXC uses for extra mount entries in a container config.
pub const LXC_MOUNT_KEY: &str = "lxc.mount.entry=";

/// A host path and where it appears inside the container root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountLine {
    pub source: PathBuf,
    pub dest: PathBuf,
}

impl MountLine {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }

    /// `lxc.mount.entry=` form of the line.
    pub fn lxc_entry(&self) -> String {
        format!("{LXC_MOUNT_KEY}{self}")
    }
}

/// Renders as an fstab(5) read-only bind entry, newline included.
impl fmt::Display for MountLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} none ro,bind 0 0",
            escape_field(&self.source),
            escape_field(&self.dest)
        )
    }
}

/// Octal-escape bytes that would split an fstab field.
///
/// Works on the raw path bytes so non-UTF-8 names survive as `\ooo`
/// escapes instead of being replaced.
fn escape_field(path: &Path) -> String {
    let raw = path.as_os_str().as_bytes();
    let mut out = String::with_capacity(raw.len());
    for chunk in raw.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                ' ' | '\t' | '\n' | '\\' => push_octal(&mut out, c as u8),
                c => out.push(c),
            }
        }
        for byte in chunk.invalid() {
            push_octal(&mut out, *byte);
        }
    }
    out
}

fn push_octal(out: &mut String, byte: u8) {
    out.push_str(&format!("\\{byte:03o}"));
}

/// Which directive format a [`MountSink`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountFormat {
    Fstab,
    Lxc,
}

/// An operator file that mount lines are appended to.
pub struct MountSink {
    path: PathBuf,
    format: MountFormat,
    writer: BufWriter<File>,
}

impl MountSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path, format: MountFormat) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {} for appending", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            writer: BufWriter::new(file),
        })
    }

    pub fn write_all(&mut self, lines: &[MountLine]) -> Result<()> {
        for line in lines {
            let rendered = match self.format {
                MountFormat::Fstab => line.to_string(),
                MountFormat::Lxc => line.lxc_entry(),
            };
            self.writer
                .write_all(rendered.as_bytes())
                .with_context(|| format!("Failed to write {}", self.path.display()))?;
        }
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        tracing::info!(
            file = %self.path.display(),
            format = ?self.format,
            entries = lines.len(),
            "appended mount entries"
        );
        Ok(())
    }
}
