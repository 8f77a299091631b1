//! Minimal `/etc` files for a root-only container.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use crate::rootfs::create_parent;

pub const PASSWD: &str = "root:x:0:0:root:/root:/bin/sh\n";

pub const GROUP: &str = "root:x:0:root\n";

pub const INITTAB: &str = "\
id:3:initdefault:

rc0:0:wait:/etc/rc.stop.sh
rc3:3:once:/etc/rc.start.sh

# sshd:3:wait:/usr/sbin/sshd

# c1:3:respawn:/sbin/agetty -n -l /bin/sh 38400 tty1 linux

exit:12345:powerfail:/sbin/shutdown -t1 -h now
";

/// A file written under the container root only when missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtcFile {
    pub path: &'static str,
    pub content: &'static str,
}

pub const USER_FILES: &[EtcFile] = &[
    EtcFile {
        path: "etc/passwd",
        content: PASSWD,
    },
    EtcFile {
        path: "etc/group",
        content: GROUP,
    },
];

pub const INITTAB_FILE: EtcFile = EtcFile {
    path: "etc/inittab",
    content: INITTAB,
};

impl EtcFile {
    /// Returns `Ok(false)` if the file already existed and was left untouched.
    pub fn write_if_missing(&self, root: &Path) -> Result<bool> {
        let path = root.join(self.path);
        create_parent(&path)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(file = %path.display(), "exists, keeping");
                return Ok(false);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", path.display()));
            }
        };
        file.write_all(self.content.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(file = %path.display(), "wrote");
        Ok(true)
    }
}

/// Write `/etc/passwd` and `/etc/group` granting only root.
pub fn write_user_files(root: &Path) -> Result<()> {
    for file in USER_FILES {
        file.write_if_missing(root)?;
    }
    Ok(())
}

pub fn write_inittab(root: &Path) -> Result<()> {
    INITTAB_FILE.write_if_missing(root)?;
    Ok(())
}
