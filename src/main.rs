use anyhow::{Result, bail};
use clap::{ArgGroup, Parser};
use minroot::{BuildConfig, Ldd, Mode, Ownership, build};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minroot")]
#[command(about = "Helper for creating minimal LXC containers")]
#[command(after_help = "\
While it is allowed to specify both an fstab and an LXC configuration,
there is generally no reason to do so, since only one is needed.

If you need user capabilities, you need to supply at least libnsl and
libnss_compat (and/or others, if configured in nsswitch.conf).")]
#[command(group(ArgGroup::new("files").required(true).args(["copy", "make_mountpoints"])))]
struct Cli {
    /// Copy specified programs and dependencies to DEST
    #[arg(short, long, value_name = "DEST")]
    copy: Option<PathBuf>,

    /// Create mount points for programs and dependencies in DEST
    #[arg(short = 'm', long, value_name = "DEST")]
    make_mountpoints: Option<PathBuf>,

    /// File to append fstab lines to
    #[arg(short, long, value_name = "FILE")]
    fstab: Option<PathBuf>,

    /// File to append lxc-configuration mount entries to
    #[arg(short, long, value_name = "FILE")]
    lxc_conf: Option<PathBuf>,

    /// Create user files (/etc/{passwd,group})
    #[arg(short, long)]
    user_files: bool,

    /// Create basic inittab
    #[arg(short, long)]
    inittab: bool,

    /// Keep the invoking user as owner of copied files instead of root
    #[arg(long)]
    no_chown: bool,

    /// Dependency inspector to run
    #[arg(long, env = "MINROOT_LDD", default_value = "ldd", value_name = "PROGRAM")]
    ldd: String,

    /// Log every file handled
    #[arg(short, long)]
    verbose: bool,

    /// Path to a program or library that should be included in the container
    #[arg(required = true, value_name = "PROGRAM")]
    program: Vec<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<BuildConfig> {
        let (dest, mode) = match (self.copy, self.make_mountpoints) {
            (Some(dest), None) => (dest, Mode::Copy),
            (None, Some(dest)) => (dest, Mode::Mountpoint),
            _ => bail!("exactly one of --copy or --make-mountpoints is required"),
        };

        let mut config = BuildConfig::new(dest, mode, self.program);
        config.fstab = self.fstab;
        config.lxc_conf = self.lxc_conf;
        config.user_files = self.user_files;
        config.inittab = self.inittab;
        if self.no_chown {
            config.ownership = Ownership::Preserve;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence
    let fallback = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    let ldd = Ldd::new(&cli.ldd);
    let config = cli.into_config()?;
    let lines = build(&config, &ldd)?;

    tracing::info!(
        dest = %config.dest.display(),
        files = lines.len(),
        "container root ready"
    );
    Ok(())
}
