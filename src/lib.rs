pub mod build;
pub mod closure;
pub mod devices;
pub mod error;
pub mod etc;
pub mod ldd;
pub mod mounts;
pub mod rootfs;

// Re-export main types and functions for easier testing
pub use build::{BuildConfig, build};
pub use closure::{ClosureSet, dereference, resolve_closure};
pub use error::{LddError, ResolveError};
pub use ldd::{DependencyInspector, Ldd, LddOutput, parse_ldd_output, resolve_dependencies};
pub use mounts::MountLine;
pub use rootfs::{Materializer, Mode, Ownership, reroot};
