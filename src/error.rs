use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while reading `ldd` output.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LddError {
    #[error("unparsable ldd line: {line:?}")]
    MalformedLine { line: String },

    #[error("shared library {library} not found on host")]
    LibraryNotFound { library: String },

    #[error("ldd reported a relative path {path:?} in line {line:?}")]
    RelativePath { path: String, line: String },
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("source file does not exist: {}", .path.display())]
    MissingSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
