//! Error types for patching and exporting.
//!
//! Every fallible function in this crate returns [`Result<T>`]. Errors from the
//! codec crates convert automatically and keep their category: a malformed
//! archive, disc or compressed stream is a format error, a missing path is a
//! not-found error, and filesystem failures are IO errors.

use camino::Utf8PathBuf;
use gctk_gcm::DiscError;
use gctk_rarc::RarcError;
use gctk_yaz0::Yaz0Error;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while patching or exporting a disc.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading the source image, build output or writing the destination failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The source disc is malformed, or a disc path is missing.
    #[error("disc error: {0}")]
    Disc(#[from] DiscError),

    /// The nested archive could not be parsed or re-serialized.
    #[error("archive error: {0}")]
    Archive(#[from] RarcError),

    /// A Yaz0 stream could not be decoded or encoded.
    #[error("compression error: {0}")]
    Compression(#[from] Yaz0Error),

    /// A build module has neither an archive entry nor a direct disc path.
    #[error("module '{module}' is not in the archive as '{archive_entry}' and the disc has no '{disc_path}'")]
    ModuleNotFound {
        module: String,
        archive_entry: String,
        disc_path: String,
    },

    /// An overlay path is not part of the source disc.
    #[error("overlay path '{0}' does not exist on the disc")]
    UnknownOverlayPath(String),

    /// An overlay cannot be applied to the given region.
    #[error("invalid overlay for '{path}': {reason}")]
    InvalidOverlay { path: String, reason: String },

    /// The re-laid-out disc does not fit.
    #[error("patched disc needs {size:#x} bytes, the limit is {limit:#x}")]
    DiscTooLarge { size: u64, limit: u64 },

    /// A required build artifact is missing.
    #[error("missing build artifact: {0}")]
    MissingArtifact(Utf8PathBuf),

    /// The build output directory does not exist or cannot be listed.
    #[error("invalid build directory: {0}")]
    InvalidBuildDir(Utf8PathBuf),

    /// Catch-all for errors from artifact providers and other sources.
    #[error("{0}")]
    Other(String),
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    NotFound,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::MissingArtifact(_) | Error::InvalidBuildDir(_) => ErrorKind::Io,
            Error::Disc(DiscError::Io(_)) | Error::Archive(RarcError::Io(_)) => ErrorKind::Io,
            Error::Disc(DiscError::NotFound(_))
            | Error::Archive(RarcError::EntryNotFound(_))
            | Error::ModuleNotFound { .. }
            | Error::UnknownOverlayPath(_) => ErrorKind::NotFound,
            _ => ErrorKind::Format,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
