use std::io;

use thiserror::Error;

/// Errors produced while reading a disc image.
#[derive(Error, Debug)]
pub enum DiscError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed disc image: {0}")]
    Format(String),

    #[error("'{0}' does not exist on the disc")]
    NotFound(String),

    #[error("{what} at {offset:#x} (+{size:#x}) extends past the end of the image ({len:#x} bytes)")]
    OutOfBounds {
        what: String,
        offset: u64,
        size: u64,
        len: u64,
    },
}

impl DiscError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Whether the error was caused by a malformed image rather than IO or a missing path.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_) | Self::OutOfBounds { .. })
    }
}
