use std::io;

use thiserror::Error;

/// Errors that can occur while reading, editing or writing a RARC archive.
#[derive(Error, Debug)]
pub enum RarcError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("binrw error: {0}")]
    BinRw(#[from] binrw::Error),

    #[error("invalid RARC magic: {0:02x?}")]
    InvalidMagic([u8; 4]),

    #[error("{section} at {offset:#x} (+{size:#x}) extends past the end of the archive ({len:#x} bytes)")]
    Truncated {
        section: &'static str,
        offset: u64,
        size: u64,
        len: usize,
    },

    #[error("name offset {0:#x} is outside the string table")]
    InvalidNameOffset(u32),

    #[error("directory entry references missing node {0}")]
    InvalidNodeIndex(u32),

    #[error("node {node} references entries {first}..{end} but the table has {count}")]
    InvalidEntryRange {
        node: usize,
        first: u32,
        end: u32,
        count: usize,
    },

    #[error("{section} at {offset:#x} overlaps the file data section at {data_start:#x}")]
    TableOverlapsData {
        section: &'static str,
        offset: u64,
        data_start: u64,
    },

    #[error("archive has no file named '{0}'")]
    EntryNotFound(String),

    #[error("invalid archive path: '{0}'")]
    InvalidPath(String),

    #[error("archive exceeds the 32-bit size limit")]
    TooLarge,
}
