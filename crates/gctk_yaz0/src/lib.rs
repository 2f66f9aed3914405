//! Yaz0 block compression.
//!
//! Yaz0 is the LZ-style codec Nintendo uses for individually compressed files
//! on GameCube discs (relocatable modules inside `RELS.arc`, stage archives, ...).
//!
//! A stream starts with a 16 byte header:
//!
//! ```text
//! 0x00  "Yaz0"
//! 0x04  u32 (big-endian) uncompressed size
//! 0x08  8 reserved bytes
//! ```
//!
//! followed by control groups. Each control byte governs the next eight
//! operations, most significant bit first: a set bit copies one literal byte,
//! a clear bit copies a run from earlier in the decoded output.
//!
//! # Example
//!
//! ```
//! let raw = b"relocatable module relocatable module".to_vec();
//! let packed = gctk_yaz0::compress(&raw)?;
//! assert!(gctk_yaz0::is_compressed(&packed));
//! assert_eq!(gctk_yaz0::decompress(&packed)?, raw);
//! # Ok::<(), gctk_yaz0::Yaz0Error>(())
//! ```

mod decode;
mod encode;
mod error;

pub use decode::{decompress, decompressed_size};
pub use encode::{compress, compress_with, CompressionLevel};
pub use error::Yaz0Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Yaz0Error>;

/// Stream magic.
pub const MAGIC: [u8; 4] = *b"Yaz0";

/// Size of the fixed stream header.
pub const HEADER_SIZE: usize = 0x10;

/// Largest distance a back-reference can reach.
pub(crate) const WINDOW_SIZE: usize = 0x1000;

/// Shortest run worth encoding as a back-reference.
pub(crate) const MIN_MATCH: usize = 3;

/// Longest run a single back-reference can copy.
pub(crate) const MAX_MATCH: usize = 0xFF + 0x12;

/// Runs at least this long use the three byte back-reference form.
pub(crate) const LONG_MATCH: usize = 0x12;

/// Returns `true` if `data` starts with the Yaz0 magic.
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= HEADER_SIZE && data[..4] == MAGIC
}
