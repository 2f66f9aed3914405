//! Reader and writer for Nintendo RARC archives.
//!
//! RARC is the directory archive format used throughout GameCube titles, for
//! example to bundle relocatable modules into `RELS.arc`. [`RarcArchive`]
//! parses an archive, lets callers swap individual file payloads, and
//! serializes it back. An archive that was not modified serializes to exactly
//! the bytes it was parsed from.
//!
//! ```
//! use gctk_rarc::{RarcArchive, RarcBuilder};
//!
//! let bytes = RarcBuilder::new("rels")
//!     .with_file("mmem/d_a_obj.rel", vec![0; 0x40])
//!     .build()?;
//!
//! let mut archive = RarcArchive::parse(&bytes)?;
//! assert_eq!(archive.to_bytes()?, bytes);
//!
//! archive.set_data("D_A_OBJ.REL", vec![1; 0x10])?;
//! let patched = RarcArchive::parse(&archive.to_bytes()?)?;
//! assert_eq!(patched.get_entry("d_a_obj.rel").unwrap().data(), &[1; 0x10]);
//! # Ok::<(), gctk_rarc::RarcError>(())
//! ```

mod archive;
pub mod builder;
mod error;
mod records;

pub use archive::{ArchiveEntry, RarcArchive};
pub use builder::RarcBuilder;
pub use error::RarcError;
pub use records::{name_hash, EntryFlags, ALIGNMENT, MAGIC};

pub type Result<T> = std::result::Result<T, RarcError>;

/// Returns `true` if `data` starts with the RARC magic.
pub fn is_rarc(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == MAGIC
}
