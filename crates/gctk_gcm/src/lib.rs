//! Read-only model of GameCube (GCM) disc images.
//!
//! A [`DiscImage`] exposes every byte range the disc's tables describe as a
//! [`FileRecord`]:
//!
//! | Path | Region |
//! |---|---|
//! | `sys/boot.bin` | disc header, 0x440 bytes at 0x0 |
//! | `sys/bi2.bin` | 0x2000 bytes at 0x440 |
//! | `sys/apploader.img` | at 0x2440, size from its own header |
//! | `sys/main.dol` | at the header's DOL offset, size from the DOL sections |
//! | `sys/fst.bin` | the file system table |
//! | `files/...` | every file listed in the file system table |
//!
//! Directories are structural: they can be listed but are never records.

pub mod builder;
mod disc;
mod error;
pub mod fst;
pub mod header;

pub use builder::DiscBuilder;
pub use disc::*;
pub use error::DiscError;
pub use fst::{Fst, FstEntry, FstEntryKind};
pub use header::{DiscHeader, MAX_DISC_SIZE};

pub type Result<T> = std::result::Result<T, DiscError>;
