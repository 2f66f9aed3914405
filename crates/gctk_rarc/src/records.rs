//! On-disk records of the RARC format.
//!
//! All multi-byte fields are big-endian. Offsets in [`RarcInfo`] are relative
//! to the end of the 0x20 byte file header; entry data offsets are relative to
//! the start of the file data section.

use binrw::binrw;

/// Size of the file header that precedes the info block.
pub const HEADER_SIZE: u32 = 0x20;
pub const INFO_SIZE: u32 = 0x20;
pub const NODE_SIZE: u32 = 0x10;
pub const ENTRY_SIZE: u32 = 0x14;

/// Alignment of table sections and file payloads.
pub const ALIGNMENT: u32 = 0x20;

pub const MAGIC: [u8; 4] = *b"RARC";

/// File id stored in directory entries.
pub const DIRECTORY_FILE_ID: u16 = 0xFFFF;

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarcHeader {
    pub magic: [u8; 4],
    pub file_size: u32,
    pub header_size: u32,
    /// Start of file data, relative to the end of this header.
    pub data_offset: u32,
    pub data_size: u32,
    pub mram_size: u32,
    pub aram_size: u32,
    pub reserved: u32,
}

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarcInfo {
    pub node_count: u32,
    pub node_offset: u32,
    pub entry_count: u32,
    pub entry_offset: u32,
    pub string_table_size: u32,
    pub string_table_offset: u32,
    pub next_file_id: u16,
    pub sync_file_ids: u8,
    pub reserved: [u8; 5],
}

/// A directory node.
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarcNode {
    /// `ROOT` for the root node, otherwise the first four characters of the
    /// directory name upper-cased and padded with spaces.
    pub kind: [u8; 4],
    pub name_offset: u32,
    pub name_hash: u16,
    pub entry_count: u16,
    pub first_entry: u32,
}

/// A file or directory entry.
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarcEntryRecord {
    pub file_id: u16,
    pub name_hash: u16,
    /// Flags in the top byte, string table offset in the low 24 bits.
    pub flags_and_name: u32,
    /// Payload offset for files, node index for directories.
    pub data_offset: u32,
    /// Payload size for files, always 0x10 for directories.
    pub data_size: u32,
    pub reserved: u32,
}

impl RarcEntryRecord {
    pub fn flags(&self) -> EntryFlags {
        EntryFlags((self.flags_and_name >> 24) as u8)
    }

    pub fn name_offset(&self) -> u32 {
        self.flags_and_name & 0x00FF_FFFF
    }

    pub fn set_flags(&mut self, flags: EntryFlags) {
        self.flags_and_name = (flags.bits() as u32) << 24 | self.name_offset();
    }

    pub fn is_directory(&self) -> bool {
        self.flags().contains(EntryFlags::DIRECTORY)
    }

    pub fn is_file(&self) -> bool {
        self.flags().contains(EntryFlags::FILE)
    }
}

/// Attribute byte of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntryFlags(pub u8);

impl EntryFlags {
    pub const FILE: EntryFlags = EntryFlags(0x01);
    pub const DIRECTORY: EntryFlags = EntryFlags(0x02);
    pub const COMPRESSED: EntryFlags = EntryFlags(0x04);
    pub const PRELOAD_MRAM: EntryFlags = EntryFlags(0x10);
    pub const PRELOAD_ARAM: EntryFlags = EntryFlags(0x20);
    pub const LOAD_FROM_DVD: EntryFlags = EntryFlags(0x40);
    /// Set together with [`COMPRESSED`](Self::COMPRESSED) when the payload is Yaz0 rather than Yay0.
    pub const YAZ0: EntryFlags = EntryFlags(0x80);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: EntryFlags) -> EntryFlags {
        EntryFlags(self.0 | other.0)
    }

    /// Flags Nintendo's tools assign to a plain file loaded into main memory.
    pub fn default_file() -> EntryFlags {
        EntryFlags::FILE.union(EntryFlags::PRELOAD_MRAM)
    }

    /// Flags for a Yaz0 compressed file loaded into main memory.
    pub fn yaz0_file() -> EntryFlags {
        EntryFlags::default_file()
            .union(EntryFlags::COMPRESSED)
            .union(EntryFlags::YAZ0)
    }
}

/// Hash of an entry or node name as stored next to its string offset.
pub fn name_hash(name: &str) -> u16 {
    name.bytes()
        .fold(0u16, |hash, byte| hash.wrapping_mul(3).wrapping_add(byte as u16))
}

/// Node type tag for a directory name.
pub fn node_kind(name: &str, is_root: bool) -> [u8; 4] {
    if is_root {
        return *b"ROOT";
    }
    let mut kind = [b' '; 4];
    for (slot, byte) in kind.iter_mut().zip(name.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    kind
}

pub fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
