//! Boot block, apploader and DOL header fields.

use byteorder::{BigEndian, ByteOrder};

use crate::{DiscError, Result};

/// Size of `sys/boot.bin`.
pub const BOOT_SIZE: u64 = 0x440;
pub const BI2_OFFSET: u64 = 0x440;
/// Size of `sys/bi2.bin`.
pub const BI2_SIZE: u64 = 0x2000;
pub const APPLOADER_OFFSET: u64 = 0x2440;
pub const APPLOADER_HEADER_SIZE: u64 = 0x20;

/// Magic word at 0x1C identifying a GameCube disc.
pub const GAMECUBE_MAGIC: u32 = 0xC233_9F3D;

/// Capacity of a standard GameCube disc.
pub const MAX_DISC_SIZE: u64 = 0x5705_8000;

pub const DOL_HEADER_SIZE: u64 = 0x100;
const DOL_SECTION_COUNT: usize = 18;

const MAGIC_OFFSET: usize = 0x1C;
const TITLE_OFFSET: usize = 0x20;
const TITLE_SIZE: usize = 0x3E0;
pub(crate) const DOL_OFFSET_FIELD: usize = 0x420;
pub(crate) const FST_OFFSET_FIELD: usize = 0x424;
pub(crate) const FST_SIZE_FIELD: usize = 0x428;
pub(crate) const MAX_FST_SIZE_FIELD: usize = 0x42C;

/// Parsed fields of the boot block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscHeader {
    pub game_id: String,
    pub disc_number: u8,
    pub version: u8,
    pub title: String,
    pub dol_offset: u32,
    pub fst_offset: u32,
    pub fst_size: u32,
    pub max_fst_size: u32,
}

impl DiscHeader {
    pub fn parse(boot: &[u8]) -> Result<Self> {
        if (boot.len() as u64) < BOOT_SIZE {
            return Err(DiscError::format(format!(
                "boot block is {:#x} bytes, expected {BOOT_SIZE:#x}",
                boot.len()
            )));
        }

        let magic = BigEndian::read_u32(&boot[MAGIC_OFFSET..]);
        if magic != GAMECUBE_MAGIC {
            return Err(DiscError::format(format!(
                "missing GameCube magic (found {magic:#010x})"
            )));
        }

        Ok(Self {
            game_id: c_string(&boot[..6]),
            disc_number: boot[6],
            version: boot[7],
            title: c_string(&boot[TITLE_OFFSET..TITLE_OFFSET + TITLE_SIZE]),
            dol_offset: BigEndian::read_u32(&boot[DOL_OFFSET_FIELD..]),
            fst_offset: BigEndian::read_u32(&boot[FST_OFFSET_FIELD..]),
            fst_size: BigEndian::read_u32(&boot[FST_SIZE_FIELD..]),
            max_fst_size: BigEndian::read_u32(&boot[MAX_FST_SIZE_FIELD..]),
        })
    }

    /// Rewrite the layout fields of a raw boot block.
    ///
    /// The maximum FST size never shrinks below its original value.
    pub fn write_layout(boot: &mut [u8], dol_offset: u32, fst_offset: u32, fst_size: u32) {
        let max_fst_size = BigEndian::read_u32(&boot[MAX_FST_SIZE_FIELD..]).max(fst_size);
        BigEndian::write_u32(&mut boot[DOL_OFFSET_FIELD..], dol_offset);
        BigEndian::write_u32(&mut boot[FST_OFFSET_FIELD..], fst_offset);
        BigEndian::write_u32(&mut boot[FST_SIZE_FIELD..], fst_size);
        BigEndian::write_u32(&mut boot[MAX_FST_SIZE_FIELD..], max_fst_size);
    }
}

/// Total size of the apploader image given its 0x20 byte header.
pub fn apploader_size(header: &[u8]) -> u64 {
    let code_size = BigEndian::read_u32(&header[0x14..]) as u64;
    let trailer_size = BigEndian::read_u32(&header[0x18..]) as u64;
    APPLOADER_HEADER_SIZE + code_size + trailer_size
}

/// Size of a DOL executable, computed from the end of its furthest section.
pub fn dol_size(header: &[u8]) -> u64 {
    (0..DOL_SECTION_COUNT)
        .map(|section| {
            let offset = BigEndian::read_u32(&header[section * 4..]) as u64;
            let size = BigEndian::read_u32(&header[0x90 + section * 4..]) as u64;
            if size == 0 {
                0
            } else {
                offset + size
            }
        })
        .max()
        .unwrap_or(0)
        .max(DOL_HEADER_SIZE)
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
