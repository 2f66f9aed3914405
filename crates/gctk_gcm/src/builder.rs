use byteorder::{BigEndian, ByteOrder};

use crate::fst::build_fst;
use crate::header::{
    DiscHeader, APPLOADER_HEADER_SIZE, APPLOADER_OFFSET, BOOT_SIZE, DOL_HEADER_SIZE,
    GAMECUBE_MAGIC,
};
use crate::{DiscError, Result};

const SYSTEM_ALIGNMENT: u64 = 0x100;
const APPLOADER_CODE: [u8; 0x40] = [0x60; 0x40];

/// Assembles small, well-formed disc images.
///
/// Files are laid out after the FST in insertion order, each aligned to the
/// file alignment (0x8000 by default, as on retail discs). Gaps are filled
/// with the fill byte so that padding is observable.
#[derive(Debug, Clone)]
pub struct DiscBuilder {
    game_id: String,
    title: String,
    dol: Option<Vec<u8>>,
    files: Vec<(String, Vec<u8>)>,
    file_alignment: u64,
    fill: u8,
}

impl DiscBuilder {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            title: String::new(),
            dol: None,
            files: Vec::new(),
            file_alignment: 0x8000,
            fill: 0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Use `dol` as `sys/main.dol`. Its header must describe its own size.
    pub fn with_dol(mut self, dol: Vec<u8>) -> Self {
        self.dol = Some(dol);
        self
    }

    /// Add a file below `files/`.
    pub fn with_file(mut self, path: impl Into<String>, data: Vec<u8>) -> Self {
        self.files.push((path.into(), data));
        self
    }

    pub fn with_file_alignment(mut self, alignment: u64) -> Self {
        self.file_alignment = alignment.max(1);
        self
    }

    pub fn with_fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    pub fn build(self) -> Result<Vec<u8>> {
        if self.game_id.len() > 6 {
            return Err(DiscError::format(format!(
                "game id '{}' is longer than 6 bytes",
                self.game_id
            )));
        }

        let mut image = vec![0u8; BOOT_SIZE as usize];
        image[..self.game_id.len()].copy_from_slice(self.game_id.as_bytes());
        BigEndian::write_u32(&mut image[0x1C..], GAMECUBE_MAGIC);
        let title = &self.title.as_bytes()[..self.title.len().min(0x3DF)];
        image[0x20..0x20 + title.len()].copy_from_slice(title);

        image.resize(APPLOADER_OFFSET as usize, 0);
        let mut apploader = vec![0u8; APPLOADER_HEADER_SIZE as usize];
        apploader[..10].copy_from_slice(b"2003/10/01");
        BigEndian::write_u32(&mut apploader[0x10..], 0x8120_0000);
        BigEndian::write_u32(&mut apploader[0x14..], APPLOADER_CODE.len() as u32);
        image.extend_from_slice(&apploader);
        image.extend_from_slice(&APPLOADER_CODE);

        let dol_offset = self.pad_to(&mut image, SYSTEM_ALIGNMENT);
        image.extend_from_slice(&self.dol.clone().unwrap_or_else(minimal_dol));

        let fst_offset = self.pad_to(&mut image, SYSTEM_ALIGNMENT);

        // The table size does not depend on the offsets it stores.
        let placeholders: Vec<(String, u32, u32)> = self
            .files
            .iter()
            .map(|(path, _)| (path.clone(), 0, 0))
            .collect();
        let fst_size = build_fst(&placeholders)?.len() as u64;

        let mut cursor = fst_offset + fst_size;
        let mut locations = Vec::with_capacity(self.files.len());
        for (path, data) in &self.files {
            let offset = align_up(cursor, self.file_alignment);
            locations.push((path.clone(), to_u32(offset)?, to_u32(data.len() as u64)?));
            cursor = offset + data.len() as u64;
        }
        let fst = build_fst(&locations)?;
        image.extend_from_slice(&fst);

        for ((_, data), (_, offset, _)) in self.files.iter().zip(&locations) {
            image.resize(*offset as usize, self.fill);
            image.extend_from_slice(data);
        }

        DiscHeader::write_layout(
            &mut image[..BOOT_SIZE as usize],
            to_u32(dol_offset)?,
            to_u32(fst_offset)?,
            to_u32(fst_size)?,
        );

        Ok(image)
    }

    fn pad_to(&self, image: &mut Vec<u8>, alignment: u64) -> u64 {
        let offset = align_up(image.len() as u64, alignment);
        image.resize(offset as usize, self.fill);
        offset
    }
}

/// A DOL with a single 0x40 byte text section.
fn minimal_dol() -> Vec<u8> {
    let mut dol = vec![0u8; DOL_HEADER_SIZE as usize];
    BigEndian::write_u32(&mut dol[0x00..], DOL_HEADER_SIZE as u32);
    BigEndian::write_u32(&mut dol[0x48..], 0x8000_3100);
    BigEndian::write_u32(&mut dol[0x90..], 0x40);
    BigEndian::write_u32(&mut dol[0xE0..], 0x8000_3100);
    dol.extend_from_slice(&[0x60, 0x00, 0x00, 0x00].repeat(0x10));
    dol
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| DiscError::format(format!("offset {value:#x} does not fit in 32 bits")))
}
