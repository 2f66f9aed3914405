use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, info};

use crate::fst::{Fst, FstEntryKind};
use crate::header::{
    apploader_size, dol_size, DiscHeader, APPLOADER_HEADER_SIZE, APPLOADER_OFFSET, BI2_OFFSET,
    BI2_SIZE, BOOT_SIZE, DOL_HEADER_SIZE,
};
use crate::{DiscError, Result};

pub const BOOT_PATH: &str = "sys/boot.bin";
pub const BI2_PATH: &str = "sys/bi2.bin";
pub const APPLOADER_PATH: &str = "sys/apploader.img";
pub const DOL_PATH: &str = "sys/main.dol";
pub const FST_PATH: &str = "sys/fst.bin";

/// Prefix under which every FST file is exposed.
pub const FILES_ROOT: &str = "files";
pub const SYS_ROOT: &str = "sys";

/// Where a record's location is described on disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Fixed or header-described system region (`sys/...`).
    System,
    /// A file entry of the FST, by entry index.
    Fst(usize),
}

/// A file's byte range inside the original image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub offset: u64,
    pub size: u64,
    pub kind: RecordKind,
}

impl FileRecord {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn fst_index(&self) -> Option<usize> {
        match self.kind {
            RecordKind::Fst(index) => Some(index),
            RecordKind::System => None,
        }
    }
}

/// Read-only view of a GameCube disc image.
///
/// Paths use `/` separators and are matched case-insensitively; records keep
/// the casing stored on disc.
#[derive(Debug)]
pub struct DiscImage<TSource: Read + Seek> {
    header: DiscHeader,
    fst: Fst,
    records: Vec<FileRecord>,
    index: HashMap<String, usize>,
    directories: HashSet<String>,
    source_len: u64,
    source: TSource,
}

impl DiscImage<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening disc image {}", path.display());
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

impl<TSource: Read + Seek> DiscImage<TSource> {
    pub fn from_reader(mut source: TSource) -> Result<Self> {
        let source_len = source.seek(SeekFrom::End(0))?;

        let minimum = APPLOADER_OFFSET + APPLOADER_HEADER_SIZE;
        if source_len < minimum {
            return Err(DiscError::format(format!(
                "image is {source_len:#x} bytes, smaller than the {minimum:#x} byte system area"
            )));
        }

        let boot = read_exact_at(&mut source, 0, BOOT_SIZE)?;
        let header = DiscHeader::parse(&boot)?;

        let apploader_header =
            read_exact_at(&mut source, APPLOADER_OFFSET, APPLOADER_HEADER_SIZE)?;
        let apploader_len = apploader_size(&apploader_header);

        let dol_offset = header.dol_offset as u64;
        check_bounds("DOL header", dol_offset, DOL_HEADER_SIZE, source_len)?;
        let dol_header = read_exact_at(&mut source, dol_offset, DOL_HEADER_SIZE)?;
        let dol_len = dol_size(&dol_header);

        let fst_offset = header.fst_offset as u64;
        let fst_len = header.fst_size as u64;
        check_bounds("FST", fst_offset, fst_len, source_len)?;
        let fst = Fst::parse(read_exact_at(&mut source, fst_offset, fst_len)?)?;

        let mut records = vec![
            system_record(BOOT_PATH, 0, BOOT_SIZE),
            system_record(BI2_PATH, BI2_OFFSET, BI2_SIZE),
            system_record(APPLOADER_PATH, APPLOADER_OFFSET, apploader_len),
            system_record(DOL_PATH, dol_offset, dol_len),
            system_record(FST_PATH, fst_offset, fst_len),
        ];

        let mut directories: HashSet<String> = ["", SYS_ROOT, FILES_ROOT]
            .into_iter()
            .map(str::to_string)
            .collect();

        for entry in fst.entries().iter().skip(1) {
            let path = format!("{FILES_ROOT}/{}", entry.path);
            match entry.kind {
                FstEntryKind::Directory { .. } => {
                    directories.insert(normalize(&path));
                }
                FstEntryKind::File { offset, size } => records.push(FileRecord {
                    path,
                    offset: offset as u64,
                    size: size as u64,
                    kind: RecordKind::Fst(entry.index),
                }),
            }
        }

        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            check_bounds(&record.path, record.offset, record.size, source_len)?;
            if index.insert(normalize(&record.path), position).is_some() {
                return Err(DiscError::format(format!(
                    "duplicate path '{}' in file system table",
                    record.path
                )));
            }
        }

        debug!(
            game_id = %header.game_id,
            files = records.len(),
            directories = directories.len(),
            "parsed disc image"
        );

        Ok(Self {
            header,
            fst,
            records,
            index,
            directories,
            source_len,
            source,
        })
    }

    pub fn header(&self) -> &DiscHeader {
        &self.header
    }

    /// System files followed by FST files in table order.
    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn fst(&self) -> &Fst {
        &self.fst
    }

    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    pub fn find(&self, path: &str) -> Result<&FileRecord> {
        self.index
            .get(&normalize(path))
            .map(|&position| &self.records[position])
            .ok_or_else(|| DiscError::NotFound(path.to_string()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(&normalize(path))
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.directories.contains(&normalize(path))
    }

    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let record = self.find(path)?;
        let (offset, size) = (record.offset, record.size);
        self.read_range(offset, size)
    }

    pub fn read_range(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        check_bounds("read", offset, len, self.source_len)?;
        read_exact_at(&mut self.source, offset, len)
    }

    /// Fill `buf` with the bytes at `offset`.
    pub fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds("read", offset, buf.len() as u64, self.source_len)?;
        self.source.seek(SeekFrom::Start(offset))?;
        self.source.read_exact(buf)?;
        Ok(())
    }

    /// Files below the directory `prefix`, in record order.
    ///
    /// An empty prefix names the image root. Without `recursive` only direct
    /// children are returned. A prefix that is not a directory is `NotFound`,
    /// which distinguishes a missing tree from an empty one.
    pub fn list_directory(&self, prefix: &str, recursive: bool) -> Result<Vec<&FileRecord>> {
        let directory = normalize(prefix);
        if !self.directories.contains(&directory) {
            return Err(DiscError::NotFound(prefix.to_string()));
        }

        let listing = self
            .records
            .iter()
            .filter(|record| {
                let path = normalize(&record.path);
                let relative = if directory.is_empty() {
                    Some(path.as_str())
                } else {
                    path.strip_prefix(&directory)
                        .and_then(|rest| rest.strip_prefix('/'))
                };
                relative.is_some_and(|relative| recursive || !relative.contains('/'))
            })
            .collect();

        Ok(listing)
    }
}

fn system_record(path: &str, offset: u64, size: u64) -> FileRecord {
    FileRecord {
        path: path.to_string(),
        offset,
        size,
        kind: RecordKind::System,
    }
}

/// Lower-case, `/`-separated, without leading or trailing separators.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .trim_matches('/')
        .to_ascii_lowercase()
}

fn check_bounds(what: &str, offset: u64, size: u64, len: u64) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(()),
        _ => Err(DiscError::OutOfBounds {
            what: what.to_string(),
            offset,
            size,
            len,
        }),
    }
}

fn read_exact_at<R: Read + Seek>(source: &mut R, offset: u64, len: u64) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0; len as usize];
    source.read_exact(&mut buf)?;
    Ok(buf)
}
