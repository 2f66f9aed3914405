//! File system table (`sys/fst.bin`).
//!
//! The table is a flat array of 12 byte entries followed by a string table:
//!
//! ```text
//! 0x00  u8   0 = file, 1 = directory
//! 0x01  u24  name offset into the string table
//! 0x04  u32  file: data offset on disc      directory: parent entry index
//! 0x08  u32  file: data size                directory: index one past the last child
//! ```
//!
//! Entry 0 is the root directory, whose end index is the total entry count.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};

use crate::{DiscError, Result};

pub const FST_ENTRY_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FstEntryKind {
    File { offset: u32, size: u32 },
    Directory { parent: u32, end: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstEntry {
    pub index: usize,
    pub name: String,
    /// Full path below the root, `/`-separated.
    pub path: String,
    pub kind: FstEntryKind,
}

impl FstEntry {
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, FstEntryKind::Directory { .. })
    }
}

/// A parsed FST that keeps its raw bytes for re-emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fst {
    raw: Vec<u8>,
    entries: Vec<FstEntry>,
}

impl Fst {
    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        if raw.len() < FST_ENTRY_SIZE {
            return Err(DiscError::format("file system table is empty"));
        }
        if raw[0] == 0 {
            return Err(DiscError::format("root FST entry is not a directory"));
        }

        let count = BigEndian::read_u32(&raw[8..]) as usize;
        let strings_start = count
            .checked_mul(FST_ENTRY_SIZE)
            .filter(|&end| end <= raw.len() && count > 0)
            .ok_or_else(|| {
                DiscError::format(format!(
                    "FST declares {count} entries but is only {:#x} bytes",
                    raw.len()
                ))
            })?;
        let strings = &raw[strings_start..];

        let mut entries = Vec::with_capacity(count);
        entries.push(FstEntry {
            index: 0,
            name: String::new(),
            path: String::new(),
            kind: FstEntryKind::Directory {
                parent: 0,
                end: count as u32,
            },
        });

        // (end index, path) of every directory enclosing the current entry
        let mut stack: Vec<(usize, String)> = vec![(count, String::new())];

        for index in 1..count {
            while stack.last().is_some_and(|(end, _)| index >= *end) {
                stack.pop();
            }
            let prefix = stack.last().map(|(_, path)| path.as_str()).unwrap_or("");

            let record = &raw[index * FST_ENTRY_SIZE..(index + 1) * FST_ENTRY_SIZE];
            let name_offset = BigEndian::read_u24(&record[1..]) as usize;
            let name = read_name(strings, name_offset).ok_or_else(|| {
                DiscError::format(format!(
                    "FST entry {index} has name offset {name_offset:#x} outside the string table"
                ))
            })?;
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };

            let field1 = BigEndian::read_u32(&record[4..]);
            let field2 = BigEndian::read_u32(&record[8..]);
            let kind = if record[0] == 0 {
                FstEntryKind::File {
                    offset: field1,
                    size: field2,
                }
            } else {
                let end = field2 as usize;
                let enclosing_end = stack.last().map(|(end, _)| *end).unwrap_or(count);
                if end <= index || end > enclosing_end {
                    return Err(DiscError::format(format!(
                        "FST directory '{path}' ends at entry {end}, outside {index}..={enclosing_end}"
                    )));
                }
                stack.push((end, path.clone()));
                FstEntryKind::Directory {
                    parent: field1,
                    end: field2,
                }
            };

            entries.push(FstEntry {
                index,
                name,
                path,
                kind,
            });
        }

        Ok(Self { raw, entries })
    }

    pub fn entries(&self) -> &[FstEntry] {
        &self.entries
    }

    pub fn files(&self) -> impl Iterator<Item = &FstEntry> {
        self.entries.iter().filter(|entry| !entry.is_directory())
    }

    pub fn directories(&self) -> impl Iterator<Item = &FstEntry> {
        self.entries
            .iter()
            .skip(1)
            .filter(|entry| entry.is_directory())
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Emit the table with new `(offset, size)` values for the given file entries.
    ///
    /// Names, directory structure and the string table are copied unchanged.
    pub fn with_file_locations(&self, locations: &HashMap<usize, (u32, u32)>) -> Vec<u8> {
        let mut raw = self.raw.clone();
        for (&index, &(offset, size)) in locations {
            let Some(entry) = self.entries.get(index) else {
                continue;
            };
            if entry.is_directory() {
                continue;
            }
            let record = &mut raw[index * FST_ENTRY_SIZE..(index + 1) * FST_ENTRY_SIZE];
            BigEndian::write_u32(&mut record[4..], offset);
            BigEndian::write_u32(&mut record[8..], size);
        }
        raw
    }
}

fn read_name(strings: &[u8], offset: usize) -> Option<String> {
    let tail = strings.get(offset..).filter(|tail| !tail.is_empty())?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Some(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Serialize a file system table from `/`-separated file paths and their locations.
///
/// Entries are emitted depth first with children sorted case-insensitively.
pub fn build_fst(files: &[(String, u32, u32)]) -> Result<Vec<u8>> {
    #[derive(Default)]
    struct Directory {
        children: Vec<(String, Child)>,
    }
    enum Child {
        File(u32, u32),
        Directory(Directory),
    }

    fn insert(dir: &mut Directory, components: &[&str], location: (u32, u32)) -> Result<()> {
        let Some((first, rest)) = components.split_first() else {
            return Err(DiscError::format("empty FST path"));
        };
        let position = dir
            .children
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(first));

        if rest.is_empty() {
            if position.is_some() {
                return Err(DiscError::format(format!("duplicate FST path component '{first}'")));
            }
            dir.children
                .push((first.to_string(), Child::File(location.0, location.1)));
            return Ok(());
        }

        let index = match position {
            Some(index) => index,
            None => {
                dir.children
                    .push((first.to_string(), Child::Directory(Directory::default())));
                dir.children.len() - 1
            }
        };
        match &mut dir.children[index].1 {
            Child::Directory(child) => insert(child, rest, location),
            Child::File(..) => Err(DiscError::format(format!(
                "'{first}' is both a file and a directory"
            ))),
        }
    }

    fn emit(
        dir: &mut Directory,
        own_index: u32,
        entries: &mut Vec<[u8; FST_ENTRY_SIZE]>,
        strings: &mut Vec<u8>,
    ) {
        dir.children.sort_by_key(|(name, _)| name.to_ascii_lowercase());
        for (name, child) in dir.children.iter_mut() {
            let name_offset = strings.len() as u32;
            strings.extend_from_slice(name.as_bytes());
            strings.push(0);

            let mut record = [0u8; FST_ENTRY_SIZE];
            BigEndian::write_u24(&mut record[1..], name_offset);
            match child {
                Child::File(offset, size) => {
                    BigEndian::write_u32(&mut record[4..], *offset);
                    BigEndian::write_u32(&mut record[8..], *size);
                    entries.push(record);
                }
                Child::Directory(sub) => {
                    record[0] = 1;
                    BigEndian::write_u32(&mut record[4..], own_index);
                    let position = entries.len();
                    entries.push(record);
                    emit(sub, position as u32, entries, strings);
                    let end = entries.len() as u32;
                    BigEndian::write_u32(&mut entries[position][8..], end);
                }
            }
        }
    }

    let mut root = Directory::default();
    for (path, offset, size) in files {
        let components: Vec<&str> = path.split('/').collect();
        if components.iter().any(|component| component.is_empty()) {
            return Err(DiscError::format(format!("invalid FST path '{path}'")));
        }
        insert(&mut root, &components, (*offset, *size))?;
    }

    let mut root_record = [0u8; FST_ENTRY_SIZE];
    root_record[0] = 1;
    let mut entries = vec![root_record];
    let mut strings = Vec::new();
    emit(&mut root, 0, &mut entries, &mut strings);

    let count = entries.len() as u32;
    BigEndian::write_u32(&mut entries[0][8..], count);

    let mut raw: Vec<u8> = entries.into_iter().flatten().collect();
    raw.extend_from_slice(&strings);
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        build_fst(&[
            ("RELS.arc".to_string(), 0x10000, 0x400),
            ("rel/Final/Release/d_a_obj.rel".to_string(), 0x18000, 0x120),
            ("rel/Final/Release/d_a_npc.rel".to_string(), 0x20000, 0x80),
            ("map/Final/Release/frameworkF.map".to_string(), 0x28000, 0x30),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_paths() {
        let fst = Fst::parse(sample()).unwrap();

        let files: Vec<&str> = fst.files().map(|entry| entry.path.as_str()).collect();
        assert_eq!(
            files,
            vec![
                "map/Final/Release/frameworkF.map",
                "rel/Final/Release/d_a_npc.rel",
                "rel/Final/Release/d_a_obj.rel",
                "RELS.arc",
            ]
        );

        let dirs: Vec<&str> = fst.directories().map(|entry| entry.path.as_str()).collect();
        assert_eq!(
            dirs,
            vec![
                "map",
                "map/Final",
                "map/Final/Release",
                "rel",
                "rel/Final",
                "rel/Final/Release",
            ]
        );
    }

    #[test]
    fn test_file_locations() {
        let fst = Fst::parse(sample()).unwrap();
        let obj = fst
            .files()
            .find(|entry| entry.name == "d_a_obj.rel")
            .unwrap();

        assert_eq!(
            obj.kind,
            FstEntryKind::File {
                offset: 0x18000,
                size: 0x120
            }
        );
    }

    #[test]
    fn test_directory_parent_indices() {
        let fst = Fst::parse(sample()).unwrap();
        let final_dir = fst
            .entries()
            .iter()
            .find(|entry| entry.path == "rel/Final")
            .unwrap();
        let rel_dir = fst.entries().iter().find(|entry| entry.path == "rel").unwrap();

        assert!(matches!(
            final_dir.kind,
            FstEntryKind::Directory { parent, .. } if parent as usize == rel_dir.index
        ));
        assert!(matches!(rel_dir.kind, FstEntryKind::Directory { parent: 0, .. }));
    }

    #[test]
    fn test_with_file_locations_only_touches_offsets() {
        let raw = sample();
        let fst = Fst::parse(raw.clone()).unwrap();
        let arc = fst.files().find(|entry| entry.name == "RELS.arc").unwrap();

        let mut locations = HashMap::new();
        locations.insert(arc.index, (0x12000, 0x500));
        let rewritten = fst.with_file_locations(&locations);

        let reparsed = Fst::parse(rewritten.clone()).unwrap();
        assert_eq!(
            reparsed.entries()[arc.index].kind,
            FstEntryKind::File {
                offset: 0x12000,
                size: 0x500
            }
        );
        let changed = raw
            .iter()
            .zip(&rewritten)
            .filter(|(a, b)| a != b)
            .count();
        assert!(changed <= 8);
        assert_eq!(raw.len(), rewritten.len());
    }

    #[test]
    fn test_rejects_bad_entry_count() {
        let mut raw = sample();
        BigEndian::write_u32(&mut raw[8..], 0xFFFF);

        assert!(matches!(Fst::parse(raw), Err(DiscError::Format(_))));
    }

    #[test]
    fn test_rejects_directory_end_outside_parent() {
        let mut raw = sample();
        // Entry 1 is the "map" directory.
        BigEndian::write_u32(&mut raw[FST_ENTRY_SIZE + 8..], 0x100);

        assert!(matches!(Fst::parse(raw), Err(DiscError::Format(_))));
    }
}
