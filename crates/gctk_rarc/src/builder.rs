use std::collections::HashMap;
use std::io::{Cursor, Seek, SeekFrom};

use binrw::BinWrite;

use crate::records::{
    align_up, name_hash, node_kind, EntryFlags, RarcEntryRecord, RarcHeader, RarcInfo, RarcNode,
    ALIGNMENT, DIRECTORY_FILE_ID, ENTRY_SIZE, HEADER_SIZE, INFO_SIZE, MAGIC, NODE_SIZE,
};
use crate::{RarcError, Result};

/// Authors a new RARC archive from a list of files.
///
/// Directories are created from the `/`-separated file paths. Within a node,
/// files come first, then subdirectories, then the `.` and `..` entries, which
/// is the layout Nintendo's archiver produces.
#[derive(Debug, Clone)]
pub struct RarcBuilder {
    root_name: String,
    files: Vec<BuilderFile>,
}

#[derive(Debug, Clone)]
struct BuilderFile {
    path: String,
    data: Vec<u8>,
    flags: EntryFlags,
}

#[derive(Debug, Default)]
struct DirectoryNode {
    name: String,
    parent: Option<usize>,
    files: Vec<usize>,
    children: Vec<usize>,
}

impl RarcBuilder {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
            files: Vec::new(),
        }
    }

    /// Add a file loaded into main memory.
    pub fn with_file(self, path: impl Into<String>, data: Vec<u8>) -> Self {
        self.with_file_flags(path, data, EntryFlags::default_file())
    }

    pub fn with_file_flags(
        mut self,
        path: impl Into<String>,
        data: Vec<u8>,
        flags: EntryFlags,
    ) -> Self {
        self.files.push(BuilderFile {
            path: path.into(),
            data,
            flags: flags.union(EntryFlags::FILE),
        });
        self
    }

    pub fn build(self) -> Result<Vec<u8>> {
        let directories = self.build_tree()?;

        // Breadth-first node numbering, so the root is node 0.
        let mut order = vec![0usize];
        let mut cursor = 0;
        while cursor < order.len() {
            order.extend(directories[order[cursor]].children.iter().copied());
            cursor += 1;
        }
        let mut node_index = vec![0u32; directories.len()];
        for (index, &directory) in order.iter().enumerate() {
            node_index[directory] = index as u32;
        }

        let mut strings = StringTable::default();
        strings.intern(".");
        strings.intern("..");

        let mut nodes = Vec::with_capacity(order.len());
        let mut records = Vec::new();
        let mut payloads: Vec<&BuilderFile> = Vec::new();

        for &directory_index in &order {
            let directory = &directories[directory_index];
            let first_entry = records.len() as u32;
            let node_name_offset = strings.intern(&directory.name);

            for &file_index in &directory.files {
                let file = &self.files[file_index];
                let name = file_name(&file.path);
                records.push(RarcEntryRecord {
                    file_id: records.len() as u16,
                    name_hash: name_hash(name),
                    flags_and_name: pack_flags(file.flags, strings.intern(name)),
                    data_offset: 0,
                    data_size: u32::try_from(file.data.len()).map_err(|_| RarcError::TooLarge)?,
                    reserved: 0,
                });
                payloads.push(file);
            }

            for &child in &directory.children {
                let name = &directories[child].name;
                records.push(directory_record(
                    name,
                    strings.intern(name),
                    node_index[child],
                ));
            }

            records.push(directory_record(".", 0, node_index[directory_index]));
            let parent = directory
                .parent
                .map(|parent| node_index[parent])
                .unwrap_or(u32::MAX);
            records.push(directory_record("..", 2, parent));

            nodes.push(RarcNode {
                kind: node_kind(&directory.name, directory_index == 0),
                name_offset: node_name_offset,
                name_hash: name_hash(&directory.name),
                entry_count: (records.len() as u32 - first_entry) as u16,
                first_entry,
            });
        }

        let string_bytes = strings.into_bytes();

        let node_offset = INFO_SIZE;
        let entry_offset = align_up(node_offset + nodes.len() as u32 * NODE_SIZE, ALIGNMENT);
        let string_table_offset =
            align_up(entry_offset + records.len() as u32 * ENTRY_SIZE, ALIGNMENT);
        let string_table_size = align_up(string_bytes.len() as u32, ALIGNMENT);
        let data_offset = string_table_offset + string_table_size;

        let mut data = Vec::new();
        let mut mram_size = 0u32;
        let mut aram_size = 0u32;
        let file_records = records.iter_mut().filter(|record| !record.is_directory());
        for (record, file) in file_records.zip(&payloads) {
            record.data_offset = u32::try_from(data.len()).map_err(|_| RarcError::TooLarge)?;
            data.extend_from_slice(&file.data);
            data.resize(align_up(data.len() as u32, ALIGNMENT) as usize, 0);

            let footprint = data.len() as u32 - record.data_offset;
            if file.flags.contains(EntryFlags::PRELOAD_MRAM) {
                mram_size += footprint;
            } else if file.flags.contains(EntryFlags::PRELOAD_ARAM) {
                aram_size += footprint;
            }
        }

        let data_size = u32::try_from(data.len()).map_err(|_| RarcError::TooLarge)?;
        let header = RarcHeader {
            magic: MAGIC,
            file_size: HEADER_SIZE + data_offset + data_size,
            header_size: HEADER_SIZE,
            data_offset,
            data_size,
            mram_size,
            aram_size,
            reserved: 0,
        };
        let info = RarcInfo {
            node_count: nodes.len() as u32,
            node_offset,
            entry_count: records.len() as u32,
            entry_offset,
            string_table_size,
            string_table_offset,
            next_file_id: records.len() as u16,
            sync_file_ids: 1,
            reserved: [0; 5],
        };

        let mut out = Cursor::new(vec![0u8; header.file_size as usize]);
        header.write(&mut out)?;
        info.write(&mut out)?;
        out.seek(SeekFrom::Start((HEADER_SIZE + node_offset) as u64))?;
        for node in &nodes {
            node.write(&mut out)?;
        }
        out.seek(SeekFrom::Start((HEADER_SIZE + entry_offset) as u64))?;
        for record in &records {
            record.write(&mut out)?;
        }

        let mut out = out.into_inner();
        let string_start = (HEADER_SIZE + string_table_offset) as usize;
        out[string_start..string_start + string_bytes.len()].copy_from_slice(&string_bytes);
        let data_start = (HEADER_SIZE + data_offset) as usize;
        out[data_start..].copy_from_slice(&data);

        Ok(out)
    }

    fn build_tree(&self) -> Result<Vec<DirectoryNode>> {
        let mut directories = vec![DirectoryNode {
            name: self.root_name.clone(),
            ..Default::default()
        }];

        for (file_index, file) in self.files.iter().enumerate() {
            let components: Vec<&str> = file.path.split('/').collect();
            if components.iter().any(|component| component.is_empty()) {
                return Err(RarcError::InvalidPath(file.path.clone()));
            }

            let mut current = 0;
            for component in &components[..components.len() - 1] {
                let existing = directories[current]
                    .children
                    .iter()
                    .copied()
                    .find(|&child| directories[child].name.eq_ignore_ascii_case(component));
                current = match existing {
                    Some(child) => child,
                    None => {
                        directories.push(DirectoryNode {
                            name: component.to_string(),
                            parent: Some(current),
                            ..Default::default()
                        });
                        let child = directories.len() - 1;
                        directories[current].children.push(child);
                        child
                    }
                };
            }
            directories[current].files.push(file_index);
        }

        Ok(directories)
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn pack_flags(flags: EntryFlags, name_offset: u32) -> u32 {
    (flags.bits() as u32) << 24 | name_offset
}

fn directory_record(name: &str, name_offset: u32, node: u32) -> RarcEntryRecord {
    RarcEntryRecord {
        file_id: DIRECTORY_FILE_ID,
        name_hash: name_hash(name),
        flags_and_name: pack_flags(EntryFlags::DIRECTORY, name_offset),
        data_offset: node,
        data_size: NODE_SIZE,
        reserved: 0,
    }
}

#[derive(Default)]
struct StringTable {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringTable {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(name) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(name.to_string(), offset);
        offset
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinRead;

    #[test]
    fn test_empty_archive_layout() {
        let bytes = RarcBuilder::new("arc").build().unwrap();
        let mut cursor = Cursor::new(&bytes);
        let header = RarcHeader::read(&mut cursor).unwrap();
        let info = RarcInfo::read(&mut cursor).unwrap();

        assert_eq!(&header.magic, b"RARC");
        assert_eq!(header.file_size as usize, bytes.len());
        assert_eq!(header.data_size, 0);
        assert_eq!(info.node_count, 1);
        assert_eq!(info.entry_count, 2);
        assert_eq!(info.entry_offset % ALIGNMENT, 0);
        assert_eq!(info.string_table_offset % ALIGNMENT, 0);
    }

    #[test]
    fn test_string_table_starts_with_dot_entries() {
        let bytes = RarcBuilder::new("rels")
            .with_file("a.rel", vec![1, 2, 3])
            .build()
            .unwrap();
        let mut cursor = Cursor::new(&bytes);
        let _header = RarcHeader::read(&mut cursor).unwrap();
        let info = RarcInfo::read(&mut cursor).unwrap();

        let start = (HEADER_SIZE + info.string_table_offset) as usize;
        assert_eq!(&bytes[start..start + 16], b".\0..\0rels\0a.rel\0");
    }

    #[test]
    fn test_payloads_are_aligned() {
        let bytes = RarcBuilder::new("rels")
            .with_file("mmem/a.rel", vec![0xAB; 3])
            .with_file("mmem/b.rel", vec![0xCD; 0x41])
            .build()
            .unwrap();
        let mut cursor = Cursor::new(&bytes);
        let header = RarcHeader::read(&mut cursor).unwrap();
        let info = RarcInfo::read(&mut cursor).unwrap();

        cursor
            .seek(SeekFrom::Start((HEADER_SIZE + info.entry_offset) as u64))
            .unwrap();
        let records: Vec<RarcEntryRecord> = (0..info.entry_count)
            .map(|_| RarcEntryRecord::read(&mut cursor).unwrap())
            .collect();
        let offsets: Vec<u32> = records
            .iter()
            .filter(|record| record.is_file())
            .map(|record| record.data_offset)
            .collect();

        assert_eq!(offsets, vec![0, 0x20]);
        assert_eq!(header.data_size, 0x80);
        assert_eq!(header.mram_size, 0x80);
    }

    #[test]
    fn test_rejects_empty_path_components() {
        let result = RarcBuilder::new("rels")
            .with_file("mmem//a.rel", vec![])
            .build();

        assert!(matches!(result, Err(RarcError::InvalidPath(_))));
    }
}
