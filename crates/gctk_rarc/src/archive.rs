use std::cmp::Reverse;
use std::io::{Cursor, Seek, SeekFrom};

use binrw::{BinRead, BinResult, BinWrite};
use tracing::{debug, warn};

use crate::records::{
    EntryFlags, RarcEntryRecord, RarcHeader, RarcInfo, RarcNode, ALIGNMENT,
    ENTRY_SIZE, HEADER_SIZE, INFO_SIZE, MAGIC, NODE_SIZE,
};
use crate::{RarcError, Result};

/// A file stored in a RARC archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    name: String,
    path: String,
    flags: EntryFlags,
    file_id: u16,
    data: Vec<u8>,

    /// Bytes between the end of the payload and the next payload in the
    /// original archive.
    slack: Vec<u8>,
    modified: bool,
    /// Another entry starts at the same original offset with at least as many bytes.
    shared: bool,

    record_index: usize,
    original_offset: u32,
    original_footprint: usize,
}

impl ArchiveEntry {
    /// The file name as stored in the string table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the file relative to the root node, using `/` separators.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn flags(&self) -> EntryFlags {
        self.flags
    }

    pub fn file_id(&self) -> u16 {
        self.file_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the entry is flagged as holding compressed data.
    ///
    /// The flag is a loader hint; the archive itself never transforms payloads.
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(EntryFlags::COMPRESSED)
    }

    pub fn is_yaz0(&self) -> bool {
        self.is_compressed() && self.flags.contains(EntryFlags::YAZ0)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Offset of the payload relative to the data section when the archive was parsed.
    pub fn original_offset(&self) -> u32 {
        self.original_offset
    }

    /// Replace the payload. The entry is re-packed with zero padding on the next
    /// [`RarcArchive::to_bytes`].
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.modified = true;
    }

    /// Replace the attribute byte, e.g. to mark a payload as Yaz0 compressed.
    pub fn set_flags(&mut self, flags: EntryFlags) {
        if self.flags != flags {
            self.flags = flags;
            self.modified = true;
        }
    }

    fn matches(&self, query: &str) -> bool {
        if query.contains('/') {
            self.path.eq_ignore_ascii_case(query.trim_start_matches('/'))
        } else {
            self.name.eq_ignore_ascii_case(query)
        }
    }
}

/// A parsed RARC archive that re-serializes losslessly.
///
/// Everything in front of the file data section (header, info block, node and
/// entry tables, string table and their padding) is kept verbatim and only the
/// size and offset fields are regenerated. Unmodified payloads keep the bytes
/// that followed them, so an untouched archive serializes to its original bytes.
#[derive(Debug, Clone)]
pub struct RarcArchive {
    header: RarcHeader,
    info: RarcInfo,
    nodes: Vec<RarcNode>,
    records: Vec<RarcEntryRecord>,

    prefix: Vec<u8>,
    /// Bytes between the start of the data section and the first payload.
    lead: Vec<u8>,

    entries: Vec<ArchiveEntry>,
    /// Indices into `entries`, ordered by original payload offset.
    packing_order: Vec<usize>,
}

impl RarcArchive {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let fixed_size = (HEADER_SIZE + INFO_SIZE) as u64;
        check_range(bytes, "header", 0, fixed_size)?;

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(RarcError::InvalidMagic(magic));
        }

        let mut cursor = Cursor::new(bytes);
        let header = RarcHeader::read(&mut cursor)?;
        let info = RarcInfo::read(&mut cursor)?;

        let data_start = HEADER_SIZE as u64 + header.data_offset as u64;
        check_range(bytes, "file data", data_start, 0)?;

        let node_start = HEADER_SIZE as u64 + info.node_offset as u64;
        let node_len = info.node_count as u64 * NODE_SIZE as u64;
        check_table(bytes, "node table", node_start, node_len, data_start)?;

        let entry_start = HEADER_SIZE as u64 + info.entry_offset as u64;
        let entry_len = info.entry_count as u64 * ENTRY_SIZE as u64;
        check_table(bytes, "entry table", entry_start, entry_len, data_start)?;

        let string_start = HEADER_SIZE as u64 + info.string_table_offset as u64;
        let string_len = info.string_table_size as u64;
        check_table(bytes, "string table", string_start, string_len, data_start)?;
        let strings = &bytes[string_start as usize..(string_start + string_len) as usize];

        cursor.seek(SeekFrom::Start(node_start))?;
        let nodes = (0..info.node_count)
            .map(|_| RarcNode::read(&mut cursor))
            .collect::<BinResult<Vec<_>>>()?;

        cursor.seek(SeekFrom::Start(entry_start))?;
        let records = (0..info.entry_count)
            .map(|_| RarcEntryRecord::read(&mut cursor))
            .collect::<BinResult<Vec<_>>>()?;

        for (index, node) in nodes.iter().enumerate() {
            let end = node.first_entry as u64 + node.entry_count as u64;
            if end > records.len() as u64 {
                return Err(RarcError::InvalidEntryRange {
                    node: index,
                    first: node.first_entry,
                    end: end as u32,
                    count: records.len(),
                });
            }
        }

        let paths = resolve_paths(&nodes, &records, strings)?;

        let mut entries = Vec::new();
        for (record_index, record) in records.iter().enumerate() {
            if record.is_directory() {
                continue;
            }

            let name = read_name(strings, record.name_offset())?;
            let offset = data_start + record.data_offset as u64;
            check_range(bytes, "file data", offset, record.data_size as u64)?;
            let data = bytes[offset as usize..(offset + record.data_size as u64) as usize].to_vec();

            let path = match &paths[record_index] {
                Some(path) => path.clone(),
                None => {
                    warn!(name = %name, "file entry is not reachable from the root node");
                    name.clone()
                }
            };

            entries.push(ArchiveEntry {
                name,
                path,
                flags: record.flags(),
                file_id: record.file_id,
                original_footprint: data.len(),
                data,
                slack: Vec::new(),
                modified: false,
                shared: false,
                record_index,
                original_offset: record.data_offset,
            });
        }

        let mut packing_order: Vec<usize> = (0..entries.len()).collect();
        packing_order.sort_by_key(|&index| {
            let entry = &entries[index];
            (entry.original_offset, Reverse(entry.data.len()), index)
        });

        // Entries at the same offset share the first one's payload. Slack runs
        // to the next payload, or to the end of the archive for the last one.
        for (position, &index) in packing_order.iter().enumerate() {
            let offset = entries[index].original_offset;
            if position > 0 && entries[packing_order[position - 1]].original_offset == offset {
                let entry = &mut entries[index];
                entry.shared = true;
                entry.original_footprint = 0;
                continue;
            }

            let start = data_start as usize + offset as usize;
            let end = start + entries[index].data.len();
            let next_start = packing_order[position + 1..]
                .iter()
                .map(|&next| entries[next].original_offset)
                .find(|&next| next != offset)
                .map(|next| data_start as usize + next as usize)
                .unwrap_or(bytes.len());

            if next_start < end {
                warn!(
                    name = %entries[index].name,
                    "payload overlaps the next payload, archive will not re-serialize identically"
                );
                continue;
            }

            let entry = &mut entries[index];
            entry.slack = bytes[end..next_start].to_vec();
            entry.original_footprint += entry.slack.len();
        }

        let lead_end = packing_order
            .first()
            .map(|&index| data_start as usize + entries[index].original_offset as usize)
            .unwrap_or(bytes.len());

        debug!(
            nodes = nodes.len(),
            entries = records.len(),
            files = entries.len(),
            "parsed RARC archive"
        );

        Ok(Self {
            header,
            info,
            nodes,
            records,
            prefix: bytes[..data_start as usize].to_vec(),
            lead: bytes[data_start as usize..lead_end].to_vec(),
            entries,
            packing_order,
        })
    }

    /// Serialize the archive, regenerating every payload offset and size field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let data_start = self.prefix.len();
        let mut out = Vec::with_capacity(data_start + self.header.data_size as usize);
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(&self.lead);

        let mut records = self.records.clone();
        let mut total_delta = 0i64;
        let mut mram_delta = 0i64;
        let mut aram_delta = 0i64;

        // Original and new offset of the last payload written unmodified.
        let mut last_kept: Option<(u32, u32)> = None;

        for &index in &self.packing_order {
            let entry = &self.entries[index];
            let size = u32::try_from(entry.data.len()).map_err(|_| RarcError::TooLarge)?;
            let record = &mut records[entry.record_index];
            record.set_flags(entry.flags);
            record.data_size = size;

            if let Some((original, offset)) = last_kept {
                if entry.shared && !entry.modified && entry.original_offset == original {
                    record.data_offset = offset;
                    continue;
                }
            }

            let offset = u32::try_from(out.len() - data_start).map_err(|_| RarcError::TooLarge)?;
            let entry_start = out.len();
            record.data_offset = offset;

            out.extend_from_slice(&entry.data);
            if entry.modified || entry.shared {
                let padded = align_up_usize(out.len() - data_start, ALIGNMENT as usize);
                out.resize(data_start + padded, 0);
            } else {
                out.extend_from_slice(&entry.slack);
            }
            if !entry.modified {
                last_kept = Some((entry.original_offset, offset));
            } else if !entry.shared {
                last_kept = None;
            }

            let delta = (out.len() - entry_start) as i64 - entry.original_footprint as i64;
            total_delta += delta;
            if entry.flags.contains(EntryFlags::PRELOAD_MRAM) {
                mram_delta += delta;
            } else if entry.flags.contains(EntryFlags::PRELOAD_ARAM) {
                aram_delta += delta;
            }
        }

        let mut header = self.header.clone();
        header.file_size = apply_delta(header.file_size, total_delta)?;
        header.data_size = apply_delta(header.data_size, total_delta)?;
        header.mram_size = apply_delta(header.mram_size, mram_delta)?;
        header.aram_size = apply_delta(header.aram_size, aram_delta)?;

        let mut cursor = Cursor::new(&mut out);
        header.write(&mut cursor)?;
        self.info.write(&mut cursor)?;

        cursor.seek(SeekFrom::Start(HEADER_SIZE as u64 + self.info.node_offset as u64))?;
        for node in &self.nodes {
            node.write(&mut cursor)?;
        }

        cursor.seek(SeekFrom::Start(HEADER_SIZE as u64 + self.info.entry_offset as u64))?;
        for record in &records {
            record.write(&mut cursor)?;
        }

        Ok(out)
    }

    /// Case-insensitive lookup by file name, or by full path when `name` contains `/`.
    pub fn get_entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|entry| entry.matches(name))
    }

    pub fn get_entry_mut(&mut self, name: &str) -> Option<&mut ArchiveEntry> {
        self.entries.iter_mut().find(|entry| entry.matches(name))
    }

    /// Replace the payload of an existing file.
    pub fn set_data(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        let entry = self
            .get_entry_mut(name)
            .ok_or_else(|| RarcError::EntryNotFound(name.to_string()))?;
        entry.set_data(data);
        Ok(())
    }

    /// Files in entry table order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Full in-archive paths of every file.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(ArchiveEntry::path)
    }

    pub fn is_modified(&self) -> bool {
        self.entries.iter().any(ArchiveEntry::is_modified)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn check_range(bytes: &[u8], section: &'static str, offset: u64, size: u64) -> Result<()> {
    if offset.saturating_add(size) > bytes.len() as u64 {
        return Err(RarcError::Truncated {
            section,
            offset,
            size,
            len: bytes.len(),
        });
    }
    Ok(())
}

fn check_table(
    bytes: &[u8],
    section: &'static str,
    offset: u64,
    size: u64,
    data_start: u64,
) -> Result<()> {
    check_range(bytes, section, offset, size)?;
    if size > 0 && offset + size > data_start {
        return Err(RarcError::TableOverlapsData {
            section,
            offset,
            data_start,
        });
    }
    Ok(())
}

fn read_name(strings: &[u8], offset: u32) -> Result<String> {
    let tail = strings
        .get(offset as usize..)
        .filter(|tail| !tail.is_empty())
        .ok_or(RarcError::InvalidNameOffset(offset))?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Walk the node tree from the root and compute the path of every reachable entry.
fn resolve_paths(
    nodes: &[RarcNode],
    records: &[RarcEntryRecord],
    strings: &[u8],
) -> Result<Vec<Option<String>>> {
    let mut paths = vec![None; records.len()];
    if nodes.is_empty() {
        return Ok(paths);
    }

    let mut visited = vec![false; nodes.len()];
    let mut stack = vec![(0usize, String::new())];

    while let Some((node_index, prefix)) = stack.pop() {
        if std::mem::replace(&mut visited[node_index], true) {
            continue;
        }

        let node = &nodes[node_index];
        let first = node.first_entry as usize;
        for record_index in first..first + node.entry_count as usize {
            let record = &records[record_index];
            let name = read_name(strings, record.name_offset())?;
            if record.is_directory() && (name == "." || name == "..") {
                continue;
            }

            let path = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };

            if record.is_directory() {
                let child = record.data_offset as usize;
                if child >= nodes.len() {
                    return Err(RarcError::InvalidNodeIndex(record.data_offset));
                }
                stack.push((child, path.clone()));
            }
            paths[record_index] = Some(path);
        }
    }

    Ok(paths)
}

fn apply_delta(value: u32, delta: i64) -> Result<u32> {
    u32::try_from(value as i64 + delta).map_err(|_| RarcError::TooLarge)
}

fn align_up_usize(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}
