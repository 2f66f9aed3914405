//! Output layout of a patched disc.
//!
//! The planner walks every region of the source image in on-disc order and
//! decides where it lands in the output:
//!
//! - A region keeps its original offset as long as everything before it still
//!   fits in front of it.
//! - Otherwise it moves to the end of the previous region, rounded up to the
//!   alignment its original offset had (at least 4, at most 0x8000 bytes).
//!
//! Files whose bytes lie inside another unchanged file share that file's
//! region and move with it. Regions never move earlier, so an unchanged disc
//! plans to exactly its original layout. The boot block's layout fields and the FST are rebuilt
//! from the plan.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::io::{Read, Seek};

use gctk_gcm::{
    normalize, DiscHeader, DiscImage, FileRecord, RecordKind, BI2_PATH, BOOT_PATH, DOL_PATH,
    FST_PATH, MAX_DISC_SIZE,
};

use crate::error::{Error, Result};
use crate::store::OverlayStore;

pub const MIN_ALIGNMENT: u64 = 4;
pub const MAX_ALIGNMENT: u64 = 0x8000;

/// Where the bytes of a planned region come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    /// Copied from the source image.
    Original,
    /// Taken from the overlay store.
    Overlay,
    /// Rebuilt from the layout (`sys/boot.bin` and `sys/fst.bin`).
    Generated,
    /// Inside the range of another original region; no bytes of its own.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRegion {
    pub path: String,
    pub kind: RecordKind,
    pub source: RegionSource,
    pub original_offset: u64,
    pub original_size: u64,
    /// Bytes between the original end of the region and the next original region.
    pub original_padding: u64,
    pub offset: u64,
    pub size: u64,
    /// Bytes between the end of the region and the next region in the output.
    pub padding: u64,
}

impl PlannedRegion {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn original_end(&self) -> u64 {
        self.original_offset + self.original_size
    }

    pub fn moved(&self) -> bool {
        self.offset != self.original_offset
    }

    fn contains(&self, record: &FileRecord) -> bool {
        self.source == RegionSource::Original
            && record.offset >= self.original_offset
            && record.offset < self.original_end()
            && record.end() <= self.original_end()
    }
}

/// The complete output layout, computed before anything is written.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    regions: Vec<PlannedRegion>,
    shared: Vec<PlannedRegion>,
    total_size: u64,
    boot: Vec<u8>,
    fst: Vec<u8>,
}

impl ExportPlan {
    /// Plan the export, rejecting outputs larger than a standard disc (or the
    /// source image, if that is already larger).
    pub fn new<R: Read + Seek>(disc: &mut DiscImage<R>, overlay: &OverlayStore) -> Result<Self> {
        let limit = disc.source_len().max(MAX_DISC_SIZE);
        Self::with_size_limit(disc, overlay, limit)
    }

    pub fn with_size_limit<R: Read + Seek>(
        disc: &mut DiscImage<R>,
        overlay: &OverlayStore,
        limit: u64,
    ) -> Result<Self> {
        validate_overlay(disc, overlay)?;

        let mut records: Vec<FileRecord> = disc.records().to_vec();
        records.sort_by_key(|record| (record.offset, Reverse(record.size)));

        let source_len = disc.source_len();
        let mut regions: Vec<PlannedRegion> = Vec::with_capacity(records.len());
        let mut shared: Vec<PlannedRegion> = Vec::new();
        let mut previous_end = 0u64;

        for record in &records {
            let (source, size) = if record.path == BOOT_PATH || record.path == FST_PATH {
                (RegionSource::Generated, record.size)
            } else if let Some(data) = overlay.get(&record.path) {
                (RegionSource::Overlay, data.len() as u64)
            } else {
                (RegionSource::Original, record.size)
            };

            // Untouched bytes inside an untouched region are written once.
            let container = regions
                .last()
                .filter(|container| source == RegionSource::Original && container.contains(record));
            if let Some(container) = container {
                shared.push(PlannedRegion {
                    path: record.path.clone(),
                    kind: record.kind,
                    source: RegionSource::Shared,
                    original_offset: record.offset,
                    original_size: record.size,
                    original_padding: 0,
                    offset: container.offset + (record.offset - container.original_offset),
                    size,
                    padding: 0,
                });
                continue;
            }

            let offset = if previous_end <= record.offset {
                record.offset
            } else {
                align_up(previous_end, alignment_of(record.offset))
            };
            previous_end = offset + size;

            regions.push(PlannedRegion {
                path: record.path.clone(),
                kind: record.kind,
                source,
                original_offset: record.offset,
                original_size: record.size,
                original_padding: 0,
                offset,
                size,
                padding: 0,
            });
        }

        for position in 0..regions.len() {
            let next_start = regions
                .get(position + 1)
                .map(|next| next.original_offset)
                .unwrap_or(source_len);
            let region = &mut regions[position];
            region.original_padding = match next_start.checked_sub(region.original_end()) {
                Some(padding) => padding,
                None => {
                    tracing::warn!(
                        "Region {} ({:#x}..{:#x}) overlaps the next region at {:#x}",
                        region.path,
                        region.original_offset,
                        region.original_end(),
                        next_start
                    );
                    0
                }
            };
        }

        let total_size = source_len.max(previous_end);
        if total_size > limit {
            return Err(Error::DiscTooLarge {
                size: total_size,
                limit,
            });
        }

        for position in 0..regions.len() {
            let next_offset = regions
                .get(position + 1)
                .map(|next| next.offset)
                .unwrap_or(total_size);
            regions[position].padding = next_offset - regions[position].end();
        }

        let find = |path: &str| {
            regions
                .iter()
                .find(|region| region.path == path)
                .ok_or_else(|| Error::Disc(gctk_gcm::DiscError::NotFound(path.to_string())))
        };
        let dol = find(DOL_PATH)?;
        let fst_region = find(FST_PATH)?;

        let mut boot = match overlay.get(BOOT_PATH) {
            Some(data) => data.to_vec(),
            None => disc.read_file(BOOT_PATH)?,
        };
        DiscHeader::write_layout(
            &mut boot,
            to_u32(dol.offset, total_size)?,
            to_u32(fst_region.offset, total_size)?,
            to_u32(fst_region.size, total_size)?,
        );

        let mut locations = HashMap::new();
        for region in regions.iter().chain(&shared) {
            if let RecordKind::Fst(index) = region.kind {
                locations.insert(
                    index,
                    (
                        to_u32(region.offset, total_size)?,
                        to_u32(region.size, total_size)?,
                    ),
                );
            }
        }
        let fst = disc.fst().with_file_locations(&locations);

        let moved = regions.iter().filter(|region| region.moved()).count();
        tracing::info!(
            "Planned export: {} regions ({} shared), {} moved, {:#x} bytes",
            regions.len(),
            shared.len(),
            moved,
            total_size
        );

        Ok(Self {
            regions,
            shared,
            total_size,
            boot,
            fst,
        })
    }

    /// Written regions in output order.
    pub fn regions(&self) -> &[PlannedRegion] {
        &self.regions
    }

    /// Files whose bytes lie inside another, unchanged region.
    pub fn shared_regions(&self) -> &[PlannedRegion] {
        &self.shared
    }

    pub fn region(&self, path: &str) -> Option<&PlannedRegion> {
        let path = normalize(path);
        self.regions
            .iter()
            .chain(&self.shared)
            .find(|region| normalize(&region.path) == path)
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn moved_regions(&self) -> impl Iterator<Item = &PlannedRegion> {
        self.regions
            .iter()
            .chain(&self.shared)
            .filter(|region| region.moved())
    }

    pub(crate) fn generated(&self, path: &str) -> Option<&[u8]> {
        match path {
            BOOT_PATH => Some(&self.boot),
            FST_PATH => Some(&self.fst),
            _ => None,
        }
    }
}

fn validate_overlay<R: Read + Seek>(disc: &DiscImage<R>, overlay: &OverlayStore) -> Result<()> {
    for (path, data) in overlay.iter() {
        let record = disc
            .find(path)
            .map_err(|_| Error::UnknownOverlayPath(path.to_string()))?;

        if record.path == FST_PATH {
            return Err(Error::InvalidOverlay {
                path: path.to_string(),
                reason: "the file system table is rebuilt from the output layout".to_string(),
            });
        }

        let fixed_size = record.path == BOOT_PATH || record.path == BI2_PATH;
        if fixed_size && data.len() as u64 != record.size {
            return Err(Error::InvalidOverlay {
                path: path.to_string(),
                reason: format!(
                    "size must stay {:#x} bytes, got {:#x}",
                    record.size,
                    data.len()
                ),
            });
        }
    }
    Ok(())
}

/// Largest power of two dividing `offset`, clamped to the supported range.
pub fn alignment_of(offset: u64) -> u64 {
    if offset == 0 {
        return MAX_ALIGNMENT;
    }
    (1u64 << offset.trailing_zeros()).clamp(MIN_ALIGNMENT, MAX_ALIGNMENT)
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

fn to_u32(value: u64, total_size: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::DiscTooLarge {
        size: total_size,
        limit: u32::MAX as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gctk_gcm::DiscBuilder;
    use std::io::Cursor;

    fn disc() -> DiscImage<Cursor<Vec<u8>>> {
        let bytes = DiscBuilder::new("GZ2E01")
            .with_file_alignment(0x800)
            .with_fill(0xEE)
            .with_file("RELS.arc", vec![0xA1; 0x300])
            .with_file("rel/Final/Release/d_a_obj.rel", vec![0xB2; 0x120])
            .with_file("map/Final/Release/frameworkF.map", vec![0xC3; 0x40])
            .build()
            .unwrap();
        DiscImage::from_reader(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_alignment_of() {
        assert_eq!(alignment_of(0), MAX_ALIGNMENT);
        assert_eq!(alignment_of(0x1_0000), MAX_ALIGNMENT);
        assert_eq!(alignment_of(0x2800), 0x800);
        assert_eq!(alignment_of(0x2442), MIN_ALIGNMENT);
    }

    #[test]
    fn test_unchanged_disc_keeps_layout() {
        let mut disc = disc();
        let plan = ExportPlan::new(&mut disc, &OverlayStore::new()).unwrap();

        assert_eq!(plan.total_size(), disc.source_len());
        assert_eq!(plan.moved_regions().count(), 0);
        for region in plan.regions() {
            assert_eq!(region.size, region.original_size);
            assert_eq!(region.padding, region.original_padding);
        }
    }

    #[test]
    fn test_growing_region_moves_followers() {
        let mut disc = disc();
        let mut overlay = OverlayStore::new();
        overlay.set("files/RELS.arc", vec![0x11; 0x900]);

        let plan = ExportPlan::new(&mut disc, &overlay).unwrap();
        let arc = plan.region("files/RELS.arc").unwrap();
        let rel = plan.region("files/rel/Final/Release/d_a_obj.rel").unwrap();

        assert_eq!(arc.source, RegionSource::Overlay);
        assert!(!arc.moved());
        assert!(rel.moved());
        assert!(rel.offset >= arc.end());
        assert_eq!(rel.offset % alignment_of(rel.original_offset), 0);
        assert!(rel.offset - arc.end() < alignment_of(rel.original_offset));
        assert!(plan.total_size() > disc.source_len());
    }

    #[test]
    fn test_shrinking_region_keeps_followers() {
        let mut disc = disc();
        let mut overlay = OverlayStore::new();
        overlay.set("files/RELS.arc", vec![0x11; 0x10]);

        let plan = ExportPlan::new(&mut disc, &overlay).unwrap();
        let arc = plan.region("files/RELS.arc").unwrap();

        assert_eq!(plan.moved_regions().count(), 0);
        assert_eq!(arc.padding, arc.original_padding + 0x300 - 0x10);
        assert_eq!(plan.total_size(), disc.source_len());
    }

    #[test]
    fn test_regions_cover_output_exactly() {
        let mut disc = disc();
        let mut overlay = OverlayStore::new();
        overlay.set("sys/main.dol", vec![0x22; 0x3000]);

        let plan = ExportPlan::new(&mut disc, &overlay).unwrap();
        let covered: u64 = plan.regions().iter().map(|r| r.size + r.padding).sum();

        assert_eq!(plan.regions()[0].offset, 0);
        assert_eq!(covered, plan.total_size());
        for pair in plan.regions().windows(2) {
            assert_eq!(pair[0].end() + pair[0].padding, pair[1].offset);
            assert!(pair[1].offset >= pair[1].original_offset);
        }
    }

    #[test]
    fn test_rejects_fst_overlay() {
        let mut disc = disc();
        let mut overlay = OverlayStore::new();
        overlay.set("sys/fst.bin", vec![0; 0x40]);

        assert!(matches!(
            ExportPlan::new(&mut disc, &overlay),
            Err(Error::InvalidOverlay { .. })
        ));
    }

    #[test]
    fn test_rejects_resized_boot_block() {
        let mut disc = disc();
        let mut overlay = OverlayStore::new();
        overlay.set("sys/boot.bin", vec![0; 0x10]);

        assert!(matches!(
            ExportPlan::new(&mut disc, &overlay),
            Err(Error::InvalidOverlay { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_overlay_path() {
        let mut disc = disc();
        let mut overlay = OverlayStore::new();
        overlay.set("files/rel/Final/Release/d_a_new.rel", vec![1]);

        let error = ExportPlan::new(&mut disc, &overlay).unwrap_err();
        assert!(matches!(error, Error::UnknownOverlayPath(_)));
        assert!(error.is_not_found());
    }

    #[test]
    fn test_rejects_oversized_output() {
        let mut disc = disc();
        let limit = disc.source_len();
        let mut overlay = OverlayStore::new();
        overlay.set("files/map/Final/Release/frameworkF.map", vec![0; 0x1000]);

        assert!(matches!(
            ExportPlan::with_size_limit(&mut disc, &overlay, limit),
            Err(Error::DiscTooLarge { .. })
        ));
    }
}
