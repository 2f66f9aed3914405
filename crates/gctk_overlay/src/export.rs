//! Streaming export of a patched disc.
//!
//! [`export`] plans the output layout up front (see [`ExportPlan`]) and returns
//! a [`DiscExport`] iterator. Every call to `next` writes at most
//! [`CHUNK_SIZE`] bytes and yields an [`ExportProgress`]; nothing happens unless
//! the iterator is driven. The final item is yielded only after the sink has
//! been committed, and is the only one reporting 100 percent.
//!
//! Output is written to an [`ExportSink`]. For files use [`StagedFile`]
//! (or [`export_to_path`]): bytes go to a temporary file next to the
//! destination which only replaces the destination on commit. If the export
//! fails or the iterator is dropped early, the temporary file is deleted.

use std::io::{self, BufWriter, Read, Seek, Write};
use std::iter::FusedIterator;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use gctk_gcm::DiscImage;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::plan::{ExportPlan, RegionSource};
use crate::store::OverlayStore;

/// Largest number of bytes written per iteration step.
pub const CHUNK_SIZE: usize = 1 << 20;

/// Progress of an export, yielded once per written chunk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProgress {
    pub bytes_written: u64,
    pub total_bytes: u64,
    /// Disc path of the region the last chunk belonged to.
    pub current_file: Option<String>,
    /// Set on the last item, after the output has been committed.
    pub finished: bool,
}

impl ExportProgress {
    /// Whole percent of the output written, `100` only once finished.
    pub fn percent(&self) -> u8 {
        if self.finished {
            return 100;
        }
        if self.total_bytes == 0 {
            return 0;
        }
        (self.bytes_written.saturating_mul(100) / self.total_bytes).min(99) as u8
    }
}

/// Destination of an export.
pub trait ExportSink: Write {
    /// Make the written output final. Called once, after the last byte.
    fn commit(&mut self) -> io::Result<()>;
}

impl ExportSink for Vec<u8> {
    fn commit(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ExportSink + ?Sized> ExportSink for &mut S {
    fn commit(&mut self) -> io::Result<()> {
        (**self).commit()
    }
}

/// A file that only appears at its destination once committed.
pub struct StagedFile {
    destination: Utf8PathBuf,
    writer: Option<BufWriter<NamedTempFile>>,
}

impl StagedFile {
    pub fn create(destination: impl Into<Utf8PathBuf>) -> Result<Self> {
        let destination = destination.into();
        let parent = match destination.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };

        let file = tempfile::Builder::new()
            .prefix(".gc-rebuild-")
            .suffix(".part")
            .tempfile_in(&parent)?;
        tracing::debug!("Staging {} at {}", destination, file.path().display());

        Ok(Self {
            destination,
            writer: Some(BufWriter::with_capacity(CHUNK_SIZE, file)),
        })
    }

    pub fn destination(&self) -> &Utf8Path {
        &self.destination
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<NamedTempFile>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file was already committed"))
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl ExportSink for StagedFile {
    fn commit(&mut self) -> io::Result<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::other("staged file was already committed"))?;
        let file = writer.into_inner().map_err(|error| error.into_error())?;
        file.as_file().sync_all()?;
        file.persist(&self.destination).map_err(|error| error.error)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Data(u64),
    Padding(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Writing,
    Done,
}

/// Lazy, single-pass export. See the [module docs](self).
pub struct DiscExport<'a, R: Read + Seek, S: ExportSink> {
    disc: &'a mut DiscImage<R>,
    overlay: &'a OverlayStore,
    plan: ExportPlan,
    sink: S,
    region: usize,
    segment: Segment,
    bytes_written: u64,
    buffer: Vec<u8>,
    state: State,
    started: Instant,
}

/// Plan the export of `disc` with `overlay` applied and prepare to write it to
/// `sink`. Layout errors are reported here, before anything is written.
pub fn export<'a, R, S>(
    disc: &'a mut DiscImage<R>,
    overlay: &'a OverlayStore,
    sink: S,
) -> Result<DiscExport<'a, R, S>>
where
    R: Read + Seek,
    S: ExportSink,
{
    let plan = ExportPlan::new(disc, overlay)?;
    Ok(DiscExport::with_plan(disc, overlay, plan, sink))
}

/// Like [`export`], writing to a [`StagedFile`] at `destination`.
///
/// The destination is only touched once the returned iterator has been
/// driven to completion.
pub fn export_to_path<'a, R: Read + Seek>(
    disc: &'a mut DiscImage<R>,
    overlay: &'a OverlayStore,
    destination: &Utf8Path,
) -> Result<DiscExport<'a, R, StagedFile>> {
    let plan = ExportPlan::new(disc, overlay)?;
    let sink = StagedFile::create(destination)?;
    Ok(DiscExport::with_plan(disc, overlay, plan, sink))
}

impl<'a, R: Read + Seek, S: ExportSink> DiscExport<'a, R, S> {
    pub fn with_plan(
        disc: &'a mut DiscImage<R>,
        overlay: &'a OverlayStore,
        plan: ExportPlan,
        sink: S,
    ) -> Self {
        tracing::info!(
            "Exporting {} regions ({} overlaid), {:#x} bytes",
            plan.regions().len(),
            overlay.len(),
            plan.total_size()
        );
        Self {
            disc,
            overlay,
            plan,
            sink,
            region: 0,
            segment: Segment::Data(0),
            bytes_written: 0,
            buffer: vec![0; CHUNK_SIZE],
            state: State::Writing,
            started: Instant::now(),
        }
    }

    pub fn plan(&self) -> &ExportPlan {
        &self.plan
    }

    /// Drive the export to completion, returning the final progress.
    pub fn drain(self) -> Result<ExportProgress> {
        self.drain_with(|_| {})
    }

    /// Drive the export to completion, passing every progress item to `observer`.
    pub fn drain_with<F>(self, mut observer: F) -> Result<ExportProgress>
    where
        F: FnMut(&ExportProgress),
    {
        let mut last = None;
        for progress in self {
            let progress = progress?;
            observer(&progress);
            last = Some(progress);
        }
        last.ok_or_else(|| Error::Other("export produced no progress".to_string()))
    }

    fn progress(&self, current_file: Option<String>, finished: bool) -> ExportProgress {
        ExportProgress {
            bytes_written: self.bytes_written,
            total_bytes: self.plan.total_size(),
            current_file,
            finished,
        }
    }

    /// Write the next chunk. `None` once every region has been written.
    fn step(&mut self) -> Result<Option<ExportProgress>> {
        loop {
            let Some(region) = self.plan.regions().get(self.region) else {
                return Ok(None);
            };

            match self.segment {
                Segment::Data(position) if position < region.size => {
                    let len = (region.size - position).min(CHUNK_SIZE as u64) as usize;
                    match region.source {
                        RegionSource::Original | RegionSource::Shared => {
                            let chunk = &mut self.buffer[..len];
                            self.disc
                                .read_into(region.original_offset + position, chunk)?;
                            self.sink.write_all(chunk)?;
                        }
                        RegionSource::Overlay | RegionSource::Generated => {
                            let data = match region.source {
                                RegionSource::Overlay => self.overlay.get(&region.path),
                                _ => self.plan.generated(&region.path),
                            }
                            .ok_or_else(|| {
                                Error::Other(format!("no replacement bytes for {}", region.path))
                            })?;
                            let start = position as usize;
                            self.sink.write_all(&data[start..start + len])?;
                        }
                    }

                    let path = region.path.clone();
                    self.segment = Segment::Data(position + len as u64);
                    self.bytes_written += len as u64;
                    return Ok(Some(self.progress(Some(path), false)));
                }
                Segment::Data(_) => self.segment = Segment::Padding(0),
                Segment::Padding(position) if position < region.padding => {
                    let len = (region.padding - position).min(CHUNK_SIZE as u64) as usize;
                    let original = region
                        .original_padding
                        .saturating_sub(position)
                        .min(len as u64) as usize;

                    let chunk = &mut self.buffer[..len];
                    if original > 0 {
                        self.disc
                            .read_into(region.original_end() + position, &mut chunk[..original])?;
                    }
                    chunk[original..].fill(0);
                    self.sink.write_all(chunk)?;

                    let path = region.path.clone();
                    self.segment = Segment::Padding(position + len as u64);
                    self.bytes_written += len as u64;
                    return Ok(Some(self.progress(Some(path), false)));
                }
                Segment::Padding(_) => {
                    tracing::trace!(
                        "Wrote {} at {:#x} ({:?})",
                        region.path,
                        region.offset,
                        region.source
                    );
                    self.region += 1;
                    self.segment = Segment::Data(0);
                }
            }
        }
    }

    fn finish(&mut self) -> Result<ExportProgress> {
        if self.bytes_written != self.plan.total_size() {
            return Err(Error::Other(format!(
                "export wrote {:#x} bytes, planned {:#x}",
                self.bytes_written,
                self.plan.total_size()
            )));
        }
        self.sink.flush()?;
        self.sink.commit()?;

        tracing::info!(
            "Export complete: {:#x} bytes in {:.2?}",
            self.bytes_written,
            self.started.elapsed()
        );
        Ok(self.progress(None, true))
    }
}

impl<R: Read + Seek, S: ExportSink> Iterator for DiscExport<'_, R, S> {
    type Item = Result<ExportProgress>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Done {
            return None;
        }

        let item = match self.step() {
            Ok(Some(progress)) => return Some(Ok(progress)),
            Ok(None) => self.finish(),
            Err(error) => Err(error),
        };
        if let Err(error) = &item {
            tracing::error!("Export failed after {:#x} bytes: {}", self.bytes_written, error);
        }
        self.state = State::Done;
        Some(item)
    }
}

impl<R: Read + Seek, S: ExportSink> FusedIterator for DiscExport<'_, R, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use gctk_gcm::fst::FST_ENTRY_SIZE;
    use gctk_gcm::{DiscBuilder, DiscHeader, RecordKind, BOOT_PATH, DOL_PATH, FST_PATH};
    use proptest::prelude::*;
    use std::io::Cursor;

    const ARC: &str = "files/RELS.arc";
    const REL: &str = "files/rel/Final/Release/d_a_obj.rel";
    const MAP: &str = "files/map/Final/Release/frameworkF.map";

    fn source() -> Vec<u8> {
        DiscBuilder::new("GZ2E01")
            .with_file_alignment(0x800)
            .with_fill(0xEE)
            .with_file("RELS.arc", vec![0xA1; 0x300])
            .with_file("rel/Final/Release/d_a_obj.rel", vec![0xB2; 0x120])
            .with_file("map/Final/Release/frameworkF.map", vec![0xC3; 0x40])
            .build()
            .unwrap()
    }

    fn open(bytes: Vec<u8>) -> DiscImage<Cursor<Vec<u8>>> {
        DiscImage::from_reader(Cursor::new(bytes)).unwrap()
    }

    /// `source()` with the map's FST entry pointing at the archive's bytes.
    fn shared_source() -> Vec<u8> {
        let mut bytes = source();
        let disc = open(bytes.clone());
        let arc = disc.find(ARC).unwrap().clone();
        let RecordKind::Fst(index) = disc.find(MAP).unwrap().kind else {
            panic!("map is not an FST file");
        };
        let entry = disc.header().fst_offset as usize + index * FST_ENTRY_SIZE;
        bytes[entry + 4..entry + 8].copy_from_slice(&(arc.offset as u32).to_be_bytes());
        bytes[entry + 8..entry + 12].copy_from_slice(&(arc.size as u32).to_be_bytes());
        bytes
    }

    fn export_bytes(overlay: &OverlayStore) -> Vec<u8> {
        let mut disc = open(source());
        let mut output = Vec::new();
        export(&mut disc, overlay, &mut output)
            .unwrap()
            .drain()
            .unwrap();
        output
    }

    /// A minimal DOL whose single text section fills `size` bytes.
    fn dol(size: usize, fill: u8) -> Vec<u8> {
        let mut dol = vec![fill; size];
        dol[..0x100].fill(0);
        dol[0..4].copy_from_slice(&0x100u32.to_be_bytes());
        dol[0x90..0x94].copy_from_slice(&((size - 0x100) as u32).to_be_bytes());
        dol
    }

    struct FailingSink {
        written: usize,
        limit: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written + buf.len() > self.limit {
                return Err(io::Error::other("disk full"));
            }
            self.written += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ExportSink for FailingSink {
        fn commit(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unchanged_export_is_identical() {
        let original = source();
        let mut disc = open(original.clone());
        let overlay = OverlayStore::new();
        let mut output = Vec::new();

        let items: Vec<ExportProgress> = export(&mut disc, &overlay, &mut output)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(output, original);

        let last = items.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.percent(), 100);
        assert_eq!(last.bytes_written, original.len() as u64);
        assert_eq!(items.iter().filter(|p| p.percent() == 100).count(), 1);
        for pair in items.windows(2) {
            assert!(pair[0].bytes_written <= pair[1].bytes_written);
            assert!(pair[0].percent() <= pair[1].percent());
        }
    }

    #[test]
    fn test_shared_file_data_is_written_once() {
        let original = shared_source();
        let mut disc = open(original.clone());
        let mut output = Vec::new();

        let store = OverlayStore::new();
        let export = export(&mut disc, &store, &mut output).unwrap();
        assert_eq!(export.plan().moved_regions().count(), 0);
        assert_eq!(
            export.plan().region(MAP).unwrap().source,
            RegionSource::Shared
        );
        export.drain().unwrap();

        assert_eq!(output, original);
        let mut patched = open(output);
        assert_eq!(patched.read_file(MAP).unwrap(), vec![0xA1; 0x300]);
    }

    #[test]
    fn test_shared_file_keeps_its_bytes_when_container_is_replaced() {
        let mut disc = open(shared_source());
        let mut overlay = OverlayStore::new();
        overlay.set(ARC, vec![0x11; 0x900]);
        let mut output = Vec::new();

        let export = export(&mut disc, &overlay, &mut output).unwrap();
        assert!(export.plan().shared_regions().is_empty());
        export.drain().unwrap();

        let mut patched = open(output);
        assert_eq!(patched.read_file(ARC).unwrap(), vec![0x11; 0x900]);
        assert_eq!(patched.read_file(MAP).unwrap(), vec![0xA1; 0x300]);
        assert_eq!(patched.read_file(REL).unwrap(), vec![0xB2; 0x120]);
    }

    #[test]
    fn test_shared_file_follows_its_container() {
        let mut disc = open(shared_source());
        let mut overlay = OverlayStore::new();
        overlay.set(DOL_PATH, dol(0x4000, 0x77));
        let mut output = Vec::new();

        export(&mut disc, &overlay, &mut output)
            .unwrap()
            .drain()
            .unwrap();

        let mut patched = open(output);
        let arc = patched.find(ARC).unwrap().clone();
        let map = patched.find(MAP).unwrap().clone();
        assert_eq!((map.offset, map.size), (arc.offset, arc.size));
        assert_eq!(patched.read_file(MAP).unwrap(), vec![0xA1; 0x300]);
    }

    #[test]
    fn test_same_size_overlay_replaces_only_its_region() {
        let original = source();
        let record = open(original.clone()).find(REL).unwrap().clone();
        let mut overlay = OverlayStore::new();
        overlay.set(REL, vec![0x55; 0x120]);

        let output = export_bytes(&overlay);
        let (start, end) = (record.offset as usize, record.end() as usize);

        assert_eq!(output.len(), original.len());
        assert_eq!(&output[start..end], &[0x55; 0x120][..]);
        assert_eq!(&output[..start], &original[..start]);
        assert_eq!(&output[end..], &original[end..]);
    }

    #[test]
    fn test_growing_file_relays_out_following_files() {
        let mut overlay = OverlayStore::new();
        overlay.set(ARC, vec![0x11; 0x900]);

        let output = export_bytes(&overlay);
        let mut patched = open(output);

        assert_eq!(patched.read_file(ARC).unwrap(), vec![0x11; 0x900]);
        assert_eq!(patched.read_file(REL).unwrap(), vec![0xB2; 0x120]);
        assert_eq!(patched.read_file(MAP).unwrap(), vec![0xC3; 0x40]);

        let arc = patched.find(ARC).unwrap().clone();
        let rel = patched.find(REL).unwrap().clone();
        assert!(rel.offset >= arc.end());
        assert_eq!(rel.offset % 0x800, 0);
    }

    #[test]
    fn test_shrinking_file_zero_fills_the_gap() {
        let original = source();
        let record = open(original.clone()).find(ARC).unwrap().clone();
        let mut overlay = OverlayStore::new();
        overlay.set(ARC, vec![0x11; 0x10]);

        let output = export_bytes(&overlay);
        let start = record.offset as usize;

        assert_eq!(output.len(), original.len());
        assert_eq!(&output[start..start + 0x10], &[0x11; 0x10][..]);
        // The freed bytes come first from the original padding (0xEE), then zeros.
        let freed = &output[start + 0x10..start + 0x800];
        assert!(freed.iter().any(|&b| b == 0xEE));
        assert_eq!(*freed.last().unwrap(), 0);

        let mut patched = open(output);
        assert_eq!(patched.find(ARC).unwrap().size, 0x10);
        assert_eq!(patched.read_file(REL).unwrap(), vec![0xB2; 0x120]);
    }

    #[test]
    fn test_growing_executable_moves_fst() {
        let before = open(source()).header().clone();
        let mut overlay = OverlayStore::new();
        overlay.set(DOL_PATH, dol(0x4000, 0x77));

        let mut disc = open(source());
        let mut output = Vec::new();
        let export = export(&mut disc, &overlay, &mut output).unwrap();
        let planned_fst = export.plan().region(FST_PATH).unwrap().offset;
        export.drain().unwrap();

        let mut patched = open(output);
        let header = patched.header().clone();
        assert_eq!(header.dol_offset, before.dol_offset);
        assert_eq!(header.fst_offset as u64, planned_fst);
        assert!(header.fst_offset > before.fst_offset);
        assert_eq!(patched.read_file(DOL_PATH).unwrap(), dol(0x4000, 0x77));
        assert_eq!(patched.read_file(ARC).unwrap(), vec![0xA1; 0x300]);

        let boot = patched.read_file(BOOT_PATH).unwrap();
        assert_eq!(DiscHeader::parse(&boot).unwrap().game_id, "GZ2E01");
    }

    #[test]
    fn test_size_accounting() {
        let mut overlay = OverlayStore::new();
        overlay.set(ARC, vec![0x11; 0x1800]);
        overlay.set(MAP, vec![0x22; 0x10]);

        let mut disc = open(source());
        let mut output = Vec::new();
        let export = export(&mut disc, &overlay, &mut output).unwrap();
        let planned: u64 = export
            .plan()
            .regions()
            .iter()
            .map(|region| region.size + region.padding)
            .sum();
        let total = export.plan().total_size();
        let last = export.drain().unwrap();

        assert_eq!(planned, total);
        assert_eq!(last.bytes_written, total);
        assert_eq!(output.len() as u64, total);
    }

    #[test]
    fn test_layout_errors_come_before_writing() {
        let mut overlay = OverlayStore::new();
        overlay.set(FST_PATH, vec![0; 0x10]);
        let mut disc = open(source());
        let mut output = Vec::new();

        assert!(export(&mut disc, &overlay, &mut output).is_err());
        assert!(output.is_empty());
    }

    #[test]
    fn test_failing_sink_stops_the_export() {
        let mut disc = open(source());
        let overlay = OverlayStore::new();
        let sink = FailingSink {
            written: 0,
            limit: 0x3000,
        };

        let mut export = export(&mut disc, &overlay, sink).unwrap();
        let error = export.by_ref().find_map(|item| item.err());

        assert!(matches!(error, Some(Error::Io(_))));
        assert!(export.next().is_none());
    }

    #[test]
    fn test_staged_file_is_persisted_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let destination = root.join("patched.iso");
        let mut overlay = OverlayStore::new();
        overlay.set(REL, vec![0x33; 0x200]);

        let mut disc = open(source());
        export_to_path(&mut disc, &overlay, &destination)
            .unwrap()
            .drain()
            .unwrap();

        let mut patched = DiscImage::open(&destination).unwrap();
        assert_eq!(patched.read_file(REL).unwrap(), vec![0x33; 0x200]);
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 1);
    }

    #[test]
    fn test_abandoned_export_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let destination = root.join("patched.iso");
        let overlay = OverlayStore::new();

        let mut disc = open(source());
        let mut export = export_to_path(&mut disc, &overlay, &destination).unwrap();
        assert!(export.next().unwrap().is_ok());
        drop(export);

        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_rejected_plan_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut overlay = OverlayStore::new();
        overlay.set("files/unknown.bin", vec![1]);

        let mut disc = open(source());
        let result = export_to_path(&mut disc, &overlay, &root.join("patched.iso"));

        assert!(matches!(result, Err(Error::UnknownOverlayPath(_))));
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_percent() {
        let progress = ExportProgress {
            bytes_written: 999,
            total_bytes: 1000,
            current_file: None,
            finished: false,
        };
        assert_eq!(progress.percent(), 99);

        let done = ExportProgress {
            bytes_written: 1000,
            finished: true,
            ..progress
        };
        assert_eq!(done.percent(), 100);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_relayout_preserves_every_file(
            arc in 1usize..0x2000,
            rel in 1usize..0x1000,
            map in 1usize..0x900,
        ) {
            let mut overlay = OverlayStore::new();
            overlay.set(ARC, vec![0x11; arc]);
            overlay.set(REL, vec![0x22; rel]);
            overlay.set(MAP, vec![0x33; map]);

            let original = open(source());
            let mut patched = open(export_bytes(&overlay));

            prop_assert_eq!(patched.read_file(ARC).unwrap(), vec![0x11; arc]);
            prop_assert_eq!(patched.read_file(REL).unwrap(), vec![0x22; rel]);
            prop_assert_eq!(patched.read_file(MAP).unwrap(), vec![0x33; map]);
            for record in original.records() {
                prop_assert!(patched.find(&record.path).unwrap().offset >= record.offset);
            }
        }
    }
}
