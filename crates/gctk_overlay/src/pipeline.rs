//! Turns a decompilation build into an [`OverlayStore`].
//!
//! # Algorithm
//!
//! 1. Read the module archive (`files/RELS.arc` by default) from the disc,
//!    decompressing it first if it is stored as Yaz0.
//! 2. For every module the build produced:
//!    - if the archive has an entry named `<module>.rel` (case-insensitive),
//!      replace its payload with the Yaz0-compressed module and mark the
//!      entry as Yaz0 compressed;
//!    - otherwise the module must exist on the disc at
//!      `files/rel/Final/Release/<Module>.rel` and is overlaid there;
//!    - otherwise the run fails with [`Error::ModuleNotFound`].
//! 3. Re-serialize the archive (if any entry changed) and overlay it at its
//!    own disc path.
//! 4. Overlay the main executable and the symbol map.
//!
//! Nothing is exported here. Every error surfaces before the caller can start
//! writing an output image.

use std::io::{Read, Seek};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gctk_gcm::DiscImage;
use gctk_rarc::{EntryFlags, RarcArchive};
use gctk_yaz0::CompressionLevel;

use crate::content::BuildArtifacts;
use crate::error::{Error, Result};
use crate::layout::PatchLayout;
use crate::store::OverlayStore;

/// Progress information emitted while patching.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchProgress {
    pub stage: PatchStage,
    /// Module currently being patched (set during `PatchingModules`).
    pub current_file: Option<String>,
    /// 1-based index of the current module.
    pub current: u32,
    pub total: u32,
}

/// Emitted in order: `LoadingArchive` -> `PatchingModules` (repeated) ->
/// `RegisteringOverlays` -> `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PatchStage {
    LoadingArchive,
    PatchingModules,
    RegisteringOverlays,
    Complete,
}

/// Summary returned after a successful patch run.
#[derive(Debug, Clone)]
pub struct PatchSummary {
    /// Modules written into the archive.
    pub archived_modules: Vec<String>,
    /// Modules overlaid at their own disc path.
    pub direct_modules: Vec<String>,
    /// Number of overlay entries registered.
    pub overlay_entries: usize,
    /// Whether the archive was re-serialized and overlaid.
    pub archive_repacked: bool,
    pub elapsed: Duration,
}

type ProgressCallback = Arc<dyn Fn(PatchProgress) + Send + Sync>;

/// Builds the overlay for one build output.
pub struct PatchPipeline {
    layout: PatchLayout,
    compression: CompressionLevel,
    progress_callback: Option<ProgressCallback>,
}

impl PatchPipeline {
    pub fn new(layout: PatchLayout) -> Self {
        Self {
            layout,
            compression: CompressionLevel::default(),
            progress_callback: None,
        }
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(PatchProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Encoder effort for modules and the archive.
    pub fn with_compression(mut self, level: CompressionLevel) -> Self {
        self.compression = level;
        self
    }

    pub fn layout(&self) -> &PatchLayout {
        &self.layout
    }

    pub fn patch<R: Read + Seek>(
        &self,
        disc: &mut DiscImage<R>,
        artifacts: &mut dyn BuildArtifacts,
    ) -> Result<(OverlayStore, PatchSummary)> {
        let start_time = Instant::now();
        let layout = &self.layout;

        self.emit_progress(PatchStage::LoadingArchive, None, 0, 0);

        let archive_path = disc.find(&layout.archive_path)?.path.clone();
        let executable_path = disc.find(&layout.main_executable)?.path.clone();
        let symbol_map_path = disc.find(&layout.symbol_map)?.path.clone();

        let stored = disc.read_file(&archive_path)?;
        let archive_compressed = gctk_yaz0::is_compressed(&stored);
        let mut archive = if archive_compressed {
            tracing::debug!("{} is Yaz0 compressed", archive_path);
            RarcArchive::parse(&gctk_yaz0::decompress(&stored)?)?
        } else {
            RarcArchive::parse(&stored)?
        };
        tracing::info!(
            "Loaded {} ({} entries)",
            archive_path,
            archive.entries().len()
        );

        let modules = artifacts.modules()?;
        let total = modules.len() as u32;
        let mut archived_modules = Vec::new();
        let mut direct = Vec::new();

        for (index, module) in modules.iter().enumerate() {
            self.emit_progress(
                PatchStage::PatchingModules,
                Some(module.clone()),
                index as u32 + 1,
                total,
            );

            let data = artifacts.read_module(module)?;
            let entry_name = layout.archive_entry_name(module);

            if let Some(entry) = archive.get_entry_mut(&entry_name) {
                let payload = gctk_yaz0::compress_with(&data, self.compression)?;
                if !entry.is_yaz0() {
                    tracing::debug!("Marking archive entry {} as Yaz0 compressed", entry.path());
                    entry.set_flags(
                        entry
                            .flags()
                            .union(EntryFlags::COMPRESSED)
                            .union(EntryFlags::YAZ0),
                    );
                }
                tracing::debug!(
                    "Archive entry {} <- {} ({} bytes, yaz0)",
                    entry.path(),
                    module,
                    payload.len()
                );
                entry.set_data(payload);
                archived_modules.push(module.clone());
                continue;
            }

            let disc_path = layout.direct_module_path(module);
            match disc.find(&disc_path) {
                Ok(record) => {
                    tracing::debug!("Direct overlay {} <- {}", record.path, module);
                    direct.push((module.clone(), record.path.clone(), data));
                }
                Err(_) => {
                    return Err(Error::ModuleNotFound {
                        module: module.clone(),
                        archive_entry: entry_name,
                        disc_path,
                    });
                }
            }
        }

        self.emit_progress(PatchStage::RegisteringOverlays, None, total, total);

        let mut overlay = OverlayStore::new();
        let archive_repacked = archive.is_modified();
        if archive_repacked {
            let mut bytes = archive.to_bytes()?;
            if archive_compressed {
                bytes = gctk_yaz0::compress_with(&bytes, self.compression)?;
            }
            overlay.set(archive_path.clone(), bytes);
        }

        let mut direct_modules = Vec::with_capacity(direct.len());
        for (module, path, data) in direct {
            overlay.set(path, data);
            direct_modules.push(module);
        }

        overlay.set(executable_path, artifacts.main_executable()?);
        overlay.set(symbol_map_path, artifacts.symbol_map()?);

        let summary = PatchSummary {
            archived_modules,
            direct_modules,
            overlay_entries: overlay.len(),
            archive_repacked,
            elapsed: start_time.elapsed(),
        };
        tracing::info!(
            "Patched {} archived and {} direct modules into {} overlay entries in {:.2?}",
            summary.archived_modules.len(),
            summary.direct_modules.len(),
            summary.overlay_entries,
            summary.elapsed
        );

        self.emit_progress(PatchStage::Complete, None, total, total);
        Ok((overlay, summary))
    }

    fn emit_progress(&self, stage: PatchStage, current_file: Option<String>, current: u32, total: u32) {
        if let Some(callback) = &self.progress_callback {
            callback(PatchProgress {
                stage,
                current_file,
                current,
                total,
            });
        }
    }
}
