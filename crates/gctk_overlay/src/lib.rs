//! Patch and rebuild GameCube disc images from a decompilation build.
//!
//! The crate ties the format crates together:
//!
//! - [`OverlayStore`]: replacement bytes keyed by disc path, consulted before
//!   the original image.
//! - [`PatchPipeline`]: reads a build output through [`BuildArtifacts`] and
//!   fills an overlay, patching modules into the nested `RELS.arc` archive
//!   where they live there.
//! - [`export`]: plans the new layout and streams the patched image to a sink,
//!   yielding [`ExportProgress`] as it goes.
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use gctk_gcm::DiscImage;
//! use gctk_overlay::{export_to_path, FsBuildOutput, PatchLayout, PatchPipeline};
//!
//! # fn main() -> gctk_overlay::Result<()> {
//! let mut disc = DiscImage::open("GZ2E01.iso")?;
//! let mut build = FsBuildOutput::from_repo(Utf8Path::new("tp"), "GZ2E01");
//!
//! let (overlay, summary) = PatchPipeline::new(PatchLayout::default())
//!     .with_progress(|progress| println!("{:?} {}/{}", progress.stage, progress.current, progress.total))
//!     .patch(&mut disc, &mut build)?;
//! println!("{} modules patched", summary.archived_modules.len() + summary.direct_modules.len());
//!
//! export_to_path(&mut disc, &overlay, Utf8Path::new("patched.iso"))?
//!     .drain_with(|progress| println!("{}%", progress.percent()))?;
//! # Ok(())
//! # }
//! ```

pub mod content;
pub mod error;
pub mod export;
pub mod layout;
pub mod pipeline;
pub mod plan;
pub mod store;
pub mod utils;

pub use content::{BuildArtifacts, FsBuildOutput};
pub use error::{Error, ErrorKind, Result};
pub use export::{export, export_to_path, DiscExport, ExportProgress, ExportSink, StagedFile};
pub use layout::PatchLayout;
pub use pipeline::{PatchPipeline, PatchProgress, PatchStage, PatchSummary};
pub use plan::{ExportPlan, PlannedRegion, RegionSource};
pub use store::OverlayStore;
pub use utils::copy_symbol_map;
