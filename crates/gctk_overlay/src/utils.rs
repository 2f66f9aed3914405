//! Host filesystem helpers used around a patch run.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{Error, Result};

/// Copy the symbol map into an emulator's map directory, keeping its file name.
///
/// The directory is created if needed. Returns the path of the copy.
pub fn copy_symbol_map(map: &Utf8Path, maps_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    if !map.is_file() {
        return Err(Error::MissingArtifact(map.to_path_buf()));
    }
    let file_name = map
        .file_name()
        .ok_or_else(|| Error::Other(format!("symbol map path has no file name: {map}")))?;

    std::fs::create_dir_all(maps_dir)?;
    let destination = maps_dir.join(file_name);
    std::fs::copy(map, &destination)?;

    tracing::info!("Copied symbol map to {}", destination);
    Ok(destination)
}
