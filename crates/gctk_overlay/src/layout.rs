//! Fixed disc locations the patch pipeline writes to.

use serde::{Deserialize, Serialize};

/// Where build artifacts land on the disc.
///
/// The defaults describe the retail layout of Twilight Princess (GZ2E01); any
/// field can be overridden from the `[layout]` table of the CLI config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PatchLayout {
    /// Disc path of the archive that bundles relocatable modules.
    pub archive_path: String,
    /// Disc directory holding modules that are stored outside the archive.
    pub module_dir: String,
    /// Extension of module files, without the dot.
    pub module_extension: String,
    /// Disc path of the main executable.
    pub main_executable: String,
    /// Disc path of the symbol map.
    pub symbol_map: String,
}

impl Default for PatchLayout {
    fn default() -> Self {
        Self {
            archive_path: "files/RELS.arc".to_string(),
            module_dir: "files/rel/Final/Release".to_string(),
            module_extension: "rel".to_string(),
            main_executable: "sys/main.dol".to_string(),
            symbol_map: "files/map/Final/Release/frameworkF.map".to_string(),
        }
    }
}

impl PatchLayout {
    /// Name of the archive entry that holds `module`.
    pub fn archive_entry_name(&self, module: &str) -> String {
        format!("{}.{}", module.to_lowercase(), self.module_extension)
    }

    /// Disc path of `module` when it is stored outside the archive.
    pub fn direct_module_path(&self, module: &str) -> String {
        format!(
            "{}/{}.{}",
            self.module_dir.trim_end_matches('/'),
            module,
            self.module_extension
        )
    }
}
