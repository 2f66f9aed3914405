//! Build artifact provider abstraction.
//!
//! The [`BuildArtifacts`] trait decouples the patch pipeline from where the
//! replacement files come from. [`FsBuildOutput`] reads the output directory
//! of a decompilation build:
//!
//! ```text
//! build/GZ2E01/
//!   framework.dol              # main executable
//!   framework.elf.MAP          # symbol map
//!   d_a_alink/
//!     d_a_alink.rel            # one directory per relocatable module
//!   d_a_obj_item/
//!     d_a_obj_item.rel
//! ```
//!
//! Only subdirectories containing a file named after the directory with the
//! module extension count as modules. Loose files are ignored.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_EXECUTABLE_NAME: &str = "framework.dol";
pub const DEFAULT_SYMBOL_MAP_NAME: &str = "framework.elf.MAP";

/// Supplies the replacement files for one patch run.
///
/// Methods take `&mut self` so that stateful sources (archives, network
/// caches) can implement it.
pub trait BuildArtifacts {
    /// Names of the relocatable modules, without extension, in a stable order.
    fn modules(&mut self) -> Result<Vec<String>>;

    /// Raw bytes of one module.
    fn read_module(&mut self, name: &str) -> Result<Vec<u8>>;

    /// Raw bytes of the main executable.
    fn main_executable(&mut self) -> Result<Vec<u8>>;

    /// Raw bytes of the symbol map.
    fn symbol_map(&mut self) -> Result<Vec<u8>>;
}

/// Filesystem-backed build output.
#[derive(Debug, Clone)]
pub struct FsBuildOutput {
    build_dir: Utf8PathBuf,
    module_extension: String,
    executable_name: String,
    symbol_map_name: String,
}

impl FsBuildOutput {
    pub fn new(build_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            module_extension: "rel".to_string(),
            executable_name: DEFAULT_EXECUTABLE_NAME.to_string(),
            symbol_map_name: DEFAULT_SYMBOL_MAP_NAME.to_string(),
        }
    }

    /// The build directory of a decompilation repository for a game version.
    pub fn from_repo(repo: &Utf8Path, version: &str) -> Self {
        Self::new(repo.join("build").join(version))
    }

    pub fn with_module_extension(mut self, extension: impl Into<String>) -> Self {
        self.module_extension = extension.into();
        self
    }

    pub fn build_dir(&self) -> &Utf8Path {
        &self.build_dir
    }

    pub fn executable_path(&self) -> Utf8PathBuf {
        self.build_dir.join(&self.executable_name)
    }

    pub fn symbol_map_path(&self) -> Utf8PathBuf {
        self.build_dir.join(&self.symbol_map_name)
    }

    pub fn module_path(&self, name: &str) -> Utf8PathBuf {
        self.build_dir
            .join(name)
            .join(format!("{name}.{}", self.module_extension))
    }

    fn read_required(path: &Utf8Path) -> Result<Vec<u8>> {
        if !path.is_file() {
            return Err(Error::MissingArtifact(path.to_path_buf()));
        }
        Ok(std::fs::read(path)?)
    }
}

impl BuildArtifacts for FsBuildOutput {
    fn modules(&mut self) -> Result<Vec<String>> {
        if !self.build_dir.is_dir() {
            return Err(Error::InvalidBuildDir(self.build_dir.clone()));
        }

        let mut modules = Vec::new();
        for entry in self.build_dir.read_dir_utf8()? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if self.module_path(name).is_file() {
                modules.push(name.to_string());
            } else {
                tracing::trace!("Skipping build directory without a module: {}", entry.path());
            }
        }

        modules.sort();
        tracing::debug!("Found {} modules in {}", modules.len(), self.build_dir);
        Ok(modules)
    }

    fn read_module(&mut self, name: &str) -> Result<Vec<u8>> {
        Self::read_required(&self.module_path(name))
    }

    fn main_executable(&mut self) -> Result<Vec<u8>> {
        Self::read_required(&self.executable_path())
    }

    fn symbol_map(&mut self) -> Result<Vec<u8>> {
        Self::read_required(&self.symbol_map_path())
    }
}
