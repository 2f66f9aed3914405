use camino::Utf8PathBuf;
use gctk_gcm::DiscError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Disc image not found: {path}")]
    #[diagnostic(
        code(disc::not_found),
        help("Make sure the path points to an existing GameCube ISO/GCM file")
    )]
    DiscNotFound { path: Utf8PathBuf },

    #[error("Failed to read disc image: {path}")]
    #[diagnostic(
        code(disc::invalid),
        help("Only uncompressed GameCube images are supported. Convert RVZ/CISO/NKit images to ISO first")
    )]
    InvalidDisc {
        path: Utf8PathBuf,
        #[source]
        source: DiscError,
    },

    #[error("Build output not found: {path}")]
    #[diagnostic(
        code(build::not_found),
        help("Build the decompilation for {version} first, or pass a different --game-version")
    )]
    BuildNotFound { path: Utf8PathBuf, version: String },

    #[error("Module '{module}' has no place on the disc")]
    #[diagnostic(
        code(patch::unknown_module),
        help("The archive has no entry '{archive_entry}' and the disc has no file '{disc_path}'. Remove the module from the build or add it to the disc layout")
    )]
    UnknownModule {
        module: String,
        archive_entry: String,
        disc_path: String,
    },

    #[error("Patching failed")]
    #[diagnostic(code(patch::failed))]
    Patch {
        #[source]
        source: gctk_overlay::Error,
    },

    #[error("Export failed")]
    #[diagnostic(
        code(export::failed),
        help("No output file was written. Check free disk space and permissions, then run the rebuild again")
    )]
    Export {
        #[source]
        source: gctk_overlay::Error,
    },

    #[error("Directory not found on disc: {path}")]
    #[diagnostic(
        code(list::not_found),
        help("Run 'gc-rebuild list <disc>' to see the top-level directories")
    )]
    DirectoryNotFound { path: String },

    #[error("IO operation failed: {source}")]
    #[diagnostic(code(io::operation_failed))]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn disc_not_found(path: Utf8PathBuf) -> Self {
        Self::DiscNotFound { path }
    }

    pub fn invalid_disc(path: Utf8PathBuf, source: DiscError) -> Self {
        Self::InvalidDisc { path, source }
    }

    pub fn build_not_found(path: Utf8PathBuf, version: String) -> Self {
        Self::BuildNotFound { path, version }
    }

    /// Classify an error returned while building the overlay.
    pub fn patch(source: gctk_overlay::Error) -> Self {
        match source {
            gctk_overlay::Error::ModuleNotFound {
                module,
                archive_entry,
                disc_path,
            } => Self::UnknownModule {
                module,
                archive_entry,
                disc_path,
            },
            source => Self::Patch { source },
        }
    }

    pub fn export(source: gctk_overlay::Error) -> Self {
        Self::Export { source }
    }

    pub fn directory_not_found(path: String) -> Self {
        Self::DirectoryNotFound { path }
    }
}
