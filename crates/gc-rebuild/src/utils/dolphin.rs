//! Locating Dolphin's symbol map folder.
//!
//! Resolution order:
//!
//! 1. the `DOLPHIN_MAPS_PATH` environment variable (`~` is expanded);
//! 2. on Windows, `%APPDATA%\Dolphin Emulator\Maps`;
//! 3. elsewhere, the first of the known user folders whose parent exists
//!    (macOS application support, `~/.dolphin-emu`, Flatpak), falling back
//!    to the first one.

use camino::{Utf8Path, Utf8PathBuf};
use directories_next::BaseDirs;

pub const MAPS_ENV: &str = "DOLPHIN_MAPS_PATH";

pub fn home_dir() -> Option<Utf8PathBuf> {
    let base = BaseDirs::new()?;
    Utf8Path::from_path(base.home_dir()).map(Utf8Path::to_path_buf)
}

/// Dolphin's map folder for this machine, if a home directory is known.
pub fn default_maps_dir() -> Option<Utf8PathBuf> {
    let home = home_dir();

    if let Ok(value) = std::env::var(MAPS_ENV) {
        if !value.is_empty() {
            return Some(expand_tilde(&value, home.as_deref()));
        }
    }

    if cfg!(target_os = "windows") {
        // config_dir is %APPDATA% (Roaming) on Windows.
        let base = BaseDirs::new()?;
        let appdata = Utf8Path::from_path(base.config_dir())?;
        return Some(appdata.join("Dolphin Emulator").join("Maps"));
    }

    Some(pick_existing(&unix_candidates(&home?)))
}

pub fn unix_candidates(home: &Utf8Path) -> Vec<Utf8PathBuf> {
    vec![
        home.join("Library/Application Support/Dolphin/Maps"),
        home.join(".dolphin-emu/Maps"),
        home.join(".var/app/org.DolphinEmu.dolphin-emu/data/dolphin-emu/Maps"),
    ]
}

/// First candidate whose parent folder exists, otherwise the first candidate.
pub fn pick_existing(candidates: &[Utf8PathBuf]) -> Utf8PathBuf {
    candidates
        .iter()
        .find(|candidate| candidate.parent().is_some_and(Utf8Path::is_dir))
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_default()
}

pub fn expand_tilde(path: &str, home: Option<&Utf8Path>) -> Utf8PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home.to_path_buf(),
        (Some(rest), Some(home)) if rest.starts_with('/') || rest.starts_with('\\') => {
            home.join(&rest[1..])
        }
        _ => Utf8PathBuf::from(path),
    }
}
