use crate::errors::CliError;
use crate::utils::config::{self, AppConfig};
use crate::utils::dolphin;
use camino::Utf8PathBuf;
use colored::Colorize;
use miette::Result;

fn update_maps_dir_in_config(path: Utf8PathBuf) -> Result<()> {
    let mut cfg = config::load_config();
    cfg.maps_dir = Some(path);
    config::save_config(&cfg).map_err(CliError::from)?;
    Ok(())
}

/// Print a config path entry with status indicator
fn print_path_config(name: &str, path: Option<&Utf8PathBuf>, note: &str) {
    match path {
        Some(p) => {
            let status = if p.is_dir() {
                "✓".bright_green()
            } else {
                "✗".bright_red()
            };
            println!(
                "  {} {} {} {}",
                format!("{}:", name).bright_white(),
                p,
                status,
                note.dimmed()
            );
        }
        None => {
            println!(
                "  {} {}",
                format!("{}:", name).bright_white(),
                "(not set)".bright_yellow()
            );
        }
    }
}

pub fn show_config() -> Result<()> {
    let cfg = config::load_config();
    let config_path = config::default_config_path()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    println!();
    println!("  {} {}", "config_file:".bright_white(), config_path);

    match &cfg.maps_dir {
        Some(dir) => print_path_config("maps_dir", Some(dir), ""),
        None => print_path_config(
            "maps_dir",
            dolphin::default_maps_dir().as_ref(),
            "(Dolphin default)",
        ),
    }

    let layout = &cfg.layout;
    println!();
    println!("  {}", "[layout]".bright_white());
    for (name, value) in [
        ("archive_path", &layout.archive_path),
        ("module_dir", &layout.module_dir),
        ("module_extension", &layout.module_extension),
        ("main_executable", &layout.main_executable),
        ("symbol_map", &layout.symbol_map),
    ] {
        println!("  {} {}", format!("{}:", name).bright_white(), value);
    }

    println!();
    Ok(())
}

pub fn set_maps_dir(path: String) -> Result<()> {
    let path = Utf8PathBuf::from(&path);
    if path.exists() && !path.is_dir() {
        eprintln!("  {}", "The path must be a folder, not a file.".bright_yellow());
        return Err(miette::miette!("Invalid maps directory: {}", path));
    }

    update_maps_dir_in_config(path.clone())?;

    println!("{}", "✓ Maps directory set successfully!".bright_green().bold());
    println!();
    println!(
        "  {} {}",
        "Path:".bright_white().bold(),
        path.as_str().bright_green()
    );

    Ok(())
}

pub fn reset_config() -> Result<()> {
    let config_path = config::default_config_path()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    let default_cfg = AppConfig::default();
    config::save_config(&default_cfg).map_err(CliError::from)?;

    println!(
        "{}",
        "✓ Configuration reset to defaults".bright_green().bold()
    );
    println!();
    println!("  {} {}", "Config file:".bright_white().bold(), config_path);
    println!();

    Ok(())
}
