use crate::errors::CliError;
use crate::println_pad;
use crate::utils::config::load_config;
use crate::utils::{dolphin, format_size};
use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use gctk_gcm::DiscImage;
use gctk_overlay::{
    copy_symbol_map, export_to_path, ExportProgress, FsBuildOutput, PatchLayout, PatchPipeline,
    PatchStage,
};
use gctk_yaz0::CompressionLevel;
use miette::Result;
use std::time::Instant;

pub struct RebuildDiscArgs {
    pub vanilla_iso: String,
    pub output_iso: String,
    pub decomp_repo: String,
    pub map_dir: Option<String>,
    pub game_version: String,
    pub compression: CompressionLevel,
}

pub fn rebuild_disc(args: RebuildDiscArgs) -> Result<()> {
    let started = Instant::now();
    let vanilla = Utf8PathBuf::from(&args.vanilla_iso);
    let output = Utf8PathBuf::from(&args.output_iso);
    let repo = Utf8PathBuf::from(&args.decomp_repo);

    if !vanilla.is_file() {
        return Err(CliError::disc_not_found(vanilla).into());
    }

    let cfg = load_config();
    let mut build = build_output(&repo, &args.game_version, &cfg.layout);
    if !build.build_dir().is_dir() {
        return Err(
            CliError::build_not_found(build.build_dir().to_path_buf(), args.game_version).into(),
        );
    }

    let maps_dir = args
        .map_dir
        .map(|dir| dolphin::expand_tilde(&dir, dolphin::home_dir().as_deref()))
        .or(cfg.maps_dir)
        .or_else(dolphin::default_maps_dir);

    println_pad!(
        "{} {}",
        "💿 Reading vanilla disc:".bright_blue().bold(),
        vanilla.as_str().bright_cyan()
    );
    let mut disc =
        DiscImage::open(&vanilla).map_err(|e| CliError::invalid_disc(vanilla.clone(), e))?;
    println_pad!(
        "{} {} {}",
        "✓ Loaded".bright_green(),
        disc.header().game_id.bright_white().bold(),
        format!("({})", format_size(disc.source_len())).dimmed()
    );

    println_pad!(
        "{} {}",
        "🔧 Patching modules from:".bright_yellow(),
        build.build_dir().as_str().bright_white()
    );
    let pipeline = PatchPipeline::new(cfg.layout)
        .with_compression(args.compression)
        .with_progress(|progress| {
            if let (PatchStage::PatchingModules, Some(module)) =
                (progress.stage, progress.current_file.as_deref())
            {
                println_pad!(
                    "  {} {} {}",
                    "→".bright_cyan(),
                    module,
                    format!("[{}/{}]", progress.current, progress.total).dimmed()
                );
            }
        });
    let (overlay, summary) = pipeline
        .patch(&mut disc, &mut build)
        .map_err(CliError::patch)?;

    println_pad!(
        "{} {} modules ({} in {}, {} direct)",
        "✓ Patched".bright_green(),
        summary.archived_modules.len() + summary.direct_modules.len(),
        summary.archived_modules.len(),
        pipeline.layout().archive_path,
        summary.direct_modules.len()
    );

    match maps_dir {
        Some(dir) => {
            let copied = copy_symbol_map(&build.symbol_map_path(), &dir).map_err(CliError::patch)?;
            println_pad!(
                "{} {}",
                "✓ Symbol map copied to".bright_green(),
                copied.as_str().bright_white()
            );
        }
        None => println_pad!(
            "{}",
            "! No map folder found, skipping the symbol map copy (use --map)".bright_yellow()
        ),
    }

    println_pad!("");
    println_pad!(
        "{} {}",
        "📀 Exporting modified disc to".bright_blue().bold(),
        output.as_str().bright_cyan()
    );
    export_disc(&mut disc, &overlay, &output)?;

    println_pad!("");
    println_pad!("{}", "✅ Modified disc created!".bright_green().bold());
    println_pad!(
        "{} {} {}",
        "Output:".bright_white().bold(),
        output.as_str().bright_green(),
        format!("({:.1?})", started.elapsed()).dimmed()
    );

    Ok(())
}

/// Build output read with the same module extension the archive lookup uses.
fn build_output(repo: &Utf8Path, version: &str, layout: &PatchLayout) -> FsBuildOutput {
    FsBuildOutput::from_repo(repo, version).with_module_extension(&layout.module_extension)
}

fn export_disc(
    disc: &mut DiscImage<std::io::BufReader<std::fs::File>>,
    overlay: &gctk_overlay::OverlayStore,
    output: &Utf8Path,
) -> Result<()> {
    let export = export_to_path(disc, overlay, output).map_err(CliError::export)?;

    let moved = export.plan().moved_regions().count();
    if moved > 0 {
        println_pad!(
            "{} {} files moved to make room for larger replacements",
            "ℹ".bright_cyan(),
            moved
        );
    }

    let mut last_reported = None;
    export
        .drain_with(|progress| report_progress(progress, &mut last_reported))
        .map_err(CliError::export)?;

    Ok(())
}

/// Print every tenth percent once.
fn report_progress(progress: &ExportProgress, last_reported: &mut Option<u8>) {
    let step = progress.percent() / 10 * 10;
    if *last_reported != Some(step) {
        *last_reported = Some(step);
        println_pad!(
            "  {} {}",
            format!("{step:>3}%").bright_cyan().bold(),
            format!(
                "{} / {}",
                format_size(progress.bytes_written),
                format_size(progress.total_bytes)
            )
            .dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gctk_overlay::BuildArtifacts;

    #[test]
    fn test_build_output_uses_layout_extension() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Utf8Path::from_path(dir.path()).unwrap();
        let module_dir = repo.join("build/GZ2E01/d_a_obj_lamp");
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(module_dir.join("d_a_obj_lamp.mod"), [0x11; 8]).unwrap();
        std::fs::write(module_dir.join("d_a_obj_lamp.rel"), [0x22; 8]).unwrap();

        let layout = PatchLayout {
            module_extension: "mod".to_string(),
            ..PatchLayout::default()
        };
        let mut build = build_output(repo, "GZ2E01", &layout);

        assert_eq!(build.modules().unwrap(), vec!["d_a_obj_lamp"]);
        assert_eq!(build.read_module("d_a_obj_lamp").unwrap(), vec![0x11; 8]);
        assert_eq!(layout.archive_entry_name("d_a_obj_lamp"), "d_a_obj_lamp.mod");
    }
}
