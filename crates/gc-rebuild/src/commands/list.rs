use crate::errors::CliError;
use crate::println_pad;
use crate::utils::format_size;
use camino::Utf8PathBuf;
use colored::Colorize;
use gctk_gcm::{DiscError, DiscImage};
use miette::Result;

pub struct ListDiscArgs {
    pub disc: String,
    pub prefix: String,
    pub recursive: bool,
}

pub fn list_disc(args: ListDiscArgs) -> Result<()> {
    let path = Utf8PathBuf::from(&args.disc);
    if !path.is_file() {
        return Err(CliError::disc_not_found(path).into());
    }

    let disc = DiscImage::open(&path).map_err(|e| CliError::invalid_disc(path.clone(), e))?;
    let records = disc
        .list_directory(&args.prefix, args.recursive)
        .map_err(|e| match e {
            DiscError::NotFound(prefix) => CliError::directory_not_found(prefix),
            other => CliError::invalid_disc(path.clone(), other),
        })?;

    let header = disc.header();
    println_pad!(
        "{} {} {}",
        "💿 Disc:".bright_blue().bold(),
        header.game_id.bright_cyan().bold(),
        format!("(rev {})", header.version).dimmed()
    );
    if !header.title.is_empty() {
        println_pad!("{} {}", "🏷️ Title:".bright_green(), header.title.bright_white());
    }
    println_pad!("");

    for record in &records {
        println_pad!(
            "{} {} {}",
            format!("{:#010x}", record.offset).dimmed(),
            format!("{:>10}", format_size(record.size)).bright_yellow(),
            record.path.bright_white()
        );
    }

    let total: u64 = records.iter().map(|record| record.size).sum();
    println_pad!("");
    println_pad!(
        "{} {} files, {}",
        "📦".bright_blue(),
        records.len(),
        format_size(total)
    );

    Ok(())
}
