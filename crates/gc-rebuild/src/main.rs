use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};
use commands::{list_disc, rebuild_disc, ListDiscArgs, RebuildDiscArgs};
use gctk_yaz0::CompressionLevel;
use miette::Result;
use tracing_subscriber::EnvFilter;

mod commands;
mod errors;
mod utils;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a modified disc image from a decompilation build
    Rebuild {
        /// Path to a vanilla Twilight Princess disc image to use as a base
        vanilla_iso: String,

        /// Path to write the modified disc image to
        output_iso: String,

        /// Path to the root of the decompilation repository
        decomp_repo: String,

        /// Folder to place the symbol map in (defaults to Dolphin's Maps folder)
        #[arg(short, long)]
        map: Option<String>,

        /// Game version whose build output is used (build/<version>)
        #[arg(long, default_value = "GZ2E01")]
        game_version: String,

        /// Yaz0 encoder effort for recompressed modules
        #[arg(long, value_enum, default_value = "best")]
        compression: CompressionArg,
    },
    /// List the files of a disc image
    List {
        /// Path to the disc image
        disc: String,

        /// Directory to list, e.g. files/rel/Final/Release
        #[arg(default_value = "")]
        prefix: String,

        /// Include files in subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
    /// Show or change the tool configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the current configuration
    Show,
    /// Set the folder the symbol map is copied to
    SetMapsDir {
        /// Folder path, created on the next rebuild if missing
        path: String,
    },
    /// Reset the configuration to defaults
    Reset,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum CompressionArg {
    Store,
    Fast,
    Best,
}

impl From<CompressionArg> for CompressionLevel {
    fn from(value: CompressionArg) -> Self {
        match value {
            CompressionArg::Store => CompressionLevel::Store,
            CompressionArg::Fast => CompressionLevel::Fast,
            CompressionArg::Best => CompressionLevel::Best,
        }
    }
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    match Args::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(error) => error.exit(),
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let args = parse_args();

    match args.command {
        Commands::Rebuild {
            vanilla_iso,
            output_iso,
            decomp_repo,
            map,
            game_version,
            compression,
        } => rebuild_disc(RebuildDiscArgs {
            vanilla_iso,
            output_iso,
            decomp_repo,
            map_dir: map,
            game_version,
            compression: compression.into(),
        }),
        Commands::List {
            disc,
            prefix,
            recursive,
        } => list_disc(ListDiscArgs {
            disc,
            prefix,
            recursive,
        }),
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config::show_config(),
            ConfigCommands::SetMapsDir { path } => commands::config::set_maps_dir(path),
            ConfigCommands::Reset => commands::config::reset_config(),
        },
    }
}
