use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "heicforge")]
#[command(author, version, about = "HEIC/HEIF image conversion service")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP conversion service
    Start {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Convert a single image locally
    Convert {
        /// Input image
        #[arg(required = true)]
        input: PathBuf,

        /// Target format: jpeg, png, bmp, or webp
        #[arg(short, long)]
        format: Option<String>,

        /// Encoder quality, 1-100
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: Option<u8>,

        /// Output path (defaults to <input stem>.<format> next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
