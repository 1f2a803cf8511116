//! segvault CLI
//!
//! Offline tools for frame images written by segvault backups.
//!
//! # Commands
//!
//! - `inspect` - Validate a frame's footer and list its entries
//! - `partition` - Split a frame into recovery segments by tablet
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// segvault frame image tools.
#[derive(Parser)]
#[command(name = "segvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the frame image file
    #[arg(global = true, short, long)]
    image: Option<PathBuf>,

    /// Size of each frame in the image, in bytes
    #[arg(global = true, long, default_value_t = segvault_core::BackupConfig::DEFAULT_SEGMENT_SIZE)]
    frame_size: usize,

    /// Index of the frame to read
    #[arg(global = true, long, default_value = "0")]
    frame: usize,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a frame's footer and list its entries
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Split a frame into recovery segments by tablet
    Partition {
        /// JSON file holding the partition list
        #[arg(short, long)]
        tablets: PathBuf,

        /// Segment id for positions when the frame has no segment header
        #[arg(short, long)]
        segment_id: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let image = cli.image.ok_or("Image path required for inspect")?;
            commands::inspect::run(&image, cli.frame_size, cli.frame, &format)?;
        }
        Commands::Partition {
            tablets,
            segment_id,
            format,
        } => {
            let image = cli.image.ok_or("Image path required for partition")?;
            commands::partition::run(
                &image,
                cli.frame_size,
                cli.frame,
                &tablets,
                segment_id,
                &format,
            )?;
        }
        Commands::Version => {
            println!("segvault CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("segvault core v{}", segvault_core::VERSION);
        }
    }

    Ok(())
}
