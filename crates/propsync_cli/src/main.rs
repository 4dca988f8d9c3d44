//! propsync CLI
//!
//! Command-line tools for the propsync cloud property client.
//!
//! # Commands
//!
//! - `demo` - Run a device against a simulated cloud
//! - `decode` - Print the records of a SenML-CBOR pack
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// propsync command-line tools.
#[derive(Parser)]
#[command(name = "propsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a device against a simulated cloud
    Demo {
        /// Drive the client from a polling loop instead of the event loop
        #[arg(long)]
        polled: bool,

        /// How long to run, in seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,

        /// Device ID
        #[arg(short, long, default_value = "demo-device")]
        device_id: String,
    },

    /// Print the records of a SenML-CBOR pack
    Decode {
        /// Pack file
        file: PathBuf,

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
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo {
            polled,
            seconds,
            device_id,
        } => {
            commands::demo::run(&device_id, polled, seconds)?;
        }
        Commands::Decode { file, format } => {
            commands::decode::run(&file, &format)?;
        }
        Commands::Version => {
            println!("propsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("propsync core v{}", propsync_core::VERSION);
        }
    }

    Ok(())
}
