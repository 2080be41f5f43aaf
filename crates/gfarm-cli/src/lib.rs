//! gfarm-gateway CLI definitions

use std::path::PathBuf;

use clap::Parser;

/// Command-line interface
#[derive(Parser)]
#[command(name = "gfarm-gateway")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway server
    Serve {
        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Bind host override
        #[arg(long)]
        host: Option<String>,
        /// Bind port override
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate configuration and print the effective values
    CheckConfig {
        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
