//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use crate::mode::BuildMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "pagewright.toml";

/// pagewright multi-page site builder CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name, relative to root (optional file)
    #[arg(short = 'C', long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build every page and asset into the output directory
    Build {
        /// Build mode
        #[arg(short, long, value_enum, default_value_t = BuildMode::Production)]
        mode: BuildMode,

        /// Output directory path (relative to project root)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build in development mode, serve the output and rebuild on change
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// HTTP port
        #[arg(short, long)]
        port: Option<u16>,

        /// WebSocket port for live reload
        #[arg(long)]
        reload_port: Option<u16>,

        /// enable watch
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}

impl Cli {
    /// Mode the selected command builds in.
    pub const fn mode(&self) -> BuildMode {
        match self.command {
            Commands::Build { mode, .. } => mode,
            Commands::Serve { .. } => BuildMode::Development,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults_to_production() {
        let cli = Cli::parse_from(["pagewright", "build"]);
        assert_eq!(cli.mode(), BuildMode::Production);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG));
    }

    #[test]
    fn test_build_mode_flag() {
        let cli = Cli::parse_from(["pagewright", "build", "--mode", "development", "-o", "out"]);
        assert_eq!(cli.mode(), BuildMode::Development);
        let Commands::Build { output, .. } = cli.command else {
            panic!("expected build command");
        };
        assert_eq!(output, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_serve_is_development() {
        let cli = Cli::parse_from(["pagewright", "--root", "site", "serve", "-p", "8080", "-w", "false"]);
        assert_eq!(cli.mode(), BuildMode::Development);
        assert_eq!(cli.root, Some(PathBuf::from("site")));
        let Commands::Serve { port, watch, .. } = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(port, Some(8080));
        assert_eq!(watch, Some(false));
    }
}
