//! Command-line interface.

use clap::{Parser, Subcommand};

/// Jellystream - authenticated gateway for Jellyfin, TMDB, Radarr and Sonarr
#[derive(Debug, Parser)]
#[command(name = "jellystream")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run the HTTP API (default)
    Serve,

    /// Write a default config.toml to the working directory
    #[command(alias = "--init")]
    Init,

    /// Replace a user's password with a generated one
    ResetPassword {
        /// Account to reset
        username: String,
    },
}

impl Cli {
    #[must_use]
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
