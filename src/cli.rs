//! Command-line interface definition for Atelier
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for signing in, signing out, inspecting the stored
//! session, and issuing authenticated requests.

use clap::{Parser, Subcommand};

/// Atelier - storefront API client
///
/// Talks to the boutique marketplace backend with automatic access-token
/// refresh.
#[derive(Parser, Debug, Clone)]
#[command(name = "atelier")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "ATELIER_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the API base URL from config
    #[arg(long)]
    pub base_url: Option<String>,

    /// Keep credentials in memory only (nothing is written to the keyring)
    ///
    /// Tokens live only as long as this process, so later commands cannot
    /// use them. Suited to one-shot requests that need no stored session.
    #[arg(long)]
    pub ephemeral: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Atelier
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in and store the returned tokens
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "ATELIER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Remove stored tokens
    Logout,

    /// Show which credentials are stored
    Status,

    /// Send an authenticated request and print the response body
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Path relative to the base URL, e.g. /Boutique
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Extra header as `Name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Warning for flag combinations that silently do nothing useful.
    ///
    /// `--ephemeral login` signs in, but the tokens vanish when the process
    /// exits.
    pub fn ephemeral_warning(&self) -> Option<&'static str> {
        match self.command {
            Commands::Login { .. } if self.ephemeral => Some(
                "--ephemeral keeps tokens in memory only; they are discarded when this command exits",
            ),
            _ => None,
        }
    }
}
