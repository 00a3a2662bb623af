//! Command line argument parsing
//!
//! Administrative subcommands operating on the suspended-session store:
//! - `list`: List a user's suspended sessions
//! - `export`: Write a session's buffered output to a file
//! - `remove`: Delete a disconnected session and its files
//! - `terminate`: Destroy a session in any state
//! - `rename`: Set or clear a session's custom name
//! - `show-config`: Show configuration discovery information
//! - `init-config`: Write a default user configuration file

use crate::suspend::SuspendId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    Admin(AdminCommand),
    ShowConfig,
    InitConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    List {
        user: String,
        json: bool,
    },
    Export {
        user: String,
        id: SuspendId,
        output: Option<PathBuf>,
    },
    Remove {
        user: String,
        id: SuspendId,
    },
    Terminate {
        user: String,
        id: SuspendId,
    },
    Rename {
        user: String,
        id: SuspendId,
        name: String,
    },
}

#[derive(Debug, Parser)]
#[command(name = "shellpark")]
#[command(author = "Shellpark Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and clean up suspended SSH sessions")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Override the session storage directory
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List a user's suspended sessions
    List {
        /// Owning user id
        #[arg(short = 'u', long = "user")]
        user: String,
        /// Print records as JSON
        #[arg(long = "json")]
        json: bool,
    },
    /// Export a session's buffered output
    Export {
        #[arg(short = 'u', long = "user")]
        user: String,
        /// Suspend id
        #[arg(short = 'i', long = "id")]
        id: SuspendId,
        /// Destination file (defaults to a generated name in the current directory)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Remove a disconnected session and its files
    Remove {
        #[arg(short = 'u', long = "user")]
        user: String,
        #[arg(short = 'i', long = "id")]
        id: SuspendId,
    },
    /// Terminate a session in any state
    Terminate {
        #[arg(short = 'u', long = "user")]
        user: String,
        #[arg(short = 'i', long = "id")]
        id: SuspendId,
    },
    /// Set a session's custom name (empty clears it)
    Rename {
        #[arg(short = 'u', long = "user")]
        user: String,
        #[arg(short = 'i', long = "id")]
        id: SuspendId,
        /// New name
        #[arg(short = 'n', long = "name")]
        name: String,
    },
    /// Show configuration discovery information
    ShowConfig,
    /// Create ~/.shellpark/config.toml with default settings
    InitConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        let command = match &self.command {
            Some(Commands::List { user, json }) => AdminCommand::List {
                user: user.clone(),
                json: *json,
            },
            Some(Commands::Export { user, id, output }) => AdminCommand::Export {
                user: user.clone(),
                id: *id,
                output: output.clone(),
            },
            Some(Commands::Remove { user, id }) => AdminCommand::Remove {
                user: user.clone(),
                id: *id,
            },
            Some(Commands::Terminate { user, id }) => AdminCommand::Terminate {
                user: user.clone(),
                id: *id,
            },
            Some(Commands::Rename { user, id, name }) => AdminCommand::Rename {
                user: user.clone(),
                id: *id,
                name: name.clone(),
            },
            Some(Commands::ShowConfig) => return Ok(ExecutionMode::ShowConfig),
            Some(Commands::InitConfig) => return Ok(ExecutionMode::InitConfig),
            None => {
                return Err(
                    "No command specified. Use 'shellpark --help' to see available commands."
                        .to_string(),
                );
            }
        };

        if command.user().trim().is_empty() {
            return Err("User id must not be empty".to_string());
        }

        Ok(ExecutionMode::Admin(command))
    }
}

impl AdminCommand {
    pub fn user(&self) -> &str {
        match self {
            AdminCommand::List { user, .. }
            | AdminCommand::Export { user, .. }
            | AdminCommand::Remove { user, .. }
            | AdminCommand::Terminate { user, .. }
            | AdminCommand::Rename { user, .. } => user,
        }
    }
}
