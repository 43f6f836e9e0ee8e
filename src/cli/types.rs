//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "openmemory")]
#[command(about = "OpenMemory - multi-user memory service for MCP clients", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Load configuration from this file instead of .openmemory/
    #[arg(short, long, global = true, env = "OPENMEMORY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP HTTP/SSE server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        host: Option<String>,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// User and API key management
    #[command(subcommand)]
    Users(UserCommands),

    /// Memory maintenance
    #[command(subcommand)]
    Memories(MemoryCommands),
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user and print its API key (shown only once)
    Create {
        /// External user id (e.g. "alice")
        user_id: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Contact email
        #[arg(short, long)]
        email: Option<String>,
    },

    /// List users
    List,

    /// Revoke every API key of a user
    Revoke {
        /// External user id
        user_id: String,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Soft-delete a memory and remove it from the search index
    Forget {
        /// External user id owning the memory
        user_id: String,

        /// Memory ID
        memory_id: Uuid,

        /// App the memory is filed under (defaults to the configured app)
        #[arg(short, long)]
        app: Option<String>,
    },

    /// Soft-delete every memory a user holds in one app
    ForgetAll {
        /// External user id
        user_id: String,

        /// App to clear (defaults to the configured app)
        #[arg(short, long)]
        app: Option<String>,
    },
}
