//! Command-line interface.

pub mod commands;
pub mod display;
pub mod types;

pub use types::{Cli, Commands, MemoryCommands, UserCommands};

use anyhow::Result;

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use commands::{memories, serve, users, AppContext};

/// Load configuration from `--config` or the project directory.
pub fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Run a parsed command against loaded configuration.
pub async fn run(command: Commands, config: Config, json: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    match command {
        Commands::Serve { host, port } => serve::handle_serve(ctx, host, port).await,
        Commands::Users(UserCommands::Create { user_id, name, email }) => {
            users::handle_create(ctx.service.identities().as_ref(), user_id, name, email, json).await
        }
        Commands::Users(UserCommands::List) => {
            users::handle_list(ctx.service.as_ref(), json).await
        }
        Commands::Users(UserCommands::Revoke { user_id }) => {
            users::handle_revoke(ctx.service.identities().as_ref(), user_id, json).await
        }
        Commands::Memories(MemoryCommands::Forget { user_id, memory_id, app }) => {
            let app = app.unwrap_or_else(|| ctx.config.default_app.clone());
            memories::handle_forget(ctx.service.as_ref(), user_id, memory_id, app, json).await
        }
        Commands::Memories(MemoryCommands::ForgetAll { user_id, app }) => {
            let app = app.unwrap_or_else(|| ctx.config.default_app.clone());
            memories::handle_forget_all(ctx.service.as_ref(), user_id, app, json).await
        }
    }
}

/// Print a top-level error the way the output mode expects.
pub fn handle_error(err: &anyhow::Error, json: bool) {
    if json {
        eprintln!("{}", serde_json::json!({ "error": format!("{:#}", err) }));
    } else {
        eprintln!("Error: {:#}", err);
    }
}
