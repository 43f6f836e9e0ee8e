//! OpenMemory CLI entry point.

use clap::Parser;

use openmemory::cli::{self, Cli};
use openmemory::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli::load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            cli::handle_error(&err, cli.json);
            std::process::exit(2);
        }
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => {
            cli::handle_error(&err, cli.json);
            std::process::exit(2);
        }
    };

    if let Err(err) = cli::run(cli.command, config, cli.json).await {
        tracing::error!(error = %format!("{:#}", err), "command failed");
        cli::handle_error(&err, cli.json);
        std::process::exit(1);
    }
}
