//! # Repo-Notifier Service
//!
//! Binary entry point for the repo-notifier service.
//!
//! This executable:
//! - Loads configuration from files, key files and environment
//! - Initializes logging
//! - Runs the push endpoint or the pull subscriber, depending on `mode`
//!
//! Startup failures exit with a non-zero code: 1 bind, 2 server,
//! 3 configuration, 4 queue connection.

mod app;
mod cli;
mod logging;

use clap::Parser;
use repo_notifier_api::{LoggingConfig, ServiceConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let config = match ServiceConfig::load(&cli.config_sources()) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&LoggingConfig::default());
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    logging::init_logging(&config.logging);

    if cli.check_config {
        match config.validate() {
            Ok(()) => {
                info!(mode = %config.mode, "Configuration is valid");
                return;
            }
            Err(e) => {
                error!(error = %e, "Service configuration is invalid");
                std::process::exit(3);
            }
        }
    }

    if let Err(e) = app::run(config).await {
        error!(error = %e, "repo-notifier failed");
        std::process::exit(e.exit_code());
    }
}
