//! Command-line arguments.

use clap::Parser;
use repo_notifier_api::{config::DEFAULT_KEY_FILE_DIR, ConfigSources};
use std::path::PathBuf;

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

/// Repo-Notifier - Slack notifications for repository changes
#[derive(Debug, Parser)]
#[command(name = "repo-notifier")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Posts repository change events from Pub/Sub to Slack")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "RN_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding one file per setting (mode, slack_url, port, ...)
    #[arg(long, env = "RN_CONFIG_DIR", default_value = DEFAULT_KEY_FILE_DIR)]
    pub config_dir: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Configuration sources selected by the arguments
    pub fn config_sources(&self) -> ConfigSources {
        ConfigSources {
            key_file_dir: Some(self.config_dir.clone()),
            explicit_file: self.config.clone(),
            ..ConfigSources::default()
        }
    }
}
