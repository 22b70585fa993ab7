//! Configuration types for the service and their layered loading.
//!
//! Sources are applied in order, later sources overriding earlier ones:
//!
//! 1. `/etc/repo-notifier/service.yaml` (optional)
//! 2. `config/service.yaml` (optional)
//! 3. The key-file directory: one file per setting (`mode`, `slack_url`,
//!    `port`, `project_id`, `subscription`) holding a single trimmed value,
//!    the layout produced by mounting config maps and secrets as volumes.
//! 4. An explicitly named file (required when given)
//! 5. Environment variables prefixed `RN__`, e.g. `RN__SERVER__PORT=9090`
//!
//! Every field carries a default, so an unconfigured environment yields a
//! complete configuration. [`ServiceConfig::validate`] decides whether it is
//! usable for the selected mode.

use crate::errors::ConfigError;
use queue_runtime::{
    PubSubAuthMethod, PubSubConfig, ProviderConfig, QueueConfig, SecretString, SubscriptionName,
    DEFAULT_PUBSUB_ENDPOINT,
};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// System-wide configuration file
pub const SYSTEM_CONFIG_FILE: &str = "/etc/repo-notifier/service.yaml";

/// Deployment-local configuration file
pub const LOCAL_CONFIG_FILE: &str = "config/service.yaml";

/// Default directory holding one file per setting
pub const DEFAULT_KEY_FILE_DIR: &str = "config";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "RN";

/// Variable naming a Pub/Sub emulator as `host:port`
pub const EMULATOR_HOST_VAR: &str = "PUBSUB_EMULATOR_HOST";

/// Upper bound on `pubsub.request_timeout_seconds`
pub const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 3600;

/// Paths the push endpoint may not take over
const RESERVED_PATHS: &[&str] = &["/health", "/ready", "/metrics"];

/// Key files and the setting each one fills, in `__`-separated form
const KEY_FILES: &[(&str, &str)] = &[
    ("mode", "mode"),
    ("slack_url", "slack__webhook_url"),
    ("port", "server__port"),
    ("project_id", "pubsub__project_id"),
    ("subscription", "pubsub__subscription"),
];

/// How queue messages reach the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Pub/Sub calls the HTTP push endpoint
    Push,
    /// The service pulls from a subscription
    #[default]
    Pull,
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Ingress mode
    pub mode: ServiceMode,

    /// Notification destination
    pub slack: SlackConfig,

    /// HTTP server settings (push mode)
    pub server: ServerConfig,

    /// Push endpoint settings
    pub push: PushConfig,

    /// Pull subscription settings
    pub pubsub: PubSubSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Slack webhook configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Incoming webhook URL; empty disables notifications
    pub webhook_url: SecretString,

    /// Bound on a single delivery
    pub timeout_seconds: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: SecretString::new(""),
            timeout_seconds: 5,
        }
    }
}

impl SlackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds == 0 {
            return Err(invalid("slack.timeout_seconds must be greater than zero"));
        }

        let webhook_url = self.webhook_url.expose_secret();
        if !webhook_url.is_empty() && !is_http_url(webhook_url) {
            return Err(invalid("slack.webhook_url must be an absolute http(s) URL"));
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path receiving push requests
    pub push_path: String,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            push_path: "/".to_string(),
            max_body_size: 1024 * 1024, // 1MB
            shutdown_timeout_seconds: 30,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(invalid("server.port must be greater than zero"));
        }

        if !self.push_path.starts_with('/') {
            return Err(invalid("server.push_path must start with '/'"));
        }

        if RESERVED_PATHS.contains(&self.push_path.as_str()) {
            return Err(invalid(format!(
                "server.push_path '{}' is reserved",
                self.push_path
            )));
        }

        if self.max_body_size == 0 {
            return Err(invalid("server.max_body_size must be greater than zero"));
        }

        Ok(())
    }
}

/// Push endpoint configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Value the `token` query parameter must carry, when set
    pub verification_token: Option<SecretString>,
}

/// Pull subscription configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PubSubSettings {
    pub project_id: String,

    pub subscription: String,

    /// REST endpoint; points at the emulator in local setups
    pub endpoint: String,

    pub auth: PubSubAuthMethod,

    /// Messages requested per pull
    pub max_messages: u32,

    /// Bound on a single REST call
    pub request_timeout_seconds: u64,
}

impl Default for PubSubSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            subscription: String::new(),
            endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            auth: PubSubAuthMethod::default(),
            max_messages: 10,
            request_timeout_seconds: 60,
        }
    }
}

impl PubSubSettings {
    /// Point the client at an emulator given as `host:port`
    pub fn use_emulator(&mut self, host: &str) {
        self.endpoint = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        self.auth = PubSubAuthMethod::Emulator;
    }

    /// Validated subscription name
    pub fn subscription_name(&self) -> Result<SubscriptionName, ConfigError> {
        if self.subscription.is_empty() {
            return Err(ConfigError::Missing {
                key: "pubsub.subscription".to_string(),
            });
        }

        SubscriptionName::new(self.subscription.clone())
            .map_err(|e| invalid(format!("pubsub.subscription: {}", e)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.is_empty() {
            return Err(ConfigError::Missing {
                key: "pubsub.project_id".to_string(),
            });
        }

        self.subscription_name()?;

        if !(1..=1000).contains(&self.max_messages) {
            return Err(invalid("pubsub.max_messages must be between 1 and 1000"));
        }

        if !(1..=MAX_REQUEST_TIMEOUT_SECONDS).contains(&self.request_timeout_seconds) {
            return Err(invalid(format!(
                "pubsub.request_timeout_seconds must be between 1 and {}",
                MAX_REQUEST_TIMEOUT_SECONDS
            )));
        }

        if !is_http_url(&self.endpoint) {
            return Err(invalid("pubsub.endpoint must be an absolute http(s) URL"));
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Where configuration is read from
#[derive(Debug, Clone)]
pub struct ConfigSources {
    pub system_file: PathBuf,
    pub local_file: PathBuf,
    pub key_file_dir: Option<PathBuf>,
    pub explicit_file: Option<PathBuf>,
    pub env_prefix: String,
    pub emulator_host: Option<String>,
}

impl Default for ConfigSources {
    fn default() -> Self {
        Self {
            system_file: PathBuf::from(SYSTEM_CONFIG_FILE),
            local_file: PathBuf::from(LOCAL_CONFIG_FILE),
            key_file_dir: Some(PathBuf::from(DEFAULT_KEY_FILE_DIR)),
            explicit_file: None,
            env_prefix: ENV_PREFIX.to_string(),
            emulator_host: std::env::var(EMULATOR_HOST_VAR)
                .ok()
                .filter(|host| !host.is_empty()),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from all sources
    ///
    /// A malformed file or a value that cannot be coerced to its field type
    /// is an error. Missing optional files are not.
    pub fn load(sources: &ConfigSources) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::from(sources.system_file.as_path())
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::from(sources.local_file.as_path())
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Some(dir) = &sources.key_file_dir {
            let values = read_key_files(dir)?;
            if !values.is_empty() {
                debug!(
                    directory = %dir.display(),
                    keys = values.len(),
                    "Loaded settings from key files"
                );
                builder = builder.add_source(
                    config::Environment::default()
                        .separator("__")
                        .source(Some(values)),
                );
            }
        }

        if let Some(path) = &sources.explicit_file {
            info!(path = %path.display(), "Loading configuration from explicit path");
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(&sources.env_prefix).separator("__"))
            .build()?;

        let mut service_config: ServiceConfig = settings.try_deserialize()?;

        if let Some(host) = &sources.emulator_host {
            info!(host = %host, "Using Pub/Sub emulator");
            service_config.pubsub.use_emulator(host);
        }

        Ok(service_config)
    }

    /// Check that the configuration is usable for the selected mode
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.slack.validate()?;

        match self.mode {
            ServiceMode::Push => self.server.validate(),
            ServiceMode::Pull => self.pubsub.validate(),
        }
    }

    /// Queue client configuration for pull mode
    pub fn queue_config(&self) -> QueueConfig {
        let mut pubsub = PubSubConfig::new(self.pubsub.project_id.clone());
        pubsub.endpoint = self.pubsub.endpoint.clone();
        pubsub.auth = self.pubsub.auth.clone();
        let timeout_seconds = self
            .pubsub
            .request_timeout_seconds
            .min(MAX_REQUEST_TIMEOUT_SECONDS);
        pubsub.request_timeout = chrono::Duration::seconds(timeout_seconds as i64);

        QueueConfig {
            provider: ProviderConfig::GooglePubSub(pubsub),
            ..QueueConfig::default()
        }
    }
}

/// Read the single-value key files present in a directory
fn read_key_files(dir: &Path) -> Result<config::Map<String, String>, ConfigError> {
    let mut values = config::Map::new();
    if !dir.is_dir() {
        return Ok(values);
    }

    for (file_name, key) in KEY_FILES {
        let path = dir.join(file_name);
        if !path.is_file() {
            continue;
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        values.insert(key.to_string(), content.trim().to_string());
    }

    Ok(values)
}

fn is_http_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}
