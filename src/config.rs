use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub scraping: ScrapingConfig,
    pub polling: PollingConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scraping backend endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme, host and port of the backend (no trailing slash needed)
    pub base_url: String,
    /// POST endpoint for demo and credential starts
    #[serde(default = "default_start_path")]
    pub start_path: String,
    /// POST endpoint for the email verification code protocol
    #[serde(default = "default_verify_path")]
    pub verify_path: String,
    /// GET endpoint prefix; the session id is appended as a path segment
    #[serde(default = "default_progress_path")]
    pub progress_path: String,
    /// GET endpoint for the scraped jobs listing
    #[serde(default = "default_jobs_path")]
    pub jobs_path: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_start_path() -> String {
    "/greenhouse/start".to_string()
}

fn default_verify_path() -> String {
    "/greenhouse/start-with-verification".to_string()
}

fn default_progress_path() -> String {
    "/greenhouse/progress".to_string()
}

fn default_jobs_path() -> String {
    "/jobs".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            start_path: default_start_path(),
            verify_path: default_verify_path(),
            progress_path: default_progress_path(),
            jobs_path: default_jobs_path(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// Upper bound on postings the backend should scrape per session
    pub max_jobs: u32,
    /// Account used for demo sessions
    pub demo_email: String,
    /// How many listing rows the results view fetches
    pub results_limit: u32,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            max_jobs: 50,
            demo_email: "demo@example.com".to_string(),
            results_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between progress polls in milliseconds
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub state: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: ".jobscout".to_string(), // Relative to cwd
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to a file under the state directory instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

impl Config {
    /// Path to the project-local config file
    pub fn local_config_path() -> PathBuf {
        PathBuf::from(".jobscout/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so jobscout works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        // User config in ~/.config/jobscout/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("jobscout").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables, e.g. JOBSCOUT__API__BASE_URL
        builder = builder.add_source(
            config::Environment::with_prefix("JOBSCOUT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .jobscout/config.toml
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::local_config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(&config_path, toml_str).context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    /// Durable key-value file standing in for browser local storage
    pub fn flags_path(&self) -> PathBuf {
        self.state_path().join("flags.json")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}
