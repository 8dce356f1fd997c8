//! Tealeaf Exporter
//!
//! Logs into the Tealeaf analytics console with a headless browser, exports
//! the project's saved search view as CSV, and uploads the files to the
//! project's OneDrive folder via Microsoft Graph.

pub mod browser;
pub mod scheduler;
pub mod upload;
pub mod workflow;

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use scheduler::ScheduleConfig;
use workflow::StepVars;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable '{0}'")]
    MissingVar(String),

    #[error("Invalid value '{value}' for environment variable '{name}'")]
    InvalidVar { name: String, value: String },

    #[error("Failed to load steps file {path}: {reason}")]
    StepsFile { path: String, reason: String },
}

/// Application configuration
///
/// Built explicitly from the environment and passed to the workflow, so
/// tests can substitute fake credentials and endpoints.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Console login username (also the drive owner)
    pub username: String,
    /// Console login password
    pub password: String,
    /// Microsoft account password used for the token flow
    pub graph_password: String,
    /// OAuth application (client) id
    pub client_id: String,
    /// Local directory the console exports download into
    pub data_path: PathBuf,

    /// Project whose saved view is exported
    #[serde(default = "default_project")]
    pub project: String,
    /// Analytics console entry URL
    #[serde(default = "default_console_url")]
    pub console_url: String,
    /// Identity authority issuing the upload tokens
    #[serde(default = "default_authority")]
    pub authority: String,
    /// Graph API base URL
    #[serde(default = "default_graph_base")]
    pub graph_base: String,

    /// Run the browser headless
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Chrome executable override
    #[serde(default)]
    pub chrome_path: Option<String>,
    /// Per-step wait timeout in seconds
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
    /// Session attempts before the run gives up
    #[serde(default = "default_max_session_attempts")]
    pub max_session_attempts: u32,
    /// Optional JSON file replacing the built-in step sequence
    #[serde(default)]
    pub steps_file: Option<PathBuf>,

    /// Schedule configuration
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

fn default_project() -> String {
    "Harmony".to_string()
}

fn default_console_url() -> String {
    "https://tealeaf-us-2.goacoustic.com/webapp/home#/intelli-search".to_string()
}

fn default_authority() -> String {
    "https://login.microsoftonline.com/organizations".to_string()
}

fn default_graph_base() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_step_timeout() -> u64 {
    30
}

fn default_max_session_attempts() -> u32 {
    3
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name.to_string())),
    }
}

fn env_or(name: &str, default: fn() -> String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => {
            value.parse().map_err(|_| ConfigError::InvalidVar {
                name: name.to_string(),
                value,
            })
        }
        _ => Ok(default),
    }
}

impl AppConfig {
    /// Build the configuration from environment variables.
    ///
    /// Required: `username`, `password`, `password_m`, `client_id`,
    /// `DATA_PATH`. Everything else has a sensible default and a
    /// `TEALEAF_*` override.
    pub fn from_env() -> Result<Self, ConfigError> {
        let schedule = match std::env::var("TEALEAF_INTERVAL_MINUTES") {
            Ok(value) if !value.is_empty() => {
                let interval_minutes =
                    value.parse().map_err(|_| ConfigError::InvalidVar {
                        name: "TEALEAF_INTERVAL_MINUTES".to_string(),
                        value,
                    })?;
                ScheduleConfig {
                    enabled: true,
                    interval_minutes,
                    ..Default::default()
                }
            }
            _ => ScheduleConfig::default(),
        };

        Ok(Self {
            username: require_env("username")?,
            password: require_env("password")?,
            graph_password: require_env("password_m")?,
            client_id: require_env("client_id")?,
            data_path: PathBuf::from(require_env("DATA_PATH")?),
            project: env_or("TEALEAF_PROJECT", default_project),
            console_url: env_or("TEALEAF_URL", default_console_url),
            authority: env_or("TEALEAF_AUTHORITY", default_authority),
            graph_base: env_or("TEALEAF_GRAPH_BASE", default_graph_base),
            headless: env_parse("TEALEAF_HEADLESS", default_headless())?,
            chrome_path: std::env::var("CHROME_PATH").ok().filter(|p| !p.is_empty()),
            step_timeout_secs: env_parse("TEALEAF_STEP_TIMEOUT_SECS", default_step_timeout())?,
            max_session_attempts: env_parse(
                "TEALEAF_MAX_SESSION_ATTEMPTS",
                default_max_session_attempts(),
            )?,
            steps_file: std::env::var("TEALEAF_STEPS_FILE")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            schedule,
        })
    }

    /// The drive folder endpoint uploads are PUT against
    pub fn endpoint(&self) -> String {
        format!(
            "{}/users/{}/drive/root:/{}_csv",
            self.graph_base, self.username, self.project
        )
    }

    /// OAuth scopes requested with the token
    pub fn scope(&self) -> String {
        "user.read files.readwrite.all sites.readwrite.all".to_string()
    }

    /// Values substituted into step placeholders
    pub fn step_vars(&self) -> StepVars {
        StepVars {
            username: self.username.clone(),
            password: self.password.clone(),
            project: self.project.clone(),
        }
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tealeaf-exporter").join("logs"))
}

/// Truncate a string to at most `max` bytes on a char boundary, for logs
pub fn safe_truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Initialize logging (console + daily-rolling file)
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "tealeaf-exporter.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

/// Log the non-secret parts of a config at startup
pub fn log_config(config: &AppConfig) {
    info!(
        "Config: project={}, console={}, data_path={}, headless={}, attempts={}",
        config.project,
        config.console_url,
        config.data_path.display(),
        config.headless,
        config.max_session_attempts
    );
    info!("Upload endpoint: {}", config.endpoint());
}
