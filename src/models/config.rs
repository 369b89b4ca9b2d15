//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::ListingSelectors;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Poll cycle and scheduling settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Failure thresholds and health tick settings
    #[serde(default)]
    pub health: HealthConfig,

    /// Where persisted state lives
    #[serde(default)]
    pub paths: PathsConfig,

    /// HTTP client settings shared by sources and notifiers
    #[serde(default)]
    pub http: HttpConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Listing source definition
    #[serde(default)]
    pub source: SourceConfig,

    /// Digest delivery definition
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let w = &self.watcher;
        if !(1..=WatcherConfig::MAX_POLL_INTERVAL_HOURS).contains(&w.poll_interval_hours) {
            return Err(AppError::validation(format!(
                "watcher.poll_interval_hours must be between 1 and {}",
                WatcherConfig::MAX_POLL_INTERVAL_HOURS
            )));
        }
        if w.sleep_slice_secs == 0 {
            return Err(AppError::validation("watcher.sleep_slice_secs must be > 0"));
        }
        if !(1..=WatcherConfig::MAX_RETENTION_DAYS).contains(&w.retention_days) {
            return Err(AppError::validation(format!(
                "watcher.retention_days must be between 1 and {}",
                WatcherConfig::MAX_RETENTION_DAYS
            )));
        }
        if w.fetch_timeout_secs == 0 || w.notify_timeout_secs == 0 {
            return Err(AppError::validation(
                "watcher.fetch_timeout_secs and watcher.notify_timeout_secs must be > 0",
            ));
        }
        if self.health.max_consecutive_failures == 0 {
            return Err(AppError::validation(
                "health.max_consecutive_failures must be > 0",
            ));
        }
        if self.health.check_interval_secs == 0 {
            return Err(AppError::validation("health.check_interval_secs must be > 0"));
        }
        if self.health.staleness_factor.is_nan() || self.health.staleness_factor < 1.0 {
            return Err(AppError::validation("health.staleness_factor must be >= 1.0"));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        self.source.validate()?;
        self.notifier.validate()?;
        Ok(())
    }
}

/// Poll cycle and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Hours between poll cycles
    #[serde(default = "defaults::poll_interval_hours")]
    pub poll_interval_hours: u64,

    /// Granularity of the inter-cycle sleep; bounds shutdown latency
    #[serde(default = "defaults::sleep_slice_secs")]
    pub sleep_slice_secs: u64,

    /// Days since last sighting before a seen entry is pruned
    #[serde(default = "defaults::retention_days")]
    pub retention_days: u64,

    /// Upper bound for one listing fetch
    #[serde(default = "defaults::fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Upper bound for one digest delivery
    #[serde(default = "defaults::notify_timeout_secs")]
    pub notify_timeout_secs: u64,

    /// Send a "watcher started" message before the first cycle
    #[serde(default)]
    pub announce_startup: bool,
}

impl WatcherConfig {
    pub const MAX_POLL_INTERVAL_HOURS: u64 = 24 * 366;
    pub const MAX_RETENTION_DAYS: u64 = 36_500;

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_hours.saturating_mul(3600))
    }

    pub fn sleep_slice(&self) -> Duration {
        Duration::from_secs(self.sleep_slice_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_hours: defaults::poll_interval_hours(),
            sleep_slice_secs: defaults::sleep_slice_secs(),
            retention_days: defaults::retention_days(),
            fetch_timeout_secs: defaults::fetch_timeout_secs(),
            notify_timeout_secs: defaults::notify_timeout_secs(),
            announce_startup: false,
        }
    }
}

/// Failure thresholds and health tick settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Failed cycles in a row before the source is recreated
    #[serde(default = "defaults::max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Seconds between health ticks
    #[serde(default = "defaults::check_interval_secs")]
    pub check_interval_secs: u64,

    /// Multiple of the poll interval after which the watcher counts as stale
    #[serde(default = "defaults::staleness_factor")]
    pub staleness_factor: f64,
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: defaults::max_consecutive_failures(),
            check_interval_secs: defaults::check_interval_secs(),
            staleness_factor: defaults::staleness_factor(),
        }
    }
}

/// Persisted state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::seen_file")]
    pub seen_file: PathBuf,

    #[serde(default = "defaults::health_file")]
    pub health_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            seen_file: defaults::seen_file(),
            health_file: defaults::health_file(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::http_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::http_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Which listing source implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Scrape one or more HTML listing pages
    Html,
    /// Read items from a JSON file written by an external scraper
    #[default]
    JsonFile,
}

/// Listing source definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Listing pages, fetched in order (html)
    #[serde(default)]
    pub urls: Vec<String>,

    /// Items file (json_file)
    #[serde(default = "defaults::listings_file")]
    pub path: PathBuf,

    /// Regex with one capture group that pulls the id out of a listing URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_pattern: Option<String>,

    /// Substrings stripped from titles before they are stored
    #[serde(default)]
    pub title_remove_patterns: Vec<String>,

    #[serde(default)]
    pub selectors: ListingSelectors,
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        match self.kind {
            SourceKind::Html => {
                if self.urls.is_empty() {
                    return Err(AppError::validation("source.urls is empty"));
                }
                for url in &self.urls {
                    url::Url::parse(url).map_err(|e| {
                        AppError::validation(format!("source.urls entry '{url}': {e}"))
                    })?;
                }
                for (field, selector) in self.selectors.all() {
                    scraper::Selector::parse(selector).map_err(|e| {
                        AppError::validation(format!(
                            "source.selectors.{field} '{selector}': {e:?}"
                        ))
                    })?;
                }
            }
            SourceKind::JsonFile => {
                if self.path.as_os_str().is_empty() {
                    return Err(AppError::validation("source.path is empty"));
                }
            }
        }
        if let Some(pattern) = &self.id_pattern {
            let re = regex::Regex::new(pattern).map_err(|e| {
                AppError::validation(format!("source.id_pattern '{pattern}': {e}"))
            })?;
            if re.captures_len() < 2 {
                return Err(AppError::validation(
                    "source.id_pattern needs one capture group",
                ));
            }
        }
        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            urls: Vec::new(),
            path: defaults::listings_file(),
            id_pattern: None,
            title_remove_patterns: Vec::new(),
            selectors: ListingSelectors::default(),
        }
    }
}

/// Which notifier implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    /// Drop rendered messages into a directory for a mail transfer agent
    #[default]
    Outbox,
    /// POST rendered messages to an HTTP mail relay
    Webhook,
    /// Submit rendered messages to an SMTP server
    Smtp,
}

/// Transport security for SMTP submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587)
    #[default]
    Starttls,
    /// TLS from the first byte (port 465)
    Tls,
    /// No encryption; for a local relay only
    Plain,
}

/// Digest delivery definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,

    #[serde(default = "defaults::recipient")]
    pub recipient: String,

    #[serde(default = "defaults::sender")]
    pub sender: String,

    #[serde(default = "defaults::subject")]
    pub subject: String,

    /// Outbox directory (outbox)
    #[serde(default = "defaults::outbox_dir")]
    pub outbox_dir: PathBuf,

    /// Relay endpoint (webhook)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Name of the environment variable holding the relay bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Submission server (smtp)
    #[serde(default = "defaults::smtp_host")]
    pub smtp_host: String,

    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_security: SmtpSecurity,

    /// Environment variable holding the SMTP login
    #[serde(default = "defaults::smtp_username_env")]
    pub smtp_username_env: String,

    /// Environment variable holding the SMTP password
    #[serde(default = "defaults::smtp_password_env")]
    pub smtp_password_env: String,
}

impl NotifierConfig {
    fn validate(&self) -> Result<()> {
        if !self.recipient.contains('@') {
            return Err(AppError::validation(format!(
                "notifier.recipient '{}' is not an address",
                self.recipient
            )));
        }
        if !self.sender.contains('@') {
            return Err(AppError::validation(format!(
                "notifier.sender '{}' is not an address",
                self.sender
            )));
        }
        match self.kind {
            NotifierKind::Outbox => {
                if self.outbox_dir.as_os_str().is_empty() {
                    return Err(AppError::validation("notifier.outbox_dir is empty"));
                }
            }
            NotifierKind::Webhook => {
                let url = self
                    .webhook_url
                    .as_deref()
                    .ok_or_else(|| AppError::validation("notifier.webhook_url is required"))?;
                url::Url::parse(url).map_err(|e| {
                    AppError::validation(format!("notifier.webhook_url '{url}': {e}"))
                })?;
            }
            NotifierKind::Smtp => {
                if self.smtp_host.trim().is_empty() {
                    return Err(AppError::validation("notifier.smtp_host is empty"));
                }
                if self.smtp_port == 0 {
                    return Err(AppError::validation("notifier.smtp_port must be > 0"));
                }
            }
        }
        Ok(())
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            recipient: defaults::recipient(),
            sender: defaults::sender(),
            subject: defaults::subject(),
            outbox_dir: defaults::outbox_dir(),
            webhook_url: None,
            token_env: None,
            smtp_host: defaults::smtp_host(),
            smtp_port: defaults::smtp_port(),
            smtp_security: SmtpSecurity::default(),
            smtp_username_env: defaults::smtp_username_env(),
            smtp_password_env: defaults::smtp_password_env(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Watcher defaults
    pub fn poll_interval_hours() -> u64 {
        24
    }
    pub fn sleep_slice_secs() -> u64 {
        60
    }
    pub fn retention_days() -> u64 {
        30
    }
    pub fn fetch_timeout_secs() -> u64 {
        300
    }
    pub fn notify_timeout_secs() -> u64 {
        60
    }

    // Health defaults
    pub fn max_consecutive_failures() -> u32 {
        5
    }
    pub fn check_interval_secs() -> u64 {
        300
    }
    pub fn staleness_factor() -> f64 {
        1.5
    }

    // Paths
    pub fn seen_file() -> PathBuf {
        "seen_courses.json".into()
    }
    pub fn health_file() -> PathBuf {
        "logs/health_status.json".into()
    }
    pub fn listings_file() -> PathBuf {
        "listings.json".into()
    }
    pub fn outbox_dir() -> PathBuf {
        "outbox".into()
    }

    // HTTP
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; coursewatch/0.1)".into()
    }
    pub fn http_timeout() -> u64 {
        30
    }

    pub fn log_level() -> String {
        "info".into()
    }

    // Notifier
    pub fn recipient() -> String {
        "me@localhost".into()
    }
    pub fn sender() -> String {
        "coursewatch@localhost".into()
    }
    pub fn subject() -> String {
        "New free courses available".into()
    }
    pub fn smtp_host() -> String {
        "smtp.gmail.com".into()
    }
    pub fn smtp_port() -> u16 {
        587
    }
    pub fn smtp_username_env() -> String {
        "SMTP_USERNAME".into()
    }
    pub fn smtp_password_env() -> String {
        "SMTP_PASSWORD".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.watcher.poll_interval(), Duration::from_secs(24 * 3600));
        assert_eq!(config.watcher.sleep_slice(), Duration::from_secs(60));
        assert_eq!(config.watcher.retention_days, 30);
        assert_eq!(config.health.max_consecutive_failures, 5);
        assert_eq!(config.health.check_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_validate_bounds_retention_and_poll_interval() {
        let mut config = Config::default();
        config.watcher.retention_days = u64::MAX;
        assert!(config.validate().is_err());
        config.watcher.retention_days = 1_000_000_000;
        assert!(config.validate().is_err());
        config.watcher.retention_days = WatcherConfig::MAX_RETENTION_DAYS;
        assert!(config.validate().is_ok());

        config.watcher.poll_interval_hours = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(config.watcher.poll_interval(), Duration::from_secs(u64::MAX));
        config.watcher.poll_interval_hours = WatcherConfig::MAX_POLL_INTERVAL_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_failure_threshold() {
        let mut config = Config::default();
        config.health.max_consecutive_failures = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_html_source_needs_urls_and_valid_selectors() {
        let mut config = Config::default();
        config.source.kind = SourceKind::Html;
        assert!(config.validate().is_err());

        config.source.urls = vec!["https://example.com/courses/free/".into()];
        assert!(config.validate().is_ok());

        config.source.selectors.title_selector = "[[broken".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_id_pattern_needs_capture_group() {
        let mut config = Config::default();
        config.source.id_pattern = Some(r"/course/[^/]+/".into());
        assert!(config.validate().is_err());

        config.source.id_pattern = Some(r"/course/([^/]+)/".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_webhook_needs_url() {
        let mut config = Config::default();
        config.notifier.kind = NotifierKind::Webhook;
        assert!(config.validate().is_err());

        config.notifier.webhook_url = Some("https://relay.example.com/send".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_smtp_needs_host_and_port() {
        let mut config = Config::default();
        config.notifier.kind = NotifierKind::Smtp;
        assert!(config.validate().is_ok());
        assert_eq!(config.notifier.smtp_port, 587);
        assert_eq!(config.notifier.smtp_security, SmtpSecurity::Starttls);

        config.notifier.smtp_port = 0;
        assert!(config.validate().is_err());
        config.notifier.smtp_port = 465;
        config.notifier.smtp_host = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [watcher]
            poll_interval_hours = 6

            [source]
            kind = "html"
            urls = ["https://example.com/free"]

            [source.selectors]
            item_selector = "li.card"
            title_selector = "a.title"

            [notifier]
            kind = "webhook"
            webhook_url = "https://relay.example.com/send"
            recipient = "alice@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.watcher.poll_interval_hours, 6);
        assert_eq!(config.watcher.retention_days, 30);
        assert_eq!(config.source.kind, SourceKind::Html);
        assert_eq!(config.source.selectors.attr_name, "href");
        assert_eq!(config.notifier.kind, NotifierKind::Webhook);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let text = Config::default().to_toml_string().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.paths.seen_file, PathBuf::from("seen_courses.json"));
        assert_eq!(parsed.notifier.kind, NotifierKind::Outbox);
    }
}
