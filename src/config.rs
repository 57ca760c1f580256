//! Configuration loader and validator for the booking notifier.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    pub airtable: Airtable,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    /// Seconds between two poll cycles.
    pub poll_interval_secs: u64,
    /// Pause between successive sends inside one cycle.
    pub send_delay_ms: u64,
    /// Address the trigger endpoint listens on.
    pub bind: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            send_delay_ms: 1000,
            bind: "0.0.0.0:10000".into(),
        }
    }
}

/// Telegram bot settings.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Telegram {
    pub bot_token: String,
    pub api_base: String,
    /// Link appended to every message pointing at the instructor's course list.
    pub details_url: Option<String>,
}

impl Default for Telegram {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: "https://api.telegram.org/".into(),
            details_url: None,
        }
    }
}

/// Airtable API settings and field mapping.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Airtable {
    pub api_key: String,
    pub base_id: String,
    pub table: String,
    pub api_base: String,
    /// Value of the status field that makes a booking eligible.
    pub eligible_status: String,
    /// Verbatim `filterByFormula`; derived from `fields` when absent.
    pub filter_formula: Option<String>,
    pub fields: Fields,
}

impl Default for Airtable {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_id: String::new(),
            table: "Bookings".into(),
            api_base: "https://api.airtable.com/".into(),
            eligible_status: "Scheduled".into(),
            filter_formula: None,
            fields: Fields::default(),
        }
    }
}

impl fmt::Debug for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telegram")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("details_url", &self.details_url)
            .finish()
    }
}

impl fmt::Debug for Airtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Airtable")
            .field("api_key", &"[REDACTED]")
            .field("base_id", &self.base_id)
            .field("table", &self.table)
            .field("api_base", &self.api_base)
            .field("eligible_status", &self.eligible_status)
            .field("filter_formula", &self.filter_formula)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Column names of the bookings table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Fields {
    pub notify_due: String,
    pub status: String,
    pub recipient: String,
    pub instructor: String,
    pub course: String,
    pub date: String,
    pub duration: String,
    pub business: String,
    pub location: String,
    pub address: String,
    pub map_link: String,
    pub fee: String,
    pub contact_email: String,
    pub notified_at: String,
}

impl Default for Fields {
    fn default() -> Self {
        Self {
            notify_due: "Send notification Telegram to instructor".into(),
            status: "Course status".into(),
            recipient: "Instructor Telegram ID".into(),
            instructor: "Instructor".into(),
            course: "Course (text)".into(),
            date: "Matrix date".into(),
            duration: "Duration".into(),
            business: "Business".into(),
            location: "Location".into(),
            address: "Full address".into(),
            map_link: "Map link".into(),
            fee: "Instructor fee".into(),
            contact_email: "Contact email".into(),
            notified_at: "Telegram Notification Sent".into(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.app.poll_interval_secs)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.app.send_delay_ms)
    }

    /// Overlay secrets and deployment knobs from the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = lookup("AIRTABLE_API_KEY") {
            self.airtable.api_key = v;
        }
        if let Some(v) = lookup("AIRTABLE_BASE_ID") {
            self.airtable.base_id = v;
        }
        if let Some(v) = lookup("AIRTABLE_TABLE") {
            self.airtable.table = v;
        }
        if let Some(port) = lookup("PORT") {
            let host = self
                .app
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".into());
            self.app.bind = format!("{}:{}", host, port.trim());
        }
    }
}

/// Load configuration from a YAML file, overlay the environment and validate.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - A missing file is not an error; everything can come from the environment.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let mut cfg = if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content)?
    } else {
        Config::default()
    };
    cfg.apply_env(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_secs must be > 0"));
    }
    if cfg.app.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind must be non-empty"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.telegram.api_base).is_err() {
        return Err(ConfigError::Invalid("telegram.api_base must be a valid URL"));
    }

    if cfg.airtable.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("airtable.api_key must be non-empty"));
    }
    if cfg.airtable.base_id.trim().is_empty() {
        return Err(ConfigError::Invalid("airtable.base_id must be non-empty"));
    }
    if cfg.airtable.table.trim().is_empty() {
        return Err(ConfigError::Invalid("airtable.table must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.airtable.api_base).is_err() {
        return Err(ConfigError::Invalid("airtable.api_base must be a valid URL"));
    }
    if cfg.airtable.eligible_status.trim().is_empty() {
        return Err(ConfigError::Invalid("airtable.eligible_status must be non-empty"));
    }

    let f = &cfg.airtable.fields;
    if f.notify_due.trim().is_empty() {
        return Err(ConfigError::Invalid("airtable.fields.notify_due must be non-empty"));
    }
    if f.status.trim().is_empty() {
        return Err(ConfigError::Invalid("airtable.fields.status must be non-empty"));
    }
    if f.recipient.trim().is_empty() {
        return Err(ConfigError::Invalid("airtable.fields.recipient must be non-empty"));
    }
    if f.notified_at.trim().is_empty() {
        return Err(ConfigError::Invalid("airtable.fields.notified_at must be non-empty"));
    }

    Ok(())
}

/// Returns the example YAML content shipped as `config.example.yaml`.
pub fn example() -> &'static str {
    r#"app:
  poll_interval_secs: 30
  send_delay_ms: 1000
  bind: "0.0.0.0:10000"

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  details_url: "https://bit.ly/4l7cljw"

airtable:
  api_key: "YOUR_AIRTABLE_API_KEY"
  base_id: "appXXXXXXXXXXXXXX"
  table: "Bookings"
  eligible_status: "Scheduled"
  fields:
    notify_due: "Send notification Telegram to instructor"
    status: "Course status"
    recipient: "Instructor Telegram ID"
    instructor: "Instructor"
    course: "Course (text)"
    date: "Matrix date"
    business: "Business"
    location: "Location"
    address: "Full address"
    map_link: "Map link"
    fee: "Instructor fee"
    notified_at: "Telegram Notification Sent"
"#
}
