//! Feed configuration at ~/.config/calfeed/config.toml
//!
//! Every key is optional. Environment variables prefixed with `CALFEED__`
//! override file values, with `__` separating nested keys
//! (`CALFEED__FETCH__TIMEOUT_SECS=5`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Months;
use chrono_tz::Tz;
use config::{Config, Environment, File, Map};
use serde::Deserialize;

use crate::constants::{
    DEFAULT_EVENT_DURATION_MINUTES, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_FILENAME,
    DEFAULT_PRODUCT_DOMAIN, DEFAULT_PRODUCT_ID, DEFAULT_RECURRENCE_SPAN_MONTHS,
    DEFAULT_STORE_TIMEZONE, USER_AGENT,
};
use crate::error::{CalFeedError, CalFeedResult};
use crate::ics::{CalendarMetadata, ParseOptions};
use crate::source::ExternalSource;
use crate::time::resolve_timezone;

fn default_store_timezone() -> String {
    DEFAULT_STORE_TIMEZONE.to_string()
}

fn default_duration_minutes() -> i64 {
    DEFAULT_EVENT_DURATION_MINUTES
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Zone in which the event store keeps naive timestamps.
    #[serde(default = "default_store_timezone")]
    pub store_timezone: String,

    /// Length given to timed events without a usable end.
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: i64,

    #[serde(default)]
    pub calendar: CalendarSection,

    #[serde(default)]
    pub fetch: FetchSection,

    #[serde(default)]
    pub recurrence: RecurrenceSection,

    #[serde(default)]
    pub logging: LoggingSection,

    /// External sources available to `major:` preferences.
    #[serde(default)]
    pub sources: Vec<ExternalSource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarSection {
    pub product_id: String,
    pub domain: String,
    pub name: Option<String>,
    pub filename: String,
}

impl Default for CalendarSection {
    fn default() -> Self {
        CalendarSection {
            product_id: DEFAULT_PRODUCT_ID.to_string(),
            domain: DEFAULT_PRODUCT_DOMAIN.to_string(),
            name: None,
            filename: DEFAULT_FILENAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchSection {
    fn default() -> Self {
        FetchSection {
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecurrenceSection {
    /// How long an RRULE without UNTIL or COUNT is assumed to run.
    pub default_span_months: u32,
}

impl Default for RecurrenceSection {
    fn default() -> Self {
        RecurrenceSection {
            default_span_months: DEFAULT_RECURRENCE_SPAN_MONTHS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default `tracing` filter when RUST_LOG is unset.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            level: "info".to_string(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            store_timezone: default_store_timezone(),
            default_duration_minutes: default_duration_minutes(),
            calendar: CalendarSection::default(),
            fetch: FetchSection::default(),
            recurrence: RecurrenceSection::default(),
            logging: LoggingSection::default(),
            sources: Vec::new(),
        }
    }
}

impl FeedConfig {
    pub fn config_path() -> CalFeedResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalFeedError::Config("Could not determine config directory".into()))?
            .join("calfeed");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> CalFeedResult<Self> {
        Self::load_with_env(path, None)
    }

    /// [`FeedConfig::load`], reading overrides from `env` instead of the
    /// process environment when given.
    fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> CalFeedResult<Self> {
        let file = match path {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::from(Self::config_path()?).required(false),
        };

        let config: FeedConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("CALFEED")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(|e| CalFeedError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalFeedError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CalFeedResult<()> {
        self.store_tz()?;

        if self.default_duration_minutes <= 0 {
            return Err(CalFeedError::Config(format!(
                "default_duration_minutes must be positive, got {}",
                self.default_duration_minutes
            )));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(CalFeedError::Config("fetch.timeout_secs must be positive".into()));
        }
        if self.calendar.domain.trim().is_empty() {
            return Err(CalFeedError::Config("calendar.domain must not be empty".into()));
        }

        Ok(())
    }

    pub fn store_tz(&self) -> CalFeedResult<Tz> {
        resolve_timezone(&self.store_timezone).ok_or_else(|| {
            CalFeedError::Config(format!("Unknown store_timezone '{}'", self.store_timezone))
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn recurrence_span(&self) -> Months {
        Months::new(self.recurrence.default_span_months)
    }

    pub fn metadata(&self) -> CalendarMetadata {
        CalendarMetadata {
            product_id: self.calendar.product_id.clone(),
            domain: self.calendar.domain.clone(),
            name: self
                .calendar
                .name
                .clone()
                .filter(|name| !name.trim().is_empty()),
            default_duration: chrono::Duration::minutes(self.default_duration_minutes),
        }
    }

    /// Parse options anchored at `now`.
    pub fn parse_options(&self, now: chrono::DateTime<chrono::Utc>) -> ParseOptions {
        ParseOptions {
            now,
            recurrence_span: self.recurrence_span(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = FeedConfig::default();

        assert_eq!(config.store_tz().unwrap(), chrono_tz::America::Los_Angeles);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.recurrence_span(), Months::new(12));
        assert_eq!(config.metadata().default_duration, chrono::Duration::minutes(60));
        assert_eq!(config.calendar.filename, "calendar.ics");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let file = config_file(
            r#"
store_timezone = "Europe/Berlin"

[calendar]
name = "Campus Events"
domain = "events.example.edu"

[fetch]
timeout_secs = 3

[[sources]]
name = "Music"
url = "webcal://example.edu/music.ics"
"#,
        );

        let config = FeedConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.store_tz().unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(3));
        assert_eq!(config.metadata().name.as_deref(), Some("Campus Events"));
        assert_eq!(config.metadata().domain, "events.example.edu");
        assert_eq!(config.metadata().product_id, DEFAULT_PRODUCT_ID);
        assert_eq!(config.sources, vec![ExternalSource::new("Music", "webcal://example.edu/music.ics")]);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = config_file("store_timezone = \"Europe/Berlin\"\n\n[fetch]\ntimeout_secs = 3\n");
        let env = Map::from([
            ("CALFEED__FETCH__TIMEOUT_SECS".to_string(), "7".to_string()),
            ("CALFEED__CALENDAR__NAME".to_string(), "Night Owls".to_string()),
            ("UNRELATED__FETCH__TIMEOUT_SECS".to_string(), "99".to_string()),
        ]);

        let config = FeedConfig::load_with_env(Some(file.path()), Some(env)).unwrap();

        assert_eq!(config.fetch_timeout(), Duration::from_secs(7));
        assert_eq!(config.metadata().name.as_deref(), Some("Night Owls"));
        assert_eq!(config.store_tz().unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_unknown_store_timezone_is_rejected() {
        let file = config_file("store_timezone = \"Mars/Olympus_Mons\"\n");

        let err = FeedConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, CalFeedError::Config(ref msg) if msg.contains("Mars/Olympus_Mons")));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(matches!(
            FeedConfig::load(Some(&path)),
            Err(CalFeedError::Config(_))
        ));
    }

    #[test]
    fn test_non_positive_duration_is_rejected() {
        let config = FeedConfig {
            default_duration_minutes: 0,
            ..FeedConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
