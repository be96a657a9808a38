/// Dashboard configuration loader - parses floodview.toml
///
/// Separates deployment settings (backend URL, timeouts, default alert
/// threshold, where the session file lives) from code so they can change
/// without recompiling. Every field has a default, so a missing file or a
/// partial file is fine; a malformed one is an error.
///
/// Environment variables (also read from `.env`) override the file:
/// - `FLOODVIEW_API_URL`
/// - `FLOODVIEW_TIMEOUT_SECS`
/// - `FLOODVIEW_SESSION_FILE`

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "floodview.toml";

/// Accepted refresh intervals in minutes (one minute to one day).
pub const REFRESH_INTERVAL_MINUTES: std::ops::RangeInclusive<u64> = 1..=1440;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub defaults: DefaultsConfig,
    pub refresh: RefreshConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Where the auth token and theme mode are persisted
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub file: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from(".floodview_session.json"),
        }
    }
}

/// Page defaults
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Alert threshold used when none is given (0-1)
    pub alert_threshold: f64,
    /// Days in a risk trend (1-30)
    pub trend_days: u32,
    /// Days of historical data when no date range is given
    pub history_days: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 0.7,
            trend_days: 7,
            history_days: 30,
        }
    }
}

/// Watch-mode settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_minutes: u64,
    /// Worker threads used for concurrent fetches
    pub workers: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            workers: 4,
        }
    }
}

impl DashboardConfig {
    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "api.base_url must start with http:// or https://, got '{}'",
                self.api.base_url
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.defaults.alert_threshold) {
            return Err(ConfigError::Invalid(format!(
                "defaults.alert_threshold must be within [0, 1], got {}",
                self.defaults.alert_threshold
            )));
        }
        if !(1..=30).contains(&self.defaults.trend_days) {
            return Err(ConfigError::Invalid(format!(
                "defaults.trend_days must be within 1-30, got {}",
                self.defaults.trend_days
            )));
        }
        if !REFRESH_INTERVAL_MINUTES.contains(&self.refresh.interval_minutes) {
            return Err(ConfigError::Invalid(format!(
                "refresh.interval_minutes must be within 1-1440, got {}",
                self.refresh.interval_minutes
            )));
        }
        if self.refresh.workers == 0 {
            return Err(ConfigError::Invalid("refresh.workers must be positive".into()));
        }
        Ok(())
    }

    /// Applies `FLOODVIEW_*` overrides from `lookup` (normally the process
    /// environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FLOODVIEW_API_URL") {
            self.api.base_url = url;
        }
        if let Some(secs) = lookup("FLOODVIEW_TIMEOUT_SECS") {
            self.api.timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("FLOODVIEW_TIMEOUT_SECS is not a number: '{}'", secs))
            })?;
        }
        if let Some(file) = lookup("FLOODVIEW_SESSION_FILE") {
            self.session.file = PathBuf::from(file);
        }
        Ok(())
    }
}

/// Loads configuration from `path`. A missing file yields defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DashboardConfig, ConfigError> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("{} not found, using default configuration", path.display());
            return Ok(DashboardConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads `.env`, the config file, then environment overrides, and
/// validates the result.
pub fn load_from_env<P: AsRef<Path>>(path: P) -> Result<DashboardConfig, ConfigError> {
    dotenv::dotenv().ok();
    let mut config = load_config(path)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.toml")).expect("missing file is fine");
        assert_eq!(config, DashboardConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
            [api]
            base_url = "https://floods.example.org/api"

            [defaults]
            alert_threshold = 0.5
            "#,
        );
        let config = load_config(file.path()).expect("should parse");
        assert_eq!(config.api.base_url, "https://floods.example.org/api");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.defaults.alert_threshold, 0.5);
        assert_eq!(config.defaults.trend_days, 7);
        assert_eq!(config.refresh.interval_minutes, 15);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let file = write_config("[api\nbase_url = ");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("FLOODVIEW_API_URL", "http://10.0.0.5:9000"),
            ("FLOODVIEW_TIMEOUT_SECS", "5"),
            ("FLOODVIEW_SESSION_FILE", "/tmp/fv.json"),
        ]
        .into_iter()
        .collect();

        let mut config = DashboardConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .expect("overrides should apply");
        assert_eq!(config.api.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.session.file, PathBuf::from("/tmp/fv.json"));
    }

    #[test]
    fn test_bad_timeout_override_is_invalid() {
        let mut config = DashboardConfig::default();
        let result = config.apply_overrides(|k| {
            (k == "FLOODVIEW_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = DashboardConfig::default();
        config.defaults.alert_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.defaults.trend_days = 31;
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.api.base_url = "ftp://nope".to_string();
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.api.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_refresh_interval() {
        let mut config = DashboardConfig::default();
        config.refresh.interval_minutes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.refresh.interval_minutes = 1 << 60;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.refresh.interval_minutes = 1441;
        assert!(config.validate().is_err());

        for minutes in [1, 15, 1440] {
            config.refresh.interval_minutes = minutes;
            assert!(config.validate().is_ok(), "{} minutes should be accepted", minutes);
        }
    }
}
