use facegate_core::PollConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Client configuration: defaults, then an optional TOML file, then
/// `FACEGATE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Backend base URL for verify, upload and list.
    pub base_url: String,
    /// Base URL for the pairwise comparison endpoint (default: `base_url`).
    pub compare_base_url: Option<String>,
    /// V4L2 device path.
    pub camera_device: String,
    /// Milliseconds between verification ticks.
    pub poll_period_ms: u64,
    /// No-match verdicts tolerated before a session gives up.
    pub attempt_ceiling: u32,
    /// Milliseconds the success message stays up before reset.
    pub success_reset_delay_ms: u64,
    /// Milliseconds the exhaustion message stays up before reset.
    pub failure_reset_delay_ms: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Frames discarded after opening the camera (auto exposure settling).
    pub warmup_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        let poll = PollConfig::default();
        Self {
            base_url: "http://localhost:5001".to_string(),
            compare_base_url: None,
            camera_device: "/dev/video0".to_string(),
            poll_period_ms: poll.period.as_millis() as u64,
            attempt_ceiling: poll.attempt_ceiling,
            success_reset_delay_ms: poll.success_reset_delay.as_millis() as u64,
            failure_reset_delay_ms: poll.failure_reset_delay.as_millis() as u64,
            request_timeout_secs: 10,
            warmup_frames: 4,
        }
    }
}

impl Config {
    /// Load from `path` (or `FACEGATE_CONFIG` when unset), then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("FACEGATE_CONFIG").map(PathBuf::from));

        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loaded config file");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FACEGATE_*` variables. Unparsable numbers are
    /// ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FACEGATE_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("FACEGATE_COMPARE_BASE_URL") {
            self.compare_base_url = Some(v);
        }
        if let Some(v) = lookup("FACEGATE_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        env_parse(&lookup, "FACEGATE_POLL_PERIOD_MS", &mut self.poll_period_ms);
        env_parse(&lookup, "FACEGATE_ATTEMPT_CEILING", &mut self.attempt_ceiling);
        env_parse(
            &lookup,
            "FACEGATE_SUCCESS_RESET_DELAY_MS",
            &mut self.success_reset_delay_ms,
        );
        env_parse(
            &lookup,
            "FACEGATE_FAILURE_RESET_DELAY_MS",
            &mut self.failure_reset_delay_ms,
        );
        env_parse(
            &lookup,
            "FACEGATE_REQUEST_TIMEOUT_SECS",
            &mut self.request_timeout_secs,
        );
        env_parse(&lookup, "FACEGATE_WARMUP_FRAMES", &mut self.warmup_frames);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_period_ms == 0 {
            return Err(ConfigError::Invalid("poll_period_ms must be positive".into()));
        }
        if self.attempt_ceiling == 0 {
            return Err(ConfigError::Invalid("attempt_ceiling must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".into(),
            ));
        }
        check_url("base_url", &self.base_url)?;
        if let Some(url) = &self.compare_base_url {
            check_url("compare_base_url", url)?;
        }
        Ok(())
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            period: Duration::from_millis(self.poll_period_ms),
            attempt_ceiling: self.attempt_ceiling,
            success_reset_delay: Duration::from_millis(self.success_reset_delay_ms),
            failure_reset_delay: Duration::from_millis(self.failure_reset_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_parse<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}

fn check_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        Some(host) if !host.trim_matches('/').is_empty() => Ok(()),
        _ => Err(ConfigError::Invalid(format!(
            "{field} must be an http(s) URL, got {url:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_poll_defaults() {
        let config = Config::default();
        assert_eq!(config.poll_config(), PollConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = Config::from_toml_str(
            r#"
            base_url = "https://faces.example.com"
            compare_base_url = "http://127.0.0.1:5000"
            poll_period_ms = 1500
            attempt_ceiling = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://faces.example.com");
        assert_eq!(config.compare_base_url.as_deref(), Some("http://127.0.0.1:5000"));
        assert_eq!(config.poll_config().period, Duration::from_millis(1500));
        assert_eq!(config.attempt_ceiling, 6);
        assert_eq!(config.camera_device, "/dev/video0");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::from_toml_str("poll_interval = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_toml_str("attempt_ceiling = 6").unwrap();
        config.apply_env(env(&[
            ("FACEGATE_ATTEMPT_CEILING", "2"),
            ("FACEGATE_CAMERA_DEVICE", "/dev/video2"),
            ("FACEGATE_POLL_PERIOD_MS", "not-a-number"),
        ]));

        assert_eq!(config.attempt_ceiling, 2);
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.poll_period_ms, 2000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_period = Config {
            poll_period_ms: 0,
            ..Config::default()
        };
        assert!(zero_period.validate().is_err());

        let zero_ceiling = Config {
            attempt_ceiling: 0,
            ..Config::default()
        };
        assert!(zero_ceiling.validate().is_err());

        let bad_url = Config {
            base_url: "localhost:5001".into(),
            ..Config::default()
        };
        assert!(bad_url.validate().is_err());

        let bad_compare = Config {
            compare_base_url: Some("ftp://host".into()),
            ..Config::default()
        };
        assert!(bad_compare.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/facegate.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
