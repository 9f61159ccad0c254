//! Configuration types for manga-dl
//!
//! All settings have sensible defaults; an empty TOML file (or
//! `Config::default()`) yields a working configuration. The core validates the
//! configuration once before any work starts — a misconfiguration is the only
//! error that is fatal to a whole run.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::OutputFormat;

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download directory and concurrency settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// HTTP client settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Retry behavior for transient page-fetch failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-host request rate and in-flight limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Output format and post-packaging behavior
    #[serde(default)]
    pub output: OutputConfig,

    /// Chapter filtering applied before chapters reach the pipeline
    #[serde(default)]
    pub filters: FilterConfig,
}

/// Download directory and worker-pool settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Base download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum chapters downloading concurrently (default: 3)
    #[serde(default = "default_chapter_workers")]
    pub max_chapter_workers: usize,

    /// Maximum concurrent page fetches within one chapter (default: 10)
    #[serde(default = "default_page_workers")]
    pub max_page_workers: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_chapter_workers: default_chapter_workers(),
            max_page_workers: default_page_workers(),
        }
    }
}

/// HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial try (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Per-host rate limiting.
///
/// Both limits apply simultaneously and independently per remote host:
/// a token-bucket request-rate cap and a max-in-flight cap. Saturating one
/// host never stalls fetches to a different host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per second per host (0.0 = unlimited, default: 2.0)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Maximum in-flight requests per host (default: 4)
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Output format and post-packaging behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Artifact format (default: cbz)
    #[serde(default)]
    pub format: OutputFormat,

    /// Delete per-page files after successful packaging (default: true).
    ///
    /// Ignored for the flat `images` format, whose pages are the artifact.
    /// On packaging failure the page files are always retained so a retry can
    /// resume without re-fetching.
    #[serde(default = "default_true")]
    pub delete_pages_after: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            delete_pages_after: true,
        }
    }
}

/// Chapter filtering preferences, applied before chapters reach the pipeline
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Only keep chapters in this language (None = any)
    #[serde(default)]
    pub preferred_language: Option<String>,

    /// Prefer this scanlation group when a chapter exists in several versions
    /// (None = any)
    #[serde(default)]
    pub preferred_scanlator: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|e| Error::Config {
            message: format!("failed to parse config file '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Called by [`crate::MangaDownloader::new`] before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.download.download_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "download directory must not be empty".to_string(),
                key: Some("download.download_dir".to_string()),
            });
        }
        if self.download.max_chapter_workers == 0 {
            return Err(Error::Config {
                message: "chapter concurrency must be positive".to_string(),
                key: Some("download.max_chapter_workers".to_string()),
            });
        }
        if self.download.max_page_workers == 0 {
            return Err(Error::Config {
                message: "page concurrency must be positive".to_string(),
                key: Some("download.max_page_workers".to_string()),
            });
        }
        if self.rate_limit.max_in_flight == 0 {
            return Err(Error::Config {
                message: "per-host in-flight limit must be positive".to_string(),
                key: Some("rate_limit.max_in_flight".to_string()),
            });
        }
        if self.rate_limit.requests_per_second < 0.0 {
            return Err(Error::Config {
                message: "requests per second must not be negative".to_string(),
                key: Some("rate_limit.requests_per_second".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff multiplier must be at least 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.network.timeout.is_zero() {
            return Err(Error::Config {
                message: "network timeout must be positive".to_string(),
                key: Some("network.timeout".to_string()),
            });
        }
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_chapter_workers() -> usize {
    3
}

fn default_page_workers() -> usize {
    10
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
        .to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_requests_per_second() -> f64 {
    2.0
}

fn default_max_in_flight() -> usize {
    4
}

fn default_true() -> bool {
    true
}

/// Serialize Durations as fractional seconds for readable config files
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(
                "duration must be a non-negative number of seconds",
            ));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.download.max_chapter_workers, 3);
        assert_eq!(config.download.max_page_workers, 10);
        assert_eq!(config.output.format, OutputFormat::Cbz);
        assert!(config.output.delete_pages_after);
    }

    #[test]
    fn zero_chapter_workers_is_rejected() {
        let mut config = Config::default();
        config.download.max_chapter_workers = 0;
        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => {
                assert_eq!(key.as_deref(), Some("download.max_chapter_workers"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_page_workers_is_rejected() {
        let mut config = Config::default();
        config.download.max_page_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_download_dir_is_rejected() {
        let mut config = Config::default();
        config.download.download_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_in_flight_is_rejected() {
        let mut config = Config::default();
        config.rate_limit.max_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_rate_is_rejected() {
        let mut config = Config::default();
        config.rate_limit.requests_per_second = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sub_unity_backoff_multiplier_is_rejected() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.download.max_chapter_workers, 3);
        assert_eq!(config.network.timeout, Duration::from_secs(30));
        assert!(config.filters.preferred_language.is_none());
    }

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let toml_src = r#"
            [download]
            max_chapter_workers = 5

            [output]
            format = "pdf"
            delete_pages_after = false

            [retry]
            initial_delay = 0.5

            [filters]
            preferred_language = "en"
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.download.max_chapter_workers, 5);
        assert_eq!(config.download.max_page_workers, 10, "untouched default");
        assert_eq!(config.output.format, OutputFormat::Pdf);
        assert!(!config.output.delete_pages_after);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.filters.preferred_language.as_deref(), Some("en"));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(
            parsed.download.download_dir,
            config.download.download_dir
        );
        assert_eq!(parsed.retry.max_attempts, config.retry.max_attempts);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let toml_src = r#"
            [network]
            timeout = -3.0
        "#;
        assert!(toml::from_str::<Config>(toml_src).is_err());
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
