//! Service configuration types.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Dining halls to crawl, in display order.
    #[serde(default = "default_halls")]
    pub halls: Vec<HallConfig>,

    /// Upstream nutrition site parameters.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Crawl window and fan-out.
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Snapshot persistence and staleness.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Raw document archive used for inspection and offline replay.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// HTTP listener.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Configuration for a single dining hall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HallConfig {
    /// Upstream location code (e.g., "40").
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Display color used by the rendering layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Link to the hall's operating hours page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Short-menu endpoint; location and date are appended as query parameters.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts after the first failed one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff between attempts, multiplied by the attempt number.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Global request pacing towards the upstream site.
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Number of calendar days to crawl, starting today.
    #[serde(default = "default_lookahead")]
    pub lookahead_days: u32,

    /// IANA time zone that defines "today" (e.g., "US/Pacific").
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Max (hall, date) fetches in flight during one crawl.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Snapshot file location.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Age after which a read triggers a background refresh (seconds).
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// When set, every fetched document is written here.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Serve documents from `dir` instead of the network when present.
    /// Offline development only.
    #[serde(default)]
    pub replay: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl CrawlConfig {
    /// Parse the configured time zone.
    pub fn tz(&self) -> Result<Tz, Error> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| Error::Config(format!("unknown time zone {:?}: {}", self.timezone, e)))
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://nutrition.sa.ucsc.edu/shortmenu.aspx".into()
}
fn default_timeout() -> u64 {
    20
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    500
}
fn default_rps() -> u32 {
    8
}
fn default_user_agent() -> String {
    "menu-server/0.1".into()
}

fn default_lookahead() -> u32 {
    8
}
fn default_timezone() -> String {
    "US/Pacific".into()
}
fn default_concurrency() -> usize {
    4
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data").join("menu-cache.json")
}
fn default_max_age() -> u64 {
    900
}

fn default_bind() -> String {
    "0.0.0.0:8080".into()
}

fn hall(code: &str, name: &str, color: &str) -> HallConfig {
    HallConfig {
        code: code.into(),
        name: name.into(),
        color: Some(color.into()),
        hours_url: Some("https://dining.ucsc.edu/eat/#hours".into()),
    }
}

fn default_halls() -> Vec<HallConfig> {
    vec![
        hall("40", "JRLC/College 9", "#2e7d32"),
        hall("25", "Porter/Kresge", "#c62828"),
        hall("05", "Cowell/Stevenson", "#1565c0"),
        hall("20", "Crown/Merrill", "#f9a825"),
        hall("30", "Rachel Carson/Oakes", "#6a1b9a"),
    ]
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            requests_per_second: default_rps(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            lookahead_days: default_lookahead(),
            timezone: default_timezone(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            max_age_secs: default_max_age(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            halls: default_halls(),
            upstream: UpstreamConfig::default(),
            crawl: CrawlConfig::default(),
            cache: CacheConfig::default(),
            archive: ArchiveConfig::default(),
            http: HttpConfig::default(),
        }
    }
}
