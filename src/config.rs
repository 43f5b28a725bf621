//! Configuration loader: .env file, config.toml, then MENUS_* environment overrides.

use common::{Error, ServiceConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn validate_config(config: &ServiceConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.halls.is_empty() {
        issues.push("halls must contain at least one hall".into());
    }
    let mut codes = HashSet::new();
    for hall in &config.halls {
        if hall.code.trim().is_empty() {
            issues.push(format!("hall {:?} has an empty code", hall.name));
        } else if !codes.insert(hall.code.as_str()) {
            issues.push(format!("hall code {:?} is listed twice", hall.code));
        }
        if hall.name.trim().is_empty() {
            issues.push(format!("hall {:?} has an empty name", hall.code));
        }
    }

    if url::Url::parse(&config.upstream.base_url).is_err() {
        issues.push(format!(
            "upstream.base_url {:?} is not a valid URL",
            config.upstream.base_url
        ));
    }
    if config.upstream.timeout_secs == 0 {
        issues.push("upstream.timeout_secs must be > 0".into());
    }
    if config.upstream.requests_per_second == 0 {
        issues.push("upstream.requests_per_second must be > 0".into());
    }

    if config.crawl.lookahead_days == 0 {
        issues.push("crawl.lookahead_days must be > 0".into());
    }
    if config.crawl.concurrency == 0 {
        issues.push("crawl.concurrency must be > 0".into());
    }
    if let Err(e) = config.crawl.tz() {
        issues.push(e.to_string());
    }

    if config.cache.max_age_secs == 0 {
        issues.push("cache.max_age_secs must be > 0".into());
    }
    if config.cache.path.as_os_str().is_empty() {
        issues.push("cache.path must not be empty".into());
    }

    if config.archive.replay && config.archive.dir.is_none() {
        issues.push("archive.replay=true requires archive.dir".into());
    }

    if config.http.bind.parse::<std::net::SocketAddr>().is_err() {
        issues.push(format!("http.bind {:?} is not a socket address", config.http.bind));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply `MENUS_*` overrides read through `var`.
fn apply_overrides(
    config: &mut ServiceConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(path) = var("MENUS_CACHE_PATH") {
        config.cache.path = PathBuf::from(path.trim());
    }
    if let Some(raw) = var("MENUS_CACHE_MAX_AGE_SECS") {
        config.cache.max_age_secs = parse_positive_u64(&raw, "MENUS_CACHE_MAX_AGE_SECS")?;
    }
    if let Some(raw) = var("MENUS_LOOKAHEAD_DAYS") {
        let days = parse_positive_u64(&raw, "MENUS_LOOKAHEAD_DAYS")?;
        config.crawl.lookahead_days = u32::try_from(days)
            .map_err(|_| Error::Config("MENUS_LOOKAHEAD_DAYS is out of range".into()))?;
    }
    if let Some(tz) = var("MENUS_TIMEZONE") {
        config.crawl.timezone = tz.trim().to_string();
    }
    if let Some(bind) = var("MENUS_BIND") {
        config.http.bind = bind.trim().to_string();
    }
    if let Some(dir) = var("MENUS_ARCHIVE_DIR") {
        let trimmed = dir.trim();
        config.archive.dir = if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        };
    }
    if let Some(raw) = var("MENUS_REPLAY") {
        config.archive.replay = parse_bool(&raw);
    }
    if let Some(url) = var("MENUS_UPSTREAM_URL") {
        config.upstream.base_url = url.trim().to_string();
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<ServiceConfig, Error> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load service configuration.
///
/// An explicit `path` must exist; without one, `config.toml` in the working
/// directory is used when present.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Defaults, or the config file.
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => {
            let default_path = Path::new("config.toml");
            if default_path.exists() {
                read_config_file(default_path)?
            } else {
                ServiceConfig::default()
            }
        }
    };

    // 3. Environment variables (highest priority).
    apply_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    Ok(config)
}
