//! Nutrition site client.
//!
//! Fetches the per-hall, per-day short-menu page and turns it into
//! structured meals via [`parser`].

pub mod archive;
pub mod parser;
pub mod rate_limit;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::config::{ArchiveConfig, HallConfig, UpstreamConfig};
use common::Error;
use reqwest::header::COOKIE;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

pub use archive::RawArchive;
pub use parser::{parse_document, ParsedMenu};
pub use rate_limit::RateLimiter;

/// The site serves cart-dependent variants of the page unless these are
/// present and empty.
pub const EMPTY_CART_COOKIES: &str =
    "WebInaCartLocation=; WebInaCartDates=; WebInaCartMeals=; WebInaCartRecipes=; WebInaCartQtys=";

/// Source of raw menu documents for one (hall, date) pair.
#[async_trait]
pub trait HallFetcher: Send + Sync {
    async fn fetch_document(&self, hall: &HallConfig, date: NaiveDate) -> Result<String, Error>;
}

/// HTTP client for the short-menu endpoint.
#[derive(Debug, Clone)]
pub struct NutritionClient {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
    retry_backoff: Duration,
    limiter: RateLimiter,
    archive: Option<RawArchive>,
    replay: bool,
}

impl NutritionClient {
    pub fn new(upstream: &UpstreamConfig, archive: &ArchiveConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&upstream.base_url).map_err(|e| {
            Error::Config(format!("invalid upstream url {:?}: {}", upstream.base_url, e))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(upstream.user_agent.as_str())
            .pool_max_idle_per_host(4)
            .timeout(upstream.timeout())
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            max_retries: upstream.max_retries,
            retry_backoff: Duration::from_millis(upstream.retry_backoff_ms),
            limiter: RateLimiter::per_second(upstream.requests_per_second),
            archive: archive.dir.clone().map(RawArchive::new),
            replay: archive.replay,
        })
    }

    /// `?naFlag=1&locationNum=<code>&dtdate=<MM%2FDD%2FYYYY>`
    pub fn menu_url(&self, hall_code: &str, date: NaiveDate) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("naFlag", "1")
            .append_pair("locationNum", hall_code)
            .append_pair("dtdate", &date.format("%m/%d/%Y").to_string());
        url
    }

    async fn get_once(&self, hall: &HallConfig, date: NaiveDate, url: &Url) -> Result<Vec<u8>, Error> {
        self.limiter.wait().await;

        let resp = self
            .client
            .get(url.clone())
            .header(COOKIE, EMPTY_CART_COOKIES)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Http(format!("timed out fetching {} on {}", hall.name, date))
                } else {
                    Error::Http(format!("HTTP error for {} on {}: {}", hall.name, date, e))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                hall: hall.name.clone(),
                date: date.to_string(),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("body read failed for {} on {}: {}", hall.name, date, e)))?;

        Ok(bytes.to_vec())
    }

    async fn get_with_retries(&self, hall: &HallConfig, date: NaiveDate) -> Result<Vec<u8>, Error> {
        let url = self.menu_url(&hall.code, date);
        debug!("Fetching menu: {}", url);

        let mut attempt: u32 = 0;
        loop {
            match self.get_once(hall, date, &url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(
                        "Attempt {}/{} for {} on {} failed: {}",
                        attempt,
                        self.max_retries + 1,
                        hall.name,
                        date,
                        e
                    );
                    sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl HallFetcher for NutritionClient {
    async fn fetch_document(&self, hall: &HallConfig, date: NaiveDate) -> Result<String, Error> {
        if self.replay {
            if let Some(archive) = &self.archive {
                if let Some(bytes) = archive.load(date, &hall.code).await {
                    return Ok(String::from_utf8_lossy(&bytes).into_owned());
                }
            }
        }

        let bytes = self.get_with_retries(hall, date).await?;

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.store(date, &hall.code, &bytes).await {
                warn!("Failed to archive {} on {}: {}", hall.name, date, e);
            }
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
