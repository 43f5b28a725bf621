//! On-disk archive of raw menu documents.
//!
//! Every fetched page can be kept under a deterministic name per
//! (date, hall code) for inspection, and replayed later instead of hitting
//! the network. Replay is an offline development aid; production crawls
//! leave it off.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::NaiveDate;
use common::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RawArchive {
    dir: PathBuf,
}

impl RawArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/menu-<YYYY-MM-DD>-<code>.html`
    pub fn path_for(&self, date: NaiveDate, hall_code: &str) -> PathBuf {
        self.dir
            .join(format!("menu-{}-{}.html", date.format("%Y-%m-%d"), hall_code))
    }

    /// Read a stored document. Missing or unreadable files yield `None`.
    pub async fn load(&self, date: NaiveDate, hall_code: &str) -> Option<Vec<u8>> {
        let path = self.path_for(date, hall_code);
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!("Replaying {}", path.display());
                Some(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read archived document {}: {}", path.display(), e);
                None
            }
        }
    }

    pub async fn store(&self, date: NaiveDate, hall_code: &str, bytes: &[u8]) -> Result<(), Error> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.path_for(date, hall_code), bytes).await?;
        Ok(())
    }
}
