//! Durable menu snapshot.
//!
//! One JSON file on disk mirrors an in-memory `Arc<MenuCache>`. Readers clone
//! the `Arc` under a short read lock; a replace writes `<file>.tmp`, syncs it,
//! renames it over the target and then swaps the `Arc`. Readers therefore see
//! either the old mapping or the new one, never a mix.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use common::{Error, MenuCache};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    current: RwLock<Arc<MenuCache>>,
}

impl CacheStore {
    /// Load the snapshot at `path`, falling back to an empty cache.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = Self::load(&path).await;
        Self {
            path,
            current: RwLock::new(Arc::new(cache)),
        }
    }

    /// Missing or corrupt files load as an empty cache.
    pub async fn load(path: &Path) -> MenuCache {
        let bytes = match fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No menu cache at {}, starting empty", path.display());
                return MenuCache::default();
            }
            Err(e) => {
                warn!("Failed to read menu cache {}: {}", path.display(), e);
                return MenuCache::default();
            }
        };

        match serde_json::from_slice::<MenuCache>(&bytes) {
            Ok(cache) => {
                info!(
                    "Loaded menu cache from {} ({} dates)",
                    path.display(),
                    cache.dates.len()
                );
                cache
            }
            Err(e) => {
                warn!("Menu cache {} is corrupt, starting empty: {}", path.display(), e);
                MenuCache::default()
            }
        }
    }

    /// Current snapshot. Never waits on a crawl.
    pub fn read(&self) -> Arc<MenuCache> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish a new snapshot.
    ///
    /// The in-memory swap happens even when writing the file fails; the error
    /// is returned so the caller can report it.
    pub async fn replace(&self, cache: MenuCache) -> Result<Arc<MenuCache>, Error> {
        let persisted = persist(&self.path, &cache).await;

        let cache = Arc::new(cache);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&cache);

        persisted.map(|_| cache)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn persist(path: &Path, cache: &MenuCache) -> Result<(), Error> {
    let bytes = serde_json::to_vec(cache)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp = tmp_path(path);
    if let Err(e) = write_then_rename(&tmp, path, &bytes).await {
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            if cleanup.kind() != ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", tmp.display(), cleanup);
            }
        }
        return Err(e.into());
    }

    debug!("Persisted menu cache to {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp, path).await
}
