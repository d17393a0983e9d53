//! Remote identification catalogues for content shipped without a manifest

mod wire;

pub use crate::db::{DirectoryRecord, IdentificationRecord, SizeHashRecord};

use crate::db::{Database, DIRECTORY_CATALOGUE, SIZE_HASH_CATALOGUE};
use crate::games::GameType;
use crate::remote::HttpClient;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lookup of identification records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentificationCatalogue: Send + Sync {
    /// Every record for archives of exactly `size` bytes
    async fn lookup_by_size(&self, size: u64) -> Result<Vec<SizeHashRecord>>;

    /// Record for a DLC folder name (case-insensitive) in one game
    async fn lookup_by_directory(&self, folder: &str, game: GameType) -> Result<Option<DirectoryRecord>>;
}

/// Catalogue downloaded over HTTP and cached in SQLite
pub struct HttpCatalogue {
    http: HttpClient,
    db: Arc<Database>,
    size_hash_url: String,
    directory_url: String,
    ttl: Duration,
    refresh_lock: Mutex<()>,
}

impl HttpCatalogue {
    pub fn new(
        http: HttpClient,
        db: Arc<Database>,
        size_hash_url: impl Into<String>,
        directory_url: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            http,
            db,
            size_hash_url: size_hash_url.into(),
            directory_url: directory_url.into(),
            ttl,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Download both catalogues now, ignoring the cache age
    pub async fn refresh(&self) -> Result<(usize, usize)> {
        let _guard = self.refresh_lock.lock().await;
        let sizes = self.refresh_size_hash().await?;
        let directories = self.refresh_directories().await?;
        Ok((sizes, directories))
    }

    async fn refresh_size_hash(&self) -> Result<usize> {
        let body = self.http.get_text(&self.size_hash_url).await?;
        let records = wire::parse_size_hash_catalogue(&body)?;
        let count = self.db.replace_size_hash_records(&records)?;
        self.db.mark_catalogue_fetched(SIZE_HASH_CATALOGUE, Utc::now())?;
        tracing::info!("Cached {} size/hash identification records", count);
        Ok(count)
    }

    async fn refresh_directories(&self) -> Result<usize> {
        let body = self.http.get_text(&self.directory_url).await?;
        let records = wire::parse_directory_catalogue(&body)?;
        let count = self.db.replace_directory_records(&records)?;
        self.db.mark_catalogue_fetched(DIRECTORY_CATALOGUE, Utc::now())?;
        tracing::info!("Cached {} directory identification records", count);
        Ok(count)
    }

    fn is_stale(&self, name: &str, now: DateTime<Utc>) -> bool {
        match self.db.catalogue_fetched_at(name) {
            Ok(Some(fetched)) => now - fetched > self.ttl,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("Failed to read catalogue sync time: {}", e);
                true
            }
        }
    }

    /// Refresh one catalogue when its cache has expired. A failed download
    /// falls back to whatever is cached.
    async fn ensure_fresh(&self, name: &str) {
        let _guard = self.refresh_lock.lock().await;
        if !self.is_stale(name, Utc::now()) {
            return;
        }

        let result = if name == SIZE_HASH_CATALOGUE {
            self.refresh_size_hash().await
        } else {
            self.refresh_directories().await
        };

        if let Err(e) = result {
            tracing::warn!("Could not refresh {} catalogue, using cached copy: {:#}", name, e);
        }
    }
}

#[async_trait]
impl IdentificationCatalogue for HttpCatalogue {
    async fn lookup_by_size(&self, size: u64) -> Result<Vec<SizeHashRecord>> {
        self.ensure_fresh(SIZE_HASH_CATALOGUE).await;
        self.db.size_hash_records(size)
    }

    async fn lookup_by_directory(&self, folder: &str, game: GameType) -> Result<Option<DirectoryRecord>> {
        self.ensure_fresh(DIRECTORY_CATALOGUE).await;
        self.db.directory_record(folder, game.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn catalogue(db: Arc<Database>) -> HttpCatalogue {
        let http = HttpClient::new(StdDuration::from_secs(1)).unwrap();
        // Unroutable endpoints: every refresh attempt fails
        HttpCatalogue::new(
            http,
            db,
            "http://127.0.0.1:9/size",
            "http://127.0.0.1:9/dirs",
            Duration::hours(24),
        )
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_download() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.replace_size_hash_records(&[SizeHashRecord {
            size: 10,
            md5: "abc".to_string(),
            game: None,
            name: Some("Cached".to_string()),
            version: None,
            transform: None,
            custom_manifest: None,
        }])
        .unwrap();
        db.mark_catalogue_fetched(SIZE_HASH_CATALOGUE, Utc::now()).unwrap();

        let catalogue = catalogue(db);
        let records = catalogue.lookup_by_size(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("Cached"));
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_cache() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let catalogue = catalogue(db);

        assert!(catalogue.lookup_by_size(10).await.unwrap().is_empty());
        assert!(catalogue
            .lookup_by_directory("DLC_MOD_Bar", GameType::ME3)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_staleness() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = Utc::now();
        db.mark_catalogue_fetched(DIRECTORY_CATALOGUE, now - Duration::hours(25)).unwrap();
        db.mark_catalogue_fetched(SIZE_HASH_CATALOGUE, now - Duration::hours(1)).unwrap();

        let catalogue = catalogue(db);
        assert!(catalogue.is_stale(DIRECTORY_CATALOGUE, now));
        assert!(!catalogue.is_stale(SIZE_HASH_CATALOGUE, now));
    }
}
