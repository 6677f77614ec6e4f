//! Fetch-through media cache.
//!
//! A post's video is looked up in object storage under a deterministic key.
//! On a miss it is resolved through a browser session, downloaded with the
//! session's cookies, and uploaded so the next ingestion is a hit. Either
//! way the caller gets the durable reference and a local working copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tapestry_media::{
    download_client, download_media, remove_file_if_exists, BrowserLauncher, BrowserSession,
};
use tapestry_storage::{video_object_key, ObjectStore, StorageError, VIDEO_CONTENT_TYPE};
use tracing::{debug, info, warn};

use crate::error::{AcquisitionError, WorkerResult};
use crate::metrics;
use crate::retry::{retry_async, RetryConfig};

/// Acquisition settings.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Bounds of the pause after each live download
    pub delay_min_secs: u64,
    pub delay_max_secs: u64,
    pub download_timeout_secs: u64,
    pub storage_retry: RetryConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            delay_min_secs: 5,
            delay_max_secs: 15,
            download_timeout_secs: 300,
            storage_retry: RetryConfig::new("object_store"),
        }
    }
}

impl AcquisitionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            delay_min_secs: std::env::var("ACQUISITION_DELAY_MIN_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.delay_min_secs),
            delay_max_secs: std::env::var("ACQUISITION_DELAY_MAX_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.delay_max_secs),
            download_timeout_secs: std::env::var("ACQUISITION_DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.download_timeout_secs),
            storage_retry: defaults.storage_retry,
        }
    }

    /// No pause between live downloads.
    pub fn without_delay(mut self) -> Self {
        self.delay_min_secs = 0;
        self.delay_max_secs = 0;
        self
    }

    pub fn with_storage_retry(mut self, retry: RetryConfig) -> Self {
        self.storage_retry = retry;
        self
    }

    fn pause(&self) -> Duration {
        let (low, high) = if self.delay_min_secs <= self.delay_max_secs {
            (self.delay_min_secs, self.delay_max_secs)
        } else {
            (self.delay_max_secs, self.delay_min_secs)
        };
        Duration::from_secs(rand::rng().random_range(low..=high))
    }
}

/// Media acquired for one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredMedia {
    /// Durable storage reference
    pub video_link: String,
    /// Local working copy
    pub local_path: PathBuf,
    pub cache_hit: bool,
}

/// Shared acquisition dependencies.
pub struct AcquisitionCache {
    store: Arc<dyn ObjectStore>,
    launcher: Arc<dyn BrowserLauncher>,
    http: reqwest::Client,
    config: AcquisitionConfig,
}

impl AcquisitionCache {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        launcher: Arc<dyn BrowserLauncher>,
        config: AcquisitionConfig,
    ) -> WorkerResult<Self> {
        let http = download_client(config.download_timeout_secs)?;
        Ok(Self {
            store,
            launcher,
            http,
            config,
        })
    }

    /// Start a session. The browser opens on the first cache miss.
    pub fn session(&self) -> AcquisitionSession<'_> {
        AcquisitionSession {
            cache: self,
            browser: None,
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, AcquisitionError> {
        retry_async(
            &self.config.storage_retry.named("object_exists"),
            StorageError::is_retryable,
            || self.store.exists(key),
        )
        .await
        .map_failure(|source, attempts| AcquisitionError::RetriesExhausted { attempts, source })
    }

    async fn download(&self, key: &str, path: &Path) -> Result<(), AcquisitionError> {
        retry_async(
            &self.config.storage_retry.named("object_download"),
            StorageError::is_retryable,
            || self.store.download_file(key, path),
        )
        .await
        .map_failure(|source, attempts| AcquisitionError::RetriesExhausted { attempts, source })
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<String, AcquisitionError> {
        retry_async(
            &self.config.storage_retry.named("object_upload"),
            StorageError::is_retryable,
            || self.store.upload_file(path, key, VIDEO_CONTENT_TYPE),
        )
        .await
        .map_failure(|source, attempts| AcquisitionError::RetriesExhausted { attempts, source })
    }
}

/// One batch's use of the cache.
///
/// Holds at most one browser session, used by one download at a time.
/// [`close`](Self::close) should be awaited when the batch's acquisition
/// ends. A session dropped without it (a cancelled request) closes its
/// browser on a background task.
pub struct AcquisitionSession<'a> {
    cache: &'a AcquisitionCache,
    browser: Option<Box<dyn BrowserSession>>,
}

impl AcquisitionSession<'_> {
    /// Acquire the video of `post_id` into `dir`.
    pub async fn acquire(
        &mut self,
        post_id: &str,
        page_url: &str,
        dir: &Path,
    ) -> Result<AcquiredMedia, AcquisitionError> {
        let key = video_object_key(post_id)?;
        let local_path = dir.join(&key);

        if self.cache.exists(&key).await? {
            debug!(post_id, key = %key, "Media cache hit");
            metrics::record_cache_hit();
            self.cache.download(&key, &local_path).await?;
            return Ok(AcquiredMedia {
                video_link: self.cache.store.reference(&key),
                local_path,
                cache_hit: true,
            });
        }

        metrics::record_cache_miss();
        info!(post_id, url = page_url, "Media cache miss, fetching from source");

        let browser = match self.browser.take() {
            Some(browser) => browser,
            None => self.cache.launcher.open().await?,
        };
        let media = self.browser.insert(browser).resolve_media(page_url).await?;
        download_media(&self.cache.http, &media, &local_path).await?;

        let uploaded = self.cache.upload(&local_path, &key).await;

        let pause = self.cache.config.pause();
        if !pause.is_zero() {
            debug!(post_id, "Pausing {:?} after live download", pause);
            tokio::time::sleep(pause).await;
        }

        match uploaded {
            Ok(video_link) => Ok(AcquiredMedia {
                video_link,
                local_path,
                cache_hit: false,
            }),
            Err(e) => {
                remove_file_if_exists(&local_path).await?;
                Err(e)
            }
        }
    }

    /// Close the browser session if one was opened.
    pub async fn close(mut self) {
        if let Some(browser) = self.browser.take() {
            close_browser(browser).await;
        }
    }
}

impl Drop for AcquisitionSession<'_> {
    fn drop(&mut self) {
        let Some(browser) = self.browser.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Acquisition abandoned with an open browser session, closing it in the background");
                handle.spawn(close_browser(browser));
            }
            Err(_) => warn!("Browser session dropped outside a runtime and left open"),
        }
    }
}

async fn close_browser(browser: Box<dyn BrowserSession>) {
    if let Err(e) = browser.close().await {
        warn!("Failed to close browser session: {}", e);
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tapestry_media::{MediaError, MediaResult, ResolvedMedia, SessionCookie};
    use tapestry_storage::{object_reference, StorageResult};

    use super::*;

    /// Object store backed by a map.
    #[derive(Default)]
    pub struct MemoryStore {
        pub objects: Mutex<HashMap<String, Vec<u8>>>,
        pub exists_calls: AtomicUsize,
        pub downloads: AtomicUsize,
        pub fail_uploads: bool,
    }

    impl MemoryStore {
        pub fn with_object(key: &str, bytes: &[u8]) -> Self {
            let store = Self::default();
            store
                .objects
                .lock()
                .unwrap()
                .insert(key.to_string(), bytes.to_vec());
            store
        }

        pub fn keys(&self) -> Vec<String> {
            let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn exists(&self, key: &str) -> StorageResult<bool> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.objects.lock().unwrap().contains_key(key))
        }

        async fn upload_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<String> {
            if self.fail_uploads {
                return Err(StorageError::NotFound("bucket".into()));
            }
            let bytes = tokio::fs::read(path).await?;
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            Ok(self.reference(key))
        }

        async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let bytes = self
                .objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
            tokio::fs::write(path, bytes).await?;
            Ok(())
        }

        fn reference(&self, key: &str) -> String {
            object_reference("test-bucket", key)
        }
    }

    /// Browser whose pages resolve to `{media_base}/media/{last path segment}`.
    pub struct FakeLauncher {
        pub media_base: String,
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
    }

    impl FakeLauncher {
        pub fn new(media_base: impl Into<String>) -> Self {
            Self {
                media_base: media_base.into(),
                opened: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    struct FakeSession {
        media_base: String,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn open(&self) -> MediaResult<Box<dyn BrowserSession>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                media_base: self.media_base.clone(),
                closed: self.closed.clone(),
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn resolve_media(&mut self, page_url: &str) -> MediaResult<ResolvedMedia> {
            let id = page_url
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| MediaError::MissingElement("video".into()))?;
            Ok(ResolvedMedia {
                page_url: page_url.to_string(),
                src_url: format!("{}/media/{}", self.media_base, id),
                cookies: vec![SessionCookie {
                    name: "tt_chain_token".into(),
                    value: "abc".into(),
                }],
            })
        }

        async fn close(self: Box<Self>) -> MediaResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::fakes::{FakeLauncher, MemoryStore};
    use super::*;

    fn config() -> AcquisitionConfig {
        AcquisitionConfig::default()
            .without_delay()
            .with_storage_retry(RetryConfig::new("test").with_base_delay(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_cache_hit_skips_browser() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::with_object("tiktok_42.mp4", b"cached"));
        let launcher = Arc::new(FakeLauncher::new("http://unused"));
        let cache = AcquisitionCache::new(store.clone(), launcher.clone(), config()).unwrap();

        let mut session = cache.session();
        let media = session
            .acquire("42", "https://www.tiktok.com/@a/video/42", dir.path())
            .await
            .unwrap();
        session.close().await;

        assert!(media.cache_hit);
        assert_eq!(media.video_link, "s3://test-bucket/tiktok_42.mp4");
        assert_eq!(std::fs::read(&media.local_path).unwrap(), b"cached");
        assert_eq!(launcher.opened.load(Ordering::SeqCst), 0);
        assert_eq!(launcher.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_downloads_and_uploads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/7"))
            .and(header("cookie", "tt_chain_token=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh video".to_vec()))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let launcher = Arc::new(FakeLauncher::new(server.uri()));
        let cache = AcquisitionCache::new(store.clone(), launcher.clone(), config()).unwrap();

        let mut session = cache.session();
        let first = session
            .acquire("7", "https://www.tiktok.com/@a/video/7", dir.path())
            .await
            .unwrap();
        std::fs::remove_file(&first.local_path).unwrap();
        store.objects.lock().unwrap().clear();
        let second = session
            .acquire("7", "https://www.tiktok.com/@a/video/7", dir.path())
            .await
            .unwrap();
        session.close().await;

        assert!(!first.cache_hit && !second.cache_hit);
        assert_eq!(store.keys(), vec!["tiktok_7.mp4".to_string()]);
        assert_eq!(std::fs::read(&second.local_path).unwrap(), b"fresh video");
        // One session serves every miss in the batch
        assert_eq!(launcher.opened.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_path_like_id_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let launcher = Arc::new(FakeLauncher::new("http://unused"));
        let cache = AcquisitionCache::new(store.clone(), launcher.clone(), config()).unwrap();

        let mut session = cache.session();
        let result = session
            .acquire("../../victim", "https://www.tiktok.com/@a/video/1", dir.path())
            .await;
        session.close().await;

        assert!(matches!(
            result,
            Err(AcquisitionError::Storage(StorageError::InvalidKey(_)))
        ));
        assert_eq!(store.exists_calls.load(Ordering::SeqCst), 0);
        assert_eq!(launcher.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_session_closes_browser() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(FakeLauncher::new(server.uri()));
        let cache = AcquisitionCache::new(
            Arc::new(MemoryStore::default()),
            launcher.clone(),
            config(),
        )
        .unwrap();

        {
            let mut session = cache.session();
            session
                .acquire("3", "https://www.tiktok.com/@a/video/3", dir.path())
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(launcher.opened.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let cache = AcquisitionCache::new(
            store.clone(),
            Arc::new(FakeLauncher::new(server.uri())),
            config(),
        )
        .unwrap();

        let mut session = cache.session();
        let result = session
            .acquire("9", "https://www.tiktok.com/@a/video/9", dir.path())
            .await;
        session.close().await;

        assert!(matches!(result, Err(AcquisitionError::Media(_))));
        assert!(store.keys().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_removes_local_copy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore {
            fail_uploads: true,
            ..MemoryStore::default()
        });
        let cache = AcquisitionCache::new(
            store,
            Arc::new(FakeLauncher::new(server.uri())),
            config(),
        )
        .unwrap();

        let mut session = cache.session();
        let result = session
            .acquire("5", "https://www.tiktok.com/@a/video/5", dir.path())
            .await;
        session.close().await;

        assert!(matches!(
            result,
            Err(AcquisitionError::RetriesExhausted { attempts: 1, .. })
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_pause_within_bounds() {
        let config = AcquisitionConfig {
            delay_min_secs: 5,
            delay_max_secs: 15,
            ..AcquisitionConfig::default()
        };
        for _ in 0..20 {
            let pause = config.pause().as_secs();
            assert!((5..=15).contains(&pause));
        }
        assert!(config.without_delay().pause().is_zero());
    }
}
