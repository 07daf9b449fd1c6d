#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::{DynamicImage, Rgba, RgbaImage};
use tempfile::TempDir;
use uuid::Uuid;

use landwatch_service::config::Config;
use landwatch_service::error::LandwatchError;
use landwatch_service::services::{
    filename_from_id, Detector, ImageRecord, ImageSource, ImageStore, MemoryImageStore,
};
use landwatch_service::utils::detection_utils::DetectionResult;
use landwatch_service::web::AppState;

pub fn init_test_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("debug"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([40, 80, 40, 255]),
    ));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    Bytes::from(bytes)
}

pub fn create_test_detection(conf: f32) -> DetectionResult {
    DetectionResult {
        r#box: [4.0, 4.0, 12.0, 10.0],
        cls: 0,
        cls_name: "landfill".to_string(),
        conf,
        segments: vec![],
    }
}

/// Poll a synchronous condition until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Poll an async condition until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}

/// State shared between a mock source and the test that drives it.
#[derive(Debug, Default)]
pub struct SourceData {
    pub listing: Vec<String>,
    pub files: HashMap<String, Bytes>,
    pub list_calls: usize,
    pub fetch_calls: HashMap<String, usize>,
    pub seen_keys: Vec<String>,
    pub reject_key: bool,
    pub list_delay: Option<Duration>,
    pub fetch_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct MockSource {
    data: Arc<Mutex<SourceData>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// List `filename` under a gateway-style URL and serve `bytes` for it.
    pub fn add_image(&self, filename: &str, bytes: Bytes) {
        let mut data = self.data.lock().unwrap();
        data.listing
            .push(format!("http://gateway.test/image/{}", filename));
        data.files.insert(filename.to_string(), bytes);
    }

    /// List `filename` without serving it, as if it vanished before fetch.
    pub fn add_listing_only(&self, filename: &str) {
        self.data
            .lock()
            .unwrap()
            .listing
            .push(format!("http://gateway.test/image/{}", filename));
    }

    pub fn set_reject_key(&self, reject: bool) {
        self.data.lock().unwrap().reject_key = reject;
    }

    /// Make every `list` call hang for `delay` before answering.
    pub fn set_list_delay(&self, delay: Duration) {
        self.data.lock().unwrap().list_delay = Some(delay);
    }

    /// Make every `fetch` call hang for `delay` before answering.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.data.lock().unwrap().fetch_delay = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.data.lock().unwrap().list_calls
    }

    pub fn fetch_calls(&self, filename: &str) -> usize {
        self.data
            .lock()
            .unwrap()
            .fetch_calls
            .get(filename)
            .copied()
            .unwrap_or(0)
    }

    pub fn seen_keys(&self) -> Vec<String> {
        self.data.lock().unwrap().seen_keys.clone()
    }
}

#[async_trait]
impl ImageSource for MockSource {
    async fn list(&self, api_key: &str) -> Result<Vec<String>, LandwatchError> {
        let delay = {
            let mut data = self.data.lock().unwrap();
            data.list_calls += 1;
            data.seen_keys.push(api_key.to_string());
            data.list_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let data = self.data.lock().unwrap();
        if data.reject_key {
            return Err(LandwatchError::Auth("401 Unauthorized".to_string()));
        }
        Ok(data.listing.clone())
    }

    async fn fetch(
        &self,
        _api_key: &str,
        id: &str,
        _timeout: Duration,
    ) -> Result<Bytes, LandwatchError> {
        let filename = filename_from_id(id).to_string();
        let delay = {
            let mut data = self.data.lock().unwrap();
            *data.fetch_calls.entry(filename.clone()).or_insert(0) += 1;
            data.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let data = self.data.lock().unwrap();
        data.files
            .get(&filename)
            .cloned()
            .ok_or(LandwatchError::NotFound(filename))
    }
}

#[derive(Debug, Default)]
pub struct DetectorData {
    pub results: HashMap<String, Vec<DetectionResult>>,
    pub calls: Vec<String>,
}

/// Returns scripted results per filename, nothing for unknown files.
#[derive(Debug, Clone, Default)]
pub struct MockDetector {
    data: Arc<Mutex<DetectorData>>,
}

impl MockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, filename: &str, results: Vec<DetectionResult>) {
        self.data
            .lock()
            .unwrap()
            .results
            .insert(filename.to_string(), results);
    }

    pub fn calls(&self) -> Vec<String> {
        self.data.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl Detector for MockDetector {
    async fn detect(
        &self,
        filename: &str,
        _bytes: Bytes,
    ) -> Result<Vec<DetectionResult>, LandwatchError> {
        let mut data = self.data.lock().unwrap();
        data.calls.push(filename.to_string());
        Ok(data.results.get(filename).cloned().unwrap_or_default())
    }
}

/// Memory store whose inserts can be slowed down, for stop-timeout tests.
pub struct SlowStore {
    inner: MemoryImageStore,
    insert_delay: Duration,
    pub insert_started: AtomicBool,
}

impl SlowStore {
    pub fn new(insert_delay: Duration) -> Self {
        Self {
            inner: MemoryImageStore::new(),
            insert_delay,
            insert_started: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ImageStore for SlowStore {
    async fn insert(&self, record: ImageRecord) -> Result<Uuid, LandwatchError> {
        self.insert_started.store(true, Ordering::SeqCst);
        tokio::time::sleep(self.insert_delay).await;
        self.inner.insert(record).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ImageRecord>, LandwatchError> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, LandwatchError> {
        self.inner.delete(id).await
    }

    async fn find_since(
        &self,
        owner: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ImageRecord>, LandwatchError> {
        self.inner.find_since(owner, since).await
    }

    async fn find_by_filename(
        &self,
        filename: &str,
        owner: &str,
    ) -> Result<Option<ImageRecord>, LandwatchError> {
        self.inner.find_by_filename(filename, owner).await
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<ImageRecord>, LandwatchError> {
        self.inner.list_by_owner(owner).await
    }
}

/// Config rooted in a scratch directory with fast poll intervals.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.ingest.staging_dir = dir.path().join("realtime_images");
    config.ingest.poll_interval_ms = 20;
    config.ingest.stop_timeout_secs = 5;
    config.stream.poll_interval_ms = 20;
    config.storage.upload_dir = dir.path().join("uploads");
    config.storage.output_dir = dir.path().join("outputs");
    config
}

pub struct TestEnv {
    pub dir: TempDir,
    pub source: MockSource,
    pub detector: MockDetector,
    pub store: Arc<MemoryImageStore>,
    pub state: AppState,
}

impl TestEnv {
    pub fn new() -> Self {
        init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let source = MockSource::new();
        let detector = MockDetector::new();
        let store = Arc::new(MemoryImageStore::new());
        let state = AppState::new(
            config,
            Arc::new(source.clone()),
            Arc::new(detector.clone()),
            store.clone(),
        );
        Self {
            dir,
            source,
            detector,
            store,
            state,
        }
    }

    pub async fn records_for(&self, owner: &str) -> Vec<ImageRecord> {
        self.store.list_by_owner(owner).await.unwrap()
    }
}
