use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::LandwatchError;
use crate::utils::detection_utils::AnnotationRecord;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageOrigin {
    Uploaded,
    Realtime,
}

/// One processed image, owned by a single user.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: Uuid,
    pub owner: String,
    pub filename: String,
    pub original_path: PathBuf,
    pub annotated_path: PathBuf,
    pub annotations: AnnotationRecord,
    pub processed_at: DateTime<Utc>,
    pub source: ImageOrigin,
}

/// Document store for image records.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn insert(&self, record: ImageRecord) -> Result<Uuid, LandwatchError>;

    async fn get(&self, id: Uuid) -> Result<Option<ImageRecord>, LandwatchError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, LandwatchError>;

    /// Records of `owner` processed at or after `since`, oldest first.
    async fn find_since(
        &self,
        owner: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ImageRecord>, LandwatchError>;

    async fn find_by_filename(
        &self,
        filename: &str,
        owner: &str,
    ) -> Result<Option<ImageRecord>, LandwatchError>;

    /// Newest first.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<ImageRecord>, LandwatchError>;
}

/// Process-local store. Ids are UUIDv7 so key order is insertion order.
#[derive(Default)]
pub struct MemoryImageStore {
    records: RwLock<BTreeMap<Uuid, ImageRecord>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn insert(&self, record: ImageRecord) -> Result<Uuid, LandwatchError> {
        let id = record.id;
        self.records.write().await.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ImageRecord>, LandwatchError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, LandwatchError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn find_since(
        &self,
        owner: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ImageRecord>, LandwatchError> {
        let records = self.records.read().await;
        let mut found: Vec<ImageRecord> = records
            .values()
            .filter(|record| record.owner == owner && record.processed_at >= since)
            .cloned()
            .collect();
        found.sort_by_key(|record| record.processed_at);
        Ok(found)
    }

    async fn find_by_filename(
        &self,
        filename: &str,
        owner: &str,
    ) -> Result<Option<ImageRecord>, LandwatchError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .rev()
            .find(|record| record.filename == filename && record.owner == owner)
            .cloned())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<ImageRecord>, LandwatchError> {
        let records = self.records.read().await;
        let mut found: Vec<ImageRecord> = records
            .values()
            .filter(|record| record.owner == owner)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(found)
    }
}
