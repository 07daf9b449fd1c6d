use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LandwatchError;

use super::detection_utils::AnnotationRecord;

/// Left in place of an annotation document when an image could not be
/// processed at all.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub image: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveEntry {
    Annotated(AnnotationRecord),
    Failed(FailureRecord),
}

/// Output directory holding `<filename>_annotations.json` and
/// `<filename>_annotated.png` per processed image. Keys use the whole
/// filename so `a.jpg` and `a.png` never share a document.
#[derive(Debug, Clone)]
pub struct AnnotationArchive {
    dir: PathBuf,
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, LandwatchError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn remove_if_present(path: &Path) -> Result<(), LandwatchError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

impl AnnotationArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, filename: &str) -> PathBuf {
        self.dir.join(format!("{}_annotations.json", filename))
    }

    pub fn failure_path(&self, filename: &str) -> PathBuf {
        self.dir.join(format!("{}_error.json", filename))
    }

    pub fn annotated_name(&self, filename: &str) -> String {
        format!("{}_annotated.png", filename)
    }

    pub fn annotated_path(&self, filename: &str) -> PathBuf {
        self.dir.join(self.annotated_name(filename))
    }

    async fn write_atomic(&self, path: &Path, json: Vec<u8>) -> Result<(), LandwatchError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("record");
        let temp_path = self.dir.join(format!(".{}.part", name));
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, path).await?;
        Ok(())
    }

    /// Written last in the pipeline, so its presence means the image is done.
    /// Clears any failure left by an earlier attempt.
    pub async fn write(&self, record: &AnnotationRecord) -> Result<PathBuf, LandwatchError> {
        let path = self.record_path(&record.image);
        self.write_atomic(&path, serde_json::to_vec_pretty(record)?)
            .await?;
        remove_if_present(&self.failure_path(&record.image)).await?;
        debug!("Wrote annotation record {}", path.display());
        Ok(path)
    }

    pub async fn write_failure(
        &self,
        filename: &str,
        error: &str,
    ) -> Result<PathBuf, LandwatchError> {
        let path = self.failure_path(filename);
        let failure = FailureRecord {
            image: filename.to_string(),
            error: error.to_string(),
        };
        self.write_atomic(&path, serde_json::to_vec_pretty(&failure)?)
            .await?;
        debug!("Wrote failure record {}", path.display());
        Ok(path)
    }

    pub async fn read(&self, filename: &str) -> Result<Option<AnnotationRecord>, LandwatchError> {
        read_json(&self.record_path(filename)).await
    }

    /// The finished result for `filename`, if there is one. An annotation
    /// document wins over a failure record.
    pub async fn lookup(&self, filename: &str) -> Result<Option<ArchiveEntry>, LandwatchError> {
        if let Some(record) = self.read(filename).await? {
            return Ok(Some(ArchiveEntry::Annotated(record)));
        }
        Ok(read_json(&self.failure_path(filename))
            .await?
            .map(ArchiveEntry::Failed))
    }

    pub async fn remove(&self, filename: &str) -> Result<(), LandwatchError> {
        for path in [
            self.record_path(filename),
            self.annotated_path(filename),
            self.failure_path(filename),
        ] {
            remove_if_present(&path).await?;
        }
        Ok(())
    }
}
