use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::LandwatchError;

/// Local directory that fetched images are written into and that live
/// streams scan. Files appear atomically: they are written under a hidden
/// `.part` name and renamed into place.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
    allowed_extensions: Vec<String>,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>, allowed_extensions: &[String]) -> Self {
        Self {
            dir: dir.into(),
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    pub fn is_allowed(&self, filename: &str) -> bool {
        is_allowed_extension(filename, &self.allowed_extensions)
    }

    /// Eligible filenames in lexicographic order. A missing directory is
    /// treated as empty.
    pub async fn list(&self) -> Result<Vec<String>, LandwatchError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || !self.is_allowed(&name) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub async fn write(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, LandwatchError> {
        let filename = sanitize_filename(filename)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let final_path = self.dir.join(filename);
        let temp_path = self.dir.join(format!(".{}.part", filename));
        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, &final_path).await?;

        debug!("Staged {} ({} bytes)", filename, bytes.len());
        Ok(final_path)
    }

    pub async fn read(&self, filename: &str) -> Result<Vec<u8>, LandwatchError> {
        let filename = sanitize_filename(filename)?;
        match tokio::fs::read(self.dir.join(filename)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(LandwatchError::NotFound(filename.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove every regular file in the staging directory.
    pub async fn clear(&self) -> Result<usize, LandwatchError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.dir).await?;
                return Ok(0);
            }
            Err(err) => return Err(err.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) => warn!("Failed to remove {}: {}", entry.path().display(), err),
            }
        }
        debug!("Cleared {} files from {}", removed, self.dir.display());
        Ok(removed)
    }
}

pub fn is_allowed_extension(filename: &str, allowed: &[String]) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            allowed.iter().any(|allowed| *allowed == ext)
        })
        .unwrap_or(false)
}

/// Reject anything that could escape the target directory.
pub fn sanitize_filename(filename: &str) -> Result<&str, LandwatchError> {
    let invalid = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
        || filename.contains('\0');
    if invalid {
        return Err(LandwatchError::Config(format!(
            "Invalid filename '{}'",
            filename
        )));
    }
    Ok(filename)
}
