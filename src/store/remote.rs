//! Durable blob sink
//!
//! The remote side of persistence is an opaque collaborator: snapshot
//! folders and ledger files are handed to a [`BlobSink`] and the store
//! does not care where they land. Rate-limited uploads get exactly one
//! fixed-delay retry before the failure propagates to the caller, which
//! logs it and keeps local state for the next flush window.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Upload failures, as far as the store needs to distinguish them
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload rate limited")]
    RateLimited,

    #[error("upload failed: {0}")]
    Failed(String),
}

/// An opaque durable blob sink
#[async_trait]
pub trait BlobSink: Send + Sync {
    /// Publishes every file in `folder`
    async fn upload_folder(&self, folder: &Path) -> Result<(), UploadError>;

    /// Publishes a single file
    async fn upload_file(&self, file: &Path) -> Result<(), UploadError>;
}

/// Uploads a folder, retrying exactly once after a rate-limited response
pub async fn upload_with_retry(
    sink: &dyn BlobSink,
    folder: &Path,
    retry_delay: Duration,
) -> Result<(), UploadError> {
    match sink.upload_folder(folder).await {
        Err(UploadError::RateLimited) => {
            tracing::warn!(
                "Upload of {} rate limited, retrying in {:?}",
                folder.display(),
                retry_delay
            );
            tokio::time::sleep(retry_delay).await;
            sink.upload_folder(folder).await
        }
        other => other,
    }
}

/// Blob sink that mirrors into a durable local directory
///
/// Folders land under the mirror root keyed by their directory name, so
/// the mirror reproduces the snapshot layout.
pub struct MirrorSink {
    dest: PathBuf,
}

impl MirrorSink {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }

    fn target_dir(&self, source: &Path) -> PathBuf {
        match source.file_name() {
            Some(name) => self.dest.join(name),
            None => self.dest.clone(),
        }
    }
}

#[async_trait]
impl BlobSink for MirrorSink {
    async fn upload_folder(&self, folder: &Path) -> Result<(), UploadError> {
        let target = self.target_dir(folder);
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;

        let mut entries = tokio::fs::read_dir(folder)
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;

        let mut copied = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?
        {
            let path = entry.path();
            if path.is_file() {
                let dest = target.join(entry.file_name());
                tokio::fs::copy(&path, &dest)
                    .await
                    .map_err(|e| UploadError::Failed(e.to_string()))?;
                copied += 1;
            }
        }

        tracing::debug!("Mirrored {} files from {}", copied, folder.display());
        Ok(())
    }

    async fn upload_file(&self, file: &Path) -> Result<(), UploadError> {
        let parent = file.parent().unwrap_or_else(|| Path::new(""));
        let target = self.target_dir(parent);
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;

        let name = file
            .file_name()
            .ok_or_else(|| UploadError::Failed(format!("no file name: {}", file.display())))?;
        tokio::fs::copy(file, target.join(name))
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySink {
        rate_limited_times: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BlobSink for FlakySink {
        async fn upload_folder(&self, _folder: &Path) -> Result<(), UploadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.rate_limited_times {
                Err(UploadError::RateLimited)
            } else {
                Ok(())
            }
        }

        async fn upload_file(&self, _file: &Path) -> Result<(), UploadError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_retry_once_on_rate_limit() {
        let sink = FlakySink {
            rate_limited_times: 1,
            calls: AtomicUsize::new(0),
        };
        let result =
            upload_with_retry(&sink, Path::new("/tmp/x"), Duration::from_millis(1)).await;
        assert!(result.is_ok());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_rate_limit_propagates() {
        let sink = FlakySink {
            rate_limited_times: 2,
            calls: AtomicUsize::new(0),
        };
        let result =
            upload_with_retry(&sink, Path::new("/tmp/x"), Duration::from_millis(1)).await;
        assert!(matches!(result, Err(UploadError::RateLimited)));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mirror_sink_copies_folder() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("music.json"), "{}").unwrap();
        std::fs::write(source.path().join("progress.json"), "{}").unwrap();

        let sink = MirrorSink::new(dest.path());
        sink.upload_folder(source.path()).await.unwrap();

        let mirrored = dest
            .path()
            .join(source.path().file_name().unwrap());
        assert!(mirrored.join("music.json").exists());
        assert!(mirrored.join("progress.json").exists());
    }

    #[tokio::test]
    async fn test_mirror_sink_copies_file() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let file = source.path().join("progress.json");
        std::fs::write(&file, "{}").unwrap();

        let sink = MirrorSink::new(dest.path());
        sink.upload_file(&file).await.unwrap();

        let mirrored = dest
            .path()
            .join(source.path().file_name().unwrap())
            .join("progress.json");
        assert!(mirrored.exists());
    }
}
