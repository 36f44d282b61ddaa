//! Append-only JSON file of delivered alerts, trimmed to the newest entries.

use std::path::{Path, PathBuf};

use starwatch_core::Alert;

use crate::error::NotifyError;

pub const FILE_CHANNEL_CAP: usize = 100;

pub struct FileChannel {
    path: PathBuf,
    cap: usize,
}

impl FileChannel {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cap: FILE_CHANNEL_CAP,
        }
    }

    #[must_use]
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepend `alerts` to the file, newest first, keeping `cap` entries.
    ///
    /// A missing file starts empty. An unreadable or corrupt file is logged
    /// and replaced. The new contents are written to a sibling temp file and
    /// renamed into place.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Io`] if the file cannot be written and
    /// [`NotifyError::Serialization`] if the alerts cannot be encoded.
    pub async fn prepend(&self, alerts: &[Alert]) -> Result<(), NotifyError> {
        let mut entries = alerts.to_vec();
        entries.extend(self.read_existing().await);
        entries.truncate(self.cap);

        let body = serde_json::to_vec_pretty(&entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.io_error(source))?;

        tracing::debug!(path = %self.path.display(), entries = entries.len(), "notification file updated");
        Ok(())
    }

    async fn read_existing(&self) -> Vec<Alert> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read notification file, starting fresh");
                return Vec::new();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "corrupt notification file, starting fresh");
            Vec::new()
        })
    }

    fn io_error(&self, source: std::io::Error) -> NotifyError {
        NotifyError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
