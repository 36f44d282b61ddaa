use thiserror::Error;

/// Failure of a single notification channel.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} responded with HTTP {status}")]
    UnexpectedStatus { channel: &'static str, status: u16 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write notification file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
