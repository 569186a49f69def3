//! Error types for the directory client.

use crate::directory::Collection;

/// Any failure to obtain a collection from the remote directory.
///
/// Callers treat every variant the same way: the refresh is skipped for this
/// cycle and the previously cached snapshot keeps being served.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("no transport configured for {0}")]
    NotConfigured(Collection),
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("directory returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("failed to parse reply from {url}")]
    Parse {
        url: String,
        #[source]
        source: crate::directory::xml::XmlError,
    },
    #[error("reply from {url} has no <{element}> element")]
    MissingResult { url: String, element: String },
}

impl DirectoryError {
    /// Whether the failure happened before any reply was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Status { .. })
    }
}
