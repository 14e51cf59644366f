use async_trait::async_trait;
use thiserror::Error;

use super::types::{Comment, Post, Source, SourceKind, SourceMetadata};

/// Errors a provider can return from any of its operations.
///
/// These cover the network round-trip, the translation of the remote
/// payload, and rejection of a candidate identifier.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded its deadline
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response could not be decoded into the expected shape
    #[error("Parse error: {0}")]
    Parse(String),
    /// The identifier does not name a fetchable source of this kind
    #[error("{0}")]
    InvalidSource(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

/// Capability set every source adapter implements.
///
/// Implementations translate remote representations into [`Post`] and
/// [`Comment`] values and never touch the store; persistence belongs to
/// [`crate::feed::Manager`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// The kind this provider is registered under.
    fn kind(&self) -> SourceKind;

    /// Fetches the posts currently listed upstream for `source`.
    async fn fetch_posts(&self, source: &Source) -> Result<Vec<Post>, FetchError>;

    /// Fetches the comment tree for `post`, already nested by parent/child.
    async fn fetch_comments(&self, post: &Post) -> Result<Vec<Comment>, FetchError>;

    /// Checks that `identifier` names a real source and describes it.
    ///
    /// The error's message is shown to the subscribing caller as-is.
    async fn validate_source(&self, identifier: &str) -> Result<SourceMetadata, FetchError>;
}
