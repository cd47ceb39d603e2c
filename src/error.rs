/// Boxed error returned by consumer-implemented ports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid widget URL '{url}': {reason}")]
    InvalidWidgetUrl { url: String, reason: String },
    #[error("Frame error: {0}")]
    Frame(String),
    #[error("{operation} failed (status {status:?}): {detail}")]
    Collaborator {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Faults surfaced to the UI layer for one widget connection.
///
/// These never cross a message boundary as panics; the controller publishes them
/// through its status channel and the shell decides what to tell the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// The store is empty or expired when credentials had to be pushed.
    #[error("No valid credentials")]
    NoCredentials,

    /// The renewal collaborator rejected or failed the refresh.
    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),
}
