use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use crate::error::BoxError;
use crate::host::WidgetTab;
use crate::tokens::RefreshedTokens;
use crate::types::FrameNodeId;

/// Consumer-provided durable key/value storage (browser `localStorage` or equivalent).
///
/// The token store keeps one JSON record under a fixed key. Implementations
/// should treat removal of a missing key as success.
pub trait DurableStore: Send + Sync + 'static {
    /// Read the value stored under `key`.
    fn load(&self, key: &str) -> Result<Option<String>, BoxError>;

    /// Replace the value stored under `key`.
    fn save(&self, key: &str, value: &str) -> Result<(), BoxError>;

    /// Delete the value stored under `key`.
    fn remove(&self, key: &str) -> Result<(), BoxError>;
}

/// Inbound event from one mounted frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    /// The frame's native load event fired.
    Loaded,
    /// A cross-document message arrived, tagged with the sender's origin.
    Message { origin: String, data: JsonValue },
}

/// Cross-document messaging port bound to one frame (or, widget-side, to the parent shell).
pub trait FrameChannel: Send + Sync + 'static {
    /// Post `message` to the peer, restricted to `target_origin`.
    fn post(&self, target_origin: &str, message: JsonValue) -> Result<(), BoxError>;

    /// Subscribe to the peer's events.
    ///
    /// The subscription is released by dropping the receiver; implementations
    /// should stop forwarding once the receiver is closed.
    fn listen(&self) -> mpsc::UnboundedReceiver<FrameEvent>;
}

/// A frame mounted by the [`FrameHost`].
pub struct MountedFrame {
    pub node: FrameNodeId,
    pub channel: Arc<dyn FrameChannel>,
}

/// Consumer-provided frame element management (the DOM side of the shell).
///
/// Frames are created hidden; the tab manager toggles visibility and is the only
/// caller of [`unmount`](FrameHost::unmount).
pub trait FrameHost: Send + Sync + 'static {
    /// Create a sandboxed frame for `tab` with the given sandbox attribute value.
    fn mount(&self, tab: &WidgetTab, sandbox: &str) -> Result<MountedFrame, BoxError>;

    /// Show or hide a mounted frame without detaching it.
    fn set_visible(&self, node: FrameNodeId, visible: bool);

    /// Detach and destroy a mounted frame.
    fn unmount(&self, node: FrameNodeId);
}

/// Consumer-provided credential renewal (the issuance backend).
///
/// # Example
///
/// ```rust,ignore
/// impl TokenRefresher for MyBackend {
///     async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, BoxError> {
///         let body = self.api.refresh(refresh_token).await?;
///         Ok(RefreshedTokens::new(body.access_token, body.id_token, body.expires_in))
///     }
/// }
/// ```
pub trait TokenRefresher: Send + Sync + 'static {
    /// Exchange a refresh token for a new access/id token pair.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshedTokens, BoxError>> + Send;
}

/// Consumer-provided issuance of short-lived bootstrap tokens for widget backends.
pub trait BootstrapIssuer: Send + Sync + 'static {
    /// Mint a bootstrap token on behalf of the holder of `access_token`.
    fn issue(&self, access_token: &str) -> impl Future<Output = Result<String, BoxError>> + Send;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for TokenRefresher (needed for Arc<dyn>).
pub(crate) trait TokenRefresherDyn: Send + Sync {
    fn refresh_dyn<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedTokens, BoxError>>;
}

impl<T: TokenRefresher> TokenRefresherDyn for T {
    fn refresh_dyn<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedTokens, BoxError>> {
        Box::pin(self.refresh(refresh_token))
    }
}

/// Object-safe wrapper for BootstrapIssuer.
pub(crate) trait BootstrapIssuerDyn: Send + Sync {
    fn issue_dyn<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<String, BoxError>>;
}

impl<T: BootstrapIssuer> BootstrapIssuerDyn for T {
    fn issue_dyn<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<String, BoxError>> {
        Box::pin(self.issue(access_token))
    }
}
