//! Widget-side half of the credential relay.
//!
//! A widget running inside a shell frame announces itself, receives `AUTH`
//! messages from the shell, and asks for a refresh when its copy of the
//! credentials is about to expire.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::clock::Clock;
use crate::error::Error;
use crate::origin::WidgetOrigin;
use crate::protocol::{ShellMessage, WidgetMessage};
use crate::refresh::{REFRESH_BUFFER, refresh_due};
use crate::tokens::WidgetCredentials;
use crate::traits::{FrameChannel, FrameEvent};
use crate::types::WidgetId;

/// How long an unanswered refresh request blocks another one.
pub const REFRESH_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Received {
    credentials: Option<WidgetCredentials>,
    bootstrap_token: Option<String>,
    /// When the outstanding refresh request was sent, in epoch milliseconds.
    refresh_requested_at: Option<i64>,
}

/// Credential receiver for code running inside a widget frame.
pub struct WidgetClient {
    shell_origin: WidgetOrigin,
    channel: Arc<dyn FrameChannel>,
    clock: Arc<dyn Clock>,
    widget_id: Option<WidgetId>,
    refresh_buffer: Duration,
    refresh_retry_after: Duration,
    received: Mutex<Received>,
    notify: watch::Sender<Option<WidgetCredentials>>,
}

impl WidgetClient {
    /// Bind to the shell at `shell_url`; only `AUTH` from its origin is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidgetUrl`] if no origin can be derived from `shell_url`.
    pub fn connect(shell_url: &str, channel: Arc<dyn FrameChannel>, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        let (notify, _) = watch::channel(None);
        Ok(Self {
            shell_origin: WidgetOrigin::from_widget_url(shell_url)?,
            channel,
            clock,
            widget_id: None,
            refresh_buffer: REFRESH_BUFFER,
            refresh_retry_after: REFRESH_RETRY_AFTER,
            received: Mutex::new(Received::default()),
            notify,
        })
    }

    #[must_use]
    pub fn with_widget_id(mut self, widget_id: impl Into<String>) -> Self {
        self.widget_id = Some(WidgetId(widget_id.into()));
        self
    }

    #[must_use]
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Allow a new refresh request once an earlier one has gone unanswered this long.
    ///
    /// The shell sends nothing when its renewal fails, so a pending request
    /// must not block the widget forever.
    #[must_use]
    pub fn with_refresh_retry_after(mut self, retry_after: Duration) -> Self {
        self.refresh_retry_after = retry_after;
        self
    }

    #[must_use]
    pub fn shell_origin(&self) -> &WidgetOrigin {
        &self.shell_origin
    }

    /// Tell the shell this widget is listening. Call after the listener is attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] if the message cannot be posted.
    pub fn announce(&self) -> Result<(), Error> {
        self.post(&WidgetMessage::Ready {
            widget_id: self.widget_id.clone(),
        })
    }

    /// Process one event from the shell. Returns `true` if credentials were accepted.
    pub fn handle(&self, event: &FrameEvent) -> bool {
        let FrameEvent::Message { origin, data } = event else {
            return false;
        };
        if !self.shell_origin.matches(origin) {
            tracing::trace!(received = %origin, "Ignoring message from foreign origin");
            return false;
        }
        let Some(ShellMessage::Auth(payload)) = ShellMessage::decode(data) else {
            return false;
        };

        {
            let mut received = self.received.lock();
            received.credentials = Some(payload.credentials.clone());
            received.bootstrap_token = payload.bootstrap_token;
            received.refresh_requested_at = None;
        }
        tracing::debug!(expires_at = payload.credentials.expires_at, "Credentials received from shell");
        self.notify.send_replace(Some(payload.credentials));
        true
    }

    /// Listen on the channel and handle events until the shell side goes away.
    pub async fn run(&self) {
        let mut events = self.channel.listen();
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
    }

    /// Latest credentials, or `None` when none were received or they have expired.
    #[must_use]
    pub fn credentials(&self) -> Option<WidgetCredentials> {
        let received = self.received.lock();
        received
            .credentials
            .as_ref()
            .filter(|c| self.clock.now_ms() <= c.expires_at)
            .cloned()
    }

    #[must_use]
    pub fn bootstrap_token(&self) -> Option<String> {
        self.received.lock().bootstrap_token.clone()
    }

    /// Subscribe to credential deliveries.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<WidgetCredentials>> {
        self.notify.subscribe()
    }

    /// Ask the shell for credentials.
    ///
    /// Returns `false` if an earlier request is still outstanding and younger
    /// than the retry window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] if the message cannot be posted.
    pub fn request_refresh(&self) -> Result<bool, Error> {
        let now = self.clock.now_ms();
        let retry_after = i64::try_from(self.refresh_retry_after.as_millis()).unwrap_or(i64::MAX);
        let previous = {
            let mut received = self.received.lock();
            if let Some(requested_at) = received.refresh_requested_at {
                if now.saturating_sub(requested_at) < retry_after {
                    return Ok(false);
                }
                tracing::debug!(requested_at, "Refresh request went unanswered; asking again");
            }
            received.refresh_requested_at.replace(now)
        };
        if let Err(e) = self.post(&WidgetMessage::RefreshRequest) {
            self.received.lock().refresh_requested_at = previous;
            return Err(e);
        }
        Ok(true)
    }

    /// Request a refresh when the held credentials are within the refresh buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] if the message cannot be posted.
    pub fn refresh_if_due(&self) -> Result<bool, Error> {
        let expires_at = self.received.lock().credentials.as_ref().map(|c| c.expires_at);
        match expires_at {
            Some(expires_at) if refresh_due(expires_at, self.clock.now_ms(), self.refresh_buffer) => {
                self.request_refresh()
            }
            _ => Ok(false),
        }
    }

    fn post(&self, message: &WidgetMessage) -> Result<(), Error> {
        self.channel
            .post(self.shell_origin.as_str(), message.encode())
            .map_err(|e| Error::Frame(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value as JsonValue, json};
    use tokio::sync::mpsc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::BoxError;

    const SHELL: &str = "https://shell.test";
    const NOW: i64 = 1_700_000_000_000;

    #[derive(Default)]
    struct ShellPort {
        posted: parking_lot::Mutex<Vec<(String, JsonValue)>>,
    }

    impl FrameChannel for ShellPort {
        fn post(&self, target_origin: &str, message: JsonValue) -> Result<(), BoxError> {
            self.posted.lock().push((target_origin.to_owned(), message));
            Ok(())
        }

        fn listen(&self) -> mpsc::UnboundedReceiver<FrameEvent> {
            mpsc::unbounded_channel().1
        }
    }

    fn client() -> (WidgetClient, Arc<ShellPort>, Arc<ManualClock>) {
        let port = Arc::new(ShellPort::default());
        let clock = Arc::new(ManualClock::at(NOW));
        let client = WidgetClient::connect("https://shell.test/app", port.clone(), clock.clone())
            .unwrap()
            .with_widget_id("w-1");
        (client, port, clock)
    }

    fn auth(origin: &str, expires_at: i64) -> FrameEvent {
        FrameEvent::Message {
            origin: origin.into(),
            data: json!({
                "type": "AUTH",
                "payload": {
                    "accessToken": "acc",
                    "idToken": "idt",
                    "expiresAt": expires_at,
                    "bootstrapToken": "boot",
                },
            }),
        }
    }

    #[test]
    fn announce_posts_ready_to_shell_origin() {
        let (client, port, _) = client();
        client.announce().unwrap();

        let posted = port.posted.lock();
        assert_eq!(posted[0].0, SHELL);
        assert_eq!(posted[0].1["type"], "WIDGET_READY");
        assert_eq!(posted[0].1["payload"]["widgetId"], "w-1");
    }

    #[test]
    fn accepts_auth_only_from_shell_origin() {
        let (client, _, _) = client();
        let mut updates = client.subscribe();

        assert!(!client.handle(&auth("https://evil.test", NOW + 60_000)));
        assert!(client.credentials().is_none());

        assert!(client.handle(&auth(SHELL, NOW + 60_000)));
        assert_eq!(client.credentials().unwrap().access_token, "acc");
        assert_eq!(client.bootstrap_token().as_deref(), Some("boot"));
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().as_ref().unwrap().id_token, "idt");
    }

    #[test]
    fn ignores_unknown_shapes() {
        let (client, _, _) = client();
        for data in [json!({ "type": "AUTH" }), json!({ "type": "PING" }), json!("AUTH")] {
            assert!(!client.handle(&FrameEvent::Message { origin: SHELL.into(), data }));
        }
        assert!(!client.handle(&FrameEvent::Loaded));
    }

    #[test]
    fn expired_credentials_are_not_returned() {
        let (client, _, clock) = client();
        client.handle(&auth(SHELL, NOW + 60_000));
        clock.advance(Duration::from_secs(61));
        assert!(client.credentials().is_none());
    }

    #[test]
    fn refresh_requests_are_deduplicated_until_auth_arrives() {
        let (client, port, _) = client();
        assert!(client.request_refresh().unwrap());
        assert!(!client.request_refresh().unwrap());
        assert_eq!(port.posted.lock().len(), 1);
        assert_eq!(port.posted.lock()[0].1["type"], "TOKEN_REFRESH_REQUEST");

        client.handle(&auth(SHELL, NOW + 3_600_000));
        assert!(client.request_refresh().unwrap());
        assert_eq!(port.posted.lock().len(), 2);
    }

    #[test]
    fn unanswered_refresh_request_can_be_repeated_after_retry_window() {
        let (client, port, clock) = client();
        client.handle(&auth(SHELL, NOW + 3_600_000));
        clock.advance(Duration::from_secs(56 * 60));
        assert!(client.refresh_if_due().unwrap());

        clock.advance(Duration::from_secs(10));
        assert!(!client.refresh_if_due().unwrap());

        clock.advance(REFRESH_RETRY_AFTER);
        assert!(client.refresh_if_due().unwrap());

        clock.advance(Duration::from_secs(10 * 3600));
        assert!(client.refresh_if_due().unwrap());
        assert!(!client.request_refresh().unwrap());
        assert_eq!(port.posted.lock().len(), 3);
    }

    #[test]
    fn refresh_if_due_respects_buffer() {
        let (client, port, clock) = client();
        assert!(!client.refresh_if_due().unwrap());

        client.handle(&auth(SHELL, NOW + 3_600_000));
        assert!(!client.refresh_if_due().unwrap());

        clock.advance(Duration::from_secs(56 * 60));
        assert!(client.refresh_if_due().unwrap());
        assert_eq!(port.posted.lock().len(), 1);
    }
}
