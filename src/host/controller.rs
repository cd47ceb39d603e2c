use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::error::ConnectionError;
use crate::handshake::{Conditions, Effect, Handshake, HandshakeEvent, HandshakeState};
use crate::origin::WidgetOrigin;
use crate::protocol::{AuthPayload, ShellMessage, WidgetMessage};
use crate::refresh::{RefreshScheduler, Renewer};
use crate::tokens::TokenStore;
use crate::traits::{BootstrapIssuer, BootstrapIssuerDyn, FrameChannel, FrameEvent, TokenRefresher};
use crate::types::TabId;

/// Shell-wide collaborators shared by every widget connection.
#[derive(Clone)]
pub struct RelayContext {
    renewer: Renewer,
    bootstrap: Option<Arc<dyn BootstrapIssuerDyn>>,
    config: RelayConfig,
}

impl RelayContext {
    pub fn new<R: TokenRefresher>(store: TokenStore, refresher: R, config: RelayConfig) -> Self {
        Self {
            renewer: Renewer::new(store, refresher),
            bootstrap: None,
            config,
        }
    }

    /// Attach a bootstrap-token issuer. Without one, `AUTH` carries no bootstrap token.
    #[must_use]
    pub fn with_bootstrap_issuer<B: BootstrapIssuer>(mut self, issuer: B) -> Self {
        self.bootstrap = Some(Arc::new(issuer));
        self
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore {
        self.renewer.store()
    }

    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// Lifecycle of one widget connection as seen by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Waiting for the widget to become ready.
    Loading,
    /// Credentials were delivered.
    Ready,
    /// The last credential operation failed; the connection stays up.
    Error(ConnectionError),
}

/// Controller for one mounted widget frame.
///
/// Owns a single event-loop task holding the frame subscription, the handshake
/// state, the refresh timer and any in-flight renewal. Dropping the controller
/// aborts that task, which releases all of them.
pub struct WidgetHostController {
    tab_id: TabId,
    origin: WidgetOrigin,
    status: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl WidgetHostController {
    /// Subscribe to `channel` and start the connection's event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        tab_id: TabId,
        origin: WidgetOrigin,
        channel: Arc<dyn FrameChannel>,
        ctx: RelayContext,
    ) -> Self {
        let frames = channel.listen();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Loading);

        let connection = Connection {
            tab_id,
            handshake: Handshake::new(origin.clone()),
            scheduler: RefreshScheduler::new(ctx.config.refresh_buffer),
            channel,
            ctx,
            events: events_tx,
            status: status_tx,
            load_fallback: None,
            renewal: None,
        };
        let task = tokio::spawn(connection.run(frames, events_rx));

        Self {
            tab_id,
            origin,
            status: status_rx,
            task,
        }
    }

    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// The origin pinned for this connection.
    #[must_use]
    pub fn origin(&self) -> &WidgetOrigin {
        &self.origin
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    #[must_use]
    pub fn current_status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Tear the connection down: cancels the refresh timer and removes the listener.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for WidgetHostController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum LoopEvent {
    LoadGraceElapsed,
    RefreshTimerFired,
    RenewalFinished(Result<(), ConnectionError>),
}

impl From<LoopEvent> for HandshakeEvent {
    fn from(event: LoopEvent) -> Self {
        match event {
            LoopEvent::LoadGraceElapsed => Self::LoadGraceElapsed,
            LoopEvent::RefreshTimerFired => Self::RefreshTimerFired,
            LoopEvent::RenewalFinished(Ok(())) => Self::RenewalSucceeded,
            LoopEvent::RenewalFinished(Err(e)) => Self::RenewalFailed(e),
        }
    }
}

struct Connection {
    tab_id: TabId,
    handshake: Handshake,
    scheduler: RefreshScheduler,
    channel: Arc<dyn FrameChannel>,
    ctx: RelayContext,
    events: mpsc::UnboundedSender<LoopEvent>,
    status: watch::Sender<ConnectionStatus>,
    load_fallback: Option<JoinHandle<()>>,
    renewal: Option<JoinHandle<()>>,
}

impl Connection {
    async fn run(
        mut self,
        mut frames: mpsc::UnboundedReceiver<FrameEvent>,
        mut internal: mpsc::UnboundedReceiver<LoopEvent>,
    ) {
        loop {
            let event = tokio::select! {
                frame = frames.recv() => match frame {
                    Some(FrameEvent::Loaded) => HandshakeEvent::FrameLoaded,
                    Some(FrameEvent::Message { origin, data }) => match WidgetMessage::decode(&data) {
                        Some(message) => HandshakeEvent::Inbound { origin, message },
                        None => {
                            tracing::trace!(tab_id = %self.tab_id, "Ignoring unrecognized frame message");
                            continue;
                        }
                    },
                    None => {
                        tracing::debug!(tab_id = %self.tab_id, "Frame channel closed");
                        break;
                    }
                },
                Some(event) = internal.recv() => event.into(),
            };
            self.step(event).await;
        }
    }

    async fn step(&mut self, event: HandshakeEvent) {
        let conditions = Conditions {
            refresh_due: self.scheduler.should_refresh_now(self.ctx.store()),
        };
        let was_awaiting = self.handshake.state() == HandshakeState::AwaitingReady;
        let effects = self.handshake.handle(event, conditions);
        if was_awaiting && self.handshake.state() != HandshakeState::AwaitingReady {
            tracing::info!(tab_id = %self.tab_id, origin = %self.handshake.origin(), "Widget handshake complete");
        }
        for effect in effects {
            self.apply(effect).await;
        }
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::PushCredentials => self.push_credentials().await,
            Effect::ArmLoadFallback => {
                self.cancel_load_fallback();
                let events = self.events.clone();
                let grace = self.ctx.config.load_grace;
                self.load_fallback = Some(tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let _ = events.send(LoopEvent::LoadGraceElapsed);
                }));
            }
            Effect::CancelLoadFallback => self.cancel_load_fallback(),
            Effect::ArmRefreshTimer => {
                let events = self.events.clone();
                self.scheduler.arm(self.ctx.store(), move || {
                    let _ = events.send(LoopEvent::RefreshTimerFired);
                });
            }
            Effect::StartRenewal => {
                let renewer = self.ctx.renewer.clone();
                let observed = renewer.store().expires_at();
                let events = self.events.clone();
                self.renewal = Some(tokio::spawn(async move {
                    let outcome = renewer.renew(observed).await;
                    let _ = events.send(LoopEvent::RenewalFinished(outcome));
                }));
            }
            Effect::Report(error) => self.report(error),
        }
    }

    async fn push_credentials(&mut self) {
        let Some(credentials) = self.ctx.store().get_for_widget() else {
            self.report(ConnectionError::NoCredentials);
            return;
        };
        let bootstrap_token = self.issue_bootstrap_token(&credentials.access_token).await;
        let message = ShellMessage::Auth(AuthPayload {
            credentials,
            bootstrap_token,
        });

        let encoded = match message.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(tab_id = %self.tab_id, error = %e, "Failed to encode AUTH message");
                return;
            }
        };
        match self.channel.post(self.handshake.origin().as_str(), encoded) {
            Ok(()) => {
                tracing::debug!(tab_id = %self.tab_id, "Credentials pushed to widget");
                self.status.send_replace(ConnectionStatus::Ready);
            }
            Err(e) => {
                tracing::warn!(tab_id = %self.tab_id, error = %e, "Credential push failed");
            }
        }
    }

    /// Optional secondary credential; any failure degrades to `None`.
    async fn issue_bootstrap_token(&self, access_token: &str) -> Option<String> {
        let issuer = self.ctx.bootstrap.as_ref()?;
        match tokio::time::timeout(self.ctx.config.bootstrap_timeout, issuer.issue_dyn(access_token)).await {
            Ok(Ok(token)) => Some(token),
            Ok(Err(e)) => {
                tracing::debug!(tab_id = %self.tab_id, error = %e, "Bootstrap token unavailable");
                None
            }
            Err(_) => {
                tracing::debug!(tab_id = %self.tab_id, "Bootstrap token issuance timed out");
                None
            }
        }
    }

    fn report(&self, error: ConnectionError) {
        tracing::warn!(tab_id = %self.tab_id, error = %error, "Widget connection fault");
        self.status.send_replace(ConnectionStatus::Error(error));
    }

    fn cancel_load_fallback(&mut self) {
        if let Some(timer) = self.load_fallback.take() {
            timer.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel_load_fallback();
        if let Some(renewal) = self.renewal.take() {
            renewal.abort();
        }
    }
}
