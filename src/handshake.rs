//! Per-connection handshake state machine (shell side).
//!
//! Transitions are pure: `(state, event, conditions) -> (state, effects)`. The
//! controller feeds events in arrival order and executes the returned effects;
//! nothing here touches the store, timers, or the frame.

use crate::error::ConnectionError;
use crate::origin::WidgetOrigin;
use crate::protocol::WidgetMessage;

/// How the connection first reached `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyVia {
    /// The widget sent `WIDGET_READY`.
    Handshake,
    /// The load-event grace period ran out without a ready signal.
    LoadFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingReady,
    Ready { via: ReadyVia },
    /// A renewal is outstanding; `pending_pushes` credential pushes are owed once it settles.
    Refreshing { via: ReadyVia, pending_pushes: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// A decoded message from the frame, with the sender's origin.
    Inbound { origin: String, message: WidgetMessage },
    /// The frame's native load event.
    FrameLoaded,
    /// The load fallback grace period elapsed.
    LoadGraceElapsed,
    /// The proactive refresh timer fired.
    RefreshTimerFired,
    RenewalSucceeded,
    RenewalFailed(ConnectionError),
}

/// Facts sampled by the controller just before a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Conditions {
    /// `RefreshScheduler::should_refresh_now()` at the time of the event.
    pub refresh_due: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Read the store and post `AUTH` (or surface `NoCredentials`).
    PushCredentials,
    /// Start the load fallback grace timer.
    ArmLoadFallback,
    /// Stop the load fallback grace timer.
    CancelLoadFallback,
    /// (Re)arm the proactive refresh timer from the store's current expiry.
    ArmRefreshTimer,
    /// Begin a renewal; its outcome comes back as `RenewalSucceeded`/`RenewalFailed`.
    StartRenewal,
    /// Surface a fault to the UI layer.
    Report(ConnectionError),
}

impl HandshakeState {
    /// Apply one event. Origin filtering happens before this, in [`Handshake::handle`].
    #[must_use]
    pub fn on(self, event: &HandshakeEvent, conditions: Conditions) -> (Self, Vec<Effect>) {
        use HandshakeEvent as E;
        use HandshakeState as S;

        match (self, event) {
            (S::AwaitingReady, E::Inbound { message: WidgetMessage::Ready { .. }, .. }) => (
                S::Ready { via: ReadyVia::Handshake },
                vec![Effect::CancelLoadFallback, Effect::PushCredentials, Effect::ArmRefreshTimer],
            ),
            (S::AwaitingReady, E::FrameLoaded) => (self, vec![Effect::ArmLoadFallback]),
            (S::AwaitingReady, E::LoadGraceElapsed) => (
                S::Ready { via: ReadyVia::LoadFallback },
                vec![Effect::PushCredentials, Effect::ArmRefreshTimer],
            ),

            // The fallback already pushed; the late ready signal only confirms.
            (S::Ready { via: ReadyVia::LoadFallback }, E::Inbound { message: WidgetMessage::Ready { .. }, .. }) => {
                (S::Ready { via: ReadyVia::Handshake }, Vec::new())
            }
            // A second ready after a real handshake means the widget document restarted.
            (S::Ready { via: ReadyVia::Handshake }, E::Inbound { message: WidgetMessage::Ready { .. }, .. }) => {
                (self, vec![Effect::PushCredentials])
            }

            (S::Ready { via }, E::Inbound { message: WidgetMessage::RefreshRequest, .. }) => {
                if conditions.refresh_due {
                    (S::Refreshing { via, pending_pushes: 1 }, vec![Effect::StartRenewal])
                } else {
                    (self, vec![Effect::PushCredentials])
                }
            }
            // Timers are armed from an expiry that may since have been replaced.
            (S::Ready { via }, E::RefreshTimerFired) => {
                if conditions.refresh_due {
                    (S::Refreshing { via, pending_pushes: 1 }, vec![Effect::StartRenewal])
                } else {
                    (self, vec![Effect::ArmRefreshTimer])
                }
            }

            // Renewal already in flight: coalesce instead of spending the refresh token twice.
            (
                S::Refreshing { via, pending_pushes },
                E::Inbound { message: WidgetMessage::RefreshRequest | WidgetMessage::Ready { .. }, .. },
            ) => (
                S::Refreshing { via, pending_pushes: pending_pushes.saturating_add(1) },
                Vec::new(),
            ),

            (S::Refreshing { via, pending_pushes }, E::RenewalSucceeded) => {
                let mut effects = vec![Effect::PushCredentials; pending_pushes as usize];
                effects.push(Effect::ArmRefreshTimer);
                (S::Ready { via }, effects)
            }
            (S::Refreshing { via, .. }, E::RenewalFailed(error)) => {
                (S::Ready { via }, vec![Effect::Report(error.clone())])
            }

            _ => (self, Vec::new()),
        }
    }
}

/// Handshake state bound to one pinned origin.
#[derive(Debug, Clone)]
pub struct Handshake {
    origin: WidgetOrigin,
    state: HandshakeState,
}

impl Handshake {
    #[must_use]
    pub fn new(origin: WidgetOrigin) -> Self {
        Self {
            origin,
            state: HandshakeState::AwaitingReady,
        }
    }

    /// Feed one event; messages from any origin other than the pinned one are dropped
    /// without a transition.
    pub fn handle(&mut self, event: HandshakeEvent, conditions: Conditions) -> Vec<Effect> {
        if let HandshakeEvent::Inbound { origin, .. } = &event {
            if !self.origin.matches(origin) {
                tracing::trace!(expected = %self.origin, received = %origin, "Ignoring message from foreign origin");
                return Vec::new();
            }
        }
        let (next, effects) = self.state.on(&event, conditions);
        if next != self.state {
            tracing::debug!(from = ?self.state, to = ?next, "Handshake transition");
        }
        self.state = next;
        effects
    }

    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    #[must_use]
    pub fn origin(&self) -> &WidgetOrigin {
        &self.origin
    }
}
