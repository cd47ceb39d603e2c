use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::ConnectionError;
use crate::tokens::TokenStore;
use crate::traits::{TokenRefresher, TokenRefresherDyn};

/// Renew this long before the access token expires.
pub const REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

fn as_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Delay until a renewal should start. Zero means renew immediately.
///
/// The timer lands one millisecond past the buffer threshold, so
/// [`refresh_due`] already holds when it fires.
#[must_use]
pub fn renewal_delay(expires_at: i64, now: i64, buffer: Duration) -> Duration {
    let delay = expires_at
        .saturating_sub(now)
        .saturating_sub(as_millis(buffer))
        .saturating_add(1)
        .max(0);
    Duration::from_millis(u64::try_from(delay).unwrap_or(0))
}

/// `true` once `now` has entered the refresh buffer before `expires_at`.
#[must_use]
pub fn refresh_due(expires_at: i64, now: i64, buffer: Duration) -> bool {
    now > expires_at.saturating_sub(as_millis(buffer))
}

/// Per-connection proactive refresh timer.
///
/// At most one timer is armed; re-arming replaces it. Dropping the scheduler
/// cancels the timer.
#[derive(Debug)]
pub struct RefreshScheduler {
    buffer: Duration,
    timer: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(buffer: Duration) -> Self {
        Self {
            buffer,
            timer: None,
        }
    }

    /// Arm the timer from the store's current expiry; `on_fire` runs when it elapses.
    ///
    /// Does nothing (beyond cancelling) when the store holds no credentials.
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&mut self, store: &TokenStore, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let Some(expires_at) = store.expires_at() else {
            return;
        };
        let delay = renewal_delay(expires_at, store.now_ms(), self.buffer);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Refresh timer armed");
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// On-demand check used when a widget asks for a refresh.
    #[must_use]
    pub fn should_refresh_now(&self, store: &TokenStore) -> bool {
        store
            .expires_at()
            .is_some_and(|expires_at| refresh_due(expires_at, store.now_ms(), self.buffer))
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Shell-wide renewal path with single-flight semantics.
///
/// Renewals are serialized; a caller that queued behind another renewal and
/// finds the credentials already replaced returns without a network call, so
/// one refresh token is never spent twice.
#[derive(Clone)]
pub struct Renewer {
    store: TokenStore,
    refresher: Arc<dyn TokenRefresherDyn>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Renewer {
    pub fn new<R: TokenRefresher>(store: TokenStore, refresher: R) -> Self {
        Self {
            store,
            refresher: Arc::new(refresher),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Renew the credentials whose expiry the caller observed as `observed_expires_at`.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NoCredentials`] when there is nothing to renew (or the
    /// store was cleared meanwhile), [`ConnectionError::RefreshFailed`] when the
    /// collaborator fails. Failures are not retried.
    pub async fn renew(&self, observed_expires_at: Option<i64>) -> Result<(), ConnectionError> {
        let _gate = self.gate.lock().await;

        let current = self.store.expires_at();
        if current.is_some() && current != observed_expires_at {
            tracing::debug!("Credentials already renewed by a concurrent refresh");
            return Ok(());
        }

        let refresh_token = self
            .store
            .get_refresh_token()
            .ok_or(ConnectionError::NoCredentials)?;

        let refreshed = self
            .refresher
            .refresh_dyn(&refresh_token)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Credential refresh failed");
                ConnectionError::RefreshFailed(e.to_string())
            })?;

        if !self.store.update_after_refresh(refreshed) {
            tracing::warn!("Store cleared while a refresh was in flight");
            return Err(ConnectionError::NoCredentials);
        }
        tracing::info!(expires_at = ?self.store.expires_at(), "Credentials refreshed");
        Ok(())
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }
}
