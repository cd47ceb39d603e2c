use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::clock::Clock;
use crate::config::RelayConfig;
use crate::traits::DurableStore;
use crate::types::AuthUser;

/// Storage key of the persisted credential record.
pub const DEFAULT_STORAGE_KEY: &str = "widget_relay.auth";

/// Credentials as issued by sign-in.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct IssuedTokens {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Lifetime of the access/id tokens in seconds.
    pub expires_in: u64,
}

impl IssuedTokens {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        id_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: id_token.into(),
            refresh_token: refresh_token.into(),
            expires_in,
        }
    }
}

impl fmt::Debug for IssuedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedTokens")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Result of a successful renewal.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RefreshedTokens {
    pub access_token: String,
    pub id_token: String,
    pub expires_in: u64,
    /// Present only when the backend rotates refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl RefreshedTokens {
    #[must_use]
    pub fn new(access_token: impl Into<String>, id_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: id_token.into(),
            expires_in,
            refresh_token: None,
        }
    }

    /// Set a rotated refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

impl fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("expires_in", &self.expires_in)
            .field("rotated", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Widget-facing view of the current credentials.
///
/// Has no refresh-token field: nothing built from this type can leak the
/// long-lived credential across the trust boundary.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetCredentials {
    pub access_token: String,
    pub id_token: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
}

impl fmt::Debug for WidgetCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetCredentials")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user.as_ref().map(|u| &u.id))
            .finish_non_exhaustive()
    }
}

/// Persisted credential record. Never leaves this module.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthTokens {
    access_token: String,
    id_token: String,
    refresh_token: String,
    expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<AuthUser>,
}

impl AuthTokens {
    fn widget_view(&self) -> WidgetCredentials {
        WidgetCredentials {
            access_token: self.access_token.clone(),
            id_token: self.id_token.clone(),
            expires_at: self.expires_at,
            user: self.user.clone(),
        }
    }
}

/// Single owner of the session's credentials.
///
/// All mutation goes through the named methods below; subscribers are notified
/// after every change through a watch channel carrying the widget-facing view.
/// Cloning shares the same store.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

struct Inner {
    clock: Arc<dyn Clock>,
    durable: Arc<dyn DurableStore>,
    storage_key: String,
    current: Mutex<Option<AuthTokens>>,
    notify: watch::Sender<Option<WidgetCredentials>>,
}

impl TokenStore {
    /// Open the store, restoring any persisted credentials.
    ///
    /// A malformed persisted record is treated as absent and removed.
    pub fn restore(
        durable: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        storage_key: impl Into<String>,
    ) -> Self {
        let storage_key = storage_key.into();
        let current = match durable.load(&storage_key) {
            Ok(Some(raw)) => match serde_json::from_str::<AuthTokens>(&raw) {
                Ok(tokens) => Some(tokens),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding malformed persisted credentials");
                    if let Err(e) = durable.remove(&storage_key) {
                        tracing::warn!(error = %e, "Failed to remove malformed credentials");
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Durable store read failed");
                None
            }
        };

        let (notify, _) = watch::channel(current.as_ref().map(AuthTokens::widget_view));

        Self {
            inner: Arc::new(Inner {
                clock,
                durable,
                storage_key,
                current: Mutex::new(current),
                notify,
            }),
        }
    }

    /// [`restore`](Self::restore) under the storage key configured in `config`.
    pub fn restore_with(durable: Arc<dyn DurableStore>, clock: Arc<dyn Clock>, config: &RelayConfig) -> Self {
        Self::restore(durable, clock, config.storage_key())
    }

    /// Replace the credentials wholesale with a freshly issued set.
    pub fn set_tokens(&self, issued: IssuedTokens, user: Option<AuthUser>) {
        let tokens = AuthTokens {
            access_token: issued.access_token,
            id_token: issued.id_token,
            refresh_token: issued.refresh_token,
            expires_at: self.expiry_from_now(issued.expires_in),
            user,
        };
        let view = tokens.widget_view();
        {
            let mut current = self.inner.current.lock();
            self.persist(&tokens);
            *current = Some(tokens);
        }
        self.inner.notify.send_replace(Some(view));
    }

    /// Drop the credentials and their persisted copy. Clearing an empty store is a no-op.
    pub fn clear(&self) {
        {
            let mut current = self.inner.current.lock();
            if current.take().is_none() {
                return;
            }
            if let Err(e) = self.inner.durable.remove(&self.inner.storage_key) {
                tracing::warn!(error = %e, "Failed to remove persisted credentials");
            }
        }
        self.inner.notify.send_replace(None);
    }

    /// Credentials for a widget, or `None` when absent or expired.
    #[must_use]
    pub fn get_for_widget(&self) -> Option<WidgetCredentials> {
        let now = self.now_ms();
        self.inner
            .current
            .lock()
            .as_ref()
            .filter(|t| now <= t.expires_at)
            .map(AuthTokens::widget_view)
    }

    /// The refresh token. Only the renewal path reads it.
    pub(crate) fn get_refresh_token(&self) -> Option<String> {
        self.inner
            .current
            .lock()
            .as_ref()
            .map(|t| t.refresh_token.clone())
    }

    /// `true` when credentials are present and not yet expired.
    #[must_use]
    pub fn has_valid(&self) -> bool {
        let now = self.now_ms();
        self.inner
            .current
            .lock()
            .as_ref()
            .is_some_and(|t| now < t.expires_at)
    }

    /// Apply a renewal, keeping the refresh token (unless rotated) and the user.
    ///
    /// Returns `false` when the store was cleared in the meantime; nothing is
    /// written in that case.
    pub fn update_after_refresh(&self, refreshed: RefreshedTokens) -> bool {
        let expires_at = self.expiry_from_now(refreshed.expires_in);
        let view = {
            let mut current = self.inner.current.lock();
            let Some(tokens) = current.as_mut() else {
                return false;
            };
            tokens.access_token = refreshed.access_token;
            tokens.id_token = refreshed.id_token;
            tokens.expires_at = expires_at;
            if let Some(rotated) = refreshed.refresh_token {
                tokens.refresh_token = rotated;
            }
            self.persist(tokens);
            tokens.widget_view()
        };
        self.inner.notify.send_replace(Some(view));
        true
    }

    /// Expiry of the current credentials in epoch milliseconds.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.inner.current.lock().as_ref().map(|t| t.expires_at)
    }

    /// The signed-in user, if known.
    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.inner
            .current
            .lock()
            .as_ref()
            .and_then(|t| t.user.clone())
    }

    /// Subscribe to credential changes.
    ///
    /// The channel carries the last written widget view, without expiry filtering.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<WidgetCredentials>> {
        self.inner.notify.subscribe()
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    fn expiry_from_now(&self, expires_in: u64) -> i64 {
        let lifetime_ms = i64::try_from(expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        self.now_ms().saturating_add(lifetime_ms)
    }

    fn persist(&self, tokens: &AuthTokens) {
        let raw = match serde_json::to_string(tokens) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize credentials");
                return;
            }
        };
        if let Err(e) = self.inner.durable.save(&self.inner.storage_key, &raw) {
            tracing::warn!(error = %e, "Failed to persist credentials");
        }
    }
}
