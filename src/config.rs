use std::time::Duration;

use crate::error::Error;
use crate::refresh::REFRESH_BUFFER;
use crate::tokens::DEFAULT_STORAGE_KEY;

/// Default wait after the frame's load event before pushing credentials unasked.
pub const DEFAULT_LOAD_GRACE: Duration = Duration::from_secs(2);

/// Default upper bound on bootstrap-token issuance before pushing without one.
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Sandbox attribute for widget frames: scripts, same-origin-within-sandbox, forms, popups.
pub const DEFAULT_SANDBOX: &str = "allow-scripts allow-same-origin allow-forms allow-popups";

/// Relay settings shared by every widget connection.
///
/// All fields have defaults. Override with `with_*` methods, or use
/// [`from_env()`](RelayConfig::from_env).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub(crate) refresh_buffer: Duration,
    pub(crate) load_grace: Duration,
    pub(crate) bootstrap_timeout: Duration,
    pub(crate) storage_key: String,
    pub(crate) sandbox: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            refresh_buffer: REFRESH_BUFFER,
            load_grace: DEFAULT_LOAD_GRACE,
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
            storage_key: DEFAULT_STORAGE_KEY.into(),
            sandbox: DEFAULT_SANDBOX.into(),
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `WIDGET_RELAY_REFRESH_BUFFER_SECS`: seconds before expiry to renew
    /// - `WIDGET_RELAY_LOAD_GRACE_MS`: load-event fallback grace in milliseconds
    /// - `WIDGET_RELAY_BOOTSTRAP_TIMEOUT_MS`: bootstrap issuance timeout in milliseconds
    /// - `WIDGET_RELAY_STORAGE_KEY`: durable storage key of the credential record
    /// - `WIDGET_RELAY_SANDBOX`: frame sandbox attribute value
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::new();

        if let Ok(secs) = std::env::var("WIDGET_RELAY_REFRESH_BUFFER_SECS") {
            config = config.with_refresh_buffer(Duration::from_secs(parse_number(
                "WIDGET_RELAY_REFRESH_BUFFER_SECS",
                &secs,
            )?));
        }
        if let Ok(ms) = std::env::var("WIDGET_RELAY_LOAD_GRACE_MS") {
            config = config.with_load_grace(Duration::from_millis(parse_number(
                "WIDGET_RELAY_LOAD_GRACE_MS",
                &ms,
            )?));
        }
        if let Ok(ms) = std::env::var("WIDGET_RELAY_BOOTSTRAP_TIMEOUT_MS") {
            config = config.with_bootstrap_timeout(Duration::from_millis(parse_number(
                "WIDGET_RELAY_BOOTSTRAP_TIMEOUT_MS",
                &ms,
            )?));
        }
        if let Ok(key) = std::env::var("WIDGET_RELAY_STORAGE_KEY") {
            config = config.with_storage_key(key);
        }
        if let Ok(sandbox) = std::env::var("WIDGET_RELAY_SANDBOX") {
            config = config.with_sandbox(sandbox);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    #[must_use]
    pub fn with_load_grace(mut self, grace: Duration) -> Self {
        self.load_grace = grace;
        self
    }

    #[must_use]
    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    #[must_use]
    pub fn with_sandbox(mut self, sandbox: impl Into<String>) -> Self {
        self.sandbox = sandbox.into();
        self
    }

    #[must_use]
    pub fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    #[must_use]
    pub fn load_grace(&self) -> Duration {
        self.load_grace
    }

    #[must_use]
    pub fn bootstrap_timeout(&self) -> Duration {
        self.bootstrap_timeout
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    #[must_use]
    pub fn sandbox(&self) -> &str {
        &self.sandbox
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64, Error> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{name}: {e}")))
}
