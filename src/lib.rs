#![doc = include_str!("../README.md")]

pub mod clock;
pub mod config;
pub mod error;
pub mod handshake;
pub mod host;
pub mod origin;
pub mod protocol;
pub mod refresh;
pub mod storage;
pub mod tokens;
pub mod traits;
pub mod types;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "sdk")]
pub mod sdk;

// Re-exports for convenient access
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RelayConfig;
pub use error::{BoxError, ConnectionError, Error};
pub use host::{
    ConnectionStatus, MountedWidget, RelayContext, Tab, TabKey, TabManager, WidgetDescriptor,
    WidgetHostController, WidgetTab,
};
pub use origin::WidgetOrigin;
pub use protocol::{AuthPayload, ShellMessage, WidgetMessage};
pub use refresh::{RefreshScheduler, Renewer};
pub use storage::MemoryStore;
pub use tokens::{IssuedTokens, RefreshedTokens, TokenStore, WidgetCredentials};
pub use traits::{
    BootstrapIssuer, DurableStore, FrameChannel, FrameEvent, FrameHost, MountedFrame,
    TokenRefresher,
};
pub use types::{AuthUser, FrameNodeId, PublicId, TabId, TeamId, UserId, WidgetId};

#[cfg(feature = "client")]
pub use client::{ClientConfig, RelayClient};
#[cfg(feature = "sdk")]
pub use sdk::WidgetClient;
