//! Shell ⇄ widget message vocabulary.
//!
//! Every message is a JSON object `{"type": ..., "payload": {...}}` with
//! camelCase payload fields. Decoding is total: anything that is not a known
//! message decodes to `None` and is ignored by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::tokens::WidgetCredentials;
use crate::types::WidgetId;

pub const WIDGET_READY: &str = "WIDGET_READY";
pub const TOKEN_REFRESH_REQUEST: &str = "TOKEN_REFRESH_REQUEST";
pub const AUTH: &str = "AUTH";

/// Message sent by a widget to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetMessage {
    /// The widget's listener is attached and it is ready for credentials.
    Ready { widget_id: Option<WidgetId> },
    /// The widget asks for current (or renewed) credentials.
    RefreshRequest,
}

impl WidgetMessage {
    /// Decode an inbound message. Unknown types and malformed shapes yield `None`.
    #[must_use]
    pub fn decode(data: &JsonValue) -> Option<Self> {
        let kind = data.get("type")?.as_str()?;
        match kind {
            WIDGET_READY => {
                // Older widgets put widgetId next to `type` instead of in the payload.
                let widget_id = data
                    .get("payload")
                    .and_then(|p| p.get("widgetId"))
                    .or_else(|| data.get("widgetId"))
                    .and_then(JsonValue::as_str)
                    .map(|id| WidgetId(id.to_owned()));
                Some(Self::Ready { widget_id })
            }
            TOKEN_REFRESH_REQUEST => Some(Self::RefreshRequest),
            _ => None,
        }
    }

    #[must_use]
    pub fn encode(&self) -> JsonValue {
        match self {
            Self::Ready { widget_id } => {
                let payload = match widget_id {
                    Some(id) => json!({ "widgetId": id }),
                    None => json!({}),
                };
                json!({ "type": WIDGET_READY, "payload": payload })
            }
            Self::RefreshRequest => json!({ "type": TOKEN_REFRESH_REQUEST, "payload": {} }),
        }
    }
}

/// Payload of an `AUTH` message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    #[serde(flatten)]
    pub credentials: WidgetCredentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_token: Option<String>,
}

impl fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPayload")
            .field("credentials", &self.credentials)
            .field("bootstrap_token", &self.bootstrap_token.is_some())
            .finish()
    }
}

/// Message sent by the shell to a widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellMessage {
    Auth(AuthPayload),
}

impl ShellMessage {
    /// Decode a shell message on the widget side.
    #[must_use]
    pub fn decode(data: &JsonValue) -> Option<Self> {
        match data.get("type")?.as_str()? {
            AUTH => {
                let payload = data.get("payload")?.clone();
                serde_json::from_value(payload).ok().map(Self::Auth)
            }
            _ => None,
        }
    }

    /// Encode for posting.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; the payload types are plain data, so this
    /// only fails on a broken `Serialize` impl.
    pub fn encode(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            Self::Auth(payload) => Ok(json!({
                "type": AUTH,
                "payload": serde_json::to_value(payload)?,
            })),
        }
    }
}
