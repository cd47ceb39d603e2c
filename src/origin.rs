use derive_more::Display;
use url::{Origin, Url};

use crate::error::Error;

/// Message origin pinned for one widget connection.
///
/// Derived once from the widget URL; incoming messages are accepted only when
/// their origin string is exactly equal to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct WidgetOrigin(String);

impl WidgetOrigin {
    /// Derive the expected origin of a widget from its URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidgetUrl`] if the URL does not parse, is not
    /// `http`/`https`, or has an opaque origin.
    pub fn from_widget_url(widget_url: &str) -> Result<Self, Error> {
        let invalid = |reason: String| Error::InvalidWidgetUrl {
            url: widget_url.to_owned(),
            reason,
        };

        let url = Url::parse(widget_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }

        match url.origin() {
            origin @ Origin::Tuple(..) => Ok(Self(origin.ascii_serialization())),
            Origin::Opaque(_) => Err(invalid("opaque origin".into())),
        }
    }

    /// `true` when `incoming` is exactly this origin.
    #[must_use]
    pub fn matches(&self, incoming: &str) -> bool {
        self.0 == incoming
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
