use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::controller::{ConnectionStatus, RelayContext, WidgetHostController};
use crate::error::Error;
use crate::origin::WidgetOrigin;
use crate::traits::FrameHost;
use crate::types::{FrameNodeId, PublicId, TabId, WidgetId};

/// A widget as launched from the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct WidgetDescriptor {
    pub widget_id: WidgetId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub restricted_access: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<PublicId>,
}

impl WidgetDescriptor {
    #[must_use]
    pub fn new(widget_id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            widget_id: WidgetId(widget_id.into()),
            name: name.into(),
            url: url.into(),
            restricted_access: false,
            public_id: None,
        }
    }

    #[must_use]
    pub fn with_restricted_access(mut self, restricted: bool) -> Self {
        self.restricted_access = restricted;
        self
    }

    #[must_use]
    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(PublicId(public_id.into()));
        self
    }
}

/// An open widget tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetTab {
    pub id: TabId,
    pub widget_id: WidgetId,
    pub name: String,
    pub url: String,
    pub restricted_access: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<PublicId>,
}

impl WidgetTab {
    fn from_descriptor(descriptor: WidgetDescriptor) -> Self {
        Self {
            id: TabId::generate(),
            widget_id: descriptor.widget_id,
            name: descriptor.name,
            url: descriptor.url,
            restricted_access: descriptor.restricted_access,
            public_id: descriptor.public_id,
        }
    }
}

/// Entry of the visible tab strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tab {
    Home,
    Widget(WidgetTab),
}

impl Tab {
    #[must_use]
    pub fn key(&self) -> TabKey {
        match self {
            Self::Home => TabKey::Home,
            Self::Widget(tab) => TabKey::Widget(tab.id),
        }
    }
}

/// Identifies a tab for activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabKey {
    Home,
    Widget(TabId),
}

impl From<TabId> for TabKey {
    fn from(id: TabId) -> Self {
        Self::Widget(id)
    }
}

/// A mounted frame together with the controller relaying credentials into it.
pub struct MountedWidget {
    node: FrameNodeId,
    controller: WidgetHostController,
}

impl MountedWidget {
    #[must_use]
    pub fn node(&self) -> FrameNodeId {
        self.node
    }

    #[must_use]
    pub fn controller(&self) -> &WidgetHostController {
        &self.controller
    }
}

/// Tab strip and mounted-frame cache of the shell.
///
/// Two collections are kept apart on purpose: `tabs` is the display order the
/// user can drag around, `cache` is append-only mount order. Frames are mounted
/// exactly once on `open` and unmounted only on `close`; switching or
/// reordering tabs never remounts anything.
pub struct TabManager {
    host: Arc<dyn FrameHost>,
    ctx: RelayContext,
    tabs: Vec<Tab>,
    active: TabKey,
    cache: IndexMap<TabId, MountedWidget>,
}

impl TabManager {
    #[must_use]
    pub fn new(host: Arc<dyn FrameHost>, ctx: RelayContext) -> Self {
        Self {
            host,
            ctx,
            tabs: vec![Tab::Home],
            active: TabKey::Home,
            cache: IndexMap::new(),
        }
    }

    /// Open (or re-activate) a widget tab and make it active.
    ///
    /// A widget that already has a tab is activated instead of being opened twice.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidWidgetUrl`] if no origin can be derived from the widget URL
    /// (nothing is mounted), [`Error::Frame`] if the host fails to mount the frame.
    pub fn open(&mut self, descriptor: WidgetDescriptor) -> Result<TabId, Error> {
        let existing = self.tabs.iter().find_map(|tab| match tab {
            Tab::Widget(tab) if tab.widget_id == descriptor.widget_id => Some(tab.id),
            _ => None,
        });
        if let Some(id) = existing {
            self.activate(TabKey::Widget(id));
            return Ok(id);
        }

        let origin = WidgetOrigin::from_widget_url(&descriptor.url)?;
        let tab = WidgetTab::from_descriptor(descriptor);
        let frame = self
            .host
            .mount(&tab, self.ctx.config().sandbox())
            .map_err(|e| Error::Frame(e.to_string()))?;
        let controller = WidgetHostController::start(tab.id, origin, frame.channel, self.ctx.clone());

        let id = tab.id;
        tracing::info!(tab_id = %id, widget_id = %tab.widget_id, origin = %controller.origin(), "Widget tab opened");
        self.cache.insert(
            id,
            MountedWidget {
                node: frame.node,
                controller,
            },
        );
        self.tabs.push(Tab::Widget(tab));
        self.activate(TabKey::Widget(id));
        Ok(id)
    }

    /// Make `key` the active tab. Returns `false` for an unknown tab.
    pub fn activate(&mut self, key: TabKey) -> bool {
        if let TabKey::Widget(id) = key {
            if !self.cache.contains_key(&id) {
                return false;
            }
        }
        if key == self.active {
            return true;
        }
        if let TabKey::Widget(previous) = self.active {
            if let Some(mounted) = self.cache.get(&previous) {
                self.host.set_visible(mounted.node, false);
            }
        }
        if let TabKey::Widget(next) = key {
            if let Some(mounted) = self.cache.get(&next) {
                self.host.set_visible(mounted.node, true);
            }
        }
        self.active = key;
        true
    }

    /// Close a widget tab, tearing down its connection and unmounting its frame.
    ///
    /// When the closed tab was active, the tab that takes its place in the strip
    /// becomes active, or Home if it was the last one. Returns `false` for an
    /// unknown tab.
    pub fn close(&mut self, id: TabId) -> bool {
        let Some(index) = self
            .tabs
            .iter()
            .position(|tab| tab.key() == TabKey::Widget(id))
        else {
            return false;
        };
        self.tabs.remove(index);

        if let Some(mounted) = self.cache.shift_remove(&id) {
            mounted.controller.shutdown();
            self.host.unmount(mounted.node);
        }
        tracing::info!(tab_id = %id, "Widget tab closed");

        if self.active == TabKey::Widget(id) {
            let next = self.tabs.get(index).map_or(TabKey::Home, Tab::key);
            self.active = TabKey::Home;
            self.activate(next);
        }
        true
    }

    /// Move the tab at display position `from` to position `to`.
    ///
    /// Home's slot is neither a source nor a target. Returns `false` when the move
    /// is rejected.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        let len = self.tabs.len();
        if from == 0 || to == 0 || from >= len || to >= len {
            return false;
        }
        let tab = self.tabs.remove(from);
        self.tabs.insert(to, tab);
        true
    }

    /// Tabs in display order, Home first.
    pub fn strip(&self) -> impl Iterator<Item = &Tab> {
        self.tabs.iter()
    }

    /// Mounted widgets in mount order, independent of display order.
    pub fn mounted(&self) -> impl Iterator<Item = (TabId, &MountedWidget)> {
        self.cache.iter().map(|(id, mounted)| (*id, mounted))
    }

    #[must_use]
    pub fn active(&self) -> TabKey {
        self.active
    }

    /// Connection status of a widget tab.
    #[must_use]
    pub fn status(&self, id: TabId) -> Option<ConnectionStatus> {
        self.cache.get(&id).map(|m| m.controller.current_status())
    }

    #[must_use]
    pub fn context(&self) -> &RelayContext {
        &self.ctx
    }
}

impl Drop for TabManager {
    fn drop(&mut self) {
        for (_, mounted) in self.cache.drain(..) {
            mounted.controller.shutdown();
            self.host.unmount(mounted.node);
        }
    }
}
