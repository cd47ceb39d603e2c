//! Shell-side hosting: the tab strip, the mounted-frame cache and one
//! credential-relay controller per mounted widget.

mod controller;
mod tabs;

pub use controller::{ConnectionStatus, RelayContext, WidgetHostController};
pub use tabs::{MountedWidget, Tab, TabKey, TabManager, WidgetDescriptor, WidgetTab};
