#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use tokio::sync::mpsc;
use widget_relay::{
    BoxError, FrameChannel, FrameEvent, FrameHost, FrameNodeId, IssuedTokens, MemoryStore,
    MountedFrame, RefreshedTokens, RelayConfig, RelayContext, SystemClock, TabId, TabManager,
    TokenRefresher, TokenStore, WidgetTab,
};

/// One mounted frame: records what the shell posts and lets the test play the widget.
#[derive(Default)]
pub struct FakeFrame {
    pub posted: Mutex<Vec<(String, JsonValue)>>,
    sender: Mutex<Option<mpsc::UnboundedSender<FrameEvent>>>,
}

impl FakeFrame {
    pub fn send(&self, origin: &str, data: JsonValue) {
        if let Some(tx) = self.sender.lock().as_ref() {
            let _ = tx.send(FrameEvent::Message {
                origin: origin.into(),
                data,
            });
        }
    }

    pub fn ready(&self, origin: &str) {
        self.send(origin, json!({ "type": "WIDGET_READY", "payload": {} }));
    }

    pub fn request_refresh(&self, origin: &str) {
        self.send(origin, json!({ "type": "TOKEN_REFRESH_REQUEST", "payload": {} }));
    }

    /// Payloads of every `AUTH` message posted so far.
    pub fn auth_pushes(&self) -> Vec<JsonValue> {
        self.posted
            .lock()
            .iter()
            .filter(|(_, message)| message["type"] == "AUTH")
            .map(|(_, message)| message["payload"].clone())
            .collect()
    }

    pub fn is_listening(&self) -> bool {
        self.sender.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl FrameChannel for FakeFrame {
    fn post(&self, target_origin: &str, message: JsonValue) -> Result<(), BoxError> {
        self.posted.lock().push((target_origin.to_owned(), message));
        Ok(())
    }

    fn listen(&self) -> mpsc::UnboundedReceiver<FrameEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock() = Some(tx);
        rx
    }
}

#[derive(Default)]
pub struct FakeFrameHost {
    next: AtomicU64,
    frames: Mutex<HashMap<FrameNodeId, Arc<FakeFrame>>>,
    pub mounts: AtomicUsize,
    pub unmounts: AtomicUsize,
}

impl FakeFrameHost {
    pub fn frame(&self, node: FrameNodeId) -> Arc<FakeFrame> {
        self.frames.lock()[&node].clone()
    }
}

impl FrameHost for FakeFrameHost {
    fn mount(&self, _tab: &WidgetTab, _sandbox: &str) -> Result<MountedFrame, BoxError> {
        let node = FrameNodeId(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        let frame = Arc::new(FakeFrame::default());
        self.frames.lock().insert(node, frame.clone());
        self.mounts.fetch_add(1, Ordering::SeqCst);
        Ok(MountedFrame {
            node,
            channel: frame,
        })
    }

    fn set_visible(&self, _node: FrameNodeId, _visible: bool) {}

    fn unmount(&self, _node: FrameNodeId) {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Refresh backend that takes a little while and counts its calls.
pub struct SlowRefresher {
    pub calls: Arc<AtomicUsize>,
    pub spent: Arc<Mutex<Vec<String>>>,
}

impl TokenRefresher for SlowRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, BoxError> {
        self.spent.lock().push(refresh_token.to_owned());
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(RefreshedTokens::new(format!("access-{n}"), format!("id-{n}"), 3600))
    }
}

pub struct Shell {
    pub store: TokenStore,
    pub host: Arc<FakeFrameHost>,
    pub tabs: TabManager,
    pub refresh_calls: Arc<AtomicUsize>,
    pub spent_refresh_tokens: Arc<Mutex<Vec<String>>>,
}

impl Shell {
    /// A signed-in shell whose tokens live for an hour.
    pub fn signed_in() -> Self {
        let config = RelayConfig::new();
        let store = TokenStore::restore_with(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock::new()),
            &config,
        );
        store.set_tokens(IssuedTokens::new("access-0", "id-0", "refresh-0", 3600), None);

        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let spent_refresh_tokens = Arc::new(Mutex::new(Vec::new()));
        let ctx = RelayContext::new(
            store.clone(),
            SlowRefresher {
                calls: refresh_calls.clone(),
                spent: spent_refresh_tokens.clone(),
            },
            config,
        );
        let host = Arc::new(FakeFrameHost::default());
        let tabs = TabManager::new(host.clone(), ctx);

        Self {
            store,
            host,
            tabs,
            refresh_calls,
            spent_refresh_tokens,
        }
    }

    pub fn node(&self, id: TabId) -> FrameNodeId {
        self.tabs
            .mounted()
            .find(|(tab, _)| *tab == id)
            .map(|(_, mounted)| mounted.node())
            .expect("tab is mounted")
    }

    pub fn frame(&self, id: TabId) -> Arc<FakeFrame> {
        self.host.frame(self.node(id))
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn spent_refresh_tokens(&self) -> Vec<String> {
        self.spent_refresh_tokens.lock().clone()
    }
}

/// Let spawned tasks run to quiescence.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
