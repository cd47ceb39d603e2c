mod common;

use std::time::Duration;

use common::{Shell, settle};
use widget_relay::{ConnectionStatus, IssuedTokens, TabKey, WidgetDescriptor};

const A_ORIGIN: &str = "https://w.test";
const B_ORIGIN: &str = "https://b.test";

fn widget_a() -> WidgetDescriptor {
    WidgetDescriptor::new("widget-a", "Widget A", "https://w.test/app/index.html")
}

fn widget_b() -> WidgetDescriptor {
    WidgetDescriptor::new("widget-b", "Widget B", "https://b.test/")
}

#[tokio::test(start_paused = true)]
async fn ready_push_then_scheduled_renewal_push() {
    let mut shell = Shell::signed_in();
    let a = shell.tabs.open(widget_a()).unwrap();
    let frame = shell.frame(a);
    settle().await;
    assert!(frame.auth_pushes().is_empty());

    frame.ready(A_ORIGIN);
    settle().await;

    let pushes = frame.auth_pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["accessToken"], "access-0");
    assert!(pushes[0].get("refreshToken").is_none());
    assert_eq!(frame.posted.lock()[0].0, A_ORIGIN);
    let first_expiry = pushes[0]["expiresAt"].as_i64().unwrap();
    assert_eq!(shell.tabs.status(a), Some(ConnectionStatus::Ready));

    // Advance to four minutes before expiry, past the five-minute buffer.
    tokio::time::sleep(Duration::from_secs(56 * 60)).await;

    let pushes = frame.auth_pushes();
    assert_eq!(pushes.len(), 2);
    assert_eq!(pushes[1]["accessToken"], "access-1");
    assert!(pushes[1]["expiresAt"].as_i64().unwrap() > first_expiry);
    assert_eq!(shell.refresh_calls(), 1);
    assert_eq!(shell.spent_refresh_tokens(), vec!["refresh-0".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn relogin_moves_renewal_to_the_new_expiry() {
    let mut shell = Shell::signed_in();
    let a = shell.tabs.open(widget_a()).unwrap();
    let frame = shell.frame(a);
    frame.ready(A_ORIGIN);
    settle().await;

    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    shell
        .store
        .set_tokens(IssuedTokens::new("access-new", "id-new", "refresh-new", 3600), None);

    // Past the first session's renewal point, well before the new one.
    tokio::time::sleep(Duration::from_secs(26 * 60)).await;
    assert_eq!(shell.refresh_calls(), 0);
    assert_eq!(frame.auth_pushes().len(), 1);

    // Past the new session's renewal point (90 min expiry, 5 min buffer).
    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert_eq!(shell.spent_refresh_tokens(), vec!["refresh-new".to_owned()]);
    let pushes = frame.auth_pushes();
    assert_eq!(pushes.len(), 2);
    assert_eq!(pushes[1]["accessToken"], "access-1");
}

#[tokio::test(start_paused = true)]
async fn reorder_keeps_mounted_nodes() {
    let mut shell = Shell::signed_in();
    let a = shell.tabs.open(widget_a()).unwrap();
    let b = shell.tabs.open(widget_b()).unwrap();
    let (node_a, node_b) = (shell.node(a), shell.node(b));

    assert!(shell.tabs.reorder(2, 1));

    let strip: Vec<_> = shell.tabs.strip().map(|tab| tab.key()).collect();
    assert_eq!(strip, vec![TabKey::Home, TabKey::Widget(b), TabKey::Widget(a)]);
    assert_eq!(shell.node(a), node_a);
    assert_eq!(shell.node(b), node_b);
    assert_eq!(shell.host.mounts.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(shell.host.unmounts.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_refresh_requests_renew_once_and_push_twice() {
    let mut shell = Shell::signed_in();
    let a = shell.tabs.open(widget_a()).unwrap();
    let frame = shell.frame(a);
    frame.ready(A_ORIGIN);
    settle().await;

    // The session is now close to expiry; both requests land inside the buffer.
    shell
        .store
        .set_tokens(IssuedTokens::new("access-0", "id-0", "refresh-0", 60), None);
    frame.request_refresh(A_ORIGIN);
    frame.request_refresh(A_ORIGIN);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(shell.refresh_calls(), 1);
    let pushes = frame.auth_pushes();
    assert_eq!(pushes.len(), 3);
    assert_eq!(pushes[1]["accessToken"], "access-1");
    assert_eq!(pushes[2]["accessToken"], "access-1");
}

#[tokio::test(start_paused = true)]
async fn widgets_racing_for_renewal_share_one_refresh() {
    let mut shell = Shell::signed_in();
    let a = shell.tabs.open(widget_a()).unwrap();
    let b = shell.tabs.open(widget_b()).unwrap();
    let (frame_a, frame_b) = (shell.frame(a), shell.frame(b));
    frame_a.ready(A_ORIGIN);
    frame_b.ready(B_ORIGIN);
    settle().await;

    shell
        .store
        .set_tokens(IssuedTokens::new("access-0", "id-0", "refresh-0", 60), None);
    frame_a.request_refresh(A_ORIGIN);
    frame_b.request_refresh(B_ORIGIN);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(shell.refresh_calls(), 1);
    assert_eq!(frame_a.auth_pushes().last().unwrap()["accessToken"], "access-1");
    assert_eq!(frame_b.auth_pushes().last().unwrap()["accessToken"], "access-1");
}

#[tokio::test(start_paused = true)]
async fn close_tears_down_timer_and_listener() {
    let mut shell = Shell::signed_in();
    let a = shell.tabs.open(widget_a()).unwrap();
    let frame = shell.frame(a);
    frame.ready(A_ORIGIN);
    settle().await;
    assert!(frame.is_listening());

    assert!(shell.tabs.close(a));
    settle().await;

    assert!(!frame.is_listening());
    assert_eq!(shell.tabs.active(), TabKey::Home);
    assert_eq!(shell.host.unmounts.load(std::sync::atomic::Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    assert_eq!(shell.refresh_calls(), 0);
    assert_eq!(frame.auth_pushes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn messages_from_other_widgets_origin_are_ignored() {
    let mut shell = Shell::signed_in();
    let a = shell.tabs.open(widget_a()).unwrap();
    let frame = shell.frame(a);

    frame.ready(B_ORIGIN);
    frame.ready("https://w.test/app");
    settle().await;

    assert!(frame.posted.lock().is_empty());
    assert_eq!(shell.tabs.status(a), Some(ConnectionStatus::Loading));
}

#[tokio::test(start_paused = true)]
async fn signed_out_shell_reports_missing_credentials() {
    let mut shell = Shell::signed_in();
    shell.store.clear();
    let a = shell.tabs.open(widget_a()).unwrap();
    let frame = shell.frame(a);

    frame.ready(A_ORIGIN);
    settle().await;

    assert!(frame.auth_pushes().is_empty());
    assert_eq!(
        shell.tabs.status(a),
        Some(ConnectionStatus::Error(widget_relay::ConnectionError::NoCredentials))
    );
}
