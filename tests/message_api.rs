mod common;

use std::sync::Arc;

use common::{FakeNative, FakeRemote, RecordingNotifier};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use mediagrab::commands::{handle_line, AppState};
use mediagrab::config::AppConfig;
use mediagrab::relay::RelayMessage;

fn state(remote: Arc<FakeRemote>) -> AppState {
    AppState::assemble(
        AppConfig::default(),
        remote,
        FakeNative::new(),
        Arc::new(RecordingNotifier::default()),
    )
}

async fn send(state: &AppState, message: Value) -> Value {
    handle_line(state, &message.to_string()).await
}

fn next_media(events: &mut broadcast::Receiver<RelayMessage>) -> Option<String> {
    while let Ok(message) = events.try_recv() {
        if let RelayMessage::NewMediaDetected { media_info } = message {
            return Some(media_info.url);
        }
    }
    None
}

#[tokio::test]
async fn download_replies_with_an_id_or_an_error() {
    let state = state(FakeRemote::new(true));

    let reply = send(&state, json!({ "type": "DOWNLOAD", "url": "https://cdn.example.com/a.mp4" })).await;
    let id = reply["downloadId"].as_str().expect("download id");
    assert_eq!(state.downloads.get(id).unwrap().user_id, "default");

    let reply = send(&state, json!({ "type": "DOWNLOAD", "url": "" })).await;
    assert!(reply["error"].as_str().unwrap().contains("URL cannot be empty"));
}

#[tokio::test]
async fn explicit_flags_override_url_inference() {
    let state = state(FakeRemote::new(true));

    let reply = send(
        &state,
        json!({ "type": "DOWNLOAD", "url": "https://cdn.example.com/youtube.com.mp4", "isYouTube": false, "userId": "u1" }),
    )
    .await;
    let record = state.downloads.get(reply["downloadId"].as_str().unwrap()).unwrap();
    assert!(!record.needs_extraction);
    assert_eq!(record.user_id, "u1");
}

#[tokio::test]
async fn server_status_reports_the_current_flag() {
    let remote = FakeRemote::new(true);
    let state = state(remote);

    let reply = send(&state, json!({ "type": "CHECK_SERVER_STATUS" })).await;
    assert_eq!(reply, json!({ "isOnline": false }));

    state.health.check_now().await;
    let reply = send(&state, json!({ "type": "CHECK_SERVER_STATUS" })).await;
    assert_eq!(reply, json!({ "isOnline": true }));
}

#[tokio::test]
async fn file_size_is_null_while_offline() {
    let remote = FakeRemote::new(false);
    *remote.size.lock().unwrap() = Some(99);
    let state = state(remote.clone());

    let request = json!({ "type": "GET_FILE_SIZE", "url": "https://youtu.be/abc", "isYouTube": true });
    assert_eq!(send(&state, request.clone()).await, json!({ "size": null }));
    assert_eq!(remote.size_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

    remote.online.store(true, std::sync::atomic::Ordering::SeqCst);
    state.health.check_now().await;
    assert_eq!(send(&state, request.clone()).await, json!({ "size": 99 }));
    assert_eq!(send(&state, request).await, json!({ "size": 99 }));
    assert_eq!(remote.size_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn observed_media_is_recorded_once_per_tab() {
    let state = state(FakeRemote::new(true));
    let mut events = state.relay.subscribe();

    let seen = json!({ "type": "RESOURCE_REQUESTED", "tabId": 1, "url": "https://cdn.example.com/a.mp4" });
    assert_eq!(send(&state, seen.clone()).await["added"], json!(true));
    assert_eq!(next_media(&mut events).as_deref(), Some("https://cdn.example.com/a.mp4"));

    assert_eq!(send(&state, seen).await["added"], json!(false));
    assert_eq!(next_media(&mut events), None);

    let tracker = json!({ "type": "RESOURCE_REQUESTED", "tabId": 1, "url": "https://analytics.example.com/v.mp4" });
    assert_eq!(send(&state, tracker).await["added"], json!(false));

    let media = send(&state, json!({ "type": "GET_MEDIA" })).await;
    let media = media.as_array().unwrap();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0]["title"], json!("Untitled"));
    assert_eq!(media[0]["tabId"], json!(1));
    assert_eq!(media[0]["type"], json!("video"));
}

#[tokio::test]
async fn page_reports_and_tab_lifecycle() {
    let state = state(FakeRemote::new(true));

    let report = json!({
        "type": "NEW_MEDIA",
        "tabId": 7,
        "videoInfo": {
            "url": "https://youtu.be/xyz",
            "title": "Keynote",
            "isYouTube": true,
            "channelName": "Conf"
        }
    });
    assert_eq!(send(&state, report).await, json!({ "success": true }));
    send(&state, json!({ "type": "RESOURCE_REQUESTED", "tabId": 8, "url": "https://cdn.example.com/b.webm" })).await;

    let media = send(&state, json!({ "type": "GET_MEDIA" })).await;
    assert_eq!(media[0]["url"], json!("https://www.youtube.com/watch?v=xyz"));
    assert_eq!(media[0]["isYouTube"], json!(true));
    assert_eq!(media[0]["channelName"], json!("Conf"));

    send(&state, json!({ "type": "TAB_LOADING", "tabId": 7 })).await;
    assert_eq!(send(&state, json!({ "type": "GET_MEDIA" })).await.as_array().unwrap().len(), 1);

    send(&state, json!({ "type": "TAB_REMOVED", "tabId": 8 })).await;
    assert_eq!(send(&state, json!({ "type": "GET_MEDIA" })).await, json!([]));

    send(&state, json!({ "type": "RESOURCE_REQUESTED", "tabId": 9, "url": "https://cdn.example.com/c.png" })).await;
    assert_eq!(send(&state, json!({ "type": "CLEAR_ALL_MEDIA" })).await, json!({ "success": true }));
    assert_eq!(send(&state, json!({ "type": "GET_MEDIA" })).await, json!([]));
}

#[tokio::test]
async fn malformed_lines_get_an_error_reply() {
    let state = state(FakeRemote::new(true));

    let reply = handle_line(&state, "{not json").await;
    assert!(reply["error"].as_str().unwrap().starts_with("Invalid message"));

    let reply = send(&state, json!({ "type": "TAB_REMOVED" })).await;
    assert!(reply.get("error").is_some());
}
