//! Integration tests for the Discord IPC client
//!
//! A Unix socket in a temp dir stands in for the Discord client's endpoint.

#![cfg(unix)]

use std::time::Duration;

use focusdeck_protocol::{
    Activity, DiscordClient, DiscordSettings, IpcCodec, IpcFrame, Opcode, ProtocolError,
};
use futures_util::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

const CLIENT_ID: &str = "1234567890";

fn endpoint(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

/// Accept one connection and collect frames until the client hangs up.
fn spawn_endpoint(listener: UnixListener) -> JoinHandle<Vec<IpcFrame>> {
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, IpcCodec::new());

        let mut frames = Vec::new();
        while let Some(Ok(frame)) = framed.next().await {
            frames.push(frame);
        }
        frames
    })
}

#[tokio::test]
async fn test_first_frame_is_handshake() {
    let dir = TempDir::new().unwrap();
    let path = endpoint(&dir, "discord-ipc-0");
    let server = spawn_endpoint(UnixListener::bind(&path).unwrap());

    let settings = DiscordSettings::new(CLIENT_ID).with_endpoints(vec![path.clone()]);
    let mut client = DiscordClient::new(settings, tracing::Span::none());
    client.connect().await.unwrap();
    assert!(client.is_connected());
    assert_eq!(client.endpoint(), Some(path.as_str()));
    client.disconnect().await;

    let frames = server.await.unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, Opcode::Handshake);
    assert_eq!(frames[0].payload["v"], 1);
    assert_eq!(frames[0].payload["client_id"], CLIENT_ID);
}

#[tokio::test]
async fn test_first_accepting_endpoint_wins() {
    let dir = TempDir::new().unwrap();
    let missing = endpoint(&dir, "discord-ipc-0");
    let second = endpoint(&dir, "discord-ipc-1");
    let third = endpoint(&dir, "discord-ipc-2");
    let server = spawn_endpoint(UnixListener::bind(&second).unwrap());
    let _unused = UnixListener::bind(&third).unwrap();

    let settings = DiscordSettings::new(CLIENT_ID).with_endpoints(vec![missing, second.clone(), third]);
    let mut client = DiscordClient::new(settings, tracing::Span::none());
    client.connect().await.unwrap();
    assert_eq!(client.endpoint(), Some(second.as_str()));
    client.disconnect().await;

    let frames = server.await.unwrap();
    assert_eq!(frames[0].opcode, Opcode::Handshake);
}

#[tokio::test]
async fn test_activity_commands() {
    let dir = TempDir::new().unwrap();
    let path = endpoint(&dir, "discord-ipc-0");
    let server = spawn_endpoint(UnixListener::bind(&path).unwrap());

    let settings = DiscordSettings::new(CLIENT_ID).with_endpoints(vec![path]);
    let mut client = DiscordClient::new(settings, tracing::Span::none());
    client.connect().await.unwrap();

    let first = client.set_status("In a match").await.unwrap();
    let presence = Activity {
        details: Some("Playing Valorant".to_string()),
        ..Activity::default()
    };
    let second = client.set_rich_presence(&presence).await.unwrap();
    let third = client.clear_activity().await.unwrap();
    assert_eq!((first.as_str(), second.as_str(), third.as_str()), ("1", "2", "3"));

    client.disconnect().await;
    client.disconnect().await;
    assert!(!client.is_connected());

    let frames = server.await.unwrap();
    assert_eq!(frames.len(), 4);

    let commands: Vec<&Value> = frames[1..].iter().map(|f| &f.payload).collect();
    for (frame, command) in frames[1..].iter().zip(&commands) {
        assert_eq!(frame.opcode, Opcode::Frame);
        assert_eq!(command["cmd"], "SET_ACTIVITY");
        assert_eq!(command["args"]["pid"], std::process::id());
    }

    assert_eq!(commands[0]["nonce"], "1");
    assert_eq!(commands[0]["args"]["activity"]["state"], "In a match");
    assert_eq!(commands[1]["args"]["activity"]["details"], "Playing Valorant");
    assert_eq!(commands[2]["nonce"], "3");
    assert!(commands[2]["args"]["activity"].is_null());
}

#[tokio::test]
async fn test_connect_fails_when_nothing_listens() {
    let dir = TempDir::new().unwrap();
    let settings = DiscordSettings {
        client_id: CLIENT_ID.to_string(),
        endpoints: vec![endpoint(&dir, "discord-ipc-0"), endpoint(&dir, "discord-ipc-1")],
        attempt_timeout: Duration::from_millis(100),
    };
    let mut client = DiscordClient::new(settings, tracing::Span::none());

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ProtocolError::NoPipeAvailable(2)));
    assert!(err.is_connectivity());
    assert!(!client.is_connected());
}
