//! Tests for the integration adapters

use tempfile::TempDir;
use tokio::net::TcpListener;
use tracing::Span;

use super::fixtures::{FakeProcessTable, controller, fake_executable, spawn_obs_server};
use crate::config::{ObsConfig, ProcessSettings, TerminationMethod, WebSocketConfig};
use crate::integration::{ObsAction, ObsAdapter, ProcessAction, VTubeStudioAdapter};

fn obs_config(dir: &TempDir, port: u16, replay_buffer: bool) -> ObsConfig {
    ObsConfig {
        process: ProcessSettings {
            path: fake_executable(dir, "obs64.exe"),
            process_name: "obs64.exe".to_string(),
            termination_method: TerminationMethod::Graceful,
            ..ProcessSettings::default()
        },
        websocket: WebSocketConfig {
            host: "127.0.0.1".to_string(),
            port,
            password: None,
        },
        replay_buffer,
        startup_delay_ms: 0,
        ..ObsConfig::default()
    }
}

async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_obs_enter_launches_and_starts_buffer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = spawn_obs_server(listener, 1);

    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::new();
    let adapter = ObsAdapter::new(obs_config(&dir, port, true), controller(&table), Span::none());

    assert!(adapter.enter(&ObsAction::EnterGameMode).await);
    assert_eq!(table.spawned().len(), 1);
    assert_eq!(server.await.unwrap(), vec!["StartReplayBuffer"]);
}

#[tokio::test]
async fn test_obs_exit_stops_buffer_then_process() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = spawn_obs_server(listener, 1);

    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::new();
    table.add("obs64.exe", true);
    let adapter = ObsAdapter::new(obs_config(&dir, port, true), controller(&table), Span::none());

    assert!(adapter.exit(&ObsAction::ExitGameMode).await);
    assert_eq!(table.running("obs64.exe"), 0);
    assert_eq!(server.await.unwrap(), vec!["StopReplayBuffer"]);
}

#[tokio::test]
async fn test_obs_exit_when_not_running_skips_buffer() {
    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::new();
    let port = unused_port().await;
    let adapter = ObsAdapter::new(obs_config(&dir, port, true), controller(&table), Span::none());

    assert!(adapter.exit(&ObsAction::ExitGameMode).await);
    assert!(table.close_requests().is_empty());
}

#[tokio::test]
async fn test_obs_buffer_request_fails_without_server() {
    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::new();
    let port = unused_port().await;
    let adapter = ObsAdapter::new(obs_config(&dir, port, true), controller(&table), Span::none());

    assert!(!adapter.enter(&ObsAction::StartReplayBuffer).await);
    // OBS itself still launched fine; only the buffer part fails
    assert!(!adapter.enter(&ObsAction::EnterGameMode).await);
    assert_eq!(table.running("obs64.exe"), 1);
}

#[tokio::test]
async fn test_obs_without_replay_buffer_is_process_only() {
    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::new();
    let port = unused_port().await;
    let adapter = ObsAdapter::new(obs_config(&dir, port, false), controller(&table), Span::none());

    assert!(adapter.enter(&ObsAction::EnterGameMode).await);
    assert!(adapter.exit(&ObsAction::ExitGameMode).await);
    assert_eq!(table.spawned().len(), 1);
    assert_eq!(table.running("obs64.exe"), 0);
}

#[tokio::test]
async fn test_obs_none_and_unsupported() {
    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::new();
    let adapter = ObsAdapter::new(obs_config(&dir, 1, true), controller(&table), Span::none());

    assert!(adapter.enter(&ObsAction::None).await);
    assert!(adapter.exit(&ObsAction::None).await);
    assert!(
        !adapter
            .enter(&ObsAction::Unsupported("start-recording".to_string()))
            .await
    );
    assert!(table.spawned().is_empty());
}

#[tokio::test]
async fn test_vtube_studio_start_and_stop() {
    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::new();
    let settings = ProcessSettings {
        path: fake_executable(&dir, "VTube Studio.exe"),
        process_name: "VTube Studio.exe".to_string(),
        ..ProcessSettings::default()
    };
    let adapter = VTubeStudioAdapter::new(settings, controller(&table), Span::none());

    assert!(adapter.enter(&ProcessAction::parse("enter-game-mode")).await);
    assert_eq!(table.running("vtube studio"), 1);

    assert!(adapter.exit(&ProcessAction::parse("exit-game-mode")).await);
    assert_eq!(table.running("vtube studio"), 0);

    assert!(
        !adapter
            .enter(&ProcessAction::parse("start-replay-buffer"))
            .await
    );
}

#[cfg(unix)]
mod discord {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tempfile::TempDir;
    use tokio::net::UnixListener;
    use tokio::task::JoinHandle;
    use tokio::time::Instant;
    use tokio_util::codec::Framed;
    use tracing::Span;

    use super::super::fixtures::{FakeProcessTable, controller, fake_executable};
    use crate::config::{DiscordConfig, ProcessSettings, RichPresenceConfig, RpcConfig};
    use crate::integration::{DiscordAction, DiscordAdapter};
    use focusdeck_protocol::{IpcCodec, IpcFrame, Opcode};

    fn discord_config() -> DiscordConfig {
        DiscordConfig {
            process: ProcessSettings {
                process_name: "Discord.exe".to_string(),
                ..ProcessSettings::default()
            },
            rpc: RpcConfig {
                enabled: true,
                application_id: "1234567890".to_string(),
            },
            rich_presence: Some(RichPresenceConfig {
                details: Some("Playing {game}".to_string()),
                state: None,
                large_image: None,
                show_elapsed: true,
            }),
            ..DiscordConfig::default()
        }
    }

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
    async fn test_discord_enter_sets_presence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("discord-ipc-0").to_string_lossy().into_owned();
        let server = spawn_endpoint(UnixListener::bind(&path).unwrap());

        let table = FakeProcessTable::new();
        table.add("Discord.exe", true);
        let adapter = DiscordAdapter::new(discord_config(), "Valorant", controller(&table), Span::none())
            .with_endpoints(vec![path]);

        assert!(adapter.enter(&DiscordAction::EnterGameMode).await);

        let frames = server.await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].opcode, Opcode::Handshake);
        assert_eq!(frames[0].payload["client_id"], "1234567890");

        let activity = &frames[1].payload["args"]["activity"];
        assert_eq!(activity["details"], "Playing Valorant");
        assert_eq!(activity["state"], "In game");
        assert!(activity["timestamps"]["start"].is_i64());
    }

    #[tokio::test]
    async fn test_discord_exit_clears_activity_and_stops() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("discord-ipc-0").to_string_lossy().into_owned();
        let server = spawn_endpoint(UnixListener::bind(&path).unwrap());

        let table = FakeProcessTable::new();
        table.add("Discord.exe", true);
        let mut config = discord_config();
        config.stop_process_on_exit = true;
        let adapter = DiscordAdapter::new(config, "Valorant", controller(&table), Span::none())
            .with_endpoints(vec![path]);

        assert!(adapter.exit(&DiscordAction::ExitGameMode).await);
        assert_eq!(table.running("discord"), 0);

        let frames = server.await.unwrap();
        assert_eq!(frames[1].payload["cmd"], "SET_ACTIVITY");
        assert!(frames[1].payload["args"]["activity"].is_null());
    }

    #[tokio::test]
    async fn test_discord_unreachable_endpoint_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("discord-ipc-0").to_string_lossy().into_owned();

        let table = FakeProcessTable::new();
        table.add("Discord.exe", true);
        let adapter = DiscordAdapter::new(discord_config(), "Valorant", controller(&table), Span::none())
            .with_endpoints(vec![path]);

        assert!(!adapter.enter(&DiscordAction::EnterGameMode).await);
    }

    #[tokio::test]
    async fn test_discord_rpc_disabled_is_process_only() {
        let table = FakeProcessTable::new();
        table.add("Discord.exe", true);
        let mut config = discord_config();
        config.rpc.enabled = false;
        let adapter = DiscordAdapter::new(config, "Valorant", controller(&table), Span::none())
            .with_endpoints(Vec::new());

        assert!(adapter.enter(&DiscordAction::EnterGameMode).await);
        assert!(adapter.exit(&DiscordAction::ExitGameMode).await);
        assert_eq!(table.running("discord"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discord_fresh_launch_waits_startup_delay() {
        let dir = TempDir::new().unwrap();
        let table = FakeProcessTable::new();
        let mut config = discord_config();
        config.process.path = fake_executable(&dir, "Discord.exe");
        config.rpc.enabled = false;
        assert_eq!(config.startup_delay_ms, 3000);

        let adapter = DiscordAdapter::new(config, "Valorant", controller(&table), Span::none());
        let started = Instant::now();
        assert!(adapter.enter(&DiscordAction::EnterGameMode).await);
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert_eq!(table.spawned().len(), 1);

        // Already running: no second launch and no wait
        let again = Instant::now();
        assert!(adapter.enter(&DiscordAction::EnterGameMode).await);
        assert!(again.elapsed() < Duration::from_millis(3000));
        assert_eq!(table.spawned().len(), 1);
    }

    #[tokio::test]
    async fn test_discord_not_running_without_path_fails() {
        let table = FakeProcessTable::new();
        let mut config = discord_config();
        config.rpc.enabled = false;
        let adapter = DiscordAdapter::new(config, "Valorant", controller(&table), Span::none());

        assert!(!adapter.enter(&DiscordAction::StartProcess).await);
        assert!(
            !adapter
                .exit(&DiscordAction::Unsupported("mute".to_string()))
                .await
        );
    }
}
