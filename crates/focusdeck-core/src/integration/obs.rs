//! OBS Studio adapter.
//!
//! Entering game mode launches OBS when needed and starts the replay buffer
//! after a startup grace period. Exiting stops the buffer before stopping the
//! process.

use std::future::Future;
use std::time::Duration;

use focusdeck_protocol::ProtocolError;
use focusdeck_protocol::obs::{ObsClient, ObsSettings, START_REPLAY_BUFFER, STOP_REPLAY_BUFFER};
use tokio::time::sleep;
use tracing::{Span, error, info, warn};

use super::vtube::{ProcessAction, run_process_action};
use super::{
    ACTION_ENTER_GAME_MODE, ACTION_EXIT_GAME_MODE, ACTION_NONE, ACTION_START_PROCESS,
    ACTION_START_REPLAY_BUFFER, ACTION_STOP_PROCESS, ACTION_STOP_REPLAY_BUFFER,
};
use crate::config::ObsConfig;
use crate::process::ProcessController;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObsAction {
    None,
    StartProcess,
    StopProcess,
    EnterGameMode,
    ExitGameMode,
    StartReplayBuffer,
    StopReplayBuffer,
    Unsupported(String),
}

impl ObsAction {
    #[must_use]
    pub fn parse(action: &str) -> Self {
        match action {
            ACTION_NONE | "" => Self::None,
            ACTION_START_PROCESS => Self::StartProcess,
            ACTION_STOP_PROCESS => Self::StopProcess,
            ACTION_ENTER_GAME_MODE => Self::EnterGameMode,
            ACTION_EXIT_GAME_MODE => Self::ExitGameMode,
            ACTION_START_REPLAY_BUFFER => Self::StartReplayBuffer,
            ACTION_STOP_REPLAY_BUFFER => Self::StopReplayBuffer,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

pub struct ObsAdapter {
    config: ObsConfig,
    process: ProcessController,
    span: Span,
}

impl ObsAdapter {
    #[must_use]
    pub fn new(config: ObsConfig, process: ProcessController, span: Span) -> Self {
        Self {
            config,
            process: process.with_span(span.clone()),
            span,
        }
    }

    #[must_use]
    pub fn replay_buffer_enabled(&self) -> bool {
        self.config.replay_buffer
    }

    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.config.startup_delay_ms)
    }

    fn client_settings(&self) -> ObsSettings {
        ObsSettings {
            host: self.config.websocket.host.clone(),
            port: self.config.websocket.port,
            password: self
                .config
                .websocket
                .password
                .clone()
                .filter(|p| !p.is_empty()),
            ..ObsSettings::default()
        }
    }

    /// Start OBS unless it is already running.
    #[must_use]
    pub fn launch(&self) -> bool {
        let ok = self.process.ensure_running(&self.config.process);
        if !ok {
            self.span.in_scope(|| {
                error!("Failed to launch OBS from '{}'", self.config.process.path);
            });
        }
        ok
    }

    /// Deferred replay-buffer start: wait out the startup delay, then connect,
    /// request `StartReplayBuffer`, and disconnect. Owns everything it needs so
    /// it can run as a background task.
    pub fn replay_buffer_job(&self) -> impl Future<Output = bool> + Send + 'static {
        let settings = self.client_settings();
        let delay = self.startup_delay();
        let span = self.span.clone();

        async move {
            if !delay.is_zero() {
                span.in_scope(|| info!("Waiting {:?} for OBS to come up", delay));
                sleep(delay).await;
            }
            send_request(settings, span, START_REPLAY_BUFFER).await
        }
    }

    pub async fn enter(&self, action: &ObsAction) -> bool {
        self.span.in_scope(|| info!("Entering game mode: {:?}", action));
        match action {
            ObsAction::EnterGameMode => {
                let launched = self.launch();
                if !self.replay_buffer_enabled() {
                    return launched;
                }
                launched && self.replay_buffer_job().await
            }
            other => self.perform(other).await,
        }
    }

    pub async fn exit(&self, action: &ObsAction) -> bool {
        self.span.in_scope(|| info!("Exiting game mode: {:?}", action));
        match action {
            ObsAction::ExitGameMode => {
                let mut ok = true;
                if self.replay_buffer_enabled() {
                    if self.process.is_running(&self.config.process.process_name) {
                        ok &= self.request(STOP_REPLAY_BUFFER).await;
                    } else {
                        self.span
                            .in_scope(|| info!("OBS is not running, skipping replay buffer stop"));
                    }
                }
                let stopped = self.stop_process().await;
                ok && stopped
            }
            other => self.perform(other).await,
        }
    }

    async fn perform(&self, action: &ObsAction) -> bool {
        match action {
            ObsAction::None => true,
            ObsAction::StartProcess | ObsAction::EnterGameMode => self.launch(),
            ObsAction::StopProcess | ObsAction::ExitGameMode => self.stop_process().await,
            ObsAction::StartReplayBuffer => self.request(START_REPLAY_BUFFER).await,
            ObsAction::StopReplayBuffer => self.request(STOP_REPLAY_BUFFER).await,
            ObsAction::Unsupported(name) => {
                self.span
                    .in_scope(|| warn!("Unsupported OBS action: {}", name));
                false
            }
        }
    }

    async fn stop_process(&self) -> bool {
        run_process_action(
            &self.process,
            &self.config.process,
            &ProcessAction::StopProcess,
            "obs",
            &self.span,
        )
        .await
    }

    async fn request(&self, request_type: &str) -> bool {
        send_request(self.client_settings(), self.span.clone(), request_type).await
    }
}

/// One short-lived connection carrying a single request.
async fn send_request(settings: ObsSettings, span: Span, request_type: &str) -> bool {
    let url = settings.url();
    let mut client = ObsClient::new(settings, span.clone());

    let result = match client.connect().await {
        Ok(()) => client.send_control_request(request_type).await.map(|_| ()),
        Err(e) => Err(e),
    };
    client.disconnect().await;

    match result {
        Ok(()) => true,
        Err(e) => {
            span.in_scope(|| log_request_failure(request_type, &url, &e));
            false
        }
    }
}

fn log_request_failure(request_type: &str, url: &str, e: &ProtocolError) {
    if e.is_connectivity() {
        error!("{} not sent, OBS is unreachable at {}: {}", request_type, url, e);
    } else {
        error!("{} rejected by {}: {}", request_type, url, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_obs_actions() {
        assert_eq!(ObsAction::parse("none"), ObsAction::None);
        assert_eq!(ObsAction::parse("enter-game-mode"), ObsAction::EnterGameMode);
        assert_eq!(ObsAction::parse("exit-game-mode"), ObsAction::ExitGameMode);
        assert_eq!(
            ObsAction::parse("start-replay-buffer"),
            ObsAction::StartReplayBuffer
        );
        assert_eq!(
            ObsAction::parse("stop-replay-buffer"),
            ObsAction::StopReplayBuffer
        );
        assert_eq!(
            ObsAction::parse("start-recording"),
            ObsAction::Unsupported("start-recording".to_string())
        );
    }

    #[test]
    fn test_client_settings_from_config() {
        let mut config = ObsConfig::default();
        config.websocket.port = 4460;
        config.websocket.password = Some(String::new());

        let adapter = ObsAdapter::new(
            config,
            ProcessController::system(Span::none()),
            Span::none(),
        );
        let settings = adapter.client_settings();
        assert_eq!(settings.url(), "ws://localhost:4460");
        assert!(settings.password.is_none());
    }
}
