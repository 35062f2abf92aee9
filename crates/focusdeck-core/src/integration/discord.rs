//! Discord adapter: process control plus rich presence over local IPC

use std::time::Duration;

use focusdeck_protocol::{Activity, ActivityAssets, ActivityTimestamps, DiscordClient, DiscordSettings};
use tokio::time::sleep;
use tracing::{Span, error, info, warn};

use super::vtube::{ProcessAction, run_process_action};
use super::{
    ACTION_ENTER_GAME_MODE, ACTION_EXIT_GAME_MODE, ACTION_NONE, ACTION_START_PROCESS,
    ACTION_STOP_PROCESS,
};
use crate::config::{DiscordConfig, RichPresenceConfig};
use crate::process::ProcessController;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscordAction {
    None,
    StartProcess,
    StopProcess,
    EnterGameMode,
    ExitGameMode,
    Unsupported(String),
}

impl DiscordAction {
    #[must_use]
    pub fn parse(action: &str) -> Self {
        match action {
            ACTION_NONE | "" => Self::None,
            ACTION_START_PROCESS => Self::StartProcess,
            ACTION_STOP_PROCESS => Self::StopProcess,
            ACTION_ENTER_GAME_MODE => Self::EnterGameMode,
            ACTION_EXIT_GAME_MODE => Self::ExitGameMode,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

/// Substitute `{game}` in a presence template.
fn fill(template: &str, game_name: &str) -> String {
    template.replace("{game}", game_name)
}

/// Presence shown while a game session is active.
#[must_use]
pub fn session_activity(
    status: &str,
    presence: Option<&RichPresenceConfig>,
    game_name: &str,
    started_at: i64,
) -> Activity {
    let Some(presence) = presence else {
        return Activity::with_state(fill(status, game_name));
    };

    Activity {
        details: presence.details.as_deref().map(|d| fill(d, game_name)),
        state: Some(
            presence
                .state
                .as_deref()
                .map_or_else(|| fill(status, game_name), |s| fill(s, game_name)),
        ),
        timestamps: presence.show_elapsed.then_some(ActivityTimestamps {
            start: Some(started_at),
        }),
        assets: presence.large_image.as_ref().map(|image| ActivityAssets {
            large_image: Some(image.clone()),
            large_text: Some(game_name.to_string()),
        }),
    }
}

pub struct DiscordAdapter {
    config: DiscordConfig,
    game_name: String,
    endpoints: Option<Vec<String>>,
    process: ProcessController,
    span: Span,
}

impl DiscordAdapter {
    #[must_use]
    pub fn new(
        config: DiscordConfig,
        game_name: impl Into<String>,
        process: ProcessController,
        span: Span,
    ) -> Self {
        Self {
            config,
            game_name: game_name.into(),
            endpoints: None,
            process: process.with_span(span.clone()),
            span,
        }
    }

    /// Override the IPC endpoints probed on connect.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    fn client(&self) -> DiscordClient {
        let mut settings = DiscordSettings::new(self.config.rpc.application_id.clone());
        if let Some(endpoints) = &self.endpoints {
            settings = settings.with_endpoints(endpoints.clone());
        }
        DiscordClient::new(settings, self.span.clone())
    }

    pub async fn enter(&self, action: &DiscordAction) -> bool {
        self.span.in_scope(|| info!("Entering game mode: {:?}", action));
        match action {
            DiscordAction::EnterGameMode => {
                let running = self.launch().await;
                let presence = self.update_presence(true).await;
                running && presence
            }
            other => self.perform(other).await,
        }
    }

    pub async fn exit(&self, action: &DiscordAction) -> bool {
        self.span.in_scope(|| info!("Exiting game mode: {:?}", action));
        match action {
            DiscordAction::ExitGameMode => {
                let presence = self.update_presence(false).await;
                if !self.config.stop_process_on_exit {
                    return presence;
                }
                let stopped = self.run_process(&ProcessAction::StopProcess).await;
                presence && stopped
            }
            other => self.perform(other).await,
        }
    }

    async fn perform(&self, action: &DiscordAction) -> bool {
        match action {
            DiscordAction::None => true,
            DiscordAction::StartProcess | DiscordAction::EnterGameMode => self.launch().await,
            DiscordAction::StopProcess | DiscordAction::ExitGameMode => {
                self.run_process(&ProcessAction::StopProcess).await
            }
            DiscordAction::Unsupported(name) => {
                self.span
                    .in_scope(|| warn!("Unsupported Discord action: {}", name));
                false
            }
        }
    }

    async fn run_process(&self, action: &ProcessAction) -> bool {
        run_process_action(&self.process, &self.config.process, action, "discord", &self.span)
            .await
    }

    /// Make sure Discord runs; after a fresh launch wait for its IPC endpoint.
    async fn launch(&self) -> bool {
        let settings = &self.config.process;
        if settings.has_process_name() && self.process.is_running(&settings.process_name) {
            self.span.in_scope(|| info!("Discord is already running"));
            return true;
        }
        if !settings.has_path() {
            self.span.in_scope(|| {
                warn!("Discord is not running and no path is configured to start it");
            });
            return false;
        }

        if self.process.launch(settings).is_err() {
            return false;
        }
        let delay = Duration::from_millis(self.config.startup_delay_ms);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        true
    }

    /// Set the session presence on entry, or the end status / cleared
    /// activity on exit. Skipped (successfully) when RPC is disabled.
    async fn update_presence(&self, active: bool) -> bool {
        if !self.config.rpc.enabled {
            return true;
        }
        if self.config.rpc.application_id.trim().is_empty() {
            self.span
                .in_scope(|| error!("Discord RPC is enabled but no applicationId is set"));
            return false;
        }

        let mut client = self.client();
        if let Err(e) = client.connect().await {
            self.span.in_scope(|| {
                if e.is_connectivity() {
                    error!("Cannot reach Discord IPC, is Discord running? {}", e);
                } else {
                    error!("Discord IPC handshake failed: {}", e);
                }
            });
            return false;
        }

        let result = if active {
            let activity = session_activity(
                &self.config.status_on_start,
                self.config.rich_presence.as_ref(),
                &self.game_name,
                chrono::Utc::now().timestamp(),
            );
            client.set_rich_presence(&activity).await
        } else if let Some(status) = &self.config.status_on_end {
            client.set_status(&fill(status, &self.game_name)).await
        } else {
            client.clear_activity().await
        };
        client.disconnect().await;

        match result {
            Ok(_) => true,
            Err(e) => {
                self.span.in_scope(|| {
                    if e.is_connectivity() {
                        error!("Discord closed the IPC connection during the update: {}", e);
                    } else {
                        error!("Discord presence update failed: {}", e);
                    }
                });
                false
            }
        }
    }
}
