//! Integration adapters.
//!
//! Each adapter turns a symbolic start/end action from the config into
//! process control and protocol calls. Failures never cross the adapter
//! boundary: every call returns `false` and logs why.
//!
//! - [`obs`]: OBS Studio, process control plus obs-websocket requests
//! - [`discord`]: Discord, process control plus IPC presence updates
//! - [`vtube`]: VTube Studio, process control only

pub mod discord;
pub mod obs;
pub mod vtube;

pub use discord::{DiscordAction, DiscordAdapter};
pub use obs::{ObsAction, ObsAdapter};
pub use vtube::{ProcessAction, VTubeStudioAdapter};

use crate::config::{IntegrationId, Phase};

pub const ACTION_NONE: &str = "none";
pub const ACTION_START_PROCESS: &str = "start-process";
pub const ACTION_STOP_PROCESS: &str = "stop-process";
pub const ACTION_ENTER_GAME_MODE: &str = "enter-game-mode";
pub const ACTION_EXIT_GAME_MODE: &str = "exit-game-mode";
pub const ACTION_START_REPLAY_BUFFER: &str = "start-replay-buffer";
pub const ACTION_STOP_REPLAY_BUFFER: &str = "stop-replay-buffer";

/// An instantiated integration for the active game
pub enum Integration {
    Obs(ObsAdapter),
    Discord(DiscordAdapter),
    VTubeStudio(VTubeStudioAdapter),
}

impl Integration {
    #[must_use]
    pub fn id(&self) -> IntegrationId {
        match self {
            Self::Obs(_) => IntegrationId::Obs,
            Self::Discord(_) => IntegrationId::Discord,
            Self::VTubeStudio(_) => IntegrationId::VTubeStudio,
        }
    }

    /// Run `action` inline for the given phase.
    pub async fn run(&self, phase: Phase, action: &str) -> bool {
        match (self, phase) {
            (Self::Obs(a), Phase::Start) => a.enter(&ObsAction::parse(action)).await,
            (Self::Obs(a), Phase::End) => a.exit(&ObsAction::parse(action)).await,
            (Self::Discord(a), Phase::Start) => a.enter(&DiscordAction::parse(action)).await,
            (Self::Discord(a), Phase::End) => a.exit(&DiscordAction::parse(action)).await,
            (Self::VTubeStudio(a), Phase::Start) => a.enter(&ProcessAction::parse(action)).await,
            (Self::VTubeStudio(a), Phase::End) => a.exit(&ProcessAction::parse(action)).await,
        }
    }
}
