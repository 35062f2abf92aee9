//! VTube Studio adapter (process control only)

use tracing::{Span, info, warn};

use super::{
    ACTION_ENTER_GAME_MODE, ACTION_EXIT_GAME_MODE, ACTION_NONE, ACTION_START_PROCESS,
    ACTION_STOP_PROCESS,
};
use crate::config::ProcessSettings;
use crate::process::ProcessController;

/// Actions available to process-only items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessAction {
    None,
    StartProcess,
    StopProcess,
    Unsupported(String),
}

impl ProcessAction {
    /// `enter-game-mode` / `exit-game-mode` map to start / stop for
    /// integrations without a control protocol.
    #[must_use]
    pub fn parse(action: &str) -> Self {
        match action {
            ACTION_NONE | "" => Self::None,
            ACTION_START_PROCESS | ACTION_ENTER_GAME_MODE => Self::StartProcess,
            ACTION_STOP_PROCESS | ACTION_EXIT_GAME_MODE => Self::StopProcess,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

/// Start or stop the process described by `settings`.
pub(crate) async fn run_process_action(
    process: &ProcessController,
    settings: &ProcessSettings,
    action: &ProcessAction,
    id: &str,
    span: &Span,
) -> bool {
    match action {
        ProcessAction::None => true,
        ProcessAction::StartProcess => process.ensure_running(settings),
        ProcessAction::StopProcess => {
            if !settings.has_process_name() {
                span.in_scope(|| warn!("[{}] stop-process needs a processName", id));
                return false;
            }
            process
                .stop(
                    &settings.process_name,
                    settings.termination_method,
                    settings.graceful_timeout(),
                )
                .await
                .is_success()
        }
        ProcessAction::Unsupported(name) => {
            span.in_scope(|| warn!("[{}] Unsupported action: {}", id, name));
            false
        }
    }
}

pub struct VTubeStudioAdapter {
    settings: ProcessSettings,
    process: ProcessController,
    span: Span,
}

impl VTubeStudioAdapter {
    #[must_use]
    pub fn new(settings: ProcessSettings, process: ProcessController, span: Span) -> Self {
        Self {
            settings,
            process: process.with_span(span.clone()),
            span,
        }
    }

    pub async fn enter(&self, action: &ProcessAction) -> bool {
        self.span.in_scope(|| info!("Entering game mode: {:?}", action));
        run_process_action(&self.process, &self.settings, action, "vtubeStudio", &self.span).await
    }

    pub async fn exit(&self, action: &ProcessAction) -> bool {
        self.span.in_scope(|| info!("Exiting game mode: {:?}", action));
        run_process_action(&self.process, &self.settings, action, "vtubeStudio", &self.span).await
    }
}
