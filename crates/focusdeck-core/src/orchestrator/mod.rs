//! Game-session orchestration.
//!
//! [`AppManager`] owns the session for the active game, resolves each item's
//! start or end action, and runs the startup and shutdown sequences. Items run
//! in session order; a failing item is logged and the sequence continues.

mod session;
mod tasks;

pub use session::{Session, SessionItem};
pub use tasks::{BackgroundTask, TaskArena, TaskState};

use std::time::Duration;

use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::config::{Config, GameConfig, IntegrationId, Phase};
use crate::integration::vtube::run_process_action;
use crate::integration::{
    ACTION_NONE, DiscordAdapter, Integration, ObsAction, ObsAdapter, ProcessAction,
    VTubeStudioAdapter,
};
use crate::process::ProcessController;
use crate::Result;

/// Background task name for the deferred replay-buffer start
pub const REPLAY_BUFFER_TASK: &str = "obs-replay-buffer";

pub struct AppManager {
    config: Config,
    game_id: Option<String>,
    session: Session,
    integrations: Vec<Integration>,
    process: ProcessController,
    tasks: TaskArena,
    span: Span,
}

impl AppManager {
    /// Manager with no active game.
    #[must_use]
    pub fn new(config: Config, process: ProcessController, span: Span) -> Self {
        Self {
            config,
            game_id: None,
            session: Session::default(),
            integrations: Vec::new(),
            process: process.with_span(span.clone()),
            tasks: TaskArena::new(info_span!(parent: &span, "tasks")),
            span,
        }
    }

    /// Manager with `game_id` already active.
    ///
    /// # Errors
    ///
    /// Returns `Error::GameNotFound` if the game is not configured.
    pub fn for_game(
        config: Config,
        game_id: &str,
        process: ProcessController,
        span: Span,
    ) -> Result<Self> {
        let mut manager = Self::new(config, process, span);
        manager.activate(game_id)?;
        Ok(manager)
    }

    /// Switch to another game. Outstanding background tasks from the previous
    /// game are drained first.
    ///
    /// # Errors
    ///
    /// Returns `Error::GameNotFound` if the game is not configured; the
    /// previous context is left cleared.
    pub async fn set_game(&mut self, game_id: &str) -> Result<()> {
        self.cleanup().await;
        self.game_id = None;
        self.session = Session::default();
        self.integrations.clear();
        self.activate(game_id)
    }

    fn activate(&mut self, game_id: &str) -> Result<()> {
        let game = self.config.game(game_id)?.clone();
        let session = Session::build(&self.config, &game);
        let integrations = self.build_integrations(&game, &session);

        self.span.in_scope(|| {
            info!(
                "Game context set to {} ({} items: {})",
                game_id,
                session.len(),
                session.ids().join(", ")
            );
        });

        self.game_id = Some(game_id.to_string());
        self.session = session;
        self.integrations = integrations;
        Ok(())
    }

    fn build_integrations(&self, game: &GameConfig, session: &Session) -> Vec<Integration> {
        let settings = &self.config.integrations;
        session
            .items()
            .iter()
            .filter_map(|item| match item {
                SessionItem::Integration(id) => Some(*id),
                SessionItem::App(_) => None,
            })
            .filter_map(|id| {
                let span = info_span!(parent: &self.span, "integration", id = id.as_str());
                let process = self.process.clone();
                match id {
                    IntegrationId::Obs => settings
                        .obs
                        .clone()
                        .map(|c| Integration::Obs(ObsAdapter::new(c, process, span))),
                    IntegrationId::Discord => settings.discord.clone().map(|c| {
                        Integration::Discord(DiscordAdapter::new(c, &game.name, process, span))
                    }),
                    IntegrationId::VTubeStudio => settings.vtube_studio.clone().map(|c| {
                        Integration::VTubeStudio(VTubeStudioAdapter::new(c.process, process, span))
                    }),
                }
            })
            .collect()
    }

    #[must_use]
    pub fn game_id(&self) -> Option<&str> {
        self.game_id.as_deref()
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Background tasks not yet drained
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Name and current state of each background task not yet drained
    #[must_use]
    pub fn task_states(&self) -> Vec<(String, TaskState)> {
        self.tasks.states()
    }

    /// Instantiated integration adapters for the active game
    pub fn integrations(&self) -> impl Iterator<Item = &Integration> {
        self.integrations.iter()
    }

    /// Configured action for a session item, `none` when absent.
    #[must_use]
    pub fn resolve_action(&self, id: &str, phase: Phase) -> String {
        let integration = IntegrationId::from_id(id)
            .filter(|i| self.session.items().contains(&SessionItem::Integration(*i)));

        let action = match integration {
            Some(i) => self.config.integrations.action(i, phase),
            None => self.config.managed_apps.get(id).and_then(|app| match phase {
                Phase::Start => app.game_start_action.as_deref(),
                Phase::End => app.game_end_action.as_deref(),
            }),
        };

        action
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(ACTION_NONE)
            .to_string()
    }

    /// Run every item's start action. The OBS replay-buffer start is handed to
    /// a background task instead of being awaited.
    pub async fn run_startup_sequence(&mut self) -> bool {
        let span = self.span.clone();
        self.run_sequence(Phase::Start).instrument(span).await
    }

    /// Drain background tasks, then run every item's end action.
    pub async fn run_shutdown_sequence(&mut self) -> bool {
        let span = self.span.clone();
        async {
            self.cleanup().await;
            self.run_sequence(Phase::End).await
        }
        .instrument(span)
        .await
    }

    /// Wait for outstanding background tasks, bounded by the configured task
    /// timeout, and discard them.
    pub async fn cleanup(&mut self) -> Vec<(String, TaskState)> {
        if self.tasks.is_empty() {
            return Vec::new();
        }
        let timeout = Duration::from_millis(self.config.orchestrator.background_task_timeout_ms);
        self.span.in_scope(|| {
            info!("Waiting for {} background task(s)", self.tasks.len());
        });
        self.tasks.drain(timeout).await
    }

    async fn run_sequence(&mut self, phase: Phase) -> bool {
        let Some(game_id) = self.game_id.clone() else {
            warn!("No game context set, nothing to run");
            return false;
        };
        let label = match phase {
            Phase::Start => "startup",
            Phase::End => "shutdown",
        };
        info!("Running {} sequence for {}", label, game_id);

        let items = self.session.items().to_vec();
        let mut all_ok = true;
        for item in &items {
            let action = self.resolve_action(item.id(), phase);
            let ok = match item {
                SessionItem::Integration(id) => self.run_integration(*id, phase, &action).await,
                SessionItem::App(id) => self.run_app(id, &action).await,
            };
            if !ok {
                error!("[{}] {} failed", item.id(), action);
            }
            all_ok &= ok;
        }

        if all_ok {
            info!("{} sequence for {} completed", label, game_id);
        } else {
            warn!("{} sequence for {} finished with failures", label, game_id);
        }
        all_ok
    }

    async fn run_app(&self, id: &str, action: &str) -> bool {
        let Some(app) = self.config.managed_apps.get(id) else {
            error!("[{}] Not a configured managed app", id);
            return false;
        };
        run_process_action(
            &self.process,
            &app.process,
            &ProcessAction::parse(action),
            id,
            &self.span,
        )
        .await
    }

    async fn run_integration(&mut self, id: IntegrationId, phase: Phase, action: &str) -> bool {
        let Some(integration) = self.integrations.iter().find(|i| i.id() == id) else {
            error!("[{}] Integration is not instantiated", id);
            return false;
        };

        if let (Integration::Obs(obs), Phase::Start) = (integration, phase)
            && ObsAction::parse(action) == ObsAction::EnterGameMode
            && obs.replay_buffer_enabled()
        {
            if !obs.launch() {
                return false;
            }
            let job = obs.replay_buffer_job();
            self.tasks.spawn(REPLAY_BUFFER_TASK, job);
            return true;
        }

        integration.run(phase, action).await
    }
}
