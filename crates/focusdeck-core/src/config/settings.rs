use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub managed_apps: HashMap<String, ManagedApp>,

    #[serde(default)]
    pub integrations: IntegrationsConfig,

    #[serde(default)]
    pub games: HashMap<String, GameConfig>,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Load config from file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse config from a JSON string, warning about unknown fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid config JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        super::validation::warn_unknown_fields(content, "config.json");
        let config = serde_json::from_str(content)?;
        Ok(config)
    }

    /// Save config to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Look up a game by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::GameNotFound` if no game has this id.
    pub fn game(&self, game_id: &str) -> Result<&GameConfig> {
        self.games
            .get(game_id)
            .ok_or_else(|| Error::GameNotFound(game_id.to_string()))
    }

    /// Problems that would stop a game from being orchestrated as configured.
    #[must_use]
    pub fn validate_game(&self, game_id: &str) -> Vec<String> {
        super::validation::validate_game(self, game_id)
    }

    /// Whether an integration is usable for a game: the game opts in and the
    /// global section exists and is enabled.
    #[must_use]
    pub fn integration_enabled(&self, game: &GameConfig, id: IntegrationId) -> bool {
        game.integrations.uses(id) && self.integrations.is_configured(id)
    }
}

/// How a running process is asked to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationMethod {
    /// Close request, then wait up to the graceful timeout
    Graceful,
    /// Immediate kill
    Force,
    /// Graceful, falling back to force
    #[default]
    Auto,
}

impl std::fmt::Display for TerminationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Graceful => write!(f, "graceful"),
            Self::Force => write!(f, "force"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

fn default_graceful_timeout() -> u64 {
    3000
}

/// Executable and process-matching settings shared by apps and integrations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSettings {
    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,

    /// One or more process names separated by `|`
    #[serde(default)]
    pub process_name: String,

    #[serde(default)]
    pub termination_method: TerminationMethod,

    #[serde(default = "default_graceful_timeout")]
    pub graceful_timeout_ms: u64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            arguments: None,
            process_name: String::new(),
            termination_method: TerminationMethod::default(),
            graceful_timeout_ms: default_graceful_timeout(),
        }
    }
}

impl ProcessSettings {
    /// Individual process-name patterns from the alternation list.
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        split_patterns(&self.process_name)
    }

    /// Arguments split with shell quoting rules, so `"Game Scene"` stays one
    /// argument.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the argument string does not parse, for
    /// example on an unbalanced quote.
    pub fn args(&self) -> Result<Vec<String>> {
        let Some(arguments) = self.arguments.as_deref() else {
            return Ok(Vec::new());
        };
        shell_words::split(arguments)
            .map_err(|e| Error::Config(format!("invalid arguments `{arguments}`: {e}")))
    }

    #[must_use]
    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }

    #[must_use]
    pub fn has_path(&self) -> bool {
        !self.path.trim().is_empty()
    }

    #[must_use]
    pub fn has_process_name(&self) -> bool {
        !self.patterns().is_empty()
    }
}

/// Split a `|`-separated process-name list, dropping empty entries.
#[must_use]
pub fn split_patterns(pattern: &str) -> Vec<&str> {
    pattern
        .split('|')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// An application managed by process start/stop only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedApp {
    #[serde(flatten)]
    pub process: ProcessSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_start_action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_end_action: Option<String>,
}

/// Integration identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrationId {
    Obs,
    Discord,
    VTubeStudio,
}

impl IntegrationId {
    /// Order in which enabled integrations join a session
    pub const ALL: [IntegrationId; 3] = [Self::Obs, Self::Discord, Self::VTubeStudio];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Obs => "obs",
            Self::Discord => "discord",
            Self::VTubeStudio => "vtubeStudio",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_str() == id)
    }
}

impl std::fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global integration sections. A missing section disables the integration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs: Option<ObsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<DiscordConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vtube_studio: Option<VTubeStudioConfig>,
}

impl IntegrationsConfig {
    #[must_use]
    pub fn is_configured(&self, id: IntegrationId) -> bool {
        match id {
            IntegrationId::Obs => self.obs.as_ref().is_some_and(|c| c.enabled),
            IntegrationId::Discord => self.discord.as_ref().is_some_and(|c| c.enabled),
            IntegrationId::VTubeStudio => self.vtube_studio.as_ref().is_some_and(|c| c.enabled),
        }
    }

    /// Configured start or end action for an integration
    #[must_use]
    pub fn action(&self, id: IntegrationId, phase: Phase) -> Option<&str> {
        let (start, end) = match id {
            IntegrationId::Obs => self
                .obs
                .as_ref()
                .map(|c| (&c.game_start_action, &c.game_end_action))?,
            IntegrationId::Discord => self
                .discord
                .as_ref()
                .map(|c| (&c.game_start_action, &c.game_end_action))?,
            IntegrationId::VTubeStudio => self
                .vtube_studio
                .as_ref()
                .map(|c| (&c.game_start_action, &c.game_end_action))?,
        };
        match phase {
            Phase::Start => start.as_deref(),
            Phase::End => end.as_deref(),
        }
    }
}

/// Which half of the session an action belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    End,
}

fn default_true() -> bool {
    true
}

fn default_ws_host() -> String {
    focusdeck_protocol::obs::DEFAULT_HOST.to_string()
}

fn default_ws_port() -> u16 {
    focusdeck_protocol::obs::DEFAULT_PORT
}

fn default_obs_startup_delay() -> u64 {
    3000
}

/// obs-websocket endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketConfig {
    #[serde(default = "default_ws_host")]
    pub host: String,

    #[serde(default = "default_ws_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: default_ws_host(),
            port: default_ws_port(),
            password: None,
        }
    }
}

/// OBS integration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(flatten)]
    pub process: ProcessSettings,

    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Toggle the replay buffer around the game session
    #[serde(default)]
    pub replay_buffer: bool,

    /// Grace period between launching OBS and connecting to it
    #[serde(default = "default_obs_startup_delay")]
    pub startup_delay_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_start_action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_end_action: Option<String>,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            process: ProcessSettings::default(),
            websocket: WebSocketConfig::default(),
            replay_buffer: false,
            startup_delay_ms: default_obs_startup_delay(),
            game_start_action: None,
            game_end_action: None,
        }
    }
}

/// Discord RPC application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub application_id: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            application_id: String::new(),
        }
    }
}

/// Rich presence template. `{game}` is replaced with the game's name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichPresenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,

    #[serde(default = "default_true")]
    pub show_elapsed: bool,
}

fn default_discord_startup_delay() -> u64 {
    3000
}

fn default_status_on_start() -> String {
    "In game".to_string()
}

/// Discord integration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(flatten)]
    pub process: ProcessSettings,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default = "default_status_on_start")]
    pub status_on_start: String,

    /// Status left behind on exit; the activity is cleared when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_on_end: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_presence: Option<RichPresenceConfig>,

    /// Wait after launching Discord before connecting to its IPC endpoint
    #[serde(default = "default_discord_startup_delay")]
    pub startup_delay_ms: u64,

    #[serde(default)]
    pub stop_process_on_exit: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_start_action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_end_action: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            process: ProcessSettings::default(),
            rpc: RpcConfig::default(),
            status_on_start: default_status_on_start(),
            status_on_end: None,
            rich_presence: None,
            startup_delay_ms: default_discord_startup_delay(),
            stop_process_on_exit: false,
            game_start_action: None,
            game_end_action: None,
        }
    }
}

/// VTube Studio integration section (process control only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VTubeStudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(flatten)]
    pub process: ProcessSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_start_action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_end_action: Option<String>,
}

impl Default for VTubeStudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            process: ProcessSettings::default(),
            game_start_action: None,
            game_end_action: None,
        }
    }
}

/// A game and the environment it needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    #[serde(default)]
    pub name: String,

    /// Game process name(s), used to wait for the game to exit
    #[serde(default)]
    pub process_name: String,

    /// Managed app ids, in startup order
    #[serde(default)]
    pub apps_to_manage: Vec<String>,

    #[serde(default)]
    pub integrations: GameIntegrations,
}

/// Per-game integration opt-ins
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GameIntegrations {
    #[serde(default, rename = "useOBS")]
    pub use_obs: bool,

    #[serde(default, rename = "useDiscord")]
    pub use_discord: bool,

    #[serde(default, rename = "useVTubeStudio")]
    pub use_vtube_studio: bool,
}

impl GameIntegrations {
    #[must_use]
    pub fn uses(&self, id: IntegrationId) -> bool {
        match id {
            IntegrationId::Obs => self.use_obs,
            IntegrationId::Discord => self.use_discord,
            IntegrationId::VTubeStudio => self.use_vtube_studio,
        }
    }
}

fn default_task_timeout() -> u64 {
    10_000
}
fn default_game_start_timeout() -> u64 {
    300_000
}
fn default_game_poll_interval() -> u64 {
    2000
}

/// Orchestrator timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// How long shutdown waits for each outstanding background task
    #[serde(default = "default_task_timeout")]
    pub background_task_timeout_ms: u64,

    /// How long `run` waits for the game process to appear
    #[serde(default = "default_game_start_timeout")]
    pub game_start_timeout_ms: u64,

    #[serde(default = "default_game_poll_interval")]
    pub game_poll_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            background_task_timeout_ms: default_task_timeout(),
            game_start_timeout_ms: default_game_start_timeout(),
            game_poll_interval_ms: default_game_poll_interval(),
        }
    }
}
