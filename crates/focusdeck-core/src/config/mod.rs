mod dirs;
mod settings;
mod validation;

pub use dirs::Directories;
pub use settings::{
    Config, DiscordConfig, GameConfig, GameIntegrations, IntegrationId, IntegrationsConfig,
    ManagedApp, ObsConfig, OrchestratorConfig, Phase, ProcessSettings, RichPresenceConfig,
    RpcConfig, TerminationMethod, VTubeStudioConfig, WebSocketConfig, split_patterns,
};
pub use validation::{unknown_fields, validate_game, warn_unknown_fields};
