//! Config validation - unknown-field warnings and per-game sanity checks

use super::settings::{Config, IntegrationId, Phase, ProcessSettings};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    for path in unknown_fields(content) {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Paths of fields the config schema doesn't know about.
#[must_use]
pub fn unknown_fields(content: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };
    find_unknown_keys(&value, &expected_config_keys(), "")
}

fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(entry) = &expected.entries {
            unknowns.extend(find_unknown_keys(child, entry, &path));
        } else if let Some(nested) = expected.nested.get(key.as_str()) {
            unknowns.extend(find_unknown_keys(child, nested, &path));
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

/// Expected keys for a config section.
/// `entries` marks an id-keyed map whose values all share one shape.
struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
    entries: Option<Box<ExpectedKeys>>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
            entries: None,
        }
    }

    fn map_of(entry: ExpectedKeys) -> Self {
        Self {
            entries: Some(Box::new(entry)),
            ..Self::new(&[])
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }
}

const PROCESS_KEYS: [&str; 5] = [
    "path",
    "arguments",
    "processName",
    "terminationMethod",
    "gracefulTimeoutMs",
];

fn process_section(extra: &[&'static str]) -> ExpectedKeys {
    let mut fields: Vec<&'static str> = PROCESS_KEYS.to_vec();
    fields.extend_from_slice(&["gameStartAction", "gameEndAction"]);
    fields.extend_from_slice(extra);
    ExpectedKeys::new(&fields)
}

fn expected_config_keys() -> ExpectedKeys {
    let obs = process_section(&["enabled", "replayBuffer", "startupDelayMs"]).with_nested(
        "websocket",
        ExpectedKeys::new(&["host", "port", "password"]),
    );

    let discord = process_section(&[
        "enabled",
        "statusOnStart",
        "statusOnEnd",
        "startupDelayMs",
        "stopProcessOnExit",
    ])
    .with_nested("rpc", ExpectedKeys::new(&["enabled", "applicationId"]))
    .with_nested(
        "richPresence",
        ExpectedKeys::new(&["details", "state", "largeImage", "showElapsed"]),
    );

    let integrations = ExpectedKeys::new(&[])
        .with_nested("obs", obs)
        .with_nested("discord", discord)
        .with_nested("vtubeStudio", process_section(&["enabled"]));

    let game = ExpectedKeys::new(&["name", "processName", "appsToManage"]).with_nested(
        "integrations",
        ExpectedKeys::new(&["useOBS", "useDiscord", "useVTubeStudio"]),
    );

    let orchestrator = ExpectedKeys::new(&[
        "backgroundTaskTimeoutMs",
        "gameStartTimeoutMs",
        "gamePollIntervalMs",
    ]);

    ExpectedKeys::new(&[])
        .with_nested("managedApps", ExpectedKeys::map_of(process_section(&[])))
        .with_nested("integrations", integrations)
        .with_nested("games", ExpectedKeys::map_of(game))
        .with_nested("orchestrator", orchestrator)
}

/// Actions that may launch the executable
const NEEDS_PATH: [&str; 2] = ["start-process", "enter-game-mode"];

/// Actions that need a process name to find the running instance
const NEEDS_PROCESS_NAME: [&str; 3] = ["stop-process", "exit-game-mode", "enter-game-mode"];

/// Check a game's references and actions, returning human-readable problems.
/// An empty list means the game can be orchestrated as configured.
#[must_use]
pub fn validate_game(config: &Config, game_id: &str) -> Vec<String> {
    let Some(game) = config.games.get(game_id) else {
        return vec![format!("game '{game_id}' is not defined")];
    };

    let mut issues = Vec::new();

    if game.process_name.trim().is_empty() {
        issues.push(format!("game '{game_id}' has no processName"));
    }

    for app_id in &game.apps_to_manage {
        let Some(app) = config.managed_apps.get(app_id) else {
            issues.push(format!("managed app '{app_id}' is not defined"));
            continue;
        };
        check_actions(
            app_id,
            &app.process,
            [app.game_start_action.as_deref(), app.game_end_action.as_deref()],
            &mut issues,
        );
    }

    for id in IntegrationId::ALL {
        if !game.integrations.uses(id) {
            continue;
        }
        let Some(process) = integration_process(config, id) else {
            issues.push(format!(
                "integration '{id}' is enabled for the game but not configured"
            ));
            continue;
        };
        check_actions(
            id.as_str(),
            process,
            [
                config.integrations.action(id, Phase::Start),
                config.integrations.action(id, Phase::End),
            ],
            &mut issues,
        );
    }

    if game.integrations.use_discord
        && let Some(discord) = &config.integrations.discord
        && discord.rpc.enabled
        && discord.rpc.application_id.trim().is_empty()
    {
        issues.push("discord rpc is enabled without an applicationId".to_string());
    }

    issues
}

fn integration_process(config: &Config, id: IntegrationId) -> Option<&ProcessSettings> {
    if !config.integrations.is_configured(id) {
        return None;
    }
    match id {
        IntegrationId::Obs => config.integrations.obs.as_ref().map(|c| &c.process),
        IntegrationId::Discord => config.integrations.discord.as_ref().map(|c| &c.process),
        IntegrationId::VTubeStudio => config.integrations.vtube_studio.as_ref().map(|c| &c.process),
    }
}

fn check_actions(
    id: &str,
    process: &ProcessSettings,
    actions: [Option<&str>; 2],
    issues: &mut Vec<String>,
) {
    if let Err(e) = process.args() {
        issues.push(format!("'{id}': {e}"));
    }
    for action in actions.into_iter().flatten() {
        if NEEDS_PATH.contains(&action) && !process.has_path() {
            issues.push(format!("'{id}' uses '{action}' but has no path"));
        }
        if NEEDS_PROCESS_NAME.contains(&action) && !process.has_process_name() {
            issues.push(format!("'{id}' uses '{action}' but has no processName"));
        }
    }
}
