//! The ordered item list for one game context

use std::collections::HashSet;

use crate::config::{Config, GameConfig, IntegrationId};

/// One entry of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionItem {
    /// A managed app id from `managedApps`
    App(String),
    Integration(IntegrationId),
}

impl SessionItem {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::App(id) => id,
            Self::Integration(id) => id.as_str(),
        }
    }
}

/// Apps and integrations for the active game, in execution order
#[derive(Debug, Clone, Default)]
pub struct Session {
    items: Vec<SessionItem>,
}

impl Session {
    /// The game's app list followed by its enabled integrations. Duplicate
    /// ids collapse onto their first occurrence. An app id naming an enabled
    /// integration becomes that integration.
    #[must_use]
    pub fn build(config: &Config, game: &GameConfig) -> Self {
        let enabled: Vec<IntegrationId> = IntegrationId::ALL
            .into_iter()
            .filter(|id| config.integration_enabled(game, *id))
            .collect();

        let candidates = game
            .apps_to_manage
            .iter()
            .map(|app| match IntegrationId::from_id(app) {
                Some(id) if enabled.contains(&id) => SessionItem::Integration(id),
                _ => SessionItem::App(app.clone()),
            })
            .chain(enabled.iter().copied().map(SessionItem::Integration));

        let mut seen = HashSet::new();
        let items = candidates
            .filter(|item| seen.insert(item.id().to_string()))
            .collect();

        Self { items }
    }

    #[must_use]
    pub fn items(&self) -> &[SessionItem] {
        &self.items
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(SessionItem::id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
