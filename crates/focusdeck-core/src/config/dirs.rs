use directories::ProjectDirs;
use std::path::PathBuf;

/// Application directories following the XDG base directory layout
#[derive(Debug, Clone)]
pub struct Directories {
    /// Log directory (~/.local/share/focusdeck/logs)
    pub logs: PathBuf,

    /// Config file path (~/.config/focusdeck/config.json)
    pub config_file: PathBuf,
}

impl Directories {
    /// Standard per-user paths, or `None` when no home directory is known.
    #[must_use]
    pub fn new() -> Option<Self> {
        let project = ProjectDirs::from("", "", "focusdeck")?;

        Some(Self {
            config_file: project.config_dir().join("config.json"),
            logs: project.data_dir().join("logs"),
        })
    }
}
