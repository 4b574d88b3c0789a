// ABOUTME: XDG Base Directory paths for the abot configuration file
// ABOUTME: Falls back to the current directory when no home directory is known

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "abot";
const APPLICATION: &str = "abot";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Config directory (e.g., ~/.config/abot/), or "." if unavailable
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default config file, e.g. ~/.config/abot/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
