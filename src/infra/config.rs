//! Per-user configuration and catalog directory resolution.
//!
//! The `directories` crate resolves a per-user config directory
//! portably across platforms (`XDG_CONFIG_HOME` on Linux, the
//! equivalent on macOS/Windows). Holds two documents:
//! `preferences.toml` (defaults/notification settings) and
//! `schedules.json` (the schedule list), plus the path to the SQLite
//! catalog file that lives alongside them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::core::model::Schedule;

const QUALIFIER: &str = "";
const ORGANIZATION: &str = "snapkeep";
const APPLICATION: &str = "snapkeep";

/// Resolve (and create) the per-user config directory.
pub fn config_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .context("could not determine a per-user config directory on this platform")?;
    let dir = dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    Ok(dir)
}

/// Path to the embedded SQLite catalog file, alongside the config
/// documents.
pub fn catalog_db_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("catalog.sqlite3"))
}

fn preferences_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("preferences.toml"))
}

fn schedules_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("schedules.json"))
}

/// User preferences: last-used source/destination/mode and notification
/// settings, persisted as a TOML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub last_source: Option<PathBuf>,
    #[serde(default)]
    pub last_destination: Option<PathBuf>,
    #[serde(default = "default_mode")]
    pub last_mode: String,
    #[serde(default = "default_true")]
    pub notify_on_completion: bool,
    #[serde(default)]
    pub notify_on_error: bool,
}

fn default_mode() -> String {
    "full".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            last_source: None,
            last_destination: None,
            last_mode: default_mode(),
            notify_on_completion: true,
            notify_on_error: false,
        }
    }
}

/// Load preferences from disk, falling back to defaults when the file
/// does not exist yet (first run).
pub fn load_preferences() -> Result<Preferences> {
    let path = preferences_path()?;
    if !path.exists() {
        return Ok(Preferences::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_preferences(prefs: &Preferences) -> Result<()> {
    let path = preferences_path()?;
    let text = toml::to_string_pretty(prefs).context("failed to serialize preferences")?;
    std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Load the schedules document, defaulting to an empty list on first run.
pub fn load_schedules() -> Result<Vec<Schedule>> {
    let path = schedules_path()?;
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_schedules(schedules: &[Schedule]) -> Result<()> {
    let path = schedules_path()?;
    let text = serde_json::to_string_pretty(schedules).context("failed to serialize schedules")?;
    std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Write out an initial `preferences.toml` if one does not already exist
/// (or unconditionally, when `force` is set). Used by the `init` CLI
/// subcommand.
pub fn init(path: &Path, force: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let target = path.join("preferences.toml");
    if target.exists() && !force {
        anyhow::bail!(
            "preferences file already exists at {}. Use --force to overwrite.",
            target.display()
        );
    }
    let prefs = Preferences::default();
    let text = toml::to_string_pretty(&prefs).context("failed to serialize default preferences")?;
    std::fs::write(&target, text).with_context(|| format!("failed to write {}", target.display()))?;
    Ok(target)
}
