//! User preferences and environment file location
//!
//! Preferences are read from `~/.houdini-manage.ini`:
//!
//! ```text
//! [houdini-manage]
//! houdinienv = houdini16.0
//! ```
//!
//! `houdinienv` is either a Houdini version name, resolved to
//! `~/Documents/<version>/houdini.env`, or a path to an env file.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

pub const PREFERENCES_FILE: &str = ".houdini-manage.ini";
pub const DEFAULT_HOUDINI_ENV: &str = "houdini16.0";
pub const ENVFILE_NAME: &str = "houdini.env";

/// Values of the `[houdini-manage]` section
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Preferences {
    /// Houdini version name or env file path used when none is given
    #[serde(default)]
    pub houdinienv: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PreferencesFile {
    #[serde(rename = "houdini-manage", default)]
    section: Preferences,
}

impl Preferences {
    /// `~/.houdini-manage.ini`, if the home directory is known
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(PREFERENCES_FILE))
    }

    /// Load preferences from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load preferences from an INI file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini).required(false))
            .build()
            .with_context(|| format!("Failed to read preferences: {}", path.display()))?;
        let prefs = Self::from_config(settings)?;
        debug!(path = %path.display(), ?prefs, "loaded preferences");
        Ok(prefs)
    }

    /// Parse preferences from INI text
    pub fn from_ini_str(content: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(content, FileFormat::Ini))
            .build()
            .context("Failed to parse preferences")?;
        Self::from_config(settings)
    }

    fn from_config(settings: Config) -> Result<Self> {
        let file: PreferencesFile = settings
            .try_deserialize()
            .context("Invalid [houdini-manage] preferences")?;
        Ok(file.section)
    }

    /// Configured Houdini env selector, or the built-in default
    pub fn houdini_env(&self) -> &str {
        self.houdinienv.as_deref().unwrap_or(DEFAULT_HOUDINI_ENV)
    }
}

/// Resolve the env file to edit
///
/// `hou` falls back to the preferences. A value without a path separator is a
/// Houdini version name looked up under the user's `Documents` directory.
pub fn resolve_envfile_path(hou: Option<&str>, prefs: &Preferences) -> Result<PathBuf> {
    let hou = hou.unwrap_or_else(|| prefs.houdini_env());
    if is_path_like(hou) {
        return Ok(normalize_path(Path::new(hou)));
    }
    let home = dirs::home_dir().context("Cannot determine the home directory")?;
    Ok(envfile_path_in(&home, hou))
}

/// `<home>/Documents/<version>/houdini.env`
pub fn envfile_path_in(home: &Path, version: &str) -> PathBuf {
    normalize_path(&home.join("Documents").join(version).join(ENVFILE_NAME))
}

fn is_path_like(value: &str) -> bool {
    value.contains('/') || value.contains(std::path::MAIN_SEPARATOR)
}

/// Lexically remove `.` and `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
