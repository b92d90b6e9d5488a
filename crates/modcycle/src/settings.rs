//! Settings File
//!
//! Defines the structure of `modcycle.toml` and loads it from disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use module_runtime::DEFAULT_DYNAMIC_BUDGET;

use crate::script::ScriptSource;

/// Error type for settings loading
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Only one of script.init and script.init_file may be set")]
    ConflictingScript,
}

/// Settings file (modcycle.toml)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    /// Modules admitted on top of the built-in set, in file order
    #[serde(default)]
    pub load_module: Vec<LoadModuleSettings>,
    #[serde(default)]
    pub script: ScriptSettings,
}

/// Process-wide limits, fixed by the first generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_dynamic_budget")]
    pub dynamic_budget: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            dynamic_budget: default_dynamic_budget(),
        }
    }
}

fn default_dynamic_budget() -> usize {
    DEFAULT_DYNAMIC_BUDGET
}

/// One `[[load_module]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadModuleSettings {
    pub name: String,
    /// Loaded modules this one has to precede
    #[serde(default)]
    pub before: Vec<String>,
}

/// Init script run once every generation is set up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptSettings {
    pub init: Option<String>,
    pub init_file: Option<PathBuf>,
}

impl ScriptSettings {
    pub fn source(&self) -> Option<ScriptSource> {
        match (&self.init, &self.init_file) {
            (Some(code), _) => Some(ScriptSource::Inline(code.clone())),
            (None, Some(path)) => Some(ScriptSource::File(path.clone())),
            (None, None) => None,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        if settings.script.init.is_some() && settings.script.init_file.is_some() {
            return Err(SettingsError::ConflictingScript);
        }
        Ok(settings)
    }

    /// Load settings from a file
    ///
    /// A relative `script.init_file` is resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut settings = Self::parse(&content)?;
        if let (Some(file), Some(dir)) = (&settings.script.init_file, path.parent()) {
            if file.is_relative() {
                settings.script.init_file = Some(dir.join(file));
            }
        }

        info!(
            "Loaded settings from {} ({} modules to load)",
            path.display(),
            settings.load_module.len()
        );
        Ok(settings)
    }
}
