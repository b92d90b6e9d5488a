// Module Categories
//
// Every module belongs to exactly one category. The category decides which
// hook contract the module implements and which config-context array its
// category slot indexes into.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kinds of modules known to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCategory {
    /// Top-level modules; their config lives in the flat array indexed by global index
    Core,
    /// Configuration-language modules (no config block of their own)
    Conf,
    /// Event loop backends
    Event,
    /// HTTP protocol modules
    Http,
    /// TCP/UDP stream proxy modules
    Stream,
    /// Mail proxy modules
    Mail,
}

impl ModuleCategory {
    /// All categories, in the order the runtime sets them up
    pub const ALL: [ModuleCategory; 6] = [
        ModuleCategory::Core,
        ModuleCategory::Conf,
        ModuleCategory::Event,
        ModuleCategory::Http,
        ModuleCategory::Stream,
        ModuleCategory::Mail,
    ];

    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleCategory::Core => "core",
            ModuleCategory::Conf => "conf",
            ModuleCategory::Event => "event",
            ModuleCategory::Http => "http",
            ModuleCategory::Stream => "stream",
            ModuleCategory::Mail => "mail",
        }
    }
}

impl std::fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an unknown category name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown module category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for ModuleCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
