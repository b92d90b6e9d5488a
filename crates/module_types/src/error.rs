// Errors raised while a generation is being constructed or read

use crate::{AbiMismatch, ModuleCategory};

// ─────────────────────────────────────────────────────────────────────────────
// Hook Error
// ─────────────────────────────────────────────────────────────────────────────

/// Failure reported by a module's own hook
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

impl From<String> for HookError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

impl From<&str> for HookError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

impl From<CycleError> for HookError {
    fn from(err: CycleError) -> Self {
        Self(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cycle Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from building or reading a generation
///
/// Every construction error is fatal to the generation being built; the
/// caller discards it and decides whether the previous one keeps serving.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("Too many modules loaded: cannot admit \"{module}\" (max {max_modules})")]
    CapacityExceeded { module: String, max_modules: usize },

    #[error("Module \"{module}\" {mismatch}")]
    AbiMismatch {
        module: String,
        mismatch: AbiMismatch,
    },

    #[error("Module \"{module}\" is already loaded")]
    DuplicateName { module: String },

    #[error("Module \"{module}\" carries index {index}, already held by \"{holder}\"")]
    IndexInUse {
        module: String,
        holder: String,
        index: usize,
    },

    #[error("Module \"{module}\" carries {category} slot {slot}, already held by \"{holder}\"")]
    SlotInUse {
        module: String,
        holder: String,
        category: ModuleCategory,
        slot: usize,
    },

    #[error("Module \"{module}\" cannot be loaded: {category} modules are already indexed")]
    CategorySealed {
        module: String,
        category: ModuleCategory,
    },

    #[error("Failed to create config for {category} module \"{module}\": {reason}")]
    ConfigCreationFailed {
        module: String,
        category: ModuleCategory,
        reason: String,
    },

    #[error("Init hook of module \"{module}\" failed: {reason}")]
    InitHookFailed { module: String, reason: String },

    #[error("No {category} config at slot {slot}")]
    SlotNotPopulated {
        category: ModuleCategory,
        slot: usize,
    },

    #[error("Module \"{module}\" has no index assigned in this generation")]
    Unindexed { module: String },

    #[error("Module \"{module}\" is not part of this generation")]
    UnknownModule { module: String },

    #[error("Config of module \"{module}\" is {actual}, not {expected}")]
    ConfigTypeMismatch {
        module: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl CycleError {
    /// Name of the module the error is about, if any
    pub fn module(&self) -> Option<&str> {
        match self {
            CycleError::CapacityExceeded { module, .. }
            | CycleError::AbiMismatch { module, .. }
            | CycleError::DuplicateName { module }
            | CycleError::IndexInUse { module, .. }
            | CycleError::SlotInUse { module, .. }
            | CycleError::CategorySealed { module, .. }
            | CycleError::ConfigCreationFailed { module, .. }
            | CycleError::InitHookFailed { module, .. }
            | CycleError::Unindexed { module }
            | CycleError::UnknownModule { module }
            | CycleError::ConfigTypeMismatch { module, .. } => Some(module),
            CycleError::SlotNotPopulated { .. } => None,
        }
    }
}

pub type CycleResult<T> = Result<T, CycleError>;
