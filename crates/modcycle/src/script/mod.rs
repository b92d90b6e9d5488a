//! Script Modules
//!
//! Init scripts run as the init hook of the script module. The engine that
//! executes them sits behind the `ScriptEngine` trait; QuickJS is provided by
//! the `quickjs` feature.

use std::sync::Arc;

mod engine;
mod module;
#[cfg(feature = "quickjs")]
mod quickjs;

pub use engine::*;
pub use module::*;
#[cfg(feature = "quickjs")]
pub use quickjs::*;

/// Engine compiled into this build
pub fn default_engine() -> Arc<dyn ScriptEngine> {
    #[cfg(feature = "quickjs")]
    {
        Arc::new(QuickJsEngine::new())
    }
    #[cfg(not(feature = "quickjs"))]
    {
        Arc::new(NoScriptEngine)
    }
}
