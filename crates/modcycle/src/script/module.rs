// Script Module - Runs the configured init script once per generation
//
// The script source is a directive: the host sets it before each generation is
// built, the module copies it into its main config, and the init hook runs
// whatever that config holds. A descriptor reused across generations therefore
// always runs the script of the generation it is part of.

use std::sync::Arc;

use module_runtime::{ModuleDescriptor, ScopedContext};
use module_types::ConfigBlock;
use parking_lot::RwLock;
use tracing::debug;

use super::{ScriptEngine, ScriptSource, run_script};

/// Name of the script module
pub const SCRIPT_MODULE: &str = "http_script";

/// Pending `script` directive for the next generation
#[derive(Debug, Clone, Default)]
pub struct ScriptDirectives(Arc<RwLock<Option<ScriptSource>>>);

impl ScriptDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, source: Option<ScriptSource>) {
        *self.0.write() = source;
    }

    pub fn get(&self) -> Option<ScriptSource> {
        self.0.read().clone()
    }
}

/// Main config of the script module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptConf {
    pub init: Option<ScriptSource>,
}

/// Build the script module descriptor
pub fn script_module(engine: Arc<dyn ScriptEngine>, directives: ScriptDirectives) -> ModuleDescriptor {
    let ctx = ScopedContext::new().with_create_main_conf(move |_cycle| {
        Ok(ConfigBlock::new(ScriptConf {
            init: directives.get(),
        }))
    });

    ModuleDescriptor::http(SCRIPT_MODULE, ctx).with_init_module(move |cycle| {
        let conf = cycle.module_conf::<ScriptConf>(SCRIPT_MODULE)?;
        let Some(source) = &conf.init else {
            return Ok(());
        };

        debug!(
            "Running {} with {} for generation {}",
            source,
            engine.name(),
            cycle.generation()
        );
        run_script(engine.as_ref(), source)
    })
}
