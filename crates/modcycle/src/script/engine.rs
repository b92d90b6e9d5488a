// Script Engine - Boundary to whatever executes init scripts
//
// An engine exposes two entry points, inline source and source from a named
// file, with one uniform outcome. Failures are reported through the log and
// surface to the generation builder as an ordinary init hook failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use module_runtime::{Cycle, InitModuleFn};
use module_types::HookError;
use tracing::error;

/// Chunk name given to inline init scripts
pub const INLINE_CHUNK: &str = "=init_by_script";

/// Where an init script comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Inline(String),
    File(PathBuf),
}

impl ScriptSource {
    /// Name the failure is reported under
    pub fn label(&self) -> &'static str {
        match self {
            ScriptSource::Inline(_) => "init_by_script",
            ScriptSource::File(_) => "init_by_script_file",
        }
    }
}

impl std::fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptSource::Inline(_) => f.write_str(INLINE_CHUNK),
            ScriptSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Errors a script run can end with
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{chunk}: {message}")]
    Failed { chunk: String, message: String },

    #[error("script engine unavailable: {0}")]
    Unavailable(String),
}

/// Uniform result of both entry points
pub type ScriptOutcome = Result<(), ScriptError>;

/// Something that can run init scripts
pub trait ScriptEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Run `source`, naming it `chunk` in diagnostics
    fn run_inline(&self, source: &str, chunk: &str) -> ScriptOutcome;

    /// Load and run the script at `path`
    fn run_file(&self, path: &Path) -> ScriptOutcome;
}

/// Run one init script, logging a failure under the source's label
pub fn run_script(engine: &dyn ScriptEngine, source: &ScriptSource) -> Result<(), HookError> {
    let outcome = match source {
        ScriptSource::Inline(code) => engine.run_inline(code, INLINE_CHUNK),
        ScriptSource::File(path) => engine.run_file(path),
    };

    outcome.map_err(|err| {
        error!("{} error: {}", source.label(), err);
        HookError::new(format!("{} error: {}", source.label(), err))
    })
}

/// Adapt a fixed script into an ordinary init hook
pub fn script_init_hook(engine: Arc<dyn ScriptEngine>, source: ScriptSource) -> InitModuleFn {
    Arc::new(move |_cycle: &Cycle| run_script(engine.as_ref(), &source))
}

/// Engine for builds without script support; every run fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScriptEngine;

impl ScriptEngine for NoScriptEngine {
    fn name(&self) -> &str {
        "none"
    }

    fn run_inline(&self, _source: &str, _chunk: &str) -> ScriptOutcome {
        Err(ScriptError::Unavailable("built without script support".to_string()))
    }

    fn run_file(&self, _path: &Path) -> ScriptOutcome {
        Err(ScriptError::Unavailable("built without script support".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records what it was asked to run; fails sources containing "fail"
    #[derive(Default)]
    struct RecordingEngine {
        runs: Mutex<Vec<String>>,
    }

    impl ScriptEngine for RecordingEngine {
        fn name(&self) -> &str {
            "recording"
        }

        fn run_inline(&self, source: &str, chunk: &str) -> ScriptOutcome {
            self.runs.lock().push(format!("{}:{}", chunk, source));
            if source.contains("fail") {
                return Err(ScriptError::Failed {
                    chunk: chunk.to_string(),
                    message: "thrown".to_string(),
                });
            }
            Ok(())
        }

        fn run_file(&self, path: &Path) -> ScriptOutcome {
            self.runs.lock().push(path.display().to_string());
            Ok(())
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(ScriptSource::Inline("1".into()).label(), "init_by_script");
        assert_eq!(ScriptSource::File("a.js".into()).label(), "init_by_script_file");
        assert_eq!(ScriptSource::Inline("1".into()).to_string(), INLINE_CHUNK);
    }

    #[test]
    fn test_run_script_dispatches() {
        let engine = RecordingEngine::default();
        run_script(&engine, &ScriptSource::Inline("ok()".into())).unwrap();
        run_script(&engine, &ScriptSource::File("/etc/init.js".into())).unwrap();

        assert_eq!(
            *engine.runs.lock(),
            vec!["=init_by_script:ok()".to_string(), "/etc/init.js".to_string()]
        );
    }

    #[test]
    fn test_failure_carries_label() {
        let engine = RecordingEngine::default();
        let err = run_script(&engine, &ScriptSource::Inline("fail()".into())).unwrap_err();
        assert_eq!(err.reason(), "init_by_script error: =init_by_script: thrown");
    }

    #[test]
    fn test_script_init_hook_fails_generation() {
        use module_runtime::{BuiltinModules, CoreContext, ModuleDescriptor, build_generation};
        use module_types::CycleError;

        let hook = script_init_hook(Arc::new(NoScriptEngine), ScriptSource::Inline("boot()".into()));
        let builtins = BuiltinModules::bootstrap(vec![
            ModuleDescriptor::core("boot", CoreContext::new()).with_init_module_fn(hook),
        ])
        .unwrap();

        let err = build_generation(&builtins, None, Vec::new()).unwrap_err();
        assert!(matches!(err, CycleError::InitHookFailed { module, .. } if module == "boot"));
    }

    #[test]
    fn test_no_script_engine() {
        let err = run_script(&NoScriptEngine, &ScriptSource::File("init.js".into())).unwrap_err();
        assert!(err.reason().starts_with("init_by_script_file error: script engine unavailable"));
    }
}
