//! QuickJS Script Engine
//!
//! Runs init scripts in QuickJS. Every run gets a fresh runtime, so nothing
//! a script defines survives into the next generation.

use std::path::Path;

use rquickjs::context::EvalOptions;
use rquickjs::{Context, Ctx, Runtime};

use super::{ScriptEngine, ScriptError, ScriptOutcome};

/// Script engine backed by QuickJS
#[derive(Debug, Clone, Default)]
pub struct QuickJsEngine {
    memory_limit: Option<usize>,
}

impl QuickJsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the heap of each script run
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    fn eval(&self, source: &str, chunk: &str) -> ScriptOutcome {
        let runtime = Runtime::new().map_err(|e| ScriptError::Unavailable(e.to_string()))?;
        if let Some(limit) = self.memory_limit {
            runtime.set_memory_limit(limit);
        }
        let context = Context::full(&runtime).map_err(|e| ScriptError::Unavailable(e.to_string()))?;

        context.with(|ctx| {
            let mut options = EvalOptions::default();
            options.global = true;
            options.strict = true;
            options.backtrace_barrier = true;

            ctx.eval_with_options::<(), _>(source, options)
                .map_err(|e| ScriptError::Failed {
                    chunk: chunk.to_string(),
                    message: describe(&ctx, e),
                })
        })
    }
}

impl ScriptEngine for QuickJsEngine {
    fn name(&self) -> &str {
        "quickjs"
    }

    fn run_inline(&self, source: &str, chunk: &str) -> ScriptOutcome {
        self.eval(source, chunk)
    }

    fn run_file(&self, path: &Path) -> ScriptOutcome {
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.eval(&source, &path.display().to_string())
    }
}

/// Message of the exception behind `err`, if QuickJS threw one
fn describe(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !err.is_exception() {
        return err.to_string();
    }

    let thrown = ctx.catch();
    if let Some(exception) = thrown.as_exception() {
        return exception.message().unwrap_or_else(|| err.to_string());
    }
    thrown
        .as_string()
        .and_then(|s| s.to_string().ok())
        .unwrap_or_else(|| err.to_string())
}
