//! Cycle Host
//!
//! Owns the published generation. A new generation is built against the one
//! currently published and replaces it only when construction succeeds; a
//! failed build leaves the old generation serving.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use module_runtime::{BuiltinModules, Cycle, LoadRequest, build_generation};
use module_types::CycleError;

use crate::builtin::builtin_modules;
use crate::catalog::{ModuleCatalog, standard_catalog};
use crate::script::{ScriptDirectives, ScriptEngine};
use crate::settings::Settings;

/// Errors from building a generation
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Module \"{0}\" is not in the catalog")]
    UnknownModule(String),

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Builds generations and publishes the latest good one
pub struct CycleHost {
    builtins: BuiltinModules,
    catalog: ModuleCatalog,
    directives: ScriptDirectives,
    published: RwLock<Option<Arc<Cycle>>>,
    building: Mutex<()>,
}

impl CycleHost {
    pub fn new(builtins: BuiltinModules, catalog: ModuleCatalog, directives: ScriptDirectives) -> Self {
        Self {
            builtins,
            catalog,
            directives,
            published: RwLock::new(None),
            building: Mutex::new(()),
        }
    }

    /// Bootstrap the built-in modules and the standard catalog
    ///
    /// The dynamic budget is fixed here for the life of the host.
    pub fn from_settings(settings: &Settings, engine: Arc<dyn ScriptEngine>) -> Result<Self, HostError> {
        let builtins =
            BuiltinModules::bootstrap_with_budget(builtin_modules(), settings.runtime.dynamic_budget)?;
        let directives = ScriptDirectives::new();
        let catalog = standard_catalog(engine, directives.clone());
        Ok(Self::new(builtins, catalog, directives))
    }

    pub fn builtins(&self) -> &BuiltinModules {
        &self.builtins
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// The generation currently serving
    pub fn current(&self) -> Option<Arc<Cycle>> {
        self.published.read().clone()
    }

    /// Build a generation from `settings` and publish it
    pub fn build(&self, settings: &Settings) -> Result<Arc<Cycle>, HostError> {
        let _building = self.building.lock();
        let previous = self.current();

        if settings.runtime.dynamic_budget != self.builtins.dynamic_budget() {
            warn!(
                "dynamic_budget changes need a restart, keeping {}",
                self.builtins.dynamic_budget()
            );
        }

        let requests = settings
            .load_module
            .iter()
            .map(|entry| {
                let module = self
                    .catalog
                    .resolve(&entry.name, previous.as_deref())
                    .ok_or_else(|| HostError::UnknownModule(entry.name.clone()))?;
                Ok(LoadRequest::new(module).before(entry.before.iter().cloned()))
            })
            .collect::<Result<Vec<_>, HostError>>()?;

        self.directives.set(settings.script.source());

        let cycle = match build_generation(&self.builtins, previous.as_deref(), requests) {
            Ok(cycle) => Arc::new(cycle),
            Err(err) => {
                match &previous {
                    Some(old) => warn!(
                        "New generation rejected, generation {} keeps serving: {}",
                        old.generation(),
                        err
                    ),
                    None => error!("Initial generation failed: {}", err),
                }
                return Err(err.into());
            }
        };

        *self.published.write() = Some(cycle.clone());
        info!(
            "Published generation {} ({} modules)",
            cycle.generation(),
            cycle.len()
        );
        Ok(cycle)
    }
}

impl std::fmt::Debug for CycleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleHost")
            .field("builtins", &self.builtins.len())
            .field("catalog", &self.catalog)
            .field("generation", &self.current().map(|c| c.generation()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;

    use module_types::{AbiMismatch, ModuleCategory};

    use super::*;
    use crate::catalog::GeoipConf;
    use crate::script::{NoScriptEngine, SCRIPT_MODULE, ScriptError, ScriptOutcome};

    fn host() -> CycleHost {
        CycleHost::from_settings(&Settings::default(), Arc::new(NoScriptEngine)).unwrap()
    }

    fn settings(toml: &str) -> Settings {
        Settings::parse(toml).unwrap()
    }

    #[test]
    fn test_initial_build_publishes() {
        let host = host();
        assert!(host.current().is_none());

        let cycle = host.build(&Settings::default()).unwrap();
        assert_eq!(cycle.generation(), 1);
        assert_eq!(cycle.len(), host.builtins().len());
        assert!(Arc::ptr_eq(&cycle, &host.current().unwrap()));
    }

    #[test]
    fn test_reload_keeps_indices_of_retained_modules() {
        let host = host();
        let first = host
            .build(&settings("[[load_module]]\nname = \"http_geoip\"\n"))
            .unwrap();
        let geoip = first.module("http_geoip").unwrap().clone();

        let second = host
            .build(&settings(
                r#"
[[load_module]]
name = "http_image_filter"
before = ["http_gzip"]

[[load_module]]
name = "http_geoip"
"#,
            ))
            .unwrap();

        assert_eq!(second.generation(), 2);
        assert_eq!(second.previous_generation(), Some(1));
        let again = second.module("http_geoip").unwrap();
        assert!(Arc::ptr_eq(&geoip, again));
        assert_eq!(again.global_index(), geoip.global_index());
        assert!(!second.module_conf::<GeoipConf>("http_geoip").unwrap().proxy_recursive);
        assert!(second.position("http_image_filter").unwrap() < second.position("http_gzip").unwrap());
        assert!(second.slot_count(ModuleCategory::Http).unwrap() >= first.slot_count(ModuleCategory::Http).unwrap());
    }

    #[test]
    fn test_readded_module_gets_unused_index() {
        let host = host();
        let with = settings("[[load_module]]\nname = \"thread_pool\"\n[[load_module]]\nname = \"http_geoip\"\n");
        let without = settings("[[load_module]]\nname = \"http_headers_more\"\n");

        for round in 0..3 {
            let cycle = host.build(if round % 2 == 0 { &with } else { &without }).unwrap();
            let indices: HashSet<_> = cycle.modules().iter().filter_map(|m| m.global_index()).collect();
            assert_eq!(indices.len(), cycle.len());
        }
    }

    #[test]
    fn test_failed_reload_keeps_old_generation() {
        let host = host();
        let first = host.build(&Settings::default()).unwrap();

        let err = host
            .build(&settings("[[load_module]]\nname = \"http_legacy_auth\"\n"))
            .unwrap_err();
        assert!(matches!(
            err,
            HostError::Cycle(CycleError::AbiMismatch {
                mismatch: AbiMismatch::Version { .. },
                ..
            })
        ));

        let err = host
            .build(&settings("[[load_module]]\nname = \"http_perl\"\n"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Module \"http_perl\" is not in the catalog");

        assert!(Arc::ptr_eq(&first, &host.current().unwrap()));
        // the next good build follows the published generation
        assert_eq!(host.build(&Settings::default()).unwrap().generation(), 2);
    }

    #[test]
    fn test_duplicate_load_module() {
        let host = host();
        let err = host
            .build(&settings("[[load_module]]\nname = \"http_geoip\"\n[[load_module]]\nname = \"http_geoip\"\n"))
            .unwrap_err();
        assert!(matches!(err, HostError::Cycle(CycleError::DuplicateName { .. })));
        assert!(host.current().is_none());
    }

    struct FileOnlyEngine;

    impl ScriptEngine for FileOnlyEngine {
        fn name(&self) -> &str {
            "file-only"
        }

        fn run_inline(&self, _source: &str, chunk: &str) -> ScriptOutcome {
            Err(ScriptError::Failed {
                chunk: chunk.to_string(),
                message: "inline scripts disabled".to_string(),
            })
        }

        fn run_file(&self, _path: &Path) -> ScriptOutcome {
            Ok(())
        }
    }

    #[test]
    fn test_script_failure_rejects_generation() {
        let host = CycleHost::from_settings(&Settings::default(), Arc::new(FileOnlyEngine)).unwrap();
        let script = "[[load_module]]\nname = \"http_script\"\n";

        let first = host
            .build(&settings(&format!("{script}[script]\ninit_file = \"init.js\"\n")))
            .unwrap();

        let err = host
            .build(&settings(&format!("{script}[script]\ninit = \"boot()\"\n")))
            .unwrap_err();
        match err {
            HostError::Cycle(CycleError::InitHookFailed { module, reason }) => {
                assert_eq!(module, SCRIPT_MODULE);
                assert!(reason.starts_with("init_by_script error"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(Arc::ptr_eq(&first, &host.current().unwrap()));
    }

    #[test]
    fn test_shipped_settings_build() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../modcycle.toml");
        let settings = Settings::load(&path).unwrap();
        let host = CycleHost::from_settings(&settings, Arc::new(FileOnlyEngine)).unwrap();
        let cycle = host.build(&settings).unwrap();

        let image_filter = cycle.position("http_image_filter").unwrap();
        assert!(image_filter > cycle.position("http_gzip").unwrap());
        assert!(image_filter < cycle.position("http_headers_filter").unwrap());
        assert!(cycle.module(SCRIPT_MODULE).is_some());
    }

    #[cfg(feature = "quickjs")]
    #[test]
    fn test_shipped_init_script_runs() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../modcycle.toml");
        let settings = Settings::load(&path).unwrap();
        let host = CycleHost::from_settings(&settings, crate::script::default_engine()).unwrap();
        assert!(host.build(&settings).is_ok());
    }
}
