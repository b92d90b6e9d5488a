// Module Catalog - Loadable modules by name
//
// Entries are factories. A module that is part of the published generation is
// reused as is, keeping its index and slot; a module that is not gets a fresh
// descriptor, the way a library is loaded anew once no generation holds it.

use std::collections::BTreeMap;
use std::sync::Arc;

use module_runtime::{CoreContext, Cycle, ModuleDescriptor, ModuleRef, ScopedContext};
use module_types::{ABI_SIGNATURE, ABI_VERSION, AbiToken, ConfigBlock};

use crate::script::{SCRIPT_MODULE, ScriptDirectives, ScriptEngine, script_module};

/// Creates a module's descriptor
pub type ModuleFactory = Arc<dyn Fn() -> ModuleDescriptor + Send + Sync>;

/// Modules that can be loaded on top of the built-in set
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    entries: BTreeMap<String, ModuleFactory>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a loadable module
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> ModuleDescriptor + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(factory));
    }

    /// Builder form of `register`
    pub fn with_module<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> ModuleDescriptor + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Descriptor to admit for `name`
    ///
    /// Reuses the published generation's descriptor when it has one.
    pub fn resolve(&self, name: &str, published: Option<&Cycle>) -> Option<ModuleRef> {
        let factory = self.entries.get(name)?;
        if let Some(module) = published.and_then(|cycle| cycle.module(name)) {
            return Some(module.clone());
        }
        tracing::debug!("Loading module {}", name);
        Some(Arc::new(factory()))
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Standard Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Main config of `http_geoip`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoipConf {
    pub proxy_recursive: bool,
}

/// Config of `thread_pool`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPoolConf {
    pub threads: usize,
    pub max_queue: usize,
}

/// The loadable modules shipped with the server
pub fn standard_catalog(engine: Arc<dyn ScriptEngine>, directives: ScriptDirectives) -> ModuleCatalog {
    ModuleCatalog::new()
        .with_module("thread_pool", || {
            ModuleDescriptor::core(
                "thread_pool",
                CoreContext::new().with_create_conf(|_| {
                    Ok(ConfigBlock::new(ThreadPoolConf {
                        threads: 32,
                        max_queue: 65536,
                    }))
                }),
            )
        })
        .with_module("http_geoip", || {
            ModuleDescriptor::http(
                "http_geoip",
                ScopedContext::new().with_create_main_conf(|_| {
                    Ok(ConfigBlock::new(GeoipConf {
                        proxy_recursive: false,
                    }))
                }),
            )
        })
        .with_module("http_image_filter", || {
            ModuleDescriptor::http("http_image_filter", ScopedContext::new())
        })
        .with_module("http_headers_more", || {
            ModuleDescriptor::http("http_headers_more", ScopedContext::new())
        })
        .with_module("stream_geoip", || {
            ModuleDescriptor::stream("stream_geoip", ScopedContext::new())
        })
        .with_module("mail_auth_http", || {
            ModuleDescriptor::mail("mail_auth_http", ScopedContext::new())
        })
        // built against the previous ABI; always rejected
        .with_module("http_legacy_auth", || {
            ModuleDescriptor::http("http_legacy_auth", ScopedContext::new())
                .with_abi(AbiToken::new(ABI_VERSION - 1, ABI_SIGNATURE))
        })
        .with_module(SCRIPT_MODULE, move || script_module(engine.clone(), directives.clone()))
}
