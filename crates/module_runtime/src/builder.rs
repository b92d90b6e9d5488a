// Cycle Builder - Constructs one generation against the previous one
//
// Phases run in a fixed order: built-ins are copied in and their core configs
// created, extra modules are admitted one at a time, core configs are
// finalized, each category is counted and set up, and finally every module's
// init hook runs. Any failure discards the generation under construction.

use module_types::{CycleError, CycleResult, ModuleCategory};

use crate::{BuiltinModules, Cycle, ModuleContext, ModuleRef, index, order, slots};

/// Categories that get a config array, in setup order
pub const SCOPED_CATEGORIES: [ModuleCategory; 4] = [
    ModuleCategory::Event,
    ModuleCategory::Http,
    ModuleCategory::Stream,
    ModuleCategory::Mail,
];

// ─────────────────────────────────────────────────────────────────────────────
// Load Request
// ─────────────────────────────────────────────────────────────────────────────

/// A module to admit plus the names it has to precede
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub module: ModuleRef,
    pub before: Vec<String>,
}

impl LoadRequest {
    pub fn new(module: ModuleRef) -> Self {
        Self {
            module,
            before: Vec::new(),
        }
    }

    pub fn before<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before = names.into_iter().map(Into::into).collect();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cycle Builder
// ─────────────────────────────────────────────────────────────────────────────

/// A generation under construction
pub struct CycleBuilder<'prev> {
    cycle: Cycle,
    previous: Option<&'prev Cycle>,
}

impl<'prev> CycleBuilder<'prev> {
    /// Start a generation from the built-in set
    ///
    /// Built-in core modules get their config block right away.
    pub fn new(builtins: &BuiltinModules, previous: Option<&'prev Cycle>) -> CycleResult<Self> {
        let generation = previous.map_or(1, |p| p.generation() + 1);
        let cycle = Cycle::new(
            generation,
            previous.map(Cycle::generation),
            builtins.max_modules(),
            builtins.abi().clone(),
            builtins.modules().to_vec(),
        );

        tracing::info!(
            "Building generation {} ({} built-in modules)",
            generation,
            builtins.len()
        );

        let mut builder = Self { cycle, previous };
        for module in builtins.modules() {
            builder.create_core_conf(module)?;
        }
        Ok(builder)
    }

    /// The generation as built so far
    pub fn cycle(&self) -> &Cycle {
        &self.cycle
    }

    /// Admit one module, returning its table position
    pub fn admit<S: AsRef<str>>(&mut self, module: ModuleRef, before: &[S]) -> CycleResult<usize> {
        let name = module.name().to_string();
        let category = module.category();

        if self.cycle.modules.len() >= self.cycle.max_modules {
            tracing::warn!("Too many modules loaded, rejecting {}", name);
            return Err(CycleError::CapacityExceeded {
                module: name,
                max_modules: self.cycle.max_modules,
            });
        }

        if let Some(mismatch) = module.abi().mismatch(&self.cycle.abi) {
            tracing::warn!("Module {} {}", name, mismatch);
            return Err(CycleError::AbiMismatch {
                module: name,
                mismatch,
            });
        }

        if self.cycle.module(&name).is_some() {
            tracing::warn!("Module {} is already loaded", name);
            return Err(CycleError::DuplicateName { module: name });
        }

        if self.cycle.is_sealed(category) {
            tracing::warn!("Module {} arrived after {} modules were indexed", name, category);
            return Err(CycleError::CategorySealed {
                module: name,
                category,
            });
        }

        let global_index = match module.global_index() {
            Some(index) => {
                if let Some(holder) = self.cycle.modules.iter().find(|m| m.global_index() == Some(index)) {
                    tracing::warn!("Module {} carries index {} of {}", name, index, holder.name());
                    return Err(CycleError::IndexInUse {
                        module: name,
                        holder: holder.name().to_string(),
                        index,
                    });
                }
                index
            }
            None => {
                let candidate = index::lowest_unused(self.global_indices(), 0);
                if candidate >= self.cycle.max_modules {
                    return Err(CycleError::CapacityExceeded {
                        module: name,
                        max_modules: self.cycle.max_modules,
                    });
                }
                module.assign_global_index(candidate)
            }
        };

        let position = order::insertion_position(&self.cycle.modules, &name, before);

        let block = match module.context() {
            ModuleContext::Core(ctx) => match &ctx.create_conf {
                Some(create) => Some(create(&self.cycle).map_err(|e| CycleError::ConfigCreationFailed {
                    module: name.clone(),
                    category,
                    reason: e.reason().to_string(),
                })?),
                None => None,
            },
            _ => None,
        };

        self.cycle.modules.insert(position, module);
        if let Some(block) = block {
            self.cycle.contexts.set_core(global_index, block);
        }

        tracing::info!(
            "Module {} ({}) admitted at position {} with index {}",
            name,
            category,
            position,
            global_index
        );
        Ok(position)
    }

    /// Assign slots of `category` and seal it
    pub fn count_and_assign(&mut self, category: ModuleCategory) -> CycleResult<usize> {
        slots::count_and_assign(&mut self.cycle, self.previous, category)
    }

    /// Finalize every core config block, in table order
    pub fn init_core_confs(&mut self) -> CycleResult<()> {
        for module in &self.cycle.modules {
            let Some(init) = module.context().core().and_then(|ctx| ctx.init_conf.as_ref()) else {
                continue;
            };
            let Some(block) = module
                .global_index()
                .and_then(|index| self.cycle.contexts.get_core(index).ok())
            else {
                continue;
            };

            init(&self.cycle, block).map_err(|e| CycleError::ConfigCreationFailed {
                module: module.name().to_string(),
                category: ModuleCategory::Core,
                reason: e.reason().to_string(),
            })?;
        }
        Ok(())
    }

    /// Count `category`, size its config array and fill it
    ///
    /// Main configs are created for every module of the category first, then
    /// each one is initialized. Returns the array length.
    pub fn setup_category(&mut self, category: ModuleCategory) -> CycleResult<usize> {
        let count = self.count_and_assign(category)?;
        self.cycle.contexts.allocate(category, count);

        let members: Vec<ModuleRef> = self.cycle.modules_of(category).cloned().collect();

        for module in &members {
            let Some(create) = module.context().scoped().and_then(|ctx| ctx.create_main_conf.as_ref())
            else {
                continue;
            };
            let Some(slot) = module.category_slot() else {
                return Err(CycleError::Unindexed {
                    module: module.name().to_string(),
                });
            };

            let block = create(&self.cycle).map_err(|e| CycleError::ConfigCreationFailed {
                module: module.name().to_string(),
                category,
                reason: e.reason().to_string(),
            })?;
            self.cycle.contexts.set(category, slot, block);
        }

        for module in &members {
            let Some(init) = module.context().scoped().and_then(|ctx| ctx.init_main_conf.as_ref())
            else {
                continue;
            };
            let Some(block) = module
                .category_slot()
                .and_then(|slot| self.cycle.contexts.get(category, slot).ok())
            else {
                continue;
            };

            init(&self.cycle, block).map_err(|e| CycleError::ConfigCreationFailed {
                module: module.name().to_string(),
                category,
                reason: e.reason().to_string(),
            })?;
        }

        tracing::debug!(
            "{} set up: {} slots, {} configs",
            category,
            count,
            self.cycle.contexts.populated(category)
        );
        Ok(count)
    }

    /// Run every module's init hook in table order, stopping at the first failure
    pub fn run_init_hooks(&self) -> CycleResult<()> {
        for module in &self.cycle.modules {
            let Some(init) = module.init_module() else {
                continue;
            };

            if let Err(e) = init(&self.cycle) {
                tracing::error!("Init hook of module {} failed: {}", module.name(), e);
                return Err(CycleError::InitHookFailed {
                    module: module.name().to_string(),
                    reason: e.reason().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Finish construction
    pub fn finish(self) -> Cycle {
        tracing::info!(
            "Generation {} ready with {} modules",
            self.cycle.generation,
            self.cycle.len()
        );
        self.cycle
    }

    fn create_core_conf(&mut self, module: &ModuleRef) -> CycleResult<()> {
        let Some(create) = module.context().core().and_then(|ctx| ctx.create_conf.as_ref()) else {
            return Ok(());
        };
        let Some(global_index) = module.global_index() else {
            return Err(CycleError::Unindexed {
                module: module.name().to_string(),
            });
        };

        let block = create(&self.cycle).map_err(|e| CycleError::ConfigCreationFailed {
            module: module.name().to_string(),
            category: ModuleCategory::Core,
            reason: e.reason().to_string(),
        })?;
        self.cycle.contexts.set_core(global_index, block);
        Ok(())
    }

    /// Global indices in use by this generation and the previous one
    fn global_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.cycle
            .modules
            .iter()
            .chain(self.previous.into_iter().flat_map(|p| p.modules.iter()))
            .filter_map(|m| m.global_index())
    }
}

/// Build a complete generation: admit `requests` in order, then run every phase
pub fn build_generation<I>(
    builtins: &BuiltinModules,
    previous: Option<&Cycle>,
    requests: I,
) -> CycleResult<Cycle>
where
    I: IntoIterator<Item = LoadRequest>,
{
    let mut builder = CycleBuilder::new(builtins, previous)?;

    for request in requests {
        builder.admit(request.module, request.before.as_slice())?;
    }

    builder.init_core_confs()?;
    for category in SCOPED_CATEGORIES {
        builder.setup_category(category)?;
    }
    builder.run_init_hooks()?;

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use module_types::{AbiMismatch, AbiToken, ConfigBlock, HookError};

    use super::*;
    use crate::{CoreContext, ModuleDescriptor, ScopedContext};

    fn builtins() -> BuiltinModules {
        BuiltinModules::bootstrap_with_budget(
            vec![
                ModuleDescriptor::core(
                    "core",
                    CoreContext::new().with_create_conf(|_| Ok(ConfigBlock::new(4u32))),
                ),
                ModuleDescriptor::event("epoll", ScopedContext::new()),
                ModuleDescriptor::http("http_core", ScopedContext::new()),
            ],
            2,
        )
        .unwrap()
    }

    fn http(name: &str) -> ModuleRef {
        Arc::new(ModuleDescriptor::http(name, ScopedContext::new()))
    }

    #[test]
    fn test_new_creates_builtin_core_confs() {
        let builtins = builtins();
        let builder = CycleBuilder::new(&builtins, None).unwrap();

        assert_eq!(builder.cycle().generation(), 1);
        assert_eq!(builder.cycle().len(), 3);
        assert_eq!(builder.cycle().module_conf::<u32>("core").unwrap(), &4);
    }

    #[test]
    fn test_admit_rejects_foreign_abi() {
        let builtins = builtins();
        let mut builder = CycleBuilder::new(&builtins, None).unwrap();
        let module = Arc::new(
            ModuleDescriptor::http("geoip", ScopedContext::new())
                .with_abi(AbiToken::new(999, builtins.abi().signature.clone())),
        );

        let err = builder.admit::<&str>(module.clone(), &[]).unwrap_err();
        assert_eq!(
            err,
            CycleError::AbiMismatch {
                module: "geoip".to_string(),
                mismatch: AbiMismatch::Version {
                    expected: builtins.abi().version,
                    found: 999,
                },
            }
        );
        assert_eq!(module.global_index(), None);
        assert_eq!(builder.cycle().len(), 3);
    }

    #[test]
    fn test_admit_into_sealed_category() {
        let builtins = builtins();
        let mut builder = CycleBuilder::new(&builtins, None).unwrap();
        builder.setup_category(ModuleCategory::Http).unwrap();

        let err = builder.admit::<&str>(http("gzip"), &[]).unwrap_err();
        assert!(matches!(err, CycleError::CategorySealed { category: ModuleCategory::Http, .. }));

        // other categories stay open
        let stream = Arc::new(ModuleDescriptor::new(
            "stream_proxy",
            ModuleContext::Stream(ScopedContext::new()),
        ));
        assert!(builder.admit::<&str>(stream, &[]).is_ok());
    }

    #[test]
    fn test_setup_category_fills_slots() {
        let builtins = builtins();
        let mut builder = CycleBuilder::new(&builtins, None).unwrap();
        let initialized = Arc::new(AtomicUsize::new(0));
        let counter = initialized.clone();

        let gzip = Arc::new(ModuleDescriptor::http(
            "gzip",
            ScopedContext::new()
                .with_create_main_conf(|_| Ok(ConfigBlock::new(String::from("gzip on"))))
                .with_init_main_conf(move |_, block| {
                    assert!(block.is::<String>());
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        ));
        builder.admit::<&str>(gzip, &[]).unwrap();

        assert_eq!(builder.setup_category(ModuleCategory::Http).unwrap(), 2);
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(
            builder.cycle().module_conf::<String>("gzip").unwrap(),
            "gzip on"
        );
        // http_core has no main conf
        assert!(builder.cycle().module_block("http_core").is_err());
    }

    #[test]
    fn test_main_conf_failure_names_category() {
        let builtins = builtins();
        let mut builder = CycleBuilder::new(&builtins, None).unwrap();
        let broken = Arc::new(ModuleDescriptor::event(
            "kqueue",
            ScopedContext::new().with_create_main_conf(|_| Err(HookError::new("no kqueue here"))),
        ));
        builder.admit::<&str>(broken, &[]).unwrap();

        let err = builder.setup_category(ModuleCategory::Event).unwrap_err();
        assert_eq!(
            err,
            CycleError::ConfigCreationFailed {
                module: "kqueue".to_string(),
                category: ModuleCategory::Event,
                reason: "no kqueue here".to_string(),
            }
        );
    }

    #[test]
    fn test_core_init_conf_runs_after_admission() {
        let builtins = builtins();
        let mut builder = CycleBuilder::new(&builtins, None).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let observed = seen.clone();

        let thread_pool = Arc::new(ModuleDescriptor::core(
            "thread_pool",
            CoreContext::new()
                .with_create_conf(|_| Ok(ConfigBlock::new(32usize)))
                .with_init_conf(move |cycle, block| {
                    observed.store(cycle.len(), Ordering::SeqCst);
                    match block.downcast_ref::<usize>() {
                        Some(0) => Err(HookError::new("empty pool")),
                        _ => Ok(()),
                    }
                }),
        ));
        builder.admit::<&str>(thread_pool, &[]).unwrap();
        builder.admit::<&str>(http("gzip"), &[]).unwrap();
        builder.init_core_confs().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_build_generation_numbers_generations() {
        let builtins = builtins();
        let first = build_generation(&builtins, None, Vec::new()).unwrap();
        let second = build_generation(&builtins, Some(&first), Vec::new()).unwrap();

        assert_eq!(first.generation(), 1);
        assert_eq!(first.previous_generation(), None);
        assert_eq!(second.generation(), 2);
        assert_eq!(second.previous_generation(), Some(1));
        for category in SCOPED_CATEGORIES {
            assert!(second.is_sealed(category));
        }
    }

    #[test]
    fn test_load_request_before() {
        let request = LoadRequest::new(http("gzip")).before(["postpone", "headers"]);
        assert_eq!(request.before, vec!["postpone".to_string(), "headers".to_string()]);
    }
}
