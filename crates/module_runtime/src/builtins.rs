// Built-in Modules - Process-wide bootstrap
//
// Built-in modules are numbered once per process, in link order, before any
// generation exists. The result also fixes the module capacity every
// generation of this process shares.

use std::collections::HashSet;
use std::sync::Arc;

use module_types::{AbiToken, CycleError, CycleResult};

use crate::{ModuleDescriptor, ModuleRef};

/// Headroom for modules admitted on top of the built-in set
pub const DEFAULT_DYNAMIC_BUDGET: usize = 128;

/// The built-in module set plus the process-wide limits derived from it
#[derive(Debug, Clone)]
pub struct BuiltinModules {
    modules: Vec<ModuleRef>,
    max_modules: usize,
    abi: AbiToken,
}

impl BuiltinModules {
    /// Number the built-in modules with the default dynamic budget
    pub fn bootstrap(modules: Vec<ModuleDescriptor>) -> CycleResult<Self> {
        Self::bootstrap_with_budget(modules, DEFAULT_DYNAMIC_BUDGET)
    }

    /// Number the built-in modules `0..k` in the given order
    ///
    /// Capacity is `k + dynamic_budget`.
    pub fn bootstrap_with_budget(
        modules: Vec<ModuleDescriptor>,
        dynamic_budget: usize,
    ) -> CycleResult<Self> {
        let mut names = HashSet::with_capacity(modules.len());
        let mut shared = Vec::with_capacity(modules.len());

        for (index, module) in modules.into_iter().enumerate() {
            if !names.insert(module.name().to_string()) {
                return Err(CycleError::DuplicateName {
                    module: module.name().to_string(),
                });
            }
            module.assign_global_index(index);
            tracing::debug!("Built-in module {} ({}) -> index {}", module.name(), module.category(), index);
            shared.push(Arc::new(module));
        }

        let max_modules = shared.len() + dynamic_budget;
        tracing::info!(
            "Bootstrapped {} built-in modules (capacity {})",
            shared.len(),
            max_modules
        );

        Ok(Self {
            modules: shared,
            max_modules,
            abi: AbiToken::host(),
        })
    }

    /// Expect `abi` from admitted modules instead of the host tokens
    pub fn with_abi(mut self, abi: AbiToken) -> Self {
        self.abi = abi;
        self
    }

    pub fn modules(&self) -> &[ModuleRef] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn max_modules(&self) -> usize {
        self.max_modules
    }

    pub fn dynamic_budget(&self) -> usize {
        self.max_modules - self.modules.len()
    }

    pub fn abi(&self) -> &AbiToken {
        &self.abi
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRef> {
        self.modules.iter().find(|m| m.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoreContext, ScopedContext};

    #[test]
    fn test_indices_follow_link_order() {
        let builtins = BuiltinModules::bootstrap(vec![
            ModuleDescriptor::core("core", CoreContext::new()),
            ModuleDescriptor::core("events", CoreContext::new()),
            ModuleDescriptor::event("epoll", ScopedContext::new()),
        ])
        .unwrap();

        let indices: Vec<_> = builtins.modules().iter().map(|m| m.global_index()).collect();
        assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(builtins.get("epoll").unwrap().category_slot(), None);
    }

    #[test]
    fn test_capacity() {
        let builtins = BuiltinModules::bootstrap(vec![ModuleDescriptor::core(
            "core",
            CoreContext::new(),
        )])
        .unwrap();
        assert_eq!(builtins.max_modules(), 1 + DEFAULT_DYNAMIC_BUDGET);
        assert_eq!(builtins.dynamic_budget(), DEFAULT_DYNAMIC_BUDGET);

        let builtins = BuiltinModules::bootstrap_with_budget(vec![], 4).unwrap();
        assert!(builtins.is_empty());
        assert_eq!(builtins.max_modules(), 4);
    }

    #[test]
    fn test_duplicate_builtin_rejected() {
        let err = BuiltinModules::bootstrap(vec![
            ModuleDescriptor::http("gzip", ScopedContext::new()),
            ModuleDescriptor::http("gzip", ScopedContext::new()),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            CycleError::DuplicateName {
                module: "gzip".to_string()
            }
        );
    }
}
