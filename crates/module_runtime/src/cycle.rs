// Cycle - One generation of the module registry
//
// A cycle owns the ordered module table and the config blocks of every module
// in it. Once built it is read-only; a newer cycle may read it while it is
// still serving but never changes it.

use std::any::{Any, type_name};
use std::collections::{BTreeMap, BTreeSet};

use module_types::{AbiToken, ConfigBlock, CycleError, CycleResult, ModuleCategory};
use serde::Serialize;

use crate::{ConfigContexts, ModuleRef};

/// A generation of the module registry
#[derive(Debug)]
pub struct Cycle {
    pub(crate) generation: u64,
    pub(crate) previous_generation: Option<u64>,
    pub(crate) max_modules: usize,
    pub(crate) abi: AbiToken,
    pub(crate) modules: Vec<ModuleRef>,
    pub(crate) sealed: BTreeSet<ModuleCategory>,
    pub(crate) slot_counts: BTreeMap<ModuleCategory, usize>,
    pub(crate) contexts: ConfigContexts,
}

impl Cycle {
    pub(crate) fn new(
        generation: u64,
        previous_generation: Option<u64>,
        max_modules: usize,
        abi: AbiToken,
        modules: Vec<ModuleRef>,
    ) -> Self {
        Self {
            generation,
            previous_generation,
            max_modules,
            abi,
            modules,
            sealed: BTreeSet::new(),
            slot_counts: BTreeMap::new(),
            contexts: ConfigContexts::new(max_modules),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Module Table
    // ─────────────────────────────────────────────────────────────────────────

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of the generation this one was built against
    pub fn previous_generation(&self) -> Option<u64> {
        self.previous_generation
    }

    pub fn max_modules(&self) -> usize {
        self.max_modules
    }

    /// ABI tokens admitted modules had to match
    pub fn abi(&self) -> &AbiToken {
        &self.abi
    }

    /// Modules in table order
    pub fn modules(&self) -> &[ModuleRef] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module(&self, name: &str) -> Option<&ModuleRef> {
        self.modules.iter().find(|m| m.name() == name)
    }

    /// Table position of `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name() == name)
    }

    /// Modules of one category, in table order
    pub fn modules_of(&self, category: ModuleCategory) -> impl Iterator<Item = &ModuleRef> + '_ {
        self.modules.iter().filter(move |m| m.category() == category)
    }

    /// Whether slots of `category` have been counted, closing it to admissions
    pub fn is_sealed(&self, category: ModuleCategory) -> bool {
        self.sealed.contains(&category)
    }

    /// Config array length computed for `category`
    pub fn slot_count(&self, category: ModuleCategory) -> Option<usize> {
        self.slot_counts.get(&category).copied()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Config Lookups
    // ─────────────────────────────────────────────────────────────────────────

    pub fn contexts(&self) -> &ConfigContexts {
        &self.contexts
    }

    /// Block stored at `slot` of `category`
    pub fn get_config(&self, category: ModuleCategory, slot: usize) -> CycleResult<&ConfigBlock> {
        self.contexts.get(category, slot)
    }

    /// Core block stored at `global_index`
    pub fn get_core_config(&self, global_index: usize) -> CycleResult<&ConfigBlock> {
        self.contexts.get_core(global_index)
    }

    /// Block of the module called `name`
    ///
    /// Core modules are looked up by global index, every other category by
    /// category slot.
    pub fn module_block(&self, name: &str) -> CycleResult<&ConfigBlock> {
        let module = self.module(name).ok_or_else(|| CycleError::UnknownModule {
            module: name.to_string(),
        })?;
        let unindexed = || CycleError::Unindexed {
            module: name.to_string(),
        };

        match module.category() {
            ModuleCategory::Core => {
                let index = module.global_index().ok_or_else(unindexed)?;
                self.contexts.get_core(index)
            }
            category => {
                let slot = module.category_slot().ok_or_else(unindexed)?;
                self.contexts.get(category, slot)
            }
        }
    }

    /// Block of the module called `name`, as `T`
    pub fn module_conf<T: Any>(&self, name: &str) -> CycleResult<&T> {
        let block = self.module_block(name)?;
        block
            .downcast_ref::<T>()
            .ok_or_else(|| CycleError::ConfigTypeMismatch {
                module: name.to_string(),
                expected: type_name::<T>(),
                actual: block.type_name(),
            })
    }

    /// Serializable summary of the generation
    pub fn report(&self) -> CycleReport {
        CycleReport {
            generation: self.generation,
            previous_generation: self.previous_generation,
            max_modules: self.max_modules,
            modules: self
                .modules
                .iter()
                .map(|m| ModuleSummary {
                    name: m.name().to_string(),
                    category: m.category(),
                    global_index: m.global_index(),
                    category_slot: m.category_slot(),
                })
                .collect(),
            slot_counts: self.slot_counts.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Report
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of one module's place in a generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub category: ModuleCategory,
    pub global_index: Option<usize>,
    pub category_slot: Option<usize>,
}

/// Summary of a built generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub generation: u64,
    pub previous_generation: Option<u64>,
    pub max_modules: usize,
    pub modules: Vec<ModuleSummary>,
    pub slot_counts: BTreeMap<ModuleCategory, usize>,
}
