// Config Context Store
//
// One array per category indexed by category slot, plus the flat core array
// indexed by global index. Entries stay empty until the owning phase runs.

use std::collections::BTreeMap;

use module_types::{ConfigBlock, CycleError, CycleResult, ModuleCategory};

/// Per-generation storage of module config blocks
#[derive(Debug, Default)]
pub struct ConfigContexts {
    core: Vec<Option<ConfigBlock>>,
    categories: BTreeMap<ModuleCategory, Vec<Option<ConfigBlock>>>,
}

impl ConfigContexts {
    /// Create a store whose flat core array holds `max_modules` entries
    pub fn new(max_modules: usize) -> Self {
        Self {
            core: vec![None; max_modules],
            categories: BTreeMap::new(),
        }
    }

    /// Size the array of `category` to hold `len` slots
    ///
    /// Blocks already stored are kept; the array never shrinks.
    pub fn allocate(&mut self, category: ModuleCategory, len: usize) {
        let slots = self.categories.entry(category).or_default();
        if slots.len() < len {
            slots.resize(len, None);
        }
    }

    /// Length of the array of `category`, if it has been allocated
    pub fn category_len(&self, category: ModuleCategory) -> Option<usize> {
        self.categories.get(&category).map(Vec::len)
    }

    /// Length of the flat core array
    pub fn core_len(&self) -> usize {
        self.core.len()
    }

    pub fn set(&mut self, category: ModuleCategory, slot: usize, block: ConfigBlock) {
        let slots = self.categories.entry(category).or_default();
        if slots.len() <= slot {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(block);
    }

    pub fn set_core(&mut self, global_index: usize, block: ConfigBlock) {
        if self.core.len() <= global_index {
            self.core.resize(global_index + 1, None);
        }
        self.core[global_index] = Some(block);
    }

    /// Block of the module at `slot` in `category`
    pub fn get(&self, category: ModuleCategory, slot: usize) -> CycleResult<&ConfigBlock> {
        self.categories
            .get(&category)
            .and_then(|slots| slots.get(slot))
            .and_then(Option::as_ref)
            .ok_or(CycleError::SlotNotPopulated { category, slot })
    }

    /// Block of the core module with `global_index`
    pub fn get_core(&self, global_index: usize) -> CycleResult<&ConfigBlock> {
        self.core
            .get(global_index)
            .and_then(Option::as_ref)
            .ok_or(CycleError::SlotNotPopulated {
                category: ModuleCategory::Core,
                slot: global_index,
            })
    }

    /// Number of populated entries in `category`
    pub fn populated(&self, category: ModuleCategory) -> usize {
        match category {
            ModuleCategory::Core => self.core.iter().flatten().count(),
            other => self
                .categories
                .get(&other)
                .map(|slots| slots.iter().flatten().count())
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unallocated_category_is_not_populated() {
        let store = ConfigContexts::new(4);
        assert_eq!(
            store.get(ModuleCategory::Http, 0).unwrap_err(),
            CycleError::SlotNotPopulated {
                category: ModuleCategory::Http,
                slot: 0,
            }
        );
        assert_eq!(store.category_len(ModuleCategory::Http), None);
    }

    #[test]
    fn test_allocated_slots_start_empty() {
        let mut store = ConfigContexts::new(4);
        store.allocate(ModuleCategory::Event, 3);
        assert_eq!(store.category_len(ModuleCategory::Event), Some(3));
        assert!(store.get(ModuleCategory::Event, 2).is_err());

        store.set(ModuleCategory::Event, 2, ConfigBlock::new(512u32));
        let block = store.get(ModuleCategory::Event, 2).unwrap();
        assert_eq!(block.downcast_ref::<u32>(), Some(&512));
        assert_eq!(store.populated(ModuleCategory::Event), 1);
    }

    #[test]
    fn test_allocate_never_shrinks() {
        let mut store = ConfigContexts::new(0);
        store.allocate(ModuleCategory::Http, 5);
        store.set(ModuleCategory::Http, 4, ConfigBlock::new("index.html"));
        store.allocate(ModuleCategory::Http, 2);
        assert_eq!(store.category_len(ModuleCategory::Http), Some(5));
        assert!(store.get(ModuleCategory::Http, 4).is_ok());
    }

    #[test]
    fn test_core_array() {
        let mut store = ConfigContexts::new(3);
        assert_eq!(store.core_len(), 3);
        assert!(store.get_core(1).is_err());
        assert!(store.get_core(10).is_err());

        store.set_core(1, ConfigBlock::new(true));
        assert_eq!(store.get_core(1).unwrap().downcast_ref::<bool>(), Some(&true));
        assert_eq!(store.populated(ModuleCategory::Core), 1);
    }
}
