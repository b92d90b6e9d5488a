// Config Blocks - Type-erased per-module configuration
//
// Each module owns the concrete type of its configuration. The registry only
// stores and hands back blocks; modules downcast to their own type.

use std::any::{Any, type_name};
use std::sync::Arc;

/// Opaque, cheaply cloneable configuration block
#[derive(Clone)]
pub struct ConfigBlock {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ConfigBlock {
    /// Wrap a module's configuration value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Borrow the block as `T`, if that is what it holds
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether the block holds a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Name of the stored type (for diagnostics)
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether two handles point at the same block
    pub fn ptr_eq(&self, other: &ConfigBlock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ConfigBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigBlock")
            .field("type", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct WorkerConf {
        processes: u32,
    }

    #[test]
    fn test_downcast() {
        let block = ConfigBlock::new(WorkerConf { processes: 4 });
        assert!(block.is::<WorkerConf>());
        assert_eq!(block.downcast_ref::<WorkerConf>(), Some(&WorkerConf { processes: 4 }));
        assert!(block.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_clone_shares_value() {
        let block = ConfigBlock::new(String::from("main"));
        let copy = block.clone();
        assert!(block.ptr_eq(&copy));
        assert!(!block.ptr_eq(&ConfigBlock::new(String::from("main"))));
    }

    #[test]
    fn test_debug_shows_type() {
        let block = ConfigBlock::new(7u64);
        assert_eq!(format!("{:?}", block), "ConfigBlock { type: \"u64\" }");
    }
}
