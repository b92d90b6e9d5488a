// Module Descriptor - Static metadata of one pluggable unit
//
// A descriptor is shared (`ModuleRef`) by every generation that contains the
// module. Its global index and category slot are set-once cells: once a
// generation assigns them, later generations see them as preassigned.

use std::sync::{Arc, OnceLock};

use module_types::{AbiToken, ConfigBlock, HookError, ModuleCategory};

use crate::Cycle;

// ─────────────────────────────────────────────────────────────────────────────
// Hook Signatures
// ─────────────────────────────────────────────────────────────────────────────

/// "On generation init" hook
pub type InitModuleFn = Arc<dyn Fn(&Cycle) -> Result<(), HookError> + Send + Sync>;

/// Creates a module's config block for the generation under construction
pub type CreateConfFn = Arc<dyn Fn(&Cycle) -> Result<ConfigBlock, HookError> + Send + Sync>;

/// Finalizes a config block once every module of the phase has one
pub type InitConfFn = Arc<dyn Fn(&Cycle, &ConfigBlock) -> Result<(), HookError> + Send + Sync>;

/// Shared handle to a descriptor
pub type ModuleRef = Arc<ModuleDescriptor>;

// ─────────────────────────────────────────────────────────────────────────────
// Category Contexts
// ─────────────────────────────────────────────────────────────────────────────

/// Hooks of a core module
///
/// Core modules have no enclosing scope to merge from, so their block is
/// created as soon as the module joins a generation.
#[derive(Clone, Default)]
pub struct CoreContext {
    pub create_conf: Option<CreateConfFn>,
    pub init_conf: Option<InitConfFn>,
}

impl CoreContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_conf<F>(mut self, f: F) -> Self
    where
        F: Fn(&Cycle) -> Result<ConfigBlock, HookError> + Send + Sync + 'static,
    {
        self.create_conf = Some(Arc::new(f));
        self
    }

    pub fn with_init_conf<F>(mut self, f: F) -> Self
    where
        F: Fn(&Cycle, &ConfigBlock) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.init_conf = Some(Arc::new(f));
        self
    }
}

/// Hooks of a module living inside a category block (event, http, stream, mail)
///
/// The main config is created during the category's setup phase and stored at
/// the module's category slot.
#[derive(Clone, Default)]
pub struct ScopedContext {
    pub create_main_conf: Option<CreateConfFn>,
    pub init_main_conf: Option<InitConfFn>,
}

impl ScopedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_main_conf<F>(mut self, f: F) -> Self
    where
        F: Fn(&Cycle) -> Result<ConfigBlock, HookError> + Send + Sync + 'static,
    {
        self.create_main_conf = Some(Arc::new(f));
        self
    }

    pub fn with_init_main_conf<F>(mut self, f: F) -> Self
    where
        F: Fn(&Cycle, &ConfigBlock) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.init_main_conf = Some(Arc::new(f));
        self
    }
}

/// Category-specific context; the variant is the module's category
#[derive(Clone)]
pub enum ModuleContext {
    Core(CoreContext),
    Conf,
    Event(ScopedContext),
    Http(ScopedContext),
    Stream(ScopedContext),
    Mail(ScopedContext),
}

impl ModuleContext {
    pub fn category(&self) -> ModuleCategory {
        match self {
            ModuleContext::Core(_) => ModuleCategory::Core,
            ModuleContext::Conf => ModuleCategory::Conf,
            ModuleContext::Event(_) => ModuleCategory::Event,
            ModuleContext::Http(_) => ModuleCategory::Http,
            ModuleContext::Stream(_) => ModuleCategory::Stream,
            ModuleContext::Mail(_) => ModuleCategory::Mail,
        }
    }

    pub fn core(&self) -> Option<&CoreContext> {
        match self {
            ModuleContext::Core(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn scoped(&self) -> Option<&ScopedContext> {
        match self {
            ModuleContext::Event(ctx)
            | ModuleContext::Http(ctx)
            | ModuleContext::Stream(ctx)
            | ModuleContext::Mail(ctx) => Some(ctx),
            ModuleContext::Core(_) | ModuleContext::Conf => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Index Cell
// ─────────────────────────────────────────────────────────────────────────────

/// Set-once index slot
#[derive(Debug, Default)]
pub(crate) struct IndexCell(OnceLock<usize>);

impl IndexCell {
    pub(crate) fn get(&self) -> Option<usize> {
        self.0.get().copied()
    }

    /// Store `value` unless an index is already set; returns the index in effect
    pub(crate) fn assign(&self, value: usize) -> usize {
        *self.0.get_or_init(|| value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module Descriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Static description of one module
pub struct ModuleDescriptor {
    name: String,
    abi: AbiToken,
    context: ModuleContext,
    init_module: Option<InitModuleFn>,
    global_index: IndexCell,
    category_slot: IndexCell,
}

impl ModuleDescriptor {
    /// Create a descriptor built against the host ABI
    pub fn new(name: impl Into<String>, context: ModuleContext) -> Self {
        Self {
            name: name.into(),
            abi: AbiToken::host(),
            context,
            init_module: None,
            global_index: IndexCell::default(),
            category_slot: IndexCell::default(),
        }
    }

    /// Shorthand for a core module
    pub fn core(name: impl Into<String>, ctx: CoreContext) -> Self {
        Self::new(name, ModuleContext::Core(ctx))
    }

    /// Shorthand for an http module
    pub fn http(name: impl Into<String>, ctx: ScopedContext) -> Self {
        Self::new(name, ModuleContext::Http(ctx))
    }

    /// Shorthand for an event module
    pub fn event(name: impl Into<String>, ctx: ScopedContext) -> Self {
        Self::new(name, ModuleContext::Event(ctx))
    }

    pub fn stream(name: impl Into<String>, ctx: ScopedContext) -> Self {
        Self::new(name, ModuleContext::Stream(ctx))
    }

    pub fn mail(name: impl Into<String>, ctx: ScopedContext) -> Self {
        Self::new(name, ModuleContext::Mail(ctx))
    }

    /// Shorthand for a configuration-language module
    pub fn conf(name: impl Into<String>) -> Self {
        Self::new(name, ModuleContext::Conf)
    }

    /// Declare the ABI tokens the module was built against
    pub fn with_abi(mut self, abi: AbiToken) -> Self {
        self.abi = abi;
        self
    }

    /// Attach an "on generation init" hook
    pub fn with_init_module<F>(mut self, f: F) -> Self
    where
        F: Fn(&Cycle) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.init_module = Some(Arc::new(f));
        self
    }

    /// Attach an already shared init hook
    pub fn with_init_module_fn(mut self, f: InitModuleFn) -> Self {
        self.init_module = Some(f);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> ModuleCategory {
        self.context.category()
    }

    pub fn abi(&self) -> &AbiToken {
        &self.abi
    }

    pub fn context(&self) -> &ModuleContext {
        &self.context
    }

    pub fn init_module(&self) -> Option<&InitModuleFn> {
        self.init_module.as_ref()
    }

    /// Position in the flat module space, once assigned
    pub fn global_index(&self) -> Option<usize> {
        self.global_index.get()
    }

    /// Position among modules of the same category, once assigned
    pub fn category_slot(&self) -> Option<usize> {
        self.category_slot.get()
    }

    pub(crate) fn assign_global_index(&self, index: usize) -> usize {
        self.global_index.assign(index)
    }

    pub(crate) fn assign_category_slot(&self, slot: usize) -> usize {
        self.category_slot.assign(slot)
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("category", &self.category())
            .field("global_index", &self.global_index())
            .field("category_slot", &self.category_slot())
            .finish()
    }
}
