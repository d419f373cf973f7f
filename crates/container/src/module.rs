//! Modules: override-tagged bundles of definitions, the unit of load/unload.
//!
//! The builder only appends flat `Definition` records. A `scope { .. }` block
//! does not nest anything; it tags the definitions declared inside it with
//! the scope class.

use std::{
    any::Any,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    definition::{Definition, DefinitionBuilder, Kind},
    resolver::InstanceContext,
    types::{Qualifier, ScopeClass},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl ModuleId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ModuleId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Immutable, cheaply cloneable set of definitions.
///
/// The same `Module` value can be loaded, unloaded and loaded again; its id
/// is the key the loader uses to find exactly what it contributed.
#[derive(Clone)]
pub struct Module {
    id: ModuleId,
    override_allowed: bool,
    definitions: Arc<[Arc<Definition>]>,
}

impl Module {
    /// Module whose definitions may not replace existing ones
    pub fn new(declare: impl FnOnce(&mut ModuleBuilder)) -> Self {
        Self::build(false, declare)
    }

    /// Module whose definitions replace existing ones with the same key
    pub fn with_override(declare: impl FnOnce(&mut ModuleBuilder)) -> Self {
        Self::build(true, declare)
    }

    pub fn build(override_allowed: bool, declare: impl FnOnce(&mut ModuleBuilder)) -> Self {
        let mut builder = ModuleBuilder {
            id: ModuleId::next(),
            scope_class: ScopeClass::Root,
            definitions: Vec::new(),
        };
        declare(&mut builder);

        let definitions = builder
            .definitions
            .into_iter()
            .map(|mut definition| {
                definition.override_allowed |= override_allowed;
                Arc::new(definition)
            })
            .collect();

        Self {
            id: builder.id,
            override_allowed,
            definitions,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn is_override(&self) -> bool {
        self.override_allowed
    }

    pub fn definitions(&self) -> &[Arc<Definition>] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("override", &self.override_allowed)
            .field("definitions", &self.definitions.len())
            .finish()
    }
}

pub struct ModuleBuilder {
    id: ModuleId,
    scope_class: ScopeClass,
    definitions: Vec<Definition>,
}

impl ModuleBuilder {
    /// One instance per container, created on first demand
    pub fn single<T, F>(&mut self, factory: F) -> DefinitionBuilder<'_, T>
    where
        T: Any + Send + Sync,
        F: Fn(&InstanceContext<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.push(Kind::Single, factory)
    }

    /// New instance on every resolution
    pub fn factory<T, F>(&mut self, factory: F) -> DefinitionBuilder<'_, T>
    where
        T: Any + Send + Sync,
        F: Fn(&InstanceContext<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.push(Kind::Factory, factory)
    }

    /// Declare definitions for every scope instance of class `qualifier`
    pub fn scope(&mut self, qualifier: impl Into<Qualifier>, declare: impl FnOnce(&mut ScopeBuilder<'_>)) {
        let previous = std::mem::replace(&mut self.scope_class, ScopeClass::Named(qualifier.into()));
        declare(&mut ScopeBuilder { module: &mut *self });
        self.scope_class = previous;
    }

    fn push<T, F>(&mut self, kind: Kind, factory: F) -> DefinitionBuilder<'_, T>
    where
        T: Any + Send + Sync,
        F: Fn(&InstanceContext<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let index = self.definitions.len();
        self.definitions
            .push(Definition::new(self.id, self.scope_class.clone(), kind, factory));
        DefinitionBuilder::new(&mut self.definitions[index])
    }
}

/// Builder for the body of a `scope(..)` block
pub struct ScopeBuilder<'a> {
    module: &'a mut ModuleBuilder,
}

impl ScopeBuilder<'_> {
    /// One instance per scope instance, dropped when the scope closes
    pub fn scoped<T, F>(&mut self, factory: F) -> DefinitionBuilder<'_, T>
    where
        T: Any + Send + Sync,
        F: Fn(&InstanceContext<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.module.push(Kind::Scoped, factory)
    }

    pub fn factory<T, F>(&mut self, factory: F) -> DefinitionBuilder<'_, T>
    where
        T: Any + Send + Sync,
        F: Fn(&InstanceContext<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.module.push(Kind::Factory, factory)
    }
}
