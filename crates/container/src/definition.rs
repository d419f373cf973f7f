//! Definition - immutable recipe for building one kind of instance

use std::{
    any::Any,
    fmt,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    module::ModuleId,
    resolver::InstanceContext,
    types::{Instance, Qualifier, ScopeClass, TypeKey},
};

/// Lifetime of the instances a definition produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// One instance per owning scope instance, created on first demand
    Single,
    /// A new instance on every resolution, never cached
    Factory,
    /// One instance per scope instance, disposed when that scope closes
    Scoped,
}

impl Kind {
    pub fn is_cached(&self) -> bool {
        !matches!(self, Kind::Factory)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(u64);

impl DefinitionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DefinitionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) type FactoryFn =
    Arc<dyn Fn(&InstanceContext<'_>) -> anyhow::Result<Instance> + Send + Sync>;
/// Produces a `Box<Arc<V>>` view of an instance for one bound type `V`
pub(crate) type CastFn = Arc<dyn Fn(&Instance) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;
pub(crate) type CloseFn = Arc<dyn Fn(&Instance) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) key: TypeKey,
    pub(crate) cast: CastFn,
}

pub struct Definition {
    pub(crate) id: DefinitionId,
    pub(crate) module: ModuleId,
    pub(crate) scope_class: ScopeClass,
    pub(crate) primary: Binding,
    pub(crate) secondary: Vec<Binding>,
    pub(crate) qualifier: Qualifier,
    pub(crate) kind: Kind,
    pub(crate) factory: FactoryFn,
    pub(crate) on_close: Option<CloseFn>,
    pub(crate) override_allowed: bool,
}

impl Definition {
    pub(crate) fn new<T, F>(module: ModuleId, scope_class: ScopeClass, kind: Kind, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&InstanceContext<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let cast: CastFn = Arc::new(|instance: &Instance| {
            instance
                .clone()
                .downcast::<T>()
                .ok()
                .map(|typed| Box::new(typed) as Box<dyn Any + Send + Sync>)
        });

        Self {
            id: DefinitionId::next(),
            module,
            scope_class,
            primary: Binding {
                key: TypeKey::of::<T>(),
                cast,
            },
            secondary: Vec::new(),
            qualifier: Qualifier::Default,
            kind,
            factory: Arc::new(move |ctx: &InstanceContext<'_>| {
                factory(ctx).map(|value| Arc::new(value) as Instance)
            }),
            on_close: None,
            override_allowed: false,
        }
    }

    pub fn id(&self) -> DefinitionId {
        self.id
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    pub fn scope_class(&self) -> &ScopeClass {
        &self.scope_class
    }

    pub fn primary_type(&self) -> TypeKey {
        self.primary.key
    }

    pub fn secondary_types(&self) -> Vec<TypeKey> {
        self.secondary.iter().map(|binding| binding.key).collect()
    }

    /// Primary key followed by every bound key
    pub fn type_keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        std::iter::once(self.primary.key).chain(self.secondary.iter().map(|binding| binding.key))
    }

    pub fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_override(&self) -> bool {
        self.override_allowed
    }

    pub fn binds(&self, key: &TypeKey) -> bool {
        self.type_keys().any(|bound| bound == *key)
    }

    pub(crate) fn create(&self, ctx: &InstanceContext<'_>) -> anyhow::Result<Instance> {
        (self.factory)(ctx)
    }

    /// View `instance` as the bound type `key`, boxed as `Arc<V>`
    pub(crate) fn cast(&self, key: &TypeKey, instance: &Instance) -> Option<Box<dyn Any + Send + Sync>> {
        std::iter::once(&self.primary)
            .chain(self.secondary.iter())
            .find(|binding| binding.key == *key)
            .and_then(|binding| (binding.cast)(instance))
    }

    pub(crate) fn close(&self, instance: &Instance) {
        if let Some(on_close) = &self.on_close {
            on_close(instance);
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("id", &self.id)
            .field("module", &self.module)
            .field("scope_class", &self.scope_class)
            .field("primary", &self.primary.key)
            .field("secondary", &self.secondary_types())
            .field("qualifier", &self.qualifier)
            .field("kind", &self.kind)
            .field("override", &self.override_allowed)
            .finish()
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}: '{}'", self.kind, self.primary.key)?;
        if !self.qualifier.is_default() {
            write!(f, ", qualifier: {}", self.qualifier)?;
        }
        if !self.scope_class.is_root() {
            write!(f, ", scope: {}", self.scope_class)?;
        }
        if !self.secondary.is_empty() {
            let names: Vec<_> = self.secondary.iter().map(|b| b.key.name()).collect();
            write!(f, ", binds: {}", names.join(", "))?;
        }
        f.write_str("]")
    }
}

/// Handle returned while declaring a definition inside a module builder
pub struct DefinitionBuilder<'a, T> {
    definition: &'a mut Definition,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Any + Send + Sync> DefinitionBuilder<'a, T> {
    pub(crate) fn new(definition: &'a mut Definition) -> Self {
        Self {
            definition,
            _marker: PhantomData,
        }
    }

    pub fn named(self, qualifier: impl Into<Qualifier>) -> Self {
        self.definition.qualifier = qualifier.into();
        self
    }

    pub fn qualified(self, qualifier: Qualifier) -> Self {
        self.definition.qualifier = qualifier;
        self
    }

    /// Also expose the instance as `V`, e.g. `.bind::<dyn Repo, _>(|r| r)`
    pub fn bind<V, C>(self, cast: C) -> Self
    where
        V: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<V> + Send + Sync + 'static,
    {
        let cast: CastFn = Arc::new(move |instance: &Instance| {
            instance
                .clone()
                .downcast::<T>()
                .ok()
                .map(|typed| Box::new(cast(typed)) as Box<dyn Any + Send + Sync>)
        });
        self.definition.secondary.push(Binding {
            key: TypeKey::of::<V>(),
            cast,
        });
        self
    }

    /// Called with the cached instance when it is evicted
    pub fn on_close<C>(self, callback: C) -> Self
    where
        C: Fn(&T) + Send + Sync + 'static,
    {
        self.definition.on_close = Some(Arc::new(move |instance: &Instance| {
            if let Some(typed) = instance.downcast_ref::<T>() {
                callback(typed);
            }
        }));
        self
    }

    /// Allow this definition to replace an existing one with the same key
    pub fn with_override(self) -> Self {
        self.definition.override_allowed = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::named;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    fn english_definition() -> Definition {
        let mut definition = Definition::new(ModuleId::next(), ScopeClass::Root, Kind::Single, |_| Ok(English));
        DefinitionBuilder::<English>::new(&mut definition)
            .named("en")
            .bind::<dyn Greeter, _>(|english| english as Arc<dyn Greeter>);
        definition
    }

    #[test]
    fn test_builder_sets_keys() {
        let definition = english_definition();

        assert_eq!(definition.primary_type(), TypeKey::of::<English>());
        assert_eq!(definition.secondary_types(), vec![TypeKey::of::<dyn Greeter>()]);
        assert_eq!(definition.qualifier(), &named("en"));
        assert!(definition.binds(&TypeKey::of::<dyn Greeter>()));
        assert!(!definition.binds(&TypeKey::of::<String>()));
        assert!(!definition.is_override());
        assert!(definition.to_string().contains("binds:"));
    }

    #[test]
    fn test_cast_to_bound_type() {
        let definition = english_definition();
        let instance: Instance = Arc::new(English);

        let viewed = definition
            .cast(&TypeKey::of::<dyn Greeter>(), &instance)
            .and_then(|boxed| boxed.downcast::<Arc<dyn Greeter>>().ok())
            .expect("bound view");
        assert_eq!(viewed.greet(), "hello");

        let primary = definition
            .cast(&TypeKey::of::<English>(), &instance)
            .and_then(|boxed| boxed.downcast::<Arc<English>>().ok());
        assert!(primary.is_some());

        assert!(definition.cast(&TypeKey::of::<String>(), &instance).is_none());
    }

    #[test]
    fn test_definition_ids_are_unique() {
        let first = english_definition();
        let second = english_definition();
        assert_ne!(first.id(), second.id());
    }
}
