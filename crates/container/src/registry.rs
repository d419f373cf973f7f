//! Definition Registry - maps (scope class, type, qualifier) to definitions
//!
//! Pure data structure. Locking belongs to the owner: the container keeps the
//! registry behind one `RwLock`, so a reader sees a module either fully
//! inserted or not at all.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    definition::{Definition, DefinitionId},
    errors::{DIError, DIResult},
    module::{Module, ModuleId},
    types::{Qualifier, ScopeClass, TypeKey},
};

/// Definitions of one scope class
#[derive(Default)]
struct Bucket {
    /// Insertion order, used by `find_all`
    ordered: Vec<Arc<Definition>>,
    /// Every primary and bound key of every definition
    index: HashMap<(TypeKey, Qualifier), Arc<Definition>>,
}

impl Bucket {
    fn find(&self, key: &TypeKey, qualifier: &Qualifier) -> Option<&Arc<Definition>> {
        self.index.get(&(*key, qualifier.clone()))
    }

    fn insert(&mut self, definition: Arc<Definition>) {
        for key in definition.type_keys() {
            self.index
                .insert((key, definition.qualifier().clone()), definition.clone());
        }
        self.ordered.push(definition);
    }

    fn remove_definition(&mut self, id: DefinitionId) -> Option<Arc<Definition>> {
        let position = self.ordered.iter().position(|d| d.id() == id)?;
        let removed = self.ordered.remove(position);
        self.index.retain(|_, d| d.id() != id);
        Some(removed)
    }

    fn remove_module(&mut self, module: ModuleId) -> Vec<Arc<Definition>> {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .ordered
            .drain(..)
            .partition(|d| d.module_id() == module);
        self.ordered = kept;
        self.index.retain(|_, d| d.module_id() != module);
        removed
    }

    fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[derive(Default)]
pub struct Registry {
    buckets: HashMap<ScopeClass, Bucket>,
    modules: HashSet<ModuleId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every definition of `module`, all or nothing.
    ///
    /// Returns the definitions that were replaced through override, so the
    /// caller can evict the instances they produced.
    pub fn insert_module(&mut self, module: &Module) -> DIResult<Vec<Arc<Definition>>> {
        let replaced = self.insert(module.definitions(), module.is_override())?;
        self.modules.insert(module.id());

        // a module whose every definition was overridden is no longer loaded
        let owners: HashSet<ModuleId> = replaced.iter().map(|d| d.module_id()).collect();
        for owner in owners {
            if !self.owns_definitions(owner) {
                self.modules.remove(&owner);
            }
        }
        Ok(replaced)
    }

    fn owns_definitions(&self, module: ModuleId) -> bool {
        self.buckets
            .values()
            .any(|bucket| bucket.ordered.iter().any(|d| d.module_id() == module))
    }

    /// Insert a batch of definitions.
    ///
    /// A key already taken (in the registry or earlier in the batch) is a
    /// `DefinitionConflict` unless the batch or the incoming definition allows
    /// override, in which case the previous definition is removed under every
    /// key it was bound to. The batch is validated before anything is written.
    pub fn insert(
        &mut self,
        definitions: &[Arc<Definition>],
        allow_override: bool,
    ) -> DIResult<Vec<Arc<Definition>>> {
        let mut claimed: HashSet<(ScopeClass, TypeKey, Qualifier)> = HashSet::new();
        for definition in definitions {
            let may_override = allow_override || definition.is_override();
            for key in definition.type_keys() {
                let slot = (
                    definition.scope_class().clone(),
                    key,
                    definition.qualifier().clone(),
                );
                let taken = claimed.contains(&slot)
                    || self
                        .find(definition.scope_class(), &key, definition.qualifier())
                        .is_some();
                if taken && !may_override {
                    return Err(DIError::conflict(
                        &key,
                        definition.qualifier(),
                        definition.scope_class(),
                    ));
                }
                claimed.insert(slot);
            }
        }

        let mut replaced = Vec::new();
        for definition in definitions {
            let bucket = self
                .buckets
                .entry(definition.scope_class().clone())
                .or_default();

            let mut previous: Vec<DefinitionId> = definition
                .type_keys()
                .filter_map(|key| bucket.find(&key, definition.qualifier()).map(|d| d.id()))
                .collect();
            previous.sort();
            previous.dedup();

            for id in previous {
                if let Some(old) = bucket.remove_definition(id) {
                    replaced.push(old);
                }
            }
            bucket.insert(definition.clone());
        }

        Ok(replaced)
    }

    /// Remove everything `module` contributed. Unknown modules are a no-op.
    pub fn remove(&mut self, module: ModuleId) -> Vec<Arc<Definition>> {
        self.modules.remove(&module);

        let mut removed = Vec::new();
        for bucket in self.buckets.values_mut() {
            removed.extend(bucket.remove_module(module));
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    /// Exact lookup in one scope class. Falling back to a parent class is
    /// the scope's job, not the registry's.
    pub fn find(
        &self,
        scope_class: &ScopeClass,
        key: &TypeKey,
        qualifier: &Qualifier,
    ) -> Option<Arc<Definition>> {
        self.buckets
            .get(scope_class)
            .and_then(|bucket| bucket.find(key, qualifier))
            .cloned()
    }

    /// Whether `definition` itself (not a replacement) is still registered
    pub fn contains_definition(&self, definition: &Definition) -> bool {
        self.find(
            definition.scope_class(),
            &definition.primary_type(),
            definition.qualifier(),
        )
        .is_some_and(|current| current.id() == definition.id())
    }

    /// Every definition bound to `key` in one scope class, any qualifier,
    /// in insertion order
    pub fn find_all(&self, scope_class: &ScopeClass, key: &TypeKey) -> Vec<Arc<Definition>> {
        self.buckets
            .get(scope_class)
            .map(|bucket| {
                bucket
                    .ordered
                    .iter()
                    .filter(|d| d.binds(key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Map a host-supplied type name to a registered key
    pub fn find_type_by_name(&self, name: &str) -> Option<TypeKey> {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.ordered.iter())
            .flat_map(|definition| definition.type_keys())
            .find(|key| key.name() == name)
    }

    /// Drop every definition, returning them
    pub fn clear(&mut self) -> Vec<Arc<Definition>> {
        self.modules.clear();
        self.buckets
            .drain()
            .flat_map(|(_, bucket)| bucket.ordered)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.ordered.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn contains_module(&self, module: ModuleId) -> bool {
        self.modules.contains(&module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::named;

    #[derive(Debug)]
    struct MySingle(u32);
    struct Other;

    trait Marker: Send + Sync {}
    impl Marker for MySingle {}

    #[test]
    fn test_insert_and_find() -> DIResult<()> {
        let mut registry = Registry::new();
        let module = Module::new(|m| {
            m.single(|_| Ok(MySingle(1)))
                .bind::<dyn Marker, _>(|s| s as Arc<dyn Marker>);
            m.single(|_| Ok(Other)).named("other");
        });

        assert!(registry.insert_module(&module)?.is_empty());
        assert_eq!(registry.len(), 2);
        assert!(registry.contains_module(module.id()));

        let root = ScopeClass::Root;
        assert!(registry
            .find(&root, &TypeKey::of::<MySingle>(), &Qualifier::Default)
            .is_some());
        assert!(registry
            .find(&root, &TypeKey::of::<dyn Marker>(), &Qualifier::Default)
            .is_some());
        assert!(registry
            .find(&root, &TypeKey::of::<Other>(), &Qualifier::Default)
            .is_none());
        assert!(registry
            .find(&root, &TypeKey::of::<Other>(), &named("other"))
            .is_some());
        Ok(())
    }

    #[test]
    fn test_conflict_without_override_inserts_nothing() {
        let mut registry = Registry::new();
        let first = Module::new(|m| {
            m.single(|_| Ok(MySingle(42)));
        });
        let second = Module::new(|m| {
            m.single(|_| Ok(Other));
            m.single(|_| Ok(MySingle(24)));
        });

        registry.insert_module(&first).unwrap();
        let err = registry.insert_module(&second).unwrap_err();

        assert!(matches!(err, DIError::DefinitionConflict { .. }));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains_module(second.id()));
        assert!(registry
            .find(&ScopeClass::Root, &TypeKey::of::<Other>(), &Qualifier::Default)
            .is_none());
    }

    #[test]
    fn test_duplicate_inside_one_module_conflicts() {
        let mut registry = Registry::new();
        let module = Module::new(|m| {
            m.single(|_| Ok(MySingle(1)));
            m.factory(|_| Ok(MySingle(2)));
        });

        assert!(registry.insert_module(&module).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_override_replaces_under_every_key() -> DIResult<()> {
        let mut registry = Registry::new();
        let first = Module::new(|m| {
            m.single(|_| Ok(MySingle(42)))
                .bind::<dyn Marker, _>(|s| s as Arc<dyn Marker>);
        });
        let second = Module::with_override(|m| {
            m.single(|_| Ok(MySingle(24)));
        });

        registry.insert_module(&first)?;
        let replaced = registry.insert_module(&second)?;

        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].module_id(), first.id());
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains_module(first.id()));
        assert_eq!(registry.module_count(), 1);

        let found = registry
            .find(&ScopeClass::Root, &TypeKey::of::<MySingle>(), &Qualifier::Default)
            .expect("overriding definition");
        assert_eq!(found.module_id(), second.id());
        assert!(registry
            .find(&ScopeClass::Root, &TypeKey::of::<dyn Marker>(), &Qualifier::Default)
            .is_none());
        Ok(())
    }

    #[test]
    fn test_partially_overridden_module_stays_loaded() -> DIResult<()> {
        let mut registry = Registry::new();
        let first = Module::new(|m| {
            m.single(|_| Ok(MySingle(42)));
            m.single(|_| Ok(Other));
        });
        let second = Module::with_override(|m| {
            m.single(|_| Ok(MySingle(24)));
        });

        registry.insert_module(&first)?;
        registry.insert_module(&second)?;

        assert!(registry.contains_module(first.id()));
        assert_eq!(registry.module_count(), 2);
        assert_eq!(registry.remove(first.id()).len(), 1);
        assert_eq!(registry.module_count(), 1);
        Ok(())
    }

    #[test]
    fn test_remove_module_is_idempotent() -> DIResult<()> {
        let mut registry = Registry::new();
        let module = Module::new(|m| {
            m.single(|_| Ok(MySingle(1)));
            m.scope(named("S"), |s| {
                s.scoped(|_| Ok(Other));
            });
        });
        registry.insert_module(&module)?;

        assert_eq!(registry.remove(module.id()).len(), 2);
        assert!(registry.remove(module.id()).is_empty());
        assert!(registry.is_empty());
        assert_eq!(registry.module_count(), 0);
        Ok(())
    }

    #[test]
    fn test_find_all_keeps_insertion_order() -> DIResult<()> {
        let mut registry = Registry::new();
        let module = Module::new(|m| {
            m.single(|_| Ok(MySingle(1)))
                .named("b")
                .bind::<dyn Marker, _>(|s| s as Arc<dyn Marker>);
            m.single(|_| Ok(Other));
            m.single(|_| Ok(MySingle(2)))
                .named("a")
                .bind::<dyn Marker, _>(|s| s as Arc<dyn Marker>);
        });
        registry.insert_module(&module)?;

        let all = registry.find_all(&ScopeClass::Root, &TypeKey::of::<dyn Marker>());
        let qualifiers: Vec<_> = all.iter().map(|d| d.qualifier().clone()).collect();
        assert_eq!(qualifiers, vec![named("b"), named("a")]);
        Ok(())
    }

    #[test]
    fn test_find_type_by_name() -> DIResult<()> {
        let mut registry = Registry::new();
        registry.insert_module(&Module::new(|m| {
            m.single(|_| Ok(Other));
        }))?;

        let name = TypeKey::of::<Other>().name();
        assert_eq!(registry.find_type_by_name(name), Some(TypeKey::of::<Other>()));
        assert_eq!(registry.find_type_by_name("does::not::Exist"), None);
        Ok(())
    }
}
