//! Load/Unload Coordinator
//!
//! Registry mutation and cache eviction happen inside one registry write
//! section, so no resolution can repopulate a cache from a definition that
//! is being removed. `on_close` callbacks and eager construction run after
//! the section ends.

use std::{collections::HashSet, sync::Arc, time::Instant};

use crate::{
    container::ContainerCore,
    definition::{Definition, DefinitionId, Kind},
    errors::{DIError, DIResult},
    logger::Level,
    module::Module,
    parameters::Parameters,
    resolver,
    types::Instance,
};

type Evicted = Vec<(Arc<Definition>, Instance)>;

impl ContainerCore {
    pub(crate) fn load(&self, modules: &[Module], create_eager_instances: bool) -> DIResult<()> {
        let started = Instant::now();
        let mut evicted = Evicted::new();
        let mut loaded = Vec::with_capacity(modules.len());
        let mut failure = None;

        {
            let mut registry = self.registry.write();
            if self.root.is_closed() {
                return Err(DIError::scope_closed(self.root.id()));
            }

            for module in modules {
                match registry.insert_module(module) {
                    Ok(replaced) => {
                        if !replaced.is_empty() {
                            self.logger.info(&format!(
                                "{} overrides {} definition(s)",
                                module.id(),
                                replaced.len()
                            ));
                            evicted.extend(self.evict_definitions(&replaced));
                        }
                        loaded.push(module);
                    }
                    Err(error) => {
                        self.logger
                            .error(&format!("Failed to load {}: {}", module.id(), error));
                        failure = Some(error);
                        break;
                    }
                }
            }
        }

        dispose(evicted);

        let definitions: usize = loaded.iter().map(|module| module.len()).sum();
        if !loaded.is_empty() {
            self.logger.info(&format!(
                "Loaded {} definitions from {} module(s) in {:?}",
                definitions,
                loaded.len(),
                started.elapsed()
            ));
        }

        if let Some(error) = failure {
            return Err(error);
        }
        if create_eager_instances {
            self.create_eager_instances(&loaded)?;
        }
        Ok(())
    }

    pub(crate) fn unload(&self, modules: &[Module]) {
        let mut evicted = Evicted::new();
        let mut removed_total = 0;

        {
            let mut registry = self.registry.write();
            for module in modules {
                let removed = registry.remove(module.id());
                if removed.is_empty() {
                    self.logger
                        .debug(&format!("{} is not loaded, nothing to unload", module.id()));
                    continue;
                }
                removed_total += removed.len();
                evicted.extend(self.evict_definitions(&removed));
            }
        }

        let disposed = evicted.len();
        dispose(evicted);

        if removed_total > 0 {
            self.logger.info(&format!(
                "Unloaded {} definitions, disposed {} instance(s)",
                removed_total, disposed
            ));
        }
    }

    pub(crate) fn reload(&self, modules: &[Module]) -> DIResult<()> {
        self.unload(modules);
        self.load(modules, false)
    }

    /// Evict instances built by `definitions` from the root and every open
    /// scope. Caller holds the registry write lock.
    fn evict_definitions(&self, definitions: &[Arc<Definition>]) -> Evicted {
        let ids: HashSet<DefinitionId> = definitions
            .iter()
            .filter(|definition| definition.kind().is_cached())
            .map(|definition| definition.id())
            .collect();
        if ids.is_empty() {
            return Evicted::new();
        }

        let mut evicted = self.root.cache().evict_by_definitions(&ids);
        for scope in self.scopes.read().values() {
            evicted.extend(scope.cache().evict_by_definitions(&ids));
        }
        evicted
    }

    /// Resolve every root `Single` of the loaded modules, in load order
    fn create_eager_instances(&self, modules: &[&Module]) -> DIResult<()> {
        let eager: Vec<&Arc<Definition>> = modules
            .iter()
            .flat_map(|module| module.definitions())
            .filter(|definition| definition.kind() == Kind::Single && definition.scope_class().is_root())
            .collect();
        if eager.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        for definition in &eager {
            resolver::resolve(
                &self.root,
                &definition.primary_type(),
                definition.qualifier(),
                Parameters::empty(),
            )?;
        }

        if self.logger.is_at(Level::Debug) {
            self.logger.debug(&format!(
                "Created {} eager instance(s) in {:?}",
                eager.len(),
                started.elapsed()
            ));
        }
        Ok(())
    }
}

/// Run `on_close` for evicted instances. No container lock may be held.
fn dispose(evicted: Evicted) {
    for (definition, instance) in evicted {
        definition.close(&instance);
    }
}
