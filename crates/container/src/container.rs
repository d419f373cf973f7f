//! Container - owns the registry, the root scope and every open child scope

use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::HashMap, fmt, sync::Arc};
use uuid::Uuid;

use crate::{
    config::ContainerConfig,
    definition::Definition,
    errors::{DIError, DIResult},
    logger::{EmptyLogger, Level, Logger, TracingLogger},
    module::Module,
    parameters::Parameters,
    registry::Registry,
    scope::{Scope, ROOT_SCOPE_ID},
    types::{Instance, Qualifier, ScopeId, TypeKey},
};

pub(crate) struct ContainerCore {
    pub(crate) registry: RwLock<Registry>,
    /// Every open non-root scope, nested ones included
    pub(crate) scopes: RwLock<HashMap<ScopeId, Scope>>,
    pub(crate) root: Scope,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) properties: RwLock<HashMap<String, String>>,
}

impl ContainerCore {
    fn new(logger: Arc<dyn Logger>, properties: HashMap<String, String>) -> Arc<Self> {
        Arc::new_cyclic(|core| ContainerCore {
            registry: RwLock::new(Registry::new()),
            scopes: RwLock::new(HashMap::new()),
            root: Scope::root(core.clone()),
            logger,
            properties: RwLock::new(properties),
        })
    }

    pub(crate) fn register_scope(&self, parent: &Scope, id: ScopeId, class: Qualifier) -> DIResult<Scope> {
        let mut scopes = self.scopes.write();
        if id == ROOT_SCOPE_ID || scopes.contains_key(&id) {
            drop(scopes);
            self.logger
                .error(&format!("Scope '{}' already exists", id));
            return Err(DIError::ScopeAlreadyExists { scope_id: id });
        }

        let scope = parent.attach_child(id.clone(), class)?;
        scopes.insert(id, scope.clone());
        drop(scopes);

        self.logger.debug(&format!(
            "| (+) scope {} created under '{}'",
            scope,
            parent.id()
        ));
        Ok(scope)
    }

    pub(crate) fn property(&self, key: &str) -> Option<String> {
        self.properties.read().get(key).cloned()
    }

    /// Close every scope, dispose root instances and drop all definitions
    pub(crate) fn close(&self) {
        if !self.root.close_tree() {
            return;
        }

        let (definitions, modules) = {
            let mut registry = self.registry.write();
            let modules = registry.module_count();
            (registry.clear().len(), modules)
        };
        self.scopes.write().clear();

        self.logger.info(&format!(
            "Container closed ({} definitions from {} modules dropped)",
            definitions, modules
        ));
    }
}

/// Snapshot of container state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub definitions: usize,
    pub modules: usize,
    pub open_scopes: usize,
    pub root_instances: usize,
}

/// Runtime DI container.
///
/// Cloning is cheap; clones share the same registry and scopes.
#[derive(Clone)]
pub struct Container {
    core: Arc<ContainerCore>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Empty container with the no-op logger
    pub fn new() -> Self {
        Self {
            core: ContainerCore::new(Arc::new(EmptyLogger), HashMap::new()),
        }
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn root(&self) -> &Scope {
        &self.core.root
    }

    pub fn logger(&self) -> &dyn Logger {
        self.core.logger.as_ref()
    }

    /// Load modules in order. A conflicting module aborts the batch; modules
    /// before it stay loaded.
    pub fn load(&self, modules: &[Module], create_eager_instances: bool) -> DIResult<()> {
        self.core.load(modules, create_eager_instances)
    }

    pub fn load_modules(&self, modules: &[Module]) -> DIResult<()> {
        self.load(modules, false)
    }

    /// Remove the modules' definitions and dispose what they built.
    /// Modules that are not loaded are skipped.
    pub fn unload_modules(&self, modules: &[Module]) {
        self.core.unload(modules)
    }

    /// Unload then load; every cached instance of these modules is rebuilt
    /// on next use
    pub fn reload_modules(&self, modules: &[Module]) -> DIResult<()> {
        self.core.reload(modules)
    }

    pub fn get<T: ?Sized + 'static>(&self) -> DIResult<Arc<T>> {
        self.root().get()
    }

    pub fn get_named<T: ?Sized + 'static>(&self, qualifier: impl Into<Qualifier>) -> DIResult<Arc<T>> {
        self.root().get_named(qualifier)
    }

    pub fn get_with<T: ?Sized + 'static>(
        &self,
        qualifier: Qualifier,
        parameters: Parameters,
    ) -> DIResult<Arc<T>> {
        self.root().get_with(qualifier, parameters)
    }

    pub fn get_or_null<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.root().get_or_null()
    }

    pub fn get_named_or_null<T: ?Sized + 'static>(&self, qualifier: impl Into<Qualifier>) -> Option<Arc<T>> {
        self.root().get_named_or_null(qualifier)
    }

    pub fn get_all<T: ?Sized + 'static>(&self) -> DIResult<Vec<Arc<T>>> {
        self.root().get_all()
    }

    pub fn find_definition<T: ?Sized + 'static>(&self, qualifier: impl Into<Qualifier>) -> Option<Arc<Definition>> {
        self.root().find_definition::<T>(qualifier)
    }

    /// Construction-site hook: build or fetch the instance registered under
    /// `key`, from `scope` if given, otherwise from the root.
    pub fn create_instance(
        &self,
        scope: Option<&Scope>,
        key: &TypeKey,
        qualifier: &Qualifier,
        parameters: Parameters,
    ) -> DIResult<Instance> {
        scope
            .unwrap_or(self.root())
            .resolve_instance(key, qualifier, parameters)
    }

    /// Map a host-supplied type name to a registered key
    pub fn find_type(&self, name: &str) -> Option<TypeKey> {
        self.core.registry.read().find_type_by_name(name)
    }

    pub fn create_scope(&self, id: impl Into<ScopeId>, class: impl Into<Qualifier>) -> DIResult<Scope> {
        self.root().create_scope(id, class)
    }

    /// Scope with a generated id
    pub fn create_anonymous_scope(&self, class: impl Into<Qualifier>) -> DIResult<Scope> {
        self.create_scope(Uuid::new_v4().to_string(), class)
    }

    pub fn get_scope(&self, id: &str) -> DIResult<Scope> {
        self.get_scope_or_null(id).ok_or_else(|| DIError::ScopeNotFound {
            scope_id: id.to_string(),
        })
    }

    pub fn get_scope_or_null(&self, id: &str) -> Option<Scope> {
        self.core.scopes.read().get(id).cloned()
    }

    /// Close the scope with `id`. Returns false if no such scope is open.
    pub fn delete_scope(&self, id: &str) -> bool {
        match self.get_scope_or_null(id) {
            Some(scope) => {
                scope.close();
                true
            }
            None => false,
        }
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.core.property(key)
    }

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) {
        self.core.properties.write().insert(key.into(), value.into());
    }

    pub fn is_closed(&self) -> bool {
        self.core.root.is_closed()
    }

    /// Close every scope and drop every definition. Resolution afterwards
    /// fails with `ScopeClosed`. Idempotent.
    pub fn close(&self) {
        self.core.close()
    }

    pub fn stats(&self) -> ContainerStats {
        let (definitions, modules) = {
            let registry = self.core.registry.read();
            (registry.len(), registry.module_count())
        };
        ContainerStats {
            definitions,
            modules,
            open_scopes: self.core.scopes.read().len(),
            root_instances: self.core.root.instance_count(),
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Fluent setup: logger, properties and initial modules
pub struct ContainerBuilder {
    logger: Arc<dyn Logger>,
    modules: Vec<Module>,
    create_eager_instances: bool,
    properties: HashMap<String, String>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            logger: Arc::new(EmptyLogger),
            modules: Vec::new(),
            create_eager_instances: false,
            properties: HashMap::new(),
        }
    }

    pub fn logger(self, logger: impl Logger + 'static) -> Self {
        self.with_logger(Arc::new(logger))
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Apply log level, eager flag and properties from configuration
    pub fn with_config(mut self, config: &ContainerConfig) -> Self {
        if config.log_level != Level::None {
            self.logger = Arc::new(TracingLogger::new(config.log_level));
        }
        self.create_eager_instances = config.create_eager_instances;
        self.properties
            .extend(config.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    pub fn modules(mut self, modules: impl IntoIterator<Item = Module>) -> Self {
        self.modules.extend(modules);
        self
    }

    pub fn create_eager_instances(mut self, enabled: bool) -> Self {
        self.create_eager_instances = enabled;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> DIResult<Container> {
        let container = Container {
            core: ContainerCore::new(self.logger, self.properties),
        };
        container.load(&self.modules, self.create_eager_instances)?;
        Ok(container)
    }
}
