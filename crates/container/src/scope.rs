//! Scope - a resolution context with its own cache, chained to a parent
//!
//! Lookup is always child to root. A scope holds its parent strongly and its
//! children weakly, so dropping handles never forms a reference cycle.

use parking_lot::Mutex;
use std::{
    any::Any,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use crate::{
    cache::InstanceCache,
    container::ContainerCore,
    definition::Definition,
    errors::{DIError, DIResult},
    parameters::Parameters,
    resolver,
    types::{Instance, Qualifier, ScopeClass, ScopeId, TypeKey},
};

/// Id of the scope every container owns
pub const ROOT_SCOPE_ID: &str = "_root_";

pub(crate) struct ScopeInner {
    id: ScopeId,
    class: ScopeClass,
    parent: Mutex<Option<Scope>>,
    children: Mutex<Vec<Weak<ScopeInner>>>,
    cache: InstanceCache,
    closed: AtomicBool,
    core: Weak<ContainerCore>,
}

/// Cheap, cloneable handle to one scope instance
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub(crate) fn root(core: Weak<ContainerCore>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: ROOT_SCOPE_ID.to_string(),
                class: ScopeClass::Root,
                parent: Mutex::new(None),
                children: Mutex::new(Vec::new()),
                cache: InstanceCache::new(ROOT_SCOPE_ID),
                closed: AtomicBool::new(false),
                core,
            }),
        }
    }

    /// Attach a new child. Fails if this scope closed in the meantime.
    pub(crate) fn attach_child(&self, id: ScopeId, class: Qualifier) -> DIResult<Scope> {
        let mut children = self.inner.children.lock();
        if self.is_closed() {
            return Err(DIError::scope_closed(self.inner.id.clone()));
        }

        let child = Scope {
            inner: Arc::new(ScopeInner {
                cache: InstanceCache::new(id.clone()),
                id,
                class: ScopeClass::Named(class),
                parent: Mutex::new(Some(self.clone())),
                children: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                core: self.inner.core.clone(),
            }),
        };
        children.retain(|weak| weak.strong_count() > 0);
        children.push(Arc::downgrade(&child.inner));
        Ok(child)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn class(&self) -> &ScopeClass {
        &self.inner.class
    }

    pub fn is_root(&self) -> bool {
        self.inner.class.is_root()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// `None` for the root and for closed scopes
    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.lock().clone()
    }

    /// Number of instances currently cached in this scope
    pub fn instance_count(&self) -> usize {
        self.inner.cache.len()
    }

    pub(crate) fn cache(&self) -> &InstanceCache {
        &self.inner.cache
    }

    /// This scope followed by its ancestors up to the root
    pub(crate) fn lineage(&self) -> Vec<Scope> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent();
        while let Some(scope) = current {
            current = scope.parent();
            chain.push(scope);
        }
        chain
    }

    pub(crate) fn ensure_open(&self) -> DIResult<Arc<ContainerCore>> {
        if self.is_closed() {
            return Err(DIError::scope_closed(self.inner.id.clone()));
        }
        self.inner
            .core
            .upgrade()
            .ok_or_else(|| DIError::scope_closed(self.inner.id.clone()))
    }

    /// Whether both handles point at the same scope instance
    pub fn same_as(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a nested scope; its lookups fall back to this one
    pub fn create_scope(&self, id: impl Into<ScopeId>, class: impl Into<Qualifier>) -> DIResult<Scope> {
        let core = self.ensure_open()?;
        core.register_scope(self, id.into(), class.into())
    }

    pub fn get<T: ?Sized + 'static>(&self) -> DIResult<Arc<T>> {
        self.get_with(Qualifier::Default, Parameters::empty())
    }

    pub fn get_named<T: ?Sized + 'static>(&self, qualifier: impl Into<Qualifier>) -> DIResult<Arc<T>> {
        self.get_with(qualifier.into(), Parameters::empty())
    }

    pub fn get_with<T: ?Sized + 'static>(
        &self,
        qualifier: Qualifier,
        parameters: Parameters,
    ) -> DIResult<Arc<T>> {
        resolver::resolve_typed(self, &qualifier, parameters)
    }

    /// Like `get`, but any failure becomes `None`
    pub fn get_or_null<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.get_named_or_null(Qualifier::Default)
    }

    pub fn get_named_or_null<T: ?Sized + 'static>(&self, qualifier: impl Into<Qualifier>) -> Option<Arc<T>> {
        let qualifier = qualifier.into();
        match self.get_with(qualifier, Parameters::empty()) {
            Ok(instance) => Some(instance),
            Err(error) => {
                if let Ok(core) = self.ensure_open() {
                    core.logger.debug(&format!("get_or_null: {}", error));
                }
                None
            }
        }
    }

    pub fn get_all<T: ?Sized + 'static>(&self) -> DIResult<Vec<Arc<T>>> {
        resolver::resolve_all(self)
    }

    /// Erased entry point for hosts that only hold a `TypeKey`.
    ///
    /// Returns the instance as built by its definition, whichever of its
    /// bound keys was requested.
    pub fn resolve_instance(
        &self,
        key: &TypeKey,
        qualifier: &Qualifier,
        parameters: Parameters,
    ) -> DIResult<Instance> {
        resolver::resolve(self, key, qualifier, parameters)
            .map(|(_, instance)| instance)
    }

    /// The definition `get::<T>` would use, without building anything
    pub fn find_definition<T: ?Sized + 'static>(&self, qualifier: impl Into<Qualifier>) -> Option<Arc<Definition>> {
        let key = TypeKey::of::<T>();
        let qualifier = qualifier.into();
        let core = self.inner.core.upgrade()?;
        let lineage = self.lineage();
        let registry = core.registry.read();
        let found = lineage
            .iter()
            .find_map(|scope| registry.find(scope.class(), &key, &qualifier));
        found
    }

    /// Close this scope and every open descendant, disposing their cached
    /// instances. Idempotent. Closing the root closes the whole container.
    pub fn close(&self) {
        if self.is_root() {
            if let Some(core) = self.inner.core.upgrade() {
                core.close();
                return;
            }
        }
        self.close_tree();
    }

    /// Returns false if the scope was already closed
    pub(crate) fn close_tree(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let children: Vec<Scope> = self
            .inner
            .children
            .lock()
            .drain(..)
            .filter_map(|weak| weak.upgrade())
            .map(|inner| Scope { inner })
            .collect();
        for child in children {
            child.close_tree();
        }

        let evicted = self.inner.cache.evict_all();

        if let Some(parent) = self.inner.parent.lock().take() {
            parent.forget_child(self);
        }

        let core = self.inner.core.upgrade();
        if let Some(core) = &core {
            if !self.is_root() {
                core.scopes.write().remove(&self.inner.id);
            }
        }

        let disposed = evicted.len();
        for (definition, instance) in evicted {
            definition.close(&instance);
        }

        if let Some(core) = core {
            core.logger.debug(&format!(
                "| (-) scope '{}' closed, {} instance(s) disposed",
                self.inner.id, disposed
            ));
        }
        true
    }

    fn forget_child(&self, child: &Scope) {
        self.inner
            .children
            .lock()
            .retain(|weak| weak.upgrade().is_some_and(|inner| !Arc::ptr_eq(&inner, &child.inner)));
    }

    /// Downcast helper for erased instances handed out by `resolve_instance`
    pub fn downcast<T: Any + Send + Sync>(instance: Instance) -> DIResult<Arc<T>> {
        instance.downcast::<T>().map_err(|_| DIError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
        })
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("class", &self.inner.class)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "['{}' {}]", self.inner.id, self.inner.class)
    }
}
