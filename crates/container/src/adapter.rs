//! Construction-site hook for host frameworks.
//!
//! A host that instantiates objects from a runtime type name (a UI object
//! factory, a plugin loader) goes through `InstanceFactory` instead of
//! calling constructors itself.

use std::{any::Any, sync::Arc};

use crate::{
    container::Container,
    errors::{DIError, DIResult},
    parameters::Parameters,
    scope::Scope,
    types::{Instance, Qualifier, TypeKey},
};

/// Erased resolution, implemented by `Container` (root) and `Scope`
pub trait InstanceResolver: Send + Sync {
    fn resolve_instance(
        &self,
        key: &TypeKey,
        qualifier: &Qualifier,
        parameters: Parameters,
    ) -> DIResult<Instance>;
}

impl InstanceResolver for Scope {
    fn resolve_instance(
        &self,
        key: &TypeKey,
        qualifier: &Qualifier,
        parameters: Parameters,
    ) -> DIResult<Instance> {
        Scope::resolve_instance(self, key, qualifier, parameters)
    }
}

impl InstanceResolver for Container {
    fn resolve_instance(
        &self,
        key: &TypeKey,
        qualifier: &Qualifier,
        parameters: Parameters,
    ) -> DIResult<Instance> {
        self.create_instance(None, key, qualifier, parameters)
    }
}

/// Builds host objects by type name, from an attached scope if any
#[derive(Clone, Debug)]
pub struct InstanceFactory {
    container: Container,
    scope: Option<Scope>,
}

impl InstanceFactory {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// Resolve the type registered under `type_name`
    pub fn create_instance(
        &self,
        type_name: &str,
        qualifier: &Qualifier,
        parameters: Parameters,
    ) -> DIResult<Instance> {
        let key = self
            .container
            .find_type(type_name)
            .ok_or_else(|| DIError::DefinitionNotFound {
                type_name: type_name.to_string(),
                qualifier: qualifier.to_string(),
            })?;

        let resolver: &dyn InstanceResolver = match &self.scope {
            Some(scope) => scope,
            None => &self.container,
        };
        resolver.resolve_instance(&key, qualifier, parameters)
    }

    /// `create_instance` followed by a downcast to the concrete type
    pub fn create<T: Any + Send + Sync>(&self, type_name: &str) -> DIResult<Arc<T>> {
        let instance = self.create_instance(type_name, &Qualifier::Default, Parameters::empty())?;
        Scope::downcast(instance)
    }
}
