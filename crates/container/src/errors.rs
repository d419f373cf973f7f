//! Error taxonomy for registration, resolution and lifecycle operations.
//!
//! Every variant is reported synchronously to the caller. Nothing is retried.
//! `DIError` is `Clone` because one failed construction is delivered to every
//! caller waiting on the same single-flight slot.

use thiserror::Error;

use crate::types::{Qualifier, ScopeClass, TypeKey};

pub type DIResult<T> = Result<T, DIError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DIError {
    /// Duplicate (scope class, type, qualifier) inserted without override
    #[error("Definition conflict for {type_name} (qualifier: {qualifier}, scope: {scope_class}) - enable override to replace it")]
    DefinitionConflict {
        type_name: String,
        qualifier: String,
        scope_class: String,
    },

    #[error("No definition found for {type_name} (qualifier: {qualifier})")]
    DefinitionNotFound { type_name: String, qualifier: String },

    #[error("Cyclic dependency detected: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("Scope '{scope_id}' is closed")]
    ScopeClosed { scope_id: String },

    /// The definition factory itself returned an error or panicked
    #[error("Could not create instance of {type_name}: {reason}")]
    ConstructionFailure { type_name: String, reason: String },

    #[error("Scope '{scope_id}' already exists")]
    ScopeAlreadyExists { scope_id: String },

    #[error("Scope '{scope_id}' not found")]
    ScopeNotFound { scope_id: String },

    #[error("No parameter at index {index} (expected {expected})")]
    ParameterMissing { index: usize, expected: String },

    #[error("Parameter at index {index} is not a {expected}")]
    ParameterTypeMismatch { index: usize, expected: String },

    #[error("Resolved instance cannot be viewed as {expected}")]
    TypeMismatch { expected: String },

    #[error("Global container is already started")]
    ContainerAlreadyStarted,

    #[error("Global container is not started")]
    ContainerNotStarted,
}

impl DIError {
    pub fn conflict(key: &TypeKey, qualifier: &Qualifier, scope_class: &ScopeClass) -> Self {
        DIError::DefinitionConflict {
            type_name: key.name().to_string(),
            qualifier: qualifier.to_string(),
            scope_class: scope_class.to_string(),
        }
    }

    pub fn not_found(key: &TypeKey, qualifier: &Qualifier) -> Self {
        DIError::DefinitionNotFound {
            type_name: key.name().to_string(),
            qualifier: qualifier.to_string(),
        }
    }

    pub fn scope_closed(scope_id: impl Into<String>) -> Self {
        DIError::ScopeClosed {
            scope_id: scope_id.into(),
        }
    }

    /// Map a factory error: nested container errors pass through untouched,
    /// anything else becomes `ConstructionFailure` with the full cause chain.
    pub fn from_factory(key: &TypeKey, error: anyhow::Error) -> Self {
        match error.downcast::<DIError>() {
            Ok(inner) => inner,
            Err(other) => DIError::ConstructionFailure {
                type_name: key.name().to_string(),
                reason: format!("{:#}", other),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DIError::DefinitionNotFound { .. })
    }
}
