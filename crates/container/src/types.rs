//! Identity primitives used to address definitions and cached instances.

use std::{
    any::{type_name, Any, TypeId},
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Type-erased instance as stored in caches and handed to casts
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Opaque key for a requested or bound type.
///
/// Equality and hashing use the `TypeId` only; the name is carried for
/// diagnostics and for hosts that address types by name.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Secondary key distinguishing several definitions of one type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Qualifier {
    /// No explicit qualifier
    #[default]
    Default,
    Named(Cow<'static, str>),
    Type(TypeKey),
}

/// String qualifier, e.g. `named("primary")`
pub fn named(name: impl Into<Cow<'static, str>>) -> Qualifier {
    Qualifier::Named(name.into())
}

/// Qualifier derived from a marker type
pub fn type_qualifier<T: ?Sized + 'static>() -> Qualifier {
    Qualifier::Type(TypeKey::of::<T>())
}

impl Qualifier {
    pub fn is_default(&self) -> bool {
        matches!(self, Qualifier::Default)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Default => f.write_str("_"),
            Qualifier::Named(name) => f.write_str(name),
            Qualifier::Type(key) => write!(f, "{}", key),
        }
    }
}

impl From<&'static str> for Qualifier {
    fn from(name: &'static str) -> Self {
        named(name)
    }
}

impl From<String> for Qualifier {
    fn from(name: String) -> Self {
        named(name)
    }
}

/// Which scope class a definition belongs to: the root, or a named class
/// shared by every scope instance created with that qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ScopeClass {
    #[default]
    Root,
    Named(Qualifier),
}

impl ScopeClass {
    pub fn is_root(&self) -> bool {
        matches!(self, ScopeClass::Root)
    }
}

impl fmt::Display for ScopeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeClass::Root => f.write_str("root"),
            ScopeClass::Named(qualifier) => write!(f, "{}", qualifier),
        }
    }
}

impl From<Qualifier> for ScopeClass {
    fn from(qualifier: Qualifier) -> Self {
        ScopeClass::Named(qualifier)
    }
}

impl From<&'static str> for ScopeClass {
    fn from(name: &'static str) -> Self {
        ScopeClass::Named(named(name))
    }
}

/// Identifier of one scope instance
pub type ScopeId = String;
