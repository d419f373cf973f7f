//! Runtime dependency injection container.
//!
//! Modules declare definitions (single, factory, scoped) keyed by type and
//! qualifier. A `Container` resolves them lazily with single-flight
//! construction, falls back from child scopes to the root, and can load,
//! unload and reload modules while resolutions are in flight.
//!
//! ```
//! use std::sync::Arc;
//! use container::{Container, Module};
//!
//! trait Repo: Send + Sync {
//!     fn name(&self) -> &str;
//! }
//!
//! struct SqlRepo;
//! impl Repo for SqlRepo {
//!     fn name(&self) -> &str {
//!         "sql"
//!     }
//! }
//!
//! struct Service {
//!     repo: Arc<dyn Repo>,
//! }
//!
//! let module = Module::new(|m| {
//!     m.single(|_| Ok(SqlRepo)).bind::<dyn Repo, _>(|r| r as Arc<dyn Repo>);
//!     m.factory(|ctx| Ok(Service { repo: ctx.get::<dyn Repo>()? }));
//! });
//!
//! let container = Container::new();
//! container.load_modules(&[module]).unwrap();
//! assert_eq!(container.get::<Service>().unwrap().repo.name(), "sql");
//! ```

pub mod adapter;
mod cache;
pub mod config;
pub mod container;
pub mod definition;
pub mod errors;
pub mod global;
mod loader;
pub mod logger;
pub mod module;
pub mod parameters;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod types;

pub use adapter::{InstanceFactory, InstanceResolver};
pub use config::{ConfigLoader, ContainerConfig};
pub use container::{Container, ContainerBuilder, ContainerStats};
pub use definition::{Definition, DefinitionBuilder, DefinitionId, Kind};
pub use errors::{DIError, DIResult};
pub use logger::{EmptyLogger, Level, Logger, TracingLogger};
pub use module::{Module, ModuleBuilder, ModuleId, ScopeBuilder};
pub use parameters::Parameters;
pub use resolver::InstanceContext;
pub use scope::{Scope, ROOT_SCOPE_ID};
pub use types::{named, type_qualifier, Instance, Qualifier, ScopeClass, ScopeId, TypeKey};
