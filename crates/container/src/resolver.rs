//! Resolver - per-call instance context and the resolution algorithm
//!
//! Locking order for one resolution:
//! 1. walk the scope chain and find the definition under the registry read lock
//! 2. claim the owning scope's cache slot under the same read lock
//! 3. release the lock, then build or wait
//!
//! Unload takes the registry write lock for removal and eviction together,
//! so a resolution either claimed its slot before the unload (and gets
//! tombstoned) or does not see the definition at all.

use parking_lot::RwLockReadGuard;
use std::{
    any::{type_name, Any},
    cell::RefCell,
    collections::HashSet,
    marker::PhantomData,
    sync::Arc,
    time::Instant,
};

use crate::{
    cache::{CacheKey, Claim},
    container::ContainerCore,
    definition::Definition,
    errors::{DIError, DIResult},
    logger::Level,
    parameters::Parameters,
    registry::Registry,
    scope::Scope,
    types::{Instance, Qualifier, TypeKey},
};

thread_local! {
    /// Constructions running on this thread, outermost first
    static IN_FLIGHT: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// One in-flight construction. The container address keeps two containers
/// resolving the same type on one thread from looking like a cycle.
#[derive(Clone, PartialEq, Eq)]
struct Frame {
    container: usize,
    key: CacheKey,
}

impl Frame {
    fn new(core: &ContainerCore, key: CacheKey) -> Self {
        Self {
            container: core as *const ContainerCore as usize,
            key,
        }
    }
}

fn in_flight(frame: &Frame) -> bool {
    IN_FLIGHT.with(|frames| frames.borrow().contains(frame))
}

/// Chain from the first visit of `frame` back to `frame`
fn cycle(frame: &Frame) -> Vec<String> {
    IN_FLIGHT.with(|frames| {
        let frames = frames.borrow();
        let start = frames.iter().position(|f| f == frame).unwrap_or(0);
        frames[start..]
            .iter()
            .filter(|f| f.container == frame.container)
            .chain(std::iter::once(frame))
            .map(|f| describe(&f.key))
            .collect()
    })
}

fn enter(frame: Frame) -> StackFrame {
    IN_FLIGHT.with(|frames| frames.borrow_mut().push(frame));
    StackFrame {
        _thread_bound: PhantomData,
    }
}

/// Pops its frame on drop, including when the factory fails or panics
struct StackFrame {
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for StackFrame {
    fn drop(&mut self) {
        IN_FLIGHT.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

fn describe((key, qualifier): &CacheKey) -> String {
    if qualifier.is_default() {
        key.name().to_string()
    } else {
        format!("{}({})", key.name(), qualifier)
    }
}

/// What a definition factory receives.
///
/// Nested `get` calls resolve against the scope that owns the instance being
/// built. They start with empty parameters unless `get_with` is used.
///
/// Cycle detection follows the thread, not the context: resolving through
/// `scope()` or a captured `Container` from inside a factory is checked the
/// same way as `get`.
pub struct InstanceContext<'a> {
    scope: &'a Scope,
    parameters: Parameters,
}

impl<'a> InstanceContext<'a> {
    pub(crate) fn new(scope: &'a Scope, parameters: Parameters) -> Self {
        Self { scope, parameters }
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Positional runtime parameter
    pub fn param<T: Any + Clone>(&self, index: usize) -> DIResult<T> {
        self.parameters.get(index)
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
        resolve_typed(self.scope, &qualifier, parameters)
    }

    pub fn get_or_null<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.get().ok()
    }

    pub fn get_all<T: ?Sized + 'static>(&self) -> DIResult<Vec<Arc<T>>> {
        resolve_all(self.scope)
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.scope.ensure_open().ok()?.property(key)
    }
}

/// Resolve `T` from `scope` and view it as `Arc<T>`
pub(crate) fn resolve_typed<T: ?Sized + 'static>(
    scope: &Scope,
    qualifier: &Qualifier,
    parameters: Parameters,
) -> DIResult<Arc<T>> {
    let key = TypeKey::of::<T>();
    let (definition, instance) = resolve(scope, &key, qualifier, parameters)?;
    view(&definition, &key, &instance)
}

/// Erased resolution: walk the chain from `scope` to root, then instantiate
/// in the nearest scope whose class holds the definition.
pub(crate) fn resolve(
    scope: &Scope,
    key: &TypeKey,
    qualifier: &Qualifier,
    parameters: Parameters,
) -> DIResult<(Arc<Definition>, Instance)> {
    let core = scope.ensure_open()?;
    let lineage = scope.lineage();

    let registry = core.registry.read();
    let found = lineage.iter().find_map(|candidate| {
        registry
            .find(candidate.class(), key, qualifier)
            .map(|definition| (candidate, definition))
    });

    let Some((owner, definition)) = found else {
        drop(registry);
        core.logger.error(&format!(
            "No definition found for '{}' (qualifier: {}) from scope '{}'",
            key,
            qualifier,
            scope.id()
        ));
        return Err(DIError::not_found(key, qualifier));
    };

    let instance = instantiate(&core, owner, &definition, registry, parameters)?;
    Ok((definition, instance))
}

/// Every definition bound to `T`, from the scope's class up to the root's
pub(crate) fn resolve_all<T: ?Sized + 'static>(scope: &Scope) -> DIResult<Vec<Arc<T>>> {
    let key = TypeKey::of::<T>();
    let core = scope.ensure_open()?;
    let lineage = scope.lineage();

    let candidates: Vec<(Scope, Arc<Definition>)> = {
        let registry = core.registry.read();
        let mut classes = HashSet::new();
        let listed: Vec<_> = lineage
            .iter()
            .filter(|candidate| classes.insert(candidate.class().clone()))
            .flat_map(|candidate| {
                registry
                    .find_all(candidate.class(), &key)
                    .into_iter()
                    .map(move |definition| (candidate.clone(), definition))
            })
            .collect();
        listed
    };

    let mut instances = Vec::with_capacity(candidates.len());
    for (owner, definition) in candidates {
        let registry = core.registry.read();
        // unloaded since the listing
        if !registry.contains_definition(&definition) {
            continue;
        }
        let instance = instantiate(&core, &owner, &definition, registry, Parameters::empty())?;
        instances.push(view(&definition, &key, &instance)?);
    }
    Ok(instances)
}

fn view<T: ?Sized + 'static>(
    definition: &Definition,
    key: &TypeKey,
    instance: &Instance,
) -> DIResult<Arc<T>> {
    definition
        .cast(key, instance)
        .and_then(|boxed| boxed.downcast::<Arc<T>>().ok())
        .map(|typed| *typed)
        .ok_or_else(|| DIError::TypeMismatch {
            expected: type_name::<T>().to_string(),
        })
}

/// Called with the registry read lock held; releases it before any factory
/// runs or any wait starts.
fn instantiate(
    core: &ContainerCore,
    owner: &Scope,
    definition: &Arc<Definition>,
    registry: RwLockReadGuard<'_, Registry>,
    parameters: Parameters,
) -> DIResult<Instance> {
    let key: CacheKey = (definition.primary_type(), definition.qualifier().clone());
    let frame = Frame::new(core, key.clone());

    if in_flight(&frame) {
        drop(registry);
        let error = DIError::CyclicDependency {
            chain: cycle(&frame),
        };
        core.logger.error(&error.to_string());
        return Err(error);
    }

    if !definition.kind().is_cached() {
        drop(registry);
        return build(core, owner, definition, frame, parameters);
    }

    let claim = owner.cache().claim(key.clone(), definition)?;
    drop(registry);

    match claim {
        Claim::Ready(instance) => Ok(instance),
        Claim::Wait(slot) => slot.wait(),
        Claim::Build(guard) => {
            let result = build(core, owner, definition, frame, parameters);
            guard.finish(&result);
            result
        }
    }
}

fn build(
    core: &ContainerCore,
    owner: &Scope,
    definition: &Definition,
    frame: Frame,
    parameters: Parameters,
) -> DIResult<Instance> {
    let _frame = enter(frame);
    let ctx = InstanceContext::new(owner, parameters);

    let started = Instant::now();
    let result = definition
        .create(&ctx)
        .map_err(|error| DIError::from_factory(&definition.primary_type(), error));

    match &result {
        Ok(_) if core.logger.is_at(Level::Debug) => core.logger.debug(&format!(
            "| (+) {} created in scope '{}' in {:?}",
            definition,
            owner.id(),
            started.elapsed()
        )),
        Err(error @ DIError::ConstructionFailure { .. }) => core.logger.error(&format!(
            "Instance creation failed for {}: {}",
            definition, error
        )),
        _ => {}
    }
    result
}
