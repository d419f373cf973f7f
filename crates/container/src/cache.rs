//! Instance Cache - per-scope storage with single-flight construction
//!
//! One `InstanceCache` belongs to one scope instance. A slot is inserted in
//! `Constructing` state by the first caller (the builder); later callers for
//! the same key wait on the slot's condvar instead of running the factory
//! again.
//!
//! Eviction uses tombstone-and-discard: an evicted slot leaves the map at
//! once. If it was still constructing it is flagged, and the builder's result
//! goes to the builder and current waiters only, never into the map.

use parking_lot::{Condvar, Mutex};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::trace;

use crate::{
    definition::{Definition, DefinitionId},
    errors::{DIError, DIResult},
    types::{Instance, Qualifier, ScopeId, TypeKey},
};

/// Cache key: the owning definition's primary type and qualifier
pub(crate) type CacheKey = (TypeKey, Qualifier);

enum SlotState {
    Constructing,
    Ready(Instance),
    Failed(DIError),
}

struct SlotInner {
    state: SlotState,
    tombstoned: bool,
}

pub(crate) struct Slot {
    definition: Arc<Definition>,
    inner: Mutex<SlotInner>,
    ready: Condvar,
}

impl Slot {
    fn new(definition: Arc<Definition>) -> Self {
        Self {
            definition,
            inner: Mutex::new(SlotInner {
                state: SlotState::Constructing,
                tombstoned: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Block until the builder finishes
    pub(crate) fn wait(&self) -> DIResult<Instance> {
        let mut inner = self.inner.lock();
        loop {
            match &inner.state {
                SlotState::Ready(instance) => return Ok(instance.clone()),
                SlotState::Failed(error) => return Err(error.clone()),
                SlotState::Constructing => self.ready.wait(&mut inner),
            }
        }
    }

    fn complete(&self, state: SlotState) -> bool {
        let mut inner = self.inner.lock();
        inner.state = state;
        self.ready.notify_all();
        inner.tombstoned
    }

    fn ready_instance(&self) -> Option<Instance> {
        match &self.inner.lock().state {
            SlotState::Ready(instance) => Some(instance.clone()),
            _ => None,
        }
    }

    /// Mark evicted. Returns the instance if construction already finished.
    fn tombstone(&self) -> Option<Instance> {
        let mut inner = self.inner.lock();
        inner.tombstoned = true;
        match &inner.state {
            SlotState::Ready(instance) => Some(instance.clone()),
            _ => None,
        }
    }
}

/// Outcome of claiming a key
pub(crate) enum Claim<'a> {
    Ready(Instance),
    Wait(Arc<Slot>),
    Build(BuildGuard<'a>),
}

/// Held by the caller that runs the factory.
///
/// Dropping it without `finish` (the factory panicked) fails the slot so no
/// waiter is stranded.
pub(crate) struct BuildGuard<'a> {
    cache: &'a InstanceCache,
    key: CacheKey,
    slot: Arc<Slot>,
    finished: bool,
}

impl BuildGuard<'_> {
    pub(crate) fn finish(mut self, result: &DIResult<Instance>) {
        self.finished = true;
        match result {
            Ok(instance) => {
                if self.slot.complete(SlotState::Ready(instance.clone())) {
                    trace!(scope = %self.cache.scope_id, key = %self.key.0, "discarding instance built for an evicted slot");
                }
            }
            Err(error) => self.fail(error.clone()),
        }
    }

    fn fail(&self, error: DIError) {
        self.cache.remove_slot(&self.key, &self.slot);
        self.slot.complete(SlotState::Failed(error));
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.fail(DIError::ConstructionFailure {
                type_name: self.key.0.name().to_string(),
                reason: "factory panicked".to_string(),
            });
        }
    }
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CacheKey, Arc<Slot>>,
    /// Set when the owning scope closes; no further claims succeed
    sealed: bool,
}

pub(crate) struct InstanceCache {
    scope_id: ScopeId,
    state: Mutex<CacheState>,
}

impl InstanceCache {
    pub(crate) fn new(scope_id: impl Into<ScopeId>) -> Self {
        Self {
            scope_id: scope_id.into(),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Get the cached instance, join an in-flight construction, or become
    /// the builder for `key`.
    pub(crate) fn claim(&self, key: CacheKey, definition: &Arc<Definition>) -> DIResult<Claim<'_>> {
        let mut state = self.state.lock();
        if state.sealed {
            return Err(DIError::scope_closed(self.scope_id.clone()));
        }

        if let Some(slot) = state.slots.get(&key) {
            if let Some(instance) = slot.ready_instance() {
                return Ok(Claim::Ready(instance));
            }
            trace!(scope = %self.scope_id, key = %key.0, "waiting on in-flight construction");
            return Ok(Claim::Wait(slot.clone()));
        }

        let slot = Arc::new(Slot::new(definition.clone()));
        state.slots.insert(key.clone(), slot.clone());
        trace!(scope = %self.scope_id, key = %key.0, "slot claimed");
        Ok(Claim::Build(BuildGuard {
            cache: self,
            key,
            slot,
            finished: false,
        }))
    }

    fn remove_slot(&self, key: &CacheKey, slot: &Arc<Slot>) {
        let mut state = self.state.lock();
        if state
            .slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            state.slots.remove(key);
        }
    }

    /// Remove one entry. Returns the evicted instance if it was built.
    pub(crate) fn evict(&self, key: &CacheKey) -> Option<(Arc<Definition>, Instance)> {
        let slot = self.state.lock().slots.remove(key)?;
        slot.tombstone().map(|instance| (slot.definition.clone(), instance))
    }

    /// Remove every entry produced by one of `definitions`.
    ///
    /// Caller holds the registry write lock, so no claim can put a new slot
    /// under a matched key before it is evicted.
    pub(crate) fn evict_by_definitions(
        &self,
        definitions: &HashSet<DefinitionId>,
    ) -> Vec<(Arc<Definition>, Instance)> {
        let keys: Vec<CacheKey> = self
            .state
            .lock()
            .slots
            .iter()
            .filter(|(_, slot)| definitions.contains(&slot.definition.id()))
            .map(|(key, _)| key.clone())
            .collect();

        if !keys.is_empty() {
            trace!(scope = %self.scope_id, count = keys.len(), "evicted by definition");
        }
        keys.iter().filter_map(|key| self.evict(key)).collect()
    }

    /// Remove every entry and refuse further claims
    pub(crate) fn evict_all(&self) -> Vec<(Arc<Definition>, Instance)> {
        let removed: Vec<Arc<Slot>> = {
            let mut state = self.state.lock();
            state.sealed = true;
            state.slots.drain().map(|(_, slot)| slot).collect()
        };
        Self::tombstone_all(removed)
    }

    fn tombstone_all(slots: Vec<Arc<Slot>>) -> Vec<(Arc<Definition>, Instance)> {
        slots
            .into_iter()
            .filter_map(|slot| {
                slot.tombstone()
                    .map(|instance| (slot.definition.clone(), instance))
            })
            .collect()
    }

    pub(crate) fn contains(&self, key: &CacheKey) -> bool {
        self.state
            .lock()
            .slots
            .get(key)
            .is_some_and(|slot| slot.ready_instance().is_some())
    }

    /// Number of built instances
    pub(crate) fn len(&self) -> usize {
        self.state
            .lock()
            .slots
            .values()
            .filter(|slot| slot.ready_instance().is_some())
            .count()
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }
}
