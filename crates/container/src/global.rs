//! Process-wide container.
//!
//! One shared instance, installed by `start_container` and replaceable only
//! after `stop_container`. Code that can take a `Container` explicitly
//! should do so; this exists for hosts that need a single ambient entry point.

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::{
    container::{Container, ContainerBuilder},
    errors::{DIError, DIResult},
    module::Module,
};

static GLOBAL_CONTAINER: Lazy<RwLock<Option<Container>>> = Lazy::new(|| RwLock::new(None));

/// Start the global container with `modules`
pub fn start_container(modules: impl IntoIterator<Item = Module>) -> DIResult<Container> {
    start_container_with(ContainerBuilder::new().modules(modules))
}

/// Start the global container from a configured builder.
///
/// The container is built outside the global lock, so eager factories may
/// call back into this module; they see `ContainerNotStarted` until the
/// build completes.
pub fn start_container_with(builder: ContainerBuilder) -> DIResult<Container> {
    if GLOBAL_CONTAINER.read().is_some() {
        return Err(DIError::ContainerAlreadyStarted);
    }

    let container = builder.build()?;

    let mut global = GLOBAL_CONTAINER.write();
    if global.is_some() {
        drop(global);
        container.close();
        return Err(DIError::ContainerAlreadyStarted);
    }
    *global = Some(container.clone());
    Ok(container)
}

/// Close and remove the global container. No-op when not started.
pub fn stop_container() {
    let container = GLOBAL_CONTAINER.write().take();
    if let Some(container) = container {
        container.close();
    }
}

pub fn container() -> DIResult<Container> {
    container_or_null().ok_or(DIError::ContainerNotStarted)
}

pub fn container_or_null() -> Option<Container> {
    GLOBAL_CONTAINER.read().clone()
}

pub fn is_started() -> bool {
    GLOBAL_CONTAINER.read().is_some()
}

pub fn load_modules(modules: &[Module]) -> DIResult<()> {
    container()?.load_modules(modules)
}

pub fn unload_modules(modules: &[Module]) -> DIResult<()> {
    container()?.unload_modules(modules);
    Ok(())
}

pub fn reload_modules(modules: &[Module]) -> DIResult<()> {
    container()?.reload_modules(modules)
}
