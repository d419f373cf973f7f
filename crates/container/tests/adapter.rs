//! Construction-site hook used by host frameworks

mod support;

use anyhow::Result;
use std::sync::Arc;

use container::{
    named, parameters_of, DIError, InstanceFactory, InstanceResolver, Module, Qualifier, Scope,
    TypeKey,
};
use support::MySingle;

#[derive(Debug)]
struct Screen {
    title: String,
}

#[derive(Debug)]
struct ViewModel {
    screen_id: String,
}

fn host_module() -> Module {
    Module::new(|m| {
        m.factory(|ctx| {
            Ok(Screen {
                title: ctx.param(0).unwrap_or_else(|_| "untitled".to_string()),
            })
        });
        m.single(|_| Ok(MySingle { id: 3 }));
        m.scope(named("screen"), |s| {
            s.scoped(|ctx| {
                Ok(ViewModel {
                    screen_id: ctx.scope().id().to_string(),
                })
            });
        });
    })
}

#[test]
fn creates_instance_from_type_name() -> Result<()> {
    let container = support::container();
    container.load_modules(&[host_module()])?;
    let factory = InstanceFactory::new(container.clone());

    let name = TypeKey::of::<Screen>().name();
    let screen = factory.create::<Screen>(name)?;
    assert_eq!(screen.title, "untitled");

    let titled = factory.create_instance(name, &Qualifier::Default, parameters_of!["Home".to_string()])?;
    let titled = Scope::downcast::<Screen>(titled)?;
    assert_eq!(titled.title, "Home");
    Ok(())
}

#[test]
fn attached_scope_is_asked_first() -> Result<()> {
    let container = support::container();
    container.load_modules(&[host_module()])?;
    let scope = container.create_scope("main-screen", "screen")?;
    let factory = InstanceFactory::new(container.clone()).with_scope(scope.clone());

    let view_model = factory.create::<ViewModel>(TypeKey::of::<ViewModel>().name())?;
    assert_eq!(view_model.screen_id, "main-screen");
    assert!(Arc::ptr_eq(&view_model, &scope.get::<ViewModel>()?));

    // root definitions are still reachable through the scope
    let single = factory.create::<MySingle>(TypeKey::of::<MySingle>().name())?;
    assert!(Arc::ptr_eq(&single, &container.get::<MySingle>()?));

    let unscoped = InstanceFactory::new(container);
    assert!(unscoped
        .create::<ViewModel>(TypeKey::of::<ViewModel>().name())
        .unwrap_err()
        .is_not_found());
    Ok(())
}

#[test]
fn unknown_type_name_and_wrong_downcast() -> Result<()> {
    let container = support::container();
    container.load_modules(&[host_module()])?;
    let factory = InstanceFactory::new(container.clone());

    match factory.create::<Screen>("host::widgets::Unknown") {
        Err(DIError::DefinitionNotFound { type_name, .. }) => {
            assert_eq!(type_name, "host::widgets::Unknown")
        }
        other => panic!("Expected DefinitionNotFound, got {other:?}"),
    }
    assert!(matches!(
        factory.create::<Screen>(TypeKey::of::<MySingle>().name()),
        Err(DIError::TypeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn container_and_scope_share_resolver_seam() -> Result<()> {
    let container = support::container();
    container.load_modules(&[host_module()])?;
    let scope = container.create_scope("s", "screen")?;

    let resolvers: Vec<Box<dyn InstanceResolver>> = vec![Box::new(container.clone()), Box::new(scope)];
    for resolver in &resolvers {
        let instance = resolver.resolve_instance(
            &TypeKey::of::<MySingle>(),
            &Qualifier::Default,
            parameters_of![],
        )?;
        assert_eq!(Scope::downcast::<MySingle>(instance)?.id, 3);
    }

    let direct = container.create_instance(
        None,
        &TypeKey::of::<MySingle>(),
        &Qualifier::Default,
        parameters_of![],
    )?;
    assert!(Scope::downcast::<MySingle>(direct).is_ok());
    Ok(())
}
