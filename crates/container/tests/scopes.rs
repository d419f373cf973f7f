//! Scope hierarchy: fallback, isolation, nesting and close

mod support;

use anyhow::Result;
use rstest::{fixture, rstest};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use container::{named, Container, DIError, Module};
use support::{MyFactory, MyScoped, MySingle};

#[derive(Debug)]
struct Session {
    scope_id: String,
}

#[derive(Debug)]
struct Request {
    session: Arc<Session>,
    config: Arc<MySingle>,
}

#[fixture]
fn loaded() -> Container {
    support::builder()
        .module(Module::new(|m| {
            m.single(|_| Ok(MySingle { id: 1 }));
            m.scope(named("session"), |s| {
                s.scoped(|ctx| {
                    Ok(Session {
                        scope_id: ctx.scope().id().to_string(),
                    })
                });
                s.scoped(|_| Ok(MyScoped));
            });
            m.scope(named("request"), |s| {
                s.factory(|ctx| {
                    Ok(Request {
                        session: ctx.get()?,
                        config: ctx.get()?,
                    })
                });
            });
        }))
        .build()
        .expect("scoped module loads")
}

#[rstest]
fn child_falls_back_to_root(#[from(loaded)] container: Container) -> Result<()> {
    let scope = container.create_scope("s1", "session")?;

    let from_scope = scope.get::<MySingle>()?;
    assert!(Arc::ptr_eq(&from_scope, &container.get::<MySingle>()?));

    scope.close();

    let replacement = container.create_scope("s2", "session")?;
    assert!(Arc::ptr_eq(&replacement.get::<MySingle>()?, &from_scope));
    Ok(())
}

#[rstest]
fn scoped_instances_are_isolated(#[from(loaded)] container: Container) -> Result<()> {
    let first = container.create_scope("s1", "session")?;
    let second = container.create_scope("s2", "session")?;

    let a = first.get::<Session>()?;
    let b = second.get::<Session>()?;

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.scope_id, "s1");
    assert_eq!(b.scope_id, "s2");
    assert!(Arc::ptr_eq(&a, &first.get::<Session>()?));
    Ok(())
}

#[rstest]
fn root_cannot_see_scoped_definitions(#[from(loaded)] container: Container) -> Result<()> {
    assert!(container.get::<Session>().unwrap_err().is_not_found());

    let other_class = container.create_scope("r1", "request")?;
    assert!(other_class.get::<MyScoped>().unwrap_err().is_not_found());
    Ok(())
}

#[rstest]
fn nested_scope_resolves_through_its_parent(#[from(loaded)] container: Container) -> Result<()> {
    let session = container.create_scope("s1", "session")?;
    let request = session.create_scope("r1", "request")?;

    let built = request.get::<Request>()?;
    assert!(Arc::ptr_eq(&built.session, &session.get::<Session>()?));
    assert!(Arc::ptr_eq(&built.config, &container.get::<MySingle>()?));
    assert!(request.parent().is_some_and(|p| p.same_as(&session)));

    // a sibling request scope without a session parent cannot build Request
    let orphan = container.create_scope("r2", "request")?;
    assert!(orphan.get::<Request>().unwrap_err().is_not_found());
    Ok(())
}

#[rstest]
fn closed_scope_refuses_resolution(#[from(loaded)] container: Container) -> Result<()> {
    let scope = container.create_scope("s1", "session")?;
    scope.get::<Session>()?;

    scope.close();
    scope.close();

    assert!(scope.is_closed());
    assert!(scope.parent().is_none());
    assert!(matches!(
        scope.get::<Session>(),
        Err(DIError::ScopeClosed { scope_id }) if scope_id == "s1"
    ));
    assert!(scope.get_or_null::<MySingle>().is_none());
    assert!(container.get_scope_or_null("s1").is_none());
    assert!(matches!(
        scope.create_scope("child", "request"),
        Err(DIError::ScopeClosed { .. })
    ));
    Ok(())
}

#[rstest]
fn closing_parent_closes_descendants(#[from(loaded)] container: Container) -> Result<()> {
    let session = container.create_scope("s1", "session")?;
    let request = session.create_scope("r1", "request")?;
    let deeper = request.create_scope("r1-1", "request")?;
    assert_eq!(container.stats().open_scopes, 3);

    session.close();

    assert!(request.is_closed());
    assert!(deeper.is_closed());
    assert_eq!(container.stats().open_scopes, 0);
    Ok(())
}

#[rstest]
fn scope_close_disposes_scoped_instances() -> Result<()> {
    let disposed = Arc::new(AtomicUsize::new(0));
    let counter = disposed.clone();
    let container = support::builder()
        .module(Module::new(move |m| {
            m.single(|_| Ok(MySingle { id: 1 }));
            m.scope(named("session"), |s| {
                s.scoped(|_| Ok(MyScoped)).on_close(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                s.factory(|_| Ok(MyFactory));
            });
        }))
        .build()?;

    let first = container.create_scope("s1", "session")?;
    let second = container.create_scope("s2", "session")?;
    first.get::<MyScoped>()?;
    first.get::<MyFactory>()?;
    second.get::<MyScoped>()?;
    first.get::<MySingle>()?;

    assert!(container.delete_scope("s1"));
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(container.stats().root_instances, 1);

    container.close();
    assert_eq!(disposed.load(Ordering::SeqCst), 2);
    assert!(second.is_closed());
    Ok(())
}

#[rstest]
#[case("s1")]
#[case("a-much-longer-scope-id")]
fn scope_ids_are_unique_per_container(#[from(loaded)] container: Container, #[case] id: &str) -> Result<()> {
    let scope = container.create_scope(id.to_string(), "session")?;

    assert!(matches!(
        container.create_scope(id.to_string(), "request"),
        Err(DIError::ScopeAlreadyExists { .. })
    ));
    assert!(matches!(
        scope.create_scope(id.to_string(), "request"),
        Err(DIError::ScopeAlreadyExists { .. })
    ));
    assert!(container.get_scope(id)?.same_as(&scope));
    Ok(())
}
