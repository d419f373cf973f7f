//! Shared helpers for container integration tests

#![allow(dead_code)]

use common::{init_structured_logging, LoggingConfig};
use container::{Container, ContainerBuilder, Level, TracingLogger};
use once_cell::sync::Lazy;

static INIT_TRACING: Lazy<()> = Lazy::new(|| {
    let _ = init_structured_logging(LoggingConfig::for_tests().with_filter("container=debug"));
});

/// Builder with tracing installed and container events at debug level
pub fn builder() -> ContainerBuilder {
    Lazy::force(&INIT_TRACING);
    Container::builder().logger(TracingLogger::new(Level::Debug))
}

pub fn container() -> Container {
    builder().build().expect("empty container always builds")
}

#[derive(Debug)]
pub struct MySingle {
    pub id: u32,
}

#[derive(Debug)]
pub struct MyScoped;

#[derive(Debug)]
pub struct MyFactory;
