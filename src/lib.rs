//! # bean-context - Annotation-Style Application Context for Rust
//!
//! A singleton container that discovers components, builds their definitions,
//! creates them in dependency order, wires their members and runs their
//! lifecycle hooks.
//!
//! ## Features
//!
//! - **Declarative components** - Types describe their constructor, members
//!   and lifecycle methods once, through [`BeanType`] and [`ClassBuilder`]
//! - **Value and bean bindings** - `${key:default}` property expressions and
//!   autowiring by type or by name, with primary arbitration
//! - **Cycles** - Member and setter cycles resolve; constructor cycles are
//!   reported with their full path
//! - **Post-processors** - Hooks around initialization, including proxy
//!   substitution driven by type annotations
//! - **Lock-free lookups** - The started context is a `DashMap` of frozen
//!   definitions
//! - **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use bean_context::{
//!     ApplicationContext, BeanType, Binding, ComponentCatalog, InjectCell, Param, PropertyResolver,
//! };
//! use std::sync::Arc;
//!
//! trait Repository: Send + Sync {
//!     fn url(&self) -> &str;
//! }
//!
//! struct PgRepository {
//!     url: String,
//! }
//!
//! impl Repository for PgRepository {
//!     fn url(&self) -> &str {
//!         &self.url
//!     }
//! }
//!
//! struct UserService {
//!     repository: InjectCell<Arc<dyn Repository>>,
//! }
//!
//! let catalog = ComponentCatalog::new()
//!     .with(
//!         BeanType::builder::<PgRepository>()
//!             .view::<dyn Repository>(|r| r as Arc<dyn Repository>)
//!             .component()
//!             .type_name("app::PgRepository")
//!             .constructor(vec![Param::value::<String>("${db.url}")], |args| {
//!                 Ok(PgRepository { url: args.take(0)? })
//!             })
//!             .build(),
//!     )
//!     .with(
//!         BeanType::builder::<UserService>()
//!             .field(
//!                 "repository",
//!                 Binding::autowired::<dyn Repository>(),
//!                 |s: &UserService, r: Arc<dyn Repository>| Ok(s.repository.set(r)?),
//!             )
//!             .component()
//!             .type_name("app::UserService")
//!             .constructor(Vec::new(), |_| {
//!                 Ok(UserService {
//!                     repository: InjectCell::new(),
//!                 })
//!             })
//!             .build(),
//!     );
//!
//! let context = ApplicationContext::builder(catalog)
//!     .scan("app")
//!     .properties(PropertyResolver::from_pairs([("db.url", "postgres://localhost/app")]))
//!     .build()?;
//!
//! let service: Arc<UserService> = context.get_bean()?;
//! assert_eq!(service.repository.get().unwrap().url(), "postgres://localhost/app");
//!
//! context.close();
//! # Ok::<(), bean_context::DiError>(())
//! ```
//!
//! ## Bootstrap
//!
//! [`ContextBuilder::build`] walks through [`ContainerState`]: definitions are
//! built from the scanned and imported classes, configuration holders and
//! post-processors are created first, then every other bean as an early
//! singleton. Injection and initialization follow once every instance exists.

mod bean;
mod binding;
mod catalog;
mod container;
mod definition;
mod error;
mod factory;
mod inject;
#[cfg(feature = "logging")]
pub mod logging;
mod processor;
mod property;
mod provider;
mod proxy;
mod registry;

pub use bean::*;
pub use binding::*;
pub use catalog::*;
pub use container::*;
pub use definition::*;
pub use error::*;
pub use factory::*;
pub use processor::*;
pub use property::*;
pub use provider::*;
pub use proxy::*;
pub use registry::*;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ApplicationContext, Bean, BeanPostProcessor, BeanType, Binding, ComponentCatalog, DiError,
        InjectCell, Injectable, Param, PropertyResolver, Result,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[derive(Default)]
    struct Clock;

    struct Scheduler {
        clock: Arc<Clock>,
        interval: InjectCell<u64>,
    }

    fn catalog() -> ComponentCatalog {
        ComponentCatalog::new()
            .with(
                BeanType::builder::<Clock>()
                    .component()
                    .type_name("app::Clock")
                    .default_constructor()
                    .build(),
            )
            .with(
                BeanType::builder::<Scheduler>()
                    .field(
                        "interval",
                        Param::value::<u64>("${scheduler.interval:30}"),
                        |s: &Scheduler, v: u64| Ok(s.interval.set(v)?),
                    )
                    .component()
                    .type_name("app::Scheduler")
                    .constructor(vec![Param::autowired::<Clock>()], |args| {
                        Ok(Scheduler {
                            clock: args.take(0)?,
                            interval: InjectCell::new(),
                        })
                    })
                    .build(),
            )
    }

    #[test]
    fn test_prelude_bootstrap() {
        let context = ApplicationContext::builder(catalog()).build().unwrap();
        let scheduler: Arc<Scheduler> = context.get_bean().unwrap();
        let clock: Arc<Clock> = context.get_bean().unwrap();

        assert!(Arc::ptr_eq(&scheduler.clock, &clock));
        assert_eq!(scheduler.interval.get(), Some(&30));
        assert_eq!(context.bean_names(), vec!["clock", "scheduler"]);
    }

    #[test]
    fn test_property_overrides_default() {
        let context = ApplicationContext::builder(catalog())
            .properties(PropertyResolver::from_pairs([("scheduler.interval", "5")]))
            .build()
            .unwrap();
        let scheduler: Arc<Scheduler> = context.get_bean().unwrap();
        assert_eq!(scheduler.interval.get(), Some(&5));
    }

    #[test]
    fn test_bad_property_aborts_bootstrap() {
        let err = ApplicationContext::builder(catalog())
            .properties(PropertyResolver::from_pairs([("scheduler.interval", "soon")]))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::PropertyConversion);
    }

    #[test]
    fn test_bean_is_type_erased_handle() {
        let context = ApplicationContext::builder(catalog()).build().unwrap();
        let bean: Bean = context.get_bean_by_name("clock").unwrap();
        assert!(bean.downcast::<Clock>().is_some());
        assert!(bean.downcast::<Scheduler>().is_none());
    }
}
