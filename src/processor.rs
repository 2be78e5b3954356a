//! Post-processor pipeline
//!
//! Post-processors are beans themselves. They are created right after the
//! configuration holders, sorted by `(order, name)`, and from then on see
//! every bean the factory creates.

use crate::bean::Bean;
use crate::catalog::ClassBuilder;
use crate::factory::BeanFactory;
use crate::proxy::{InvocationHandler, ProxyFactory};
use crate::{BeanType, DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Default annotation read by [`AnnotationProxyPostProcessor`]
pub const AROUND: &str = "around";

/// Hook into bean creation.
///
/// Register an implementation by giving its `BeanType` the
/// `dyn BeanPostProcessor` view. Returning a different [`Bean`] from either
/// initialization hook replaces the stored instance; every later lookup sees
/// the replacement.
pub trait BeanPostProcessor: Send + Sync {
    /// Called right after construction, before injection
    fn post_process_before_initialization(
        &self,
        bean: Bean,
        bean_name: &str,
        factory: &mut BeanFactory,
    ) -> Result<Bean> {
        let _ = (bean_name, factory);
        Ok(bean)
    }

    /// Called after the init hook
    fn post_process_after_initialization(
        &self,
        bean: Bean,
        bean_name: &str,
        factory: &mut BeanFactory,
    ) -> Result<Bean> {
        let _ = (bean_name, factory);
        Ok(bean)
    }

    /// Undo a substitution: return the object injection and lifecycle hooks
    /// should operate on
    fn post_process_on_set_property(&self, bean: Bean, bean_name: &str) -> Bean {
        let _ = bean_name;
        bean
    }
}

/// Replaces annotated beans with proxies.
///
/// A bean whose type carries the annotation (value = handler bean name) is
/// swapped for a proxy built by the [`ProxyFactory`]; the handler bean must be
/// an [`InvocationHandler`]. The original is remembered so injection still
/// reaches the real object.
pub struct AnnotationProxyPostProcessor {
    annotation: &'static str,
    proxies: Arc<dyn ProxyFactory>,
    origins: DashMap<String, Bean, RandomState>,
}

impl AnnotationProxyPostProcessor {
    pub fn new(annotation: &'static str, proxies: Arc<dyn ProxyFactory>) -> Self {
        Self {
            annotation,
            proxies,
            origins: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Processor keyed on [`AROUND`]
    pub fn around(proxies: Arc<dyn ProxyFactory>) -> Self {
        Self::new(AROUND, proxies)
    }

    /// Component declaration for a processor keyed on `annotation`.
    ///
    /// Rename it with [`ClassBuilder::named`] and [`ClassBuilder::type_name`]
    /// when registering several processors.
    pub fn component(annotation: &'static str, proxies: Arc<dyn ProxyFactory>) -> ClassBuilder<Self> {
        BeanType::builder::<Self>()
            .view::<dyn BeanPostProcessor>(|p| p as Arc<dyn BeanPostProcessor>)
            .component()
            .constructor(Vec::new(), move |_| Ok(Self::new(annotation, Arc::clone(&proxies))))
    }

    #[inline]
    pub fn annotation(&self) -> &'static str {
        self.annotation
    }

    /// Number of beans currently proxied
    #[inline]
    pub fn proxied(&self) -> usize {
        self.origins.len()
    }
}

impl BeanPostProcessor for AnnotationProxyPostProcessor {
    fn post_process_before_initialization(
        &self,
        bean: Bean,
        bean_name: &str,
        factory: &mut BeanFactory,
    ) -> Result<Bean> {
        let Some(handler_name) = bean.bean_type().annotation(self.annotation) else {
            return Ok(bean);
        };
        let handler_name = handler_name.to_string();
        if !factory.registry().contains(&handler_name) {
            return Err(DiError::unsatisfied(
                bean_name,
                format!("handler bean '{handler_name}' for @{}", self.annotation),
            ));
        }
        let handler_bean = factory.get_or_create(&handler_name)?;
        let handler = handler_bean
            .cast::<dyn InvocationHandler>()
            .ok_or_else(|| {
                DiError::invalid(
                    &handler_name,
                    format!("{} is not an InvocationHandler", handler_bean.type_name()),
                )
            })?;

        let proxy = self.proxies.create_proxy(bean_name, bean.clone(), handler)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "bean_context",
            bean = bean_name,
            handler = %handler_name,
            proxy = proxy.type_name(),
            "Bean replaced by proxy"
        );

        self.origins.insert(bean_name.to_string(), bean);
        Ok(proxy)
    }

    fn post_process_on_set_property(&self, bean: Bean, bean_name: &str) -> Bean {
        match self.origins.get(bean_name) {
            Some(origin) => origin.value().clone(),
            None => bean,
        }
    }
}

impl fmt::Debug for AnnotationProxyPostProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationProxyPostProcessor")
            .field("annotation", &self.annotation)
            .field("proxied", &self.origins.len())
            .finish()
    }
}
