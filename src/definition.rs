//! Bean definitions
//!
//! One [`ComponentDefinition`] per manageable bean: how to build it, how to
//! order and arbitrate it, which hooks to run, and the instance once built.

use crate::bean::{Bean, BeanType, MethodFn, TypeKey};
use crate::binding::Param;
use crate::catalog::{ComponentClass, CreateFn, FactoryMethod, InvokeFn, Stereotype};
use crate::processor::BeanPostProcessor;
use crate::{DiError, Result};
use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Order of definitions that declare none
pub const LOWEST_ORDER: i32 = i32::MAX;

/// How an instance is produced
#[derive(Clone)]
pub enum Construction {
    Constructor {
        params: Vec<Param>,
        create: CreateFn,
    },
    Factory {
        owner: String,
        method: &'static str,
        params: Vec<Param>,
        invoke: InvokeFn,
    },
}

impl Construction {
    pub fn params(&self) -> &[Param] {
        match self {
            Self::Constructor { params, .. } | Self::Factory { params, .. } => params,
        }
    }
}

impl fmt::Debug for Construction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constructor { params, .. } => f
                .debug_struct("Constructor")
                .field("params", &params.len())
                .finish(),
            Self::Factory { owner, method, params, .. } => f
                .debug_struct("Factory")
                .field("owner", owner)
                .field("method", method)
                .field("params", &params.len())
                .finish(),
        }
    }
}

/// Init or destroy callback
#[derive(Clone)]
pub enum LifecycleHook {
    /// Method resolved when the definition was built
    Method { name: &'static str, call: MethodFn },
    /// Method name resolved on the instance's type when the hook runs
    Named(String),
}

impl LifecycleHook {
    pub fn name(&self) -> &str {
        match self {
            Self::Method { name, .. } => name,
            Self::Named(name) => name,
        }
    }

    /// Run the hook against `target`
    pub(crate) fn invoke(&self, bean_name: &str, target: &Bean) -> Result<()> {
        let outcome = match self {
            Self::Method { call, .. } => call(target.as_any()),
            Self::Named(method) => {
                let call = target.bean_type().method(method).ok_or_else(|| {
                    DiError::invalid(
                        bean_name,
                        format!("method '{method}' not found on {}", target.type_name()),
                    )
                })?;
                call(target.as_any())
            }
        };
        outcome.map_err(|source| DiError::creation_failed(bean_name, source))
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method { name, .. } => write!(f, "Method({name})"),
            Self::Named(name) => write!(f, "Named({name})"),
        }
    }
}

/// Default bean name for a type: the simple name with its first letter lower-cased.
pub fn default_bean_name(ty: &TypeKey) -> String {
    let simple = ty.simple_name();
    let mut chars = simple.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One manageable bean
#[derive(Clone)]
pub struct ComponentDefinition {
    name: String,
    bean_type: Arc<BeanType>,
    declared_type: TypeKey,
    construction: Construction,
    order: i32,
    primary: bool,
    configuration: bool,
    init: Option<LifecycleHook>,
    destroy: Option<LifecycleHook>,
    instance: Option<Bean>,
    origin: Option<Bean>,
}

impl ComponentDefinition {
    /// Definitions contributed by one scanned class: the class itself and, for
    /// configuration classes, one per factory method. Non-component classes
    /// contribute nothing.
    pub fn definitions_for(class: &ComponentClass) -> Result<Vec<Self>> {
        let Some(stereotype) = class.stereotype else {
            return Ok(Vec::new());
        };
        let owner = Self::from_class(class)?;
        let mut definitions = Vec::with_capacity(1 + class.factory_methods.len());
        if stereotype == Stereotype::Configuration {
            for method in &class.factory_methods {
                definitions.push(Self::from_factory_method(&owner, class, method)?);
            }
        }
        definitions.insert(0, owner);
        Ok(definitions)
    }

    /// Definition of a component class
    pub fn from_class(class: &ComponentClass) -> Result<Self> {
        let key = class.bean_type.key();
        let name = class
            .bean_name
            .clone()
            .unwrap_or_else(|| default_bean_name(&key));

        if class.modifiers.is_abstract {
            return Err(DiError::invalid(&name, format!("{} is abstract", class.type_name)));
        }
        if class.modifiers.is_private {
            return Err(DiError::invalid(&name, format!("{} is private", class.type_name)));
        }
        let constructor = match class.constructors.as_slice() {
            [only] => only.clone(),
            [] => {
                return Err(DiError::invalid(
                    &name,
                    format!("{} declares no constructor", class.type_name),
                ));
            }
            many => {
                return Err(DiError::invalid(
                    &name,
                    format!(
                        "{} declares {} constructors, exactly one is required",
                        class.type_name,
                        many.len()
                    ),
                ));
            }
        };

        let configuration = class.stereotype == Some(Stereotype::Configuration);
        let definition = Self {
            declared_type: class.declared.unwrap_or(key),
            bean_type: Arc::clone(&class.bean_type),
            construction: Construction::Constructor {
                params: constructor.params,
                create: constructor.create,
            },
            order: class.order.unwrap_or(LOWEST_ORDER),
            primary: class.primary,
            configuration,
            init: Self::class_hook(&name, &class.bean_type, class.post_construct)?,
            destroy: Self::class_hook(&name, &class.bean_type, class.pre_destroy)?,
            instance: None,
            origin: None,
            name,
        };
        definition.check_declared_type()?;
        if configuration && definition.is_post_processor() {
            return Err(DiError::invalid(
                &definition.name,
                "a configuration class cannot be a post-processor",
            ));
        }
        if !configuration && !class.factory_methods.is_empty() {
            return Err(DiError::invalid(
                &definition.name,
                "factory methods are only allowed on configuration classes",
            ));
        }
        Ok(definition)
    }

    /// Definition of a bean produced by a factory method of `owner`
    pub fn from_factory_method(
        owner: &ComponentDefinition,
        class: &ComponentClass,
        method: &FactoryMethod,
    ) -> Result<Self> {
        let name = method
            .bean_name
            .clone()
            .unwrap_or_else(|| method.method.to_string());
        if method.owner_type != class.bean_type.key() {
            return Err(DiError::invalid(
                &name,
                format!(
                    "factory method '{}' belongs to {}, not to {}",
                    method.method, method.owner_type, class.type_name
                ),
            ));
        }
        method.check().map_err(|reason| {
            DiError::invalid(&name, format!("factory method '{}': {reason}", method.method))
        })?;

        let definition = Self {
            declared_type: method.declared.unwrap_or(method.produced),
            bean_type: Arc::clone(&method.returns),
            construction: Construction::Factory {
                owner: owner.name.clone(),
                method: method.method,
                params: method.params.clone(),
                invoke: Arc::clone(&method.invoke),
            },
            order: method.order.unwrap_or(LOWEST_ORDER),
            primary: method.primary,
            configuration: false,
            init: method.init.clone().map(LifecycleHook::Named),
            destroy: method.destroy.clone().map(LifecycleHook::Named),
            instance: None,
            origin: None,
            name,
        };
        definition.check_declared_type()?;
        Ok(definition)
    }

    fn class_hook(
        name: &str,
        bean_type: &BeanType,
        method: Option<&'static str>,
    ) -> Result<Option<LifecycleHook>> {
        let Some(method) = method else {
            return Ok(None);
        };
        let call = bean_type.method(method).ok_or_else(|| {
            DiError::invalid(
                name,
                format!("lifecycle method '{method}' not found on {}", bean_type.name()),
            )
        })?;
        Ok(Some(LifecycleHook::Method {
            name: method,
            call: Arc::clone(call),
        }))
    }

    fn check_declared_type(&self) -> Result<()> {
        if self.bean_type.is_assignable_to(self.declared_type.id()) {
            Ok(())
        } else {
            Err(DiError::invalid(
                &self.name,
                format!(
                    "{} is not assignable to its declared type {}",
                    self.bean_type.name(),
                    self.declared_type
                ),
            ))
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metadata of the concrete type
    #[inline]
    pub fn bean_type(&self) -> &Arc<BeanType> {
        &self.bean_type
    }

    /// Type every stored instance must be castable to
    #[inline]
    pub fn declared_type(&self) -> TypeKey {
        self.declared_type
    }

    #[inline]
    pub fn construction(&self) -> &Construction {
        &self.construction
    }

    #[inline]
    pub fn order(&self) -> i32 {
        self.order
    }

    #[inline]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    #[inline]
    pub fn is_configuration(&self) -> bool {
        self.configuration
    }

    pub fn is_post_processor(&self) -> bool {
        self.bean_type
            .is_assignable_to(TypeId::of::<dyn BeanPostProcessor>())
    }

    /// Configuration holders and post-processors: created before everything
    /// else and not allowed to depend on other beans
    #[inline]
    pub fn is_privileged(&self) -> bool {
        self.configuration || self.is_post_processor()
    }

    #[inline]
    pub fn is_assignable_to(&self, ty: TypeId) -> bool {
        self.bean_type.is_assignable_to(ty)
    }

    #[inline]
    pub fn init_hook(&self) -> Option<&LifecycleHook> {
        self.init.as_ref()
    }

    #[inline]
    pub fn destroy_hook(&self) -> Option<&LifecycleHook> {
        self.destroy.as_ref()
    }

    /// Exposed instance (possibly a proxy)
    #[inline]
    pub fn instance(&self) -> Option<&Bean> {
        self.instance.as_ref()
    }

    pub fn required_instance(&self) -> Result<&Bean> {
        self.instance.as_ref().ok_or_else(|| {
            DiError::invalid(&self.name, "instance has not been created yet")
        })
    }

    /// Real instance behind any proxy, recorded at the end of bootstrap
    #[inline]
    pub fn origin(&self) -> Option<&Bean> {
        self.origin.as_ref()
    }

    pub(crate) fn set_instance(&mut self, bean: Bean) -> Result<()> {
        if !bean.can_cast(self.declared_type.id()) {
            return Err(DiError::creation_failed(
                &self.name,
                format!(
                    "instance of {} is not assignable to declared type {}",
                    bean.type_name(),
                    self.declared_type
                ),
            ));
        }
        self.instance = Some(bean);
        Ok(())
    }

    pub(crate) fn set_origin(&mut self, bean: Bean) {
        self.origin = Some(bean);
    }

    /// `(order, name)` ordering
    pub fn ordering(a: &Self, b: &Self) -> Ordering {
        a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name))
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("type", &self.bean_type.name())
            .field("declared", &self.declared_type)
            .field("construction", &self.construction)
            .field("order", &self.order)
            .field("primary", &self.primary)
            .field("init", &self.init)
            .field("destroy", &self.destroy)
            .field("instantiated", &self.instance.is_some())
            .finish()
    }
}
