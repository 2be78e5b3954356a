//! Component declarations and the in-memory scanner
//!
//! A [`ComponentClass`] is what a scanner hands the container for one type
//! name: its stereotype, modifiers, constructors, factory methods and
//! lifecycle annotations. [`ComponentCatalog`] stores them by fully-qualified
//! name and answers package scans.

use crate::bean::{AnyArc, AnyRef, BeanType, TypeKey};
use crate::binding::{Args, Modifiers, Param};
use crate::{BoxError, Injectable};
use ahash::RandomState;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Builds an instance from resolved arguments
pub type CreateFn = Arc<dyn Fn(&mut Args) -> Result<AnyArc, BoxError> + Send + Sync>;

/// Invokes a factory method on its owner
pub type InvokeFn =
    Arc<dyn Fn(AnyRef<'_>, &mut Args) -> Result<AnyArc, BoxError> + Send + Sync>;

/// Component stereotype of a scanned class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stereotype {
    Component,
    Configuration,
}

/// A declared constructor
#[derive(Clone)]
pub struct Constructor {
    pub(crate) params: Vec<Param>,
    pub(crate) create: CreateFn,
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("params", &self.params)
            .finish()
    }
}

const PRIMITIVES: &[fn() -> TypeId] = &[
    TypeId::of::<bool>,
    TypeId::of::<char>,
    TypeId::of::<i8>,
    TypeId::of::<i16>,
    TypeId::of::<i32>,
    TypeId::of::<i64>,
    TypeId::of::<i128>,
    TypeId::of::<isize>,
    TypeId::of::<u8>,
    TypeId::of::<u16>,
    TypeId::of::<u32>,
    TypeId::of::<u64>,
    TypeId::of::<u128>,
    TypeId::of::<usize>,
    TypeId::of::<f32>,
    TypeId::of::<f64>,
];

/// A bean-producing method declared on a configuration class.
#[derive(Clone)]
pub struct FactoryMethod {
    pub(crate) method: &'static str,
    pub(crate) owner_type: TypeKey,
    pub(crate) produced: TypeKey,
    pub(crate) returns: Arc<BeanType>,
    pub(crate) declared: Option<TypeKey>,
    pub(crate) params: Vec<Param>,
    pub(crate) invoke: InvokeFn,
    pub(crate) bean_name: Option<String>,
    pub(crate) init: Option<String>,
    pub(crate) destroy: Option<String>,
    pub(crate) order: Option<i32>,
    pub(crate) primary: bool,
    pub(crate) modifiers: Modifiers,
}

impl FactoryMethod {
    /// Method `method` on configuration type `C`, producing an `R` described by `returns`
    pub fn new<C, R, F>(method: &'static str, returns: Arc<BeanType>, params: Vec<Param>, invoke: F) -> Self
    where
        C: Injectable,
        R: Injectable,
        F: Fn(&C, &mut Args) -> Result<R, BoxError> + Send + Sync + 'static,
    {
        let invoke: InvokeFn = Arc::new(move |owner: AnyRef<'_>, args: &mut Args| {
            let owner = owner.downcast_ref::<C>().ok_or_else(|| -> BoxError {
                format!(
                    "factory method '{method}' must be called on {}",
                    std::any::type_name::<C>()
                )
                .into()
            })?;
            invoke(owner, args).map(|value| Arc::new(value) as AnyArc)
        });
        Self {
            method,
            owner_type: TypeKey::of::<C>(),
            produced: TypeKey::of::<R>(),
            returns,
            declared: None,
            params,
            invoke,
            bean_name: None,
            init: None,
            destroy: None,
            order: None,
            primary: false,
            modifiers: Modifiers::NONE,
        }
    }

    /// Explicit bean name (defaults to the method name)
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.bean_name = Some(name.into());
        self
    }

    pub fn init_method(mut self, name: impl Into<String>) -> Self {
        self.init = Some(name.into());
        self
    }

    pub fn destroy_method(mut self, name: impl Into<String>) -> Self {
        self.destroy = Some(name.into());
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Check instances against `U` instead of the concrete return type
    pub fn declared_as<U: ?Sized + 'static>(mut self) -> Self {
        self.declared = Some(TypeKey::of::<U>());
        self
    }

    #[inline]
    pub fn method_name(&self) -> &'static str {
        self.method
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        if self.modifiers.is_abstract || self.modifiers.is_final || self.modifiers.is_private {
            return Err("factory methods cannot be abstract, final or private".into());
        }
        let produced = self.produced.id();
        if produced == TypeId::of::<()>() {
            return Err("factory methods cannot return ()".into());
        }
        if PRIMITIVES.iter().any(|id| id() == produced) {
            return Err(format!(
                "factory methods cannot return the primitive type {}",
                self.produced
            ));
        }
        if self.returns.key() != self.produced {
            return Err(format!(
                "return metadata describes {} but the method produces {}",
                self.returns.name(),
                self.produced
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for FactoryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryMethod")
            .field("method", &self.method)
            .field("owner", &self.owner_type)
            .field("returns", &self.produced)
            .field("bean_name", &self.bean_name)
            .finish()
    }
}

/// Everything the container knows about one scanned type.
#[derive(Clone)]
pub struct ComponentClass {
    pub(crate) type_name: String,
    pub(crate) bean_type: Arc<BeanType>,
    pub(crate) stereotype: Option<Stereotype>,
    pub(crate) bean_name: Option<String>,
    pub(crate) modifiers: Modifiers,
    pub(crate) constructors: Vec<Constructor>,
    pub(crate) factory_methods: Vec<FactoryMethod>,
    pub(crate) order: Option<i32>,
    pub(crate) primary: bool,
    pub(crate) post_construct: Option<&'static str>,
    pub(crate) pre_destroy: Option<&'static str>,
    pub(crate) declared: Option<TypeKey>,
}

impl ComponentClass {
    /// Fully-qualified name the class is scanned under
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[inline]
    pub fn bean_type(&self) -> &Arc<BeanType> {
        &self.bean_type
    }

    #[inline]
    pub fn stereotype(&self) -> Option<Stereotype> {
        self.stereotype
    }

    #[inline]
    pub fn factory_methods(&self) -> &[FactoryMethod] {
        &self.factory_methods
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("type_name", &self.type_name)
            .field("stereotype", &self.stereotype)
            .field("bean_name", &self.bean_name)
            .field("constructors", &self.constructors.len())
            .field("factory_methods", &self.factory_methods)
            .finish()
    }
}

/// Builder for [`ComponentClass`], obtained from [`crate::TypeBuilder::component`]
/// and friends.
pub struct ClassBuilder<T> {
    class: ComponentClass,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Injectable> ClassBuilder<T> {
    pub(crate) fn new(bean_type: Arc<BeanType>, stereotype: Option<Stereotype>) -> Self {
        Self {
            class: ComponentClass {
                type_name: bean_type.name().to_string(),
                bean_type,
                stereotype,
                bean_name: None,
                modifiers: Modifiers::NONE,
                constructors: Vec::new(),
                factory_methods: Vec::new(),
                order: None,
                primary: false,
                post_construct: None,
                pre_destroy: None,
                declared: None,
            },
            _marker: PhantomData,
        }
    }

    /// Override the name the class is scanned under (defaults to the Rust type path)
    pub fn type_name(mut self, name: impl Into<String>) -> Self {
        self.class.type_name = name.into();
        self
    }

    /// Explicit bean name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.class.bean_name = Some(name.into());
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.class.order = Some(order);
        self
    }

    pub fn primary(mut self) -> Self {
        self.class.primary = true;
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.class.modifiers = modifiers;
        self
    }

    /// Declare a constructor taking `params`
    pub fn constructor<F>(mut self, params: Vec<Param>, create: F) -> Self
    where
        F: Fn(&mut Args) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let create: CreateFn =
            Arc::new(move |args: &mut Args| create(args).map(|value| Arc::new(value) as AnyArc));
        self.class.constructors.push(Constructor { params, create });
        self
    }

    /// Declare a no-argument constructor using `Default`
    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(Vec::new(), |_| Ok(T::default()))
    }

    pub fn factory_method(mut self, method: FactoryMethod) -> Self {
        self.class.factory_methods.push(method);
        self
    }

    /// Named method of the type to run after injection
    pub fn post_construct(mut self, method: &'static str) -> Self {
        self.class.post_construct = Some(method);
        self
    }

    /// Named method of the type to run on close
    pub fn pre_destroy(mut self, method: &'static str) -> Self {
        self.class.pre_destroy = Some(method);
        self
    }

    /// Check instances against `U` instead of `T`. Needed when the instance
    /// may be replaced by a proxy implementing `U`.
    pub fn declared_as<U: ?Sized + 'static>(mut self) -> Self {
        self.class.declared = Some(TypeKey::of::<U>());
        self
    }

    pub fn build(self) -> ComponentClass {
        self.class
    }
}

/// Discovers component type names below a base package.
pub trait Scanner: Send + Sync {
    fn scan(&self, base_package: &str) -> Vec<String>;
}

fn in_package(type_name: &str, package: &str) -> bool {
    if package.is_empty() {
        return true;
    }
    type_name
        .strip_prefix(package)
        .is_some_and(|rest| rest.starts_with("::"))
}

/// In-memory class path.
///
/// # Examples
///
/// ```rust
/// use bean_context::{BeanType, ComponentCatalog, Scanner};
///
/// #[derive(Default)]
/// struct Clock;
///
/// let catalog = ComponentCatalog::new().with(
///     BeanType::builder::<Clock>()
///         .component()
///         .type_name("app::time::Clock")
///         .default_constructor()
///         .build(),
/// );
///
/// assert_eq!(catalog.scan("app"), vec!["app::time::Clock".to_string()]);
/// assert!(catalog.scan("other").is_empty());
/// assert!(catalog.load("app::time::Clock").is_some());
/// ```
#[derive(Clone, Default)]
pub struct ComponentCatalog {
    classes: HashMap<String, Arc<ComponentClass>, RandomState>,
}

impl ComponentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class, replacing any class with the same type name
    pub fn register(&mut self, class: ComponentClass) -> &mut Self {
        self.classes
            .insert(class.type_name.clone(), Arc::new(class));
        self
    }

    pub fn with(mut self, class: ComponentClass) -> Self {
        self.register(class);
        self
    }

    /// Look a class up by its fully-qualified name
    pub fn load(&self, type_name: &str) -> Option<Arc<ComponentClass>> {
        self.classes.get(type_name).cloned()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Scanner for ComponentCatalog {
    fn scan(&self, base_package: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .classes
            .keys()
            .filter(|name| in_package(name, base_package))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCatalog")
            .field("classes", &self.classes.len())
            .finish()
    }
}
