//! Declarative injection bindings
//!
//! A [`Binding`] says where one injected value comes from: a property
//! expression (value binding) or another bean (dependency binding). A
//! [`Param`] is one constructor/factory parameter and must carry exactly one
//! binding; an [`InjectionPoint`] is a field or setter filled after
//! construction.

use crate::bean::{AnyRef, Bean, TypeKey};
use crate::property::{FromProperty, PropertyResolver};
use crate::{BoxError, DiError, Injectable, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Converts a resolved property into the boxed parameter value
pub type ConvertFn = fn(&PropertyResolver, &str) -> Result<Box<dyn Any>>;

/// Turns the dependency bean (or its absence) into the boxed parameter value
pub type ProduceFn = fn(Option<&Bean>) -> Option<Box<dyn Any>>;

/// Assigns a boxed value to a member of a type-erased target
pub type AssignFn =
    Arc<dyn Fn(AnyRef<'_>, Box<dyn Any>) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Source of one injected value.
#[derive(Clone)]
pub struct Binding(pub(crate) BindingKind);

#[derive(Clone)]
pub(crate) enum BindingKind {
    Value {
        key: String,
        target: &'static str,
        convert: ConvertFn,
    },
    Autowired {
        name: Option<String>,
        required: bool,
        ty: TypeKey,
        produce: ProduceFn,
    },
}

fn convert_value<V: FromProperty>(props: &PropertyResolver, key: &str) -> Result<Box<dyn Any>> {
    props
        .get_required_as::<V>(key)
        .map(|value| Box::new(value) as Box<dyn Any>)
}

fn produce_required<U: ?Sized + 'static>(bean: Option<&Bean>) -> Option<Box<dyn Any>> {
    bean?.cast::<U>().map(|arc| Box::new(arc) as Box<dyn Any>)
}

fn produce_optional<U: ?Sized + 'static>(bean: Option<&Bean>) -> Option<Box<dyn Any>> {
    match bean {
        Some(bean) => bean
            .cast::<U>()
            .map(|arc| Box::new(Some(arc)) as Box<dyn Any>),
        None => Some(Box::new(None::<Arc<U>>)),
    }
}

impl Binding {
    /// Value binding: resolve `key` (plain key or `${key}` / `${key:default}`)
    /// and convert it to `V`.
    pub fn value<V: FromProperty>(key: impl Into<String>) -> Self {
        Self(BindingKind::Value {
            key: key.into(),
            target: std::any::type_name::<V>(),
            convert: convert_value::<V>,
        })
    }

    /// Required dependency on the unique bean assignable to `U`. Yields `Arc<U>`.
    pub fn autowired<U: ?Sized + 'static>() -> Self {
        Self(BindingKind::Autowired {
            name: None,
            required: true,
            ty: TypeKey::of::<U>(),
            produce: produce_required::<U>,
        })
    }

    /// Optional dependency. Yields `Option<Arc<U>>`, `None` when no candidate exists.
    pub fn optional<U: ?Sized + 'static>() -> Self {
        Self(BindingKind::Autowired {
            name: None,
            required: false,
            ty: TypeKey::of::<U>(),
            produce: produce_optional::<U>,
        })
    }

    /// Qualify a dependency binding with a bean name. Value bindings are
    /// returned unchanged.
    pub fn named(mut self, bean_name: impl Into<String>) -> Self {
        if let BindingKind::Autowired { name, .. } = &mut self.0 {
            *name = Some(bean_name.into());
        }
        self
    }

    /// Whether this binding refers to another bean
    #[inline]
    pub fn is_dependency(&self) -> bool {
        matches!(self.0, BindingKind::Autowired { .. })
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            BindingKind::Value { key, target, .. } => f
                .debug_struct("Value")
                .field("key", key)
                .field("target", target)
                .finish(),
            BindingKind::Autowired {
                name, required, ty, ..
            } => f
                .debug_struct("Autowired")
                .field("name", name)
                .field("required", required)
                .field("type", ty)
                .finish(),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            BindingKind::Value { key, .. } => write!(f, "value '{key}'"),
            BindingKind::Autowired { name: Some(n), ty, .. } => write!(f, "'{n}' of type {ty}"),
            BindingKind::Autowired { name: None, ty, .. } => write!(f, "type {ty}"),
        }
    }
}

/// One constructor or factory-method parameter.
///
/// A well-formed parameter has exactly one binding; anything else is
/// reported as an invalid definition when the bean is created.
#[derive(Clone, Default, Debug)]
pub struct Param {
    bindings: Vec<Binding>,
}

impl Param {
    /// Parameter with a single binding
    pub fn new(binding: Binding) -> Self {
        Self {
            bindings: vec![binding],
        }
    }

    /// Parameter without any binding
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Add another binding
    pub fn and(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn value<V: FromProperty>(key: impl Into<String>) -> Self {
        Self::new(Binding::value::<V>(key))
    }

    pub fn autowired<U: ?Sized + 'static>() -> Self {
        Self::new(Binding::autowired::<U>())
    }

    pub fn optional<U: ?Sized + 'static>() -> Self {
        Self::new(Binding::optional::<U>())
    }

    #[inline]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub(crate) fn binding(&self) -> std::result::Result<&Binding, &'static str> {
        match self.bindings.as_slice() {
            [binding] => Ok(binding),
            [] => Err("must declare a value or dependency binding"),
            _ => Err("cannot declare both a value and a dependency binding"),
        }
    }
}

impl From<Binding> for Param {
    fn from(binding: Binding) -> Self {
        Self::new(binding)
    }
}

/// Declaration modifiers the container validates against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_private: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        is_static: false,
        is_final: false,
        is_abstract: false,
        is_private: false,
    };

    pub const fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub const fn with_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub const fn with_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub const fn with_private(mut self) -> Self {
        self.is_private = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Setter,
}

/// A field or setter wired during the injection phase.
#[derive(Clone)]
pub struct InjectionPoint {
    name: &'static str,
    kind: MemberKind,
    modifiers: Modifiers,
    param: Param,
    declared_in: &'static str,
    depth: usize,
    assign: AssignFn,
}

impl InjectionPoint {
    /// Describe a member of `T` receiving a value of type `A`
    pub fn new<T, A, F>(name: &'static str, kind: MemberKind, param: Param, assign: F) -> Self
    where
        T: Injectable,
        A: 'static,
        F: Fn(&T, A) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let assign: AssignFn = Arc::new(move |target: AnyRef<'_>, value: Box<dyn Any>| {
            let target = target.downcast_ref::<T>().ok_or_else(|| -> BoxError {
                format!(
                    "member '{name}' belongs to {}, not to the given value",
                    std::any::type_name::<T>()
                )
                .into()
            })?;
            let value = value.downcast::<A>().map_err(|_| -> BoxError {
                format!(
                    "member '{name}' expects a value of type {}",
                    std::any::type_name::<A>()
                )
                .into()
            })?;
            assign(target, *value)
        });
        Self {
            name,
            kind,
            modifiers: Modifiers::NONE,
            param,
            declared_in: std::any::type_name::<T>(),
            depth: 0,
            assign,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    #[inline]
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    #[inline]
    pub fn param(&self) -> &Param {
        &self.param
    }

    /// Type that declared the member
    #[inline]
    pub fn declared_in(&self) -> &'static str {
        self.declared_in
    }

    /// 0 for the type's own members, 1 for its parent's, and so on
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn assign(
        &self,
        target: AnyRef<'_>,
        value: Box<dyn Any>,
    ) -> std::result::Result<(), BoxError> {
        (self.assign)(target, value)
    }

    pub(crate) fn projected<T: Injectable, P: Injectable>(&self, project: fn(&T) -> &P) -> Self {
        let inner = Arc::clone(&self.assign);
        let name = self.name;
        let assign: AssignFn = Arc::new(move |target: AnyRef<'_>, value: Box<dyn Any>| {
            let target = target.downcast_ref::<T>().ok_or_else(|| -> BoxError {
                format!(
                    "member '{name}' belongs to {}, not to the given value",
                    std::any::type_name::<T>()
                )
                .into()
            })?;
            inner(project(target), value)
        });
        Self {
            name,
            kind: self.kind,
            modifiers: self.modifiers,
            param: self.param.clone(),
            declared_in: self.declared_in,
            depth: self.depth + 1,
            assign,
        }
    }
}

impl fmt::Debug for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionPoint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("declared_in", &self.declared_in)
            .field("depth", &self.depth)
            .field("param", &self.param)
            .finish()
    }
}

/// Resolved arguments handed to a constructor or factory method.
///
/// Each argument is taken exactly once, by position, as the type its binding
/// produces: `V` for value bindings, `Arc<U>` for required dependencies and
/// `Option<Arc<U>>` for optional ones.
pub struct Args {
    bean: String,
    values: Vec<Option<Box<dyn Any>>>,
}

impl Args {
    pub(crate) fn new(bean: &str, values: Vec<Box<dyn Any>>) -> Self {
        Self {
            bean: bean.to_string(),
            values: values.into_iter().map(Some).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Take the argument at `index` as `A`
    pub fn take<A: 'static>(&mut self, index: usize) -> Result<A> {
        let value = self
            .values
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| {
                DiError::invalid(
                    &self.bean,
                    format!("argument #{index} is missing or was already taken"),
                )
            })?;
        value.downcast::<A>().map(|boxed| *boxed).map_err(|_| {
            DiError::invalid(
                &self.bean,
                format!(
                    "argument #{index} is not a {}",
                    std::any::type_name::<A>()
                ),
            )
        })
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("bean", &self.bean)
            .field("len", &self.values.len())
            .finish()
    }
}
