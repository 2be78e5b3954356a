//! Runtime type metadata and type-erased bean handles
//!
//! Rust has no class reflection, so every managed type carries a [`BeanType`]
//! describing what the container needs to know about it:
//!
//! - the *views* it is assignable to (itself, plus any `dyn Trait` it should be
//!   resolvable as),
//! - named no-argument methods (resolved by name for lifecycle hooks),
//! - wiring members (fields/setters filled after construction),
//! - annotations (string-keyed markers read by post-processors).
//!
//! A [`Bean`] pairs a live instance with its `BeanType`, so views are always
//! computed from the instance's *own* type. This is what lets a proxy stand in
//! for its target: the proxy type registers the same trait views.

use crate::binding::{InjectionPoint, MemberKind, Param};
use crate::catalog::{ClassBuilder, Stereotype};
use crate::{BoxError, DiError, Injectable, Result};
use ahash::RandomState;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased shared instance
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Borrowed type-erased instance
pub type AnyRef<'a> = &'a (dyn Any + Send + Sync);

/// Named no-argument method on a concrete type
pub type MethodFn = Arc<dyn Fn(AnyRef<'_>) -> std::result::Result<(), BoxError> + Send + Sync>;

type Caster = Arc<dyn Fn(&AnyArc) -> Option<Box<dyn Any>> + Send + Sync>;

/// Identity of a (possibly unsized) Rust type, with a readable name.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for type `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully-qualified type name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, without generic arguments
    pub fn simple_name(&self) -> &'static str {
        simple_name(self.name)
    }
}

pub(crate) fn simple_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

struct View {
    key: TypeKey,
    cast: Caster,
}

/// Runtime metadata of one concrete type.
pub struct BeanType {
    key: TypeKey,
    views: HashMap<TypeId, View, RandomState>,
    methods: HashMap<&'static str, MethodFn, RandomState>,
    members: Vec<InjectionPoint>,
    annotations: Vec<(&'static str, String)>,
}

impl BeanType {
    /// Start describing type `T`. The type is always assignable to itself.
    #[inline]
    pub fn builder<T: Injectable>() -> TypeBuilder<T> {
        TypeBuilder::new()
    }

    /// Key of the described concrete type
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.key.name
    }

    /// Whether instances of this type can be viewed as the type `ty`
    #[inline]
    pub fn is_assignable_to(&self, ty: TypeId) -> bool {
        self.views.contains_key(&ty)
    }

    /// Value of an annotation, if present
    pub fn annotation(&self, name: &str) -> Option<&str> {
        self.annotations
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    #[inline]
    pub(crate) fn method(&self, name: &str) -> Option<&MethodFn> {
        self.methods.get(name)
    }

    /// Wiring members, including the ones inherited through [`TypeBuilder::extends`]
    #[inline]
    pub fn members(&self) -> &[InjectionPoint] {
        &self.members
    }

    fn cast(&self, object: &AnyArc, ty: TypeId) -> Option<Box<dyn Any>> {
        self.views.get(&ty).and_then(|view| (view.cast)(object))
    }
}

impl fmt::Debug for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanType")
            .field("name", &self.key.name)
            .field(
                "views",
                &self.views.values().map(|v| v.key.name).collect::<Vec<_>>(),
            )
            .field("methods", &self.methods.len())
            .field("members", &self.members.len())
            .finish()
    }
}

/// Builder for [`BeanType`].
///
/// # Examples
///
/// ```rust
/// use bean_context::{BeanType, Binding, InjectCell};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// #[derive(Default)]
/// struct English {
///     name: InjectCell<String>,
/// }
///
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         format!("Hello, {}", self.name.get().map(String::as_str).unwrap_or("?"))
///     }
/// }
///
/// let ty = BeanType::builder::<English>()
///     .view::<dyn Greeter>(|e| e as Arc<dyn Greeter>)
///     .field("name", Binding::value::<String>("${app.user}"), |e: &English, v: String| {
///         Ok(e.name.set(v)?)
///     })
///     .build();
///
/// assert!(ty.is_assignable_to(std::any::TypeId::of::<dyn Greeter>()));
/// assert_eq!(ty.members().len(), 1);
/// ```
pub struct TypeBuilder<T> {
    ty: BeanType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Injectable> TypeBuilder<T> {
    fn new() -> Self {
        let builder = Self {
            ty: BeanType {
                key: TypeKey::of::<T>(),
                views: HashMap::with_hasher(RandomState::new()),
                methods: HashMap::with_hasher(RandomState::new()),
                members: Vec::new(),
                annotations: Vec::new(),
            },
            _marker: PhantomData,
        };
        builder.view::<T>(|t| t)
    }

    /// Make `T` assignable to `U` (typically `dyn Trait`).
    pub fn view<U: ?Sized + 'static>(mut self, cast: fn(Arc<T>) -> Arc<U>) -> Self {
        let caster: Caster = Arc::new(move |object: &AnyArc| {
            let concrete = Arc::clone(object).downcast::<T>().ok()?;
            Some(Box::new(cast(concrete)) as Box<dyn Any>)
        });
        self.ty.views.insert(
            TypeId::of::<U>(),
            View {
                key: TypeKey::of::<U>(),
                cast: caster,
            },
        );
        self
    }

    /// Attach an annotation, e.g. `annotate("around", "logHandler")`
    pub fn annotate(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.ty.annotations.retain(|(n, _)| *n != name);
        self.ty.annotations.push((name, value.into()));
        self
    }

    /// Register a named no-argument method (usable as init/destroy hook)
    pub fn method<F>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let call: MethodFn = Arc::new(move |target: AnyRef<'_>| {
            let target = target.downcast_ref::<T>().ok_or_else(|| -> BoxError {
                format!("method '{name}' called on a value that is not {}", std::any::type_name::<T>()).into()
            })?;
            f(target)
        });
        self.ty.methods.insert(name, call);
        self
    }

    /// Declare a wired field
    pub fn field<A, F>(self, name: &'static str, param: impl Into<Param>, assign: F) -> Self
    where
        A: 'static,
        F: Fn(&T, A) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.member(InjectionPoint::new::<T, A, F>(
            name,
            MemberKind::Field,
            param.into(),
            assign,
        ))
    }

    /// Declare a wired single-argument setter
    pub fn setter<A, F>(self, name: &'static str, param: impl Into<Param>, assign: F) -> Self
    where
        A: 'static,
        F: Fn(&T, A) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.member(InjectionPoint::new::<T, A, F>(
            name,
            MemberKind::Setter,
            param.into(),
            assign,
        ))
    }

    /// Declare a member built by hand (modifiers, unusual bindings)
    pub fn member(mut self, point: InjectionPoint) -> Self {
        self.ty.members.push(point);
        self
    }

    /// Inherit the members and named methods of an embedded ancestor.
    ///
    /// `project` borrows the ancestor part out of `T`. Inherited members are
    /// wired after the members declared on `T` itself.
    pub fn extends<P: Injectable>(mut self, parent: &BeanType, project: fn(&T) -> &P) -> Self {
        for point in parent.members() {
            self.ty.members.push(point.projected::<T, P>(project));
        }
        for (name, call) in &parent.methods {
            if self.ty.methods.contains_key(name) {
                continue;
            }
            let call = Arc::clone(call);
            let projected: MethodFn = Arc::new(move |target: AnyRef<'_>| {
                let target = target.downcast_ref::<T>().ok_or_else(|| -> BoxError {
                    format!("value is not {}", std::any::type_name::<T>()).into()
                })?;
                call(project(target))
            });
            self.ty.methods.insert(*name, projected);
        }
        self
    }

    /// Finish the type description
    pub fn build(self) -> Arc<BeanType> {
        Arc::new(self.ty)
    }

    /// Describe `T` as a scannable component
    pub fn component(self) -> ClassBuilder<T> {
        ClassBuilder::new(self.build(), Some(Stereotype::Component))
    }

    /// Describe `T` as a configuration holder that may declare factory methods
    pub fn configuration(self) -> ClassBuilder<T> {
        ClassBuilder::new(self.build(), Some(Stereotype::Configuration))
    }

    /// Describe `T` as a scannable type that is *not* a component
    pub fn plain(self) -> ClassBuilder<T> {
        ClassBuilder::new(self.build(), None)
    }
}

/// A live instance together with the metadata of its concrete type.
///
/// Cloning is cheap (two `Arc` clones) and preserves identity.
#[derive(Clone)]
pub struct Bean {
    object: AnyArc,
    ty: Arc<BeanType>,
}

impl Bean {
    /// Wrap a value. Fails if `ty` does not describe `T`.
    pub fn new<T: Injectable>(value: T, ty: Arc<BeanType>) -> Result<Self> {
        Self::from_arc(Arc::new(value), ty)
    }

    /// Wrap a shared value. Fails if `ty` does not describe `T`.
    pub fn from_arc<T: Injectable>(value: Arc<T>, ty: Arc<BeanType>) -> Result<Self> {
        if ty.key.id != TypeId::of::<T>() {
            return Err(DiError::invalid(
                ty.key.name,
                format!("type metadata cannot describe a {}", std::any::type_name::<T>()),
            ));
        }
        Ok(Self { object: value, ty })
    }

    #[inline]
    pub(crate) fn from_parts(object: AnyArc, ty: Arc<BeanType>) -> Self {
        Self { object, ty }
    }

    /// Metadata of the instance's concrete type
    #[inline]
    pub fn bean_type(&self) -> &Arc<BeanType> {
        &self.ty
    }

    /// Name of the instance's concrete type
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.ty.key.name
    }

    /// View the instance as `U` (the concrete type or a registered `dyn Trait`)
    pub fn cast<U: ?Sized + 'static>(&self) -> Option<Arc<U>> {
        let boxed = self.ty.cast(&self.object, TypeId::of::<U>())?;
        boxed.downcast::<Arc<U>>().ok().map(|arc| *arc)
    }

    /// Whether [`Bean::cast`] would succeed for `ty`
    #[inline]
    pub fn can_cast(&self, ty: TypeId) -> bool {
        self.ty.is_assignable_to(ty)
    }

    /// Downcast to the concrete type
    #[inline]
    pub fn downcast<T: Injectable>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.object).downcast::<T>().ok()
    }

    #[inline]
    pub fn as_any(&self) -> AnyRef<'_> {
        &*self.object
    }

    /// Identity comparison
    #[inline]
    pub fn ptr_eq(&self, other: &Bean) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.object), Arc::as_ptr(&other.object))
    }
}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bean")
            .field("type", &self.ty.key.name)
            .field("ptr", &Arc::as_ptr(&self.object))
            .finish()
    }
}
