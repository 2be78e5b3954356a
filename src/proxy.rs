//! Method interception
//!
//! A proxy is an ordinary type implementing the same trait(s) as its target.
//! Each forwarded method goes through an [`Interceptor`], which packages the
//! call as an [`Invocation`] and hands it to an [`InvocationHandler`]. The
//! handler may read or rewrite the arguments, call [`Invocation::proceed`] to
//! reach the real object, or return a value of its own.
//!
//! [`ProxyRegistry`] is the stock [`ProxyFactory`]: it knows, per target
//! concrete type, how to wrap an interceptor into a proxy instance.
//!
//! ```rust
//! use bean_context::{Bean, BeanType, Interceptor, Invocation, InvocationHandler, ProxyFactory, ProxyRegistry, Result};
//! use std::any::Any;
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self, name: &str) -> String;
//! }
//!
//! struct Plain;
//! impl Greeter for Plain {
//!     fn greet(&self, name: &str) -> String {
//!         format!("Hello, {name}")
//!     }
//! }
//!
//! struct GreeterProxy(Interceptor);
//! impl Greeter for GreeterProxy {
//!     fn greet(&self, name: &str) -> String {
//!         self.0
//!             .invoke::<dyn Greeter, _, _>("greet", name.to_string(), |g, name| g.greet(&name))
//!             .unwrap_or_else(|e| e.to_string())
//!     }
//! }
//!
//! struct Shout;
//! impl InvocationHandler for Shout {
//!     fn invoke(&self, invocation: Invocation<'_>) -> Result<Box<dyn Any>> {
//!         let out = invocation.proceed()?;
//!         let text = out.downcast::<String>().map(|s| s.to_uppercase()).unwrap_or_default();
//!         Ok(Box::new(text))
//!     }
//! }
//!
//! let proxies = ProxyRegistry::new().with::<Plain, GreeterProxy>(
//!     |ty| ty.view::<dyn Greeter>(|p| p as Arc<dyn Greeter>),
//!     GreeterProxy,
//! );
//!
//! let target_type = BeanType::builder::<Plain>()
//!     .view::<dyn Greeter>(|p| p as Arc<dyn Greeter>)
//!     .build();
//! let target = Bean::new(Plain, target_type).unwrap();
//! let proxy = proxies.create_proxy("greeter", target, Arc::new(Shout)).unwrap();
//!
//! let greeter = proxy.cast::<dyn Greeter>().unwrap();
//! assert_eq!(greeter.greet("bob"), "HELLO, BOB");
//! ```

use crate::bean::{AnyArc, Bean, BeanType, TypeBuilder};
use crate::{DiError, Injectable, Result};
use ahash::RandomState;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Receives every call made through a proxy
pub trait InvocationHandler: Send + Sync {
    fn invoke(&self, invocation: Invocation<'_>) -> Result<Box<dyn Any>>;
}

type Proceed<'a> = Box<dyn FnOnce(Box<dyn Any>) -> Result<Box<dyn Any>> + 'a>;

/// One intercepted method call
pub struct Invocation<'a> {
    bean_name: &'a str,
    method: &'static str,
    target: &'a Bean,
    args: Box<dyn Any>,
    proceed: Proceed<'a>,
}

impl<'a> Invocation<'a> {
    #[inline]
    pub fn bean_name(&self) -> &str {
        self.bean_name
    }

    #[inline]
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The real object behind the proxy
    #[inline]
    pub fn target(&self) -> &Bean {
        self.target
    }

    /// Arguments, as the type the proxy packed them in (a value or a tuple)
    pub fn args<A: 'static>(&self) -> Option<&A> {
        self.args.downcast_ref::<A>()
    }

    pub fn args_mut<A: 'static>(&mut self) -> Option<&mut A> {
        self.args.downcast_mut::<A>()
    }

    /// Call the real method with the current arguments
    pub fn proceed(self) -> Result<Box<dyn Any>> {
        (self.proceed)(self.args)
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("bean_name", &self.bean_name)
            .field("method", &self.method)
            .field("target", &self.target.type_name())
            .finish()
    }
}

/// Forwarding half of a proxy: the target plus the handler.
#[derive(Clone)]
pub struct Interceptor {
    bean_name: Arc<str>,
    target: Bean,
    handler: Arc<dyn InvocationHandler>,
}

impl Interceptor {
    pub fn new(bean_name: &str, target: Bean, handler: Arc<dyn InvocationHandler>) -> Self {
        Self {
            bean_name: Arc::from(bean_name),
            target,
            handler,
        }
    }

    #[inline]
    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    #[inline]
    pub fn target(&self) -> &Bean {
        &self.target
    }

    /// Target viewed as `T`
    pub fn target_as<T: ?Sized + 'static>(&self) -> Result<Arc<T>> {
        self.target.cast::<T>().ok_or_else(|| DiError::TypeMismatch {
            name: self.bean_name.to_string(),
            required: std::any::type_name::<T>(),
            actual: self.target.type_name(),
        })
    }

    /// Route `method` through the handler. `call` performs the real call on
    /// the target viewed as `T` with the (possibly rewritten) arguments.
    pub fn invoke<T, A, R>(
        &self,
        method: &'static str,
        args: A,
        call: impl FnOnce(&T, A) -> R,
    ) -> Result<R>
    where
        T: ?Sized + 'static,
        A: 'static,
        R: 'static,
    {
        let target = self.target_as::<T>()?;

        #[cfg(feature = "logging")]
        trace!(
            target: "bean_context",
            bean = &*self.bean_name,
            method = method,
            "Intercepting call"
        );

        let proceed: Proceed<'_> = Box::new(move |args: Box<dyn Any>| {
            let args = args.downcast::<A>().map_err(|_| {
                DiError::invocation(method, "arguments were replaced with a different type")
            })?;
            Ok(Box::new(call(&*target, *args)) as Box<dyn Any>)
        });
        let invocation = Invocation {
            bean_name: &self.bean_name,
            method,
            target: &self.target,
            args: Box::new(args),
            proceed,
        };
        let result = self.handler.invoke(invocation)?;
        result.downcast::<R>().map(|r| *r).map_err(|_| {
            DiError::invocation(
                method,
                format!("handler returned a value that is not {}", std::any::type_name::<R>()),
            )
        })
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("bean_name", &self.bean_name)
            .field("target", &self.target)
            .finish()
    }
}

/// Produces substitute instances for intercepted beans
pub trait ProxyFactory: Send + Sync {
    /// Build a proxy for `target`. The proxy must be castable to every type
    /// the target's definition is declared as.
    fn create_proxy(
        &self,
        bean_name: &str,
        target: Bean,
        handler: Arc<dyn InvocationHandler>,
    ) -> Result<Bean>;
}

type BuildFn = Arc<dyn Fn(Interceptor) -> AnyArc + Send + Sync>;

struct ProxyEntry {
    proxy_type: Arc<BeanType>,
    build: BuildFn,
}

/// Proxy types keyed by the concrete type they wrap
#[derive(Default)]
pub struct ProxyRegistry {
    entries: HashMap<TypeId, ProxyEntry, RandomState>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use proxy type `P` for targets of concrete type `T`. `describe` declares
    /// the views of `P` (normally the same traits `T` is resolved as).
    pub fn register<T, P>(
        &mut self,
        describe: impl FnOnce(TypeBuilder<P>) -> TypeBuilder<P>,
        build: impl Fn(Interceptor) -> P + Send + Sync + 'static,
    ) -> &mut Self
    where
        T: Injectable,
        P: Injectable,
    {
        let proxy_type = describe(BeanType::builder::<P>()).build();
        let build: BuildFn = Arc::new(move |interceptor| Arc::new(build(interceptor)) as AnyArc);
        self.entries
            .insert(TypeId::of::<T>(), ProxyEntry { proxy_type, build });
        self
    }

    pub fn with<T, P>(
        mut self,
        describe: impl FnOnce(TypeBuilder<P>) -> TypeBuilder<P>,
        build: impl Fn(Interceptor) -> P + Send + Sync + 'static,
    ) -> Self
    where
        T: Injectable,
        P: Injectable,
    {
        self.register::<T, P>(describe, build);
        self
    }

    /// Whether targets of concrete type `ty` can be proxied
    #[inline]
    pub fn supports(&self, ty: TypeId) -> bool {
        self.entries.contains_key(&ty)
    }
}

impl ProxyFactory for ProxyRegistry {
    fn create_proxy(
        &self,
        bean_name: &str,
        target: Bean,
        handler: Arc<dyn InvocationHandler>,
    ) -> Result<Bean> {
        let entry = self
            .entries
            .get(&target.bean_type().key().id())
            .ok_or_else(|| {
                DiError::invalid(
                    bean_name,
                    format!("no proxy type registered for {}", target.type_name()),
                )
            })?;
        let object = (entry.build)(Interceptor::new(bean_name, target, handler));
        Ok(Bean::from_parts(object, Arc::clone(&entry.proxy_type)))
    }
}

impl fmt::Debug for ProxyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Counter: Send + Sync {
        fn add(&self, a: i32, b: i32) -> i32;
    }

    struct Real;
    impl Counter for Real {
        fn add(&self, a: i32, b: i32) -> i32 {
            a + b
        }
    }

    struct CounterProxy(Interceptor);
    impl Counter for CounterProxy {
        fn add(&self, a: i32, b: i32) -> i32 {
            self.0
                .invoke::<dyn Counter, _, _>("add", (a, b), |c, (a, b)| c.add(a, b))
                .unwrap_or(i32::MIN)
        }
    }

    fn registry() -> ProxyRegistry {
        ProxyRegistry::new().with::<Real, CounterProxy>(
            |ty| ty.view::<dyn Counter>(|p| p as Arc<dyn Counter>),
            CounterProxy,
        )
    }

    fn target() -> Bean {
        let ty = BeanType::builder::<Real>()
            .view::<dyn Counter>(|r| r as Arc<dyn Counter>)
            .build();
        Bean::new(Real, ty).unwrap()
    }

    struct Doubler {
        calls: AtomicUsize,
    }

    impl InvocationHandler for Doubler {
        fn invoke(&self, mut invocation: Invocation<'_>) -> Result<Box<dyn Any>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(invocation.method(), "add");
            assert_eq!(invocation.bean_name(), "counter");
            if let Some(args) = invocation.args_mut::<(i32, i32)>() {
                args.0 *= 2;
            }
            invocation.proceed()
        }
    }

    struct ShortCircuit;
    impl InvocationHandler for ShortCircuit {
        fn invoke(&self, invocation: Invocation<'_>) -> Result<Box<dyn Any>> {
            assert!(invocation.target().downcast::<Real>().is_some());
            Ok(Box::new(42i32))
        }
    }

    struct WrongReturn;
    impl InvocationHandler for WrongReturn {
        fn invoke(&self, _invocation: Invocation<'_>) -> Result<Box<dyn Any>> {
            Ok(Box::new("nope"))
        }
    }

    #[test]
    fn test_handler_rewrites_args() {
        let handler = Arc::new(Doubler {
            calls: AtomicUsize::new(0),
        });
        let proxy = registry()
            .create_proxy("counter", target(), handler.clone())
            .unwrap();
        let counter = proxy.cast::<dyn Counter>().unwrap();
        assert_eq!(counter.add(2, 3), 7);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(proxy.downcast::<CounterProxy>().is_some());
    }

    #[test]
    fn test_handler_short_circuits() {
        let proxy = registry()
            .create_proxy("counter", target(), Arc::new(ShortCircuit))
            .unwrap();
        assert_eq!(proxy.cast::<dyn Counter>().unwrap().add(1, 1), 42);
    }

    #[test]
    fn test_wrong_return_type() {
        let interceptor = Interceptor::new("counter", target(), Arc::new(WrongReturn));
        let err = interceptor
            .invoke::<dyn Counter, _, _>("add", (1, 2), |c, (a, b)| c.add(a, b))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invocation);
    }

    #[test]
    fn test_unregistered_target() {
        let err = ProxyRegistry::new()
            .create_proxy("counter", target(), Arc::new(ShortCircuit))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDefinition);
        assert!(registry().supports(TypeId::of::<Real>()));
    }
}
