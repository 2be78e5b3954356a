//! Application context
//!
//! [`ContextBuilder::build`] runs the whole bootstrap: scan, build definitions,
//! create configuration holders, post-processors and the remaining beans,
//! inject, initialize. The resulting [`ApplicationContext`] is read-only and
//! safe to share between threads.

use crate::bean::{Bean, TypeKey};
use crate::catalog::{ComponentCatalog, Scanner};
use crate::definition::ComponentDefinition;
use crate::factory::BeanFactory;
use crate::property::PropertyResolver;
use crate::registry::{DefinitionRegistry, check_assignable, choose_unique};
use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::TypeId;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, info, warn};

// =============================================================================
// Container State
// =============================================================================

/// Bootstrap progress of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ContainerState {
    Scanning = 0,
    DefinitionsBuilt = 1,
    PrivilegedBeansCreated = 2,
    PostProcessorsCreated = 3,
    AllBeansCreated = 4,
    Injected = 5,
    Initialized = 6,
    Closed = 7,
}

impl ContainerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Scanning,
            1 => Self::DefinitionsBuilt,
            2 => Self::PrivilegedBeansCreated,
            3 => Self::PostProcessorsCreated,
            4 => Self::AllBeansCreated,
            5 => Self::Injected,
            6 => Self::Initialized,
            _ => Self::Closed,
        }
    }
}

#[inline]
fn advance(state: &mut ContainerState, next: ContainerState, count: usize) {
    debug_assert!(next > *state);
    *state = next;

    #[cfg(feature = "logging")]
    debug!(target: "bean_context", state = ?next, count = count, "Container state changed");
    #[cfg(not(feature = "logging"))]
    let _ = count;
}

// =============================================================================
// Builder
// =============================================================================

/// Configures and runs the bootstrap.
///
/// # Examples
///
/// ```rust
/// use bean_context::{ApplicationContext, BeanType, ComponentCatalog, Param, PropertyResolver};
/// use std::sync::Arc;
///
/// struct Server {
///     port: u16,
/// }
///
/// let catalog = ComponentCatalog::new().with(
///     BeanType::builder::<Server>()
///         .component()
///         .type_name("app::Server")
///         .constructor(vec![Param::value::<u16>("${server.port:8080}")], |args| {
///             Ok(Server { port: args.take(0)? })
///         })
///         .build(),
/// );
///
/// let context = ApplicationContext::builder(catalog)
///     .scan("app")
///     .properties(PropertyResolver::new())
///     .build()
///     .unwrap();
///
/// let server: Arc<Server> = context.get_bean().unwrap();
/// assert_eq!(server.port, 8080);
/// context.close();
/// ```
pub struct ContextBuilder {
    catalog: Arc<ComponentCatalog>,
    scanner: Arc<dyn Scanner>,
    packages: Vec<String>,
    imports: Vec<String>,
    properties: PropertyResolver,
}

impl ContextBuilder {
    fn new(catalog: Arc<ComponentCatalog>) -> Self {
        Self {
            scanner: Arc::clone(&catalog) as Arc<dyn Scanner>,
            catalog,
            packages: Vec::new(),
            imports: Vec::new(),
            properties: PropertyResolver::new(),
        }
    }

    /// Add a base package to scan. Without any, every known class is scanned.
    pub fn scan(mut self, base_package: impl Into<String>) -> Self {
        self.packages.push(base_package.into());
        self
    }

    /// Add a class by fully-qualified name, in addition to the scanned ones
    pub fn import(mut self, type_name: impl Into<String>) -> Self {
        self.imports.push(type_name.into());
        self
    }

    pub fn properties(mut self, properties: PropertyResolver) -> Self {
        self.properties = properties;
        self
    }

    /// Replace the scanner (the catalog itself by default). Classes are
    /// still loaded from the catalog.
    pub fn scanner(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Run the bootstrap. Any failure aborts it and no context is returned.
    pub fn build(self) -> Result<ApplicationContext> {
        let mut state = ContainerState::Scanning;

        #[cfg(feature = "logging")]
        info!(
            target: "bean_context",
            packages = ?self.packages,
            imports = self.imports.len(),
            "Starting application context"
        );

        let type_names = self.scan_type_names();
        let registry = self.create_definitions(&type_names)?;
        advance(&mut state, ContainerState::DefinitionsBuilt, registry.len());

        let mut factory = BeanFactory::new(registry, Arc::new(self.properties));

        let created = factory.create_configurations()?;
        advance(&mut state, ContainerState::PrivilegedBeansCreated, created);

        let created = factory.create_post_processors()?;
        advance(&mut state, ContainerState::PostProcessorsCreated, created);

        let created = factory.create_remaining()?;
        advance(&mut state, ContainerState::AllBeansCreated, created);

        factory.inject_all()?;
        advance(&mut state, ContainerState::Injected, factory.registry().len());

        factory.initialize_all()?;
        advance(&mut state, ContainerState::Initialized, factory.registry().len());

        let properties = factory.properties_arc();
        let definitions = factory.finish()?;

        #[cfg(feature = "logging")]
        info!(target: "bean_context", beans = definitions.len(), "Application context started");

        Ok(ApplicationContext::from_definitions(definitions, properties, state))
    }

    fn scan_type_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        if self.packages.is_empty() {
            names.extend(self.scanner.scan(""));
        }
        for package in &self.packages {
            names.extend(self.scanner.scan(package));
        }
        for import in &self.imports {
            if !names.insert(import.clone()) {
                #[cfg(feature = "logging")]
                warn!(
                    target: "bean_context",
                    class = %import,
                    "Ignoring import: class was already found by scanning"
                );
            }
        }

        #[cfg(feature = "logging")]
        debug!(target: "bean_context", classes = names.len(), "Scan finished");

        names
    }

    fn create_definitions(&self, type_names: &BTreeSet<String>) -> Result<DefinitionRegistry> {
        let mut registry = DefinitionRegistry::with_capacity(type_names.len());
        for type_name in type_names {
            let class = self
                .catalog
                .load(type_name)
                .ok_or_else(|| DiError::invalid(type_name, "class not found"))?;
            for definition in ComponentDefinition::definitions_for(&class)? {
                registry.register(definition)?;
            }
        }
        Ok(registry)
    }
}

impl fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("catalog", &self.catalog)
            .field("packages", &self.packages)
            .field("imports", &self.imports)
            .finish()
    }
}

// =============================================================================
// Application Context
// =============================================================================

/// A started container.
///
/// All lookups are lock-free reads on a `DashMap` of frozen definitions.
/// [`ApplicationContext::close`] runs the destroy hooks and empties the context.
pub struct ApplicationContext {
    beans: DashMap<String, Arc<ComponentDefinition>, RandomState>,
    properties: Arc<PropertyResolver>,
    state: AtomicU8,
}

impl ApplicationContext {
    /// Start configuring a context over `catalog`
    pub fn builder(catalog: impl Into<Arc<ComponentCatalog>>) -> ContextBuilder {
        ContextBuilder::new(catalog.into())
    }

    fn from_definitions(
        definitions: Vec<ComponentDefinition>,
        properties: Arc<PropertyResolver>,
        state: ContainerState,
    ) -> Self {
        let capacity = definitions.len();
        let shard_amount = if capacity <= 16 {
            8
        } else if capacity <= 64 {
            16
        } else {
            32
        };
        let beans =
            DashMap::with_capacity_and_hasher_and_shard_amount(capacity, RandomState::new(), shard_amount);
        for definition in definitions {
            beans.insert(definition.name().to_string(), Arc::new(definition));
        }
        Self {
            beans,
            properties,
            state: AtomicU8::new(state as u8),
        }
    }

    #[inline]
    pub fn state(&self) -> ContainerState {
        ContainerState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn exists_bean(&self, name: &str) -> bool {
        self.beans.contains_key(name)
    }

    /// Definition of a bean, with its instance
    pub fn find_definition(&self, name: &str) -> Option<Arc<ComponentDefinition>> {
        self.beans.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Bean by name, type-erased
    pub fn get_bean_by_name(&self, name: &str) -> Result<Bean> {
        let definition = self
            .find_definition(name)
            .ok_or_else(|| DiError::no_such_name(name))?;
        definition.required_instance().cloned()
    }

    /// Bean by name, viewed as `T`
    pub fn get_bean_named<T: ?Sized + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let definition = self
            .find_definition(name)
            .ok_or_else(|| DiError::no_such_name(name))?;
        check_assignable(&definition, &TypeKey::of::<T>())?;
        cast_instance::<T>(&definition)
    }

    /// The unique bean assignable to `T`. Several candidates are arbitrated by
    /// the primary flag.
    pub fn get_bean<T: ?Sized + 'static>(&self) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        let definition = choose_unique(&key, self.candidates(key.id()))?
            .ok_or_else(|| DiError::no_such_type(key.name()))?;
        cast_instance::<T>(&definition)
    }

    /// Every bean assignable to `T`, in `(order, name)` order
    ///
    /// Candidates are selected by their definition's declared type. If one of
    /// them was replaced by a proxy that has no `T` view, the whole call fails
    /// with [`DiError::TypeMismatch`]; ask for a trait the proxy implements.
    pub fn get_beans<T: ?Sized + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.candidates(TypeId::of::<T>())
            .iter()
            .map(|definition| cast_instance::<T>(definition))
            .collect()
    }

    fn candidates(&self, ty: TypeId) -> Vec<Arc<ComponentDefinition>> {
        let mut found: Vec<Arc<ComponentDefinition>> = self
            .beans
            .iter()
            .filter(|entry| entry.value().is_assignable_to(ty))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        found.sort_by(|a, b| ComponentDefinition::ordering(a, b));
        found
    }

    /// Bean names in `(order, name)` order
    pub fn bean_names(&self) -> Vec<String> {
        let mut definitions: Vec<Arc<ComponentDefinition>> =
            self.beans.iter().map(|entry| Arc::clone(entry.value())).collect();
        definitions.sort_by(|a, b| ComponentDefinition::ordering(a, b));
        definitions
            .iter()
            .map(|definition| definition.name().to_string())
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.beans.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }

    #[inline]
    pub fn properties(&self) -> &PropertyResolver {
        &self.properties
    }

    /// Run every destroy hook, then release all beans. Hook failures are
    /// logged and do not stop the remaining hooks. Calling it again is a no-op.
    pub fn close(&self) {
        if ContainerState::from_u8(self.state.swap(ContainerState::Closed as u8, Ordering::AcqRel))
            == ContainerState::Closed
        {
            return;
        }

        #[cfg(feature = "logging")]
        info!(target: "bean_context", beans = self.beans.len(), "Closing application context");

        let mut definitions: Vec<Arc<ComponentDefinition>> =
            self.beans.iter().map(|entry| Arc::clone(entry.value())).collect();
        definitions.sort_by(|a, b| ComponentDefinition::ordering(b, a));

        for definition in &definitions {
            let Some(hook) = definition.destroy_hook() else {
                continue;
            };
            let Some(target) = definition.origin().or(definition.instance()) else {
                continue;
            };
            if let Err(error) = hook.invoke(definition.name(), target) {
                #[cfg(feature = "logging")]
                warn!(
                    target: "bean_context",
                    bean = definition.name(),
                    hook = hook.name(),
                    error = %error,
                    "Destroy hook failed"
                );
                #[cfg(not(feature = "logging"))]
                let _ = error;
            }
        }
        self.beans.clear();

        #[cfg(feature = "logging")]
        info!(target: "bean_context", "Application context closed");
    }
}

fn cast_instance<T: ?Sized + 'static>(definition: &ComponentDefinition) -> Result<Arc<T>> {
    let instance = definition.required_instance()?;
    instance.cast::<T>().ok_or_else(|| DiError::TypeMismatch {
        name: definition.name().to_string(),
        required: std::any::type_name::<T>(),
        actual: instance.type_name(),
    })
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("state", &self.state())
            .field("beans", &self.beans.len())
            .finish()
    }
}
