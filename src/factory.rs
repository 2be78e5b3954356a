//! Creation engine
//!
//! [`BeanFactory`] owns the definition registry during bootstrap and creates
//! every bean as an *early singleton*: constructed, stored and run through the
//! `before initialization` hooks, but not yet injected. Creation happens in
//! three phases:
//!
//! 1. configuration holders,
//! 2. post-processors (sorted by `(order, name)`), which then become the
//!    active pipeline,
//! 3. everything else, in `(order, name)` order.
//!
//! Constructor arguments are resolved recursively, so dependencies are created
//! on demand; a bean requested again while its own arguments are still being
//! resolved is a constructor cycle.

use crate::bean::{AnyArc, Bean};
use crate::binding::{Args, Binding, BindingKind, Param};
use crate::definition::{ComponentDefinition, Construction};
use crate::processor::BeanPostProcessor;
use crate::property::PropertyResolver;
use crate::registry::DefinitionRegistry;
use crate::{DiError, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Bootstrap-time owner of all definitions
pub struct BeanFactory {
    registry: DefinitionRegistry,
    properties: Arc<PropertyResolver>,
    creating: Vec<String>,
    pub(crate) post_processors: Vec<(String, Arc<dyn BeanPostProcessor>)>,
}

impl BeanFactory {
    pub fn new(registry: DefinitionRegistry, properties: Arc<PropertyResolver>) -> Self {
        Self {
            registry,
            properties,
            creating: Vec::new(),
            post_processors: Vec::new(),
        }
    }

    #[inline]
    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    #[inline]
    pub fn properties(&self) -> &PropertyResolver {
        &self.properties
    }

    #[inline]
    pub(crate) fn properties_arc(&self) -> Arc<PropertyResolver> {
        Arc::clone(&self.properties)
    }

    /// Names of the active post-processors, in pipeline order
    pub fn post_processor_names(&self) -> impl Iterator<Item = &str> {
        self.post_processors.iter().map(|(name, _)| name.as_str())
    }

    /// Existing instance of `name`, or a freshly created early singleton
    pub fn get_or_create(&mut self, name: &str) -> Result<Bean> {
        match self.registry.lookup_by_name(name).and_then(ComponentDefinition::instance) {
            Some(bean) => Ok(bean.clone()),
            None => self.create_early_singleton(name),
        }
    }

    /// Create the instance of `name` unless it already exists.
    ///
    /// Returns the exposed instance, which may be a substitute installed by a
    /// post-processor.
    pub fn create_early_singleton(&mut self, name: &str) -> Result<Bean> {
        let def = self
            .registry
            .lookup_by_name(name)
            .ok_or_else(|| DiError::no_such_name(name))?;
        if let Some(instance) = def.instance() {
            return Ok(instance.clone());
        }

        if let Some(start) = self.creating.iter().position(|n| n == name) {
            let mut path = self.creating[start..].to_vec();
            path.push(name.to_string());
            return Err(DiError::CyclicConstruction {
                name: name.to_string(),
                path,
            });
        }

        let privileged = def.is_privileged();
        let construction = def.construction().clone();
        let bean_type = Arc::clone(def.bean_type());

        #[cfg(feature = "logging")]
        debug!(
            target: "bean_context",
            bean = name,
            bean_type = bean_type.name(),
            depth = self.creating.len(),
            "Creating bean as early singleton"
        );

        self.creating.push(name.to_string());
        let created = self.construct(name, privileged, construction);
        self.creating.pop();
        let bean = Bean::from_parts(created?, bean_type);

        self.store_instance(name, bean.clone())?;
        self.apply_before_initialization(name, bean)
    }

    fn construct(
        &mut self,
        name: &str,
        privileged: bool,
        construction: Construction,
    ) -> Result<AnyArc> {
        match construction {
            Construction::Constructor { params, create } => {
                let mut args = self.resolve_arguments(name, privileged, &params)?;
                create(&mut args).map_err(|source| DiError::creation_failed(name, source))
            }
            Construction::Factory {
                owner,
                method,
                params,
                invoke,
            } => {
                let owner_bean = self.get_or_create(&owner)?;

                #[cfg(feature = "logging")]
                trace!(
                    target: "bean_context",
                    bean = name,
                    owner = %owner,
                    method = method,
                    "Invoking factory method"
                );
                #[cfg(not(feature = "logging"))]
                let _ = method;

                let mut args = self.resolve_arguments(name, privileged, &params)?;
                invoke(owner_bean.as_any(), &mut args)
                    .map_err(|source| DiError::creation_failed(name, source))
            }
        }
    }

    fn resolve_arguments(&mut self, bean: &str, privileged: bool, params: &[Param]) -> Result<Args> {
        let mut values = Vec::with_capacity(params.len());
        for (index, param) in params.iter().enumerate() {
            let binding = param
                .binding()
                .map_err(|reason| DiError::invalid(bean, format!("parameter #{index} {reason}")))?;
            if privileged && binding.is_dependency() {
                return Err(DiError::invalid(
                    bean,
                    format!(
                        "parameter #{index} cannot depend on {binding}: configuration and post-processor beans only accept value bindings"
                    ),
                ));
            }
            values.push(self.resolve_binding(bean, binding, true)?);
        }
        Ok(Args::new(bean, values))
    }

    /// Resolve one binding to the boxed value its consumer expects.
    ///
    /// With `create_missing`, dependencies without an instance are created on
    /// the spot; otherwise they must already exist.
    pub(crate) fn resolve_binding(
        &mut self,
        bean: &str,
        binding: &Binding,
        create_missing: bool,
    ) -> Result<Box<dyn Any>> {
        match &binding.0 {
            BindingKind::Value { key, convert, .. } => convert(&self.properties, key),
            BindingKind::Autowired {
                name,
                required,
                ty,
                produce,
            } => {
                let target = match name {
                    Some(name) => self.registry.lookup_by_name_and_type(name, ty)?,
                    None => self.registry.lookup_unique_by_type(ty)?,
                }
                .map(|def| def.name().to_string());

                let Some(target) = target else {
                    if *required {
                        return Err(DiError::unsatisfied(bean, binding.to_string()));
                    }
                    return produce(None).ok_or_else(|| {
                        DiError::invalid(bean, format!("cannot produce an absent {binding}"))
                    });
                };

                let dependency = if create_missing {
                    self.get_or_create(&target)?
                } else {
                    self.instance_of(&target)?
                };
                produce(Some(&dependency)).ok_or_else(|| DiError::TypeMismatch {
                    name: target,
                    required: ty.name(),
                    actual: dependency.type_name(),
                })
            }
        }
    }

    /// Exposed instance of an already created bean
    pub(crate) fn instance_of(&self, name: &str) -> Result<Bean> {
        self.registry
            .lookup_by_name(name)
            .ok_or_else(|| DiError::no_such_name(name))?
            .required_instance()
            .cloned()
    }

    pub(crate) fn store_instance(&mut self, name: &str, bean: Bean) -> Result<()> {
        self.registry
            .get_mut(name)
            .ok_or_else(|| DiError::no_such_name(name))?
            .set_instance(bean)
    }

    fn apply_before_initialization(&mut self, name: &str, bean: Bean) -> Result<Bean> {
        let processors = self.post_processors.clone();
        let mut current = bean;
        for (processor_name, processor) in processors {
            let processed = processor.post_process_before_initialization(current.clone(), name, self)?;
            if !processed.ptr_eq(&current) {
                #[cfg(feature = "logging")]
                debug!(
                    target: "bean_context",
                    bean = name,
                    processor = %processor_name,
                    replacement = processed.type_name(),
                    "Instance replaced before initialization"
                );
                #[cfg(not(feature = "logging"))]
                let _ = &processor_name;

                self.store_instance(name, processed.clone())?;
                current = processed;
            }
        }
        Ok(current)
    }

    pub(crate) fn apply_after_initialization(&mut self, name: &str, bean: Bean) -> Result<Bean> {
        let processors = self.post_processors.clone();
        let mut current = bean;
        for (processor_name, processor) in processors {
            let processed = processor.post_process_after_initialization(current.clone(), name, self)?;
            if !processed.ptr_eq(&current) {
                #[cfg(feature = "logging")]
                debug!(
                    target: "bean_context",
                    bean = name,
                    processor = %processor_name,
                    replacement = processed.type_name(),
                    "Instance replaced after initialization"
                );
                #[cfg(not(feature = "logging"))]
                let _ = &processor_name;

                self.store_instance(name, processed.clone())?;
                current = processed;
            }
        }
        Ok(current)
    }

    /// Phase 1: every configuration holder
    pub fn create_configurations(&mut self) -> Result<usize> {
        let names = self.registry.names_where(ComponentDefinition::is_configuration);
        for name in &names {
            self.create_early_singleton(name)?;
        }

        #[cfg(feature = "logging")]
        debug!(target: "bean_context", count = names.len(), "Configuration beans created");

        Ok(names.len())
    }

    /// Phase 2: every post-processor, which then joins the pipeline in
    /// `(order, name)` order
    pub fn create_post_processors(&mut self) -> Result<usize> {
        let names = self.registry.names_where(ComponentDefinition::is_post_processor);
        let mut pipeline = Vec::with_capacity(names.len());
        for name in &names {
            let bean = self.create_early_singleton(name)?;
            let processor = bean.cast::<dyn BeanPostProcessor>().ok_or_else(|| {
                DiError::invalid(
                    name,
                    format!("{} cannot be used as a BeanPostProcessor", bean.type_name()),
                )
            })?;
            pipeline.push((name.clone(), processor));
        }
        self.post_processors = pipeline;

        #[cfg(feature = "logging")]
        debug!(
            target: "bean_context",
            pipeline = ?names,
            "Post-processor pipeline installed"
        );

        Ok(names.len())
    }

    /// Phase 3: everything not created yet
    pub fn create_remaining(&mut self) -> Result<usize> {
        let names = self.registry.names_where(|def| def.instance().is_none());
        for name in &names {
            self.create_early_singleton(name)?;
        }

        #[cfg(feature = "logging")]
        debug!(target: "bean_context", count = names.len(), "Remaining beans created");

        Ok(names.len())
    }

    /// Record each bean's real object and hand the definitions over
    pub(crate) fn finish(mut self) -> Result<Vec<ComponentDefinition>> {
        for name in self.registry.names_where(|_| true) {
            let exposed = self.instance_of(&name)?;
            let origin = self.unproxied(&name, exposed);
            if let Some(def) = self.registry.get_mut(&name) {
                def.set_origin(origin);
            }
        }
        Ok(self.registry.into_definitions().collect())
    }
}

impl fmt::Debug for BeanFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanFactory")
            .field("definitions", &self.registry.len())
            .field("creating", &self.creating)
            .field(
                "post_processors",
                &self.post_processor_names().collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BeanType, ComponentClass, ErrorKind, FactoryMethod, InjectCell, Param, TypeKey,
    };
    use std::sync::Mutex;

    fn factory(classes: Vec<ComponentClass>, props: PropertyResolver) -> BeanFactory {
        let mut registry = DefinitionRegistry::new();
        for class in &classes {
            for def in ComponentDefinition::definitions_for(class).unwrap() {
                registry.register(def).unwrap();
            }
        }
        BeanFactory::new(registry, Arc::new(props))
    }

    struct Engine {
        power: u32,
    }

    struct Car {
        engine: Arc<Engine>,
        spare: Option<Arc<Wheel>>,
    }

    struct Wheel;

    fn engine() -> ComponentClass {
        BeanType::builder::<Engine>()
            .component()
            .constructor(vec![Param::value::<u32>("${engine.power:90}")], |args| {
                Ok(Engine {
                    power: args.take(0)?,
                })
            })
            .build()
    }

    fn car() -> ComponentClass {
        BeanType::builder::<Car>()
            .component()
            .constructor(
                vec![Param::autowired::<Engine>(), Param::optional::<Wheel>()],
                |args| {
                    Ok(Car {
                        engine: args.take(0)?,
                        spare: args.take(1)?,
                    })
                },
            )
            .build()
    }

    #[test]
    fn test_dependencies_created_on_demand() {
        let mut factory = factory(vec![car(), engine()], PropertyResolver::new());
        let car_bean = factory.create_early_singleton("car").unwrap();
        let car = car_bean.downcast::<Car>().unwrap();
        assert_eq!(car.engine.power, 90);
        assert!(car.spare.is_none());

        let engine_bean = factory.instance_of("engine").unwrap();
        assert!(Arc::ptr_eq(&engine_bean.downcast::<Engine>().unwrap(), &car.engine));

        let again = factory.create_early_singleton("car").unwrap();
        assert!(again.ptr_eq(&car_bean));
    }

    #[test]
    fn test_missing_required_dependency() {
        let mut factory = factory(vec![car()], PropertyResolver::new());
        let err = factory.create_early_singleton("car").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsatisfiedDependency);
        assert!(err.to_string().contains("'car'"));
    }

    #[test]
    fn test_missing_property() {
        let class = BeanType::builder::<Engine>()
            .component()
            .constructor(vec![Param::value::<u32>("engine.power")], |args| {
                Ok(Engine {
                    power: args.take(0)?,
                })
            })
            .build();
        let mut factory = factory(vec![class], PropertyResolver::new());
        let err = factory.create_early_singleton("engine").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingProperty);
    }

    struct Chicken;
    struct Egg;

    #[test]
    fn test_constructor_cycle_reports_path() {
        let chicken = BeanType::builder::<Chicken>()
            .component()
            .constructor(vec![Param::autowired::<Egg>()], |args| {
                let _egg: Arc<Egg> = args.take(0)?;
                Ok(Chicken)
            })
            .build();
        let egg = BeanType::builder::<Egg>()
            .component()
            .constructor(vec![Param::autowired::<Chicken>()], |args| {
                let _chicken: Arc<Chicken> = args.take(0)?;
                Ok(Egg)
            })
            .build();
        let mut factory = factory(vec![chicken, egg], PropertyResolver::new());
        let err = factory.create_early_singleton("chicken").unwrap_err();
        match err {
            DiError::CyclicConstruction { name, path } => {
                assert_eq!(name, "chicken");
                assert_eq!(path, vec!["chicken", "egg", "chicken"]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(factory.creating.is_empty());
    }

    #[test]
    fn test_parameter_binding_rules() {
        let unbound = BeanType::builder::<Wheel>()
            .component()
            .constructor(vec![Param::unbound()], |_| Ok(Wheel))
            .build();
        let mut f = factory(vec![unbound], PropertyResolver::new());
        assert_eq!(
            f.create_early_singleton("wheel").unwrap_err().kind(),
            ErrorKind::InvalidDefinition
        );

        let both = BeanType::builder::<Wheel>()
            .component()
            .constructor(
                vec![Param::value::<u32>("x").and(Binding::autowired::<Engine>())],
                |_| Ok(Wheel),
            )
            .build();
        let mut f = factory(vec![both, engine()], PropertyResolver::new());
        assert_eq!(
            f.create_early_singleton("wheel").unwrap_err().kind(),
            ErrorKind::InvalidDefinition
        );
    }

    #[derive(Default)]
    struct Settings;

    #[test]
    fn test_privileged_beans_reject_dependencies() {
        let config = BeanType::builder::<Settings>()
            .configuration()
            .constructor(vec![Param::autowired::<Engine>()], |_| Ok(Settings))
            .build();
        let mut f = factory(vec![config, engine()], PropertyResolver::new());
        let err = f.create_configurations().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDefinition);
    }

    #[test]
    fn test_constructor_failure_is_wrapped() {
        let class = BeanType::builder::<Wheel>()
            .component()
            .constructor(Vec::new(), |_| Err("flat tyre".into()))
            .build();
        let mut f = factory(vec![class], PropertyResolver::new());
        let err = f.create_early_singleton("wheel").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CreationFailure);
        assert!(err.to_string().contains("flat tyre"));
    }

    #[test]
    fn test_factory_method_uses_owner() {
        let config = BeanType::builder::<Settings>()
            .configuration()
            .default_constructor()
            .factory_method(FactoryMethod::new::<Settings, Engine, _>(
                "v8",
                BeanType::builder::<Engine>().build(),
                vec![Param::value::<u32>("power")],
                |_settings, args| {
                    Ok(Engine {
                        power: args.take(0)?,
                    })
                },
            ))
            .build();
        let mut f = factory(
            vec![config],
            PropertyResolver::from_pairs([("power", "400")]),
        );
        let engine = f.create_early_singleton("v8").unwrap();
        assert_eq!(engine.downcast::<Engine>().unwrap().power, 400);
        assert!(f.instance_of("settings").is_ok());
    }

    struct Recorder {
        seen: Mutex<Vec<String>>,
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl BeanPostProcessor for Recorder {
        fn post_process_before_initialization(
            &self,
            bean: Bean,
            bean_name: &str,
            _factory: &mut BeanFactory,
        ) -> Result<Bean> {
            self.seen.lock().unwrap().push(bean_name.to_string());
            self.log.lock().unwrap().push(self.tag.to_string());
            Ok(bean)
        }
    }

    fn recorder(name: &'static str, order: i32, log: Arc<Mutex<Vec<String>>>) -> ComponentClass {
        BeanType::builder::<Recorder>()
            .view::<dyn BeanPostProcessor>(|r| r as Arc<dyn BeanPostProcessor>)
            .component()
            .type_name(name)
            .named(name)
            .order(order)
            .constructor(Vec::new(), move |_| {
                Ok(Recorder {
                    seen: Mutex::new(Vec::new()),
                    tag: name,
                    log: Arc::clone(&log),
                })
            })
            .build()
    }

    #[test]
    fn test_post_processors_sorted_by_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut f = factory(
            vec![
                recorder("ten", 10, Arc::clone(&log)),
                recorder("minusFive", -5, Arc::clone(&log)),
                recorder("zero", 0, Arc::clone(&log)),
                engine(),
            ],
            PropertyResolver::new(),
        );
        assert_eq!(f.create_configurations().unwrap(), 0);
        assert_eq!(f.create_post_processors().unwrap(), 3);
        assert_eq!(
            f.post_processor_names().collect::<Vec<_>>(),
            vec!["minusFive", "zero", "ten"]
        );
        assert!(log.lock().unwrap().is_empty());

        assert_eq!(f.create_remaining().unwrap(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["minusFive", "zero", "ten"]);
        assert_eq!(f.registry().lookup_by_type(&TypeKey::of::<Engine>()).len(), 1);
    }

    #[test]
    fn test_late_value_binding_on_member() {
        struct Gauge {
            max: InjectCell<u32>,
        }
        let class = BeanType::builder::<Gauge>()
            .field("max", Param::value::<u32>("max"), |g: &Gauge, v: u32| Ok(g.max.set(v)?))
            .component()
            .constructor(Vec::new(), |_| {
                Ok(Gauge {
                    max: InjectCell::new(),
                })
            })
            .build();
        let mut f = factory(vec![class], PropertyResolver::from_pairs([("max", "12")]));
        f.create_remaining().unwrap();
        f.inject_all().unwrap();
        let gauge = f.instance_of("gauge").unwrap().downcast::<Gauge>().unwrap();
        assert_eq!(gauge.max.get(), Some(&12));
    }
}
