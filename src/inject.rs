//! Injection engine
//!
//! Runs after every definition has an early singleton. Members are always
//! wired on the real object, never on a proxy standing in for it, so the
//! proxy's forwarded calls observe the injected state.

use crate::bean::Bean;
use crate::binding::{InjectionPoint, MemberKind};
use crate::factory::BeanFactory;
use crate::{DiError, Result};

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

impl BeanFactory {
    /// Object that injection and lifecycle hooks should operate on: the
    /// exposed instance passed back through every processor in reverse order.
    pub fn unproxied(&self, name: &str, exposed: Bean) -> Bean {
        self.post_processors
            .iter()
            .rev()
            .fold(exposed, |bean, (_, processor)| {
                processor.post_process_on_set_property(bean, name)
            })
    }

    /// Wire the members of every bean, in `(order, name)` order
    pub fn inject_all(&mut self) -> Result<()> {
        let names = self.registry().names_where(|_| true);
        for name in &names {
            self.inject(name)?;
        }

        #[cfg(feature = "logging")]
        debug!(target: "bean_context", count = names.len(), "Beans injected");

        Ok(())
    }

    /// Wire the members of one bean. Own members come first, then inherited
    /// ones, nearest ancestor first.
    pub fn inject(&mut self, name: &str) -> Result<()> {
        let exposed = self.instance_of(name)?;
        let real = self.unproxied(name, exposed);

        let mut members: Vec<InjectionPoint> = real.bean_type().members().to_vec();
        members.sort_by_key(InjectionPoint::depth);

        for member in &members {
            self.inject_member(name, &real, member)?;
        }
        Ok(())
    }

    fn inject_member(&mut self, bean: &str, real: &Bean, member: &InjectionPoint) -> Result<()> {
        let modifiers = member.modifiers();
        if modifiers.is_static {
            return Err(DiError::invalid(
                bean,
                format!("cannot inject static member '{}'", member.name()),
            ));
        }
        if modifiers.is_final {
            match member.kind() {
                MemberKind::Field => {
                    return Err(DiError::invalid(
                        bean,
                        format!("cannot inject final field '{}'", member.name()),
                    ));
                }
                MemberKind::Setter => {
                    #[cfg(feature = "logging")]
                    warn!(
                        target: "bean_context",
                        bean = bean,
                        member = member.name(),
                        "Injecting through a final setter"
                    );
                }
            }
        }

        let binding = member.param().binding().map_err(|reason| {
            DiError::invalid(bean, format!("member '{}' {reason}", member.name()))
        })?;

        #[cfg(feature = "logging")]
        trace!(
            target: "bean_context",
            bean = bean,
            member = member.name(),
            declared_in = member.declared_in(),
            source = %binding,
            "Injecting member"
        );

        let value = self.resolve_binding(bean, binding, false)?;
        member
            .assign(real.as_any(), value)
            .map_err(|source| DiError::creation_failed(bean, source))
    }

    /// Run init hooks and the `after initialization` pipeline for every bean
    pub fn initialize_all(&mut self) -> Result<()> {
        let names = self.registry().names_where(|_| true);
        for name in &names {
            self.initialize(name)?;
        }

        #[cfg(feature = "logging")]
        debug!(target: "bean_context", count = names.len(), "Beans initialized");

        Ok(())
    }

    /// Init hook on the real object, then after-initialization hooks on the
    /// exposed one
    pub fn initialize(&mut self, name: &str) -> Result<()> {
        let exposed = self.instance_of(name)?;
        let hook = self
            .registry()
            .lookup_by_name(name)
            .and_then(|def| def.init_hook().cloned());
        if let Some(hook) = hook {
            let real = self.unproxied(name, exposed.clone());

            #[cfg(feature = "logging")]
            trace!(target: "bean_context", bean = name, hook = hook.name(), "Calling init hook");

            hook.invoke(name, &real)?;
        }
        self.apply_after_initialization(name, exposed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ComponentDefinition;
    use crate::registry::DefinitionRegistry;
    use crate::{
        BeanType, Binding, ComponentClass, ErrorKind, InjectCell, InjectionPoint, MemberKind,
        Modifiers, Param, PropertyResolver,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn factory(classes: Vec<ComponentClass>, props: PropertyResolver) -> BeanFactory {
        let mut registry = DefinitionRegistry::new();
        for class in &classes {
            for def in ComponentDefinition::definitions_for(class).unwrap() {
                registry.register(def).unwrap();
            }
        }
        let mut factory = BeanFactory::new(registry, Arc::new(props));
        factory.create_configurations().unwrap();
        factory.create_post_processors().unwrap();
        factory.create_remaining().unwrap();
        factory
    }

    #[derive(Default)]
    struct Base {
        label: InjectCell<String>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[derive(Default)]
    struct Derived {
        base: Base,
        count: InjectCell<u32>,
    }

    fn base_type() -> Arc<BeanType> {
        BeanType::builder::<Base>()
            .field("label", Param::value::<String>("label"), |b: &Base, v: String| {
                b.order.lock().unwrap().push("label");
                Ok(b.label.set(v)?)
            })
            .build()
    }

    #[test]
    fn test_members_walk_from_most_derived() {
        let class = BeanType::builder::<Derived>()
            .extends::<Base>(&base_type(), |d| &d.base)
            .setter("count", Param::value::<u32>("count"), |d: &Derived, v: u32| {
                d.base.order.lock().unwrap().push("count");
                Ok(d.count.set(v)?)
            })
            .component()
            .default_constructor()
            .build();
        let mut f = factory(
            vec![class],
            PropertyResolver::from_pairs([("label", "x"), ("count", "3")]),
        );
        f.inject_all().unwrap();

        let derived = f.instance_of("derived").unwrap().downcast::<Derived>().unwrap();
        assert_eq!(derived.count.get(), Some(&3));
        assert_eq!(derived.base.label.get().map(String::as_str), Some("x"));
        assert_eq!(*derived.base.order.lock().unwrap(), vec!["count", "label"]);
    }

    struct Left {
        right: InjectCell<Arc<Right>>,
    }

    struct Right {
        left: InjectCell<Arc<Left>>,
    }

    #[test]
    fn test_setter_cycle_resolves() {
        let left = BeanType::builder::<Left>()
            .setter("right", Binding::autowired::<Right>(), |l: &Left, r: Arc<Right>| {
                Ok(l.right.set(r)?)
            })
            .component()
            .constructor(Vec::new(), |_| Ok(Left { right: InjectCell::new() }))
            .build();
        let right = BeanType::builder::<Right>()
            .setter("left", Binding::autowired::<Left>(), |r: &Right, l: Arc<Left>| {
                Ok(r.left.set(l)?)
            })
            .component()
            .constructor(Vec::new(), |_| Ok(Right { left: InjectCell::new() }))
            .build();
        let mut f = factory(vec![left, right], PropertyResolver::new());
        f.inject_all().unwrap();

        let l = f.instance_of("left").unwrap().downcast::<Left>().unwrap();
        let back = l.right.get().unwrap().left.get().unwrap();
        assert!(Arc::ptr_eq(back, &l));
    }

    struct Holder {
        value: InjectCell<Option<Arc<String>>>,
    }

    fn holder(point: InjectionPoint) -> ComponentClass {
        BeanType::builder::<Holder>()
            .member(point)
            .component()
            .constructor(Vec::new(), |_| Ok(Holder { value: InjectCell::new() }))
            .build()
    }

    fn holder_point(param: Param) -> InjectionPoint {
        InjectionPoint::new::<Holder, Option<Arc<String>>, _>(
            "value",
            MemberKind::Field,
            param,
            |h: &Holder, v: Option<Arc<String>>| Ok(h.value.set(v)?),
        )
    }

    #[test]
    fn test_optional_member_assigns_none() {
        let mut f = factory(
            vec![holder(holder_point(Param::optional::<String>()))],
            PropertyResolver::new(),
        );
        f.inject_all().unwrap();
        let h = f.instance_of("holder").unwrap().downcast::<Holder>().unwrap();
        assert_eq!(h.value.get(), Some(&None));
    }

    #[test]
    fn test_member_rules() {
        let cases = [
            (
                holder_point(Param::optional::<String>()).with_modifiers(Modifiers::NONE.with_static()),
                ErrorKind::InvalidDefinition,
            ),
            (
                holder_point(Param::optional::<String>()).with_modifiers(Modifiers::NONE.with_final()),
                ErrorKind::InvalidDefinition,
            ),
            (holder_point(Param::unbound()), ErrorKind::InvalidDefinition),
            (
                holder_point(Param::value::<String>("v").and(Binding::optional::<String>())),
                ErrorKind::InvalidDefinition,
            ),
            (holder_point(Param::autowired::<String>()), ErrorKind::UnsatisfiedDependency),
            (holder_point(Param::value::<u32>("n")), ErrorKind::CreationFailure),
        ];
        for (point, expected) in cases {
            let mut f = factory(
                vec![holder(point)],
                PropertyResolver::from_pairs([("n", "1")]),
            );
            assert_eq!(f.inject_all().unwrap_err().kind(), expected);
        }
    }

    #[test]
    fn test_final_setter_is_allowed() {
        let point = InjectionPoint::new::<Holder, Option<Arc<String>>, _>(
            "set_value",
            MemberKind::Setter,
            Param::optional::<String>(),
            |h: &Holder, v: Option<Arc<String>>| Ok(h.value.set(v)?),
        )
        .with_modifiers(Modifiers::NONE.with_final());
        let mut f = factory(vec![holder(point)], PropertyResolver::new());
        f.inject_all().unwrap();
    }

    #[derive(Default)]
    struct Service {
        ready: AtomicBool,
    }

    #[test]
    fn test_initialize_runs_init_hook() {
        let class = BeanType::builder::<Service>()
            .method("start", |s: &Service| {
                s.ready.store(true, Ordering::SeqCst);
                Ok(())
            })
            .component()
            .default_constructor()
            .post_construct("start")
            .build();
        let mut f = factory(vec![class], PropertyResolver::new());
        f.inject_all().unwrap();
        f.initialize_all().unwrap();
        let service = f.instance_of("service").unwrap().downcast::<Service>().unwrap();
        assert!(service.ready.load(Ordering::SeqCst));
    }

    #[test]
    fn test_init_failure_is_wrapped() {
        let class = BeanType::builder::<Service>()
            .method("start", |_s: &Service| Err("not today".into()))
            .component()
            .default_constructor()
            .post_construct("start")
            .build();
        let mut f = factory(vec![class], PropertyResolver::new());
        let err = f.initialize_all().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CreationFailure);
    }
}
