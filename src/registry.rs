//! Definition registry used during bootstrap
//!
//! Bootstrap is single-threaded and mutates definitions through `&mut`, so a
//! plain `HashMap` with `ahash` is enough here. The running context moves the
//! finished definitions into a `DashMap` (see [`crate::ApplicationContext`]).

use crate::bean::TypeKey;
use crate::definition::ComponentDefinition;
use crate::{DiError, Result};
use ahash::RandomState;
use std::borrow::Borrow;
use std::collections::HashMap;

#[cfg(feature = "logging")]
use tracing::trace;

/// Name-keyed set of definitions
#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: HashMap<String, ComponentDefinition, RandomState>,
}

impl DefinitionRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            definitions: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    /// Add a definition. Names must be unique.
    pub fn register(&mut self, definition: ComponentDefinition) -> Result<()> {
        if self.definitions.contains_key(definition.name()) {
            return Err(DiError::DuplicateDefinition {
                name: definition.name().to_string(),
            });
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "bean_context",
            bean = definition.name(),
            bean_type = definition.bean_type().name(),
            order = definition.order(),
            "Registered bean definition"
        );

        self.definitions
            .insert(definition.name().to_string(), definition);
        Ok(())
    }

    #[inline]
    pub fn lookup_by_name(&self, name: &str) -> Option<&ComponentDefinition> {
        self.definitions.get(name)
    }

    /// Named definition, which must be assignable to `ty`
    pub fn lookup_by_name_and_type(
        &self,
        name: &str,
        ty: &TypeKey,
    ) -> Result<Option<&ComponentDefinition>> {
        match self.definitions.get(name) {
            Some(def) => check_assignable(def, ty).map(|()| Some(def)),
            None => Ok(None),
        }
    }

    /// Every definition assignable to `ty`, sorted by `(order, name)`
    pub fn lookup_by_type(&self, ty: &TypeKey) -> Vec<&ComponentDefinition> {
        let mut found: Vec<&ComponentDefinition> = self
            .definitions
            .values()
            .filter(|def| def.is_assignable_to(ty.id()))
            .collect();
        found.sort_by(|a, b| ComponentDefinition::ordering(a, b));
        found
    }

    /// The single definition assignable to `ty`, arbitrating by primary flag
    pub fn lookup_unique_by_type(&self, ty: &TypeKey) -> Result<Option<&ComponentDefinition>> {
        choose_unique(ty, self.lookup_by_type(ty))
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut ComponentDefinition> {
        self.definitions.get_mut(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Names of the definitions matching `filter`, in `(order, name)` order
    pub fn names_where(&self, filter: impl Fn(&ComponentDefinition) -> bool) -> Vec<String> {
        let mut selected: Vec<&ComponentDefinition> =
            self.definitions.values().filter(|def| filter(def)).collect();
        selected.sort_by(|a, b| ComponentDefinition::ordering(a, b));
        selected.into_iter().map(|def| def.name().to_string()).collect()
    }

    pub(crate) fn into_definitions(self) -> impl Iterator<Item = ComponentDefinition> {
        self.definitions.into_values()
    }
}

pub(crate) fn check_assignable(def: &ComponentDefinition, ty: &TypeKey) -> Result<()> {
    if def.is_assignable_to(ty.id()) {
        Ok(())
    } else {
        Err(DiError::TypeMismatch {
            name: def.name().to_string(),
            required: ty.name(),
            actual: def.bean_type().name(),
        })
    }
}

/// Primary policy over candidates already sorted by `(order, name)`
pub(crate) fn choose_unique<D: Borrow<ComponentDefinition>>(
    ty: &TypeKey,
    mut candidates: Vec<D>,
) -> Result<Option<D>> {
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        total => {
            let primaries: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, d)| Borrow::<ComponentDefinition>::borrow(*d).is_primary())
                .map(|(i, _)| i)
                .collect();
            match primaries.as_slice() {
                [only] => Ok(Some(candidates.swap_remove(*only))),
                [] => Err(DiError::AmbiguousDefinition {
                    type_name: ty.name(),
                    reason: format!("{total} candidates but none is marked primary"),
                }),
                many => Err(DiError::AmbiguousDefinition {
                    type_name: ty.name(),
                    reason: format!("{} candidates are marked primary", many.len()),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BeanType, ErrorKind};
    use std::sync::Arc;

    trait Codec: Send + Sync {}

    #[derive(Default)]
    struct Json;
    impl Codec for Json {}

    #[derive(Default)]
    struct Yaml;
    impl Codec for Yaml {}

    fn json(name: &str, order: i32, primary: bool) -> ComponentDefinition {
        let mut class = BeanType::builder::<Json>()
            .view::<dyn Codec>(|c| c as Arc<dyn Codec>)
            .component()
            .named(name)
            .order(order)
            .default_constructor();
        if primary {
            class = class.primary();
        }
        ComponentDefinition::from_class(&class.build()).unwrap()
    }

    fn yaml(primary: bool) -> ComponentDefinition {
        let mut class = BeanType::builder::<Yaml>()
            .view::<dyn Codec>(|c| c as Arc<dyn Codec>)
            .component()
            .default_constructor();
        if primary {
            class = class.primary();
        }
        ComponentDefinition::from_class(&class.build()).unwrap()
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = DefinitionRegistry::new();
        registry.register(json("json", 0, false)).unwrap();
        let err = registry.register(json("json", 1, false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateDefinition);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_by_type_sorted() {
        let mut registry = DefinitionRegistry::with_capacity(4);
        registry.register(json("b", 5, false)).unwrap();
        registry.register(json("a", 5, false)).unwrap();
        registry.register(json("c", -1, false)).unwrap();
        registry.register(yaml(false)).unwrap();

        let codecs: Vec<&str> = registry
            .lookup_by_type(&TypeKey::of::<dyn Codec>())
            .into_iter()
            .map(ComponentDefinition::name)
            .collect();
        assert_eq!(codecs, vec!["c", "a", "b", "yaml"]);

        assert_eq!(registry.lookup_by_type(&TypeKey::of::<Yaml>()).len(), 1);
        assert!(registry.lookup_by_type(&TypeKey::of::<String>()).is_empty());
    }

    #[test]
    fn test_lookup_by_name_and_type() {
        let mut registry = DefinitionRegistry::new();
        registry.register(yaml(false)).unwrap();

        let key = TypeKey::of::<dyn Codec>();
        assert!(registry.lookup_by_name_and_type("yaml", &key).unwrap().is_some());
        assert!(registry.lookup_by_name_and_type("none", &key).unwrap().is_none());

        let err = registry
            .lookup_by_name_and_type("yaml", &TypeKey::of::<Json>())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_unique_by_type_primary_policy() {
        let key = TypeKey::of::<dyn Codec>();

        let mut single = DefinitionRegistry::new();
        single.register(yaml(false)).unwrap();
        assert_eq!(single.lookup_unique_by_type(&key).unwrap().unwrap().name(), "yaml");

        let mut one_primary = DefinitionRegistry::new();
        one_primary.register(json("json", 0, false)).unwrap();
        one_primary.register(yaml(true)).unwrap();
        assert_eq!(
            one_primary.lookup_unique_by_type(&key).unwrap().unwrap().name(),
            "yaml"
        );

        let mut none_primary = DefinitionRegistry::new();
        none_primary.register(json("json", 0, false)).unwrap();
        none_primary.register(yaml(false)).unwrap();
        let err = none_primary.lookup_unique_by_type(&key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousDefinition);

        let mut two_primary = DefinitionRegistry::new();
        two_primary.register(json("json", 0, true)).unwrap();
        two_primary.register(yaml(true)).unwrap();
        let err = two_primary.lookup_unique_by_type(&key).unwrap_err();
        assert!(err.to_string().contains("2 candidates are marked primary"));

        let empty = DefinitionRegistry::new();
        assert!(empty.lookup_unique_by_type(&key).unwrap().is_none());
    }

    #[test]
    fn test_names_where() {
        let mut registry = DefinitionRegistry::new();
        registry.register(json("z", 0, false)).unwrap();
        registry.register(yaml(true)).unwrap();
        assert_eq!(registry.names_where(|_| true), vec!["z", "yaml"]);
        assert_eq!(registry.names_where(|d| d.is_primary()), vec!["yaml"]);
    }
}
