//! Component type registration.
//!
//! Every component type must be registered in a [`ComponentRegistry`] under a
//! unique name together with a factory. Registration assigns a
//! [`ComponentTypeId`] that is recorded in each constructed
//! [`ComponentCell`](crate::component::ComponentCell).

use std::collections::HashMap;
use std::rc::Rc;

use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityId;
use crate::{ComponentError, EcsError};

/// Constructor for one component type: `(entity, init data) -> component`.
pub type ComponentFactory =
    Rc<dyn Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError>>;

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// Registered name (the key used by `add_component`).
    pub name: String,
    factory: ComponentFactory,
}

impl std::fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping component type names to factories.
///
/// Names are unique. [`register`](Self::register) rejects a second
/// registration under the same name; [`register_or_replace`](Self::register_or_replace)
/// is the explicit last-write-wins override and keeps the original id.
#[derive(Default)]
pub struct ComponentRegistry {
    by_name: HashMap<String, ComponentTypeId>,
    /// Indexed by ComponentTypeId.0.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateType`] if `name` is already registered.
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<ComponentTypeId, EcsError>
    where
        F: Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError>
            + 'static,
    {
        if self.by_name.contains_key(name) {
            return Err(EcsError::DuplicateType {
                name: name.to_owned(),
            });
        }
        Ok(self.insert(name, Rc::new(factory)))
    }

    /// Register a factory under `name`, replacing any existing factory.
    ///
    /// Components constructed before the replacement are left untouched; only
    /// later `create` calls use the new factory.
    pub fn register_or_replace<F>(&mut self, name: &str, factory: F) -> ComponentTypeId
    where
        F: Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError>
            + 'static,
    {
        if let Some(&existing) = self.by_name.get(name) {
            tracing::debug!(type_name = name, "replacing component factory");
            self.infos[existing.0 as usize].factory = Rc::new(factory);
            return existing;
        }
        self.insert(name, Rc::new(factory))
    }

    fn insert(&mut self, name: &str, factory: ComponentFactory) -> ComponentTypeId {
        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            factory,
        });
        self.by_name.insert(name.to_owned(), id);
        tracing::debug!(type_name = name, ?id, "component type registered");
        id
    }

    /// Look up the factory for `name`, without invoking it.
    ///
    /// The store calls the returned factory after releasing its borrow of the
    /// registry, so factories may re-enter the store.
    pub fn factory(&self, name: &str) -> Result<(ComponentTypeId, ComponentFactory), EcsError> {
        let id = self
            .lookup_by_name(name)
            .ok_or_else(|| EcsError::UnknownComponentType {
                name: name.to_owned(),
                registered: self.registered_names().join(", "),
            })?;
        Ok((id, Rc::clone(&self.infos[id.0 as usize].factory)))
    }

    /// Instantiate a component of type `name` bound to `entity`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownComponentType`] if `name` is not registered.
    /// - [`EcsError::ComponentInit`] if the factory rejects `data`.
    pub fn create(
        &self,
        name: &str,
        entity: EntityId,
        data: &serde_json::Value,
    ) -> Result<(ComponentTypeId, Box<dyn Component>), EcsError> {
        let (id, factory) = self.factory(name)?;
        let component = factory(entity, data).map_err(|source| EcsError::ComponentInit {
            type_name: name.to_owned(),
            entity,
            source,
        })?;
        Ok((id, component))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.0 as usize)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Returns the names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.registered_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    struct Tagged(&'static str);

    impl Component for Tagged {
        fn serialize(&self) -> Option<serde_json::Value> {
            Some(serde_json::json!({ "tag": self.0 }))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn tagged(
        tag: &'static str,
    ) -> impl Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError> {
        move |_, _| Ok(Box::new(Tagged(tag)) as Box<dyn Component>)
    }

    #[test]
    fn register_and_create() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register("Tagged", tagged("a")).unwrap();
        let (created_id, component) = reg
            .create("Tagged", EntityId::from_raw(1), &serde_json::Value::Null)
            .unwrap();
        assert_eq!(id, created_id);
        assert_eq!(component.serialize(), Some(serde_json::json!({ "tag": "a" })));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = ComponentRegistry::new();
        reg.register("Tagged", tagged("a")).unwrap();
        let err = reg.register("Tagged", tagged("b")).unwrap_err();
        assert!(matches!(err, EcsError::DuplicateType { ref name } if name == "Tagged"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn register_or_replace_is_last_write_wins() {
        let mut reg = ComponentRegistry::new();
        let first = reg.register("Tagged", tagged("old")).unwrap();
        let second = reg.register_or_replace("Tagged", tagged("new"));
        assert_eq!(first, second, "replacement keeps the type id");
        assert_eq!(reg.len(), 1);

        let (_, component) = reg
            .create("Tagged", EntityId::from_raw(1), &serde_json::Value::Null)
            .unwrap();
        assert_eq!(component.serialize(), Some(serde_json::json!({ "tag": "new" })));
    }

    #[test]
    fn unknown_type_lists_registered_names() {
        let mut reg = ComponentRegistry::new();
        reg.register("Light", tagged("l")).unwrap();
        reg.register("Collider", tagged("c")).unwrap();
        let err = reg
            .create("Rigidbody", EntityId::from_raw(1), &serde_json::Value::Null)
            .err()
            .unwrap();
        match err {
            EcsError::UnknownComponentType { name, registered } => {
                assert_eq!(name, "Rigidbody");
                assert_eq!(registered, "Collider, Light");
            }
            other => panic!("expected UnknownComponentType, got {other:?}"),
        }
    }

    #[test]
    fn factory_errors_surface_as_component_init() {
        let mut reg = ComponentRegistry::new();
        reg.register("Broken", |_, _| {
            Err(ComponentError::InvalidData("missing shape".to_owned()))
        })
        .unwrap();
        let err = reg
            .create("Broken", EntityId::from_raw(4), &serde_json::Value::Null)
            .err()
            .unwrap();
        assert!(matches!(err, EcsError::ComponentInit { ref type_name, .. } if type_name == "Broken"));
    }
}
