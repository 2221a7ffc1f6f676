//! The entity-component store.
//!
//! [`ComponentStore`] is the single owner of every component. Each entity has
//! at most one component per type name; components of an entity keep their
//! insertion order, and entities iterate in id order.
//!
//! All operations take `&self`. No internal borrow is held while a factory,
//! a `destroy` hook or a bus listener runs, so any of them may call back into
//! the store.
//!
//! A component whose own hook is executing cannot be destroyed in place. Its
//! removal still takes effect immediately (it disappears from every lookup),
//! but `destroy` is deferred until [`ComponentStore::flush_deferred`], which
//! the scheduler calls at the end of every tick.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::bus::{Event, EventBus};
use crate::component::{Component, ComponentCell, ComponentHandle, ComponentTypeId};
use crate::entity::EntityId;
use crate::registry::ComponentRegistry;
use crate::{ComponentError, EcsError};

// ---------------------------------------------------------------------------
// SavedComponent
// ---------------------------------------------------------------------------

/// One saved component: the registered type name plus its serialized fields.
///
/// Restoring is `add_component(entity, type_name, data)` per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedComponent {
    #[serde(rename = "type")]
    pub type_name: String,
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

pub struct ComponentStore {
    registry: RefCell<ComponentRegistry>,
    entities: RefCell<BTreeMap<EntityId, Vec<ComponentHandle>>>,
    deferred: RefCell<Vec<ComponentHandle>>,
    bus: EventBus,
}

impl ComponentStore {
    pub fn new(bus: EventBus) -> Self {
        Self::with_registry(bus, ComponentRegistry::new())
    }

    pub fn with_registry(bus: EventBus, registry: ComponentRegistry) -> Self {
        Self {
            registry: RefCell::new(registry),
            entities: RefCell::new(BTreeMap::new()),
            deferred: RefCell::new(Vec::new()),
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // -- registry pass-throughs ---------------------------------------------

    /// Register a component type. See [`ComponentRegistry::register`].
    pub fn register<F>(&self, name: &str, factory: F) -> Result<ComponentTypeId, EcsError>
    where
        F: Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError>
            + 'static,
    {
        self.registry.borrow_mut().register(name, factory)
    }

    /// Register or replace a component type. See
    /// [`ComponentRegistry::register_or_replace`].
    pub fn register_or_replace<F>(&self, name: &str, factory: F) -> ComponentTypeId
    where
        F: Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError>
            + 'static,
    {
        self.registry.borrow_mut().register_or_replace(name, factory)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.borrow().contains(name)
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.registry
            .borrow()
            .registered_names()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    // -- mutation ------------------------------------------------------------

    /// Construct a component of `type_name` and attach it to `entity`.
    ///
    /// If the entity already has a component of that type, the existing
    /// component is returned untouched and `data` is ignored.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownComponentType`] if `type_name` is not registered.
    /// - [`EcsError::ComponentInit`] if the factory rejects `data`.
    pub fn add_component(
        &self,
        entity: EntityId,
        type_name: &str,
        data: &serde_json::Value,
    ) -> Result<ComponentHandle, EcsError> {
        if let Some(existing) = self.get_component(entity, type_name) {
            tracing::warn!(%entity, type_name, "component already present; keeping existing");
            return Ok(existing);
        }

        let (type_id, factory) = self.registry.borrow().factory(type_name)?;
        let component = factory(entity, data).map_err(|source| EcsError::ComponentInit {
            type_name: type_name.to_owned(),
            entity,
            source,
        })?;

        // The factory may have re-entered the store and attached the same type.
        if let Some(existing) = self.get_component(entity, type_name) {
            tracing::warn!(%entity, type_name, "component attached during construction; discarding duplicate");
            let mut discarded = component;
            discarded.destroy();
            return Ok(existing);
        }

        let handle: ComponentHandle =
            Rc::new(ComponentCell::new(entity, type_id, type_name, component));
        self.entities
            .borrow_mut()
            .entry(entity)
            .or_default()
            .push(Rc::clone(&handle));

        tracing::debug!(%entity, type_name, "component added");
        self.bus.emit(&Event::ComponentAdded {
            entity,
            type_name: type_name.to_owned(),
            component: Rc::clone(&handle),
        });
        Ok(handle)
    }

    /// Detach and destroy the `type_name` component of `entity`.
    ///
    /// Returns `false` when there was nothing to remove.
    pub fn remove_component(&self, entity: EntityId, type_name: &str) -> bool {
        let removed = {
            let mut entities = self.entities.borrow_mut();
            let Some(components) = entities.get_mut(&entity) else {
                tracing::debug!(%entity, type_name, "remove_component: entity has no components");
                return false;
            };
            let Some(index) = components.iter().position(|c| c.type_name() == type_name) else {
                tracing::debug!(%entity, type_name, "remove_component: component not present");
                return false;
            };
            let handle = components.remove(index);
            if components.is_empty() {
                entities.remove(&entity);
            }
            handle
        };

        self.destroy_or_defer(&removed);
        tracing::debug!(%entity, type_name, "component removed");
        self.bus.emit(&Event::ComponentRemoved {
            entity,
            type_name: type_name.to_owned(),
            component: removed,
        });
        true
    }

    /// Remove every component of `entity`. Returns how many were removed.
    pub fn remove_all_components(&self, entity: EntityId) -> usize {
        let type_names: Vec<String> = self
            .get_components(entity)
            .iter()
            .map(|c| c.type_name().to_owned())
            .collect();
        type_names
            .iter()
            .filter(|t| self.remove_component(entity, t))
            .count()
    }

    fn destroy_or_defer(&self, handle: &ComponentHandle) {
        let destroyed = match handle.try_borrow_mut() {
            Some(mut component) => {
                component.destroy();
                true
            }
            None => false,
        };
        if !destroyed {
            tracing::debug!(
                entity = %handle.entity(),
                type_name = handle.type_name(),
                "component busy; deferring destroy"
            );
            self.deferred.borrow_mut().push(Rc::clone(handle));
        }
    }

    /// Run `destroy` for removals that happened while the component was busy.
    ///
    /// Components still busy stay queued. Returns the number destroyed.
    pub fn flush_deferred(&self) -> usize {
        let pending = std::mem::take(&mut *self.deferred.borrow_mut());
        let mut destroyed = 0;
        let mut still_busy = Vec::new();
        for handle in pending {
            let done = match handle.try_borrow_mut() {
                Some(mut component) => {
                    component.destroy();
                    true
                }
                None => false,
            };
            if done {
                destroyed += 1;
            } else {
                still_busy.push(handle);
            }
        }
        self.deferred.borrow_mut().extend(still_busy);
        destroyed
    }

    pub fn pending_destroy_count(&self) -> usize {
        self.deferred.borrow().len()
    }

    // -- queries -------------------------------------------------------------

    pub fn get_component(&self, entity: EntityId, type_name: &str) -> Option<ComponentHandle> {
        self.entities
            .borrow()
            .get(&entity)?
            .iter()
            .find(|c| c.type_name() == type_name)
            .cloned()
    }

    /// All components of `entity` in insertion order. Empty for unknown
    /// entities.
    pub fn get_components(&self, entity: EntityId) -> Vec<ComponentHandle> {
        self.entities
            .borrow()
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_component(&self, entity: EntityId, type_name: &str) -> bool {
        self.get_component(entity, type_name).is_some()
    }

    /// Entities that currently hold at least one component.
    pub fn entities(&self) -> Vec<EntityId> {
        self.entities.borrow().keys().copied().collect()
    }

    /// Every stored component, in entity order then insertion order.
    ///
    /// The returned handles are detached from the store's internal borrow, so
    /// callers may mutate the store while iterating them.
    pub fn snapshot(&self) -> Vec<ComponentHandle> {
        self.entities
            .borrow()
            .values()
            .flat_map(|components| components.iter().cloned())
            .collect()
    }

    pub fn component_count(&self) -> usize {
        self.entities.borrow().values().map(Vec::len).sum()
    }

    // -- save / restore ------------------------------------------------------

    /// Serialize the components of `entity` that support saving.
    pub fn serialize_entity(&self, entity: EntityId) -> Vec<SavedComponent> {
        self.get_components(entity)
            .iter()
            .filter_map(|handle| {
                let Some(component) = handle.try_borrow() else {
                    tracing::warn!(%entity, type_name = handle.type_name(), "component busy; not serialized");
                    return None;
                };
                let data = component.serialize()?;
                Some(SavedComponent {
                    type_name: handle.type_name().to_owned(),
                    data,
                })
            })
            .collect()
    }

    /// Re-create saved components on `entity`.
    ///
    /// Stops at the first record that fails; components restored before it
    /// stay attached.
    pub fn restore_entity(
        &self,
        entity: EntityId,
        saved: &[SavedComponent],
    ) -> Result<Vec<ComponentHandle>, EcsError> {
        saved
            .iter()
            .map(|record| self.add_component(entity, &record.type_name, &record.data))
            .collect()
    }
}

impl std::fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("entities", &self.entities.borrow().len())
            .field("components", &self.component_count())
            .field("deferred", &self.deferred.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
