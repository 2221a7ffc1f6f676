//! Vesper ECS -- entity-component store, component registry and event bus.
//!
//! Components are stateful modules attached to scene entities by type name.
//! The [`ComponentStore`](store::ComponentStore) owns every component; it
//! constructs them through the [`ComponentRegistry`](registry::ComponentRegistry)
//! and announces every attach/detach on the shared
//! [`EventBus`](bus::EventBus). Entity ids are minted by the scene layer
//! (see [`SceneHost`](scene::SceneHost)) and never invented here.
//!
//! Everything in this crate is single-threaded: shared state lives in
//! `Rc<RefCell<..>>` and all operations take `&self` so hooks may re-enter the
//! store while a tick is running.
//!
//! # Quick Start
//!
//! ```
//! use std::any::Any;
//! use vesper_ecs::prelude::*;
//!
//! struct Health(u32);
//!
//! impl Component for Health {
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//! }
//!
//! let store = ComponentStore::new(EventBus::new());
//! store
//!     .register("Health", |_, _| Ok(Box::new(Health(100)) as Box<dyn Component>))
//!     .unwrap();
//!
//! let entity = EntityId::from_raw(1);
//! store.add_component(entity, "Health", &serde_json::Value::Null).unwrap();
//! assert!(store.has_component(entity, "Health"));
//! ```

#![deny(unsafe_code)]

pub mod bus;
pub mod component;
pub mod entity;
pub mod registry;
pub mod scene;
pub mod store;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by registry and store operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// A component type was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponentType { name: String, registered: String },

    /// A second registration was attempted under an existing type name.
    #[error("component type '{name}' is already registered")]
    DuplicateType { name: String },

    /// The factory rejected the init data.
    #[error("failed to construct component '{type_name}' for entity {entity}: {source}")]
    ComponentInit {
        type_name: String,
        entity: entity::EntityId,
        #[source]
        source: ComponentError,
    },
}

/// Errors raised by component hooks and factories.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// Init data could not be interpreted.
    #[error("invalid component data: {0}")]
    InvalidData(String),

    /// A lifecycle hook failed.
    #[error("{hook} failed: {message}")]
    Hook { hook: String, message: String },

    /// The scene collaborator refused an operation.
    #[error("scene error: {0}")]
    Scene(String),
}

impl From<serde_json::Error> for ComponentError {
    fn from(e: serde_json::Error) -> Self {
        ComponentError::InvalidData(e.to_string())
    }
}

impl From<scene::SceneError> for ComponentError {
    fn from(e: scene::SceneError) -> Self {
        ComponentError::Scene(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::bus::{Event, EventBus, SubscriptionId};
    pub use crate::component::{
        Component, ComponentCell, ComponentHandle, ComponentTypeId, FrameContext, PlaybackMode,
        ScriptBehaviour,
    };
    pub use crate::entity::EntityId;
    pub use crate::registry::{ComponentFactory, ComponentRegistry};
    pub use crate::scene::{SceneError, SceneHost, SceneObject, Transform};
    pub use crate::store::{ComponentStore, SavedComponent};
    pub use crate::{ComponentError, EcsError};
}
