//! Built-in descriptor components.
//!
//! Both mirror a helper object in the scene through a [`HelperObject`]: the
//! helper is named after its owner, follows the owner's transform, and is
//! destroyed at most once.

pub mod collider;
pub mod light;

pub use collider::{collider_factory, Collider, ColliderData, ColliderShape};
pub use light::{light_factory, Light, LightData, LightType};

use std::rc::Rc;

use vesper_ecs::entity::EntityId;
use vesper_ecs::scene::{SceneHost, Transform};
use vesper_ecs::ComponentError;

/// Registered type name of the collider component.
pub const COLLIDER_COMPONENT: &str = "Collider";

/// Registered type name of the light component.
pub const LIGHT_COMPONENT: &str = "Light";

pub(crate) struct HelperObject {
    scene: Rc<dyn SceneHost>,
    kind: &'static str,
    suffix: &'static str,
    id: Option<EntityId>,
}

impl HelperObject {
    pub(crate) fn new(scene: Rc<dyn SceneHost>, kind: &'static str, suffix: &'static str) -> Self {
        Self {
            scene,
            kind,
            suffix,
            id: None,
        }
    }

    pub(crate) fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Create the helper unless it already exists.
    pub(crate) fn create(&mut self, owner: EntityId) -> Result<(), ComponentError> {
        if self.id.is_some() {
            return Ok(());
        }
        let owner_name = self
            .scene
            .get_object(owner)
            .map_or_else(|| owner.to_string(), |object| object.name);
        let options = serde_json::json!({ "name": format!("{owner_name}.{}", self.suffix) });
        let helper = self.scene.create_object(self.kind, &options)?;
        tracing::debug!(%owner, helper = %helper.id, kind = self.kind, "helper object created");
        self.id = Some(helper.id);
        Ok(())
    }

    /// Move the helper to `place(owner transform)`. Does nothing while the
    /// owner is not in the scene.
    pub(crate) fn follow(&mut self, owner: EntityId, place: impl FnOnce(&Transform) -> Transform) {
        let Some(id) = self.id else {
            return;
        };
        let Some(object) = self.scene.get_object(owner) else {
            return;
        };
        if !self.scene.set_transform(id, &place(&object.transform)) {
            tracing::debug!(%owner, helper = %id, "helper object vanished from the scene");
            self.id = None;
        }
    }

    pub(crate) fn destroy(&mut self) {
        if let Some(id) = self.id.take() {
            if !self.scene.destroy_object(id) {
                tracing::debug!(helper = %id, "helper object already gone");
            }
        }
    }
}
