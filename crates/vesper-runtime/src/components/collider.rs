//! The `Collider` component: a passive collision descriptor with a debug
//! proxy object in the scene.
//!
//! The proxy is created with the component, follows the owning entity's
//! transform on every tick in every playback mode, and is destroyed exactly
//! once when the component is destroyed.

use std::any::Any;
use std::rc::Rc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use vesper_ecs::component::{Component, FrameContext};
use vesper_ecs::entity::EntityId;
use vesper_ecs::scene::{SceneHost, Transform};
use vesper_ecs::ComponentError;

use super::HelperObject;

/// Scene object kind used for collider proxies.
pub const COLLIDER_PROXY_KIND: &str = "collider-proxy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColliderShape {
    #[default]
    Box,
    Sphere,
    Capsule,
}

/// Saved / init form of a Collider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColliderData {
    pub shape: ColliderShape,
    /// Box extents.
    pub size: Vec3,
    /// Sphere and capsule radius.
    pub radius: f32,
    /// Capsule height.
    pub height: f32,
    /// Offset from the entity position.
    pub offset: Vec3,
    pub is_trigger: bool,
    pub show_proxy: bool,
}

impl Default for ColliderData {
    fn default() -> Self {
        Self {
            shape: ColliderShape::Box,
            size: Vec3::ONE,
            radius: 0.5,
            height: 1.0,
            offset: Vec3::ZERO,
            is_trigger: false,
            show_proxy: true,
        }
    }
}

impl ColliderData {
    fn validate(&self) -> Result<(), ComponentError> {
        if self.radius < 0.0 || self.height < 0.0 || self.size.min_element() < 0.0 {
            return Err(ComponentError::InvalidData(
                "collider dimensions must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Proxy scale before the entity's own scale is applied.
    fn extents(&self) -> Vec3 {
        match self.shape {
            ColliderShape::Box => self.size,
            ColliderShape::Sphere => Vec3::splat(self.radius * 2.0),
            ColliderShape::Capsule => Vec3::new(self.radius * 2.0, self.height, self.radius * 2.0),
        }
    }

    /// Where the proxy sits given the entity's transform.
    pub fn proxy_transform(&self, owner: &Transform) -> Transform {
        Transform {
            position: owner.position + self.offset,
            rotation: owner.rotation,
            scale: self.extents() * owner.scale,
        }
    }
}

pub struct Collider {
    entity: EntityId,
    data: ColliderData,
    proxy: HelperObject,
}

impl Collider {
    pub fn new(
        entity: EntityId,
        data: ColliderData,
        scene: Rc<dyn SceneHost>,
    ) -> Result<Self, ComponentError> {
        data.validate()?;
        let mut collider = Self {
            entity,
            data,
            proxy: HelperObject::new(scene, COLLIDER_PROXY_KIND, "collider"),
        };
        if collider.data.show_proxy {
            collider.proxy.create(entity)?;
        }
        collider.sync();
        Ok(collider)
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn data(&self) -> &ColliderData {
        &self.data
    }

    /// Scene id of the debug proxy, if shown.
    pub fn proxy(&self) -> Option<EntityId> {
        self.proxy.id()
    }

    /// Replace every field, creating or destroying the proxy to match
    /// `show_proxy`.
    pub fn set_data(&mut self, data: ColliderData) -> Result<(), ComponentError> {
        data.validate()?;
        self.data = data;
        if self.data.show_proxy {
            self.proxy.create(self.entity)?;
        } else {
            self.proxy.destroy();
        }
        self.sync();
        Ok(())
    }

    pub fn set_show_proxy(&mut self, show: bool) -> Result<(), ComponentError> {
        let data = ColliderData {
            show_proxy: show,
            ..self.data.clone()
        };
        self.set_data(data)
    }

    fn sync(&mut self) {
        let data = &self.data;
        self.proxy.follow(self.entity, |owner| data.proxy_transform(owner));
    }
}

impl Component for Collider {
    fn update(&mut self, _frame: &FrameContext) -> Result<(), ComponentError> {
        self.sync();
        Ok(())
    }

    fn destroy(&mut self) {
        self.proxy.destroy();
    }

    fn serialize(&self) -> Option<serde_json::Value> {
        serde_json::to_value(&self.data).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for Collider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collider")
            .field("entity", &self.entity)
            .field("data", &self.data)
            .field("proxy", &self.proxy.id())
            .finish()
    }
}

/// Factory for the registry. Init data is [`ColliderData`] in camelCase
/// JSON; `null` means defaults.
pub fn collider_factory(
    scene: Rc<dyn SceneHost>,
) -> impl Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError> {
    move |entity, data| {
        let data: ColliderData = if data.is_null() {
            ColliderData::default()
        } else {
            serde_json::from_value(data.clone())?
        };
        Ok(Box::new(Collider::new(entity, data, Rc::clone(&scene))?) as Box<dyn Component>)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
