//! The scene collaborator interface.
//!
//! The runtime does not own scene objects. It reaches the scene through a
//! [`SceneHost`] to look objects up, create helper objects (collider proxies,
//! light helpers, script-spawned objects) and write transforms back.
//! Implementations announce object lifetimes on the event bus with
//! [`Event::ObjectCreated`](crate::bus::Event::ObjectCreated) and
//! [`Event::ObjectDeleted`](crate::bus::Event::ObjectDeleted).

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Position, euler rotation (radians) and scale of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// A snapshot of one scene object as seen by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: EntityId,
    pub name: String,
    /// Object kind as understood by the scene (`"cube"`, `"light"`, ...).
    pub kind: String,
    pub transform: Transform,
    /// Opaque mesh handle owned by the renderer, if any.
    #[serde(default)]
    pub mesh: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("unknown object kind '{0}'")]
    UnknownKind(String),

    #[error("invalid object options: {0}")]
    InvalidOptions(String),
}

/// Operations the runtime needs from the scene layer.
pub trait SceneHost {
    fn get_object(&self, id: EntityId) -> Option<SceneObject>;

    /// Look an object up by name, falling back to a numeric id.
    fn find_object(&self, name_or_id: &str) -> Option<SceneObject>;

    /// Create an object of `kind`. Recognised option keys are `name`,
    /// `position`, `rotation` and `scale`.
    fn create_object(
        &self,
        kind: &str,
        options: &serde_json::Value,
    ) -> Result<SceneObject, SceneError>;

    /// Returns `false` when the object was already gone.
    fn destroy_object(&self, id: EntityId) -> bool;

    /// Returns `false` when the object does not exist.
    fn set_transform(&self, id: EntityId, transform: &Transform) -> bool;
}
