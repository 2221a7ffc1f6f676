//! A headless, in-memory [`SceneHost`].
//!
//! [`MemoryScene`] stands in for the editor's scene layer when the runtime is
//! hosted without a renderer (tests, benchmarks, command-line playback). It
//! allocates ids, keeps transforms, and announces object lifetimes on the
//! event bus.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use glam::Vec3;
use serde_json::Value;

use vesper_ecs::bus::{Event, EventBus};
use vesper_ecs::entity::EntityId;
use vesper_ecs::scene::{SceneError, SceneHost, SceneObject, Transform};

pub struct MemoryScene {
    objects: RefCell<BTreeMap<EntityId, SceneObject>>,
    next_id: Cell<u64>,
    bus: EventBus,
}

impl MemoryScene {
    pub fn new(bus: EventBus) -> Self {
        Self {
            objects: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(1),
            bus,
        }
    }

    /// Add an object at the origin and announce it.
    pub fn spawn(&self, kind: &str, name: &str) -> SceneObject {
        self.insert(kind, name.to_owned(), Transform::default())
    }

    /// Add an object with an explicit transform and announce it.
    pub fn spawn_at(&self, kind: &str, name: &str, transform: Transform) -> SceneObject {
        self.insert(kind, name.to_owned(), transform)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.objects.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }

    /// All objects in id order.
    pub fn objects(&self) -> Vec<SceneObject> {
        self.objects.borrow().values().cloned().collect()
    }

    fn insert(&self, kind: &str, name: String, transform: Transform) -> SceneObject {
        let id = EntityId::from_raw(self.next_id.get());
        self.next_id.set(id.to_raw() + 1);
        let object = SceneObject {
            id,
            name,
            kind: kind.to_owned(),
            transform,
            mesh: None,
        };
        self.objects.borrow_mut().insert(id, object.clone());

        tracing::debug!(entity = %id, kind, name = %object.name, "scene object created");
        self.bus.emit(&Event::ObjectCreated { entity: id });
        object
    }
}

impl SceneHost for MemoryScene {
    fn get_object(&self, id: EntityId) -> Option<SceneObject> {
        self.objects.borrow().get(&id).cloned()
    }

    fn find_object(&self, name_or_id: &str) -> Option<SceneObject> {
        let objects = self.objects.borrow();
        if let Some(found) = objects.values().find(|o| o.name == name_or_id) {
            return Some(found.clone());
        }
        let id = name_or_id.parse::<EntityId>().ok()?;
        objects.get(&id).cloned()
    }

    fn create_object(&self, kind: &str, options: &Value) -> Result<SceneObject, SceneError> {
        if kind.trim().is_empty() {
            return Err(SceneError::UnknownKind(kind.to_owned()));
        }
        let options = match options {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => {
                return Err(SceneError::InvalidOptions(format!(
                    "expected an object, got {other}"
                )))
            }
        };

        let mut transform = Transform::default();
        let mut name = kind.to_owned();
        if let Some(options) = options {
            if let Some(value) = options.get("name") {
                name = value
                    .as_str()
                    .ok_or_else(|| SceneError::InvalidOptions("name must be a string".into()))?
                    .to_owned();
            }
            if let Some(value) = options.get("position") {
                transform.position = parse_vec3("position", value)?;
            }
            if let Some(value) = options.get("rotation") {
                transform.rotation = parse_vec3("rotation", value)?;
            }
            if let Some(value) = options.get("scale") {
                transform.scale = parse_vec3("scale", value)?;
            }
        }

        Ok(self.insert(kind, name, transform))
    }

    fn destroy_object(&self, id: EntityId) -> bool {
        let removed = self.objects.borrow_mut().remove(&id);
        if removed.is_none() {
            return false;
        }
        tracing::debug!(entity = %id, "scene object deleted");
        self.bus.emit(&Event::ObjectDeleted { entity: id });
        true
    }

    fn set_transform(&self, id: EntityId, transform: &Transform) -> bool {
        match self.objects.borrow_mut().get_mut(&id) {
            Some(object) => {
                object.transform = *transform;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for MemoryScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryScene")
            .field("objects", &self.objects.borrow().len())
            .field("next_id", &self.next_id.get())
            .finish()
    }
}

/// Accepts `{x, y, z}` (missing axes are 0) or `[x, y, z]`.
fn parse_vec3(field: &str, value: &Value) -> Result<Vec3, SceneError> {
    let invalid = || SceneError::InvalidOptions(format!("{field} must be {{x, y, z}} or [x, y, z]"));
    let axis = |v: Option<&Value>| -> Result<f32, SceneError> {
        match v {
            None => Ok(0.0),
            Some(v) => v.as_f64().map(|n| n as f32).ok_or_else(invalid),
        }
    };
    match value {
        Value::Object(map) => Ok(Vec3::new(
            axis(map.get("x"))?,
            axis(map.get("y"))?,
            axis(map.get("z"))?,
        )),
        Value::Array(items) if items.len() == 3 => Ok(Vec3::new(
            axis(items.first())?,
            axis(items.get(1))?,
            axis(items.get(2))?,
        )),
        _ => Err(invalid()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use vesper_ecs::bus::{OBJECT_CREATED, OBJECT_DELETED};

    #[test]
    fn ids_are_allocated_in_order() {
        let scene = MemoryScene::new(EventBus::new());
        let a = scene.spawn("cube", "A");
        let b = scene.spawn("sphere", "B");
        assert_eq!(a.id, EntityId::from_raw(1));
        assert_eq!(b.id, EntityId::from_raw(2));
        assert_eq!(scene.len(), 2);
    }

    #[test]
    fn lifetimes_are_announced() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in [OBJECT_CREATED, OBJECT_DELETED] {
            let log = Rc::clone(&log);
            bus.on(name, move |event| {
                log.borrow_mut().push((event.name().to_owned(), event.entity()));
                Ok(())
            });
        }

        let scene = MemoryScene::new(bus);
        let cube = scene.spawn("cube", "Cube");
        assert!(scene.destroy_object(cube.id));
        assert!(!scene.destroy_object(cube.id));

        assert_eq!(
            *log.borrow(),
            vec![
                (OBJECT_CREATED.to_owned(), Some(cube.id)),
                (OBJECT_DELETED.to_owned(), Some(cube.id)),
            ]
        );
    }

    #[test]
    fn create_object_reads_options() {
        let scene = MemoryScene::new(EventBus::new());
        let made = scene
            .create_object(
                "sphere",
                &serde_json::json!({
                    "name": "Ball",
                    "position": { "x": 1, "y": 2.5 },
                    "scale": [2, 2, 2],
                }),
            )
            .unwrap();
        assert_eq!(made.name, "Ball");
        assert_eq!(made.transform.position, Vec3::new(1.0, 2.5, 0.0));
        assert_eq!(made.transform.scale, Vec3::splat(2.0));

        let defaulted = scene.create_object("cube", &Value::Null).unwrap();
        assert_eq!(defaulted.name, "cube");
    }

    #[test]
    fn create_object_rejects_bad_input() {
        let scene = MemoryScene::new(EventBus::new());
        assert!(matches!(
            scene.create_object("", &Value::Null),
            Err(SceneError::UnknownKind(_))
        ));
        assert!(matches!(
            scene.create_object("cube", &serde_json::json!({ "position": [1, 2] })),
            Err(SceneError::InvalidOptions(_))
        ));
        assert!(matches!(
            scene.create_object("cube", &serde_json::json!("big")),
            Err(SceneError::InvalidOptions(_))
        ));
        assert!(scene.is_empty());
    }

    #[test]
    fn find_by_name_then_id() {
        let scene = MemoryScene::new(EventBus::new());
        let a = scene.spawn("cube", "Player");
        assert_eq!(scene.find_object("Player").unwrap().id, a.id);
        assert_eq!(scene.find_object(&a.id.to_string()).unwrap().id, a.id);
        assert!(scene.find_object("Nobody").is_none());
    }

    #[test]
    fn set_transform_on_missing_object() {
        let scene = MemoryScene::new(EventBus::new());
        assert!(!scene.set_transform(EntityId::from_raw(42), &Transform::default()));
    }
}
