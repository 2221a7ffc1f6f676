//! The capability context handed to scripts.
//!
//! A script sees a closed set of bindings and nothing else:
//!
//! - `entity`, `name`, `gameObject`, `time` and `variables`, fields of the map
//!   bound as `this` inside every hook. Inside a hook they can also be used as
//!   bare names; `gameObject`, `time` and `variables` are shared with `this`,
//!   so edits through either spelling land in the same value;
//! - the native functions registered by [`register_capabilities`], all scoped
//!   to the owning entity.
//!
//! Store access goes through a `Weak` reference so a compiled script never
//! keeps the store alive.
//!
//! Handlers registered with `on` only run while the instance is started.
//! Handlers registered during a session are dropped when it ends; ones
//! registered by top-level statements live as long as the instance.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use glam::Vec3;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, INT};

use vesper_ecs::bus::{EventBus, SubscriptionId};
use vesper_ecs::entity::EntityId;
use vesper_ecs::scene::{SceneHost, SceneObject, Transform};
use vesper_ecs::store::ComponentStore;

use crate::compiler::ScriptCompiler;
use crate::instance::ScriptVm;

type NativeResult<T> = Result<T, Box<EvalAltResult>>;

// ---------------------------------------------------------------------------
// ScriptServices
// ---------------------------------------------------------------------------

/// Everything a Script component needs from its surroundings.
#[derive(Clone)]
pub struct ScriptServices {
    pub compiler: Rc<ScriptCompiler>,
    pub store: Weak<ComponentStore>,
    pub scene: Rc<dyn SceneHost>,
    pub bus: EventBus,
}

impl std::fmt::Debug for ScriptServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptServices")
            .field("compiler", &self.compiler)
            .field("store_alive", &(self.store.strong_count() > 0))
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ScriptBindings
// ---------------------------------------------------------------------------

/// Host side of one script instance's capability context.
pub struct ScriptBindings {
    pub(crate) entity: EntityId,
    pub(crate) script: String,
    pub(crate) store: Weak<ComponentStore>,
    pub(crate) scene: Rc<dyn SceneHost>,
    pub(crate) bus: EventBus,
    /// Set once the engine and AST exist; event callbacks resolve through it.
    vm: RefCell<Weak<ScriptVm>>,
    /// Between `start` and `onDestroy`.
    active: Rc<Cell<bool>>,
    /// Handlers of this script currently on the stack.
    event_depth: Rc<Cell<usize>>,
    max_event_depth: usize,
    /// Made by top-level statements.
    subscriptions: RefCell<Vec<SubscriptionId>>,
    /// Made while started; dropped when the session ends.
    session_subscriptions: RefCell<Vec<SubscriptionId>>,
}

impl ScriptBindings {
    pub fn new(entity: EntityId, script: impl Into<String>, services: &ScriptServices) -> Rc<Self> {
        Rc::new(Self {
            entity,
            script: script.into(),
            store: services.store.clone(),
            scene: Rc::clone(&services.scene),
            bus: services.bus.clone(),
            vm: RefCell::new(Weak::new()),
            active: Rc::new(Cell::new(false)),
            event_depth: Rc::new(Cell::new(0)),
            max_event_depth: services.compiler.config().max_event_depth,
            subscriptions: RefCell::new(Vec::new()),
            session_subscriptions: RefCell::new(Vec::new()),
        })
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub(crate) fn attach_vm(&self, vm: &Rc<ScriptVm>) {
        *self.vm.borrow_mut() = Rc::downgrade(vm);
    }

    fn store(&self) -> NativeResult<Rc<ComponentStore>> {
        self.store
            .upgrade()
            .ok_or_else(|| "component store is no longer available".into())
    }

    /// The owning entity's scene object, as a script value (`()` if gone).
    pub(crate) fn fetch_game_object(&self) -> (Dynamic, Option<Transform>) {
        match self.scene.get_object(self.entity) {
            Some(object) => (scene_object_to_dynamic(&object), Some(object.transform)),
            None => (Dynamic::UNIT, None),
        }
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len() + self.session_subscriptions.borrow().len()
    }

    pub(crate) fn begin_session(&self) {
        self.active.set(true);
    }

    /// Stop delivering events and drop the session's subscriptions.
    pub(crate) fn end_session(&self) {
        self.active.set(false);
        let ids = std::mem::take(&mut *self.session_subscriptions.borrow_mut());
        for id in ids {
            self.bus.off(id);
        }
    }

    /// Drop every bus subscription the script made with `on`.
    pub(crate) fn unsubscribe_all(&self) {
        self.end_session();
        let ids = std::mem::take(&mut *self.subscriptions.borrow_mut());
        for id in ids {
            self.bus.off(id);
        }
    }

    fn subscribe(&self, event: &str, callback: FnPtr) {
        let vm = self.vm.borrow().clone();
        let script = self.script.clone();
        let active = Rc::clone(&self.active);
        let depth = Rc::clone(&self.event_depth);
        let max_depth = self.max_event_depth;
        let id = self.bus.on(event, move |ev| {
            let Some(vm) = vm.upgrade() else {
                return Ok(());
            };
            if !active.get() {
                return Ok(());
            }
            // Each delivery is a fresh evaluation, so the engine's call-level
            // limit never sees recursion through the bus.
            if depth.get() >= max_depth {
                anyhow::bail!(
                    "script '{script}': handler for '{}' nested more than {max_depth} events deep",
                    ev.name()
                );
            }
            let payload = rhai::serde::to_dynamic(ev.payload())
                .map_err(|e| anyhow::anyhow!("script '{script}': bad event payload: {e}"))?;

            depth.set(depth.get() + 1);
            let result = match callback.call::<Dynamic>(vm.engine(), vm.ast(), (payload,)) {
                Err(err) if matches!(err.as_ref(), EvalAltResult::ErrorFunctionNotFound(..)) => {
                    callback.call::<Dynamic>(vm.engine(), vm.ast(), ())
                }
                other => other,
            };
            depth.set(depth.get() - 1);

            result
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!("script '{script}' handler for '{}': {e}", ev.name()))
        });
        if self.active.get() {
            self.session_subscriptions.borrow_mut().push(id);
        } else {
            self.subscriptions.borrow_mut().push(id);
        }
    }
}

impl std::fmt::Debug for ScriptBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBindings")
            .field("entity", &self.entity)
            .field("script", &self.script)
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub(crate) fn vec3_to_dynamic(v: Vec3) -> Dynamic {
    let mut map = Map::new();
    map.insert("x".into(), Dynamic::from_float(v.x as f64));
    map.insert("y".into(), Dynamic::from_float(v.y as f64));
    map.insert("z".into(), Dynamic::from_float(v.z as f64));
    Dynamic::from_map(map)
}

fn number(value: &Dynamic) -> Option<f64> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as f64))
}

pub(crate) fn vec3_from_dynamic(value: &Dynamic) -> Option<Vec3> {
    let map = value.read_lock::<Map>()?;
    let axis = |key: &str| map.get(key).and_then(number).map(|v| v as f32);
    Some(Vec3::new(axis("x")?, axis("y")?, axis("z")?))
}

/// `#{ id, name, type, mesh, position, rotation, scale }`.
pub fn scene_object_to_dynamic(object: &SceneObject) -> Dynamic {
    let mut map = Map::new();
    map.insert("id".into(), Dynamic::from_int(object.id.to_raw() as INT));
    map.insert("name".into(), Dynamic::from(object.name.clone()));
    map.insert("type".into(), Dynamic::from(object.kind.clone()));
    map.insert(
        "mesh".into(),
        object
            .mesh
            .map(|m| Dynamic::from_int(m as INT))
            .unwrap_or(Dynamic::UNIT),
    );
    map.insert("position".into(), vec3_to_dynamic(object.transform.position));
    map.insert("rotation".into(), vec3_to_dynamic(object.transform.rotation));
    map.insert("scale".into(), vec3_to_dynamic(object.transform.scale));
    Dynamic::from_map(map)
}

/// Read the transform back out of a `gameObject` value.
pub fn transform_from_dynamic(value: &Dynamic) -> Option<Transform> {
    let map = value.read_lock::<Map>()?;
    Some(Transform {
        position: vec3_from_dynamic(map.get("position")?)?,
        rotation: vec3_from_dynamic(map.get("rotation")?)?,
        scale: vec3_from_dynamic(map.get("scale")?)?,
    })
}

/// Context fields reach native functions as shared values.
fn to_json(value: &Dynamic) -> NativeResult<serde_json::Value> {
    rhai::serde::from_dynamic(&value.flatten_clone())
}

fn to_script(value: &serde_json::Value) -> NativeResult<Dynamic> {
    rhai::serde::to_dynamic(value)
}

// ---------------------------------------------------------------------------
// Native functions
// ---------------------------------------------------------------------------

/// Register the native half of the capability context on `engine`.
pub(crate) fn register_capabilities(engine: &mut Engine, bindings: &Rc<ScriptBindings>) {
    register_context_names(engine);
    register_diagnostics(engine, bindings);
    register_store_api(engine, bindings);
    register_scene_api(engine, bindings);
    register_bus_api(engine, bindings);
}

/// Names resolved from the hook's `this` map when used bare.
const CONTEXT_NAMES: [&str; 5] = ["entity", "name", "gameObject", "time", "variables"];

fn register_context_names(engine: &mut Engine) {
    #[allow(deprecated)]
    engine.on_var(|name, index, context| {
        // Locals and parameters shadow the context.
        if index > 0 || !CONTEXT_NAMES.contains(&name) || context.scope().contains(name) {
            return Ok(None);
        }
        Ok(context
            .this_ptr()
            .and_then(|this| this.read_lock::<Map>()?.get(name).cloned()))
    });
}

fn register_diagnostics(engine: &mut Engine, bindings: &Rc<ScriptBindings>) {
    let b = Rc::clone(bindings);
    engine.register_fn("log", move |message: Dynamic| {
        tracing::info!(source = "script", script = %b.script, entity = %b.entity, "{message}");
    });
    let b = Rc::clone(bindings);
    engine.register_fn("warn", move |message: Dynamic| {
        tracing::warn!(source = "script", script = %b.script, entity = %b.entity, "{message}");
    });
    let b = Rc::clone(bindings);
    engine.register_fn("error", move |message: Dynamic| {
        tracing::error!(source = "script", script = %b.script, entity = %b.entity, "{message}");
    });

    let b = Rc::clone(bindings);
    engine.on_print(move |text| {
        tracing::info!(source = "script", script = %b.script, entity = %b.entity, "{text}");
    });
    let b = Rc::clone(bindings);
    engine.on_debug(move |text, _source, pos| {
        tracing::debug!(source = "script", script = %b.script, entity = %b.entity, %pos, "{text}");
    });
}

fn register_store_api(engine: &mut Engine, bindings: &Rc<ScriptBindings>) {
    let b = Rc::clone(bindings);
    engine.register_fn(
        "getComponent",
        move |type_name: ImmutableString| -> NativeResult<Dynamic> {
            let store = b.store()?;
            let Some(handle) = store.get_component(b.entity, &type_name) else {
                return Ok(Dynamic::UNIT);
            };
            // The component may be the one currently running.
            let saved = handle.try_borrow().and_then(|c| c.serialize());
            let mut map = match saved.as_ref().map(to_script).transpose()? {
                Some(value) if value.is_map() => value.cast::<Map>(),
                _ => Map::new(),
            };
            map.insert("type".into(), Dynamic::from(handle.type_name().to_owned()));
            map.insert("entity".into(), Dynamic::from_int(b.entity.to_raw() as INT));
            Ok(Dynamic::from_map(map))
        },
    );

    let b = Rc::clone(bindings);
    engine.register_fn(
        "hasComponent",
        move |type_name: ImmutableString| -> NativeResult<bool> {
            Ok(b.store()?.has_component(b.entity, &type_name))
        },
    );

    let b = Rc::clone(bindings);
    engine.register_fn(
        "addComponent",
        move |type_name: ImmutableString| -> NativeResult<bool> {
            add_component(&b, &type_name, &serde_json::Value::Null)
        },
    );
    let b = Rc::clone(bindings);
    engine.register_fn(
        "addComponent",
        move |type_name: ImmutableString, data: Dynamic| -> NativeResult<bool> {
            add_component(&b, &type_name, &to_json(&data)?)
        },
    );

    let b = Rc::clone(bindings);
    engine.register_fn(
        "removeComponent",
        move |type_name: ImmutableString| -> NativeResult<bool> {
            Ok(b.store()?.remove_component(b.entity, &type_name))
        },
    );
}

fn add_component(
    bindings: &ScriptBindings,
    type_name: &str,
    data: &serde_json::Value,
) -> NativeResult<bool> {
    let store = bindings.store()?;
    store
        .add_component(bindings.entity, type_name, data)
        .map(|_| true)
        .map_err(|e| e.to_string().into())
}

fn register_scene_api(engine: &mut Engine, bindings: &Rc<ScriptBindings>) {
    let b = Rc::clone(bindings);
    engine.register_fn("findObject", move |name_or_id: ImmutableString| -> Dynamic {
        b.scene
            .find_object(&name_or_id)
            .map(|o| scene_object_to_dynamic(&o))
            .unwrap_or(Dynamic::UNIT)
    });
    let b = Rc::clone(bindings);
    engine.register_fn("findObject", move |id: INT| -> Dynamic {
        b.scene
            .get_object(EntityId::from_raw(id as u64))
            .map(|o| scene_object_to_dynamic(&o))
            .unwrap_or(Dynamic::UNIT)
    });

    let b = Rc::clone(bindings);
    engine.register_fn(
        "createObject",
        move |kind: ImmutableString| -> NativeResult<Dynamic> {
            create_object(&b, &kind, &serde_json::Value::Null)
        },
    );
    let b = Rc::clone(bindings);
    engine.register_fn(
        "createObject",
        move |kind: ImmutableString, options: Dynamic| -> NativeResult<Dynamic> {
            create_object(&b, &kind, &to_json(&options)?)
        },
    );

    let b = Rc::clone(bindings);
    engine.register_fn("destroyObject", move |id: INT| -> bool {
        b.scene.destroy_object(EntityId::from_raw(id as u64))
    });
}

fn create_object(
    bindings: &ScriptBindings,
    kind: &str,
    options: &serde_json::Value,
) -> NativeResult<Dynamic> {
    bindings
        .scene
        .create_object(kind, options)
        .map(|o| scene_object_to_dynamic(&o))
        .map_err(|e| e.to_string().into())
}

fn register_bus_api(engine: &mut Engine, bindings: &Rc<ScriptBindings>) {
    let b = Rc::clone(bindings);
    engine.register_fn("on", move |event: ImmutableString, callback: FnPtr| {
        b.subscribe(&event, callback);
    });

    let b = Rc::clone(bindings);
    engine.register_fn("emit", move |event: ImmutableString| -> INT {
        b.bus.emit_custom(&event, serde_json::Value::Null) as INT
    });
    let b = Rc::clone(bindings);
    engine.register_fn(
        "emit",
        move |event: ImmutableString, data: Dynamic| -> NativeResult<INT> {
            Ok(b.bus.emit_custom(&event, to_json(&data)?) as INT)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_object_round_trips_transform() {
        let object = SceneObject {
            id: EntityId::from_raw(4),
            name: "Cube".to_owned(),
            kind: "cube".to_owned(),
            transform: Transform {
                position: Vec3::new(1.0, 2.0, 3.0),
                rotation: Vec3::new(0.0, 0.5, 0.0),
                scale: Vec3::splat(2.0),
            },
            mesh: None,
        };
        let value = scene_object_to_dynamic(&object);
        assert_eq!(transform_from_dynamic(&value), Some(object.transform));

        let map = value.read_lock::<Map>().unwrap();
        assert_eq!(map.get("id").and_then(|v| v.as_int().ok()), Some(4));
        assert!(map.get("mesh").map(|v| v.is_unit()).unwrap_or(false));
    }

    #[test]
    fn integer_axes_are_accepted() {
        let mut map = Map::new();
        map.insert("x".into(), Dynamic::from_int(1));
        map.insert("y".into(), Dynamic::from_float(2.5));
        map.insert("z".into(), Dynamic::from_int(-3));
        assert_eq!(
            vec3_from_dynamic(&Dynamic::from_map(map)),
            Some(Vec3::new(1.0, 2.5, -3.0))
        );
        assert_eq!(vec3_from_dynamic(&Dynamic::UNIT), None);
    }
}
