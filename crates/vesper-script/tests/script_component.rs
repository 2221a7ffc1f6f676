//! Integration tests for the Script component and its sandbox.
//!
//! A small in-file scene stands in for the editor's scene layer.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec3;
use serde_json::json;
use vesper_ecs::prelude::*;
use vesper_script::prelude::*;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestScene {
    objects: RefCell<BTreeMap<EntityId, SceneObject>>,
    next_id: Cell<u64>,
}

impl TestScene {
    fn insert(&self, name: &str) -> EntityId {
        let id = EntityId::from_raw(self.next_id.get() + 1);
        self.next_id.set(id.to_raw());
        self.objects.borrow_mut().insert(
            id,
            SceneObject {
                id,
                name: name.to_owned(),
                kind: "cube".to_owned(),
                transform: Transform::default(),
                mesh: None,
            },
        );
        id
    }

    fn transform(&self, id: EntityId) -> Transform {
        self.objects.borrow()[&id].transform
    }
}

impl SceneHost for TestScene {
    fn get_object(&self, id: EntityId) -> Option<SceneObject> {
        self.objects.borrow().get(&id).cloned()
    }

    fn find_object(&self, name_or_id: &str) -> Option<SceneObject> {
        let objects = self.objects.borrow();
        objects
            .values()
            .find(|o| o.name == name_or_id)
            .cloned()
            .or_else(|| {
                let id = name_or_id.parse::<EntityId>().ok()?;
                objects.get(&id).cloned()
            })
    }

    fn create_object(
        &self,
        kind: &str,
        _options: &serde_json::Value,
    ) -> Result<SceneObject, SceneError> {
        let id = self.insert(kind);
        Ok(self.objects.borrow()[&id].clone())
    }

    fn destroy_object(&self, id: EntityId) -> bool {
        self.objects.borrow_mut().remove(&id).is_some()
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

struct Tag {
    label: String,
}

impl Component for Tag {
    fn serialize(&self) -> Option<serde_json::Value> {
        Some(json!({ "label": self.label }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Harness {
    bus: EventBus,
    store: Rc<ComponentStore>,
    scene: Rc<TestScene>,
    player: EntityId,
}

fn harness_with(config: ScriptConfig) -> Harness {
    let bus = EventBus::new();
    let store = Rc::new(ComponentStore::new(bus.clone()));
    let scene = Rc::new(TestScene::default());
    let player = scene.insert("Player");

    let services = ScriptServices {
        compiler: Rc::new(ScriptCompiler::new(config)),
        store: Rc::downgrade(&store),
        scene: Rc::clone(&scene) as Rc<dyn SceneHost>,
        bus: bus.clone(),
    };
    store
        .register(SCRIPT_COMPONENT, script_factory(services))
        .unwrap();
    store
        .register("Tag", |_, data| {
            Ok(Box::new(Tag {
                label: data["label"].as_str().unwrap_or_default().to_owned(),
            }) as Box<dyn Component>)
        })
        .unwrap();

    Harness {
        bus,
        store,
        scene,
        player,
    }
}

fn harness() -> Harness {
    harness_with(ScriptConfig::default())
}

impl Harness {
    fn add_script(&self, entity: EntityId, data: serde_json::Value) -> ComponentHandle {
        self.store
            .add_component(entity, SCRIPT_COMPONENT, &data)
            .unwrap()
    }

    /// Record every `name` event payload.
    fn record(&self, name: &str) -> Rc<RefCell<Vec<serde_json::Value>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        self.bus.on(name, move |event| {
            s.borrow_mut().push(event.payload());
            Ok(())
        });
        seen
    }
}

fn frame(tick: u64, delta_time: f64, time: f64) -> FrameContext {
    FrameContext {
        delta_time,
        time,
        mode: PlaybackMode::Playing,
        tick,
    }
}

fn script(handle: &ComponentHandle) -> std::cell::RefMut<'_, ScriptComponent> {
    handle.downcast_mut::<ScriptComponent>().unwrap()
}

// ---------------------------------------------------------------------------
// Hooks and context
// ---------------------------------------------------------------------------

#[test]
fn variables_persist_across_updates() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "scriptCode": "fn update() { this.variables.count = (this.variables.count ?? 0) + 1; }" }),
    );

    let mut s = script(&handle);
    for tick in 1..=5 {
        s.tick(&frame(tick, 0.016, tick as f64 * 0.016)).unwrap();
    }
    assert_eq!(s.variables()["count"], json!(5));
}

#[test]
fn update_receives_delta_time_and_clock_time() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                fn update(dt) {
                    this.variables.total = (this.variables.total ?? 0.0) + dt;
                    this.variables.now = this.time.time;
                    this.variables.delta = this.time.deltaTime;
                }
            "#
        }),
    );

    let mut s = script(&handle);
    s.tick(&frame(1, 0.25, 1.0)).unwrap();
    s.tick(&frame(2, 0.25, 2.5)).unwrap();
    assert_eq!(s.variables()["total"], json!(0.5));
    assert_eq!(s.variables()["now"], json!(2.5));
    assert_eq!(s.variables()["delta"], json!(0.25));
}

#[test]
fn host_edits_to_variables_reach_the_script() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "scriptCode": "fn update() { this.variables.doubled = this.variables.input * 2; }" }),
    );

    let mut s = script(&handle);
    s.set_variable("input", json!(21));
    s.tick(&frame(1, 0.1, 0.1)).unwrap();
    assert_eq!(s.variables()["doubled"], json!(42));
}

#[test]
fn entity_binding_is_restored_before_each_hook() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                fn update() {
                    this.variables.seen = this.entity;
                    this.entity = 999;
                }
            "#
        }),
    );

    let mut s = script(&handle);
    s.tick(&frame(1, 0.1, 0.1)).unwrap();
    s.tick(&frame(2, 0.1, 0.2)).unwrap();
    assert_eq!(s.variables()["seen"], json!(h.player.to_raw()));
}

#[test]
fn game_object_transform_edits_are_written_back() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "scriptCode": "fn update(dt) { this.gameObject.position.x += 1.0; }" }),
    );

    let mut s = script(&handle);
    s.tick(&frame(1, 0.1, 0.1)).unwrap();
    s.tick(&frame(2, 0.1, 0.2)).unwrap();
    assert_eq!(h.scene.transform(h.player).position.x, 2.0);
}

#[test]
fn context_fields_resolve_as_bare_names() {
    let h = harness();
    let data = ScriptData::from_code(
        r#"
        fn update(dt) {
            variables.count = (variables.count ?? 0) + 1;
            variables.owner = entity;
            variables.delta = time.deltaTime;
            gameObject.position.x += 1.0;
        }
        "#,
    );
    let handle = h.add_script(h.player, serde_json::to_value(data).unwrap());

    let mut s = script(&handle);
    for tick in 1..=3 {
        s.tick(&frame(tick, 0.25, tick as f64 * 0.25)).unwrap();
    }
    assert_eq!(s.variables()["count"], json!(3));
    assert_eq!(s.variables()["owner"], json!(h.player.to_raw()));
    assert_eq!(s.variables()["delta"], json!(0.25));
    assert_eq!(h.scene.transform(h.player).position.x, 3.0);
}

#[test]
fn bare_entity_is_read_only() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "scriptCode": "fn update() { entity = 5; }" }),
    );
    assert!(script(&handle).tick(&frame(1, 0.1, 0.1)).is_err());
}

#[test]
fn locals_shadow_context_names() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "scriptCode": "fn update() { let time = 7; this.variables.time = time; }" }),
    );
    let mut s = script(&handle);
    s.tick(&frame(1, 0.1, 0.1)).unwrap();
    assert_eq!(s.variables()["time"], json!(7));
}

#[test]
fn game_object_is_refreshed_before_each_update() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                fn update() {
                    variables.seen = if gameObject == () { "gone" } else { gameObject.position.y };
                }
            "#
        }),
    );

    let mut s = script(&handle);
    s.tick(&frame(1, 0.1, 0.1)).unwrap();
    assert_eq!(s.variables()["seen"], json!(0.0));

    let moved = Transform {
        position: Vec3::new(0.0, 4.0, 0.0),
        ..Transform::default()
    };
    assert!(h.scene.set_transform(h.player, &moved));
    s.tick(&frame(2, 0.1, 0.2)).unwrap();
    assert_eq!(s.variables()["seen"], json!(4.0));

    assert!(h.scene.destroy_object(h.player));
    s.tick(&frame(3, 0.1, 0.3)).unwrap();
    assert_eq!(s.variables()["seen"], json!("gone"));
    assert!(h.scene.get_object(h.player).is_none());
}

#[test]
fn start_runs_once_before_first_update() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                fn start() { this.variables.order = (this.variables.order ?? "") + "s"; }
                fn update() { this.variables.order += "u"; }
            "#
        }),
    );

    let mut s = script(&handle);
    assert!(!s.is_started());
    s.tick(&frame(1, 0.1, 0.1)).unwrap();
    s.tick(&frame(2, 0.1, 0.2)).unwrap();
    assert!(s.is_started());
    assert_eq!(s.variables()["order"], json!("suu"));

    s.stop(&frame(0, 0.0, 0.2)).unwrap();
    assert!(!s.is_started());
}

#[test]
fn disabled_script_does_not_run() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "enabled": false, "scriptCode": "fn update() { this.variables.ran = true; }" }),
    );

    let mut s = script(&handle);
    assert!(!s.is_runnable());
    s.tick(&frame(1, 0.1, 0.1)).unwrap();
    assert!(s.variables().get("ran").is_none());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn syntax_error_leaves_component_inert() {
    let h = harness();
    let errors = h.record("scriptError");
    let handle = h.add_script(
        h.player,
        json!({ "scriptName": "Broken", "scriptCode": "fn update( {" }),
    );

    let mut s = script(&handle);
    assert!(s.script_instance().is_none());
    assert!(s.last_error().is_some());
    assert!(!s.is_runnable());
    s.tick(&frame(1, 0.1, 0.1)).unwrap();

    let errors = errors.borrow();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["hook"], json!("compile"));
    assert_eq!(errors[0]["script"], json!("Broken"));
}

#[test]
fn failing_compile_does_not_touch_other_scripts() {
    let h = harness();
    let other = h.scene.insert("Other");
    let good = h.add_script(
        h.player,
        json!({ "scriptCode": "fn update() { this.variables.n = (this.variables.n ?? 0) + 1; }" }),
    );
    script(&good).tick(&frame(1, 0.1, 0.1)).unwrap();

    let bad = h.add_script(other, json!({ "scriptCode": "throw \"nope\";" }));
    assert!(script(&bad).script_instance().is_none());

    let mut g = script(&good);
    assert!(g.script_instance().is_some());
    assert_eq!(g.variables()["n"], json!(1));
    g.tick(&frame(2, 0.1, 0.2)).unwrap();
    assert_eq!(g.variables()["n"], json!(2));
}

#[test]
fn runtime_error_is_reported_and_script_keeps_running() {
    let h = harness();
    let errors = h.record("scriptError");
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                fn update() {
                    this.variables.calls = (this.variables.calls ?? 0) + 1;
                    throw "boom";
                }
            "#
        }),
    );

    let mut s = script(&handle);
    assert!(s.tick(&frame(1, 0.1, 0.1)).is_err());
    assert!(s.tick(&frame(2, 0.1, 0.2)).is_err());
    assert_eq!(s.variables()["calls"], json!(2));
    assert!(s.last_error().unwrap().contains("boom"));

    let errors = errors.borrow();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["hook"], json!("update"));
}

#[test]
fn runaway_loop_hits_the_operation_budget() {
    let h = harness_with(ScriptConfig {
        max_operations: 10_000,
        ..ScriptConfig::default()
    });
    let handle = h.add_script(h.player, json!({ "scriptCode": "fn update() { loop { } }" }));

    let mut s = script(&handle);
    assert!(s.tick(&frame(1, 0.1, 0.1)).is_err());
    assert!(s.is_runnable(), "budget overrun does not unload the script");
}

#[test]
fn eval_and_imports_are_unavailable() {
    let h = harness();
    let with_eval = h.add_script(h.player, json!({ "scriptCode": "let x = eval(\"40 + 2\");" }));
    assert!(script(&with_eval).script_instance().is_none());

    let other = h.scene.insert("Other");
    let with_import = h.add_script(other, json!({ "scriptCode": "import \"helpers\" as helpers;" }));
    assert!(script(&with_import).script_instance().is_none());
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[test]
fn store_capabilities_are_scoped_to_the_owner() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                fn start() {
                    addComponent("Tag", #{ label: "hi" });
                    this.variables.has = hasComponent("Tag");
                    this.variables.label = getComponent("Tag").label;
                    this.variables.missing = getComponent("Light") == ();
                }
            "#
        }),
    );

    let mut s = script(&handle);
    s.start(&frame(0, 0.0, 0.0)).unwrap();
    assert_eq!(s.variables()["has"], json!(true));
    assert_eq!(s.variables()["label"], json!("hi"));
    assert_eq!(s.variables()["missing"], json!(true));
    drop(s);

    assert!(h.store.has_component(h.player, "Tag"));
}

#[test]
fn unknown_component_type_is_a_hook_error() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "scriptCode": "fn start() { addComponent(\"Rigidbody\"); }" }),
    );
    assert!(script(&handle).start(&frame(0, 0.0, 0.0)).is_err());
}

#[test]
fn script_removing_itself_is_destroyed_after_the_hook() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "scriptCode": "fn update() { removeComponent(\"Script\"); }" }),
    );

    script(&handle).tick(&frame(1, 0.1, 0.1)).unwrap();
    assert!(!h.store.has_component(h.player, SCRIPT_COMPONENT));
    assert!(script(&handle).script_instance().is_some());

    assert_eq!(h.store.flush_deferred(), 1);
    assert!(script(&handle).script_instance().is_none());
}

#[test]
fn scene_capabilities() {
    let h = harness();
    h.scene.insert("Target");
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                fn start() {
                    let target = findObject("Target");
                    this.variables.target = target.id;
                    let made = createObject("sphere");
                    this.variables.made = made.id;
                    this.variables.destroyed = destroyObject(target.id);
                    this.variables.gone = findObject(target.id) == ();
                }
            "#
        }),
    );

    let mut s = script(&handle);
    s.start(&frame(0, 0.0, 0.0)).unwrap();
    assert_eq!(s.variables()["destroyed"], json!(true));
    assert_eq!(s.variables()["gone"], json!(true));
    let made = s.variables()["made"].as_u64().unwrap();
    assert!(h.scene.get_object(EntityId::from_raw(made)).is_some());
}

#[test]
fn bus_subscriptions_follow_the_instance() {
    let h = harness();
    let pongs = h.record("pong");
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                on("ping", |data| { emit("pong", #{ value: data.value + 1 }); });
            "#
        }),
    );
    assert_eq!(h.bus.listener_count("ping"), 1);

    h.bus.emit_custom("ping", json!({ "value": 1 }));
    assert!(pongs.borrow().is_empty(), "handlers wait for start");

    script(&handle).start(&frame(0, 0.0, 0.0)).unwrap();
    h.bus.emit_custom("ping", json!({ "value": 41 }));
    assert_eq!(*pongs.borrow(), vec![json!({ "value": 42 })]);

    script(&handle).stop(&frame(0, 0.0, 0.1)).unwrap();
    h.bus.emit_custom("ping", json!({ "value": 7 }));
    assert_eq!(pongs.borrow().len(), 1, "handlers are quiet once stopped");
    assert_eq!(h.bus.listener_count("ping"), 1);

    assert!(h.store.remove_component(h.player, SCRIPT_COMPONENT));
    assert_eq!(h.bus.listener_count("ping"), 0);
    drop(handle);
}

#[test]
fn session_subscriptions_end_with_the_session() {
    let h = harness();
    let pongs = h.record("pong");
    let handle = h.add_script(
        h.player,
        json!({ "scriptCode": r#"fn start() { on("ping", |d| emit("pong")); }"# }),
    );

    for session in 0..3 {
        script(&handle).start(&frame(0, 0.0, 0.0)).unwrap();
        assert_eq!(h.bus.listener_count("ping"), 1, "session {session}");
        script(&handle).stop(&frame(0, 0.0, 0.1)).unwrap();
        assert_eq!(h.bus.listener_count("ping"), 0, "session {session}");
    }

    h.bus.emit_custom("ping", json!(null));
    assert!(pongs.borrow().is_empty());

    script(&handle).start(&frame(0, 0.0, 0.0)).unwrap();
    h.bus.emit_custom("ping", json!(null));
    assert_eq!(pongs.borrow().len(), 1);
}

#[test]
fn self_emitting_handler_is_cut_off() {
    let h = harness_with(ScriptConfig {
        max_event_depth: 4,
        ..ScriptConfig::default()
    });
    let pings = h.record("ping");
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                fn start() { on("ping", |d| emit("ping")); }
                fn update() { emit("ping"); this.variables.ticks = (this.variables.ticks ?? 0) + 1; }
            "#
        }),
    );

    let mut s = script(&handle);
    s.tick(&frame(1, 0.1, 0.1)).unwrap();
    // The hook's emit plus one per permitted handler level.
    assert_eq!(pings.borrow().len(), 5);

    s.tick(&frame(2, 0.1, 0.2)).unwrap();
    assert_eq!(pings.borrow().len(), 10);
    assert_eq!(s.variables()["ticks"], json!(2));
}

#[test]
fn print_and_log_do_not_fail() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({
            "scriptCode": r#"
                fn start() {
                    print("printed");
                    debug(this.entity);
                    log("value: " + 1);
                    warn(2);
                    error("careful");
                }
            "#
        }),
    );
    script(&handle).start(&frame(0, 0.0, 0.0)).unwrap();
}

// ---------------------------------------------------------------------------
// Recompilation and templates
// ---------------------------------------------------------------------------

#[test]
fn recompile_runs_on_destroy_only_for_started_instances() {
    let h = harness();
    let destroyed = h.record("destroyed");
    let code = r#"fn onDestroy() { emit("destroyed"); }"#;
    let handle = h.add_script(h.player, json!({ "scriptCode": code }));

    let mut s = script(&handle);
    s.set_script_code(code);
    assert_eq!(destroyed.borrow().len(), 0, "never started, so no onDestroy");

    s.start(&frame(0, 0.0, 0.0)).unwrap();
    s.set_script_code("fn update() { this.variables.v2 = true; }");
    assert_eq!(destroyed.borrow().len(), 1);
    assert!(!s.is_started(), "new instance waits for its own start");

    s.tick(&frame(1, 0.1, 0.1)).unwrap();
    assert_eq!(s.variables()["v2"], json!(true));
}

#[test]
fn empty_code_falls_back_to_named_template() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "scriptName": "Rotator", "variables": { "speed": 2.0 } }),
    );

    let mut s = script(&handle);
    assert!(s.script_instance().is_some());
    s.tick(&frame(1, 0.5, 0.5)).unwrap();
    assert_eq!(h.scene.transform(h.player).rotation.y, 1.0);

    s.set_script_name("NoSuchTemplate");
    assert!(s.script_instance().is_none());
    assert!(s.last_error().is_none());
}

#[test]
fn serialize_round_trips_through_add_component() {
    let h = harness();
    let handle = h.add_script(
        h.player,
        json!({ "scriptName": "Pulse", "enabled": false, "variables": { "amount": 0.5 } }),
    );
    let saved = handle.borrow().serialize().unwrap();
    assert_eq!(
        saved,
        json!({
            "scriptName": "Pulse",
            "scriptCode": "",
            "enabled": false,
            "variables": { "amount": 0.5 }
        })
    );

    let mut expected = ScriptData::from_template("Pulse");
    expected.enabled = false;
    expected.variables.insert("amount".to_owned(), json!(0.5));
    assert_eq!(script(&handle).data(), &expected);

    let other = h.scene.insert("Copy");
    let copy = h.add_script(other, saved);
    assert_eq!(script(&copy).data(), script(&handle).data());
}

#[test]
fn invalid_init_data_is_rejected() {
    let h = harness();
    let err = h
        .store
        .add_component(h.player, SCRIPT_COMPONENT, &json!({ "enabled": "yes" }))
        .unwrap_err();
    assert!(matches!(err, EcsError::ComponentInit { .. }));
}
