//! Compiled script instances.
//!
//! A [`ScriptInstance`] owns one engine, its AST and the `this` map the hooks
//! run against. Hooks are invoked with `this` bound to that map, so state a
//! script stores on `this` survives between calls. Before each call the host
//! refreshes `entity`, `name`, `time` and `variables`; after it, `variables`
//! and any `gameObject` transform edits are copied back out.
//!
//! `gameObject`, `time` and `variables` are stored as shared values so the
//! bare names resolved by the engine alias the `this` fields.

use std::fmt;
use std::rc::Rc;

use rhai::{CallFnOptions, Dynamic, Engine, Map, Scope, AST, INT};

use vesper_ecs::component::FrameContext;
use vesper_ecs::entity::EntityId;
use vesper_ecs::scene::Transform;

use crate::context::{transform_from_dynamic, ScriptBindings};
use crate::ScriptError;

/// Script-side map of user variables.
pub type Variables = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Start,
    Update,
    OnDestroy,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::Start => "start",
            Hook::Update => "update",
            Hook::OnDestroy => "onDestroy",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct HookSet {
    pub start: bool,
    pub on_destroy: bool,
    /// Parameter count of `update`, if defined.
    pub update_arity: Option<usize>,
}

// ---------------------------------------------------------------------------
// ScriptVm
// ---------------------------------------------------------------------------

/// Engine and AST of one compiled script. Shared with the script's event
/// callbacks, which hold it weakly.
pub struct ScriptVm {
    engine: Engine,
    ast: AST,
}

impl ScriptVm {
    pub(crate) fn new(engine: Engine, ast: AST) -> Self {
        Self { engine, ast }
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

// ---------------------------------------------------------------------------
// ScriptInstance
// ---------------------------------------------------------------------------

pub struct ScriptInstance {
    name: String,
    vm: Rc<ScriptVm>,
    scope: Scope<'static>,
    /// Bound as `this` for every hook call.
    context: Dynamic,
    hooks: HookSet,
    started: bool,
    /// Transform handed to the script with the last `gameObject` refresh.
    synced_transform: Option<Transform>,
    bindings: Rc<ScriptBindings>,
}

impl ScriptInstance {
    pub(crate) fn new(
        name: &str,
        vm: Rc<ScriptVm>,
        hooks: HookSet,
        bindings: Rc<ScriptBindings>,
    ) -> Self {
        let mut instance = Self {
            name: name.to_owned(),
            vm,
            scope: Scope::new(),
            context: Dynamic::from_map(Map::new()),
            hooks,
            started: false,
            synced_transform: None,
            bindings,
        };
        instance.reset_context();
        instance
    }

    fn reset_context(&mut self) {
        let mut map = Map::new();
        map.insert("variables".into(), Dynamic::from_map(Map::new()));
        map.insert("time".into(), time_value(0.0, 0.0).into_shared());
        self.context = Dynamic::from_map(map);
        self.refresh_game_object();
    }

    pub(crate) fn run_top_level(&mut self) -> Result<(), String> {
        let vm = Rc::clone(&self.vm);
        vm.engine
            .run_ast_with_scope(&mut self.scope, &vm.ast)
            .map_err(|e| e.to_string())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self) -> EntityId {
        self.bindings.entity()
    }

    pub fn has_hook(&self, hook: Hook) -> bool {
        match hook {
            Hook::Start => self.hooks.start,
            Hook::Update => self.hooks.update_arity.is_some(),
            Hook::OnDestroy => self.hooks.on_destroy,
        }
    }

    /// `start` has run and `onDestroy` has not run since.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Number of live bus subscriptions made with `on`.
    pub fn subscription_count(&self) -> usize {
        self.bindings.subscription_count()
    }

    /// The current `this` map, for inspection.
    pub fn context(&self) -> &Dynamic {
        &self.context
    }

    /// Run `start`. The instance counts as started even if the hook fails.
    pub fn start(
        &mut self,
        frame: &FrameContext,
        variables: &mut Variables,
    ) -> Result<(), ScriptError> {
        self.started = true;
        self.bindings.begin_session();
        self.refresh_game_object();
        self.invoke(Hook::Start, frame, variables)
    }

    /// Run `update`, refreshing `gameObject` from the scene first.
    pub fn update(
        &mut self,
        frame: &FrameContext,
        variables: &mut Variables,
    ) -> Result<(), ScriptError> {
        if !self.has_hook(Hook::Update) {
            return Ok(());
        }
        self.refresh_game_object();
        self.invoke(Hook::Update, frame, variables)
    }

    /// Run `onDestroy` if the instance was started, then end the session:
    /// handlers registered with `on` since `start` are dropped and the rest
    /// go quiet. A second call without an intervening `start` does nothing.
    pub fn on_destroy(
        &mut self,
        frame: &FrameContext,
        variables: &mut Variables,
    ) -> Result<(), ScriptError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        let result = self.invoke(Hook::OnDestroy, frame, variables);
        self.bindings.end_session();
        result
    }

    fn refresh_game_object(&mut self) {
        let (object, transform) = self.bindings.fetch_game_object();
        self.synced_transform = transform;
        // `()` stays unshared so `gameObject == ()` compares directly.
        let object = if object.is_unit() {
            object
        } else {
            object.into_shared()
        };
        if let Some(mut map) = self.context.write_lock::<Map>() {
            map.insert("gameObject".into(), object);
        }
    }

    fn invoke(
        &mut self,
        hook: Hook,
        frame: &FrameContext,
        variables: &mut Variables,
    ) -> Result<(), ScriptError> {
        if !self.has_hook(hook) {
            return Ok(());
        }
        self.prepare(frame, variables)
            .map_err(|message| self.runtime_error(hook, message))?;

        let vm = Rc::clone(&self.vm);
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut self.context);
        let result = match (hook, self.hooks.update_arity) {
            (Hook::Update, Some(1)) => vm.engine.call_fn_with_options::<Dynamic>(
                options,
                &mut self.scope,
                &vm.ast,
                hook.as_str(),
                (frame.delta_time,),
            ),
            _ => vm.engine.call_fn_with_options::<Dynamic>(
                options,
                &mut self.scope,
                &vm.ast,
                hook.as_str(),
                (),
            ),
        };

        // Whatever the hook managed to change before failing is kept.
        self.collect(variables);
        result
            .map(|_| ())
            .map_err(|e| self.runtime_error(hook, e.to_string()))
    }

    /// Copy host state into `this`.
    fn prepare(&mut self, frame: &FrameContext, variables: &Variables) -> Result<(), String> {
        if !self.context.is_map() {
            tracing::warn!(script = %self.name, "`this` was replaced by the script; resetting");
            self.reset_context();
        }
        let vars = rhai::serde::to_dynamic(variables).map_err(|e| e.to_string())?;
        let mut map = self
            .context
            .write_lock::<Map>()
            .ok_or_else(|| "script context is not a map".to_owned())?;
        map.insert(
            "entity".into(),
            Dynamic::from_int(self.bindings.entity().to_raw() as INT),
        );
        map.insert("name".into(), Dynamic::from(self.bindings.script().to_owned()));
        map.insert(
            "time".into(),
            time_value(frame.delta_time, frame.time).into_shared(),
        );
        map.insert("variables".into(), vars.into_shared());
        Ok(())
    }

    /// Copy `this.variables` and `gameObject` edits back to the host.
    fn collect(&mut self, variables: &mut Variables) {
        let (vars, object) = match self.context.read_lock::<Map>() {
            Some(map) => (map.get("variables").cloned(), map.get("gameObject").cloned()),
            None => return,
        };

        match vars.map(|v| rhai::serde::from_dynamic::<serde_json::Value>(&v.flatten_clone())) {
            Some(Ok(serde_json::Value::Object(updated))) => *variables = updated,
            Some(Ok(_)) => {
                tracing::warn!(script = %self.name, "`variables` is no longer a map; change discarded");
            }
            Some(Err(e)) => {
                tracing::warn!(script = %self.name, error = %e, "`variables` holds values that cannot be stored");
            }
            None => {}
        }

        let entity = self.bindings.entity();
        if let Some(transform) = object.as_ref().and_then(transform_from_dynamic) {
            if self.synced_transform.is_some_and(|synced| synced != transform)
                && self.bindings.scene.set_transform(entity, &transform)
            {
                self.synced_transform = Some(transform);
            }
        }
    }

    fn runtime_error(&self, hook: Hook, message: String) -> ScriptError {
        ScriptError::Runtime {
            entity: self.bindings.entity(),
            hook: hook.as_str().to_owned(),
            message,
        }
    }
}

fn time_value(delta_time: f64, time: f64) -> Dynamic {
    let mut map = Map::new();
    map.insert("deltaTime".into(), Dynamic::from_float(delta_time));
    map.insert("time".into(), Dynamic::from_float(time));
    Dynamic::from_map(map)
}

impl Drop for ScriptInstance {
    fn drop(&mut self) {
        self.bindings.unsubscribe_all();
    }
}

impl fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("name", &self.name)
            .field("entity", &self.bindings.entity())
            .field("hooks", &self.hooks)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
