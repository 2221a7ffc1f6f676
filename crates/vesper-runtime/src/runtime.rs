//! The runtime facade.
//!
//! [`Runtime`] owns the component store, the playback clock and the update
//! scheduler, registers the built-in component types, and keeps the store in
//! step with the scene: when the scene announces that an object was deleted,
//! every component of that object is removed.
//!
//! A host drives it with `play` / `pause` / `stop` and one `tick` per frame.

use std::rc::Rc;

use vesper_ecs::bus::{EventBus, SubscriptionId, OBJECT_CREATED, OBJECT_DELETED};
use vesper_ecs::component::{
    Component, ComponentHandle, ComponentTypeId, FrameContext, PlaybackMode, ScriptBehaviour,
};
use vesper_ecs::entity::EntityId;
use vesper_ecs::scene::SceneHost;
use vesper_ecs::store::{ComponentStore, SavedComponent};
use vesper_ecs::{ComponentError, EcsError};
use vesper_script::{script_factory, ScriptCompiler, ScriptServices, SCRIPT_COMPONENT};

use crate::clock::{PlaybackClock, SystemTimeSource, TimeSource};
use crate::components::{collider_factory, light_factory, COLLIDER_COMPONENT, LIGHT_COMPONENT};
use crate::config::RuntimeConfig;
use crate::scene::MemoryScene;
use crate::scheduler::{TickReport, UpdateScheduler};
use crate::RuntimeError;

pub struct Runtime {
    config: RuntimeConfig,
    bus: EventBus,
    store: Rc<ComponentStore>,
    scene: Rc<dyn SceneHost>,
    clock: PlaybackClock,
    scheduler: UpdateScheduler,
    /// Scene lifetime listeners, removed on drop.
    subscriptions: Vec<SubscriptionId>,
}

impl Runtime {
    /// Build a runtime on the wall clock. `scene` must announce its objects
    /// on `bus`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::BuiltinRegistration`] if a built-in component type
    /// cannot be registered.
    pub fn new(
        config: RuntimeConfig,
        bus: EventBus,
        scene: Rc<dyn SceneHost>,
    ) -> Result<Self, RuntimeError> {
        Self::with_time_source(config, bus, scene, Rc::new(SystemTimeSource::new()))
    }

    /// Build a runtime whose clock and scheduler read `time`.
    pub fn with_time_source(
        config: RuntimeConfig,
        bus: EventBus,
        scene: Rc<dyn SceneHost>,
        time: Rc<dyn TimeSource>,
    ) -> Result<Self, RuntimeError> {
        let store = Rc::new(ComponentStore::new(bus.clone()));

        let services = ScriptServices {
            compiler: Rc::new(ScriptCompiler::new(config.script.clone())),
            store: Rc::downgrade(&store),
            scene: Rc::clone(&scene),
            bus: bus.clone(),
        };
        register_builtin(&store, SCRIPT_COMPONENT, script_factory(services))?;
        register_builtin(&store, COLLIDER_COMPONENT, collider_factory(Rc::clone(&scene)))?;
        register_builtin(&store, LIGHT_COMPONENT, light_factory(Rc::clone(&scene)))?;

        let subscriptions = vec![
            bus.on(OBJECT_CREATED, |event| {
                tracing::trace!(entity = ?event.entity(), "scene object created");
                Ok(())
            }),
            {
                let store = Rc::downgrade(&store);
                bus.on(OBJECT_DELETED, move |event| {
                    let (Some(store), Some(entity)) = (store.upgrade(), event.entity()) else {
                        return Ok(());
                    };
                    let removed = store.remove_all_components(entity);
                    if removed > 0 {
                        tracing::debug!(%entity, removed, "components removed with scene object");
                    }
                    Ok(())
                })
            },
        ];

        tracing::info!(
            types = ?store.registered_types(),
            max_delta_seconds = ?config.max_delta_seconds,
            "runtime initialized"
        );

        Ok(Self {
            clock: PlaybackClock::new(Rc::clone(&time)),
            scheduler: UpdateScheduler::new(time, config.max_delta_seconds),
            config,
            bus,
            store,
            scene,
            subscriptions,
        })
    }

    /// A runtime over a fresh [`MemoryScene`], for hosting without an editor.
    pub fn headless(config: RuntimeConfig) -> Result<(Self, Rc<MemoryScene>), RuntimeError> {
        let bus = EventBus::new();
        let scene = Rc::new(MemoryScene::new(bus.clone()));
        let runtime = Self::new(config, bus, Rc::clone(&scene) as Rc<dyn SceneHost>)?;
        Ok((runtime, scene))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Rc<ComponentStore> {
        &self.store
    }

    pub fn scene(&self) -> &Rc<dyn SceneHost> {
        &self.scene
    }

    // -- playback ------------------------------------------------------------

    pub fn mode(&self) -> PlaybackMode {
        self.clock.mode()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Script-visible elapsed seconds.
    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    /// Start playback, or resume it when paused.
    ///
    /// Starting from Stopped calls `start` on every runnable script. Hook
    /// failures are logged and reported on the bus, never returned.
    pub fn play(&mut self) -> Result<(), RuntimeError> {
        match self.clock.mode() {
            PlaybackMode::Stopped => {
                self.clock.play()?;
                let frame = FrameContext::lifecycle(self.clock.elapsed(), PlaybackMode::Playing);
                let started = self.run_lifecycle("start", &frame, |behaviour, frame| {
                    if behaviour.is_runnable() {
                        behaviour.start(frame)
                    } else {
                        Ok(())
                    }
                });
                tracing::info!(scripts = started, "playback started");
            }
            PlaybackMode::Paused => {
                self.clock.resume()?;
                tracing::info!(elapsed = self.clock.elapsed(), "playback resumed");
            }
            PlaybackMode::Playing => {}
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`PlaybackError::InvalidTransition`](crate::PlaybackError) when stopped.
    pub fn pause(&mut self) -> Result<(), RuntimeError> {
        if self.clock.mode() == PlaybackMode::Playing {
            tracing::info!(elapsed = self.clock.elapsed(), "playback paused");
        }
        Ok(self.clock.pause()?)
    }

    pub fn resume(&mut self) -> Result<(), RuntimeError> {
        Ok(self.clock.resume()?)
    }

    /// End the session: `onDestroy` for every started script, then reset
    /// the clock. A no-op when already stopped.
    pub fn stop(&mut self) {
        if self.clock.mode() == PlaybackMode::Stopped {
            return;
        }
        let frame = FrameContext::lifecycle(self.clock.elapsed(), self.clock.mode());
        let stopped = self.run_lifecycle("onDestroy", &frame, |behaviour, frame| {
            behaviour.stop(frame)
        });
        self.clock.stop();
        tracing::info!(scripts = stopped, "playback stopped");
    }

    /// Run one update pass. Call once per host frame.
    pub fn tick(&mut self) -> &TickReport {
        self.scheduler.tick(&self.store, &self.clock)
    }

    pub fn last_report(&self) -> &TickReport {
        self.scheduler.last_report()
    }

    pub fn tick_count(&self) -> u64 {
        self.scheduler.tick_count()
    }

    /// Call `hook` on every script behaviour. Returns how many were visited.
    fn run_lifecycle(
        &self,
        hook: &'static str,
        frame: &FrameContext,
        call: impl Fn(&mut dyn ScriptBehaviour, &FrameContext) -> Result<(), ComponentError>,
    ) -> usize {
        let mut visited = 0;
        for handle in self.store.snapshot() {
            let Some(mut component) = handle.try_borrow_mut() else {
                tracing::debug!(entity = %handle.entity(), type_name = handle.type_name(), hook, "component busy; skipped");
                continue;
            };
            let Some(behaviour) = component.behaviour_mut() else {
                continue;
            };
            let result = call(behaviour, frame);
            drop(component);

            visited += 1;
            if let Err(err) = result {
                tracing::warn!(
                    entity = %handle.entity(),
                    type_name = handle.type_name(),
                    hook,
                    error = %err,
                    "lifecycle hook failed"
                );
            }
        }
        visited
    }

    // -- components ----------------------------------------------------------

    /// Register an additional component type.
    pub fn register_component<F>(&self, name: &str, factory: F) -> Result<ComponentTypeId, RuntimeError>
    where
        F: Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError>
            + 'static,
    {
        Ok(self.store.register(name, factory)?)
    }

    pub fn add_component(
        &self,
        entity: EntityId,
        type_name: &str,
        data: &serde_json::Value,
    ) -> Result<ComponentHandle, RuntimeError> {
        Ok(self.store.add_component(entity, type_name, data)?)
    }

    pub fn remove_component(&self, entity: EntityId, type_name: &str) -> bool {
        self.store.remove_component(entity, type_name)
    }

    pub fn remove_all_components(&self, entity: EntityId) -> usize {
        self.store.remove_all_components(entity)
    }

    pub fn get_component(&self, entity: EntityId, type_name: &str) -> Option<ComponentHandle> {
        self.store.get_component(entity, type_name)
    }

    pub fn get_components(&self, entity: EntityId) -> Vec<ComponentHandle> {
        self.store.get_components(entity)
    }

    pub fn has_component(&self, entity: EntityId, type_name: &str) -> bool {
        self.store.has_component(entity, type_name)
    }

    pub fn serialize_entity(&self, entity: EntityId) -> Vec<SavedComponent> {
        self.store.serialize_entity(entity)
    }

    pub fn restore_entity(
        &self,
        entity: EntityId,
        saved: &[SavedComponent],
    ) -> Result<Vec<ComponentHandle>, RuntimeError> {
        Ok(self.store.restore_entity(entity, saved)?)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.off(id);
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("clock", &self.clock)
            .field("scheduler", &self.scheduler)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn register_builtin<F>(store: &ComponentStore, name: &'static str, factory: F) -> Result<(), RuntimeError>
where
    F: Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError> + 'static,
{
    store
        .register(name, factory)
        .map(|_| ())
        .map_err(|source: EcsError| {
            tracing::error!(type_name = name, error = %source, "built-in component registration failed");
            RuntimeError::BuiltinRegistration { name, source }
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
