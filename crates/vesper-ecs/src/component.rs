//! The component model: the [`Component`] trait, the script lifecycle
//! capability, per-tick frame data, and the shared [`ComponentCell`] that the
//! store hands out as a component reference.
//!
//! Components are dispatched on explicit data recorded at construction time
//! (the [`ComponentTypeId`] and type name stored in the cell, and the
//! [`Component::behaviour_mut`] capability), never by inspecting the concrete
//! Rust type behind the trait object.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::ComponentError;

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// PlaybackMode
// ---------------------------------------------------------------------------

/// The editor's playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackMode::Stopped => "stopped",
            PlaybackMode::Playing => "playing",
            PlaybackMode::Paused => "paused",
        }
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FrameContext
// ---------------------------------------------------------------------------

/// Timing data for one scheduler tick.
///
/// A single `FrameContext` is built per tick and handed to every component,
/// so all components of an entity observe the same `delta_time` and `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Real seconds since the previous tick.
    pub delta_time: f64,
    /// Playback clock elapsed seconds (pause time excluded, 0 when stopped).
    pub time: f64,
    /// Playback mode at the start of the tick.
    pub mode: PlaybackMode,
    /// Scheduler tick number (1-based; 0 outside of a tick).
    pub tick: u64,
}

impl FrameContext {
    /// A frame used for lifecycle calls made outside of a scheduler tick
    /// (`start` on play, `onDestroy` on stop).
    pub fn lifecycle(time: f64, mode: PlaybackMode) -> Self {
        Self {
            delta_time: 0.0,
            time,
            mode,
            tick: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Component / ScriptBehaviour
// ---------------------------------------------------------------------------

/// A typed, stateful module bound to exactly one entity.
///
/// All hooks are optional. `update` runs once per scheduler tick subject to
/// the playback rules; `destroy` runs exactly once when the store removes the
/// component; `serialize` produces the plain field mapping used for saving.
pub trait Component: Any {
    /// Per-tick update for non-script components. Runs in every playback mode.
    fn update(&mut self, _frame: &FrameContext) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Release any externally owned resources (scene proxies, script
    /// instances). Called exactly once by the store.
    fn destroy(&mut self) {}

    /// Public fields as a JSON object, if the component supports saving.
    fn serialize(&self) -> Option<serde_json::Value> {
        None
    }

    /// The script lifecycle, for components driven by user scripts.
    ///
    /// The scheduler only forwards ticks to a behaviour while playing; all
    /// other components get [`Component::update`] unconditionally.
    fn behaviour_mut(&mut self) -> Option<&mut dyn ScriptBehaviour> {
        None
    }

    fn behaviour(&self) -> Option<&dyn ScriptBehaviour> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Lifecycle of a script-driven component under the playback state machine.
pub trait ScriptBehaviour {
    /// Enabled and holding a compiled instance.
    fn is_runnable(&self) -> bool;

    /// `start` has run for the current playback session.
    fn is_started(&self) -> bool;

    /// Invoke the `start` hook. Called on the Stopped -> Playing transition.
    fn start(&mut self, frame: &FrameContext) -> Result<(), ComponentError>;

    /// Invoke the `update` hook. Only called while playing.
    fn tick(&mut self, frame: &FrameContext) -> Result<(), ComponentError>;

    /// Invoke the `onDestroy` hook if started. Called on transition to Stopped.
    fn stop(&mut self, frame: &FrameContext) -> Result<(), ComponentError>;
}

// ---------------------------------------------------------------------------
// ComponentCell
// ---------------------------------------------------------------------------

/// Shared reference to a stored component.
pub type ComponentHandle = Rc<ComponentCell>;

/// A component instance together with the identity recorded when it was
/// constructed.
pub struct ComponentCell {
    entity: EntityId,
    type_id: ComponentTypeId,
    type_name: String,
    is_script: bool,
    inner: RefCell<Box<dyn Component>>,
}

impl ComponentCell {
    pub fn new(
        entity: EntityId,
        type_id: ComponentTypeId,
        type_name: impl Into<String>,
        component: Box<dyn Component>,
    ) -> Self {
        Self {
            entity,
            type_id,
            type_name: type_name.into(),
            is_script: component.behaviour().is_some(),
            inner: RefCell::new(component),
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Shared borrow of the component.
    ///
    /// # Panics
    ///
    /// Panics if the component is currently mutably borrowed (its own hook is
    /// executing). Use [`try_borrow`](Self::try_borrow) from code that can run
    /// inside a hook.
    pub fn borrow(&self) -> Ref<'_, dyn Component> {
        Ref::map(self.inner.borrow(), |c| &**c)
    }

    /// Exclusive borrow of the component.
    ///
    /// # Panics
    ///
    /// Panics if the component is already borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, dyn Component> {
        RefMut::map(self.inner.borrow_mut(), |c| &mut **c)
    }

    pub fn try_borrow(&self) -> Option<Ref<'_, dyn Component>> {
        self.inner.try_borrow().ok().map(|r| Ref::map(r, |c| &**c))
    }

    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, dyn Component>> {
        self.inner
            .try_borrow_mut()
            .ok()
            .map(|r| RefMut::map(r, |c| &mut **c))
    }

    /// Borrow the component as its concrete type.
    pub fn downcast_ref<T: Component>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.inner.borrow(), |c| c.as_any().downcast_ref::<T>()).ok()
    }

    /// Mutably borrow the component as its concrete type.
    pub fn downcast_mut<T: Component>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.inner.borrow_mut(), |c| {
            c.as_any_mut().downcast_mut::<T>()
        })
        .ok()
    }

    /// Whether the component exposes a script lifecycle. Recorded at
    /// construction, so it holds while the component is borrowed.
    pub fn is_script(&self) -> bool {
        self.is_script
    }
}

impl fmt::Debug for ComponentCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCell")
            .field("entity", &self.entity)
            .field("type_id", &self.type_id)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
