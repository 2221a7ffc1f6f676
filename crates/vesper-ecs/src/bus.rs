//! Synchronous publish/subscribe hub.
//!
//! The [`EventBus`] is a cheaply clonable handle; every clone dispatches to
//! the same listener table. Dispatch is synchronous and re-entrant: listeners
//! may subscribe, unsubscribe or emit while an event is being delivered. The
//! listener table is never borrowed while a listener runs.
//!
//! A listener that returns an error is logged and skipped; the remaining
//! listeners still receive the event.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::json;

use crate::component::ComponentHandle;
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub const OBJECT_CREATED: &str = "objectCreated";
pub const OBJECT_DELETED: &str = "objectDeleted";
pub const COMPONENT_ADDED: &str = "componentAdded";
pub const COMPONENT_REMOVED: &str = "componentRemoved";
pub const SCRIPT_ERROR: &str = "scriptError";

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Everything that travels over the bus.
#[derive(Debug, Clone)]
pub enum Event {
    /// The scene layer created an object.
    ObjectCreated { entity: EntityId },
    /// The scene layer deleted an object.
    ObjectDeleted { entity: EntityId },
    /// A component was attached to an entity.
    ComponentAdded {
        entity: EntityId,
        type_name: String,
        component: ComponentHandle,
    },
    /// A component was detached from an entity and destroyed.
    ComponentRemoved {
        entity: EntityId,
        type_name: String,
        component: ComponentHandle,
    },
    /// A script failed to compile or one of its hooks failed.
    ScriptError {
        entity: EntityId,
        script: String,
        hook: String,
        message: String,
    },
    /// A user-defined event (scripts emit these).
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

impl Event {
    pub fn custom(name: impl Into<String>, data: serde_json::Value) -> Self {
        Event::Custom {
            name: name.into(),
            data,
        }
    }

    /// The subscription key listeners register under.
    pub fn name(&self) -> &str {
        match self {
            Event::ObjectCreated { .. } => OBJECT_CREATED,
            Event::ObjectDeleted { .. } => OBJECT_DELETED,
            Event::ComponentAdded { .. } => COMPONENT_ADDED,
            Event::ComponentRemoved { .. } => COMPONENT_REMOVED,
            Event::ScriptError { .. } => SCRIPT_ERROR,
            Event::Custom { name, .. } => name,
        }
    }

    /// The entity the event concerns, if any.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Event::ObjectCreated { entity }
            | Event::ObjectDeleted { entity }
            | Event::ComponentAdded { entity, .. }
            | Event::ComponentRemoved { entity, .. }
            | Event::ScriptError { entity, .. } => Some(*entity),
            Event::Custom { .. } => None,
        }
    }

    /// JSON view of the event, used when handing it to scripts.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Event::ObjectCreated { entity } | Event::ObjectDeleted { entity } => {
                json!({ "entity": entity })
            }
            Event::ComponentAdded {
                entity, type_name, ..
            }
            | Event::ComponentRemoved {
                entity, type_name, ..
            } => json!({ "entity": entity, "type": type_name }),
            Event::ScriptError {
                entity,
                script,
                hook,
                message,
            } => json!({
                "entity": entity,
                "script": script,
                "hook": hook,
                "message": message,
            }),
            Event::Custom { data, .. } => data.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Handle returned by [`EventBus::on`] / [`EventBus::once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Rc<dyn Fn(&Event) -> anyhow::Result<()>>;

struct Listener {
    id: SubscriptionId,
    event: String,
    once: bool,
    callback: Callback,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    listeners: Vec<Listener>,
}

/// Shared, single-threaded event hub.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Rc<RefCell<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every future `event`.
    pub fn on<F>(&self, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        self.subscribe(event, false, Rc::new(callback))
    }

    /// Subscribe to the next `event` only.
    pub fn once<F>(&self, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        self.subscribe(event, true, Rc::new(callback))
    }

    fn subscribe(&self, event: &str, once: bool, callback: Callback) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.listeners.push(Listener {
            id,
            event: event.to_owned(),
            once,
            callback,
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != id);
        state.listeners.len() != before
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.state.borrow().listeners.iter().any(|l| l.id == id)
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.state
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.event == event)
            .count()
    }

    /// Deliver `event` to its listeners, in subscription order.
    ///
    /// Returns the number of listeners invoked (including ones that failed).
    pub fn emit(&self, event: &Event) -> usize {
        let name = event.name();
        let targets: Vec<(SubscriptionId, bool, Callback)> = {
            let mut state = self.state.borrow_mut();
            let targets = state
                .listeners
                .iter()
                .filter(|l| l.event == name)
                .map(|l| (l.id, l.once, Rc::clone(&l.callback)))
                .collect();
            state.listeners.retain(|l| !(l.once && l.event == name));
            targets
        };

        let mut delivered = 0;
        for (id, once, callback) in targets {
            // A listener removed by an earlier listener in this dispatch is skipped.
            if !once && !self.is_subscribed(id) {
                continue;
            }
            delivered += 1;
            if let Err(e) = callback(event) {
                tracing::warn!(event = name, error = %e, "event listener failed");
            }
        }
        delivered
    }

    /// Emit a [`Event::Custom`] event.
    pub fn emit_custom(&self, name: &str, data: serde_json::Value) -> usize {
        self.emit(&Event::custom(name, data))
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventBus")
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn persistent_listener_receives_every_event() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bus.on("ping", move |_| {
            h.set(h.get() + 1);
            Ok(())
        });

        bus.emit_custom("ping", json!(null));
        bus.emit_custom("ping", json!(null));
        bus.emit_custom("pong", json!(null));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn once_listener_fires_a_single_time() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bus.once("ping", move |_| {
            h.set(h.get() + 1);
            Ok(())
        });

        assert_eq!(bus.emit_custom("ping", json!(1)), 1);
        assert_eq!(bus.emit_custom("ping", json!(2)), 0);
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.listener_count("ping"), 0);
    }

    #[test]
    fn failing_listener_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&seen);
        bus.on("ping", move |_| {
            s.borrow_mut().push("first");
            anyhow::bail!("listener exploded")
        });
        let s = Rc::clone(&seen);
        bus.on("ping", move |_| {
            s.borrow_mut().push("second");
            Ok(())
        });

        assert_eq!(bus.emit_custom("ping", json!(null)), 2);
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn off_removes_subscription() {
        let bus = EventBus::new();
        let id = bus.on("ping", |_| Ok(()));
        assert!(bus.is_subscribed(id));
        assert!(bus.off(id));
        assert!(!bus.off(id));
        assert_eq!(bus.emit_custom("ping", json!(null)), 0);
    }

    #[test]
    fn listeners_may_emit_and_subscribe_during_dispatch() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));

        let inner_bus = bus.clone();
        let h = Rc::clone(&hits);
        bus.on("outer", move |_| {
            let h2 = Rc::clone(&h);
            inner_bus.on("inner", move |_| {
                h2.set(h2.get() + 1);
                Ok(())
            });
            inner_bus.emit_custom("inner", json!(null));
            Ok(())
        });

        bus.emit_custom("outer", json!(null));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn listener_removed_mid_dispatch_is_skipped() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let second: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));

        let b = bus.clone();
        let s = Rc::clone(&second);
        bus.on("ping", move |_| {
            if let Some(id) = s.get() {
                b.off(id);
            }
            Ok(())
        });
        let h = Rc::clone(&hits);
        let id = bus.on("ping", move |_| {
            h.set(h.get() + 1);
            Ok(())
        });
        second.set(Some(id));

        assert_eq!(bus.emit_custom("ping", json!(null)), 1);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn payload_exposes_custom_data_and_entity() {
        let custom = Event::custom("hit", json!({ "damage": 3 }));
        assert_eq!(custom.name(), "hit");
        assert_eq!(custom.payload(), json!({ "damage": 3 }));
        assert_eq!(custom.entity(), None);

        let deleted = Event::ObjectDeleted {
            entity: EntityId::from_raw(5),
        };
        assert_eq!(deleted.name(), OBJECT_DELETED);
        assert_eq!(deleted.payload(), json!({ "entity": 5 }));
    }
}
