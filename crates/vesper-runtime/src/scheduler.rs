//! Per-frame update scheduler.
//!
//! The [`UpdateScheduler`] is ticked once per host frame. Each tick:
//!
//! 1. Delta time is measured against the previous tick (the first tick of a
//!    scheduler reports `0`), then clamped to `max_delta_seconds` if set.
//! 2. One [`FrameContext`] is built and shared by every component.
//! 3. Every stored component is visited in entity order, then insertion
//!    order. Script behaviours are ticked only while playing; every other
//!    component is updated in all modes.
//! 4. Destroys deferred by removals during the pass are flushed.
//!
//! A failing component is logged with its entity and type and counted; the
//! pass continues with the next component.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use vesper_ecs::prelude::*;
//! use vesper_runtime::clock::{ManualTimeSource, PlaybackClock};
//! use vesper_runtime::scheduler::UpdateScheduler;
//!
//! let time = ManualTimeSource::new();
//! let store = ComponentStore::new(EventBus::new());
//! let clock = PlaybackClock::new(Rc::new(time.clone()));
//! let mut scheduler = UpdateScheduler::new(Rc::new(time.clone()), None);
//!
//! scheduler.tick(&store, &clock);
//! time.advance(16.0);
//! let report = scheduler.tick(&store, &clock);
//!
//! assert_eq!(report.tick, 2);
//! assert_eq!(report.delta_time, 0.016);
//! ```

use std::rc::Rc;
use std::time::{Duration, Instant};

use vesper_ecs::component::{ComponentHandle, FrameContext, PlaybackMode};
use vesper_ecs::store::ComponentStore;

use crate::clock::{PlaybackClock, TimeSource};

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// Diagnostics for the last tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// 1-based tick number.
    pub tick: u64,
    /// Seconds handed to components as `deltaTime`.
    pub delta_time: f64,
    /// Playback clock elapsed seconds at the start of the tick.
    pub time: f64,
    pub mode: PlaybackMode,
    /// Components whose update or tick ran to completion.
    pub updated: usize,
    /// Components not visited: scripts outside of play, components busy in
    /// their own hook, or components removed earlier in the same pass.
    pub skipped: usize,
    /// Components whose update returned an error.
    pub errors: usize,
    /// Wall-clock time spent in the pass, including the deferred flush.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// UpdateScheduler
// ---------------------------------------------------------------------------

pub struct UpdateScheduler {
    /// Time source used to measure delta time between ticks.
    source: Rc<dyn TimeSource>,
    /// Reading of `source` at the previous tick.
    last_tick_ms: Option<f64>,
    tick_counter: u64,
    /// Upper bound for a single tick's delta, in seconds.
    max_delta_seconds: Option<f64>,
    last_report: TickReport,
}

impl UpdateScheduler {
    pub fn new(source: Rc<dyn TimeSource>, max_delta_seconds: Option<f64>) -> Self {
        Self {
            source,
            last_tick_ms: None,
            tick_counter: 0,
            max_delta_seconds: max_delta_seconds.filter(|max| max.is_finite() && *max >= 0.0),
            last_report: TickReport::default(),
        }
    }

    /// Number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    pub fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    /// Run one update pass over every component in `store`.
    pub fn tick(&mut self, store: &ComponentStore, clock: &PlaybackClock) -> &TickReport {
        let started = Instant::now();
        let frame = self.next_frame(clock);

        let mut report = TickReport {
            tick: frame.tick,
            delta_time: frame.delta_time,
            time: frame.time,
            mode: frame.mode,
            ..TickReport::default()
        };

        for handle in store.snapshot() {
            if !still_attached(store, &handle) {
                report.skipped += 1;
                continue;
            }
            let Some(mut component) = handle.try_borrow_mut() else {
                tracing::debug!(
                    entity = %handle.entity(),
                    type_name = handle.type_name(),
                    "component busy; skipping update"
                );
                report.skipped += 1;
                continue;
            };

            let result = match component.behaviour_mut() {
                Some(behaviour) if frame.mode == PlaybackMode::Playing => behaviour.tick(&frame),
                Some(_) => {
                    report.skipped += 1;
                    continue;
                }
                None => component.update(&frame),
            };
            drop(component);

            match result {
                Ok(()) => report.updated += 1,
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(
                        entity = %handle.entity(),
                        type_name = handle.type_name(),
                        tick = frame.tick,
                        error = %err,
                        "component update failed"
                    );
                }
            }
        }

        let flushed = store.flush_deferred();
        if flushed > 0 {
            tracing::debug!(flushed, "deferred destroys flushed");
        }

        report.duration = started.elapsed();
        tracing::trace!(
            tick = report.tick,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors,
            "tick complete"
        );
        self.last_report = report;
        &self.last_report
    }

    fn next_frame(&mut self, clock: &PlaybackClock) -> FrameContext {
        let now = self.source.now_ms();
        let mut delta_time = self
            .last_tick_ms
            .map_or(0.0, |last| ((now - last) / 1000.0).max(0.0));
        self.last_tick_ms = Some(now);
        if let Some(max) = self.max_delta_seconds {
            delta_time = delta_time.min(max);
        }
        self.tick_counter += 1;

        FrameContext {
            delta_time,
            time: clock.elapsed(),
            mode: clock.mode(),
            tick: self.tick_counter,
        }
    }
}

/// Removal during a pass takes effect for components not yet visited.
fn still_attached(store: &ComponentStore, handle: &ComponentHandle) -> bool {
    store
        .get_component(handle.entity(), handle.type_name())
        .is_some_and(|current| Rc::ptr_eq(&current, handle))
}

impl std::fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("tick_counter", &self.tick_counter)
            .field("last_tick_ms", &self.last_tick_ms)
            .field("max_delta_seconds", &self.max_delta_seconds)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
