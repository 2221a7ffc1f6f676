//! Playback clock and mode state machine.
//!
//! ```text
//! Stopped --play--> Playing --pause--> Paused --resume--> Playing
//!    ^                 |                  |
//!    +------stop-------+------stop--------+
//! ```
//!
//! Elapsed script time is `now - start - accumulated_pause`. It freezes while
//! paused, never decreases, and reads `0` when stopped.
//!
//! Time comes from a [`TimeSource`] so tests can drive the clock by hand.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use vesper_ecs::component::PlaybackMode;

use crate::PlaybackError;

// ---------------------------------------------------------------------------
// TimeSource
// ---------------------------------------------------------------------------

/// Monotonic milliseconds.
pub trait TimeSource {
    fn now_ms(&self) -> f64;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven time for tests and simulated waits. Clones share the same
/// reading.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Rc<Cell<f64>>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ms` (negative values are ignored).
    pub fn advance(&self, ms: f64) {
        if ms > 0.0 {
            self.now.set(self.now.get() + ms);
        }
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms.max(self.now.get()));
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

// ---------------------------------------------------------------------------
// PlaybackClock
// ---------------------------------------------------------------------------

pub struct PlaybackClock {
    source: Rc<dyn TimeSource>,
    mode: PlaybackMode,
    start_ms: f64,
    pause_ms: f64,
    accumulated_pause_ms: f64,
}

impl PlaybackClock {
    pub fn new(source: Rc<dyn TimeSource>) -> Self {
        Self {
            source,
            mode: PlaybackMode::Stopped,
            start_ms: 0.0,
            pause_ms: 0.0,
            accumulated_pause_ms: 0.0,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.mode == PlaybackMode::Playing
    }

    /// Stopped -> Playing. Repeating while playing is a no-op.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::InvalidTransition`] when paused; use
    /// [`resume`](Self::resume).
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        match self.mode {
            PlaybackMode::Stopped => {
                self.start_ms = self.source.now_ms();
                self.pause_ms = 0.0;
                self.accumulated_pause_ms = 0.0;
                self.transition(PlaybackMode::Playing);
                Ok(())
            }
            PlaybackMode::Playing => Ok(()),
            PlaybackMode::Paused => Err(PlaybackError::InvalidTransition {
                from: self.mode,
                action: "play",
            }),
        }
    }

    /// Playing -> Paused. Repeating while paused is a no-op.
    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        match self.mode {
            PlaybackMode::Playing => {
                self.pause_ms = self.source.now_ms();
                self.transition(PlaybackMode::Paused);
                Ok(())
            }
            PlaybackMode::Paused => Ok(()),
            PlaybackMode::Stopped => Err(PlaybackError::InvalidTransition {
                from: self.mode,
                action: "pause",
            }),
        }
    }

    /// Paused -> Playing, excluding the paused span from elapsed time.
    /// Repeating while playing is a no-op.
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        match self.mode {
            PlaybackMode::Paused => {
                let paused_for = (self.source.now_ms() - self.pause_ms).max(0.0);
                self.accumulated_pause_ms += paused_for;
                self.pause_ms = 0.0;
                self.transition(PlaybackMode::Playing);
                Ok(())
            }
            PlaybackMode::Playing => Ok(()),
            PlaybackMode::Stopped => Err(PlaybackError::InvalidTransition {
                from: self.mode,
                action: "resume",
            }),
        }
    }

    /// Any -> Stopped, zeroing every field.
    pub fn stop(&mut self) {
        self.start_ms = 0.0;
        self.pause_ms = 0.0;
        self.accumulated_pause_ms = 0.0;
        if self.mode != PlaybackMode::Stopped {
            self.transition(PlaybackMode::Stopped);
        }
    }

    /// Script-visible elapsed seconds.
    pub fn elapsed(&self) -> f64 {
        let reference = match self.mode {
            PlaybackMode::Stopped => return 0.0,
            PlaybackMode::Playing => self.source.now_ms(),
            PlaybackMode::Paused => self.pause_ms,
        };
        ((reference - self.start_ms - self.accumulated_pause_ms) / 1000.0).max(0.0)
    }

    /// Milliseconds spent paused during the current session.
    pub fn accumulated_pause_ms(&self) -> f64 {
        self.accumulated_pause_ms
    }

    fn transition(&mut self, to: PlaybackMode) {
        tracing::debug!(from = %self.mode, to = %to, "playback mode changed");
        self.mode = to;
    }
}

impl std::fmt::Debug for PlaybackClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackClock")
            .field("mode", &self.mode)
            .field("start_ms", &self.start_ms)
            .field("pause_ms", &self.pause_ms)
            .field("accumulated_pause_ms", &self.accumulated_pause_ms)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
