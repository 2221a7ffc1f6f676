//! Vesper Runtime -- playback, scheduling and built-in components.
//!
//! This crate wires the store from `vesper-ecs` and the script sandbox from
//! `vesper-script` into a playable runtime:
//!
//! - **[`PlaybackClock`](clock::PlaybackClock)**: the
//!   `stopped | playing | paused` state machine and pause-excluding elapsed
//!   time.
//! - **[`UpdateScheduler`](scheduler::UpdateScheduler)**: one pass over every
//!   component per host frame, with per-component error isolation.
//! - **[`Collider`](components::Collider) / [`Light`](components::Light)**:
//!   descriptor components that mirror a helper object in the scene.
//! - **[`MemoryScene`](scene::MemoryScene)**: a headless [`SceneHost`]
//!   implementation.
//! - **[`Runtime`](runtime::Runtime)**: the facade a host drives.
//!
//! # Quick Start
//!
//! ```
//! use std::rc::Rc;
//! use vesper_runtime::prelude::*;
//!
//! let bus = EventBus::new();
//! let scene = Rc::new(MemoryScene::new(bus.clone()));
//! let cube = scene.spawn("cube", "Cube");
//!
//! let mut runtime = Runtime::new(RuntimeConfig::default(), bus, scene).unwrap();
//! runtime
//!     .add_component(cube.id, "Script", &serde_json::json!({ "scriptName": "Rotator" }))
//!     .unwrap();
//!
//! runtime.play().unwrap();
//! runtime.tick();
//! runtime.stop();
//! ```
//!
//! [`SceneHost`]: vesper_ecs::scene::SceneHost

#![deny(unsafe_code)]

pub mod clock;
pub mod components;
pub mod config;
pub mod logging;
pub mod runtime;
pub mod scene;
pub mod scheduler;

use vesper_ecs::component::PlaybackMode;
use vesper_ecs::EcsError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Rejected playback transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: PlaybackMode,
        action: &'static str,
    },
}

/// Errors surfaced by the runtime facade.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Ecs(#[from] EcsError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// A built-in component type could not be registered. The runtime is
    /// unusable without it.
    #[error("failed to register built-in component '{name}': {source}")]
    BuiltinRegistration {
        name: &'static str,
        #[source]
        source: EcsError,
    },

    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::clock::{ManualTimeSource, PlaybackClock, SystemTimeSource, TimeSource};
    pub use crate::components::{
        Collider, ColliderData, ColliderShape, Light, LightData, LightType, COLLIDER_COMPONENT,
        LIGHT_COMPONENT,
    };
    pub use crate::config::RuntimeConfig;
    pub use crate::runtime::Runtime;
    pub use crate::scene::MemoryScene;
    pub use crate::scheduler::{TickReport, UpdateScheduler};
    pub use crate::{PlaybackError, RuntimeError};
    pub use vesper_ecs::prelude::*;
    pub use vesper_script::prelude::*;
}
