//! Vesper Script -- sandboxed behaviour scripts for Vesper components.
//!
//! User scripts are [Rhai](https://rhai.rs) text defining any of three hooks:
//!
//! ```text
//! fn start() { log("hello from " + this.name); }
//! fn update(dt) { variables.count = (variables.count ?? 0) + 1; }
//! fn onDestroy() { emit("gone", #{ entity: this.entity }); }
//! ```
//!
//! # Architecture
//!
//! - **`ScriptCompiler`**: builds one engine per script with execution
//!   budgets ([`ScriptConfig`]), resolves the hooks and runs top-level code.
//! - **`ScriptInstance`**: the compiled artifact; calls hooks with `this`
//!   bound to the capability context.
//! - **`ScriptComponent`**: the `Script` component that owns an instance and
//!   recompiles when its code or name changes.
//! - **`templates`**: built-in script texts selectable by name.
//!
//! # Capability context
//!
//! Inside a hook, `this` carries `entity`, `name`, `gameObject`, `time`
//! (`deltaTime`, `time`) and `variables`. The native functions
//! `getComponent`, `hasComponent`, `addComponent`, `removeComponent`,
//! `findObject`, `createObject`, `destroyObject`, `on`, `emit`, `log`,
//! `warn` and `error` are available everywhere. Module imports and `eval`
//! are disabled. The sandbox restricts capabilities cooperatively; it is not
//! a security boundary.

#![deny(unsafe_code)]

pub mod compiler;
pub mod component;
pub mod config;
pub mod context;
pub mod instance;
pub mod templates;

pub use compiler::ScriptCompiler;
pub use component::{script_factory, ScriptComponent, ScriptData, SCRIPT_COMPONENT};
pub use config::ScriptConfig;
pub use context::{ScriptBindings, ScriptServices};
pub use instance::{Hook, ScriptInstance, Variables};

use vesper_ecs::entity::EntityId;
use vesper_ecs::ComponentError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while compiling or running a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Parsing, hook resolution or top-level evaluation failed.
    #[error("failed to compile script '{script}': {message}")]
    Compile { script: String, message: String },

    /// A lifecycle hook raised an error or exceeded its budget.
    #[error("script hook '{hook}' failed on entity {entity}: {message}")]
    Runtime {
        entity: EntityId,
        hook: String,
        message: String,
    },
}

impl ScriptError {
    /// `"compile"` or the name of the failing hook.
    pub fn hook(&self) -> &str {
        match self {
            ScriptError::Compile { .. } => "compile",
            ScriptError::Runtime { hook, .. } => hook,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ScriptError::Compile { message, .. } | ScriptError::Runtime { message, .. } => message,
        }
    }
}

impl From<ScriptError> for ComponentError {
    fn from(e: ScriptError) -> Self {
        ComponentError::Hook {
            hook: e.hook().to_owned(),
            message: e.message().to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::templates::{template, template_names, templates, ScriptTemplate};
    pub use crate::{
        script_factory, Hook, ScriptBindings, ScriptCompiler, ScriptComponent, ScriptConfig,
        ScriptData, ScriptError, ScriptInstance, ScriptServices, Variables, SCRIPT_COMPONENT,
    };
}
