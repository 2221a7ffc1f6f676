//! The `Script` component.
//!
//! A [`ScriptComponent`] owns its compiled [`ScriptInstance`] exclusively.
//! Changing the code or the name recompiles synchronously; the previous
//! instance gets its `onDestroy` only if it had been started. A compilation
//! failure leaves the component inert: it logs, reports a `scriptError` event
//! and holds no instance.

use std::any::Any;

use serde::{Deserialize, Serialize};

use vesper_ecs::bus::Event;
use vesper_ecs::component::{Component, FrameContext, PlaybackMode, ScriptBehaviour};
use vesper_ecs::entity::EntityId;
use vesper_ecs::ComponentError;

use crate::context::{ScriptBindings, ScriptServices};
use crate::instance::{ScriptInstance, Variables};
use crate::templates;
use crate::ScriptError;

/// Registered type name of the script component.
pub const SCRIPT_COMPONENT: &str = "Script";

/// Saved / init form of a Script component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptData {
    pub script_name: String,
    pub script_code: String,
    pub enabled: bool,
    pub variables: Variables,
}

impl Default for ScriptData {
    fn default() -> Self {
        Self {
            script_name: String::new(),
            script_code: String::new(),
            enabled: true,
            variables: Variables::new(),
        }
    }
}

impl ScriptData {
    pub fn from_code(code: impl Into<String>) -> Self {
        Self {
            script_code: code.into(),
            ..Self::default()
        }
    }

    pub fn from_template(name: impl Into<String>) -> Self {
        Self {
            script_name: name.into(),
            ..Self::default()
        }
    }

    /// Source text to compile: the inline code, or the template named by
    /// `script_name` when the code is empty.
    pub fn source(&self) -> Option<&str> {
        if !self.script_code.trim().is_empty() {
            return Some(&self.script_code);
        }
        templates::template(&self.script_name).map(|t| t.code)
    }
}

// ---------------------------------------------------------------------------
// ScriptComponent
// ---------------------------------------------------------------------------

pub struct ScriptComponent {
    entity: EntityId,
    data: ScriptData,
    instance: Option<ScriptInstance>,
    last_error: Option<String>,
    /// Time and mode of the most recent hook call, reused for lifecycle
    /// calls made outside a tick.
    last_frame: FrameContext,
    services: ScriptServices,
}

impl ScriptComponent {
    /// Build the component and compile its source.
    pub fn new(entity: EntityId, data: ScriptData, services: ScriptServices) -> Self {
        let mut component = Self {
            entity,
            data,
            instance: None,
            last_error: None,
            last_frame: FrameContext::lifecycle(0.0, PlaybackMode::Stopped),
            services,
        };
        component.compile();
        component
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn data(&self) -> &ScriptData {
        &self.data
    }

    pub fn script_name(&self) -> &str {
        &self.data.script_name
    }

    pub fn script_code(&self) -> &str {
        &self.data.script_code
    }

    pub fn enabled(&self) -> bool {
        self.data.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.data.enabled = enabled;
    }

    pub fn variables(&self) -> &Variables {
        &self.data.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.data.variables
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.data.variables.insert(name.into(), value);
    }

    /// The compiled instance; `None` after a failed or empty compile.
    pub fn script_instance(&self) -> Option<&ScriptInstance> {
        self.instance.as_ref()
    }

    /// Message of the most recent compile or hook failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Replace the code and recompile.
    pub fn set_script_code(&mut self, code: impl Into<String>) {
        self.data.script_code = code.into();
        self.recompile();
    }

    /// Rename the script (switching template when the code is empty) and
    /// recompile.
    pub fn set_script_name(&mut self, name: impl Into<String>) {
        self.data.script_name = name.into();
        self.recompile();
    }

    fn display_name(&self) -> String {
        if self.data.script_name.is_empty() {
            format!("script@{}", self.entity)
        } else {
            self.data.script_name.clone()
        }
    }

    fn recompile(&mut self) {
        if let Some(mut previous) = self.instance.take() {
            let frame = self.last_frame;
            if let Err(err) = previous.on_destroy(&frame, &mut self.data.variables) {
                self.report(&err);
            }
        }
        self.compile();
    }

    fn compile(&mut self) {
        self.instance = None;
        self.last_error = None;

        let name = self.display_name();
        let Some(source) = self.data.source().map(str::to_owned) else {
            tracing::debug!(entity = %self.entity, script = %name, "no script source; component inert");
            return;
        };

        let bindings = ScriptBindings::new(self.entity, name.clone(), &self.services);
        match self.services.compiler.compile(&name, &source, bindings) {
            Ok(instance) => self.instance = Some(instance),
            Err(err) => self.report(&err),
        }
    }

    /// Log a script failure, remember it, and announce it on the bus.
    fn report(&mut self, err: &ScriptError) {
        let hook = err.hook();
        tracing::error!(entity = %self.entity, script = %self.display_name(), hook, "{err}");
        self.last_error = Some(err.to_string());
        self.services.bus.emit(&Event::ScriptError {
            entity: self.entity,
            script: self.display_name(),
            hook: hook.to_owned(),
            message: err.message().to_owned(),
        });
    }

    fn run(
        &mut self,
        frame: &FrameContext,
        call: impl FnOnce(&mut ScriptInstance, &FrameContext, &mut Variables) -> Result<(), ScriptError>,
    ) -> Result<(), ComponentError> {
        self.last_frame = *frame;
        let Some(instance) = self.instance.as_mut() else {
            return Ok(());
        };
        match call(instance, frame, &mut self.data.variables) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.report(&err);
                Err(err.into())
            }
        }
    }
}

impl Component for ScriptComponent {
    fn destroy(&mut self) {
        let frame = self.last_frame;
        if let Err(err) = self.run(&frame, |i, f, v| i.on_destroy(f, v)) {
            tracing::debug!(entity = %self.entity, error = %err, "onDestroy failed during removal");
        }
        self.instance = None;
    }

    fn serialize(&self) -> Option<serde_json::Value> {
        serde_json::to_value(&self.data).ok()
    }

    fn behaviour_mut(&mut self) -> Option<&mut dyn ScriptBehaviour> {
        Some(self)
    }

    fn behaviour(&self) -> Option<&dyn ScriptBehaviour> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ScriptBehaviour for ScriptComponent {
    fn is_runnable(&self) -> bool {
        self.data.enabled && self.instance.is_some()
    }

    fn is_started(&self) -> bool {
        self.instance.as_ref().is_some_and(ScriptInstance::is_started)
    }

    fn start(&mut self, frame: &FrameContext) -> Result<(), ComponentError> {
        if !self.is_runnable() || self.is_started() {
            return Ok(());
        }
        self.run(frame, |i, f, v| i.start(f, v))
    }

    /// Starts the script first if it joined a session already in progress.
    fn tick(&mut self, frame: &FrameContext) -> Result<(), ComponentError> {
        if !self.is_runnable() {
            return Ok(());
        }
        if !self.is_started() {
            self.start(frame)?;
        }
        self.run(frame, |i, f, v| i.update(f, v))
    }

    fn stop(&mut self, frame: &FrameContext) -> Result<(), ComponentError> {
        self.run(frame, |i, f, v| i.on_destroy(f, v))
    }
}

impl std::fmt::Debug for ScriptComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptComponent")
            .field("entity", &self.entity)
            .field("data", &self.data)
            .field("instance", &self.instance)
            .field("last_error", &self.last_error)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Factory for the registry. Init data is [`ScriptData`] in camelCase JSON;
/// `null` means defaults.
pub fn script_factory(
    services: ScriptServices,
) -> impl Fn(EntityId, &serde_json::Value) -> Result<Box<dyn Component>, ComponentError> {
    move |entity, data| {
        let data: ScriptData = if data.is_null() {
            ScriptData::default()
        } else {
            serde_json::from_value(data.clone())?
        };
        Ok(Box::new(ScriptComponent::new(entity, data, services.clone())) as Box<dyn Component>)
    }
}
