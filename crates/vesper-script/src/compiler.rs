//! Script compilation.
//!
//! [`ScriptCompiler::compile`] turns script text into a [`ScriptInstance`]:
//!
//! 1. A fresh engine is built with the configured budgets, module imports
//!    and `eval` disabled, and the capability functions registered.
//! 2. The text is parsed and the lifecycle hooks are resolved by name and
//!    arity (`start()`, `update()` or `update(dt)`, `onDestroy()`).
//! 3. Top-level statements run once.
//!
//! Any failure in these steps is a [`ScriptError::Compile`]; no partially
//! built instance escapes. The compiler keeps no state between calls.

use std::rc::Rc;

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Engine, AST};

use crate::config::ScriptConfig;
use crate::context::{register_capabilities, ScriptBindings};
use crate::instance::{Hook, HookSet, ScriptInstance, ScriptVm};
use crate::ScriptError;

#[derive(Debug, Clone, Default)]
pub struct ScriptCompiler {
    config: ScriptConfig,
}

impl ScriptCompiler {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Compile `code` for the entity described by `bindings`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Compile`] on a parse error, a hook with an unsupported
    /// parameter list, or a failure while running top-level statements.
    pub fn compile(
        &self,
        name: &str,
        code: &str,
        bindings: Rc<ScriptBindings>,
    ) -> Result<ScriptInstance, ScriptError> {
        let compile_error = |message: String| ScriptError::Compile {
            script: name.to_owned(),
            message,
        };

        let mut engine = Engine::new();
        self.config.apply(&mut engine);
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        register_capabilities(&mut engine, &bindings);

        let ast = engine.compile(code).map_err(|e| compile_error(e.to_string()))?;
        let hooks = resolve_hooks(&ast).map_err(compile_error)?;

        let vm = Rc::new(ScriptVm::new(engine, ast));
        bindings.attach_vm(&vm);

        // Dropping the instance on failure releases any `on` subscriptions
        // made by top-level statements.
        let mut instance = ScriptInstance::new(name, vm, hooks, bindings);
        instance.run_top_level().map_err(compile_error)?;

        tracing::debug!(
            script = name,
            entity = %instance.entity(),
            start = instance.has_hook(Hook::Start),
            update = instance.has_hook(Hook::Update),
            on_destroy = instance.has_hook(Hook::OnDestroy),
            "script compiled"
        );
        Ok(instance)
    }
}

/// Find the lifecycle hooks and check their parameter lists.
fn resolve_hooks(ast: &AST) -> Result<HookSet, String> {
    let mut hooks = HookSet::default();
    for f in ast.iter_functions() {
        let arity = f.params.len();
        match f.name {
            "start" if arity == 0 => hooks.start = true,
            "onDestroy" if arity == 0 => hooks.on_destroy = true,
            "update" if arity <= 1 => {
                // Prefer `update(dt)` when both overloads exist.
                hooks.update_arity = Some(hooks.update_arity.map_or(arity, |a| a.max(arity)));
            }
            "start" | "onDestroy" => {
                return Err(format!("hook '{}' must not take parameters", f.name));
            }
            "update" => {
                return Err(format!(
                    "hook 'update' takes at most one parameter (deltaTime), found {arity}"
                ));
            }
            _ => {}
        }
    }
    Ok(hooks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hooks_of(code: &str) -> Result<HookSet, String> {
        let ast = Engine::new().compile(code).unwrap();
        resolve_hooks(&ast)
    }

    #[test]
    fn resolves_hooks_by_name() {
        let hooks = hooks_of("fn start() {} fn update(dt) {} fn helper(a, b) {}").unwrap();
        assert!(hooks.start);
        assert!(!hooks.on_destroy);
        assert_eq!(hooks.update_arity, Some(1));
    }

    #[test]
    fn zero_arity_update_is_accepted() {
        assert_eq!(hooks_of("fn update() {}").unwrap().update_arity, Some(0));
    }

    #[test]
    fn bad_hook_arity_is_rejected() {
        assert!(hooks_of("fn start(x) {}").is_err());
        assert!(hooks_of("fn update(a, b) {}").is_err());
    }
}
