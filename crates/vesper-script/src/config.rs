//! Execution budgets for compiled scripts.

use rhai::Engine;

/// Limits applied to every script engine.
///
/// Exceeding a limit aborts the current hook with a runtime error; the
/// script stays loaded and is called again on the next tick.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptConfig {
    /// Operations a single hook call may perform. Default: 1,000,000.
    pub max_operations: u64,
    /// Maximum function call nesting. Default: 64.
    pub max_call_levels: usize,
    /// Maximum expression nesting at the top level. Default: 64.
    pub max_expr_depth: usize,
    /// Maximum expression nesting inside functions. Default: 32.
    pub max_function_expr_depth: usize,
    /// Maximum string length in bytes. Default: 1 MiB.
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    /// How deeply one script's `on` handlers may nest through events they
    /// emit themselves. Deeper deliveries are refused. Default: 8.
    pub max_event_depth: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_string_size: 1024 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
            max_event_depth: 8,
        }
    }
}

impl ScriptConfig {
    pub(crate) fn apply(&self, engine: &mut Engine) {
        engine
            .set_max_operations(self.max_operations)
            .set_max_call_levels(self.max_call_levels)
            .set_max_expr_depths(self.max_expr_depth, self.max_function_expr_depth)
            .set_max_string_size(self.max_string_size)
            .set_max_array_size(self.max_array_size)
            .set_max_map_size(self.max_map_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ScriptConfig =
            serde_json::from_str(r#"{ "maxOperations": 500 }"#).unwrap();
        assert_eq!(config.max_operations, 500);
        assert_eq!(config.max_call_levels, ScriptConfig::default().max_call_levels);
    }
}
