//! Runtime configuration.

use serde::{Deserialize, Serialize};

use vesper_script::ScriptConfig;

use crate::RuntimeError;

/// Settings for a [`Runtime`](crate::runtime::Runtime).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use vesper_runtime::config::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json_str(r#"{ "maxDeltaSeconds": 0.1 }"#).unwrap();
/// assert_eq!(config.max_delta_seconds, Some(0.1));
/// assert_eq!(config.script.max_call_levels, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Execution budgets applied to every compiled script.
    pub script: ScriptConfig,
    /// Upper bound for the delta time of a single tick. `None` passes real
    /// elapsed time through unchanged.
    pub max_delta_seconds: Option<f64>,
    /// Default `tracing` filter used by [`logging::init`](crate::logging::init)
    /// when `RUST_LOG` is not set.
    pub log_filter: Option<String>,
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, RuntimeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
