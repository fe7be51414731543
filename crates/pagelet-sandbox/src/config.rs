//! Sandbox limits and per-execution options.

use serde::{Deserialize, Serialize};

/// Resource limits for each host-to-sandbox entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Statements, calls and loop iterations allowed per entry
    pub max_steps: u64,

    /// Maximum nesting of function calls
    pub max_call_depth: usize,

    /// Longest array sandboxed code may create
    pub max_array_length: usize,

    /// Longest string, in UTF-16 code units
    pub max_string_length: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_steps: 5_000_000,
            max_call_depth: 200,
            max_array_length: 1 << 20,
            max_string_length: 1 << 26,
        }
    }
}

/// Values the executor exposes to sandboxed code through capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteOptions {
    /// Exposed as `props.route.params`
    pub route_params: serde_json::Value,

    /// Reported by `Dimensions.get("window")`
    pub window: WindowSize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            route_params: serde_json::Value::Object(serde_json::Map::new()),
            window: WindowSize::default(),
        }
    }
}

/// Simulated screen size in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: f64,
    pub height: f64,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 320.0,
            height: 640.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_limits_fall_back_to_defaults() {
        let limits: SandboxLimits = serde_json::from_str(r#"{"max_steps": 10}"#).unwrap();
        assert_eq!(limits.max_steps, 10);
        assert_eq!(limits.max_call_depth, 200);
        assert_eq!(limits.max_array_length, 1 << 20);
    }

    #[test]
    fn default_route_params_are_an_empty_object() {
        let options = ExecuteOptions::default();
        assert_eq!(options.route_params, serde_json::json!({}));
    }
}
