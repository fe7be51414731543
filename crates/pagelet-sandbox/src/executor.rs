//! The sandbox executor: evaluates a compiled artifact with capabilities bound.
//!
//! The artifact is a plain function body. The executor wraps it in a
//! single-use function whose parameters are exactly the registry names and
//! calls it once with the materialized capability values, matched by
//! position. Whatever the body returns is the element to mount.

use std::rc::Rc;
use std::thread::JoinHandle;

use pagelet_transpile::ast::{Function, FunctionBody, FunctionKind, Pattern};
use pagelet_transpile::{parse_artifact, CompiledArtifact};
use tracing::debug;

use crate::config::{ExecuteOptions, SandboxLimits};
use crate::error::ExecuteError;
use crate::host::HostEvent;
use crate::interp::Interp;
use crate::registry::CapabilityRegistry;
use crate::value::Value;

/// Stack size for threads that host sandbox interpreters.
pub const SANDBOX_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Spawn a named thread with a stack large enough for deep evaluation.
///
/// Interpreter values are not `Send`, so everything touching an
/// [`Execution`] must happen inside `f`.
pub fn spawn_sandbox_thread<F, T>(name: impl Into<String>, f: F) -> std::io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name(name.into())
        .stack_size(SANDBOX_STACK_SIZE)
        .spawn(f)
}

/// Evaluates artifacts. Holds no state between calls.
#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor {
    limits: SandboxLimits,
    options: ExecuteOptions,
}

/// A successful evaluation: the interpreter it ran in and the returned element.
pub struct Execution {
    pub(crate) interp: Interp,
    element: Value,
}

impl SandboxExecutor {
    pub fn new(limits: SandboxLimits, options: ExecuteOptions) -> Self {
        Self { limits, options }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    /// Evaluate an artifact against the current capability registry.
    pub fn execute(&self, artifact: &CompiledArtifact) -> Result<Execution, ExecuteError> {
        let registry = CapabilityRegistry::global();
        if artifact.registry_version != registry.version() {
            return Err(ExecuteError::IncompatibleArtifact {
                expected: registry.version(),
                found: artifact.registry_version,
            });
        }
        self.invoke(&artifact.code, &registry.names(), registry.materialize(&self.options))
    }

    /// Evaluate `code` as the body of a function with parameters `names`,
    /// called with `values` in the same order.
    pub fn invoke(&self, code: &str, names: &[&str], values: Vec<Value>) -> Result<Execution, ExecuteError> {
        if names.len() != values.len() {
            return Err(ExecuteError::BindingMismatch {
                names: names.len(),
                values: values.len(),
            });
        }

        let program = parse_artifact(code).map_err(|e| ExecuteError::Thrown {
            message: e.to_string(),
        })?;
        let function = Rc::new(Function {
            name: None,
            params: names.iter().map(|name| Pattern::Ident(Rc::from(*name))).collect(),
            rest: None,
            body: FunctionBody::Block(program.body),
            kind: FunctionKind::Normal,
        });

        let mut interp = Interp::new(self.limits.clone());
        let globals = interp.globals.clone();
        let entry = interp.closure(function, &globals);

        interp.begin_entry();
        let element = interp
            .call(&entry, &Value::Undefined, &values)
            .and_then(|element| interp.drain_microtasks().map(|()| element))
            .map_err(|abrupt| ExecuteError::Thrown {
                message: interp.describe_abrupt(&abrupt),
            })?;
        debug!("Evaluated artifact in {} steps", interp.steps());

        Ok(Execution { interp, element })
    }
}

impl Execution {
    /// The value the artifact returned.
    pub fn element(&self) -> &Value {
        &self.element
    }

    /// Virtual time elapsed in this execution, in milliseconds.
    pub fn now(&self) -> u64 {
        self.interp.now()
    }

    /// Advance the virtual clock by `ms`, firing due timers.
    pub fn advance_time(&mut self, ms: u64) -> Result<(), ExecuteError> {
        self.interp.advance_time(ms).map_err(|abrupt| ExecuteError::Thrown {
            message: self.interp.describe_abrupt(&abrupt),
        })
    }

    pub fn has_pending_timers(&self) -> bool {
        self.interp.has_pending_timers()
    }

    /// Side effects recorded since the last call.
    pub fn take_host_events(&mut self) -> Vec<HostEvent> {
        self.interp.take_host_events()
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("element", &self.element)
            .field("now", &self.interp.now())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::json::to_json;
    use crate::value::ObjectKind;
    use pagelet_transpile::Transpiler;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> CompiledArtifact {
        Transpiler::new(CapabilityRegistry::global().transpile_options())
            .transpile(source)
            .unwrap()
    }

    fn execute(source: &str) -> Result<Execution, ExecuteError> {
        SandboxExecutor::default().execute(&compile(source))
    }

    fn element_parts(value: &Value) -> (String, serde_json::Value) {
        let Value::Object(obj) = value else { panic!("not an object: {value:?}") };
        let object = obj.borrow();
        let ObjectKind::Element(data) = &object.kind else { panic!("not an element") };
        let kind = match &data.element_type {
            Value::Object(ty) => match &ty.borrow().kind {
                ObjectKind::Host(name) => name.to_string(),
                _ => "composite".to_string(),
            },
            other => other.to_js_string().to_string(),
        };
        (kind, to_json(&data.props).unwrap().unwrap())
    }

    #[test]
    fn returns_host_element() {
        let execution = execute("return <View/>;").unwrap();
        let (kind, props) = element_parts(execution.element());
        assert_eq!(kind, "View");
        assert_eq!(props, serde_json::json!({}));
    }

    #[test]
    fn unknown_identifier_is_reference_error() {
        let err = execute("return <Foo/>;").unwrap_err();
        assert_eq!(
            err,
            ExecuteError::Thrown {
                message: "ReferenceError: Foo is not defined".to_string()
            }
        );
    }

    #[test]
    fn thrown_plain_values_are_displayable() {
        let err = execute("throw { reason: 'nope' };").unwrap_err();
        assert_eq!(err.to_string(), r#"{"reason":"nope"}"#);
    }

    #[test]
    fn swapping_names_without_values_breaks_resolution() {
        let executor = SandboxExecutor::default();
        let registry = CapabilityRegistry::global();
        let code = compile("return <View><Text>hi</Text></View>;").code;

        let execution = executor
            .invoke(&code, &registry.names(), registry.materialize(executor.options()))
            .unwrap();
        assert_eq!(element_parts(execution.element()).0, "View");

        let mut swapped = registry.names();
        let view = swapped.iter().position(|n| *n == "View").unwrap();
        let text = swapped.iter().position(|n| *n == "Text").unwrap();
        swapped.swap(view, text);
        let execution = executor
            .invoke(&code, &swapped, registry.materialize(executor.options()))
            .unwrap();
        assert_eq!(element_parts(execution.element()).0, "Text");

        let mut swapped = registry.names();
        swapped.swap(0, 1);
        let err = executor
            .invoke(&code, &swapped, registry.materialize(executor.options()))
            .unwrap_err();
        assert!(err.to_string().starts_with("TypeError"), "{err}");
    }

    #[test]
    fn mismatched_binding_lengths_are_rejected() {
        let err = SandboxExecutor::default()
            .invoke("return 1;", &["a", "b"], vec![Value::Undefined])
            .unwrap_err();
        assert_eq!(err, ExecuteError::BindingMismatch { names: 2, values: 1 });
    }

    #[test]
    fn infinite_loop_is_bounded() {
        let executor = SandboxExecutor::new(
            SandboxLimits { max_steps: 50_000, ..SandboxLimits::default() },
            ExecuteOptions::default(),
        );
        let err = executor.execute(&compile("while (true) {}\nreturn <View/>;")).unwrap_err();
        assert!(err.to_string().contains("budget"), "{err}");
    }

    #[test]
    fn incompatible_artifact_is_refused() {
        let artifact = CompiledArtifact {
            code: "return null;".to_string(),
            registry_version: crate::registry::REGISTRY_VERSION + 1,
        };
        let err = SandboxExecutor::default().execute(&artifact).unwrap_err();
        assert!(matches!(err, ExecuteError::IncompatibleArtifact { found, .. } if found == artifact.registry_version));
    }

    #[test]
    fn async_functions_run_to_completion() {
        let source = r#"
            const box = {};
            async function load() {
              const base = await Promise.resolve(20);
              const extra = await new Promise((resolve) => setTimeout(() => resolve(22), 250));
              return base + extra;
            }
            load().then((value) => { box.value = value; });
            return <View box={box} />;
        "#;
        let mut execution = execute(source).unwrap();
        assert_eq!(element_parts(execution.element()).1, serde_json::json!({ "box": {} }));
        assert_eq!(execution.now(), 0);

        execution.advance_time(249).unwrap();
        assert_eq!(element_parts(execution.element()).1, serde_json::json!({ "box": {} }));
        execution.advance_time(1).unwrap();
        assert_eq!(element_parts(execution.element()).1, serde_json::json!({ "box": { "value": 42 } }));
    }

    #[test]
    fn await_yields_to_the_caller() {
        let source = r#"
            const log = [];
            async function first() {
              await null;
              log.push('a');
            }
            first();
            log.push('b');
            Promise.resolve().then(() => log.push('c'));
            return <Text>{log}</Text>;
        "#;
        let execution = execute(source).unwrap();
        let (_, props) = element_parts(execution.element());
        assert_eq!(props, serde_json::json!({ "children": ["b", "a", "c"] }));
    }

    #[test]
    fn rejected_awaits_are_catchable() {
        let source = r#"
            const box = {};
            async function load() {
              try {
                await new Promise((_, reject) => setTimeout(() => reject(new Error('offline')), 10));
              } catch (e) {
                return 'fallback: ' + e.message;
              }
            }
            load().then((value) => { box.value = value; });
            return <View box={box} />;
        "#;
        let mut execution = execute(source).unwrap();
        execution.advance_time(10).unwrap();
        let (_, props) = element_parts(execution.element());
        assert_eq!(props, serde_json::json!({ "box": { "value": "fallback: offline" } }));
    }

    #[test]
    fn unsettled_awaits_leave_the_body_suspended() {
        let source = r#"
            const box = { state: 'idle' };
            async function wait() {
              box.state = 'waiting';
              await new Promise(() => {});
              box.state = 'unreachable';
            }
            wait();
            return <View box={box} />;
        "#;
        let mut execution = execute(source).unwrap();
        execution.advance_time(60_000).unwrap();
        let (_, props) = element_parts(execution.element());
        assert_eq!(props, serde_json::json!({ "box": { "state": "waiting" } }));
    }

    #[test]
    fn timers_fire_when_time_advances() {
        let source = r#"
            const box = { ticks: 0 };
            setTimeout(() => { box.ticks += 1; }, 100);
            return <View box={box} />;
        "#;
        let mut execution = execute(source).unwrap();
        assert!(execution.has_pending_timers());

        execution.advance_time(99).unwrap();
        assert_eq!(element_parts(execution.element()).1, serde_json::json!({ "box": { "ticks": 0 } }));

        execution.advance_time(1).unwrap();
        assert_eq!(element_parts(execution.element()).1, serde_json::json!({ "box": { "ticks": 1 } }));
        assert!(!execution.has_pending_timers());
        assert_eq!(execution.now(), 100);
    }

    #[test]
    fn oversized_arrays_throw_instead_of_aborting() {
        let err = execute("const a = new Array(4294967295);\nreturn null;").unwrap_err();
        assert_eq!(err.to_string(), "RangeError: Invalid array length");

        let err = execute("const a = [];\na.length = 4294967295;\nreturn null;").unwrap_err();
        assert_eq!(err.to_string(), "RangeError: Invalid array length");

        let source = r#"
            let grown = [1];
            try {
              for (let i = 0; i < 40; i++) grown = [...grown, ...grown];
            } catch (e) {
              return <Text>{e.name}</Text>;
            }
            return null;
        "#;
        let execution = execute(source).unwrap();
        assert_eq!(element_parts(execution.element()).1, serde_json::json!({ "children": "RangeError" }));
    }

    #[test]
    fn host_globals_are_not_reachable() {
        let err = execute("return require('fs');").unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: require is not defined");
    }

    #[test]
    fn navigation_records_host_events() {
        let mut execution = execute("redirectTo('about', { id: 3 });\nreturn null;").unwrap();
        assert_eq!(
            execution.take_host_events(),
            vec![HostEvent::Redirect {
                slug: "about".to_string(),
                params: serde_json::json!({ "id": 3 }),
            }]
        );
    }
}
