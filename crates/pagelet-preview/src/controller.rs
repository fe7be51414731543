//! Source edits in, one current preview out.
//!
//! ```text
//! Idle --source--> Compiling --transpile fails---------> Failed(Transpile)
//!                      |-----execute or render fails--> Failed(Execute)
//!                      `-----success------------------> Rendered
//! ```
//!
//! Any source change supersedes whatever was in flight or displayed; an
//! empty source returns to `Idle`. Forced remounts bump the [`Generation`]
//! without retranspiling or re-executing.

use std::fmt;

use pagelet_sandbox::{HostEvent, HostTree, Mount, SandboxExecutor};
use pagelet_transpile::{CompiledArtifact, TranspileError, Transpiler};
use serde::Serialize;
use tracing::{debug, info};

/// Pipeline stage a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Transpile,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Transpile => "Transpile",
            Stage::Execute => "Execute",
        })
    }
}

/// A failed compilation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{stage} error: {message}")]
pub struct PreviewError {
    pub stage: Stage,
    pub message: String,
}

impl PreviewError {
    fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Remount counter; a new generation means fresh component state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one pipeline run; only the latest run may publish a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunTicket(u64);

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewState {
    Idle,
    Compiling,
    Rendered,
    Failed,
}

/// What the preview surface should show right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreviewResult<'a> {
    /// No source: show the placeholder
    Empty,
    Rendered(&'a HostTree),
    Failed(&'a PreviewError),
}

enum Current {
    Idle,
    Compiling,
    Rendered(Box<Mount>),
    Failed(PreviewError),
}

/// Drives one editing session's preview.
pub struct PreviewController {
    transpiler: Transpiler,
    executor: SandboxExecutor,
    source: String,
    current: Current,
    generation: Generation,
    latest: u64,
    /// Events collected from mounts that have since been replaced
    events: Vec<HostEvent>,
}

impl Default for PreviewController {
    fn default() -> Self {
        Self::new(SandboxExecutor::default())
    }
}

impl PreviewController {
    /// A controller that transpiles against the global capability registry.
    pub fn new(executor: SandboxExecutor) -> Self {
        let options = pagelet_sandbox::CapabilityRegistry::global().transpile_options();
        Self {
            transpiler: Transpiler::new(options),
            executor,
            source: String::new(),
            current: Current::Idle,
            generation: Generation::default(),
            latest: 0,
            events: Vec::new(),
        }
    }

    /// The transpiler runs use; clone it to transpile off-thread.
    pub fn transpiler(&self) -> &Transpiler {
        &self.transpiler
    }

    /// Replace the source and run the whole pipeline synchronously.
    pub fn set_source(&mut self, source: impl Into<String>) -> PreviewState {
        let ticket = self.begin_run(source);
        if matches!(self.current, Current::Compiling) {
            let result = self.transpiler.transpile(&self.source);
            self.finish_run(ticket, result);
        }
        self.state()
    }

    /// Start a run for `source`. The displayed result is discarded at once.
    pub fn begin_run(&mut self, source: impl Into<String>) -> RunTicket {
        self.latest += 1;
        let ticket = RunTicket(self.latest);
        self.source = source.into();
        let next = if self.source.is_empty() {
            Current::Idle
        } else {
            Current::Compiling
        };
        self.replace(next);
        debug!("Began run {} for {} bytes of source", ticket.0, self.source.len());
        ticket
    }

    /// Publish the transpile outcome of a run, executing it on success.
    ///
    /// Returns `false`, changing nothing, when a newer run has begun since.
    pub fn finish_run(&mut self, ticket: RunTicket, transpiled: Result<CompiledArtifact, TranspileError>) -> bool {
        if ticket.0 != self.latest || !matches!(self.current, Current::Compiling) {
            debug!("Discarding result of superseded run {}", ticket.0);
            return false;
        }
        let next = match transpiled {
            Err(err) => Current::Failed(PreviewError::new(Stage::Transpile, err.to_string())),
            Ok(artifact) => self.execute(&artifact),
        };
        self.replace(next);
        match &self.current {
            Current::Failed(err) => info!("Preview failed: {}", err),
            _ => debug!("Preview rendered (generation {})", self.generation),
        }
        true
    }

    fn execute(&self, artifact: &CompiledArtifact) -> Current {
        let execution = match self.executor.execute(artifact) {
            Ok(execution) => execution,
            Err(err) => return Current::Failed(PreviewError::new(Stage::Execute, err.to_string())),
        };
        match Mount::new(execution, self.generation.0) {
            Ok(mount) => Current::Rendered(Box::new(mount)),
            Err(err) => Current::Failed(PreviewError::new(Stage::Execute, err.to_string())),
        }
    }

    /// Install `next`, unmounting whatever was rendered before.
    fn replace(&mut self, next: Current) {
        if let Current::Rendered(mut mount) = std::mem::replace(&mut self.current, next) {
            mount.unmount();
            self.events.extend(mount.take_host_events());
        }
    }

    /// Discard component state by remounting under a new generation.
    ///
    /// Nothing is retranspiled or re-executed. A failed or idle preview is
    /// left as it is.
    pub fn force_remount(&mut self) -> Generation {
        self.generation.0 += 1;
        if let Current::Rendered(mount) = &mut self.current {
            if let Err(err) = mount.remount(self.generation.0) {
                self.replace(Current::Failed(PreviewError::new(Stage::Execute, err.to_string())));
            }
        }
        info!("Remounted preview as generation {}", self.generation);
        self.generation
    }

    pub fn state(&self) -> PreviewState {
        match self.current {
            Current::Idle => PreviewState::Idle,
            Current::Compiling => PreviewState::Compiling,
            Current::Rendered(_) => PreviewState::Rendered,
            Current::Failed(_) => PreviewState::Failed,
        }
    }

    pub fn result(&self) -> PreviewResult<'_> {
        match &self.current {
            Current::Idle | Current::Compiling => PreviewResult::Empty,
            Current::Rendered(mount) => PreviewResult::Rendered(mount.tree()),
            Current::Failed(err) => PreviewResult::Failed(err),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Forward an interaction to the mounted surface.
    ///
    /// Returns whether a handler ran. A failure while handling it replaces
    /// the preview with an execute error.
    pub fn dispatch(&mut self, node: &str, event: &str, args: &[serde_json::Value]) -> bool {
        let Current::Rendered(mount) = &mut self.current else {
            return false;
        };
        match mount.dispatch(node, event, args) {
            Ok(handled) => handled,
            Err(err) => {
                self.replace(Current::Failed(PreviewError::new(Stage::Execute, err.to_string())));
                true
            }
        }
    }

    /// `dispatch(node, "onPress", [])`
    pub fn press(&mut self, node: &str) -> bool {
        self.dispatch(node, "onPress", &[])
    }

    /// Advance the virtual clock of the mounted surface.
    pub fn advance_time(&mut self, ms: u64) {
        let Current::Rendered(mount) = &mut self.current else {
            return;
        };
        if let Err(err) = mount.advance_time(ms) {
            self.replace(Current::Failed(PreviewError::new(Stage::Execute, err.to_string())));
        }
    }

    /// Whether the mounted surface has timers waiting on the virtual clock.
    pub fn has_pending_timers(&self) -> bool {
        matches!(&self.current, Current::Rendered(mount) if mount.has_pending_timers())
    }

    /// Side effects requested by sandboxed code since the last call.
    pub fn drain_host_events(&mut self) -> Vec<HostEvent> {
        let mut events = std::mem::take(&mut self.events);
        if let Current::Rendered(mount) = &mut self.current {
            events.extend(mount.take_host_events());
        }
        events
    }
}

impl fmt::Debug for PreviewController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewController")
            .field("state", &self.state())
            .field("generation", &self.generation)
            .field("latest", &self.latest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagelet_sandbox::{spawn_sandbox_thread, HostNode, LogLevel};
    use pretty_assertions::assert_eq;

    fn on_sandbox_thread(test: impl FnOnce() + Send + 'static) {
        spawn_sandbox_thread("preview-test", test).unwrap().join().unwrap();
    }

    fn rendered(controller: &PreviewController) -> &HostTree {
        match controller.result() {
            PreviewResult::Rendered(tree) => tree,
            other => panic!("expected a rendered preview, got {other:?}"),
        }
    }

    fn failed(controller: &PreviewController) -> PreviewError {
        match controller.result() {
            PreviewResult::Failed(err) => err.clone(),
            other => panic!("expected a failed preview, got {other:?}"),
        }
    }

    const COUNTER: &str = r#"
        function Counter() {
          const [count, setCount] = useState(0);
          return (
            <View>
              <Text>{count}</Text>
              <TouchableOpacity onPress={() => setCount(count + 1)}>
                <Text>Increment</Text>
              </TouchableOpacity>
            </View>
          );
        }
        return <Counter />;
    "#;

    fn counter_text(controller: &PreviewController) -> String {
        match rendered(controller).find_kind("Text").unwrap().children() {
            [HostNode::Text { text, .. }] => text.clone(),
            other => panic!("unexpected children {other:?}"),
        }
    }

    fn press_button(controller: &mut PreviewController) {
        let id = rendered(controller)
            .find_kind("TouchableOpacity")
            .unwrap()
            .id()
            .to_string();
        assert!(controller.press(&id));
    }

    #[test]
    fn scenario_a_renders_single_element() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            assert_eq!(controller.set_source("return <View/>;"), PreviewState::Rendered);
            let tree = rendered(&controller);
            assert_eq!(tree.element_count(), 1);
            assert_eq!(tree.find_kind("View").map(HostNode::id), Some("0"));
        });
    }

    #[test]
    fn scenario_b_typo_fails_at_transpile() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            assert_eq!(controller.set_source("retrun <View/>;"), PreviewState::Failed);
            let err = failed(&controller);
            assert_eq!(err.stage, Stage::Transpile);
            assert!(!err.message.is_empty());
        });
    }

    #[test]
    fn scenario_c_unknown_component_fails_at_execute() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source("return <Foo/>;");
            assert_eq!(
                failed(&controller),
                PreviewError::new(Stage::Execute, "ReferenceError: Foo is not defined")
            );
        });
    }

    #[test]
    fn scenario_d_empty_source_returns_to_idle() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source("return <View/>;");
            assert_eq!(controller.set_source(""), PreviewState::Idle);
            assert_eq!(controller.result(), PreviewResult::Empty);
            assert_eq!(controller.source(), "");
        });
    }

    #[test]
    fn scenario_e_remount_resets_state_without_recompiling() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source(COUNTER);
            press_button(&mut controller);
            press_button(&mut controller);
            assert_eq!(counter_text(&controller), "2");

            let generation = controller.force_remount();
            assert_eq!(generation, Generation(1));
            assert_eq!(controller.state(), PreviewState::Rendered);
            assert_eq!(counter_text(&controller), "0");
            assert_eq!(controller.source(), COUNTER);
        });
    }

    #[test]
    fn syntax_errors_never_reach_the_executor() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source("redirectTo('elsewhere');\nreturn <View");
            assert_eq!(failed(&controller).stage, Stage::Transpile);
            assert!(controller.drain_host_events().is_empty());
        });
    }

    #[test]
    fn execute_failure_replaces_rendered_preview() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source("return <View><Text>old</Text></View>;");
            assert_eq!(rendered(&controller).text(), "old");

            controller.set_source("throw new Error('broken');");
            assert_eq!(controller.state(), PreviewState::Failed);
            assert_eq!(failed(&controller), PreviewError::new(Stage::Execute, "Error: broken"));
        });
    }

    #[test]
    fn remount_of_failed_preview_keeps_error() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source("retrun <View/>;");
            let before = failed(&controller);

            assert_eq!(controller.force_remount(), Generation(1));
            assert_eq!(controller.force_remount(), Generation(2));
            assert_eq!(failed(&controller), before);
        });
    }

    #[test]
    fn remount_while_idle_only_bumps_generation() {
        let mut controller = PreviewController::default();
        assert_eq!(controller.force_remount(), Generation(1));
        assert_eq!(controller.state(), PreviewState::Idle);
    }

    #[test]
    fn stale_runs_are_discarded() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            let first = controller.begin_run("return <Text>first</Text>;");
            let second = controller.begin_run("return <Text>second</Text>;");
            assert_eq!(controller.state(), PreviewState::Compiling);
            assert_eq!(controller.result(), PreviewResult::Empty);

            let transpiler = controller.transpiler().clone();
            let late = transpiler.transpile("return <Text>first</Text>;");
            let fresh = transpiler.transpile("return <Text>second</Text>;");

            assert!(controller.finish_run(second, fresh));
            assert!(!controller.finish_run(first, late));
            assert_eq!(rendered(&controller).text(), "second");
        });
    }

    #[test]
    fn transpile_is_deterministic() {
        let controller = PreviewController::default();
        for source in [COUNTER, "return <View/>;", "const f = async () => { await 1; };\nreturn null;"] {
            let first = controller.transpiler().transpile(source).unwrap();
            let second = controller.transpiler().transpile(source).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn replaced_mounts_run_cleanups_and_keep_events() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source(
                r#"
                function Screen() {
                  useEffect(() => () => console.warn('bye'), []);
                  return <View />;
                }
                return <Screen />;
                "#,
            );
            controller.set_source("return <View/>;");
            assert_eq!(
                controller.drain_host_events(),
                vec![HostEvent::Log {
                    level: LogLevel::Warn,
                    message: "bye".to_string()
                }]
            );
            assert!(controller.drain_host_events().is_empty());
        });
    }

    #[test]
    fn failing_handler_becomes_execute_error() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source(
                r#"return <TouchableOpacity onPress={() => { throw new Error('tap failed'); }} />;"#,
            );
            assert!(controller.press("0"));
            assert_eq!(failed(&controller), PreviewError::new(Stage::Execute, "Error: tap failed"));
        });
    }

    #[test]
    fn timers_advance_on_demand() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source(
                r#"
                function Clock() {
                  const [seconds, setSeconds] = useState(0);
                  useEffect(() => {
                    const id = setInterval(() => setSeconds((s) => s + 1), 1000);
                    return () => clearInterval(id);
                  }, []);
                  return <Text>{seconds}s</Text>;
                }
                return <Clock />;
                "#,
            );
            assert!(controller.has_pending_timers());
            controller.advance_time(2_500);
            assert_eq!(rendered(&controller).text(), "2s");
        });
    }

    #[test]
    fn awaited_timers_keep_loading_until_time_advances() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source(
                r#"
                function Profile() {
                  const [name, setName] = useState(null);
                  useEffect(() => {
                    async function load() {
                      await new Promise((resolve) => setTimeout(resolve, 2000));
                      setName('Ada');
                    }
                    load();
                  }, []);
                  return <Text>{name || 'Loading'}</Text>;
                }
                return <Profile />;
                "#,
            );
            assert_eq!(rendered(&controller).text(), "Loading");
            assert!(controller.has_pending_timers());

            controller.advance_time(1_999);
            assert_eq!(rendered(&controller).text(), "Loading");
            controller.advance_time(1);
            assert_eq!(rendered(&controller).text(), "Ada");
        });
    }

    #[test]
    fn awaited_gate_opens_on_press() {
        on_sandbox_thread(|| {
            let mut controller = PreviewController::default();
            controller.set_source(
                r#"
                let open;
                const gate = new Promise((resolve) => { open = resolve; });
                function Door() {
                  const [state, setState] = useState('closed');
                  useEffect(() => {
                    (async () => {
                      const who = await gate;
                      setState('opened by ' + who);
                    })();
                  }, []);
                  return (
                    <View>
                      <Text>{state}</Text>
                      <TouchableOpacity onPress={() => open('visitor')}>
                        <Text>Open</Text>
                      </TouchableOpacity>
                    </View>
                  );
                }
                return <Door />;
                "#,
            );
            assert_eq!(counter_text(&controller), "closed");
            controller.advance_time(10_000);
            assert_eq!(counter_text(&controller), "closed");

            press_button(&mut controller);
            assert_eq!(counter_text(&controller), "opened by visitor");
        });
    }
}
