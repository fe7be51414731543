//! Mounting elements into a host tree.
//!
//! A [`Mount`] owns an [`Execution`] and renders its element into a
//! [`HostTree`]: the plain, serializable surface a preview displays. Function
//! components keep hook state per instance. An instance is identified by the
//! mount generation, its structural path and the component function, so
//! bumping the generation discards every instance at once.
//!
//! Each render pass:
//! 1. renders the tree, calling function components with a hook frame
//! 2. unmounts instances the pass did not reach, running effect cleanups
//! 3. commits the host tree and event handlers
//! 4. runs pending effects, children before parents
//! 5. drains microtasks
//!
//! Passes repeat while state setters mark the mount dirty.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::builtins::json::{from_json, to_json};
use crate::capabilities::native::{animated_json, flatten_style};
use crate::capabilities::react::{Hook, Instance, RenderFrame};
use crate::error::RenderError;
use crate::executor::Execution;
use crate::host::HostEvent;
use crate::interp::{callable_of, function_name, own_entries, Abrupt, Interp};
use crate::value::{ElementData, ObjectKind, Value};

/// Consecutive passes allowed before rendering is abandoned.
pub const MAX_RENDERS: usize = 50;

/// Props nesting converted into the host tree.
const MAX_PROP_DEPTH: usize = 32;

/// FlatList props consumed by the list itself.
const FLAT_LIST_PROPS: &[&str] = &[
    "data",
    "renderItem",
    "keyExtractor",
    "ListHeaderComponent",
    "ListFooterComponent",
    "ListEmptyComponent",
];

/// The rendered surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostTree {
    pub root: Vec<HostNode>,
}

/// A node of the rendered surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostNode {
    Element {
        /// Structural path, stable across re-renders
        id: String,
        kind: String,
        props: Map<String, Json>,
        /// Props that hold event handlers, such as `onPress`
        events: Vec<String>,
        children: Vec<HostNode>,
    },
    Text {
        id: String,
        text: String,
    },
}

impl HostNode {
    pub fn id(&self) -> &str {
        match self {
            HostNode::Element { id, .. } | HostNode::Text { id, .. } => id,
        }
    }

    pub fn children(&self) -> &[HostNode] {
        match self {
            HostNode::Element { children, .. } => children,
            HostNode::Text { .. } => &[],
        }
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a HostNode>) {
        out.push(self);
        for child in self.children() {
            child.collect(out);
        }
    }
}

impl HostTree {
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Every node in document order.
    pub fn nodes(&self) -> Vec<&HostNode> {
        let mut out = Vec::new();
        for node in &self.root {
            node.collect(&mut out);
        }
        out
    }

    pub fn find(&self, id: &str) -> Option<&HostNode> {
        self.nodes().into_iter().find(|node| node.id() == id)
    }

    /// First element of the given kind, such as `"TouchableOpacity"`.
    pub fn find_kind(&self, kind: &str) -> Option<&HostNode> {
        self.nodes()
            .into_iter()
            .find(|node| matches!(node, HostNode::Element { kind: k, .. } if k == kind))
    }

    /// Number of element nodes.
    pub fn element_count(&self) -> usize {
        self.nodes()
            .iter()
            .filter(|node| matches!(node, HostNode::Element { .. }))
            .count()
    }

    /// All text content concatenated in document order.
    pub fn text(&self) -> String {
        self.nodes()
            .into_iter()
            .filter_map(|node| match node {
                HostNode::Text { text, .. } => Some(text.as_str()),
                HostNode::Element { .. } => None,
            })
            .collect()
    }
}

#[derive(Default)]
struct Pass {
    visited: HashSet<String>,
    /// Instances in the order their subtree finished rendering
    completed: Vec<String>,
    handlers: HashMap<(String, String), Value>,
}

/// A mounted element with its hook state.
pub struct Mount {
    execution: Execution,
    generation: u64,
    instances: BTreeMap<String, Rc<RefCell<Instance>>>,
    tree: HostTree,
    handlers: HashMap<(String, String), Value>,
}

impl Mount {
    /// Mount the element of `execution` and render it until stable.
    pub fn new(execution: Execution, generation: u64) -> Result<Self, RenderError> {
        let mut mount = Self {
            execution,
            generation,
            instances: BTreeMap::new(),
            tree: HostTree::default(),
            handlers: HashMap::new(),
        };
        mount.render()?;
        Ok(mount)
    }

    pub fn tree(&self) -> &HostTree {
        &self.tree
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Virtual time of the underlying execution.
    pub fn now(&self) -> u64 {
        self.execution.now()
    }

    pub fn has_pending_timers(&self) -> bool {
        self.execution.interp.has_pending_timers()
    }

    pub fn take_host_events(&mut self) -> Vec<HostEvent> {
        self.execution.take_host_events()
    }

    /// Invoke the `event` handler of node `node` with JSON arguments.
    ///
    /// Returns `false` when the node has no such handler.
    pub fn dispatch(&mut self, node: &str, event: &str, args: &[Json]) -> Result<bool, RenderError> {
        let Some(handler) = self.handlers.get(&(node.to_string(), event.to_string())).cloned() else {
            debug!("No {} handler on node {}", event, node);
            return Ok(false);
        };
        let args: Vec<Value> = args.iter().map(from_json).collect();

        let interp = &mut self.execution.interp;
        interp.begin_entry();
        interp
            .call(&handler, &Value::Undefined, &args)
            .and_then(|_| interp.drain_microtasks())
            .map_err(|abrupt| thrown(interp, &abrupt))?;

        self.render_if_dirty()?;
        Ok(true)
    }

    /// Advance virtual time, firing due timers, and re-render if needed.
    pub fn advance_time(&mut self, ms: u64) -> Result<(), RenderError> {
        let interp = &mut self.execution.interp;
        interp.advance_time(ms).map_err(|abrupt| thrown(interp, &abrupt))?;
        self.render_if_dirty()
    }

    /// Render the same element under a new generation.
    ///
    /// Every existing instance is unmounted and its state discarded.
    pub fn remount(&mut self, generation: u64) -> Result<(), RenderError> {
        debug!("Remounting generation {} as {}", self.generation, generation);
        self.generation = generation;
        self.render()
    }

    /// Run every effect cleanup and clear the surface.
    pub fn unmount(&mut self) {
        let interp = &mut self.execution.interp;
        for (key, instance) in std::mem::take(&mut self.instances) {
            interp.begin_entry();
            if let Err(abrupt) = cleanup_instance(interp, &instance) {
                warn!("Effect cleanup of {} failed during unmount: {}", key, interp.describe_abrupt(&abrupt));
            }
        }
        self.tree = HostTree::default();
        self.handlers.clear();
    }

    fn render_if_dirty(&mut self) -> Result<(), RenderError> {
        if self.execution.interp.dirty.get() {
            self.render()
        } else {
            Ok(())
        }
    }

    fn render(&mut self) -> Result<(), RenderError> {
        let element = self.execution.element().clone();
        for pass_index in 0..MAX_RENDERS {
            self.execution.interp.dirty.set(false);
            self.execution.interp.begin_entry();

            let mut pass = Pass::default();
            let mut root = Vec::new();
            self.render_node(&element, "0", &mut pass, &mut root)?;

            self.unmount_stale(&pass.visited)?;
            self.tree = HostTree { root };
            self.handlers = std::mem::take(&mut pass.handlers);

            for key in &pass.completed {
                self.run_effects(key)?;
            }
            let interp = &mut self.execution.interp;
            interp.drain_microtasks().map_err(|abrupt| thrown(interp, &abrupt))?;

            if !interp.dirty.get() {
                debug!("Render settled after {} passes", pass_index + 1);
                return Ok(());
            }
        }
        Err(RenderError::TooManyRenders { limit: MAX_RENDERS })
    }

    fn render_node(&mut self, value: &Value, path: &str, pass: &mut Pass, out: &mut Vec<HostNode>) -> Result<(), RenderError> {
        let obj = match value {
            Value::Undefined | Value::Null | Value::Bool(_) => return Ok(()),
            Value::Number(_) | Value::String(_) => {
                out.push(HostNode::Text {
                    id: path.to_string(),
                    text: value.to_js_string().to_string(),
                });
                return Ok(());
            }
            Value::Object(obj) => obj,
        };

        let element = match &obj.borrow().kind {
            ObjectKind::Array(_) => None,
            ObjectKind::Element(data) => Some((data.element_type.clone(), data.props.clone())),
            ObjectKind::AnimatedValue(_) => {
                out.push(HostNode::Text {
                    id: path.to_string(),
                    text: value.to_js_string().to_string(),
                });
                return Ok(());
            }
            ObjectKind::Function(_) => {
                warn!("Functions are not valid as a child; rendering nothing at {}", path);
                return Ok(());
            }
            _ => {
                let object = obj.borrow();
                let keys: Vec<&str> = object.props.iter().map(|(k, _)| &**k).collect();
                return Err(RenderError::InvalidChild {
                    found: format!("object with keys {{{}}}", keys.join(", ")),
                });
            }
        };

        match element {
            None => self.render_children(value, path, pass, out),
            Some((element_type, props)) => self.render_element(&element_type, &props, path, pass, out),
        }
    }

    /// Children of `base`: each array entry gets its index or key as a path segment.
    fn render_children(&mut self, children: &Value, base: &str, pass: &mut Pass, out: &mut Vec<HostNode>) -> Result<(), RenderError> {
        match children.array_items() {
            Some(items) => {
                for (index, item) in items.iter().enumerate() {
                    let segment = element_key(item)
                        .map(|key| format!("k:{key}"))
                        .unwrap_or_else(|| index.to_string());
                    self.render_node(item, &child_path(base, &segment), pass, out)?;
                }
                Ok(())
            }
            None => self.render_node(children, &child_path(base, "0"), pass, out),
        }
    }

    fn render_element(
        &mut self,
        element_type: &Value,
        props: &Value,
        path: &str,
        pass: &mut Pass,
        out: &mut Vec<HostNode>,
    ) -> Result<(), RenderError> {
        let host = match element_type {
            Value::String(tag) => return self.render_host(tag.to_string(), props, &[], path, pass, out),
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Host(name) => Some(*name),
                _ => None,
            },
            _ => None,
        };

        match host {
            Some("Fragment") => self.render_children(&prop(props, "children"), path, pass, out),
            Some("FlatList") => self.render_flat_list(props, path, pass, out),
            Some(name) => self.render_host(name.to_string(), props, &[], path, pass, out),
            None => self.render_component(element_type, props, path, pass, out),
        }
    }

    fn render_component(
        &mut self,
        component: &Value,
        props: &Value,
        path: &str,
        pass: &mut Pass,
        out: &mut Vec<HostNode>,
    ) -> Result<(), RenderError> {
        let (Some(callable), Value::Object(obj)) = (callable_of(component), component) else {
            return Err(RenderError::Thrown {
                message: format!("TypeError: Element type is invalid: got {}", component.type_of()),
            });
        };
        let name = match function_name(&callable) {
            name if name.is_empty() => "Anonymous".to_string(),
            name => name,
        };
        let key = format!("{}/{}#{}@{:x}", self.generation, path, name, Rc::as_ptr(obj) as usize);
        pass.visited.insert(key.clone());
        let instance = self.instances.entry(key.clone()).or_default().clone();

        let interp = &mut self.execution.interp;
        let previous = interp.render.replace(RenderFrame { instance, cursor: 0 });
        let result = interp.call(component, &Value::Undefined, &[props.clone()]);
        interp.render = previous;
        let output = result.map_err(|abrupt| thrown(interp, &abrupt))?;

        self.render_node(&output, path, pass, out)?;
        pass.completed.push(key);
        Ok(())
    }

    fn render_host(
        &mut self,
        kind: String,
        props: &Value,
        skip: &[&str],
        path: &str,
        pass: &mut Pass,
        out: &mut Vec<HostNode>,
    ) -> Result<(), RenderError> {
        let id = path.to_string();
        let mut children = Vec::new();
        let (props_json, events) = self.host_props(props, skip, &id, pass, &mut children)?;
        self.render_children(&prop(props, "children"), &id, pass, &mut children)?;
        out.push(HostNode::Element {
            id,
            kind,
            props: props_json,
            events,
            children,
        });
        Ok(())
    }

    /// Split host props into JSON props and event handlers.
    ///
    /// Element-valued props such as `refreshControl` render as children.
    fn host_props(
        &mut self,
        props: &Value,
        skip: &[&str],
        id: &str,
        pass: &mut Pass,
        children: &mut Vec<HostNode>,
    ) -> Result<(Map<String, Json>, Vec<String>), RenderError> {
        let mut json = Map::new();
        let mut events = Vec::new();
        for (key, value) in own_entries(props) {
            if &*key == "children" || skip.contains(&&*key) {
                continue;
            }
            if &*key == "style" {
                if let Some(style) = prop_json(&flatten_style(&value), 0) {
                    json.insert(key.to_string(), style);
                }
            } else if value.is_callable() {
                events.push(key.to_string());
                pass.handlers.insert((id.to_string(), key.to_string()), value);
            } else if is_element(&value) {
                self.render_node(&value, &child_path(id, &key), pass, children)?;
            } else if let Some(converted) = prop_json(&value, 0) {
                json.insert(key.to_string(), converted);
            }
        }
        Ok((json, events))
    }

    fn render_flat_list(&mut self, props: &Value, path: &str, pass: &mut Pass, out: &mut Vec<HostNode>) -> Result<(), RenderError> {
        let id = path.to_string();
        let mut children = Vec::new();
        let (props_json, events) = self.host_props(props, FLAT_LIST_PROPS, &id, pass, &mut children)?;

        self.render_slot(&prop(props, "ListHeaderComponent"), &child_path(&id, "header"), pass, &mut children)?;

        let data = prop(props, "data").array_items().unwrap_or_default();
        if data.is_empty() {
            self.render_slot(&prop(props, "ListEmptyComponent"), &child_path(&id, "empty"), pass, &mut children)?;
        }

        let render_item = prop(props, "renderItem");
        let key_extractor = prop(props, "keyExtractor");
        for (index, item) in data.iter().enumerate() {
            let position = Value::Number(index as f64);
            let interp = &mut self.execution.interp;
            let key = if key_extractor.is_callable() {
                interp
                    .call(&key_extractor, &Value::Undefined, &[item.clone(), position.clone()])
                    .map_err(|abrupt| thrown(interp, &abrupt))?
                    .to_js_string()
                    .to_string()
            } else {
                match prop(item, "key") {
                    key @ (Value::String(_) | Value::Number(_)) => key.to_js_string().to_string(),
                    _ => index.to_string(),
                }
            };
            let rendered = if render_item.is_callable() {
                let info = Value::plain(vec![("item", item.clone()), ("index", position)]);
                interp
                    .call(&render_item, &Value::Undefined, &[info])
                    .map_err(|abrupt| thrown(interp, &abrupt))?
            } else {
                Value::Undefined
            };
            self.render_node(&rendered, &child_path(&id, &format!("k:{key}")), pass, &mut children)?;
        }

        self.render_slot(&prop(props, "ListFooterComponent"), &child_path(&id, "footer"), pass, &mut children)?;

        out.push(HostNode::Element {
            id,
            kind: "FlatList".to_string(),
            props: props_json,
            events,
            children,
        });
        Ok(())
    }

    /// A list slot holds either a component or an element.
    fn render_slot(&mut self, slot: &Value, path: &str, pass: &mut Pass, out: &mut Vec<HostNode>) -> Result<(), RenderError> {
        if slot.is_callable() {
            let element = Value::object(ObjectKind::Element(ElementData {
                element_type: slot.clone(),
                props: Value::plain(Vec::new()),
                key: None,
            }));
            self.render_node(&element, path, pass, out)
        } else {
            self.render_node(slot, path, pass, out)
        }
    }

    fn unmount_stale(&mut self, visited: &HashSet<String>) -> Result<(), RenderError> {
        let stale: Vec<String> = self
            .instances
            .keys()
            .filter(|key| !visited.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(instance) = self.instances.remove(&key) {
                debug!("Unmounting {}", key);
                let interp = &mut self.execution.interp;
                cleanup_instance(interp, &instance).map_err(|abrupt| thrown(interp, &abrupt))?;
            }
        }
        Ok(())
    }

    /// Run the pending effects of one instance, cleaning up the previous run first.
    fn run_effects(&mut self, key: &str) -> Result<(), RenderError> {
        let Some(instance) = self.instances.get(key).cloned() else {
            return Ok(());
        };
        let count = instance.borrow().hooks.len();
        let interp = &mut self.execution.interp;
        for index in 0..count {
            let (effect, cleanup) = match instance.borrow_mut().hooks.get_mut(index) {
                Some(Hook::Effect { pending, cleanup, .. }) => match pending.take() {
                    Some(effect) => (effect, cleanup.take()),
                    None => continue,
                },
                _ => continue,
            };
            if let Some(cleanup) = cleanup {
                interp
                    .call(&cleanup, &Value::Undefined, &[])
                    .map_err(|abrupt| thrown(interp, &abrupt))?;
            }
            let result = interp
                .call(&effect, &Value::Undefined, &[])
                .map_err(|abrupt| thrown(interp, &abrupt))?;
            if result.is_callable() {
                if let Some(Hook::Effect { cleanup, .. }) = instance.borrow_mut().hooks.get_mut(index) {
                    *cleanup = Some(result);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("generation", &self.generation)
            .field("instances", &self.instances.len())
            .field("tree", &self.tree)
            .finish()
    }
}

fn thrown(interp: &Interp, abrupt: &Abrupt) -> RenderError {
    RenderError::Thrown {
        message: interp.describe_abrupt(abrupt),
    }
}

fn cleanup_instance(interp: &mut Interp, instance: &Rc<RefCell<Instance>>) -> Result<(), Abrupt> {
    let cleanups: Vec<Value> = instance
        .borrow_mut()
        .hooks
        .iter_mut()
        .filter_map(|hook| match hook {
            Hook::Effect { cleanup, .. } => cleanup.take(),
            _ => None,
        })
        .collect();
    for cleanup in cleanups {
        interp.call(&cleanup, &Value::Undefined, &[])?;
    }
    Ok(())
}

fn child_path(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{base}.{segment}")
    }
}

fn prop(props: &Value, key: &str) -> Value {
    match props {
        Value::Object(obj) => obj.borrow().get(key).cloned().unwrap_or_default(),
        _ => Value::Undefined,
    }
}

fn is_element(value: &Value) -> bool {
    matches!(value, Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Element(_)))
}

fn element_key(value: &Value) -> Option<Rc<str>> {
    match value {
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Element(data) => data.key.clone(),
            _ => None,
        },
        _ => None,
    }
}

/// Host prop as JSON, with animated values resolved to their current value.
fn prop_json(value: &Value, depth: usize) -> Option<Json> {
    if let Some(json) = animated_json(value) {
        return Some(json);
    }
    if depth > MAX_PROP_DEPTH {
        return None;
    }
    let Value::Object(obj) = value else {
        return to_json(value).ok().flatten();
    };
    if let Some(items) = value.array_items() {
        return Some(Json::Array(
            items
                .iter()
                .map(|item| prop_json(item, depth + 1).unwrap_or(Json::Null))
                .collect(),
        ));
    }
    let plain = matches!(obj.borrow().kind, ObjectKind::Plain | ObjectKind::Error);
    if !plain {
        return to_json(value).ok().flatten();
    }
    let mut map = Map::new();
    for (key, item) in own_entries(value) {
        if let Some(json) = prop_json(&item, depth + 1) {
            map.insert(key.to_string(), json);
        }
    }
    Some(Json::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SandboxExecutor;
    use crate::registry::CapabilityRegistry;
    use pagelet_transpile::Transpiler;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mount(source: &str) -> Result<Mount, RenderError> {
        let artifact = Transpiler::new(CapabilityRegistry::global().transpile_options())
            .transpile(source)
            .unwrap();
        let execution = SandboxExecutor::default().execute(&artifact).unwrap();
        Mount::new(execution, 0)
    }

    fn press(mount: &mut Mount, kind: &str) {
        let id = mount.tree().find_kind(kind).unwrap().id().to_string();
        assert!(mount.dispatch(&id, "onPress", &[]).unwrap());
    }

    const COUNTER: &str = r#"
        function Counter() {
          const [count, setCount] = useState(0);
          return (
            <View style={[styles.box, { padding: 4 }]}>
              <Text>Count: {count}</Text>
              <TouchableOpacity onPress={() => setCount((c) => c + 1)}>
                <Text>+</Text>
              </TouchableOpacity>
            </View>
          );
        }
        const styles = StyleSheet.create({ box: { flex: 1, padding: 2 } });
        return <Counter />;
    "#;

    #[test]
    fn renders_host_tree_with_paths() {
        let mount = mount("return <View testID=\"root\"><Text>hi</Text>{null}{false}</View>;").unwrap();
        assert_eq!(
            serde_json::to_value(mount.tree()).unwrap(),
            json!({ "root": [{
                "type": "element",
                "id": "0",
                "kind": "View",
                "props": { "testID": "root" },
                "events": [],
                "children": [{
                    "type": "element",
                    "id": "0.0",
                    "kind": "Text",
                    "props": {},
                    "events": [],
                    "children": [{ "type": "text", "id": "0.0.0", "text": "hi" }]
                }]
            }]})
        );
    }

    #[test]
    fn state_updates_rerender() {
        let mut mount = mount(COUNTER).unwrap();
        assert_eq!(mount.tree().text(), "Count: 0+");
        let HostNode::Element { props, .. } = mount.tree().find_kind("View").unwrap() else { panic!() };
        assert_eq!(props["style"], json!({ "flex": 1, "padding": 4 }));

        press(&mut mount, "TouchableOpacity");
        press(&mut mount, "TouchableOpacity");
        assert_eq!(mount.tree().text(), "Count: 2+");
    }

    #[test]
    fn remount_resets_state() {
        let mut mount = mount(COUNTER).unwrap();
        press(&mut mount, "TouchableOpacity");
        assert_eq!(mount.tree().text(), "Count: 1+");

        mount.remount(1).unwrap();
        assert_eq!(mount.tree().text(), "Count: 0+");
        assert_eq!(mount.generation(), 1);
    }

    #[test]
    fn effects_run_after_commit_and_clean_up() {
        let source = r#"
            function Ticker() {
              const [ticks, setTicks] = useState(0);
              useEffect(() => {
                console.log('mounted');
                const id = setInterval(() => setTicks((t) => t + 1), 100);
                return () => { clearInterval(id); console.log('cleaned'); };
              }, []);
              return <Text>{ticks}</Text>;
            }
            return <Ticker />;
        "#;
        let mut mount = mount(source).unwrap();
        assert_eq!(mount.tree().text(), "0");

        mount.advance_time(350).unwrap();
        assert_eq!(mount.tree().text(), "3");

        mount.unmount();
        assert!(mount.tree().is_empty());
        assert!(!mount.has_pending_timers());
        let messages: Vec<String> = mount
            .take_host_events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Log { message, .. } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(messages, vec!["mounted", "cleaned"]);
    }

    #[test]
    fn effect_deps_gate_reruns() {
        let source = r#"
            function Probe() {
              const [n, setN] = useState(0);
              const [runs, setRuns] = useState(0);
              useEffect(() => { setRuns((r) => r + 1); }, [n]);
              return (
                <TouchableOpacity onPress={() => setN(n + 1)}>
                  <Text>{n}:{runs}</Text>
                </TouchableOpacity>
              );
            }
            return <Probe />;
        "#;
        let mut mount = mount(source).unwrap();
        assert_eq!(mount.tree().text(), "0:1");
        press(&mut mount, "TouchableOpacity");
        assert_eq!(mount.tree().text(), "1:2");
    }

    #[test]
    fn async_effects_settle_on_the_virtual_clock() {
        let source = r#"
            function Loader() {
              const [data, setData] = useState(null);
              useEffect(() => {
                const load = async () => {
                  const value = await new Promise((resolve) => setTimeout(() => resolve('loaded'), 300));
                  setData(value);
                };
                load();
              }, []);
              return <Text>{data ?? 'loading'}</Text>;
            }
            return <Loader />;
        "#;
        let mut mount = mount(source).unwrap();
        assert_eq!(mount.tree().text(), "loading");

        mount.advance_time(299).unwrap();
        assert_eq!(mount.tree().text(), "loading");
        mount.advance_time(1).unwrap();
        assert_eq!(mount.tree().text(), "loaded");
        assert_eq!(mount.now(), 300);
    }

    #[test]
    fn flat_list_expands_items() {
        let source = r#"
            const data = [{ id: 'a', name: 'Apple' }, { id: 'b', name: 'Banana' }];
            return (
              <FlatList
                data={data}
                keyExtractor={(item) => item.id}
                renderItem={({ item, index }) => <Text>{index}:{item.name}</Text>}
                ListHeaderComponent={<Text>Fruit</Text>}
              />
            );
        "#;
        let mount = mount(source).unwrap();
        assert_eq!(mount.tree().text(), "Fruit0:Apple1:Banana");
        assert!(mount.tree().find("0.k:b").is_some());
        let HostNode::Element { props, .. } = mount.tree().find_kind("FlatList").unwrap() else { panic!() };
        assert!(props.is_empty());
    }

    #[test]
    fn empty_flat_list_renders_empty_component() {
        let source = r#"
            const Empty = () => <Text>Nothing here</Text>;
            return <FlatList data={[]} renderItem={() => null} ListEmptyComponent={Empty} />;
        "#;
        assert_eq!(mount(source).unwrap().tree().text(), "Nothing here");
    }

    #[test]
    fn object_children_are_rejected() {
        let err = mount("return <View>{{ a: 1 }}</View>;").unwrap_err();
        assert_eq!(
            err,
            RenderError::InvalidChild {
                found: "object with keys {a}".to_string()
            }
        );
    }

    #[test]
    fn unconditional_state_update_is_bounded() {
        let source = r#"
            function Loop() {
              const [n, setN] = useState(0);
              setN(n + 1);
              return <Text>{n}</Text>;
            }
            return <Loop />;
        "#;
        assert_eq!(mount(source).unwrap_err(), RenderError::TooManyRenders { limit: MAX_RENDERS });
    }

    #[test]
    fn render_errors_carry_the_thrown_message() {
        let source = r#"
            function Broken() { throw new TypeError('bad prop'); }
            return <View><Broken /></View>;
        "#;
        assert_eq!(
            mount(source).unwrap_err(),
            RenderError::Thrown {
                message: "TypeError: bad prop".to_string()
            }
        );
    }

    #[test]
    fn dispatch_passes_arguments() {
        let source = r#"
            function Form() {
              const [text, setText] = useState('');
              return (
                <View>
                  <TextInput value={text} onChangeText={setText} />
                  <Text>{text.toUpperCase()}</Text>
                </View>
              );
            }
            return <Form />;
        "#;
        let mut mount = mount(source).unwrap();
        let id = mount.tree().find_kind("TextInput").unwrap().id().to_string();
        assert!(mount.dispatch(&id, "onChangeText", &[json!("hello")]).unwrap());
        assert_eq!(mount.tree().text(), "HELLO");
        assert!(!mount.dispatch(&id, "onPress", &[]).unwrap());
    }

    #[test]
    fn animated_values_resolve_in_styles() {
        let source = r#"
            function Fade() {
              const opacity = React.useRef(new Animated.Value(0)).current;
              useEffect(() => {
                Animated.timing(opacity, { toValue: 1, duration: 200, useNativeDriver: true }).start();
              }, []);
              return <Animated.View style={{ opacity }} />;
            }
            return <Fade />;
        "#;
        let mut mount = mount(source).unwrap();
        let opacity = |mount: &Mount| match mount.tree().find("0").unwrap() {
            HostNode::Element { props, .. } => props["style"]["opacity"].as_f64().unwrap(),
            HostNode::Text { .. } => panic!("text"),
        };
        assert_eq!(opacity(&mount), 0.0);
        mount.advance_time(1_000).unwrap();
        assert_eq!(opacity(&mount), 1.0);
    }
}
