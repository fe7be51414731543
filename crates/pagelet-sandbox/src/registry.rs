//! The capability registry.
//!
//! The registry is the complete, ordered list of names sandboxed code may
//! reference beyond its own declarations and the language built-ins. The
//! executor binds the artifact's function parameters to these names and
//! passes the materialized values in the same order, so the two lists must
//! never drift apart.

use std::sync::LazyLock;

use pagelet_transpile::TranspileOptions;

use crate::capabilities::{native, navigation, react};
use crate::config::ExecuteOptions;
use crate::value::Value;

/// Bumped whenever the capability list changes in any way.
pub const REGISTRY_VERSION: u32 = 1;

/// What a registry slot provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The `React` object: element factory, `Fragment` and hooks
    Factory,

    /// A hook, shared with the `React` object
    Hook(&'static str),

    /// A host component rendered by the surface
    HostComponent(&'static str),

    /// A native module such as `StyleSheet`
    Module(&'static str),

    /// `redirectTo(slug, params)`
    Navigation,

    /// `{ navigation, route }`
    Props,
}

/// A named capability slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityBinding {
    pub name: &'static str,
    pub capability: Capability,
}

/// The ordered capability list.
#[derive(Debug)]
pub struct CapabilityRegistry {
    bindings: Vec<CapabilityBinding>,
}

static REGISTRY: LazyLock<CapabilityRegistry> = LazyLock::new(CapabilityRegistry::build);

impl CapabilityRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static CapabilityRegistry {
        &REGISTRY
    }

    fn build() -> Self {
        use Capability::*;

        let bindings = [
            ("React", Factory),
            ("useState", Hook("useState")),
            ("useEffect", Hook("useEffect")),
            ("useMemo", Hook("useMemo")),
            ("View", HostComponent("View")),
            ("Text", HostComponent("Text")),
            ("TouchableOpacity", HostComponent("TouchableOpacity")),
            ("TextInput", HostComponent("TextInput")),
            ("StyleSheet", Module("StyleSheet")),
            ("FlatList", HostComponent("FlatList")),
            ("Alert", Module("Alert")),
            ("Keyboard", Module("Keyboard")),
            ("Platform", Module("Platform")),
            ("SafeAreaView", HostComponent("SafeAreaView")),
            ("StatusBar", HostComponent("StatusBar")),
            ("KeyboardAvoidingView", HostComponent("KeyboardAvoidingView")),
            ("Image", HostComponent("Image")),
            ("ScrollView", HostComponent("ScrollView")),
            ("ActivityIndicator", HostComponent("ActivityIndicator")),
            ("Animated", Module("Animated")),
            ("Easing", Module("Easing")),
            ("RefreshControl", HostComponent("RefreshControl")),
            ("Linking", Module("Linking")),
            ("Dimensions", Module("Dimensions")),
            ("redirectTo", Navigation),
            ("props", Props),
        ]
        .into_iter()
        .map(|(name, capability)| CapabilityBinding { name, capability })
        .collect();

        Self { bindings }
    }

    /// All bindings in order.
    pub fn bindings(&self) -> &[CapabilityBinding] {
        &self.bindings
    }

    /// Binding names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.bindings.iter().map(|b| b.name).collect()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the registry has no slots.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The registry version artifacts are stamped with.
    pub fn version(&self) -> u32 {
        REGISTRY_VERSION
    }

    /// Transpiler options that target this registry.
    pub fn transpile_options(&self) -> TranspileOptions {
        TranspileOptions {
            pragma: "React.createElement".to_string(),
            pragma_frag: "React.Fragment".to_string(),
            registry_version: REGISTRY_VERSION,
        }
    }

    /// Live values for every slot, positionally aligned with [`names`](Self::names).
    pub fn materialize(&self, options: &ExecuteOptions) -> Vec<Value> {
        let react = react::react();
        self.bindings
            .iter()
            .map(|binding| match binding.capability {
                Capability::Factory => react.clone(),
                Capability::Hook(name) => match &react {
                    Value::Object(obj) => obj.borrow().get(name).cloned().unwrap_or_default(),
                    _ => Value::Undefined,
                },
                Capability::HostComponent(name) => native::host_component(name),
                Capability::Module(name) => native::module(name, options).unwrap_or_default(),
                Capability::Navigation => navigation::redirect_to(),
                Capability::Props => navigation::props(options),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_and_ordered() {
        let registry = CapabilityRegistry::global();
        let names = registry.names();
        assert_eq!(names.first(), Some(&"React"));
        assert_eq!(names.last(), Some(&"props"));
        assert_eq!(names.iter().collect::<HashSet<_>>().len(), names.len());
        assert_eq!(registry.len(), 26);
    }

    #[test]
    fn every_slot_materializes() {
        let registry = CapabilityRegistry::global();
        let values = registry.materialize(&ExecuteOptions::default());
        assert_eq!(values.len(), registry.len());
        for (binding, value) in registry.bindings().iter().zip(&values) {
            assert!(!matches!(value, Value::Undefined), "{} is undefined", binding.name);
        }
    }

    #[test]
    fn transpile_options_carry_version() {
        let options = CapabilityRegistry::global().transpile_options();
        assert_eq!(options.registry_version, REGISTRY_VERSION);
        assert_eq!(options.pragma, "React.createElement");
    }
}
