//! The transpile entry point.

use tracing::debug;

use crate::ast::Program;
use crate::codegen::print_program;
use crate::error::TranspileError;
use crate::lower::{lower, Mode};

/// Configuration for a [`Transpiler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOptions {
    /// Element factory JSX lowers to (e.g., "React.createElement")
    pub pragma: String,

    /// Fragment identifier (e.g., "React.Fragment")
    pub pragma_frag: String,

    /// Capability registry version stamped onto produced artifacts
    pub registry_version: u32,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            pragma: "React.createElement".to_string(),
            pragma_frag: "React.Fragment".to_string(),
            registry_version: 0,
        }
    }
}

/// Transpiled code plus the registry version it was produced against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    /// A plain function body; no JSX, no async syntax, no directives
    pub code: String,

    /// Registry version the code expects to be bound against
    pub registry_version: u32,
}

impl CompiledArtifact {
    /// Whether the artifact has no code (empty source).
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Converts component source into an evaluable function body.
#[derive(Debug, Clone, Default)]
pub struct Transpiler {
    options: TranspileOptions,
}

impl Transpiler {
    /// Create a transpiler with the given options.
    pub fn new(options: TranspileOptions) -> Self {
        Self { options }
    }

    /// The options in effect.
    pub fn options(&self) -> &TranspileOptions {
        &self.options
    }

    /// Transpile component source.
    ///
    /// The same source always produces byte-identical output.
    pub fn transpile(&self, source: &str) -> Result<CompiledArtifact, TranspileError> {
        let program = lower(source, &self.options, Mode::Source)?;
        let code = print_program(&program);
        debug!("Transpiled {} bytes of source into {} bytes", source.len(), code.len());

        Ok(CompiledArtifact {
            code,
            registry_version: self.options.registry_version,
        })
    }
}

/// Parse previously transpiled code back into the IR for evaluation.
pub fn parse_artifact(code: &str) -> Result<Program, TranspileError> {
    lower(code, &TranspileOptions::default(), Mode::Artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn transpile(source: &str) -> String {
        Transpiler::default().transpile(source).unwrap().code
    }

    #[test]
    fn self_closing_element() {
        assert_eq!(
            transpile("return <View/>;"),
            "return React.createElement(View, null);\n"
        );
    }

    #[test]
    fn props_children_and_spread() {
        let source = r#"return <Text style={styles.title} {...rest} numberOfLines={2}>Hello {name}</Text>;"#;
        assert_eq!(
            transpile(source),
            "return React.createElement(Text, { style: styles.title, ...rest, numberOfLines: 2 }, \"Hello \", name);\n"
        );
    }

    #[test]
    fn lowercase_member_and_fragment_tags() {
        assert_eq!(
            transpile("return <><div aria-label=\"x\" hidden /><Animated.View /></>;"),
            "return React.createElement(React.Fragment, null, React.createElement(\"div\", { \"aria-label\": \"x\", hidden: true }), React.createElement(Animated.View, null));\n"
        );
    }

    #[test]
    fn multiline_text_is_cleaned() {
        let source = "return (\n  <Text>\n    Hello\n    world &amp; all\n  </Text>\n);";
        assert_eq!(
            transpile(source),
            "return React.createElement(Text, null, \"Hello world & all\");\n"
        );
    }

    #[test]
    fn custom_pragma() {
        let transpiler = Transpiler::new(TranspileOptions {
            pragma: "h".to_string(),
            pragma_frag: "Frag".to_string(),
            registry_version: 7,
        });
        let artifact = transpiler.transpile("return <><b /></>;").unwrap();
        assert_eq!(artifact.code, "return h(Frag, null, h(\"b\", null));\n");
        assert_eq!(artifact.registry_version, 7);
    }

    #[test]
    fn async_function_is_lowered() {
        let source = "async function load(id) {\n  const res = await fetchIt(id);\n  return res;\n}";
        assert_eq!(
            transpile(source),
            "function load(id) {\n  return __helpers.asyncToGenerator(function* () {\n    const res = yield fetchIt(id);\n    return res;\n  }).call(this);\n}\n"
        );
    }

    #[test]
    fn async_arrow_is_lowered() {
        assert_eq!(
            transpile("const f = async () => await g();"),
            "const f = () => __helpers.asyncToGenerator(function* () {\n  return yield g();\n}).call(this);\n"
        );
    }

    #[test]
    fn strict_directive_is_dropped() {
        assert_eq!(transpile("\"use strict\";\nreturn 1;"), "return 1;\n");
    }

    #[test]
    fn output_is_deterministic() {
        let source = r#"
const { useState } = React;
function Counter() {
  const [count, setCount] = useState(0);
  return (
    <View style={{ padding: 16 }}>
      <Text>Count: {count}</Text>
      <TouchableOpacity onPress={() => setCount(c => c + 1)}>
        <Text>Increment</Text>
      </TouchableOpacity>
    </View>
  );
}
return <Counter />;
"#;
        let first = transpile(source);
        let second = transpile(source);
        assert_eq!(first, second);
        assert!(!first.contains("use strict"));
        assert!(first.contains("React.createElement(Counter, null)"));
    }

    #[test]
    fn output_reparses_as_artifact() {
        let source = "const xs = [1, , 3];\nlet o = { a, 'b-c': (-x) ** 2 };\nreturn xs?.[0] ?? (a || b);";
        let code = transpile(source);
        assert!(parse_artifact(&code).is_ok(), "{code}");
        // Printing is a fixed point
        let again = print_program(&parse_artifact(&code).unwrap());
        assert_eq!(code, again);
    }

    #[test]
    fn syntax_error_is_reported() {
        let err = Transpiler::default().transpile("retrun <View/>;").unwrap_err();
        assert!(matches!(err, TranspileError::Syntax { line: 1, .. }));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn unbalanced_markup_is_a_syntax_error() {
        let err = Transpiler::default().transpile("return <View><Text></View>;").unwrap_err();
        assert!(matches!(err, TranspileError::Syntax { .. }));
    }
}
