//! Host tree to HTML, and the editor shell around it.

use minijinja::{context, Environment};
use pagelet_preview::{PreviewError, PreviewResult};
use pagelet_sandbox::{HostNode, HostTree};
use serde_json::{Map, Value as Json};

/// Shown while there is no source.
pub const PLACEHOLDER: &str = "Start typing or use AI to generate a preview";

/// Style keys that take plain numbers.
const UNITLESS: &[&str] = &[
    "flex",
    "flexGrow",
    "flexShrink",
    "opacity",
    "zIndex",
    "fontWeight",
    "aspectRatio",
    "lineHeight",
];

/// Renders the editor shell and the preview pane.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Self {
        let mut env = Environment::new();

        env.add_template_owned("shell.html".to_string(), SHELL_TEMPLATE.to_string())
            .expect("Failed to add shell template");
        env.add_template_owned("placeholder.html".to_string(), PLACEHOLDER_TEMPLATE.to_string())
            .expect("Failed to add placeholder template");
        env.add_template_owned("error.html".to_string(), ERROR_TEMPLATE.to_string())
            .expect("Failed to add error template");

        Self { env }
    }

    /// The editor page.
    pub fn shell(&self, title: &str) -> Result<String, minijinja::Error> {
        self.env.get_template("shell.html")?.render(context! {
            title => title,
            placeholder => PLACEHOLDER,
        })
    }

    /// The preview pane for a controller result.
    pub fn preview(&self, result: PreviewResult<'_>) -> Result<String, minijinja::Error> {
        match result {
            PreviewResult::Empty => self
                .env
                .get_template("placeholder.html")?
                .render(context! { placeholder => PLACEHOLDER }),
            PreviewResult::Failed(error) => self.error_panel(error),
            PreviewResult::Rendered(tree) => Ok(render_tree(tree)),
        }
    }

    fn error_panel(&self, error: &PreviewError) -> Result<String, minijinja::Error> {
        let label = match error.stage {
            pagelet_preview::Stage::Transpile => "Compile error",
            pagelet_preview::Stage::Execute => "Runtime error",
        };
        self.env.get_template("error.html")?.render(context! {
            label => label,
            stage => error.stage,
            message => &error.message,
        })
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

/// HTML for a rendered surface.
///
/// Every element carries its node id in `data-node` and its handler props
/// in `data-events`, which is all the live client needs to dispatch
/// interactions back.
pub fn render_tree(tree: &HostTree) -> String {
    let mut out = String::from(r#"<div class="pl-surface">"#);
    for node in &tree.root {
        render_node(node, &mut out);
    }
    out.push_str("</div>");
    out
}

fn render_node(node: &HostNode, out: &mut String) {
    let (id, kind, props, events, children) = match node {
        HostNode::Text { text, .. } => {
            out.push_str(&escape(text));
            return;
        }
        HostNode::Element {
            id,
            kind,
            props,
            events,
            children,
        } => (id, kind.as_str(), props, events, children),
    };

    let mut attrs = format!(
        r#" class="pl-{}" data-node="{}""#,
        escape(kind),
        escape(id)
    );
    if !events.is_empty() {
        attrs.push_str(&format!(r#" data-events="{}""#, escape(&events.join(" "))));
    }
    if let Some(Json::Object(style)) = props.get("style") {
        let css = style_to_css(style);
        if !css.is_empty() {
            attrs.push_str(&format!(r#" style="{}""#, escape(&css)));
        }
    }

    match kind {
        "StatusBar" => {}
        "Text" => {
            out.push_str(&format!("<span{attrs}>"));
            render_children(children, out);
            out.push_str("</span>");
        }
        "TextInput" => {
            let value = string_prop(props, "value").unwrap_or_default();
            let placeholder = string_prop(props, "placeholder").unwrap_or_default();
            if props.get("multiline") == Some(&Json::Bool(true)) {
                out.push_str(&format!(
                    r#"<textarea{attrs} placeholder="{}">{}</textarea>"#,
                    escape(&placeholder),
                    escape(&value)
                ));
            } else {
                let input_type = if props.get("secureTextEntry") == Some(&Json::Bool(true)) {
                    "password"
                } else {
                    "text"
                };
                out.push_str(&format!(
                    r#"<input{attrs} type="{input_type}" value="{}" placeholder="{}">"#,
                    escape(&value),
                    escape(&placeholder)
                ));
            }
        }
        "Image" => {
            let src = props
                .get("source")
                .and_then(|source| source.get("uri"))
                .and_then(Json::as_str)
                .unwrap_or_default();
            out.push_str(&format!(r#"<img{attrs} src="{}" alt="">"#, escape(src)));
        }
        "ActivityIndicator" => {
            out.push_str(&format!(r#"<div{attrs} role="progressbar"></div>"#));
        }
        "TouchableOpacity" => {
            out.push_str(&format!(r#"<div{attrs} role="button" tabindex="0">"#));
            render_children(children, out);
            out.push_str("</div>");
        }
        _ => {
            out.push_str(&format!("<div{attrs}>"));
            render_children(children, out);
            out.push_str("</div>");
        }
    }
}

fn render_children(children: &[HostNode], out: &mut String) {
    for child in children {
        render_node(child, out);
    }
}

fn string_prop(props: &Map<String, Json>, name: &str) -> Option<String> {
    match props.get(name)? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Inline CSS for a flattened style object.
pub fn style_to_css(style: &Map<String, Json>) -> String {
    let mut declarations = Vec::new();
    for (key, value) in style {
        let value = match value {
            Json::Number(n) if UNITLESS.contains(&key.as_str()) => n.to_string(),
            Json::Number(n) => format!("{n}px"),
            Json::String(s) => s.clone(),
            _ => continue,
        };
        let properties: &[&str] = match key.as_str() {
            "paddingHorizontal" => &["padding-left", "padding-right"],
            "paddingVertical" => &["padding-top", "padding-bottom"],
            "marginHorizontal" => &["margin-left", "margin-right"],
            "marginVertical" => &["margin-top", "margin-bottom"],
            _ => &[],
        };
        if properties.is_empty() {
            declarations.push(format!("{}: {}", kebab_case(key), value));
        } else {
            for property in properties {
                declarations.push(format!("{property}: {value}"));
            }
        }
    }
    declarations.join("; ")
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const SHELL_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }}</title>
  <style>
    body { font-family: system-ui, sans-serif; margin: 0; display: flex; height: 100vh; }
    .pane { flex: 1; display: flex; flex-direction: column; padding: 1rem; gap: 0.5rem; min-width: 0; }
    .controls { display: flex; gap: 0.5rem; align-items: center; flex-wrap: wrap; }
    #editor { flex: 1; font-family: ui-monospace, monospace; font-size: 13px; }
    #status { color: #666; font-size: 12px; }
    .device { width: 320px; height: 640px; border: 1px solid #ccc; border-radius: 24px; overflow: auto; align-self: center; }
    .pl-surface, .pl-surface div { display: flex; flex-direction: column; box-sizing: border-box; }
    .pl-surface { min-height: 100%; }
    .pl-TouchableOpacity { cursor: pointer; }
    .pl-ActivityIndicator { width: 20px; height: 20px; border: 2px solid #999; border-top-color: transparent; border-radius: 50%; }
    .placeholder { color: #888; text-align: center; padding: 2rem; }
    .error-panel { font-family: ui-monospace, monospace; font-size: 12px; background: #fff0f0; color: #a00; padding: 1rem; white-space: pre-wrap; }
    .error-panel h3 { margin: 0 0 0.5rem; font-family: system-ui, sans-serif; }
  </style>
</head>
<body>
  <section class="pane">
    <div class="controls">
      <input id="slug" placeholder="slug">
      <input id="title" placeholder="title">
      <label><input id="published" type="checkbox"> Published</label>
      <button id="open">Open</button>
      <button id="save">Save</button>
      <button id="regenerate">Regenerate</button>
      <span id="status"></span>
    </div>
    <textarea id="editor" spellcheck="false"></textarea>
  </section>
  <section class="pane">
    <div id="preview" class="device" data-state="idle">
      <div class="placeholder">{{ placeholder }}</div>
    </div>
  </section>
  <script src="/__live.js"></script>
</body>
</html>"##;

const PLACEHOLDER_TEMPLATE: &str = r##"<div class="placeholder">{{ placeholder }}</div>"##;

const ERROR_TEMPLATE: &str = r##"<div class="error-panel" data-stage="{{ stage }}">
  <h3>{{ label }}</h3>
  <pre>{{ message }}</pre>
</div>"##;

#[cfg(test)]
mod tests {
    use super::*;
    use pagelet_preview::Stage;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn element(id: &str, kind: &str, props: Json, events: &[&str], children: Vec<HostNode>) -> HostNode {
        HostNode::Element {
            id: id.to_string(),
            kind: kind.to_string(),
            props: props.as_object().cloned().unwrap_or_default(),
            events: events.iter().map(|e| e.to_string()).collect(),
            children,
        }
    }

    fn text(id: &str, text: &str) -> HostNode {
        HostNode::Text {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn renders_nodes_with_ids_and_events() {
        let tree = HostTree {
            root: vec![element(
                "0",
                "View",
                json!({ "style": { "flex": 1, "paddingHorizontal": 8 } }),
                &[],
                vec![element(
                    "0.0",
                    "TouchableOpacity",
                    json!({}),
                    &["onPress"],
                    vec![element("0.0.0", "Text", json!({}), &[], vec![text("0.0.0.0", "a < b")])],
                )],
            )],
        };

        assert_eq!(
            render_tree(&tree),
            concat!(
                r#"<div class="pl-surface">"#,
                r#"<div class="pl-View" data-node="0" style="flex: 1; padding-left: 8px; padding-right: 8px">"#,
                r#"<div class="pl-TouchableOpacity" data-node="0.0" data-events="onPress" role="button" tabindex="0">"#,
                r#"<span class="pl-Text" data-node="0.0.0">a &lt; b</span>"#,
                "</div></div></div>"
            )
        );
    }

    #[test]
    fn renders_inputs_and_images() {
        let tree = HostTree {
            root: vec![
                element("0", "TextInput", json!({ "value": "hi\"", "placeholder": "Name" }), &["onChangeText"], vec![]),
                element("1", "Image", json!({ "source": { "uri": "https://x.test/a.png" } }), &[], vec![]),
                element("2", "StatusBar", json!({}), &[], vec![]),
            ],
        };
        let html = render_tree(&tree);

        assert!(html.contains(r#"type="text" value="hi&quot;" placeholder="Name""#));
        assert!(html.contains(r#"data-events="onChangeText""#));
        assert!(html.contains(r#"src="https://x.test/a.png""#));
        assert!(!html.contains("pl-StatusBar"));
    }

    #[test]
    fn converts_style_keys() {
        let style = json!({ "backgroundColor": "#fff", "fontWeight": "600", "marginTop": 4.5, "shadowOffset": {} });
        assert_eq!(
            style_to_css(style.as_object().unwrap()),
            "background-color: #fff; font-weight: 600; margin-top: 4.5px"
        );
    }

    #[test]
    fn renders_placeholder_and_error_panel() {
        let templates = Templates::new();

        let empty = templates.preview(PreviewResult::Empty).unwrap();
        assert!(empty.contains(PLACEHOLDER));

        let error = PreviewError {
            stage: Stage::Execute,
            message: "ReferenceError: Foo is not defined".to_string(),
        };
        let panel = templates.preview(PreviewResult::Failed(&error)).unwrap();
        assert!(panel.contains("Runtime error"));
        assert!(panel.contains(r#"data-stage="execute""#));
        assert!(panel.contains("<pre>ReferenceError: Foo is not defined</pre>"));
    }

    #[test]
    fn renders_shell() {
        let html = Templates::new().shell("pagelet").unwrap();
        assert!(html.contains("<title>pagelet</title>"));
        assert!(html.contains(r#"<script src="/__live.js"></script>"#));
    }
}
