//! Single-page pipeline check.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pagelet_preview::{PreviewController, PreviewResult};
use pagelet_sandbox::{spawn_sandbox_thread, ExecuteOptions, HostTree, SandboxExecutor, SandboxLimits};
use pagelet_source::parse_page;

use crate::config::ProjectConfig;

/// Run the check command: print the host tree JSON, or fail with the error.
pub fn run(config: ProjectConfig, file: &Path) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let page = parse_page(&text).with_context(|| format!("Failed to parse {}", file.display()))?;

    let json = check_source(config.sandbox, config.preview, page.source)?;
    println!("{json}");
    Ok(())
}

/// Transpile, execute and mount `source` once.
pub fn check_source(limits: SandboxLimits, options: ExecuteOptions, source: String) -> Result<String> {
    let handle = spawn_sandbox_thread("check", move || -> Result<String, String> {
        let mut controller = PreviewController::new(SandboxExecutor::new(limits, options));
        controller.set_source(source);

        let outcome = match controller.result() {
            PreviewResult::Empty => serde_json::to_string_pretty(&HostTree::default()),
            PreviewResult::Rendered(tree) => serde_json::to_string_pretty(tree),
            PreviewResult::Failed(error) => return Err(error.to_string()),
        };
        for event in controller.drain_host_events() {
            tracing::info!("Host event: {:?}", event);
        }
        outcome.map_err(|e| e.to_string())
    })
    .context("Failed to start sandbox thread")?;

    let outcome = handle
        .join()
        .map_err(|_| anyhow::anyhow!("Sandbox thread panicked"))?;
    outcome.map_err(anyhow::Error::msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> Result<String> {
        check_source(SandboxLimits::default(), ExecuteOptions::default(), source.to_string())
    }

    #[test]
    fn prints_rendered_tree() {
        let json = check("return <View><Text>Hi</Text></View>;").unwrap();
        let tree: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(tree["root"][0]["kind"], "View");
        assert_eq!(tree["root"][0]["children"][0]["children"][0]["text"], "Hi");
    }

    #[test]
    fn empty_source_is_an_empty_tree() {
        let json = check("").unwrap();
        let tree: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(tree, serde_json::json!({ "root": [] }));
    }

    #[test]
    fn reports_stage_of_failure() {
        let err = check("return <View>;").unwrap_err();
        assert!(err.to_string().starts_with("Transpile error: SyntaxError"));

        let err = check("return <Foo />;").unwrap_err();
        assert!(err.to_string().starts_with("Execute error: ReferenceError"));
    }
}
