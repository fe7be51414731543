//! Transpile command.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pagelet_sandbox::CapabilityRegistry;
use pagelet_source::parse_page;
use pagelet_transpile::Transpiler;

/// Run the transpile command.
pub fn run(file: &Path) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let page = parse_page(&text).with_context(|| format!("Failed to parse {}", file.display()))?;

    let transpiler = Transpiler::new(CapabilityRegistry::global().transpile_options());
    let artifact = transpiler
        .transpile(&page.source)
        .with_context(|| format!("Failed to compile {}", file.display()))?;

    tracing::debug!("Artifact targets registry v{}", artifact.registry_version);
    print!("{}", artifact.code);
    Ok(())
}
