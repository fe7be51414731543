//! Page build command.

use anyhow::Result;
use pagelet_store::{build_pages, BuildConfig};

use crate::config::ProjectConfig;

/// Run the build command.
pub async fn run(config: ProjectConfig) -> Result<()> {
    tracing::info!("Compiling pages in {}...", config.pages.dir.display());

    let build_config = BuildConfig {
        pages_dir: config.pages.dir,
        store_dir: config.store.dir.clone(),
    };
    let report = build_pages(&build_config)?;

    for record in &report.saved {
        tracing::debug!("Saved {}", record.slug);
    }
    tracing::info!(
        "Compiled {} pages in {}ms",
        report.saved.len(),
        report.duration_ms
    );
    tracing::info!("Output: {}", config.store.dir.display());

    if !report.is_success() {
        for failure in &report.failed {
            tracing::error!("{}: {}", failure.path.display(), failure.message);
        }
        anyhow::bail!("{} pages failed to compile", report.failed.len());
    }

    Ok(())
}
