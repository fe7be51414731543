//! Batch compilation of a pages directory into stored records.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use pagelet_source::parse_page;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::producer::{ArtifactProducer, PageDraft};
use crate::record::PageRecord;
use crate::store::{JsonFileStore, PageStore};

/// Configuration for building every page in a directory.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory of `.jsx` page files
    pub pages_dir: PathBuf,

    /// Directory records are written to
    pub store_dir: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pages_dir: PathBuf::from("pages"),
            store_dir: PathBuf::from(".pagelet/records"),
        }
    }
}

/// A page that could not be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Result of a build.
#[derive(Debug)]
pub struct BuildReport {
    /// Records written, ordered by slug
    pub saved: Vec<PageRecord>,

    /// Pages left untouched because they failed to parse or compile
    pub failed: Vec<PageFailure>,

    /// Total build time in milliseconds
    pub duration_ms: u64,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Errors that stop a build outright.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to read pages directory: {0}")]
    ReadError(String),
}

/// Compile every page under `config.pages_dir` and store the results.
///
/// A page that fails keeps whatever record it had before; the others
/// are still saved.
pub fn build_pages(config: &BuildConfig) -> Result<BuildReport, BuildError> {
    let start = Instant::now();
    let paths = discover_pages(&config.pages_dir)?;
    tracing::debug!("Found {} pages in {}", paths.len(), config.pages_dir.display());

    let producer = ArtifactProducer::new();
    let store = JsonFileStore::new(&config.store_dir);

    let results: Vec<Result<PageRecord, PageFailure>> = paths
        .par_iter()
        .map(|path| {
            build_page(&producer, &store, path).map_err(|message| PageFailure {
                path: path.clone(),
                message,
            })
        })
        .collect();

    let mut saved = Vec::new();
    let mut failed = Vec::new();
    for result in results {
        match result {
            Ok(record) => saved.push(record),
            Err(failure) => {
                tracing::warn!("{}: {}", failure.path.display(), failure.message);
                failed.push(failure);
            }
        }
    }
    saved.sort_by(|a, b| a.slug.cmp(&b.slug));

    Ok(BuildReport {
        saved,
        failed,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn discover_pages(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    if !dir.exists() {
        return Err(BuildError::ReadError(format!(
            "Pages directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("jsx"))
        .collect();
    paths.sort();
    Ok(paths)
}

fn build_page(
    producer: &ArtifactProducer,
    store: &dyn PageStore,
    path: &Path,
) -> Result<PageRecord, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let page = parse_page(&text).map_err(|e| e.to_string())?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("index")
        .to_string();
    let meta = page.meta.unwrap_or_default();
    let title = if meta.title.is_empty() {
        stem.clone()
    } else {
        meta.title
    };

    let draft = PageDraft {
        title,
        slug: meta.slug.unwrap_or(stem),
        source_text: page.source,
        is_published: meta.published,
    };
    producer.save(store, draft).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn builds_valid_pages_and_reports_failures() {
        let dir = tempdir().unwrap();
        let pages = dir.path().join("pages");
        fs::create_dir_all(pages.join("nested")).unwrap();
        fs::write(
            pages.join("home.jsx"),
            "---\ntitle: Welcome\npublished: true\n---\n\nreturn <Text>Hi</Text>;\n",
        )
        .unwrap();
        fs::write(pages.join("nested/about.jsx"), "return <View/>;\n").unwrap();
        fs::write(pages.join("broken.jsx"), "return <View>;\n").unwrap();
        fs::write(pages.join("notes.md"), "ignored").unwrap();

        let config = BuildConfig {
            pages_dir: pages.clone(),
            store_dir: dir.path().join("records"),
        };
        let report = build_pages(&config).unwrap();

        let saved: Vec<(&str, &str, bool)> = report
            .saved
            .iter()
            .map(|r| (r.slug.as_str(), r.title.as_str(), r.is_published))
            .collect();
        assert_eq!(saved, vec![("about", "about", false), ("home", "Welcome", true)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, pages.join("broken.jsx"));
        assert!(report.failed[0].message.contains("SyntaxError"));
        assert!(!report.is_success());

        let store = JsonFileStore::new(dir.path().join("records"));
        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(store.get("broken").unwrap(), None);
    }

    #[test]
    fn slug_override_from_frontmatter() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("index.jsx"),
            "---\nslug: landing\n---\nreturn null;\n",
        )
        .unwrap();

        let report = build_pages(&BuildConfig {
            pages_dir: dir.path().to_path_buf(),
            store_dir: dir.path().join("out"),
        })
        .unwrap();

        assert_eq!(report.saved[0].slug, "landing");
        assert_eq!(report.saved[0].title, "index");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let result = build_pages(&BuildConfig {
            pages_dir: dir.path().join("nope"),
            store_dir: dir.path().join("out"),
        });
        assert!(matches!(result, Err(BuildError::ReadError(_))));
    }
}
