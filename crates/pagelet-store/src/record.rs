//! The persisted page record.

use std::sync::LazyLock;

use pagelet_transpile::CompiledArtifact;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("Invalid regex"));

/// A page as stored: source and the artifact compiled from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub title: String,
    pub slug: String,
    pub source_text: String,

    /// Transpiled code; empty when the source is empty
    pub compiled_artifact: String,

    /// Capability registry version the artifact was compiled against
    #[serde(default)]
    pub registry_version: u32,

    pub is_published: bool,
}

impl PageRecord {
    /// The stored artifact, ready for the sandbox executor.
    pub fn artifact(&self) -> CompiledArtifact {
        CompiledArtifact {
            code: self.compiled_artifact.clone(),
            registry_version: self.registry_version,
        }
    }
}

/// Whether `slug` is usable as a record key and file name.
pub fn validate_slug(slug: &str) -> bool {
    SLUG.is_match(slug)
}
