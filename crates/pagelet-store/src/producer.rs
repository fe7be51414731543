//! Build-time artifact production.

use pagelet_sandbox::CapabilityRegistry;
use pagelet_transpile::{TranspileError, Transpiler};

use crate::record::{validate_slug, PageRecord};
use crate::store::{PageStore, StoreError};

/// A page as submitted by an author, before compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDraft {
    pub title: String,
    pub slug: String,
    pub source_text: String,
    pub is_published: bool,
}

/// Errors that abort a save. Nothing is written when one occurs.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Invalid slug {0:?}: use lowercase letters, digits and dashes")]
    InvalidSlug(String),

    #[error("Compilation failed: {0}")]
    Transpile(#[from] TranspileError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Compiles drafts and persists source and artifact together.
#[derive(Debug, Clone)]
pub struct ArtifactProducer {
    transpiler: Transpiler,
}

impl Default for ArtifactProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactProducer {
    /// A producer targeting the global capability registry.
    pub fn new() -> Self {
        Self {
            transpiler: Transpiler::new(CapabilityRegistry::global().transpile_options()),
        }
    }

    pub fn transpiler(&self) -> &Transpiler {
        &self.transpiler
    }

    /// Compile `draft` into a record without storing it.
    pub fn compile(&self, draft: PageDraft) -> Result<PageRecord, SaveError> {
        if !validate_slug(&draft.slug) {
            return Err(SaveError::InvalidSlug(draft.slug));
        }

        let registry_version = self.transpiler.options().registry_version;
        let compiled_artifact = if draft.source_text.is_empty() {
            String::new()
        } else {
            self.transpiler.transpile(&draft.source_text)?.code
        };

        Ok(PageRecord {
            title: draft.title,
            slug: draft.slug,
            source_text: draft.source_text,
            compiled_artifact,
            registry_version,
            is_published: draft.is_published,
        })
    }

    /// Compile `draft` and store the result, replacing any record with the same slug.
    pub fn save(&self, store: &dyn PageStore, draft: PageDraft) -> Result<PageRecord, SaveError> {
        let slug = draft.slug.clone();
        let record = match self.compile(draft) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Not saving {}: {}", slug, e);
                return Err(e);
            }
        };

        store.put(&record)?;
        tracing::info!("Saved {} ({} bytes compiled)", record.slug, record.compiled_artifact.len());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn draft(source: &str) -> PageDraft {
        PageDraft {
            title: "Home".to_string(),
            slug: "home".to_string(),
            source_text: source.to_string(),
            is_published: true,
        }
    }

    #[test]
    fn saves_source_with_matching_artifact() {
        let store = MemoryStore::new();
        let producer = ArtifactProducer::new();

        let record = producer.save(&store, draft("return <View/>;")).unwrap();

        assert_eq!(record.compiled_artifact, "return React.createElement(View, null);\n");
        assert_eq!(record.registry_version, CapabilityRegistry::global().version());
        assert_eq!(store.get("home").unwrap(), Some(record));
    }

    #[test]
    fn empty_source_saves_empty_artifact() {
        let store = MemoryStore::new();
        let record = ArtifactProducer::new().save(&store, draft("")).unwrap();
        assert_eq!(record.compiled_artifact, "");
        assert!(record.artifact().is_empty());
    }

    #[test]
    fn failed_compile_keeps_previous_record() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let producer = ArtifactProducer::new();

        let saved = producer.save(&store, draft("return <Text>ok</Text>;")).unwrap();
        let result = producer.save(&store, draft("return <View>;"));

        assert!(matches!(result, Err(SaveError::Transpile(_))));
        let stored = store.get("home").unwrap().unwrap();
        assert_eq!(stored.compiled_artifact, saved.compiled_artifact);
        assert_eq!(stored.source_text, "return <Text>ok</Text>;");
    }

    #[test]
    fn rejects_invalid_slug_before_compiling() {
        let store = MemoryStore::new();
        let mut page = draft("return <View>;");
        page.slug = "Not A Slug".to_string();

        let result = ArtifactProducer::new().save(&store, page);

        assert!(matches!(result, Err(SaveError::InvalidSlug(_))));
        assert!(store.list().unwrap().is_empty());
    }
}
