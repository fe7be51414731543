//! Page records and the build-time artifact producer.
//!
//! A page is persisted as a [`PageRecord`] holding its source and the
//! compiled artifact produced from exactly that source. The
//! [`ArtifactProducer`] is the only writer: it transpiles first and writes
//! only on success, so a record never pairs a source with a stale artifact.

pub mod builder;
pub mod producer;
pub mod record;
pub mod store;

pub use builder::{build_pages, BuildConfig, BuildError, BuildReport, PageFailure};
pub use producer::{ArtifactProducer, PageDraft, SaveError};
pub use record::{validate_slug, PageRecord};
pub use store::{JsonFileStore, MemoryStore, PageStore, StoreError};
