//! Page sources as they arrive from disk or from an AI assistant.
//!
//! Page files are component source with optional YAML frontmatter. AI
//! responses are free text; the component source is the first suitable
//! fenced code block. Nothing here transpiles: callers hand the extracted
//! source to the transpiler unchanged.

pub mod fence;
pub mod frontmatter;
pub mod page;

pub use fence::{extract_code, find_fences, require_code, CodeFence, FenceError, FenceLanguage};
pub use frontmatter::{extract_frontmatter, FrontmatterError, PageMeta};
pub use page::{parse_page, render_page, PageFile};
